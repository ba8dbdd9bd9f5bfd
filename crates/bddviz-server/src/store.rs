//! File-backed storage of named diagrams
//!
//! Next to the index file (a JSON array), every diagram has a content file
//! `<name>.txt` and a state file `<name>_state.json`. The index refers to them
//! by file name and records each diagram's type and modification date.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Extension of diagram content files
const CONTENT_EXT: &str = "txt";

/// A stored diagram
#[derive(Clone, PartialEq, Debug)]
pub struct Diagram {
    /// Unique name, also used as file name stem
    pub name: String,
    /// Diagram type as given by the client (e.g., `bdd`)
    pub kind: String,
    /// Last modification in seconds since the UNIX epoch
    pub date: f64,
    /// Diagram text
    pub diagram: String,
    /// Opaque UI state
    pub state: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct IndexEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    date: f64,
    /// Content file name, relative to the index directory
    diagram: String,
    /// State file name, relative to the index directory
    state: String,
}

/// Errors of the diagram store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The name cannot be used as a file name
    #[error("invalid diagram name '{0}'")]
    InvalidName(String),
    /// Reading or writing a file failed
    #[error("could not access '{}': {source}", .path.display())]
    Io {
        /// The file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// The index could not be encoded
    #[error("failed to encode the diagram index: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Current time in seconds since the UNIX epoch
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Whether `name` may be used as a diagram name (and thus as a file name)
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Mutable view of the diagrams, only available inside
/// [`DiagramStore::transaction()`]
pub struct Diagrams<'a>(&'a mut Vec<Diagram>);

impl Diagrams<'_> {
    /// Add a diagram with an empty state, replacing any diagram of the same
    /// name
    pub fn add(&mut self, name: &str, kind: &str, content: &str) -> Result<(), StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        self.remove(name);
        self.0.push(Diagram {
            name: name.to_string(),
            kind: kind.to_string(),
            date: now(),
            diagram: content.to_string(),
            state: String::new(),
        });
        Ok(())
    }

    /// Set the state of diagram `name`
    ///
    /// Returns `false` if there is no such diagram.
    pub fn set_state(&mut self, name: &str, state: &str) -> bool {
        let mut found = false;
        for diagram in self.0.iter_mut().filter(|d| d.name == name) {
            diagram.state = state.to_string();
            found = true;
        }
        found
    }

    /// Remove diagram `name`, returns whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        let len = self.0.len();
        self.0.retain(|d| d.name != name);
        self.0.len() != len
    }

    /// The current diagrams
    pub fn iter(&self) -> impl Iterator<Item = &Diagram> {
        self.0.iter()
    }
}

/// Diagram collection persisted to disk
///
/// All modifications go through [`Self::transaction()`], which holds a single
/// lock while applying the changes and writing the files. Hence, concurrent
/// modifications never interleave partial writes.
pub struct DiagramStore {
    index_path: PathBuf,
    dir: PathBuf,
    diagrams: Mutex<Vec<Diagram>>,
}

impl DiagramStore {
    /// Open the store with the index file at `index_path`
    ///
    /// Creates the containing directory if needed. A missing or unreadable
    /// index results in an empty store, and diagrams whose files cannot be
    /// read are skipped.
    pub fn open(index_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let index_path = index_path.into();
        let dir = match index_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;

        let diagrams = load(&index_path, &dir);
        info!(
            index = %index_path.display(),
            count = diagrams.len(),
            "opened diagram store"
        );
        Ok(Self {
            index_path,
            dir,
            diagrams: Mutex::new(diagrams),
        })
    }

    /// Path of the index file
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Snapshot of all diagrams
    pub fn list(&self) -> Vec<Diagram> {
        self.diagrams.lock().clone()
    }

    /// Apply `f` to the diagrams and persist the result
    ///
    /// The lock is held from before `f` runs until the files are written and
    /// released on every path. `f` works on a copy, which replaces the
    /// current diagrams only once everything is on disk. If `f` or writing
    /// fails, the store is left unchanged.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Diagrams) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut diagrams = self.diagrams.lock();
        let mut next = diagrams.clone();
        let res = f(&mut Diagrams(&mut next))?;
        self.persist_locked(&diagrams, &next)?;
        *diagrams = next;
        Ok(res)
    }

    /// Write all diagrams to disk
    pub fn persist(&self) -> Result<(), StoreError> {
        let diagrams = self.diagrams.lock();
        self.persist_locked(&[], &diagrams)
    }

    /// Store `content` as diagram `name`, replacing a previous one
    pub fn put(&self, name: &str, kind: &str, content: &str) -> Result<(), StoreError> {
        self.transaction(|diagrams| diagrams.add(name, kind, content))?;
        info!(name, kind, "stored diagram");
        Ok(())
    }

    /// Update the state of diagram `name`, returns whether it exists
    pub fn set_state(&self, name: &str, state: &str) -> Result<bool, StoreError> {
        let found = self.transaction(|diagrams| Ok(diagrams.set_state(name, state)))?;
        debug!(name, found, "updated diagram state");
        Ok(found)
    }

    /// Delete diagram `name`, returns whether it existed
    pub fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let found = self.transaction(|diagrams| Ok(diagrams.remove(name)))?;
        info!(name, found, "deleted diagram");
        Ok(found)
    }

    /// Must be called with the lock held
    ///
    /// Files of diagrams that are also in `previous` (unchanged) are not
    /// rewritten. All new files and the index are first written to temporary
    /// files and only renamed into place if every write succeeded. Files
    /// only referenced by the old on-disk index are removed afterwards.
    fn persist_locked(&self, previous: &[Diagram], diagrams: &[Diagram]) -> Result<(), StoreError> {
        let old_entries = read_index(&self.index_path).unwrap_or_default();
        let entries: Vec<IndexEntry> = diagrams.iter().map(IndexEntry::new).collect();

        let mut staged = Staged::default();
        let res = (|| -> Result<(), StoreError> {
            for (diagram, entry) in diagrams.iter().zip(&entries) {
                if previous.contains(diagram) {
                    continue;
                }
                staged.write(self.dir.join(&entry.diagram), &diagram.diagram)?;
                staged.write(self.dir.join(&entry.state), &diagram.state)?;
            }
            staged.write(self.index_path.clone(), &serde_json::to_vec(&entries)?)
        })();
        if let Err(err) = res {
            staged.discard();
            return Err(err);
        }
        staged.commit()?;

        let referenced: FxHashSet<&str> = entries
            .iter()
            .flat_map(|entry| [entry.diagram.as_str(), entry.state.as_str()])
            .collect();
        for entry in &old_entries {
            for file in [&entry.diagram, &entry.state] {
                if referenced.contains(file.as_str()) {
                    continue;
                }
                if !is_valid_name(file) {
                    warn!(%file, "ignoring invalid file name in diagram index");
                    continue;
                }
                let path = self.dir.join(file);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(path = %path.display(), %err, "could not remove diagram file");
                    }
                }
            }
        }

        debug!(count = entries.len(), "persisted diagram index");
        Ok(())
    }
}

impl IndexEntry {
    fn new(diagram: &Diagram) -> Self {
        IndexEntry {
            name: diagram.name.clone(),
            kind: diagram.kind.clone(),
            date: diagram.date,
            diagram: format!("{}.{CONTENT_EXT}", diagram.name),
            state: format!("{}_state.json", diagram.name),
        }
    }
}

/// Files written next to their destination, pending a rename
#[derive(Default)]
struct Staged(Vec<(PathBuf, PathBuf)>);

impl Staged {
    fn write(&mut self, dest: PathBuf, contents: impl AsRef<[u8]>) -> Result<(), StoreError> {
        let mut tmp = dest.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents).map_err(StoreError::io(&tmp))?;
        self.0.push((tmp, dest));
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let mut pending = self.0.into_iter();
        while let Some((tmp, dest)) = pending.next() {
            if let Err(err) = fs::rename(&tmp, &dest) {
                let _ = fs::remove_file(&tmp);
                Staged(pending.collect()).discard();
                return Err(StoreError::io(&dest)(err));
            }
        }
        Ok(())
    }

    fn discard(self) {
        for (tmp, _) in self.0 {
            if let Err(err) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), %err, "could not remove temporary file");
            }
        }
    }
}

/// Read the index, logging (and swallowing) errors
fn read_index(index_path: &Path) -> Option<Vec<IndexEntry>> {
    let bytes = match fs::read(index_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(index = %index_path.display(), %err, "could not read diagram index");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => Some(entries),
        Err(err) => {
            warn!(index = %index_path.display(), %err, "could not parse diagram index");
            None
        }
    }
}

fn load(index_path: &Path, dir: &Path) -> Vec<Diagram> {
    let Some(entries) = read_index(index_path) else {
        return Vec::new();
    };

    let read = |file: &str| -> io::Result<String> {
        if !is_valid_name(file) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid file name '{file}'"),
            ));
        }
        fs::read_to_string(dir.join(file))
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let content = read(&entry.diagram).and_then(|c| Ok((c, read(&entry.state)?)));
            match content {
                Ok((diagram, state)) => Some(Diagram {
                    name: entry.name,
                    kind: entry.kind,
                    date: entry.date,
                    diagram,
                    state,
                }),
                Err(err) => {
                    warn!(name = %entry.name, %err, "skipping diagram");
                    None
                }
            }
        })
        .collect()
}
