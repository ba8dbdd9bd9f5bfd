//! Export to the [DDDMP] format used by CUDD
//!
//! Only ASCII mode with a single root is produced. Versions 2.0 and 3.0 are
//! supported, where version 2.0 is the version bundled with the CUDD 3.0
//! release, while version 3.0 solely adds the `.varnames` field.
//!
//! [DDDMP]: https://github.com/ivmai/cudd/tree/release/dddmp

use std::fmt;
use std::io;

// spell-checker:ignore varinfo,suppvar,varnames,suppvarnames,orderedvarnames
// spell-checker:ignore permids,rootids,rootnames
// spell-checker:ignore nnodes,nvars,nsuppvars,nroots

/// `.varinfo` value for "no variable extra info"
const VARINFO_NONE: u32 = 4;

/// DDDMP format version
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
#[non_exhaustive]
pub enum DDDMPVersion {
    /// Version 2.0, bundled with [CUDD] 3.0
    ///
    /// [CUDD]: https://github.com/cuddorg/cudd
    #[default]
    V2_0,
    /// Version 3.0, used by [BDDSampler] and [Logic2BDD]
    ///
    /// [BDDSampler]: https://github.com/davidfa71/BDDSampler
    /// [Logic2BDD]: https://github.com/davidfa71/Extending-Logic
    V3_0,
}

impl fmt::Display for DDDMPVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DDDMPVersion::V2_0 => "DDDMP-2.0",
            DDDMPVersion::V3_0 => "DDDMP-3.0",
        })
    }
}

/// Settings for the DDDMP export
#[derive(Clone, Copy, Debug)]
pub struct ExportSettings<'a> {
    version: DDDMPVersion,
    diagram_name: &'a str,
}

impl Default for ExportSettings<'_> {
    fn default() -> Self {
        Self {
            version: DDDMPVersion::default(),
            diagram_name: "",
        }
    }
}

impl<'a> ExportSettings<'a> {
    /// Set the DDDMP format version for the export. Defaults to 2.0.
    #[inline(always)]
    pub fn version(mut self, version: DDDMPVersion) -> Self {
        self.version = version;
        self
    }
    /// Get the currently selected version
    #[inline(always)]
    pub fn get_version(&self) -> DDDMPVersion {
        self.version
    }

    /// Set the decision diagrams's name
    ///
    /// This corresponds to the optional `.dd` field in DDDMP, which is omitted
    /// for the empty string (the default). ASCII control characters (e.g.,
    /// line breaks) are replaced by spaces.
    #[inline(always)]
    pub fn diagram_name(mut self, name: &'a str) -> Self {
        self.diagram_name = name;
        self
    }
    /// Getter for [`Self::diagram_name()`]
    #[inline(always)]
    pub fn get_diagram_name(&self) -> &'a str {
        self.diagram_name
    }
}

/// An inner node as it appears in the `.nodes` section
///
/// Terminals are not represented, they are always written as nodes `0`
/// (false) and `1` (true).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Node {
    /// Node ID
    pub id: u32,
    /// Level of the node's variable
    pub level: u32,
    /// ID of the else child
    pub low: u32,
    /// ID of the then child
    pub high: u32,
}

/// A single-rooted decision diagram ready for DDDMP export
///
/// Instances are obtained from a [`Dialect`][crate::Dialect]. The header
/// fields are derived from the same data, so `.nnodes` always equals the
/// number of nodes and `.ids` always contains the same values as `.permids`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Dump {
    /// Variable names in variable ID order (only written for version 3.0)
    pub(crate) varnames: Vec<String>,
    pub(crate) suppvarnames: Vec<String>,
    pub(crate) orderedvarnames: Vec<String>,
    /// Variable IDs in ascending order
    pub(crate) ids: Vec<u32>,
    pub(crate) permids: Vec<u32>,
    pub(crate) root: u32,
    pub(crate) root_name: String,
    pub(crate) nodes: Vec<Node>,
}

impl Dump {
    /// Number of inner nodes (`.nnodes`)
    #[inline]
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of variables (`.nvars`)
    #[inline]
    pub fn nvars(&self) -> usize {
        self.permids.len()
    }

    /// Number of support variables (`.nsuppvars`)
    #[inline]
    pub fn nsuppvars(&self) -> usize {
        self.ids.len()
    }

    /// Sorted variable IDs (`.ids`)
    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Permutation IDs (`.permids`)
    #[inline]
    pub fn permids(&self) -> &[u32] {
        &self.permids
    }

    /// Support variable names (`.suppvarnames`)
    #[inline]
    pub fn suppvarnames(&self) -> &[String] {
        &self.suppvarnames
    }

    /// Ordered variable names (`.orderedvarnames`)
    #[inline]
    pub fn orderedvarnames(&self) -> &[String] {
        &self.orderedvarnames
    }

    /// ID of the root node (`.rootids`)
    #[inline]
    pub fn root_id(&self) -> u32 {
        self.root
    }

    /// Name of the root (`.rootnames`)
    #[inline]
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Inner nodes in their original order
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Display adapter writing the dump using `settings`
    pub fn display<'a>(&'a self, settings: &'a ExportSettings<'a>) -> impl fmt::Display + 'a {
        DumpDisplay {
            dump: self,
            settings,
        }
    }

    /// Export the dump to `file`
    ///
    /// # Example
    ///
    /// ```
    /// # use bddviz_dump::{Dialect, SourceDump};
    /// # use bddviz_dump::dddmp::{DDDMPVersion, ExportSettings};
    /// # fn export() -> std::io::Result<()> {
    /// let source = SourceDump::parse("2 2\n1 0\n2 1 0 1\n3 0 0 2")?;
    /// let dump = Dialect::Direct.read(&source, None)?;
    /// let mut file = Vec::new();
    /// ExportSettings::default()
    ///     .version(DDDMPVersion::V3_0)
    ///     .diagram_name("foo")
    ///     .export(&mut file, &dump)?;
    /// # Ok(())
    /// # }
    /// # export().unwrap();
    /// ```
    pub fn export(&self, mut file: impl io::Write, settings: &ExportSettings) -> io::Result<()> {
        write!(file, "{}", self.display(settings))
    }
}

impl ExportSettings<'_> {
    /// Export `dump` to `file` using these settings
    ///
    /// Shorthand for [`Dump::export()`].
    #[inline]
    pub fn export(&self, file: impl io::Write, dump: &Dump) -> io::Result<()> {
        dump.export(file, self)
    }
}

impl fmt::Display for Dump {
    /// Write the dump using the default [`ExportSettings`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dump(f, self, &ExportSettings::default())
    }
}

struct DumpDisplay<'a> {
    dump: &'a Dump,
    settings: &'a ExportSettings<'a>,
}

impl fmt::Display for DumpDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dump(f, self.dump, self.settings)
    }
}

/// Header and node emission shared by all dialects
///
/// Nothing is written after `.end`, not even a line break.
fn write_dump(f: &mut impl fmt::Write, dump: &Dump, settings: &ExportSettings) -> fmt::Result {
    writeln!(f, ".ver {}", settings.version)?;
    writeln!(f, ".mode A")?;
    writeln!(f, ".varinfo {VARINFO_NONE}")?;
    if !settings.diagram_name.is_empty() {
        writeln!(f, ".dd {}", ReplaceControl(settings.diagram_name))?;
    }

    writeln!(f, ".nnodes {}", dump.nnodes())?;
    writeln!(f, ".nvars {}", dump.nvars())?;
    writeln!(f, ".nsuppvars {}", dump.nsuppvars())?;

    if let DDDMPVersion::V3_0 = settings.version {
        writeln!(f, ".varnames{}", SpaceList(&dump.varnames))?;
    }
    writeln!(f, ".suppvarnames{}", SpaceList(&dump.suppvarnames))?;
    writeln!(f, ".orderedvarnames{}", SpaceList(&dump.orderedvarnames))?;
    writeln!(f, ".ids{}", SpaceList(&dump.ids))?;
    writeln!(f, ".permids{}", SpaceList(&dump.permids))?;

    writeln!(f, ".nroots 1")?;
    writeln!(f, ".rootids {}", dump.root)?;
    writeln!(f, ".rootnames {}", dump.root_name)?;

    writeln!(f, ".nodes")?;
    // <id> <level> <low> <high>
    writeln!(f, "0 F 0 0")?;
    writeln!(f, "1 T 0 0")?;
    for node in &dump.nodes {
        writeln!(f, "{} {} {} {}", node.id, node.level, node.low, node.high)?;
    }
    f.write_str(".end")
}

/// Writes each element preceded by a space
struct SpaceList<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Display for SpaceList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in self.0 {
            write!(f, " {item}")?;
        }
        Ok(())
    }
}

/// Writes the string with ASCII control characters replaced by spaces
struct ReplaceControl<'a>(&'a str);

impl fmt::Display for ReplaceControl<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.split(|c: char| c.is_ascii_control()).enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Dump {
        Dump {
            varnames: vec!["a".into(), "b".into()],
            suppvarnames: vec!["b".into(), "a".into()],
            orderedvarnames: vec!["a".into(), "b".into()],
            ids: vec![0, 1],
            permids: vec![1, 0],
            root: 3,
            root_name: "f".into(),
            nodes: vec![
                Node {
                    id: 2,
                    level: 1,
                    low: 0,
                    high: 1,
                },
                Node {
                    id: 3,
                    level: 0,
                    low: 0,
                    high: 2,
                },
            ],
        }
    }

    #[test]
    fn default_export() {
        let expected = "\
.ver DDDMP-2.0
.mode A
.varinfo 4
.nnodes 2
.nvars 2
.nsuppvars 2
.suppvarnames b a
.orderedvarnames a b
.ids 0 1
.permids 1 0
.nroots 1
.rootids 3
.rootnames f
.nodes
0 F 0 0
1 T 0 0
2 1 0 1
3 0 0 2
.end";
        assert_eq!(sample().to_string(), expected);

        let mut buf = Vec::new();
        sample().export(&mut buf, &ExportSettings::default()).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn v3_with_name() {
        let dump = sample();
        let settings = ExportSettings::default()
            .version(DDDMPVersion::V3_0)
            .diagram_name("my\ndiagram");
        assert_eq!(settings.get_version(), DDDMPVersion::V3_0);
        assert_eq!(settings.get_diagram_name(), "my\ndiagram");

        let text = dump.display(&settings).to_string();
        let header: Vec<&str> = text.lines().take(8).collect();
        assert_eq!(
            header,
            [
                ".ver DDDMP-3.0",
                ".mode A",
                ".varinfo 4",
                ".dd my diagram",
                ".nnodes 2",
                ".nvars 2",
                ".nsuppvars 2",
                ".varnames a b",
            ]
        );
    }

    #[test]
    fn empty_lists() {
        assert_eq!(SpaceList::<u32>(&[]).to_string(), "");
        assert_eq!(SpaceList(&[1, 2]).to_string(), " 1 2");
    }
}
