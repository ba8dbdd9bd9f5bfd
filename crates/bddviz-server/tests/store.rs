//! Persistence and locking of the diagram store

use std::fs;
use std::path::Path;
use std::thread;

use bddviz_server::store::DiagramStore;

// spell-checker:ignore tempdir

fn open(dir: &Path) -> DiagramStore {
    DiagramStore::open(dir.join("diagrams.json")).unwrap()
}

fn names(store: &DiagramStore) -> Vec<String> {
    let mut names: Vec<String> = store.list().into_iter().map(|d| d.name).collect();
    names.sort();
    names
}

fn stray_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|file| file.ends_with(".tmp"))
        .collect()
}

#[test]
fn failed_write_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.put("ok", "bdd", "content").unwrap();

    // exceeds the file name length limit
    let long = "n".repeat(300);
    assert!(store.put(&long, "bdd", "x").is_err());
    assert_eq!(names(&store), ["ok"]);
    assert!(stray_files(dir.path()).is_empty());

    store.put("other", "bdd", "more").unwrap();
    assert!(store.set_state("ok", "{}").unwrap());

    let store = open(dir.path());
    assert_eq!(names(&store), ["ok", "other"]);
    let ok = store.list().into_iter().find(|d| d.name == "ok").unwrap();
    assert_eq!(ok.diagram, "content");
    assert_eq!(ok.state, "{}");
}

#[test]
fn failed_transaction_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.put("a", "bdd", "1").unwrap();
    let index = fs::read(store.index_path()).unwrap();

    let res = store.transaction(|diagrams| {
        diagrams.add("b", "bdd", "2")?;
        diagrams.add("c/d", "bdd", "3")
    });
    assert!(res.is_err());
    assert_eq!(names(&store), ["a"]);
    assert_eq!(fs::read(store.index_path()).unwrap(), index);
    assert!(!dir.path().join("b.txt").exists());
}

#[test]
fn replaced_and_deleted_files_are_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.put("a", "bdd", "1").unwrap();
    store.put("b", "bdd", "2").unwrap();
    store.put("a", "bdd", "3").unwrap();
    store.delete("b").unwrap();

    let mut files: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(files, ["a.txt", "a_state.json", "diagrams.json"]);
    assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "3");
}

#[test]
fn persist_rewrites_all_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    store.put("a", "bdd", "1").unwrap();
    store.set_state("a", "{\"x\":1}").unwrap();

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    fs::remove_file(dir.path().join("a_state.json")).unwrap();
    store.persist().unwrap();

    let store = open(dir.path());
    let list = store.list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].diagram, "1");
    assert_eq!(list[0].state, "{\"x\":1}");
}

#[test]
fn concurrent_updates() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 10;

    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());

    thread::scope(|scope| {
        for t in 0..THREADS {
            let store = &store;
            scope.spawn(move || {
                for r in 0..ROUNDS {
                    let name = format!("t{t}-{r}");
                    store.put(&name, "bdd", &name).unwrap();
                    store.set_state(&name, &format!("s{r}")).unwrap();
                    if r % 2 == 1 {
                        assert!(store.delete(&name).unwrap());
                    }
                }
            });
        }
    });

    let mut expected: Vec<String> = (0..THREADS)
        .flat_map(|t| (0..ROUNDS).step_by(2).map(move |r| format!("t{t}-{r}")))
        .collect();
    expected.sort();
    assert_eq!(names(&store), expected);

    let reopened = open(dir.path());
    assert_eq!(names(&reopened), expected);
    for diagram in reopened.list() {
        assert_eq!(diagram.diagram, diagram.name);
        assert!(diagram.state.starts_with('s'));
    }

    // two files per diagram plus the index
    let files = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2 * expected.len() + 1);
}
