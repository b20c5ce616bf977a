use assert_fs::prelude::*;
use cueconfig_fs::{DirFs, FileKind, FileSystem, NormalizedPath};
use pretty_assertions::assert_eq;

#[test]
fn test_walk_is_sorted_and_recursive() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("b.cue").write_str("b: 1").unwrap();
    temp.child("a/nested.cue").write_str("n: 1").unwrap();
    temp.child("a/readme.txt").write_str("ignored").unwrap();

    let fs = DirFs::new(temp.path());
    let entries: Vec<_> = fs
        .walk()
        .unwrap()
        .into_iter()
        .map(|entry| (entry.path.as_str().to_string(), entry.kind))
        .collect();

    assert_eq!(
        entries,
        vec![
            ("a".to_string(), FileKind::Dir),
            ("a/nested.cue".to_string(), FileKind::File),
            ("a/readme.txt".to_string(), FileKind::File),
            ("b.cue".to_string(), FileKind::File),
        ]
    );
}

#[test]
fn test_stat_distinguishes_file_dir_and_missing() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("cfg/app.cue").write_str("x: 1").unwrap();
    let fs = DirFs::new(temp.path());

    assert_eq!(fs.stat(&NormalizedPath::new("cfg")).unwrap(), FileKind::Dir);
    assert_eq!(
        fs.stat(&NormalizedPath::new("cfg/app.cue")).unwrap(),
        FileKind::File
    );
    assert!(fs.stat(&NormalizedPath::new("nope.cue")).unwrap_err().is_not_found());
}

#[test]
fn test_read_returns_bytes() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("app.cue").write_str("foo: 7\n").unwrap();
    let fs = DirFs::new(temp.path());

    let content = fs.read(&NormalizedPath::new("app.cue")).unwrap();
    assert_eq!(content, b"foo: 7\n");
}

#[test]
fn test_dotdot_cannot_escape_root() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("inner/app.cue").write_str("x: 1").unwrap();
    temp.child("secret.cue").write_str("s: 1").unwrap();
    let fs = DirFs::new(temp.path().join("inner"));

    // `../secret.cue` cleans to `secret.cue`, which does not exist under the root
    assert!(fs.read(&NormalizedPath::new("../secret.cue")).unwrap_err().is_not_found());
}

#[test]
fn test_canonical_root_matches_dunce() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fs = DirFs::canonical(temp.path()).unwrap();
    assert_eq!(fs.root(), dunce::canonicalize(temp.path()).unwrap());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_reported_as_other() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("real.cue").write_str("x: 1").unwrap();
    std::os::unix::fs::symlink(temp.path().join("real.cue"), temp.path().join("link.cue")).unwrap();

    let fs = DirFs::new(temp.path());
    let link = fs
        .walk()
        .unwrap()
        .into_iter()
        .find(|entry| entry.path.as_str() == "link.cue")
        .unwrap();
    assert_eq!(link.kind, FileKind::Other);
}
