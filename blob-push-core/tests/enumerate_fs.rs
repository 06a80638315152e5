mod common;

use blob_push_core::enumerate::{enumerate, enumerate_excluding};
use blob_push_core::error::EnumerationError;
use common::write_tree;
use tempfile::tempdir;

#[test]
fn test_enumerate_yields_regular_files_only() {
    let root = tempdir().unwrap();
    write_tree(root.path(), &[("a.txt", 10), ("b/b.txt", 0)]);
    std::fs::create_dir_all(root.path().join("c")).unwrap();

    let batch = enumerate(root.path(), None).expect("enumeration should succeed");

    assert_eq!(batch.keys(), vec!["a.txt", "b/b.txt"]);
    assert_eq!(batch.files[0].local, root.path().join("a.txt"));
    assert_eq!(batch.files[1].local, root.path().join("b").join("b.txt"));
    assert!(batch.skipped.is_empty());
}

#[test]
fn test_enumerate_order_is_depth_first_and_sorted() {
    let root = tempdir().unwrap();
    write_tree(
        root.path(),
        &[("z.txt", 1), ("m/2.txt", 1), ("m/1.txt", 1), ("a/deep/x.bin", 3)],
    );

    let first = enumerate(root.path(), None).unwrap();
    let second = enumerate(root.path(), None).unwrap();

    assert_eq!(
        first.keys(),
        vec!["a/deep/x.bin", "m/1.txt", "m/2.txt", "z.txt"]
    );
    assert_eq!(first.keys(), second.keys(), "same snapshot, same order");
}

#[test]
fn test_enumerate_applies_key_prefix() {
    let root = tempdir().unwrap();
    write_tree(root.path(), &[("a.txt", 1), ("b/b.txt", 1)]);

    let batch = enumerate(root.path(), Some("backups/2024/")).unwrap();

    assert_eq!(batch.keys(), vec!["backups/2024/a.txt", "backups/2024/b/b.txt"]);
}

#[test]
fn test_enumerate_empty_directory_is_empty_batch() {
    let root = tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("only/dirs/here")).unwrap();

    let batch = enumerate(root.path(), None).unwrap();

    assert!(batch.is_empty());
    assert_eq!(batch.len(), 0);
}

#[test]
fn test_enumerate_missing_root_fails() {
    let root = tempdir().unwrap();
    let missing = root.path().join("does-not-exist");

    let err = enumerate(&missing, None).unwrap_err();

    match err {
        EnumerationError::Root { root, .. } => assert_eq!(root, missing),
        other => panic!("expected root error, got {other:?}"),
    }
}

#[test]
fn test_enumerate_single_file_root() {
    let root = tempdir().unwrap();
    write_tree(root.path(), &[("single.log", 4)]);

    let batch = enumerate(&root.path().join("single.log"), None).unwrap();

    assert_eq!(batch.keys(), vec!["single.log"]);
}

#[cfg(unix)]
#[test]
fn test_enumerate_does_not_follow_symlinks() {
    let root = tempdir().unwrap();
    write_tree(root.path(), &[("real/file.txt", 2)]);
    std::os::unix::fs::symlink(root.path().join("real"), root.path().join("loop")).unwrap();
    std::os::unix::fs::symlink(
        root.path().join("real/file.txt"),
        root.path().join("link.txt"),
    )
    .unwrap();

    let batch = enumerate(root.path(), None).unwrap();

    assert_eq!(batch.keys(), vec!["real/file.txt"]);
}

#[test]
fn test_enumerate_prunes_excluded_directories() {
    let root = tempdir().unwrap();
    write_tree(
        root.path(),
        &[("a.txt", 1), ("out/a.txt", 1), ("out/nested/b.txt", 1), ("outside.txt", 1)],
    );

    // Relative spelling of the same directory still matches after canonicalization.
    let excluded = root.path().join("out").join("..").join("out");
    let batch = enumerate_excluding(root.path(), None, &[excluded]).unwrap();

    assert_eq!(batch.keys(), vec!["a.txt", "outside.txt"]);
    assert!(batch.skipped.is_empty());
}

#[test]
fn test_enumerate_ignores_exclusions_outside_the_root() {
    let root = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    write_tree(root.path(), &[("a.txt", 1)]);

    let batch = enumerate_excluding(
        root.path(),
        None,
        &[elsewhere.path().to_path_buf(), root.path().join("missing")],
    )
    .unwrap();

    assert_eq!(batch.keys(), vec!["a.txt"]);
}

#[cfg(unix)]
#[test]
fn test_enumerate_skips_unreadable_subdirectory_and_continues() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    write_tree(root.path(), &[("locked/hidden.txt", 1), ("readable.txt", 3)]);
    let locked = root.path().join("locked");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users read through mode 000; nothing to observe then.
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = enumerate(root.path(), None);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    let batch = result.expect("an unreadable sub-entry must not fail the walk");

    assert_eq!(batch.keys(), vec!["readable.txt"]);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].path.as_deref(), Some(locked.as_path()));
}
