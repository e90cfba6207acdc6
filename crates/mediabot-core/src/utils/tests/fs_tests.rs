use std::fs::{self, File};

use tempfile::tempdir;

use crate::utils::fs::{find_file, find_files, move_dir};

#[test]
fn test_find_file_is_case_insensitive_and_recursive() {
    let temp_dir = tempdir().unwrap();
    let nested = temp_dir.path().join("archive-root").join("my_plugin");
    fs::create_dir_all(&nested).unwrap();
    File::create(nested.join("Manifest.JSON")).unwrap();
    File::create(nested.join("plugin.py")).unwrap();

    let found = find_file(temp_dir.path(), "manifest.json").unwrap();
    assert_eq!(found, Some(nested.join("Manifest.JSON")));

    assert_eq!(find_file(temp_dir.path(), "missing.txt").unwrap(), None);
}

#[test]
fn test_find_file_prefers_shallow_match() {
    let temp_dir = tempdir().unwrap();
    let deep = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&deep).unwrap();
    File::create(deep.join("manifest.json")).unwrap();
    File::create(temp_dir.path().join("manifest.json")).unwrap();

    let found = find_file(temp_dir.path(), "manifest.json").unwrap();
    assert_eq!(found, Some(temp_dir.path().join("manifest.json")));
}

#[test]
fn test_find_files_on_missing_path_is_empty() {
    let temp_dir = tempdir().unwrap();
    let result = find_files(temp_dir.path().join("nope"), &|_: &std::path::Path| true).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_move_dir_moves_whole_tree() {
    let temp_dir = tempdir().unwrap();
    let from = temp_dir.path().join("from");
    fs::create_dir_all(from.join("sub")).unwrap();
    fs::write(from.join("sub").join("data.txt"), "hello").unwrap();

    let to = temp_dir.path().join("to");
    move_dir(&from, &to).unwrap();

    assert!(!from.exists());
    assert_eq!(fs::read_to_string(to.join("sub").join("data.txt")).unwrap(), "hello");
}
