//! Directory bundle reproducibility
//!
//! The bundle hash must depend only on the bundled content: not on file
//! creation order, not on the manifest left by a previous run, and not on
//! ignored files.

mod fixtures;

use std::fs;

use asset_notary::bundle::{Bundler, Manifest, IGNORE_FILENAME, MANIFEST_FILENAME};
use asset_notary::extract::{ExtractOptions, Extractor, Kind};
use fixtures::{write_tree, HELLO_WORLD_BUNDLE};
use tempfile::TempDir;

#[test]
fn test_golden_two_file_bundle() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), &[("a.txt", "hello"), ("b.txt", "world")]);

    let artifact = Bundler::new(dir.path().to_path_buf()).bundle().unwrap();

    assert_eq!(artifact.hash, HELLO_WORLD_BUNDLE);
    assert_eq!(artifact.kind, Some(Kind::Dir));
    assert_eq!(artifact.size, 10);
}

#[test]
fn test_creation_order_does_not_matter() {
    let files = [
        ("src/main.rs", "fn main() {}"),
        ("src/lib/mod.rs", "pub mod x;"),
        ("README.md", "# readme"),
        ("Cargo.toml", "[package]"),
        ("z/last.txt", "z"),
    ];

    let forward = TempDir::new().unwrap();
    write_tree(forward.path(), &files);

    let mut reversed_files = files;
    reversed_files.reverse();
    let reversed = TempDir::new().unwrap();
    write_tree(reversed.path(), &reversed_files);

    let a = Bundler::new(forward.path().to_path_buf()).collect().unwrap();
    let b = Bundler::new(reversed.path().to_path_buf()).collect().unwrap();

    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn test_manifest_does_not_change_hash() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), &[("a.txt", "hello"), ("b.txt", "world")]);

    let bundler = Bundler::new(dir.path().to_path_buf()).with_write_manifest(true);
    let first = bundler.bundle().unwrap();
    assert!(dir.path().join(MANIFEST_FILENAME).is_file());

    // A stale manifest from some other tree is ignored as well.
    fs::write(dir.path().join(MANIFEST_FILENAME), "not json at all").unwrap();
    let second = bundler.bundle().unwrap();

    assert_eq!(first.hash, second.hash);
    assert_eq!(second.hash, HELLO_WORLD_BUNDLE);
}

#[test]
fn test_written_manifest_matches_bundle() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), &[("b.txt", "world"), ("a.txt", "hello")]);

    Bundler::new(dir.path().to_path_buf())
        .with_write_manifest(true)
        .bundle()
        .unwrap();

    let json = fs::read_to_string(dir.path().join(MANIFEST_FILENAME)).unwrap();
    let manifest = Manifest::from_json(&json).unwrap();
    let paths: Vec<_> = manifest
        .descriptors()
        .iter()
        .map(|d| d.path.as_str())
        .collect();

    assert_eq!(paths, vec!["a.txt", "b.txt"]);
    assert_eq!(manifest.digest(), HELLO_WORLD_BUNDLE);
}

#[test]
fn test_ignored_files_do_not_change_hash() {
    let dir = TempDir::new().unwrap();
    write_tree(
        dir.path(),
        &[
            ("a.txt", "hello"),
            ("b.txt", "world"),
            (IGNORE_FILENAME, "*.log\nbuild/\n"),
        ],
    );
    let before = Bundler::new(dir.path().to_path_buf()).collect().unwrap();

    write_tree(
        dir.path(),
        &[("debug.log", "noise"), ("build/out.bin", "binary"), ("deep/x.log", "more")],
    );
    let after = Bundler::new(dir.path().to_path_buf()).collect().unwrap();

    assert_eq!(before.digest(), after.digest());
    assert!(after.find(IGNORE_FILENAME).is_some());
}

#[test]
fn test_dir_reference_through_extractor() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), &[("a.txt", "hello"), ("b.txt", "world")]);

    let reference = format!("dir://{}", dir.path().display());
    let extractor = Extractor::new(ExtractOptions {
        ignore_file_init: true,
    });
    let artifact = extractor.extract(&reference).unwrap();

    assert_eq!(artifact.kind, Some(Kind::Dir));
    // The default ignore file is written into the root and bundled with it.
    assert!(dir.path().join(IGNORE_FILENAME).is_file());
    assert_ne!(artifact.hash, HELLO_WORLD_BUNDLE);

    let again = extractor.extract(&reference).unwrap();
    assert_eq!(artifact.hash, again.hash);
}
