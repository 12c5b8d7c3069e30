//! End-to-end tests for the chert binary.

use assert_cmd::Command;
use chert_store::{Store, StoreOptions};
use predicates::prelude::*;

fn seeded_store(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("cli.db");
    let mut store = Store::open(&path, StoreOptions::default()).unwrap();
    store.insert(b"abc", b"some value").unwrap();
    store.insert(b"def", b"other value").unwrap();
    store.close().unwrap();
    path
}

#[test]
fn dump_lists_records_with_base64_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_store(&dir);

    Command::cargo_bin("chert")
        .unwrap()
        .args(["dump", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 records"))
        .stdout(predicate::str::contains("YWJj"))
        .stdout(predicate::str::contains("ZGVm"));
}

#[test]
fn dump_renders_hex_keys_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_store(&dir);

    Command::cargo_bin("chert")
        .unwrap()
        .args(["dump", "--hex", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("616263"));
}

#[test]
fn dump_limit_truncates_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_store(&dir);

    Command::cargo_bin("chert")
        .unwrap()
        .args(["dump", "--limit", "1", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("... 1 more"));
}

#[test]
fn info_prints_header_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = seeded_store(&dir);

    Command::cargo_bin("chert")
        .unwrap()
        .args(["info", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Records:          2"))
        .stdout(predicate::str::contains("Max key length:   67"));
}

#[test]
fn format_errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, b"this is not a chert file at all").unwrap();

    Command::cargo_bin("chert")
        .unwrap()
        .args(["dump", path.to_str().unwrap()])
        .assert()
        .failure();

    Command::cargo_bin("chert")
        .unwrap()
        .args(["info", path.to_str().unwrap()])
        .assert()
        .failure();
}
