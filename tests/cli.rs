//! End-to-end tests for the svnbridge binary.

use std::fs;
use std::sync::Arc;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use svnbridge::history::{CacheOptions, HistoryCache};
use svnbridge::transport::{ConnectionPool, MemoryConnector, MemoryRepository};

fn svnbridge() -> Command {
    let mut cmd = Command::cargo_bin("svnbridge").unwrap();
    cmd.env_remove("SVNBRIDGE_LOG");
    cmd
}

#[test]
fn version_flag() {
    svnbridge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("svnbridge"));
}

#[test]
fn revid_format_then_parse() {
    svnbridge()
        .args(["revid", "format", "--uuid", "abc-123", "--branch", "trunk", "--revnum", "5"])
        .assert()
        .success()
        .stdout("svn-v4:abc-123:trunk:5\n");

    svnbridge()
        .args(["revid", "parse", "svn-v3-trunk0:abc-123:branches%2Ffoo:7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mapping: v3-trunk0"))
        .stdout(predicate::str::contains("Branch: branches/foo"))
        .stdout(predicate::str::contains("Revision: 7"));
}

#[test]
fn revid_parse_json_names_the_root() {
    svnbridge()
        .args(["--json", "revid", "parse", "svn-v4:abc::3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"revnum\": 3"))
        .stdout(predicate::str::contains("\"mapping\": \"v4\""));
}

#[test]
fn revid_parse_rejects_foreign_ids() {
    svnbridge()
        .args(["revid", "parse", "someone@example.com-20090101-abcdef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a generated revision id"));
}

#[test]
fn classify_guesses_the_layout() {
    svnbridge()
        .args(["classify", "trunk/src/main.rs", "branches/feature/x", "README"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Layout: trunk0"))
        .stdout(predicate::str::contains("trunk/src/main.rs: branch trunk, path src/main.rs"))
        .stdout(predicate::str::contains("branches/feature/x: branch branches/feature, path x"))
        .stdout(predicate::str::contains("README: not a branch path"));
}

#[test]
fn classify_with_unknown_layout_fails() {
    svnbridge()
        .args(["classify", "--layout", "sideways", "trunk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown layout 'sideways'"));
}

#[test]
fn delta_encode_then_dump() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("old.txt");
    let target = dir.path().join("new.txt");
    let stream = dir.path().join("delta.svndiff");
    let rebuilt = dir.path().join("rebuilt.txt");
    fs::write(&source, b"the quick brown fox jumps over the lazy dog\n").unwrap();
    fs::write(&target, b"the quick brown fox leaps over the lazy dog\n").unwrap();

    svnbridge()
        .args(["delta", "encode"])
        .arg(&target)
        .arg("--source")
        .arg(&source)
        .arg("-o")
        .arg(&stream)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Wrote 1 windows"));

    svnbridge()
        .args(["delta", "dump"])
        .arg(&stream)
        .arg("--source")
        .arg(&source)
        .arg("-o")
        .arg(&rebuilt)
        .assert()
        .success()
        .stdout(predicate::str::contains("Windows: 1"))
        .stdout(predicate::str::contains("Target: 44 bytes"));

    assert_eq!(fs::read(&rebuilt).unwrap(), fs::read(&target).unwrap());
}

#[test]
fn delta_dump_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let stream = dir.path().join("garbage");
    fs::write(&stream, b"not svndiff").unwrap();

    svnbridge()
        .args(["delta", "dump"])
        .arg(&stream)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a valid svndiff stream"));
}

#[test]
fn cache_show_lists_stored_rows() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cache").join("history.db");

    let repo = MemoryRepository::new("mem://cli");
    let mut txn = repo.begin("ann", "layout");
    txn.mkdir("trunk").unwrap();
    txn.commit().unwrap();
    let mut txn = repo.begin("ann", "add");
    txn.put_file("trunk/f", b"hello").unwrap();
    txn.commit().unwrap();

    {
        let pool = ConnectionPool::new(Arc::new(MemoryConnector::new().with_repository(repo.clone())));
        let cache = HistoryCache::open(&db, pool, "mem://cli", CacheOptions::default()).unwrap();
        cache.fetch_revisions(2).unwrap();
    }

    svnbridge()
        .args(["cache", "show", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermark: 2"))
        .stdout(predicate::str::contains("r1 A trunk"))
        .stdout(predicate::str::contains("r2 A trunk/f"));

    svnbridge()
        .args(["cache", "show", "--from", "2", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("r1 A").not());
}

#[test]
fn cache_show_without_a_cache_fails() {
    let dir = TempDir::new().unwrap();
    svnbridge()
        .args(["cache", "show", "--db"])
        .arg(dir.path().join("missing.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no history cache at"));
}
