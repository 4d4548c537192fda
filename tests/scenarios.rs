//! End-to-end commit and fetch scenarios against the in-memory repository.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{add_file, fid, files, standard_repo, Bridge};
use svnbridge::core::config::RepoConfig;
use svnbridge::core::types::BranchPath;
use svnbridge::core::ErrorKind;
use svnbridge::history::{CacheOptions, HistoryCache, LogWalker};
use svnbridge::transport::{ChangeAction, ChangedPath, ChangedPaths, ConnectionPool, CopyFrom, MemoryConnector};
use svnbridge::target::TargetRepository;

/// Bridge on a repository whose trunk holds `a` and `b` from r2.
fn two_files() -> (Bridge, svnbridge::core::types::RevisionId, Arc<svnbridge::target::Inventory>) {
    let repo = standard_repo("mem://scenarios");
    let mut txn = repo.begin("ann", "add files");
    txn.put_file("trunk/a", b"alpha\n").unwrap();
    txn.put_file("trunk/b", b"bravo\n").unwrap();
    txn.commit().unwrap();
    let bridge = Bridge::open(repo);
    let (tip, inv) = bridge.fetch("trunk");
    (bridge, tip, inv)
}

#[test]
fn adding_a_file_round_trips() {
    let bridge = Bridge::open(standard_repo("mem://add"));
    let (tip, base) = bridge.fetch("trunk");
    let mut new = (*base).clone();
    add_file(&bridge, &mut new, "", "foo", "foo-id", b"hello");

    let committed = bridge.commit("trunk", &tip, &base, &new, "add foo").unwrap();
    assert_eq!(bridge.repo.cat("trunk/foo", committed.revnum).unwrap(), b"hello");

    let (target, fetched, inv) = bridge.fetch_fresh("trunk", true);
    assert_eq!(fetched, committed.revision_id);
    assert_eq!(
        files(&target, &inv),
        BTreeMap::from([("foo".to_string(), b"hello".to_vec())])
    );
    assert_eq!(inv.path2id("foo"), Some(fid("foo-id")));
}

#[test]
fn rename_is_a_copy_and_keeps_identity() {
    let (bridge, tip, base) = two_files();
    let a_id = base.path2id("a").unwrap();
    let mut new = (*base).clone();
    let root = new.root_id().unwrap().clone();
    new.rename(&a_id, &root, "c").unwrap();

    let committed = bridge.commit("trunk", &tip, &base, &new, "rename a").unwrap();
    let changes = bridge.repo.changed_paths(committed.revnum).unwrap();
    assert_eq!(
        changes["trunk/c"],
        ChangedPath::copied(ChangeAction::Add, CopyFrom::new("trunk/a", 2))
    );
    assert_eq!(changes["trunk/a"].action, ChangeAction::Delete);
    assert!(changes
        .values()
        .all(|c| c.action != ChangeAction::Add || c.copyfrom.is_some()));

    let (_, _, inv) = bridge.fetch_fresh("trunk", true);
    assert_eq!(inv.path2id("c"), Some(a_id));
    assert!(inv.path2id("a").is_none());
}

#[test]
fn deleting_a_directory_removes_descendants() {
    let repo = standard_repo("mem://rmdir");
    let mut txn = repo.begin("ann", "tree");
    txn.mkdir("trunk/dir").unwrap();
    txn.mkdir("trunk/dir/sub").unwrap();
    txn.put_file("trunk/dir/x", b"x").unwrap();
    txn.put_file("trunk/dir/sub/y", b"y").unwrap();
    txn.put_file("trunk/keep", b"k").unwrap();
    txn.commit().unwrap();
    let bridge = Bridge::open(repo);
    let (tip, base) = bridge.fetch("trunk");
    let doomed: Vec<_> = ["dir", "dir/x", "dir/sub", "dir/sub/y"]
        .iter()
        .map(|p| base.path2id(p).unwrap())
        .collect();

    let mut new = (*base).clone();
    new.remove_recursive(&doomed[0]).unwrap();
    let committed = bridge.commit("trunk", &tip, &base, &new, "drop dir").unwrap();
    let changes = bridge.repo.changed_paths(committed.revnum).unwrap();
    assert_eq!(changes["trunk/dir"].action, ChangeAction::Delete);
    assert!(!changes.keys().any(|p| p.starts_with("trunk/dir/")));

    let (target, _, inv) = bridge.fetch_fresh("trunk", true);
    for id in &doomed {
        assert!(!inv.has_id(id), "{id} survived");
    }
    assert_eq!(files(&target, &inv).keys().collect::<Vec<_>>(), vec!["keep"]);
}

#[test]
fn stale_push_is_out_of_date_under_append_only() {
    let (bridge, tip, base) = two_files();
    let mut first = (*base).clone();
    add_file(&bridge, &mut first, "", "one", "one-id", b"1");
    bridge.commit("trunk", &tip, &base, &first, "first").unwrap();
    let latest = bridge.repo.latest_revnum();
    let before = bridge.repo.tree_paths(latest).unwrap();

    let mut second = (*base).clone();
    add_file(&bridge, &mut second, "", "two", "two-id", b"2");
    let err = bridge.commit("trunk", &tip, &base, &second, "second").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfDate);
    assert_eq!(bridge.repo.latest_revnum(), latest);
    assert_eq!(bridge.repo.tree_paths(latest).unwrap(), before);
}

#[test]
fn cached_rows_are_never_rewritten() {
    let repo = standard_repo("mem://cache");
    for i in 0..4 {
        let mut txn = repo.begin("ann", "edit");
        txn.put_file("trunk/f", format!("{i}").as_bytes()).unwrap();
        txn.commit().unwrap();
    }
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.db");
    let pool = ConnectionPool::new(Arc::new(MemoryConnector::new().with_repository(repo.clone())));
    let cache = HistoryCache::open(&db, Arc::clone(&pool), "mem://cache", CacheOptions::default()).unwrap();

    let mut first = ChangedPaths::new();
    first.insert("x".into(), ChangedPath::new(ChangeAction::Add));
    cache.store(&[(5, first.clone())], 5).unwrap();
    let mut second = ChangedPaths::new();
    second.insert("x".into(), ChangedPath::copied(ChangeAction::Replace, CopyFrom::new("y", 2)));
    cache.store(&[(5, second)], 5).unwrap();
    assert_eq!(cache.revision_paths(5, None).unwrap(), first);
    drop(cache);

    let reopened = HistoryCache::open(&db, pool, "mem://cache", CacheOptions::default()).unwrap();
    assert_eq!(reopened.revision_paths(5, None).unwrap(), first);
}

#[test]
fn replay_and_switch_build_identical_inventories() {
    let repo = standard_repo("mem://equiv");
    let mut txn = repo.begin("ann", "tree");
    txn.mkdir("trunk/src").unwrap();
    txn.put_file("trunk/src/lib.rs", b"fn a() {}\n").unwrap();
    txn.put_file("trunk/run.sh", b"#!/bin/sh\n").unwrap();
    txn.set_prop("trunk/run.sh", "svn:executable", Some("*")).unwrap();
    txn.commit().unwrap();
    let mut txn = repo.begin("bob", "rework");
    txn.copy("trunk/src", 2, "trunk/lib").unwrap();
    txn.delete("trunk/src").unwrap();
    txn.put_file("trunk/lib/lib.rs", b"fn a() {}\nfn b() {}\n").unwrap();
    txn.put_file("trunk/link", b"link lib/lib.rs").unwrap();
    txn.set_prop("trunk/link", "svn:special", Some("*")).unwrap();
    txn.commit().unwrap();
    let mut txn = repo.begin("bob", "copy back");
    txn.copy("trunk/lib/lib.rs", 3, "trunk/old.rs").unwrap();
    txn.set_prop("trunk/run.sh", "svn:executable", None).unwrap();
    txn.commit().unwrap();

    let bridge = Bridge::open(repo);
    let (replayed, tip_a, _) = bridge.fetch_fresh("trunk", true);
    let (switched, tip_b, _) = bridge.fetch_fresh("trunk", false);
    assert_eq!(tip_a, tip_b);
    assert_eq!(replayed.revision_ids(), switched.revision_ids());
    for revid in replayed.revision_ids() {
        assert_eq!(
            replayed.get_inventory(&revid).unwrap(),
            switched.get_inventory(&revid).unwrap(),
            "inventories differ at {revid}"
        );
    }
    let inv = replayed.get_inventory(&tip_a).unwrap();
    assert_eq!(inv.get_by_path("link").unwrap().symlink_target.as_deref(), Some("lib/lib.rs"));
    assert!(!inv.get_by_path("run.sh").unwrap().executable);
}

#[test]
fn swapped_files_import_identically_through_replay_and_switch() {
    let (bridge, tip, base) = two_files();
    let a_id = base.path2id("a").unwrap();
    let b_id = base.path2id("b").unwrap();
    let mut new = (*base).clone();
    let root = new.root_id().unwrap().clone();
    new.rename(&a_id, &root, "a.swap").unwrap();
    new.rename(&b_id, &root, "a").unwrap();
    new.rename(&a_id, &root, "b").unwrap();
    bridge.commit("trunk", &tip, &base, &new, "swap a and b").unwrap();

    let (replayed, tip_a, inv_a) = bridge.fetch_fresh("trunk", true);
    let (switched, tip_b, inv_b) = bridge.fetch_fresh("trunk", false);
    assert_eq!(tip_a, tip_b);
    assert_eq!(inv_a, inv_b);
    for inv in [&inv_a, &inv_b] {
        assert_eq!(inv.path2id("a"), Some(b_id.clone()));
        assert_eq!(inv.path2id("b"), Some(a_id.clone()));
    }
    assert_eq!(files(&replayed, &inv_a)["a"], b"bravo\n");
    assert_eq!(files(&switched, &inv_b)["b"], b"alpha\n");
}

#[test]
fn rename_onto_a_deleted_name_keeps_identity() {
    let (bridge, tip, base) = two_files();
    let a_id = base.path2id("a").unwrap();
    let b_id = base.path2id("b").unwrap();
    let mut new = (*base).clone();
    let root = new.root_id().unwrap().clone();
    new.remove_recursive(&a_id).unwrap();
    new.rename(&b_id, &root, "a").unwrap();

    let committed = bridge.commit("trunk", &tip, &base, &new, "b replaces a").unwrap();
    let changes = bridge.repo.changed_paths(committed.revnum).unwrap();
    assert_eq!(changes["trunk/a"].copyfrom, Some(CopyFrom::new("trunk/b", 2)));
    assert_eq!(changes["trunk/b"].action, ChangeAction::Delete);

    for use_replay in [true, false] {
        let (target, _, inv) = bridge.fetch_fresh("trunk", use_replay);
        assert_eq!(inv.path2id("a"), Some(b_id.clone()));
        assert!(!inv.has_id(&a_id));
        assert_eq!(files(&target, &inv)["a"], b"bravo\n");
    }
}

#[test]
fn overlapping_early_deletes_are_rejected() {
    let repo = standard_repo("mem://overlap");
    let mut txn = repo.begin("ann", "tree");
    txn.mkdir("trunk/dir").unwrap();
    txn.put_file("trunk/dir/b", b"b").unwrap();
    txn.put_file("trunk/dir/c", b"c").unwrap();
    txn.commit().unwrap();
    let bridge = Bridge::open(repo);
    let (tip, base) = bridge.fetch("trunk");

    // dir/b moves to 0b and dir itself to 0d; both new names sort before
    // "dir", so a replay claims them before dir is deleted.
    let dir_id = base.path2id("dir").unwrap();
    let b_id = base.path2id("dir/b").unwrap();
    let mut new = (*base).clone();
    let root = new.root_id().unwrap().clone();
    new.rename(&b_id, &root, "0b").unwrap();
    new.rename(&dir_id, &root, "0d").unwrap();
    bridge.commit("trunk", &tip, &base, &new, "split dir").unwrap();

    let target = svnbridge::target::MemoryTargetRepository::new();
    let err = svnbridge::fetch::FetchEngine::new(&bridge.source, &target)
        .fetch_branch(&BranchPath::new("trunk").unwrap(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn malformed_revision_id_falls_back_to_generated() {
    let repo = standard_repo("mem://malformed");
    let mut txn = repo.begin("ann", "pushed by a broken client");
    txn.put_file("trunk/z", b"z").unwrap();
    txn.set_prop("trunk", "bzr:revision-id:v4", Some("not-a-number custom\n")).unwrap();
    let revnum = txn.commit().unwrap();

    let bridge = Bridge::open(repo.clone());
    let (tip, inv) = bridge.fetch("trunk");
    assert_eq!(tip.as_str(), format!("svn-v4:{}:trunk:{revnum}", repo.uuid()));
    assert!(inv.path2id("z").is_some());
}

#[test]
fn cached_history_matches_direct_history() {
    let repo = standard_repo("mem://walkers");
    let mut txn = repo.begin("ann", "work");
    txn.put_file("trunk/a", b"1").unwrap();
    txn.commit().unwrap();
    let mut txn = repo.begin("ann", "branch");
    txn.copy("trunk", 2, "branches/x").unwrap();
    txn.commit().unwrap();

    let cached = Bridge::with_config(repo.clone(), RepoConfig::default(), true);
    let direct = Bridge::open(repo);
    assert!(cached.source.history_cache().is_some());
    assert!(direct.source.history_cache().is_none());
    let (tip_cached, inv_cached) = cached.fetch("branches/x");
    let (tip_direct, inv_direct) = direct.fetch("branches/x");
    assert_eq!(tip_cached, tip_direct);
    assert_eq!(inv_cached, inv_direct);
    assert_eq!(cached.source.walker().find_latest_change("branches/x", 3).unwrap(), Some(3));
    assert!(cached.source.history_cache().unwrap().watermark().unwrap() >= 3);
}
