//! Property-based tests for identity mapping, history and the delta codec.
//!
//! These tests use proptest to verify invariants hold across randomly
//! generated inputs.

use std::sync::Arc;

use proptest::prelude::*;

use svnbridge::core::types::{BranchPath, ForeignRevision, RepositoryUuid, RevNum};
use svnbridge::delta::{
    apply_window, apply_windows, decode_delta, decode_varint, delta_windows, encode_delta, encode_varint, md5_hex,
    send_stream, DeltaError, Instruction, TxDeltaApplier, Window, DELTA_WINDOW_SIZE,
};
use svnbridge::history::{CacheOptions, DirectLogWalker, HistoryCache, LogWalker};
use svnbridge::mapping::{MappingRegistry, MappingScheme};
use svnbridge::transport::{ConnectionPool, MemoryConnector, MemoryRepository};

/// Strategy for repository UUIDs.
fn uuid() -> impl Strategy<Value = RepositoryUuid> {
    "[0-9a-f]{8}(-[0-9a-f]{4}){0,3}".prop_map(|s| RepositoryUuid::new(s).unwrap())
}

/// Strategy for one path component, including characters every scheme
/// has to escape.
fn component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.%:@~+-]{1,6}".prop_filter("relative component", |c| c != "." && c != "..")
}

/// Strategy for branch paths, the repository root included.
fn branch() -> impl Strategy<Value = BranchPath> {
    prop::collection::vec(component(), 0..4).prop_map(|parts| BranchPath::new(parts.join("/")).unwrap())
}

/// A random history: each step either edits trunk, edits a branch, or
/// copies trunk or a branch to a new branch.
fn history(steps: &[u8]) -> (MemoryRepository, Vec<String>) {
    let repo = MemoryRepository::new("mem://prop");
    let mut txn = repo.begin("ann", "layout");
    txn.mkdir("trunk").unwrap();
    txn.mkdir("branches").unwrap();
    txn.put_file("trunk/f", b"0").unwrap();
    txn.commit().unwrap();
    let mut branches = vec!["trunk".to_string()];
    for (i, step) in steps.iter().enumerate() {
        let source = branches[*step as usize % branches.len()].clone();
        let mut txn = repo.begin("ann", "step");
        if step % 3 == 0 {
            let new = format!("branches/b{i}");
            txn.copy(&source, repo.latest_revnum(), &new).unwrap();
            branches.push(new);
        } else {
            txn.put_file(&format!("{source}/f"), format!("{i}").as_bytes()).unwrap();
        }
        txn.commit().unwrap();
    }
    (repo, branches)
}

/// Instruction lengths, biased towards the inline/varint boundary.
fn op_len() -> impl Strategy<Value = usize> {
    prop_oneof![Just(0usize), Just(0x3f), Just(0x40), Just(0x41), 0usize..150]
}

/// A valid window over `sview`, paired with the bytes it must produce.
///
/// Each raw step is `(kind, position, len)`; positions are folded into
/// whatever range is legal at that point so every window passes `check`.
fn window_with_target() -> impl Strategy<Value = (Vec<u8>, Window, Vec<u8>)> {
    (
        prop::collection::vec(any::<u8>(), 0..200),
        prop::collection::vec(any::<u8>(), 0..400),
        prop::collection::vec((0u8..3, any::<usize>(), op_len()), 0..12),
        any::<u32>(),
    )
        .prop_map(|(sview, pool, steps, sview_offset)| {
            let mut ops = Vec::new();
            let mut new_data = Vec::new();
            let mut target: Vec<u8> = Vec::new();
            for (kind, pos, len) in steps {
                match kind {
                    0 => {
                        let offset = if sview.is_empty() { 0 } else { pos % sview.len() };
                        let len = len.min(sview.len() - offset);
                        target.extend_from_slice(&sview[offset..offset + len]);
                        ops.push(Instruction::Source { offset, len });
                    }
                    1 if !target.is_empty() => {
                        let offset = pos % target.len();
                        for i in 0..len {
                            let b = target[offset + i];
                            target.push(b);
                        }
                        ops.push(Instruction::Target { offset, len });
                    }
                    1 => ops.push(Instruction::Target { offset: 0, len: 0 }),
                    _ => {
                        let start = new_data.len().min(pool.len());
                        let len = len.min(pool.len() - start);
                        new_data.extend_from_slice(&pool[start..start + len]);
                        target.extend_from_slice(&pool[start..start + len]);
                        ops.push(Instruction::New { len });
                    }
                }
            }
            let window = Window {
                sview_offset: u64::from(sview_offset),
                sview_len: sview.len(),
                tview_len: target.len(),
                ops,
                new_data,
            };
            (sview, window, target)
        })
}

fn pool(repo: &MemoryRepository) -> Arc<ConnectionPool> {
    ConnectionPool::new(Arc::new(MemoryConnector::new().with_repository(repo.clone())))
}

proptest! {
    /// Every scheme decodes what it encodes.
    #[test]
    fn revision_ids_round_trip(uuid in uuid(), branch in branch(), revnum in 0u64..1_000_000) {
        let registry = MappingRegistry::default();
        let foreign = ForeignRevision::new(uuid, branch, revnum);
        for name in ["v1", "v2", "v3-trunk0", "v3-none", "v4"] {
            let scheme = registry.get(name).unwrap();
            let revid = scheme.revision_id_foreign_to_target(&foreign);
            let (decoded, found) = registry.parse_revision_id(&revid).unwrap();
            prop_assert_eq!(&decoded, &foreign);
            prop_assert_eq!(found.name(), scheme.name());
        }
    }

    /// Filling the cache in differently sized batches, or twice, stores the
    /// same history.
    #[test]
    fn cache_population_is_idempotent(
        steps in prop::collection::vec(any::<u8>(), 1..10),
        flush_every in 1u64..4,
        log_batch_size in 1u64..4,
    ) {
        let (repo, _) = history(&steps);
        let head = repo.latest_revnum();
        let small = HistoryCache::in_memory(pool(&repo), "mem://prop", CacheOptions { flush_every, log_batch_size }).unwrap();
        let large = HistoryCache::in_memory(pool(&repo), "mem://prop", CacheOptions::default()).unwrap();
        large.fetch_revisions(head).unwrap();
        let once: Vec<_> = (0..=head).map(|r| large.revision_paths(r, None).unwrap()).collect();
        large.fetch_revisions(head).unwrap();
        for revnum in 0..=head {
            prop_assert_eq!(&small.revision_paths(revnum, None).unwrap(), &once[revnum as usize]);
            prop_assert_eq!(&large.revision_paths(revnum, None).unwrap(), &once[revnum as usize]);
        }
    }

    /// Following previous locations ends within `revnum` steps, and every
    /// step goes strictly back in time.
    #[test]
    fn previous_location_terminates(steps in prop::collection::vec(any::<u8>(), 1..10)) {
        let (repo, branches) = history(&steps);
        let head = repo.latest_revnum();
        let walker = DirectLogWalker::new(pool(&repo), "mem://prop");
        for branch in branches {
            let mut location: (String, RevNum) = (branch.clone(), head);
            let mut taken = 0;
            while let Some(prev) = walker.previous_location(&location.0, location.1).unwrap() {
                prop_assert!(prev.1 < location.1);
                location = prev;
                taken += 1;
                prop_assert!(taken <= head, "{} did not terminate", branch);
            }
        }
    }

    /// Windows generated for any pair of texts rebuild the target, and
    /// survive the wire encoding unchanged.
    #[test]
    fn generated_deltas_apply(
        source in prop::collection::vec(any::<u8>(), 0..300),
        target in prop::collection::vec(any::<u8>(), 0..300),
    ) {
        let windows = delta_windows(&source, &target);
        prop_assert_eq!(apply_windows(&source, &windows).unwrap(), target.clone());
        let decoded = decode_delta(&encode_delta(&windows)).unwrap();
        prop_assert_eq!(&decoded, &windows);
        prop_assert_eq!(apply_windows(&source, &decoded).unwrap(), target);
    }

    /// Arbitrary valid windows, overlapping target copies and zero-length
    /// instructions included, survive the wire encoding and apply to the
    /// bytes they describe.
    #[test]
    fn valid_windows_survive_the_codec(
        cases in prop::collection::vec(window_with_target(), 1..4),
    ) {
        let windows: Vec<Window> = cases.iter().map(|(_, w, _)| w.clone()).collect();
        let decoded = decode_delta(&encode_delta(&windows)).unwrap();
        prop_assert_eq!(&decoded, &windows);
        for ((sview, _, target), window) in cases.iter().zip(&decoded) {
            prop_assert_eq!(&apply_window(sview, window).unwrap(), target);
        }
    }

    /// Varints round trip and report how many bytes they used.
    #[test]
    fn varints_round_trip(value in any::<u64>()) {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf);
        buf.push(0xff);
        let (decoded, used) = decode_varint(&buf).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(used, buf.len() - 1);
    }
}

#[test]
fn varint_130_is_two_bytes() {
    let mut buf = Vec::new();
    encode_varint(130, &mut buf);
    assert_eq!(buf, vec![0x81, 0x02]);
    assert_eq!(decode_varint(&buf).unwrap(), (130, 2));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Streaming any buffer as new-data windows rebuilds it from an empty
    /// source, and the returned digest is the digest of the buffer.
    #[test]
    fn sent_streams_rebuild_their_input(
        len in prop_oneof![
            0usize..300,
            DELTA_WINDOW_SIZE - 2..DELTA_WINDOW_SIZE + 3,
            2 * DELTA_WINDOW_SIZE - 1..2 * DELTA_WINDOW_SIZE + 2,
        ],
        seed in any::<u8>(),
    ) {
        let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(seed).wrapping_add((i >> 8) as u8)).collect();
        let mut applier = TxDeltaApplier::new(Vec::new());
        let mut windows = 0usize;
        let md5 = send_stream::<_, DeltaError>(&data[..], |w| {
            windows += usize::from(w.is_some());
            applier.window(w)
        })
        .unwrap();
        prop_assert!(applier.is_closed());
        prop_assert_eq!(windows, (len + DELTA_WINDOW_SIZE - 1) / DELTA_WINDOW_SIZE);
        prop_assert_eq!(md5, md5_hex(&data));
        prop_assert_eq!(applier.finish(), data);
    }
}
