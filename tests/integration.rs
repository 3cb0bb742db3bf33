//! Integration tests for the public tracker surface.
//!
//! These tests exercise the full lifecycle stack (tracker → view →
//! transaction → obsoletion log) through the public `liveset` API only.
//! No internal modules are referenced.
//!
//! ## Coverage areas
//! - **Empty drop**: predicate matching nothing is a complete no-op
//! - **Compaction swap**: claim, contention, stage, obsolete, commit
//! - **Flush**: switch → mark flushing → replace with empty outputs
//! - **Crash recovery**: both obsoletion-log directions restore a
//!   valid on-disk state
//! - **Split caching**: one full-ring range, `split(8)` twice
//! - **Disk-error policy**: best-effort read fault quarantines a
//!   directory end to end
//!
//! ## See also
//! - `tracker::tests` — CAS and claim unit tests
//! - `transaction::tests` — commit/abort unit tests
//! - `oblog::tests` — log format and recovery unit tests

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use liveset::descriptor::{Component, Descriptor, FormatTag};
use liveset::memtable::CommitLogPosition;
use liveset::oblog::{LogState, recover_directory};
use liveset::policy::{
    Action, DiskErrorHandler, DiskFailurePolicy, DiskFault, ProcessControl, TransportControl,
};
use liveset::ranges::{
    HashedPartitioner, ReplicaRange, RingSnapshot, RingVersion, SortedLocalRanges, TokenRange,
};
use liveset::sstable::{KeyInterval, RepairedAt, SSTable, SSTableHandle};
use liveset::tracker::{Notification, Subscriber, Tracker};
use liveset::transaction::OperationKind;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn table_dir(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("ks1").join("events-1");
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn sstable(dir: &Path, generation: u64) -> SSTableHandle {
    let descriptor = Descriptor::new(dir, "ks1", "events", generation, FormatTag::Big);
    fs::write(descriptor.path_for(Component::Data), vec![0u8; 10]).unwrap();
    SSTable::with_metadata(
        descriptor,
        10,
        KeyInterval::new(b"a".to_vec(), b"z".to_vec()),
        RepairedAt::UNREPAIRED,
    )
}

/// Counts `Changed` notifications without retaining sstable references.
#[derive(Default)]
struct ChangeCounter {
    shapes: Mutex<Vec<(usize, usize)>>,
}

impl Subscriber for ChangeCounter {
    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Notification::Changed { added, removed, .. } = notification {
            self.shapes
                .lock()
                .unwrap()
                .push((added.len(), removed.len()));
        }
        Ok(())
    }
}

// ================================================================================================
// Scenario 1 — empty drop is a no-op
// ================================================================================================

/// # Scenario
/// `drop_sstables` with an always-false predicate over `{A, B, C}`.
///
/// # Expected behavior
/// Live set unchanged; no notification with a non-empty removed set;
/// no obsoletion log file survives.
#[test]
fn empty_drop_is_a_noop() {
    let temp = TempDir::new().unwrap();
    let dir = table_dir(&temp);
    let tracker = Tracker::new("ks1", "events", dir.clone());
    let changes = Arc::new(ChangeCounter::default());
    tracker.subscribe(changes.clone());

    tracker
        .add_initial_sstables((1..=3).map(|g| sstable(&dir, g)).collect())
        .unwrap();

    let dropped = tracker.drop_sstables(|_| false, OperationKind::Drop).unwrap();

    assert!(dropped.is_empty());
    assert_eq!(tracker.view().live_count(), 3);
    assert!(changes.shapes.lock().unwrap().is_empty());
    let leftover_logs = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("oblog"))
        .count();
    assert_eq!(leftover_logs, 0);
}

// ================================================================================================
// Scenario 2 — compaction swap
// ================================================================================================

/// # Scenario
/// `live = {A, B}`; claim both for compaction; a concurrent claim of
/// `{B}` must fail; stage `X`, obsolete originals, commit.
///
/// # Expected behavior
/// `live = {X}`, `compacting = ∅`, one `Changed(added=1, removed=2)`.
#[test]
fn compaction_swap() {
    let temp = TempDir::new().unwrap();
    let dir = table_dir(&temp);
    let tracker = Tracker::new("ks1", "events", dir.clone());
    let changes = Arc::new(ChangeCounter::default());
    tracker.subscribe(changes.clone());

    let a = sstable(&dir, 1);
    let b = sstable(&dir, 2);
    tracker
        .add_initial_sstables(vec![a.clone(), b.clone()])
        .unwrap();

    let mut tx = tracker
        .try_modify(vec![a.clone(), b.clone()], OperationKind::Compaction)
        .expect("claim succeeds");
    assert!(
        tracker
            .try_modify(vec![b.clone()], OperationKind::Drop)
            .is_none()
    );

    let x = sstable(&dir, 3);
    tx.update(x.clone()).unwrap();
    tx.obsolete_originals().unwrap();
    tx.commit().unwrap();

    let view = tracker.view();
    assert_eq!(view.live_count(), 1);
    assert!(view.is_live(x.descriptor()));
    assert!(view.compacting().is_empty());
    assert_eq!(changes.shapes.lock().unwrap().clone(), vec![(1, 2)]);
}

// ================================================================================================
// Scenario 3 — flush with empty output
// ================================================================================================

/// # Scenario
/// `switch_buffer(new)` returns the old target; `mark_flushing(old)`;
/// `replace_flushed(old, ∅, id)`.
///
/// # Expected behavior
/// Old buffer is in neither buffer list; a discarded notification
/// fires; no added notification fires.
#[test]
fn flush_with_empty_output() {
    #[derive(Default)]
    struct BufferWatch {
        discarded: AtomicUsize,
        added: AtomicUsize,
    }
    impl Subscriber for BufferWatch {
        fn notify(&self, n: &Notification) -> Result<(), Box<dyn Error + Send + Sync>> {
            match n {
                Notification::BufferDiscarded { .. } => {
                    self.discarded.fetch_add(1, Ordering::Relaxed);
                }
                Notification::Added { .. } => {
                    self.added.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
            Ok(())
        }
    }

    let temp = TempDir::new().unwrap();
    let tracker = Tracker::new("ks1", "events", table_dir(&temp));
    let watch = Arc::new(BufferWatch::default());
    tracker.subscribe(watch.clone());

    let fresh = tracker.new_buffer(CommitLogPosition::new(1, 0));
    let old = tracker.switch_buffer(false, fresh).unwrap();
    tracker.mark_flushing(&old);
    tracker
        .replace_flushed(&old, Vec::new(), Some(uuid::Uuid::new_v4()))
        .unwrap();

    let view = tracker.view();
    assert!(view.flushing_buffers().is_empty());
    assert!(
        view.live_buffers()
            .iter()
            .all(|b| b.generation() != old.generation())
    );
    assert_eq!(watch.discarded.load(Ordering::Relaxed), 1);
    assert_eq!(watch.added.load(Ordering::Relaxed), 0);
}

// ================================================================================================
// Scenario 4 — obsoletion-log recovery, both directions
// ================================================================================================

/// # Scenario
/// Crash after staging but before the commit marker, and crash after
/// the commit marker but before deletions; recover each.
///
/// # Expected behavior
/// Uncommitted: staged outputs deleted, originals remain. Committed:
/// originals deleted, staged outputs retained.
#[test]
fn obsoletion_log_recovery_both_directions() {
    // Direction 1: no commit marker.
    {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let tracker = Tracker::new("ks1", "events", dir.clone());

        let original = sstable(&dir, 1);
        let original_data = original.descriptor().path_for(Component::Data);
        tracker.add_initial_sstables(vec![original.clone()]).unwrap();

        let mut tx = tracker
            .try_modify(vec![original.clone()], OperationKind::Compaction)
            .unwrap();
        let staged = sstable(&dir, 2);
        let staged_data = staged.descriptor().path_for(Component::Data);
        tx.update(staged).unwrap();
        tx.obsolete_originals().unwrap();
        tx.checkpoint().unwrap();
        std::mem::forget(tx); // crash

        let recovered = recover_directory(&dir).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].state, LogState::Prepared);
        assert!(!staged_data.exists(), "staged output deleted");
        assert!(original_data.exists(), "original retained");
    }

    // Direction 2: commit marker durable, deletions never ran.
    {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);

        let original = Descriptor::new(&dir, "ks1", "events", 1, FormatTag::Big);
        let staged = Descriptor::new(&dir, "ks1", "events", 2, FormatTag::Big);
        fs::write(original.path_for(Component::Data), b"old").unwrap();
        fs::write(staged.path_for(Component::Data), b"new").unwrap();

        let log = liveset::oblog::ObsoletionLog::create(
            &dir,
            "compaction",
            uuid::Uuid::new_v4(),
        )
        .unwrap();
        log.record_add(&staged).unwrap();
        log.record_remove(&original).unwrap();
        log.commit().unwrap();
        std::mem::forget(log); // crash before deletions

        let recovered = recover_directory(&dir).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].state, LogState::Committed);
        assert!(!original.path_for(Component::Data).exists());
        assert!(staged.path_for(Component::Data).exists());
    }
}

// ================================================================================================
// Scenario 5 — split caching
// ================================================================================================

/// # Scenario
/// One full-ring range; `split(8)` twice.
///
/// # Expected behavior
/// The second call returns the identical boundary list (same
/// allocation) without re-invoking the splitter.
#[test]
fn split_caching_on_full_ring() {
    let snapshot = RingSnapshot {
        version: 1,
        ranges_at_endpoint: vec![ReplicaRange {
            range: TokenRange::full_ring(),
            full: true,
        }],
    };
    let local = SortedLocalRanges::build(
        &snapshot,
        Arc::new(HashedPartitioner::default()),
        Arc::new(RingVersion::new(1)),
    );

    let first = local.split(8);
    let second = local.split(8);

    assert_eq!(first.len(), 7);
    assert!(first.windows(2).all(|w| w[0] < w[1]));
    assert!(Arc::ptr_eq(&first, &second));
}

// ================================================================================================
// Scenario 6 — disk-error best-effort quarantine
// ================================================================================================

/// # Scenario
/// Policy `best_effort`; a read fault on
/// `<data>/ks/cf-ID/42-big-Data.db`.
///
/// # Expected behavior
/// Parent directory marked unreadable; all sstables in it leave the
/// live view; a single change notification carries the full removed
/// set.
#[test]
fn best_effort_read_fault_quarantine() {
    #[derive(Default)]
    struct Silent;
    impl TransportControl for Silent {
        fn stop_transports(&self) {}
    }
    #[derive(Default)]
    struct NoDeath;
    impl ProcessControl for NoDeath {
        fn terminate(&self) {
            panic!("must not terminate under best_effort");
        }
    }

    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("ks").join("cf-1");
    fs::create_dir_all(&dir).unwrap();

    let tracker = Tracker::new("ks", "cf", dir.clone());
    let changes = Arc::new(ChangeCounter::default());
    tracker.subscribe(changes.clone());

    let mut handles = Vec::new();
    for generation in [41u64, 42, 43] {
        let d = Descriptor::new(&dir, "ks", "cf", generation, FormatTag::Big);
        fs::write(d.path_for(Component::Data), b"x").unwrap();
        handles.push(SSTable::with_metadata(
            d,
            1,
            KeyInterval::new(b"a".to_vec(), b"z".to_vec()),
            RepairedAt::UNREPAIRED,
        ));
    }
    tracker.add_initial_sstables(handles).unwrap();

    let handler = DiskErrorHandler::new(
        DiskFailurePolicy::BestEffort,
        Arc::new(Silent),
        Arc::new(NoDeath),
    );
    handler.mark_startup_complete();

    let action = handler.handle(
        &DiskFault::Read {
            path: dir.join("42-big-Data.db"),
        },
        tracker.as_ref(),
    );

    assert_eq!(action, Action::Quarantined);
    assert!(handler.directories().is_unreadable(&dir));
    assert_eq!(tracker.view().live_count(), 0);
    assert_eq!(changes.shapes.lock().unwrap().clone(), vec![(0, 3)]);
}
