//! Lifecycle-transaction tests: the full compaction swap, abort
//! semantics, idempotence, and scope guarantees.
//!
//! Coverage:
//! - compaction swap end-to-end (claim → stage → obsolete → commit)
//! - post-commit view equations: `live' = (live \ O) ∪ A`,
//!   `compacting' = compacting \ O`
//! - commit idempotence; abort-after-commit rejection
//! - abort releases claims, destroys staged outputs, keeps originals
//! - drop-without-close aborts (scope guarantee)
//! - checkpoint leaves a recoverable prepared log after a "crash"

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use crate::descriptor::{Component, Descriptor, FormatTag};
    use crate::oblog::{LogState, recover_directory};
    use crate::sstable::{KeyInterval, RepairedAt, SSTable, SSTableHandle};
    use crate::tracker::{Notification, Subscriber, Tracker};
    use crate::transaction::OperationKind;

    fn table_dir(temp: &TempDir) -> PathBuf {
        let dir = temp.path().join("ks1").join("events-1");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn handle(dir: &Path, generation: u64) -> SSTableHandle {
        let d = Descriptor::new(dir, "ks1", "events", generation, FormatTag::Big);
        fs::write(d.path_for(Component::Data), vec![0u8; 10]).unwrap();
        SSTable::with_metadata(
            d,
            10,
            KeyInterval::new(b"a".to_vec(), b"z".to_vec()),
            RepairedAt::UNREPAIRED,
        )
    }

    /// Records `Changed` shapes without retaining sstable references.
    #[derive(Default)]
    struct ChangeLog {
        changed: Mutex<Vec<(usize, usize)>>,
    }

    impl Subscriber for ChangeLog {
        fn notify(
            &self,
            notification: &Notification,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if let Notification::Changed { added, removed, .. } = notification {
                self.changed
                    .lock()
                    .unwrap()
                    .push((added.len(), removed.len()));
            }
            Ok(())
        }
    }

    // ----------------------------------------------------------------
    // Compaction swap
    // ----------------------------------------------------------------

    /// # Scenario
    /// The canonical compaction swap.
    ///
    /// # Starting environment
    /// Live set `{A, B}`; a recording subscriber.
    ///
    /// # Actions
    /// 1. `try_modify({A, B}, Compaction)` → transaction T.
    /// 2. Concurrent `try_modify({B}, Drop)` → must be contention.
    /// 3. `T.update(X)`, `T.obsolete_originals()`, `T.commit()`.
    ///
    /// # Expected behavior
    /// `live = {X}`, `compacting = ∅`, exactly one `Changed` with
    /// `added = 1`, `removed = 2`; A and B's files deleted.
    #[test]
    fn compaction_swap_end_to_end() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());
        let changes = Arc::new(ChangeLog::default());
        t.subscribe(changes.clone());

        let a = handle(&dir, 1);
        let b = handle(&dir, 2);
        let a_data = a.descriptor().path_for(Component::Data);
        t.add_initial_sstables(vec![a.clone(), b.clone()]).unwrap();

        let mut tx = t
            .try_modify(vec![a.clone(), b.clone()], OperationKind::Compaction)
            .expect("claim must succeed");

        assert!(
            t.try_modify(vec![b.clone()], OperationKind::Drop).is_none(),
            "concurrent overlapping claim must see contention"
        );

        let x = handle(&dir, 3);
        tx.update(x.clone()).unwrap();
        tx.obsolete_originals().unwrap();
        tx.commit().unwrap();

        let view = t.view();
        assert_eq!(view.live_count(), 1);
        assert!(view.is_live(x.descriptor()));
        assert!(view.compacting().is_empty());
        assert_eq!(changes.changed.lock().unwrap().clone(), vec![(1, 2)]);

        // Release every outside reference; the originals' files go.
        drop((a, b));
        assert!(!a_data.exists(), "original deleted after last reference");
        assert_eq!(t.live_bytes(), 10);
    }

    /// # Scenario
    /// Commit without `obsolete_originals` keeps the originals live —
    /// only staged outputs are added.
    #[test]
    fn commit_without_obsoletion_keeps_originals() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());

        let a = handle(&dir, 1);
        t.add_initial_sstables(vec![a.clone()]).unwrap();

        let mut tx = t
            .try_modify(vec![a.clone()], OperationKind::Upgrade)
            .unwrap();
        let x = handle(&dir, 2);
        tx.update(x.clone()).unwrap();
        tx.commit().unwrap();

        let view = t.view();
        assert!(view.is_live(a.descriptor()));
        assert!(view.is_live(x.descriptor()));
        assert!(view.compacting().is_empty());
    }

    // ----------------------------------------------------------------
    // Idempotence / ordering
    // ----------------------------------------------------------------

    /// # Scenario
    /// Commit twice: the second call is a no-op. Abort after commit is
    /// an error.
    #[test]
    fn commit_is_idempotent_and_final() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());

        let a = handle(&dir, 1);
        t.add_initial_sstables(vec![a.clone()]).unwrap();

        let mut tx = t
            .try_modify(vec![a.clone()], OperationKind::Compaction)
            .unwrap();
        let x = handle(&dir, 2);
        tx.update(x).unwrap();
        tx.obsolete_originals().unwrap();

        tx.commit().unwrap();
        let live_after_first = t.view().live_count();
        tx.commit().unwrap();
        assert_eq!(t.view().live_count(), live_after_first);

        assert!(tx.abort().is_err());
    }

    // ----------------------------------------------------------------
    // Abort
    // ----------------------------------------------------------------

    /// # Scenario
    /// Abort releases the claim, destroys written staged outputs, and
    /// leaves the live set untouched.
    #[test]
    fn abort_destroys_staged_and_releases_claim() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());

        let a = handle(&dir, 1);
        t.add_initial_sstables(vec![a.clone()]).unwrap();

        let mut tx = t
            .try_modify(vec![a.clone()], OperationKind::Compaction)
            .unwrap();
        let x = handle(&dir, 2);
        let x_data = x.descriptor().path_for(Component::Data);
        tx.update(x).unwrap();

        tx.abort().unwrap();
        tx.abort().unwrap(); // idempotent

        let view = t.view();
        assert!(view.is_live(a.descriptor()));
        assert_eq!(view.live_count(), 1);
        assert!(view.compacting().is_empty());
        assert!(!x_data.exists(), "staged output destroyed on abort");
    }

    /// # Scenario
    /// Dropping a transaction without commit or abort aborts it — the
    /// scope guarantee holds on early-return paths.
    #[test]
    fn drop_without_close_aborts() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());

        let a = handle(&dir, 1);
        t.add_initial_sstables(vec![a.clone()]).unwrap();

        {
            let _tx = t
                .try_modify(vec![a.clone()], OperationKind::Compaction)
                .unwrap();
            // Early exit: no commit, no abort.
        }

        assert!(t.view().compacting().is_empty());
        assert!(t.view().is_live(a.descriptor()));
    }

    // ----------------------------------------------------------------
    // Crash recovery hand-off
    // ----------------------------------------------------------------

    /// # Scenario
    /// A transaction checkpoints staged work and then the process
    /// "crashes" (transaction leaked). Restart-time recovery deletes
    /// the staged output and keeps the original.
    #[test]
    fn checkpointed_but_uncommitted_work_rolls_back_on_recovery() {
        let temp = TempDir::new().unwrap();
        let dir = table_dir(&temp);
        let t = Tracker::new("ks1", "events", dir.clone());

        let a = handle(&dir, 1);
        let a_data = a.descriptor().path_for(Component::Data);
        t.add_initial_sstables(vec![a.clone()]).unwrap();

        let mut tx = t
            .try_modify(vec![a.clone()], OperationKind::Compaction)
            .unwrap();
        let x = handle(&dir, 2);
        let x_data = x.descriptor().path_for(Component::Data);
        tx.update(x).unwrap();
        tx.obsolete_originals().unwrap();
        tx.checkpoint().unwrap();
        std::mem::forget(tx); // crash

        let recovered = recover_directory(&dir).unwrap();

        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].state, LogState::Prepared);
        assert!(!x_data.exists(), "staged output rolled back");
        assert!(a_data.exists(), "original survives");
    }
}
