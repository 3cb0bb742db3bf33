//! Write-buffer admission-window tests.
//!
//! Coverage:
//! - unsealed buffers accept everything
//! - sealed buffers reject groups at/after the barrier
//! - sealed buffers reject positions past the frozen upper bound
//! - seal is one-shot (second seal does not move the window)
//! - accumulator bookkeeping (size, len)

#[cfg(test)]
mod tests {
    use crate::memtable::{CommitLogPosition, Memtable, WriteOrdering};

    /// # Scenario
    /// A freshly created buffer has no barrier and accepts any group at
    /// any position.
    #[test]
    fn unsealed_buffer_accepts_everything() {
        let ordering = WriteOrdering::new();
        let buffer = Memtable::new(1, CommitLogPosition::NONE);

        let g1 = ordering.start();
        let g2 = ordering.start();

        assert!(buffer.accepts(g1, CommitLogPosition::new(0, 10)));
        assert!(buffer.accepts(g2, CommitLogPosition::new(99, 0)));
        assert!(!buffer.is_sealed());
    }

    /// # Scenario
    /// After sealing, groups issued before the barrier are still
    /// admitted; the barrier itself and anything after it are not.
    ///
    /// # Actions
    /// 1. Start a group, issue a barrier, seal, start another group.
    ///
    /// # Expected behavior
    /// The pre-barrier group is accepted, the post-barrier group is
    /// rejected.
    #[test]
    fn barrier_splits_old_and_new_groups() {
        let ordering = WriteOrdering::new();
        let buffer = Memtable::new(1, CommitLogPosition::NONE);

        let old_group = ordering.start();
        let barrier = ordering.issue_barrier();
        buffer.seal(barrier, CommitLogPosition::new(5, 100));
        let new_group = ordering.start();

        assert!(buffer.accepts(old_group, CommitLogPosition::new(5, 50)));
        assert!(!buffer.accepts(barrier, CommitLogPosition::new(5, 50)));
        assert!(!buffer.accepts(new_group, CommitLogPosition::new(5, 50)));
    }

    /// # Scenario
    /// A pre-barrier group whose commit-log position lies past the
    /// frozen upper bound is rejected — that write belongs to the
    /// successor buffer.
    #[test]
    fn upper_bound_rejects_late_positions() {
        let ordering = WriteOrdering::new();
        let buffer = Memtable::new(1, CommitLogPosition::NONE);

        let old_group = ordering.start();
        let barrier = ordering.issue_barrier();
        buffer.seal(barrier, CommitLogPosition::new(5, 100));

        assert!(buffer.accepts(old_group, CommitLogPosition::new(5, 100)));
        assert!(!buffer.accepts(old_group, CommitLogPosition::new(5, 101)));
        assert!(!buffer.accepts(old_group, CommitLogPosition::new(6, 0)));
    }

    /// # Scenario
    /// Sealing twice does not widen or move the admission window.
    #[test]
    fn seal_is_one_shot() {
        let ordering = WriteOrdering::new();
        let buffer = Memtable::new(1, CommitLogPosition::NONE);

        let g = ordering.start();
        let first_barrier = ordering.issue_barrier();
        buffer.seal(first_barrier, CommitLogPosition::new(1, 10));

        // Attempt to re-seal with a much later window.
        let second_barrier = ordering.issue_barrier();
        buffer.seal(second_barrier, CommitLogPosition::new(9, 999));

        assert!(buffer.accepts(g, CommitLogPosition::new(1, 10)));
        assert!(!buffer.accepts(g, CommitLogPosition::new(1, 11)));
    }

    /// # Scenario
    /// Accumulator bookkeeping: size grows with payload bytes, len
    /// counts distinct keys.
    #[test]
    fn accumulator_tracks_size_and_len() {
        let buffer = Memtable::new(3, CommitLogPosition::new(2, 0));

        assert!(buffer.is_empty());

        buffer.put(b"alpha".to_vec(), b"1234".to_vec());
        buffer.put(b"beta".to_vec(), b"56".to_vec());

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.approximate_size(), 5 + 4 + 4 + 2);
        assert_eq!(buffer.get(b"alpha"), Some(b"1234".to_vec()));
        assert_eq!(buffer.get(b"gamma"), None);
        assert_eq!(buffer.lower_bound(), CommitLogPosition::new(2, 0));
        assert_eq!(buffer.generation(), 3);
    }
}
