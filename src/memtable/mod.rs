//! # Write-Buffer Module
//!
//! The **write buffer** (memtable) is the in-memory accumulator that
//! receives writes for a table until it is switched out and flushed to
//! sstables. The tracker keeps an ordered list of live buffers; only the
//! last accepts new writes unconditionally, while older buffers accept
//! stragglers that began before the switch.
//!
//! ## Design Invariants
//!
//! - Generations are assigned monotonically at creation; the live list
//!   is totally ordered by generation.
//! - A buffer's write barrier is issued at most once (at switch time)
//!   and never retracted.
//! - `accepts` is the only admission rule: a write ordered at position
//!   `p` in group `g` lands in the oldest buffer willing to take it.
//! - A buffer is never resurrected: once replaced by its flush outputs
//!   it leaves the view permanently.
//!
//! ## Lifecycle
//!
//! created (switch) → live target → `mark_flushing` → flushing →
//! `replace_flushed` → gone.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{OnceLock, RwLock};

use tracing::trace;

// ------------------------------------------------------------------------------------------------
// Commit-log position
// ------------------------------------------------------------------------------------------------

/// A position in the commit log: segment id plus byte offset.
///
/// Totally ordered; used as the lower/upper bound of the window of
/// writes a buffer covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitLogPosition {
    /// Commit-log segment id.
    pub segment: u64,

    /// Byte offset within the segment.
    pub offset: u64,
}

impl CommitLogPosition {
    /// The zero position — lower bound of a buffer created at startup.
    pub const NONE: CommitLogPosition = CommitLogPosition {
        segment: 0,
        offset: 0,
    };

    pub fn new(segment: u64, offset: u64) -> Self {
        Self { segment, offset }
    }
}

impl fmt::Display for CommitLogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

// ------------------------------------------------------------------------------------------------
// Write ordering
// ------------------------------------------------------------------------------------------------

/// An ordering token for a single write operation.
///
/// Groups are compared by issue order. A buffer sealed with barrier `b`
/// still accepts any group issued before `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpGroup {
    seq: u64,
}

impl OpGroup {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Issues [`OpGroup`]s and barriers from a monotonic counter.
///
/// One instance per table; writers call [`WriteOrdering::start`] before
/// routing a write, the tracker calls [`WriteOrdering::issue_barrier`]
/// while switching buffers.
#[derive(Debug, Default)]
pub struct WriteOrdering {
    next: AtomicU64,
}

impl WriteOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new write group.
    pub fn start(&self) -> OpGroup {
        OpGroup {
            seq: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Issues a barrier: all groups started before it are "old", all
    /// groups started after belong to the successor buffer.
    pub fn issue_barrier(&self) -> OpGroup {
        OpGroup {
            seq: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable core
// ------------------------------------------------------------------------------------------------

/// In-memory write buffer for a single table.
///
/// The accumulator itself is deliberately simple — a sorted map with an
/// approximate byte size. What the tracker cares about is the admission
/// window: generation, commit-log lower bound, and the one-shot write
/// barrier issued when the buffer is switched out.
#[derive(Debug)]
pub struct Memtable {
    /// Monotonic creation generation, assigned by the tracker.
    generation: u64,

    /// Minimum commit-log position this buffer accepts.
    lower_bound: CommitLogPosition,

    /// Barrier issued at switch time. Writes in groups at or after it
    /// belong to the successor buffer.
    barrier: OnceLock<OpGroup>,

    /// Commit-log upper bound frozen at switch time.
    upper_bound: OnceLock<CommitLogPosition>,

    /// Sorted write accumulator.
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Approximate accumulated payload bytes.
    approximate_size: AtomicUsize,
}

impl Memtable {
    /// Creates a buffer accepting writes from `lower_bound` onwards.
    pub fn new(generation: u64, lower_bound: CommitLogPosition) -> Self {
        Self {
            generation,
            lower_bound,
            barrier: OnceLock::new(),
            upper_bound: OnceLock::new(),
            entries: RwLock::new(BTreeMap::new()),
            approximate_size: AtomicUsize::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lower_bound(&self) -> CommitLogPosition {
        self.lower_bound
    }

    /// Whether this buffer is willing to receive a write in group
    /// `op_group` ordered at commit-log position `position`.
    ///
    /// True iff no barrier has been issued yet, or the group started
    /// before the barrier and the position does not exceed the frozen
    /// upper bound.
    pub fn accepts(&self, op_group: OpGroup, position: CommitLogPosition) -> bool {
        match self.barrier.get() {
            None => true,
            Some(barrier) => {
                if op_group >= *barrier {
                    return false;
                }
                match self.upper_bound.get() {
                    None => true,
                    Some(upper) => position <= *upper,
                }
            }
        }
    }

    /// Seals this buffer at switch time. Idempotent: only the first
    /// call's barrier and bound stick.
    pub fn seal(&self, barrier: OpGroup, upper_bound: CommitLogPosition) {
        let _ = self.barrier.set(barrier);
        let _ = self.upper_bound.set(upper_bound);
        trace!(
            generation = self.generation,
            barrier = barrier.seq,
            %upper_bound,
            "write buffer sealed"
        );
    }

    /// True once a barrier has been issued against this buffer.
    pub fn is_sealed(&self) -> bool {
        self.barrier.get().is_some()
    }

    /// Applies a single write to the accumulator.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let delta = key.len() + value.len();
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.insert(key, value);
        }
        self.approximate_size.fetch_add(delta, Ordering::Relaxed);
    }

    /// Point lookup against the accumulator.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Approximate payload bytes accumulated so far.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size.load(Ordering::Relaxed)
    }

    /// Number of distinct keys accumulated.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
