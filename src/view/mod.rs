//! # View Module
//!
//! A **View** is one immutable snapshot of a table's live state: the
//! ordered write buffers, the buffers being flushed, the readable
//! sstables, the subset currently claimed by a structural operation,
//! and a spatial index over sstable key ranges for read-path pruning.
//!
//! Views are pure values. Every "setter" returns a fresh `View`; the
//! tracker swaps whole snapshots atomically and readers keep using
//! whichever snapshot they sampled, unsynchronised. Because transforms
//! may be re-executed under CAS contention, all of them are cheap,
//! allocation-bounded, and free of side effects.
//!
//! ## Invariants
//!
//! For every observable view:
//!
//! - `compacting ⊆ live ∪ staged-for-swap-in` (the tracker only claims
//!   descriptors it can see),
//! - no descriptor is claimed by two transactions at once (enforced by
//!   [`View::permit_compacting`] under the tracker's CAS),
//! - `live_buffers` is totally ordered by generation, the last being
//!   the current write target,
//! - the interval index always describes exactly `live_sstables`.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use crate::descriptor::Descriptor;
use crate::memtable::Memtable;
use crate::sstable::SSTableHandle;

// ------------------------------------------------------------------------------------------------
// Interval index
// ------------------------------------------------------------------------------------------------

/// Static index over the live sstables' key intervals.
///
/// Entries are sorted by interval start; lookups binary-search the
/// upper bound and filter the prefix. Rebuilt wholesale whenever the
/// live set changes — the index is part of the immutable snapshot, so
/// it can never drift from `live_sstables`.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    /// Handles sorted by `interval().min`.
    entries: Vec<SSTableHandle>,
}

impl IntervalIndex {
    fn build<'a>(sstables: impl Iterator<Item = &'a SSTableHandle>) -> Self {
        let mut entries: Vec<SSTableHandle> = sstables.cloned().collect();
        entries.sort_by(|a, b| a.interval().min.cmp(&b.interval().min));
        Self { entries }
    }

    /// All live sstables whose interval intersects `[start, end]`.
    pub fn overlapping(&self, start: &[u8], end: &[u8]) -> Vec<SSTableHandle> {
        // Entries are sorted by min; anything starting past `end`
        // cannot overlap.
        let upper = self
            .entries
            .partition_point(|s| s.interval().min.as_slice() <= end);
        self.entries[..upper]
            .iter()
            .filter(|s| s.interval().max.as_slice() >= start)
            .cloned()
            .collect()
    }

    /// All live sstables that may contain `key`.
    pub fn containing(&self, key: &[u8]) -> Vec<SSTableHandle> {
        self.overlapping(key, key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// View core
// ------------------------------------------------------------------------------------------------

/// Immutable snapshot of a single table's live state.
#[derive(Debug, Clone)]
pub struct View {
    /// Ordered live buffers; index 0 is oldest, the last is the current
    /// write target.
    live_buffers: Vec<Arc<Memtable>>,

    /// Buffers sealed against new writes but not yet replaced by their
    /// flush outputs. Ordered by generation.
    flushing_buffers: Vec<Arc<Memtable>>,

    /// Sstables presently readable, keyed by descriptor.
    live_sstables: BTreeMap<Descriptor, SSTableHandle>,

    /// Descriptors claimed by an active lifecycle transaction.
    compacting: BTreeSet<Descriptor>,

    /// Spatial index over `live_sstables`.
    interval_index: IntervalIndex,
}

impl View {
    /// The initial view: one empty write buffer, nothing on disk.
    pub fn new(initial_buffer: Arc<Memtable>) -> Self {
        Self {
            live_buffers: vec![initial_buffer],
            flushing_buffers: Vec::new(),
            live_sstables: BTreeMap::new(),
            compacting: BTreeSet::new(),
            interval_index: IntervalIndex::default(),
        }
    }

    // --------------------------------------------------------------------
    // Read accessors
    // --------------------------------------------------------------------

    pub fn live_buffers(&self) -> &[Arc<Memtable>] {
        &self.live_buffers
    }

    /// The buffer currently accepting unconditioned writes.
    pub fn current_buffer(&self) -> Option<&Arc<Memtable>> {
        self.live_buffers.last()
    }

    pub fn flushing_buffers(&self) -> &[Arc<Memtable>] {
        &self.flushing_buffers
    }

    pub fn live_sstables(&self) -> impl Iterator<Item = &SSTableHandle> {
        self.live_sstables.values()
    }

    pub fn live_count(&self) -> usize {
        self.live_sstables.len()
    }

    pub fn get(&self, descriptor: &Descriptor) -> Option<&SSTableHandle> {
        self.live_sstables.get(descriptor)
    }

    pub fn is_live(&self, descriptor: &Descriptor) -> bool {
        self.live_sstables.contains_key(descriptor)
    }

    pub fn compacting(&self) -> &BTreeSet<Descriptor> {
        &self.compacting
    }

    pub fn is_compacting(&self, descriptor: &Descriptor) -> bool {
        self.compacting.contains(descriptor)
    }

    pub fn interval_index(&self) -> &IntervalIndex {
        &self.interval_index
    }

    /// Sum of live sstable sizes, in bytes.
    pub fn live_bytes(&self) -> u64 {
        self.live_sstables.values().map(|s| s.size_bytes()).sum()
    }

    // --------------------------------------------------------------------
    // Functional constructors — live set
    // --------------------------------------------------------------------

    /// `live := (live \ remove) ∪ add`, with the interval index rebuilt.
    ///
    /// Best-effort sanity: removals not in the live set are logged and
    /// skipped; additions already live are logged and overwritten.
    pub fn update_live_set(&self, remove: &[Descriptor], add: &[SSTableHandle]) -> View {
        let mut live = self.live_sstables.clone();

        for d in remove {
            if live.remove(d).is_none() {
                warn!(descriptor = %d, "removing sstable not in live set");
            }
        }
        for handle in add {
            let d = handle.descriptor().clone();
            if live.insert(d.clone(), Arc::clone(handle)).is_some() {
                warn!(descriptor = %d, "adding sstable already in live set");
            }
        }

        let interval_index = IntervalIndex::build(live.values());
        View {
            live_buffers: self.live_buffers.clone(),
            flushing_buffers: self.flushing_buffers.clone(),
            live_sstables: live,
            compacting: self.compacting.clone(),
            interval_index,
        }
    }

    // --------------------------------------------------------------------
    // Functional constructors — compacting set
    // --------------------------------------------------------------------

    /// `compacting := (compacting \ remove) ∪ add`.
    pub fn update_compacting(&self, remove: &[Descriptor], add: &[Descriptor]) -> View {
        let mut compacting = self.compacting.clone();
        for d in remove {
            compacting.remove(d);
        }
        for d in add {
            compacting.insert(d.clone());
        }

        View {
            live_buffers: self.live_buffers.clone(),
            flushing_buffers: self.flushing_buffers.clone(),
            live_sstables: self.live_sstables.clone(),
            compacting,
            interval_index: self.interval_index.clone(),
        }
    }

    /// True iff none of `xs` is currently claimed.
    pub fn permit_compacting(&self, xs: &[Descriptor]) -> bool {
        xs.iter().all(|d| !self.compacting.contains(d))
    }

    // --------------------------------------------------------------------
    // Functional constructors — buffers
    // --------------------------------------------------------------------

    /// Appends `new_buffer` as the write target.
    pub fn switch_buffer(&self, new_buffer: Arc<Memtable>) -> View {
        let mut live_buffers = self.live_buffers.clone();
        debug_assert!(
            live_buffers
                .last()
                .is_none_or(|b| b.generation() < new_buffer.generation()),
            "buffer generations must be monotonic"
        );
        live_buffers.push(new_buffer);

        View {
            live_buffers,
            flushing_buffers: self.flushing_buffers.clone(),
            live_sstables: self.live_sstables.clone(),
            compacting: self.compacting.clone(),
            interval_index: self.interval_index.clone(),
        }
    }

    /// Moves `buffer` from the live list to the flushing set.
    pub fn mark_flushing(&self, buffer: &Arc<Memtable>) -> View {
        let generation = buffer.generation();
        let mut live_buffers = self.live_buffers.clone();
        live_buffers.retain(|b| b.generation() != generation);

        let mut flushing_buffers = self.flushing_buffers.clone();
        flushing_buffers.push(Arc::clone(buffer));
        flushing_buffers.sort_by_key(|b| b.generation());

        View {
            live_buffers,
            flushing_buffers,
            live_sstables: self.live_sstables.clone(),
            compacting: self.compacting.clone(),
            interval_index: self.interval_index.clone(),
        }
    }

    /// Removes `buffer` from the flushing set and inserts its flush
    /// outputs into the live set.
    pub fn replace_flushed(&self, buffer: &Arc<Memtable>, outputs: &[SSTableHandle]) -> View {
        let generation = buffer.generation();
        let mut next = self.update_live_set(&[], outputs);
        next.flushing_buffers
            .retain(|b| b.generation() != generation);
        next
    }

    // --------------------------------------------------------------------
    // Consistency
    // --------------------------------------------------------------------

    /// Structural self-check used by tests and debug assertions.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for pair in self.live_buffers.windows(2) {
            if pair[0].generation() >= pair[1].generation() {
                return Err(format!(
                    "live buffers out of order: {} then {}",
                    pair[0].generation(),
                    pair[1].generation()
                ));
            }
        }

        if self.interval_index.len() != self.live_sstables.len() {
            return Err(format!(
                "interval index has {} entries for {} live sstables",
                self.interval_index.len(),
                self.live_sstables.len()
            ));
        }

        Ok(())
    }
}
