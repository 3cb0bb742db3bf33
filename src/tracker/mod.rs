//! # Tracker Module
//!
//! The **Tracker** owns the authoritative picture of one table's live
//! data: which write buffers and sstables exist right now, which are
//! mid-flush, and which are claimed by a structural operation. It sits
//! on the critical path of reads, writes, flushes and compactions at
//! once, so its design is a single atomically-swappable reference to an
//! immutable [`View`].
//!
//! ## Concurrency Model
//!
//! Readers sample the current view with one atomic load and then work
//! on that snapshot without further coordination. Every mutation is a
//! compare-and-swap of `(permit, transform)` against the view
//! reference: read the current view, check the permit, compute the
//! successor, CAS, retry on interference. Transforms are pure and
//! cheap because contention re-executes them.
//!
//! Claims over sstables never block: [`Tracker::try_modify`] either
//! claims every requested sstable or reports contention immediately.
//!
//! ## Notifications
//!
//! Structural changes are published to subscribers **after** the CAS
//! that made them visible, so a subscriber never observes a "before"
//! state inconsistent with its notification. The subscriber list is
//! copy-on-write; faults thrown by one subscriber are accumulated and
//! surfaced to the mutating caller, never propagated to other
//! subscribers.
//!
//! ## Durability
//!
//! The tracker itself is volatile; crash safety for structural swaps
//! comes from the [obsoletion log](crate::oblog), which is written and
//! fsynced before any file deletion is ordered.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::Descriptor;
use crate::fault::{AccumulatedFaults, FaultChain};
use crate::memtable::{CommitLogPosition, Memtable, OpGroup, WriteOrdering};
use crate::oblog::{ObLogError, ObsoletionLog};
use crate::sstable::{RepairedAt, SSTableError, SSTableHandle};
use crate::transaction::{LifecycleTransaction, OperationKind};
use crate::view::View;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by tracker operations.
#[derive(Debug, ThisError)]
pub enum TrackerError {
    /// View inconsistency — fatal for the owning table.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Obsoletion-log failure; triggers drop recovery.
    #[error("obsoletion log error: {0}")]
    ObLog(#[from] ObLogError),

    /// SSTable handle failure.
    #[error("sstable error: {0}")]
    SSTable(#[from] SSTableError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// One or more faults accumulated by a partially-failing operation.
    #[error("{0}")]
    Faults(#[from] AccumulatedFaults),
}

// ------------------------------------------------------------------------------------------------
// Notifications
// ------------------------------------------------------------------------------------------------

/// Structural change notifications, published after the CAS that made
/// the change visible. A closed sum — subscribers match on kind.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Bulk insert at startup.
    InitialAdded { added: Vec<SSTableHandle> },

    /// New sstables entered the live set.
    Added {
        added: Vec<SSTableHandle>,
        op: OperationKind,
    },

    /// An atomic swap: `added` replaced `removed`.
    Changed {
        added: Vec<SSTableHandle>,
        removed: Vec<SSTableHandle>,
        op: OperationKind,
        op_id: Uuid,
    },

    /// Repair status of the given sstables was rewritten.
    RepairStatusChanged { sstables: Vec<SSTableHandle> },

    /// An sstable's files are about to be deleted.
    Deleting { descriptor: Descriptor },

    /// The table was truncated at the given commit-log position.
    Truncated { position: CommitLogPosition },

    /// Buffer switched because of truncation.
    BufferRenewed { buffer: Arc<Memtable> },

    /// Buffer switched in the normal write path.
    BufferSwitched { buffer: Arc<Memtable> },

    /// A flushed buffer left the view.
    BufferDiscarded { buffer: Arc<Memtable> },
}

/// Receives [`Notification`]s. Implementations must be cheap — delivery
/// happens synchronously on the mutating thread.
pub trait Subscriber: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Receives descriptors of freshly added sstables for incremental
/// backup bookkeeping.
pub trait BackupSink: Send + Sync {
    fn sstable_added(&self, descriptor: &Descriptor);
}

// ------------------------------------------------------------------------------------------------
// Tracker core
// ------------------------------------------------------------------------------------------------

/// Owner of the current [`View`] and of all transitions between views.
pub struct Tracker {
    /// Keyspace this table belongs to.
    keyspace: String,

    /// Table name.
    table: String,

    /// Directory holding the table's sstables and obsoletion logs.
    table_dir: PathBuf,

    /// The single shared mutable cell: the current view.
    view: ArcSwap<View>,

    /// Copy-on-write subscriber list.
    subscribers: ArcSwap<Vec<Arc<dyn Subscriber>>>,

    /// Optional incremental-backup hook.
    backup: Mutex<Option<Arc<dyn BackupSink>>>,

    /// Write-group issue counter for buffer barriers.
    ordering: WriteOrdering,

    /// Next buffer generation.
    next_generation: AtomicU64,

    /// Sum of live sstable bytes, maintained by deltas.
    live_bytes: AtomicI64,

    /// Cleared when the owning table loses its schema entry.
    valid: AtomicBool,
}

impl Tracker {
    /// Creates a tracker for `<keyspace>.<table>` rooted at `table_dir`,
    /// with one fresh write buffer and an empty live set.
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        table_dir: impl Into<PathBuf>,
    ) -> Arc<Tracker> {
        let initial = Arc::new(Memtable::new(1, CommitLogPosition::NONE));
        Arc::new(Tracker {
            keyspace: keyspace.into(),
            table: table.into(),
            table_dir: table_dir.into(),
            view: ArcSwap::from_pointee(View::new(initial)),
            subscribers: ArcSwap::from_pointee(Vec::new()),
            backup: Mutex::new(None),
            ordering: WriteOrdering::new(),
            next_generation: AtomicU64::new(2),
            live_bytes: AtomicI64::new(0),
            valid: AtomicBool::new(true),
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// Samples the current view. One atomic load; the returned snapshot
    /// stays valid (and consistent) for as long as the caller holds it.
    pub fn view(&self) -> Arc<View> {
        self.view.load_full()
    }

    /// Sum of live sstable bytes.
    pub fn live_bytes(&self) -> i64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// The write-ordering authority for this table.
    pub fn ordering(&self) -> &WriteOrdering {
        &self.ordering
    }

    /// True while the owning table still has a valid schema entry.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Marks the owning table as dropped from the schema.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
        info!(keyspace = %self.keyspace, table = %self.table, "table invalidated");
    }

    // --------------------------------------------------------------------
    // The CAS primitive
    // --------------------------------------------------------------------

    /// Applies `(permit, transform)` against the view reference.
    ///
    /// Loop: load the current view; if the permit rejects it, return
    /// `None`; otherwise CAS in `transform(view)` and return the
    /// `(before, after)` pair, retrying on interference. `transform`
    /// must be pure and cheap — it may run several times.
    pub(crate) fn apply<P, T>(&self, permit: P, transform: T) -> Option<(Arc<View>, Arc<View>)>
    where
        P: Fn(&View) -> bool,
        T: Fn(&View) -> View,
    {
        let mut current = self.view.load_full();
        loop {
            if !permit(&current) {
                return None;
            }
            let next = Arc::new(transform(&current));
            let previous = self.view.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                return Some((current, next));
            }
            current = arc_swap::Guard::into_inner(previous);
        }
    }

    /// [`Tracker::apply`] with an always-true permit; cannot fail.
    pub(crate) fn apply_always<T>(&self, transform: T) -> (Arc<View>, Arc<View>)
    where
        T: Fn(&View) -> View,
    {
        let mut current = self.view.load_full();
        loop {
            let next = Arc::new(transform(&current));
            let previous = self.view.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                return (current, next);
            }
            current = arc_swap::Guard::into_inner(previous);
        }
    }

    // --------------------------------------------------------------------
    // Structural claims
    // --------------------------------------------------------------------

    /// Opens a lifecycle transaction over `sstables` iff none of them is
    /// already claimed. Returns `None` on contention — the claim never
    /// blocks, callers retry with their own policy.
    ///
    /// An empty input yields a trivial transaction with nothing claimed.
    pub fn try_modify(
        self: &Arc<Self>,
        sstables: Vec<SSTableHandle>,
        op: OperationKind,
    ) -> Option<LifecycleTransaction> {
        self.try_modify_with_id(sstables, op, Uuid::new_v4())
    }

    /// [`Tracker::try_modify`] with a caller-chosen transaction id.
    pub fn try_modify_with_id(
        self: &Arc<Self>,
        sstables: Vec<SSTableHandle>,
        op: OperationKind,
        id: Uuid,
    ) -> Option<LifecycleTransaction> {
        let requested: Vec<Descriptor> =
            sstables.iter().map(|s| s.descriptor().clone()).collect();

        if !requested.is_empty() {
            self.apply(
                |v| v.permit_compacting(&requested),
                |v| v.update_compacting(&[], &requested),
            )?;
            debug!(op = %op, id = %id, claimed = requested.len(), "sstables claimed");
        }

        Some(LifecycleTransaction::new(Arc::clone(self), id, op, sstables))
    }

    /// Releases claimed descriptors without touching the live set.
    pub(crate) fn release_compacting(&self, descriptors: &[Descriptor]) {
        if descriptors.is_empty() {
            return;
        }
        self.apply_always(|v| v.update_compacting(descriptors, &[]));
    }

    // --------------------------------------------------------------------
    // Write buffers
    // --------------------------------------------------------------------

    /// Creates the next write buffer (generation assigned monotonically)
    /// accepting writes from `lower_bound` onwards.
    pub fn new_buffer(&self, lower_bound: CommitLogPosition) -> Arc<Memtable> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        Arc::new(Memtable::new(generation, lower_bound))
    }

    /// The oldest live buffer willing to take a write in `op_group`
    /// ordered at `position`.
    pub fn current_buffer(
        &self,
        op_group: OpGroup,
        position: CommitLogPosition,
    ) -> Result<Arc<Memtable>, TrackerError> {
        let view = self.view.load();
        for buffer in view.live_buffers() {
            if buffer.accepts(op_group, position) {
                return Ok(Arc::clone(buffer));
            }
        }
        Err(TrackerError::Invariant(format!(
            "no live buffer accepts group {} at {}",
            op_group.seq(),
            position
        )))
    }

    /// Atomically appends `new_buffer` as the write target and seals the
    /// previous one. Returns the previous target.
    ///
    /// Emits [`Notification::BufferRenewed`] when `truncating`, else
    /// [`Notification::BufferSwitched`].
    pub fn switch_buffer(
        &self,
        truncating: bool,
        new_buffer: Arc<Memtable>,
    ) -> Result<Arc<Memtable>, TrackerError> {
        let upper_bound = new_buffer.lower_bound();
        let (before, _) = self.apply_always(|v| v.switch_buffer(Arc::clone(&new_buffer)));

        let previous = before.current_buffer().cloned().ok_or_else(|| {
            TrackerError::Invariant("view had no write target before switch".into())
        })?;
        previous.seal(self.ordering.issue_barrier(), upper_bound);

        info!(
            from = previous.generation(),
            to = new_buffer.generation(),
            truncating,
            "write buffer switched"
        );

        let notification = if truncating {
            Notification::BufferRenewed {
                buffer: Arc::clone(&new_buffer),
            }
        } else {
            Notification::BufferSwitched {
                buffer: Arc::clone(&new_buffer),
            }
        };
        // The switch itself is done; subscriber faults must not cost
        // the caller its handle on the previous buffer.
        let mut faults = FaultChain::new();
        self.publish(&notification, &mut faults);

        Ok(previous)
    }

    /// Moves `buffer` from the live list to the flushing set.
    pub fn mark_flushing(&self, buffer: &Arc<Memtable>) {
        self.apply_always(|v| v.mark_flushing(buffer));
        debug!(generation = buffer.generation(), "buffer marked flushing");
    }

    /// Atomically replaces a flushed buffer with its outputs: the buffer
    /// leaves the flushing set, `outputs` (possibly empty) enter the
    /// live set, size metrics update, and `Added` + `BufferDiscarded`
    /// notifications fire. Partial failures are accumulated and raised
    /// once at the end.
    pub fn replace_flushed(
        &self,
        buffer: &Arc<Memtable>,
        outputs: Vec<SSTableHandle>,
        op_id: Option<Uuid>,
    ) -> Result<(), TrackerError> {
        self.apply_always(|v| v.replace_flushed(buffer, &outputs));

        let added: i64 = outputs.iter().map(|s| s.size_bytes() as i64).sum();
        self.live_bytes.fetch_add(added, Ordering::Relaxed);

        info!(
            generation = buffer.generation(),
            outputs = outputs.len(),
            bytes = added,
            op_id = ?op_id,
            "flushed buffer replaced"
        );

        let mut faults = FaultChain::new();
        self.backup_new_sstables(&outputs);
        if !outputs.is_empty() {
            self.publish(
                &Notification::Added {
                    added: outputs,
                    op: OperationKind::Flush,
                },
                &mut faults,
            );
        }
        self.publish(
            &Notification::BufferDiscarded {
                buffer: Arc::clone(buffer),
            },
            &mut faults,
        );

        Ok(faults.into_result()?)
    }

    // --------------------------------------------------------------------
    // Adding sstables
    // --------------------------------------------------------------------

    /// Bulk insert at startup: no backup bookkeeping, `InitialAdded`
    /// notification.
    pub fn add_initial_sstables(
        &self,
        sstables: Vec<SSTableHandle>,
    ) -> Result<(), TrackerError> {
        self.add_internal(sstables, None, true)
    }

    /// Inserts sstables produced outside the flush path (streaming,
    /// imports): backup bookkeeping plus an `Added` notification.
    pub fn add_sstables(
        &self,
        sstables: Vec<SSTableHandle>,
        op: OperationKind,
    ) -> Result<(), TrackerError> {
        self.add_internal(sstables, Some(op), false)
    }

    fn add_internal(
        &self,
        sstables: Vec<SSTableHandle>,
        op: Option<OperationKind>,
        initial: bool,
    ) -> Result<(), TrackerError> {
        if sstables.is_empty() {
            return Ok(());
        }

        self.apply_always(|v| v.update_live_set(&[], &sstables));

        let added: i64 = sstables.iter().map(|s| s.size_bytes() as i64).sum();
        self.live_bytes.fetch_add(added, Ordering::Relaxed);

        info!(count = sstables.len(), bytes = added, initial, "sstables added");

        let mut faults = FaultChain::new();
        if !initial {
            self.backup_new_sstables(&sstables);
        }
        let notification = if initial {
            Notification::InitialAdded { added: sstables }
        } else {
            Notification::Added {
                added: sstables,
                op: op.unwrap_or(OperationKind::Unknown),
            }
        };
        self.publish(&notification, &mut faults);

        Ok(faults.into_result()?)
    }

    // --------------------------------------------------------------------
    // Dropping sstables
    // --------------------------------------------------------------------

    /// Drops every non-compacting live sstable matching `predicate`:
    /// stage the obsoletion, fsync the log, release the view's
    /// references, publish the change.
    ///
    /// On failure before the log commits, the obsoletion is rolled
    /// back: the sstables are restored to the live set while the table
    /// is still schema-valid; otherwise the change notification is
    /// still published so downstream bookkeeping converges.
    ///
    /// Returns the descriptors that were dropped.
    pub fn drop_sstables(
        &self,
        predicate: impl Fn(&SSTableHandle) -> bool,
        op: OperationKind,
    ) -> Result<Vec<Descriptor>, TrackerError> {
        let op_id = Uuid::new_v4();

        // 1. Open the obsoletion log.
        let log = ObsoletionLog::create(&self.table_dir, op.as_str(), op_id)?;

        // 2. CAS the matching, unclaimed sstables out of the live set.
        let (before, after) = self.apply_always(|v| {
            let doomed: Vec<Descriptor> = v
                .live_sstables()
                .filter(|s| predicate(s) && !v.is_compacting(s.descriptor()))
                .map(|s| s.descriptor().clone())
                .collect();
            v.update_live_set(&doomed, &[])
        });

        let removed: Vec<SSTableHandle> = before
            .live_sstables()
            .filter(|s| !after.is_live(s.descriptor()))
            .cloned()
            .collect();

        if removed.is_empty() {
            // Nothing matched: no notification, no committed log.
            log.abort()?;
            return Ok(Vec::new());
        }

        // 3–4. Record and durably commit the obsoletion.
        let staged = (|| -> Result<(), ObLogError> {
            for sstable in &removed {
                log.record_remove(sstable.descriptor())?;
            }
            log.commit()
        })();

        if let Err(e) = staged {
            return Err(self.recover_failed_drop(&removed, op, op_id, &log, e));
        }

        // 5. Mark obsolete — files disappear when the last reference
        //    drops, the log file after that.
        let completion = log.completion();
        let mut faults = FaultChain::new();
        for sstable in &removed {
            self.publish(
                &Notification::Deleting {
                    descriptor: sstable.descriptor().clone(),
                },
                &mut faults,
            );
            sstable.mark_obsolete(Some(Arc::clone(&completion)));
        }

        // 6. Size counters.
        let delta: i64 = removed.iter().map(|s| s.size_bytes() as i64).sum();
        self.live_bytes.fetch_sub(delta, Ordering::Relaxed);

        let descriptors: Vec<Descriptor> =
            removed.iter().map(|s| s.descriptor().clone()).collect();

        info!(op = %op, op_id = %op_id, count = descriptors.len(), bytes = delta, "sstables dropped");

        // 7–8. Release our references and publish the change.
        self.publish(
            &Notification::Changed {
                added: Vec::new(),
                removed,
                op,
                op_id,
            },
            &mut faults,
        );

        faults.into_result()?;
        Ok(descriptors)
    }

    /// Rollback half of the drop protocol: abort the log, then either
    /// restore the live set (table still valid) or still announce the
    /// removal so downstream catalogs converge.
    fn recover_failed_drop(
        &self,
        removed: &[SSTableHandle],
        op: OperationKind,
        op_id: Uuid,
        log: &ObsoletionLog,
        cause: ObLogError,
    ) -> TrackerError {
        warn!(op = %op, op_id = %op_id, error = %cause, "obsoletion failed, recovering");

        let mut faults = FaultChain::new();
        faults.push("stage obsoletion", cause);
        faults.run("abort obsoletion log", || log.abort());

        if self.is_valid() {
            self.apply_always(|v| v.update_live_set(&[], removed));
            debug!(count = removed.len(), "restored sstables after failed drop");
        } else {
            self.publish(
                &Notification::Changed {
                    added: Vec::new(),
                    removed: removed.to_vec(),
                    op,
                    op_id,
                },
                &mut faults,
            );
        }

        match faults.into_result() {
            Ok(()) => TrackerError::Invariant("drop recovery lost its own fault".into()),
            Err(accumulated) => TrackerError::Faults(accumulated),
        }
    }

    /// Removes every non-compacting sstable from the view **without**
    /// deleting files or writing an obsoletion log.
    pub fn unload_sstables(&self) {
        let (before, after) = self.apply_always(|v| {
            let unloaded: Vec<Descriptor> = v
                .live_sstables()
                .filter(|s| !v.is_compacting(s.descriptor()))
                .map(|s| s.descriptor().clone())
                .collect();
            v.update_live_set(&unloaded, &[])
        });

        let delta: i64 = before
            .live_sstables()
            .filter(|s| !after.is_live(s.descriptor()))
            .map(|s| s.size_bytes() as i64)
            .sum();
        self.live_bytes.fetch_sub(delta, Ordering::Relaxed);

        info!(bytes = delta, "sstables unloaded");
    }

    /// Drops all sstables living under `directory` (disk-error
    /// quarantine path).
    pub fn remove_unreadable(&self, directory: &Path) -> Result<Vec<Descriptor>, TrackerError> {
        let directory = directory.to_path_buf();
        self.drop_sstables(
            move |s| s.descriptor().directory == directory,
            OperationKind::RemoveUnreadable,
        )
    }

    /// Shutdown hook: deletes files when the owning table lost its
    /// schema entry, otherwise releases references and keeps files.
    pub fn drop_or_unload_sstables_if_invalid(&self) -> Result<(), TrackerError> {
        if self.is_valid() {
            self.unload_sstables();
            Ok(())
        } else {
            self.drop_sstables(|_| true, OperationKind::Drop)?;
            Ok(())
        }
    }

    // --------------------------------------------------------------------
    // Repair status
    // --------------------------------------------------------------------

    /// Rewrites the repair timestamp on the given sstables and notifies
    /// subscribers.
    pub fn mutate_repair_status(
        &self,
        sstables: &[SSTableHandle],
        repaired_at: RepairedAt,
    ) -> Result<(), TrackerError> {
        for sstable in sstables {
            sstable.set_repaired_at(repaired_at);
        }

        let mut faults = FaultChain::new();
        self.publish(
            &Notification::RepairStatusChanged {
                sstables: sstables.to_vec(),
            },
            &mut faults,
        );
        Ok(faults.into_result()?)
    }

    // --------------------------------------------------------------------
    // Notifications
    // --------------------------------------------------------------------

    /// Registers a subscriber (copy-on-write append).
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&subscriber));
            next
        });
    }

    /// Removes a subscriber by identity.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| !Arc::ptr_eq(s, subscriber))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Announces a truncation point to subscribers.
    pub fn notify_truncated(&self, position: CommitLogPosition) -> Result<(), TrackerError> {
        let mut faults = FaultChain::new();
        self.publish(&Notification::Truncated { position }, &mut faults);
        Ok(faults.into_result()?)
    }

    /// Delivers one notification to every subscriber. Faults are
    /// recorded in `faults` and never interrupt the pass.
    pub(crate) fn publish(&self, notification: &Notification, faults: &mut FaultChain) {
        let subscribers = self.subscribers.load();
        for subscriber in subscribers.iter() {
            if let Err(e) = subscriber.notify(notification) {
                warn!(error = %e, "subscriber failed");
                faults.push("notify subscriber", e);
            }
        }
    }

    // --------------------------------------------------------------------
    // Backup hook
    // --------------------------------------------------------------------

    /// Installs the incremental-backup sink.
    pub fn set_backup_sink(&self, sink: Arc<dyn BackupSink>) {
        let mut slot = self.backup.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(sink);
    }

    fn backup_new_sstables(&self, sstables: &[SSTableHandle]) {
        let sink = {
            let slot = self.backup.lock().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        if let Some(sink) = sink {
            for sstable in sstables {
                sink.sstable_added(sstable.descriptor());
            }
        }
    }

    /// Adjusts the live-bytes counter by `delta`. Transaction-internal.
    pub(crate) fn adjust_live_bytes(&self, delta: i64) {
        self.live_bytes.fetch_add(delta, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("keyspace", &self.keyspace)
            .field("table", &self.table)
            .field("table_dir", &self.table_dir)
            .field("live_bytes", &self.live_bytes.load(Ordering::Relaxed))
            .field("valid", &self.valid.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
