//! # Lifecycle Transaction Module
//!
//! A **lifecycle transaction** is a scoped, uniquely-identified claim
//! over a set of sstables for one named operation — compaction, drop,
//! scrub. The owning worker stages replacement outputs against it and
//! then either commits (inputs atomically swapped for outputs, the
//! swap made durable in the obsoletion log) or aborts (claims released,
//! staged outputs destroyed, live set untouched).
//!
//! ## Scoped acquisition
//!
//! Exactly one of commit/abort happens by the time the transaction goes
//! out of scope, on every exit path including panic: `Drop` aborts an
//! open transaction. Commit is idempotent — a second call is a no-op.
//!
//! ## Ordering
//!
//! Commit writes and fsyncs the obsoletion log **before** the CAS that
//! publishes the swap, and marks originals obsolete only after it. A
//! crash on either side of the marker therefore recovers to exactly one
//! of the two legal outcomes (all-old or all-new).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::descriptor::Descriptor;
use crate::fault::FaultChain;
use crate::oblog::ObsoletionLog;
use crate::sstable::SSTableHandle;
use crate::tracker::{Notification, Tracker, TrackerError};

// ------------------------------------------------------------------------------------------------
// Operation kinds
// ------------------------------------------------------------------------------------------------

/// The named structural operations a transaction can run under. Tags
/// appear in obsoletion-log filenames and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Flush,
    Compaction,
    Cleanup,
    Scrub,
    Upgrade,
    Drop,
    Truncate,
    Unload,
    RemoveUnreadable,
    Unknown,
}

impl OperationKind {
    /// Lowercase tag used in obsoletion-log filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Flush => "flush",
            OperationKind::Compaction => "compaction",
            OperationKind::Cleanup => "cleanup",
            OperationKind::Scrub => "scrub",
            OperationKind::Upgrade => "upgrade",
            OperationKind::Drop => "drop",
            OperationKind::Truncate => "truncate",
            OperationKind::Unload => "unload",
            OperationKind::RemoveUnreadable => "remove-unreadable",
            OperationKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// Transaction state
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    Aborted,
}

// ------------------------------------------------------------------------------------------------
// Lifecycle transaction core
// ------------------------------------------------------------------------------------------------

/// A scoped claim over `originals` plus the outputs staged to replace
/// them. Obtained from [`Tracker::try_modify`].
pub struct LifecycleTransaction {
    tracker: Arc<Tracker>,
    id: Uuid,
    op: OperationKind,
    originals: Vec<SSTableHandle>,
    staged: Vec<SSTableHandle>,
    obsolete_originals: bool,
    log: Option<ObsoletionLog>,
    state: TxState,
}

impl LifecycleTransaction {
    /// Tracker-internal constructor; the compacting claim has already
    /// been CAS'd in by the caller.
    pub(crate) fn new(
        tracker: Arc<Tracker>,
        id: Uuid,
        op: OperationKind,
        originals: Vec<SSTableHandle>,
    ) -> Self {
        Self {
            tracker,
            id,
            op,
            originals,
            staged: Vec::new(),
            obsolete_originals: false,
            log: None,
            state: TxState::Open,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn op(&self) -> OperationKind {
        self.op
    }

    pub fn originals(&self) -> &[SSTableHandle] {
        &self.originals
    }

    pub fn staged(&self) -> &[SSTableHandle] {
        &self.staged
    }

    fn original_descriptors(&self) -> Vec<Descriptor> {
        self.originals
            .iter()
            .map(|s| s.descriptor().clone())
            .collect()
    }

    /// Opens the obsoletion log on first use. Trivial transactions that
    /// never stage or obsolete anything never touch disk.
    fn log(&mut self) -> Result<&ObsoletionLog, TrackerError> {
        if self.log.is_none() {
            let log = ObsoletionLog::create(self.tracker.table_dir(), self.op.as_str(), self.id)?;
            self.log = Some(log);
        }
        match self.log.as_ref() {
            Some(log) => Ok(log),
            None => Err(TrackerError::Invariant("log vanished after create".into())),
        }
    }

    fn ensure_open(&self) -> Result<(), TrackerError> {
        match self.state {
            TxState::Open => Ok(()),
            other => Err(TrackerError::Invariant(format!(
                "transaction {} already {:?}",
                self.id, other
            ))),
        }
    }

    // --------------------------------------------------------------------
    // Staging
    // --------------------------------------------------------------------

    /// Stages one replacement output. Never alters the live view; the
    /// output becomes visible only at commit.
    pub fn update(&mut self, sstable: SSTableHandle) -> Result<(), TrackerError> {
        self.ensure_open()?;
        self.log()?.record_add(sstable.descriptor())?;
        debug!(id = %self.id, descriptor = %sstable.descriptor(), "output staged");
        self.staged.push(sstable);
        Ok(())
    }

    /// Stages a batch of replacement outputs.
    pub fn update_all(
        &mut self,
        sstables: impl IntoIterator<Item = SSTableHandle>,
    ) -> Result<(), TrackerError> {
        for sstable in sstables {
            self.update(sstable)?;
        }
        Ok(())
    }

    /// Declares that commit replaces the originals: they leave the live
    /// set and their files are deleted once unreferenced.
    pub fn obsolete_originals(&mut self) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if self.obsolete_originals {
            return Ok(());
        }

        let descriptors = self.original_descriptors();
        let log = self.log()?;
        for descriptor in &descriptors {
            log.record_remove(descriptor)?;
        }
        self.obsolete_originals = true;
        Ok(())
    }

    /// Fsyncs the obsoletion log so staged progress survives a crash.
    pub fn checkpoint(&self) -> Result<(), TrackerError> {
        if let Some(log) = &self.log {
            log.checkpoint()?;
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Commit / abort
    // --------------------------------------------------------------------

    /// Atomically swaps originals for staged outputs.
    ///
    /// Steps: durably commit the obsoletion log; CAS
    /// `live := (live \ obsoleted-originals) ∪ staged` and
    /// `compacting := compacting \ originals`; mark originals obsolete;
    /// update size counters; release references; publish `Changed`.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn commit(&mut self) -> Result<(), TrackerError> {
        match self.state {
            TxState::Committed => return Ok(()),
            TxState::Aborted => {
                return Err(TrackerError::Invariant(format!(
                    "commit of aborted transaction {}",
                    self.id
                )));
            }
            TxState::Open => {}
        }

        // Durability first: after this fsync a crash resolves to the
        // new outputs.
        if let Some(log) = &self.log {
            log.commit()?;
        }

        let removed_descriptors = if self.obsolete_originals {
            self.original_descriptors()
        } else {
            Vec::new()
        };
        let claimed = self.original_descriptors();
        let staged = std::mem::take(&mut self.staged);
        let originals = std::mem::take(&mut self.originals);

        self.tracker.apply_always(|v| {
            v.update_live_set(&removed_descriptors, &staged)
                .update_compacting(&claimed, &[])
        });

        let mut faults = FaultChain::new();
        let mut delta: i64 = staged.iter().map(|s| s.size_bytes() as i64).sum();

        if self.obsolete_originals {
            let completion = self.log.as_ref().map(|l| l.completion());
            for original in &originals {
                self.tracker.publish(
                    &Notification::Deleting {
                        descriptor: original.descriptor().clone(),
                    },
                    &mut faults,
                );
                original.mark_obsolete(completion.clone());
                delta -= original.size_bytes() as i64;
            }
        }
        self.tracker.adjust_live_bytes(delta);

        info!(
            id = %self.id,
            op = %self.op,
            staged = staged.len(),
            removed = removed_descriptors.len(),
            bytes_delta = delta,
            "transaction committed"
        );

        let removed_for_notification = if self.obsolete_originals {
            originals
        } else {
            Vec::new()
        };
        if !staged.is_empty() || !removed_for_notification.is_empty() {
            self.tracker.publish(
                &Notification::Changed {
                    added: staged,
                    removed: removed_for_notification,
                    op: self.op,
                    op_id: self.id,
                },
                &mut faults,
            );
        }

        self.state = TxState::Committed;
        Ok(faults.into_result()?)
    }

    /// Releases the claim without touching the live set. Staged outputs
    /// that were already written are obsoleted on disk via the log.
    /// Idempotent on aborted transactions.
    pub fn abort(&mut self) -> Result<(), TrackerError> {
        match self.state {
            TxState::Aborted => return Ok(()),
            TxState::Committed => {
                return Err(TrackerError::Invariant(format!(
                    "abort of committed transaction {}",
                    self.id
                )));
            }
            TxState::Open => {}
        }

        let claimed = self.original_descriptors();
        self.tracker.release_compacting(&claimed);

        let staged = std::mem::take(&mut self.staged);
        let mut faults = FaultChain::new();

        if let Some(log) = &self.log {
            faults.run("abort obsoletion log", || log.abort());
            let completion = log.completion();
            for sstable in &staged {
                sstable.mark_obsolete(Some(Arc::clone(&completion)));
            }
        }
        // Dropping `staged` here deletes any written outputs — we hold
        // the only references.
        drop(staged);
        self.originals.clear();

        info!(id = %self.id, op = %self.op, "transaction aborted");

        self.state = TxState::Aborted;
        Ok(faults.into_result()?)
    }

    /// Closes the transaction: aborts unless commit or abort already
    /// ran. Called automatically on drop.
    pub fn close(&mut self) -> Result<(), TrackerError> {
        if self.state == TxState::Open {
            self.abort()
        } else {
            Ok(())
        }
    }
}

impl Drop for LifecycleTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Open {
            if let Err(e) = self.abort() {
                error!(id = %self.id, error = %e, "transaction abort on drop failed");
            }
        }
    }
}

impl fmt::Debug for LifecycleTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleTransaction")
            .field("id", &self.id)
            .field("op", &self.op)
            .field("originals", &self.originals.len())
            .field("staged", &self.staged.len())
            .field("state", &self.state)
            .finish()
    }
}
