//! # SSTable Handle Module
//!
//! An **sstable handle** is an opaque, reference-counted handle to an
//! immutable on-disk table. The tracker never reads table contents —
//! what it owns is identity ([`Descriptor`]), extent (bytes on disk,
//! covered key interval), repair status, and the obsoletion state that
//! orders file deletion after the last reader is gone.
//!
//! ## Reference counting over garbage collection
//!
//! Handles are `Arc`-based: the live set of a view owns one strong
//! reference, every reader that is handed the sstable clones another.
//! Marking an sstable obsolete does **not** delete anything — the
//! component files are removed by the handle's `Drop` when the final
//! reference goes away. This is the anti-dangling invariant: a reader
//! holding a handle can never observe its files disappearing.
//!
//! A marked handle also carries its transaction's [`LogCompletion`], so
//! the obsoletion log outlives every deletion it ordered.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use crate::descriptor::{Component, Descriptor};
use crate::oblog::LogCompletion;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned when materialising sstable handles.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data component of the sstable does not exist.
    #[error("missing data component for {0}")]
    MissingData(Descriptor),
}

// ------------------------------------------------------------------------------------------------
// Key interval
// ------------------------------------------------------------------------------------------------

/// Inclusive interval of partition keys covered by one sstable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyInterval {
    /// Smallest partition key in the table.
    pub min: Vec<u8>,

    /// Largest partition key in the table.
    pub max: Vec<u8>,
}

impl KeyInterval {
    pub fn new(min: impl Into<Vec<u8>>, max: impl Into<Vec<u8>>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Whether `key` falls inside this interval.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.min.as_slice() <= key && key <= self.max.as_slice()
    }

    /// Whether this interval intersects `[start, end]`.
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        self.min.as_slice() <= end && start <= self.max.as_slice()
    }
}

// ------------------------------------------------------------------------------------------------
// Repair status
// ------------------------------------------------------------------------------------------------

/// When (unix millis) this sstable's data was last repaired; zero means
/// never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepairedAt(pub u64);

impl RepairedAt {
    pub const UNREPAIRED: RepairedAt = RepairedAt(0);

    pub fn is_repaired(self) -> bool {
        self.0 != 0
    }
}

// ------------------------------------------------------------------------------------------------
// SSTable core
// ------------------------------------------------------------------------------------------------

/// A reference-counted handle to one immutable on-disk table.
pub type SSTableHandle = Arc<SSTable>;

/// Shared state behind an [`SSTableHandle`].
#[derive(Debug)]
pub struct SSTable {
    /// On-disk identity.
    descriptor: Descriptor,

    /// Total component bytes on disk.
    size_bytes: u64,

    /// Covered partition-key interval.
    interval: KeyInterval,

    /// Repair timestamp; zero = unrepaired. Mutated only through the
    /// tracker's repair-status operation.
    repaired_at: AtomicU64,

    /// Once set, component files are deleted when the last reference
    /// drops.
    obsolete: AtomicBool,

    /// Keeps the ordering obsoletion log alive until this table's
    /// files are actually gone.
    completion: Mutex<Option<Arc<LogCompletion>>>,
}

impl SSTable {
    /// Opens a handle onto an existing sstable, reading its size from
    /// the data component.
    pub fn open(
        descriptor: Descriptor,
        interval: KeyInterval,
        repaired_at: RepairedAt,
    ) -> Result<SSTableHandle, SSTableError> {
        let data_path = descriptor.path_for(Component::Data);
        let meta = match fs::metadata(&data_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SSTableError::MissingData(descriptor));
            }
            Err(e) => return Err(SSTableError::Io(e)),
        };

        let mut size_bytes = meta.len();
        for (component, path) in descriptor.existing_components() {
            if component != Component::Data {
                size_bytes += fs::metadata(&path)?.len();
            }
        }

        Ok(Arc::new(Self::from_parts(
            descriptor,
            size_bytes,
            interval,
            repaired_at,
        )))
    }

    /// Builds a handle from already-known metadata — the flush and
    /// compaction writers know their output sizes without a stat walk.
    pub fn with_metadata(
        descriptor: Descriptor,
        size_bytes: u64,
        interval: KeyInterval,
        repaired_at: RepairedAt,
    ) -> SSTableHandle {
        Arc::new(Self::from_parts(
            descriptor,
            size_bytes,
            interval,
            repaired_at,
        ))
    }

    fn from_parts(
        descriptor: Descriptor,
        size_bytes: u64,
        interval: KeyInterval,
        repaired_at: RepairedAt,
    ) -> Self {
        Self {
            descriptor,
            size_bytes,
            interval,
            repaired_at: AtomicU64::new(repaired_at.0),
            obsolete: AtomicBool::new(false),
            completion: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn interval(&self) -> &KeyInterval {
        &self.interval
    }

    pub fn repaired_at(&self) -> RepairedAt {
        RepairedAt(self.repaired_at.load(Ordering::Acquire))
    }

    /// Updates the repair timestamp. Tracker-internal.
    pub(crate) fn set_repaired_at(&self, repaired_at: RepairedAt) {
        self.repaired_at.store(repaired_at.0, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    /// Schedules this sstable's files for deletion once the last
    /// reference drops. `completion` ties the ordering obsoletion log's
    /// lifetime to the deletion.
    pub(crate) fn mark_obsolete(&self, completion: Option<Arc<LogCompletion>>) {
        if let Some(c) = completion {
            let mut slot = self.completion.lock().unwrap_or_else(|e| e.into_inner());
            slot.get_or_insert(c);
        }
        self.obsolete.store(true, Ordering::Release);
        info!(descriptor = %self.descriptor, "sstable marked obsolete");
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }

        for (_, path) in self.descriptor.existing_components() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete obsolete component");
                }
            }
        }
        info!(descriptor = %self.descriptor, "obsolete sstable deleted");
        // The completion reference (if any) drops here, after the
        // deletions it orders.
    }
}
