//! # Disk-Error Policy Module
//!
//! Maps corruption and I/O faults to one of: ignore, best-effort
//! quarantine, stop serving, or terminate. The policy comes from
//! configuration; the surrounding process supplies the transport and
//! process controls it acts through.
//!
//! ## Best-effort quarantine
//!
//! Under `best_effort` a fault marks the file's directory unwritable.
//! A *read* fault (including corruption) additionally marks it
//! unreadable and asks the tracker to drop every sstable in that
//! directory, so readers stop touching a directory that lies. Disk
//! exhaustion under best-effort still stops transports — there is
//! nothing useful to write anywhere.
//!
//! ## Startup discipline
//!
//! Until setup completes, any fault under a policy other than
//! `ignore`/`best_effort` terminates immediately: a node that cannot
//! trust its disks must not finish joining with partial state.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error as ThisError;
use tracing::{error, info, warn};

use crate::tracker::Tracker;

// ------------------------------------------------------------------------------------------------
// Policy selection
// ------------------------------------------------------------------------------------------------

/// Configured response to disk faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFailurePolicy {
    /// Log and carry on.
    Ignore,

    /// Quarantine the failing directory, keep serving everything else.
    BestEffort,

    /// Stop serving network transports; keep the process alive for
    /// diagnostics.
    Stop,

    /// Like `stop`, and treat corruption as seriously as I/O failure.
    StopParanoid,

    /// Terminate the process immediately.
    Die,
}

/// Error for unrecognised policy names in configuration.
#[derive(Debug, ThisError)]
#[error("unknown disk failure policy: {0}")]
pub struct UnknownPolicy(String);

impl FromStr for DiskFailurePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(DiskFailurePolicy::Ignore),
            "best_effort" => Ok(DiskFailurePolicy::BestEffort),
            "stop" => Ok(DiskFailurePolicy::Stop),
            "stop_paranoid" => Ok(DiskFailurePolicy::StopParanoid),
            "die" => Ok(DiskFailurePolicy::Die),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for DiskFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiskFailurePolicy::Ignore => "ignore",
            DiskFailurePolicy::BestEffort => "best_effort",
            DiskFailurePolicy::Stop => "stop",
            DiskFailurePolicy::StopParanoid => "stop_paranoid",
            DiskFailurePolicy::Die => "die",
        };
        f.write_str(name)
    }
}

// ------------------------------------------------------------------------------------------------
// Faults
// ------------------------------------------------------------------------------------------------

/// A disk fault reported by the storage layers.
#[derive(Debug, Clone)]
pub enum DiskFault {
    /// An sstable (or log) failed checksum / parsing.
    Corruption { path: PathBuf },

    /// A read syscall failed.
    Read { path: PathBuf },

    /// A write syscall failed.
    Write { path: PathBuf },

    /// The device behind `path` is full.
    OutOfSpace { path: PathBuf },

    /// No data directory is writable at all.
    NoWritableDisk,
}

impl DiskFault {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DiskFault::Corruption { path }
            | DiskFault::Read { path }
            | DiskFault::Write { path }
            | DiskFault::OutOfSpace { path } => Some(path),
            DiskFault::NoWritableDisk => None,
        }
    }

    /// Read-side faults poison what is already on disk; corruption
    /// counts.
    fn is_read_fault(&self) -> bool {
        matches!(self, DiskFault::Corruption { .. } | DiskFault::Read { .. })
    }

    /// Faults that mean "there is nowhere left to write".
    fn exhausts_disk(&self) -> bool {
        matches!(
            self,
            DiskFault::OutOfSpace { .. } | DiskFault::NoWritableDisk
        )
    }
}

impl fmt::Display for DiskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskFault::Corruption { path } => write!(f, "corruption in {}", path.display()),
            DiskFault::Read { path } => write!(f, "read fault on {}", path.display()),
            DiskFault::Write { path } => write!(f, "write fault on {}", path.display()),
            DiskFault::OutOfSpace { path } => write!(f, "disk full at {}", path.display()),
            DiskFault::NoWritableDisk => f.write_str("no writable disk"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Process hooks
// ------------------------------------------------------------------------------------------------

/// Stops serving network transports.
pub trait TransportControl: Send + Sync {
    fn stop_transports(&self);
}

/// Terminates the process. Split out so tests can observe the decision
/// instead of dying.
pub trait ProcessControl: Send + Sync {
    fn terminate(&self);
}

/// Production [`ProcessControl`]: exits with a non-zero status.
#[derive(Debug, Default)]
pub struct ExitProcess;

impl ProcessControl for ExitProcess {
    fn terminate(&self) {
        error!("disk failure policy: terminating process");
        std::process::exit(1);
    }
}

/// Receives quarantine requests for unreadable directories.
pub trait QuarantineSink: Send + Sync {
    fn drop_unreadable(&self, directory: &Path) -> Result<(), Box<dyn Error + Send + Sync>>;
}

impl QuarantineSink for Tracker {
    fn drop_unreadable(&self, directory: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.remove_unreadable(directory)?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Directory health
// ------------------------------------------------------------------------------------------------

/// Tracks which data directories have been quarantined.
#[derive(Debug, Default)]
pub struct DirectoryHealth {
    unwritable: Mutex<HashSet<PathBuf>>,
    unreadable: Mutex<HashSet<PathBuf>>,
}

impl DirectoryHealth {
    fn mark_unwritable(&self, dir: &Path) {
        let mut set = self.unwritable.lock().unwrap_or_else(|e| e.into_inner());
        if set.insert(dir.to_path_buf()) {
            warn!(dir = %dir.display(), "directory marked unwritable");
        }
    }

    fn mark_unreadable(&self, dir: &Path) {
        let mut set = self.unreadable.lock().unwrap_or_else(|e| e.into_inner());
        if set.insert(dir.to_path_buf()) {
            warn!(dir = %dir.display(), "directory marked unreadable");
        }
    }

    pub fn is_unwritable(&self, dir: &Path) -> bool {
        self.unwritable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(dir)
    }

    pub fn is_unreadable(&self, dir: &Path) -> bool {
        self.unreadable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(dir)
    }
}

// ------------------------------------------------------------------------------------------------
// Handler
// ------------------------------------------------------------------------------------------------

/// What the handler did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignored,
    Quarantined,
    TransportsStopped,
    Terminated,
}

/// Dispatches disk faults according to the configured policy.
pub struct DiskErrorHandler {
    policy: DiskFailurePolicy,
    startup_complete: AtomicBool,
    transports: Arc<dyn TransportControl>,
    process: Arc<dyn ProcessControl>,
    directories: DirectoryHealth,
}

impl DiskErrorHandler {
    pub fn new(
        policy: DiskFailurePolicy,
        transports: Arc<dyn TransportControl>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            policy,
            startup_complete: AtomicBool::new(false),
            transports,
            process,
            directories: DirectoryHealth::default(),
        }
    }

    pub fn policy(&self) -> DiskFailurePolicy {
        self.policy
    }

    pub fn directories(&self) -> &DirectoryHealth {
        &self.directories
    }

    /// Call once the node finished joining; before this, faults under
    /// strict policies terminate outright.
    pub fn mark_startup_complete(&self) {
        self.startup_complete.store(true, Ordering::Release);
        info!(policy = %self.policy, "disk error handler armed");
    }

    /// Dispatches one fault. `quarantine` is asked to drop unreadable
    /// directories under best-effort; its failure is logged, never
    /// propagated — quarantine is best-effort by definition.
    pub fn handle(&self, fault: &DiskFault, quarantine: &dyn QuarantineSink) -> Action {
        warn!(policy = %self.policy, %fault, "disk fault reported");

        if !self.startup_complete.load(Ordering::Acquire)
            && !matches!(
                self.policy,
                DiskFailurePolicy::Ignore | DiskFailurePolicy::BestEffort
            )
        {
            self.process.terminate();
            return Action::Terminated;
        }

        match self.policy {
            DiskFailurePolicy::Die => {
                self.process.terminate();
                Action::Terminated
            }

            DiskFailurePolicy::Stop | DiskFailurePolicy::StopParanoid => {
                self.transports.stop_transports();
                Action::TransportsStopped
            }

            DiskFailurePolicy::BestEffort => {
                if let Some(dir) = fault.path().and_then(Path::parent) {
                    self.directories.mark_unwritable(dir);

                    if fault.is_read_fault() {
                        self.directories.mark_unreadable(dir);
                        if let Err(e) = quarantine.drop_unreadable(dir) {
                            warn!(dir = %dir.display(), error = %e, "quarantine drop failed");
                        }
                    }
                }

                // Disk exhaustion stops transports on top of the
                // quarantine: there is nowhere left to write.
                if fault.exhausts_disk() {
                    self.transports.stop_transports();
                    return Action::TransportsStopped;
                }
                Action::Quarantined
            }

            DiskFailurePolicy::Ignore => Action::Ignored,
        }
    }
}

impl fmt::Debug for DiskErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskErrorHandler")
            .field("policy", &self.policy)
            .field(
                "startup_complete",
                &self.startup_complete.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
