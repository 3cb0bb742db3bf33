//! # Obsoletion Log Module
//!
//! A small, durable, append-only record of "these sstables are being
//! replaced by those sstables". One file per lifecycle transaction,
//! named by operation tag and transaction id, living in the table
//! directory next to the sstables it describes.
//!
//! ## On-disk format
//!
//! ```text
//! <op>-<uuid>.oblog
//! ─────────────────
//! ADD <directory>/<gen>-<format> <crc32>
//! REMOVE <directory>/<gen>-<format> <crc32>
//! COMMIT <crc32>
//! ```
//!
//! Each line carries a CRC32 (lowercase hex) over everything before it.
//! Replay stops at the first damaged line — a torn tail simply means
//! the transaction never reached its terminal marker.
//!
//! ## States and recovery
//!
//! - **prepared** — no terminal marker. The transaction may have written
//!   output files but never promised them: recovery deletes every `ADD`
//!   file and keeps every `REMOVE` file.
//! - **committed** — `COMMIT` marker present (fsynced before any file
//!   deletion begins). Recovery deletes every `REMOVE` file and keeps
//!   every `ADD` file.
//! - **aborted** — `ABORT` marker present; treated like prepared.
//!
//! Both recovery directions are idempotent: deleting an already-deleted
//! component is a no-op.
//!
//! ## Log-file lifetime
//!
//! The log file must outlive every file deletion it orders. Each
//! obsoleted sstable handle holds an [`LogCompletion`] reference; the
//! last handle to delete its files drops the last reference and the
//! completion removes the log file itself. A crash at any point leaves
//! the log behind for [`recover_directory`] to finish the job.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::{Descriptor, DescriptorError};

/// Extension of obsoletion-log files.
pub const OBLOG_EXT: &str = "oblog";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by obsoletion-log operations.
#[derive(Debug, Error)]
pub enum ObLogError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A descriptor recorded in the log failed to parse.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Operation attempted after the log reached a terminal state.
    #[error("obsoletion log already {0:?}")]
    AlreadyClosed(LogState),

    /// Internal consistency or locking error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Record grammar
// ------------------------------------------------------------------------------------------------

/// Terminal state of a log, as judged by its markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    /// No terminal marker written yet.
    Prepared,

    /// `COMMIT` marker present and durable.
    Committed,

    /// `ABORT` marker present.
    Aborted,
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogLine {
    Add(String),
    Remove(String),
    Commit,
    Abort,
}

impl LogLine {
    fn render(&self) -> String {
        let body = match self {
            LogLine::Add(base) => format!("ADD {base}"),
            LogLine::Remove(base) => format!("REMOVE {base}"),
            LogLine::Commit => "COMMIT".to_string(),
            LogLine::Abort => "ABORT".to_string(),
        };
        format!("{body} {:08x}\n", line_crc(&body))
    }

    /// Parses one line, verifying its checksum. `None` for damaged or
    /// foreign lines — the caller stops replay there.
    fn parse(line: &str) -> Option<LogLine> {
        let (body, crc_str) = line.rsplit_once(' ')?;
        let stored = u32::from_str_radix(crc_str, 16).ok()?;
        if line_crc(body) != stored {
            return None;
        }

        if body == "COMMIT" {
            return Some(LogLine::Commit);
        }
        if body == "ABORT" {
            return Some(LogLine::Abort);
        }
        if let Some(base) = body.strip_prefix("ADD ") {
            return Some(LogLine::Add(base.to_string()));
        }
        if let Some(base) = body.strip_prefix("REMOVE ") {
            return Some(LogLine::Remove(base.to_string()));
        }
        None
    }
}

fn line_crc(body: &str) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(body.as_bytes());
    hasher.finalize()
}

// ------------------------------------------------------------------------------------------------
// Completion handle
// ------------------------------------------------------------------------------------------------

/// Deletes the log file once the last reference drops.
///
/// The log object and every sstable it obsoletes each hold one
/// reference, so the file disappears only after every ordered deletion
/// has actually happened.
#[derive(Debug)]
pub struct LogCompletion {
    path: PathBuf,
}

impl Drop for LogCompletion {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "obsoletion log removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove obsoletion log")
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Obsoletion log core
// ------------------------------------------------------------------------------------------------

/// A write-ahead record for one lifecycle transaction.
#[derive(Debug)]
pub struct ObsoletionLog {
    path: PathBuf,
    file: Mutex<File>,
    state: Mutex<LogState>,
    completion: Arc<LogCompletion>,
}

impl ObsoletionLog {
    /// Creates the log file `<op_tag>-<id>.oblog` inside `dir` and
    /// fsyncs the directory so the file survives a crash.
    pub fn create(dir: &Path, op_tag: &str, id: Uuid) -> Result<Self, ObLogError> {
        let path = dir.join(format!("{op_tag}-{id}.{OBLOG_EXT}"));
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        fsync_dir(dir)?;

        info!(path = %path.display(), op = op_tag, "obsoletion log opened");

        Ok(Self {
            path: path.clone(),
            file: Mutex::new(file),
            state: Mutex::new(LogState::Prepared),
            completion: Arc::new(LogCompletion { path }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A reference that keeps the log file alive until dropped. Handed
    /// to each sstable this log obsoletes.
    pub fn completion(&self) -> Arc<LogCompletion> {
        Arc::clone(&self.completion)
    }

    pub fn state(&self) -> LogState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a staged output: on recovery of an uncommitted log this
    /// file will be deleted.
    pub fn record_add(&self, descriptor: &Descriptor) -> Result<(), ObLogError> {
        self.append(LogLine::Add(descriptor.to_string()))
    }

    /// Records an original being replaced: on recovery of a committed
    /// log this file will be deleted.
    pub fn record_remove(&self, descriptor: &Descriptor) -> Result<(), ObLogError> {
        self.append(LogLine::Remove(descriptor.to_string()))
    }

    /// Forces everything recorded so far to disk.
    pub fn checkpoint(&self) -> Result<(), ObLogError> {
        let file = self.lock_file()?;
        file.sync_all()?;
        Ok(())
    }

    /// Writes the `COMMIT` marker and fsyncs. After this returns, a
    /// crash-restart will keep staged outputs and delete originals.
    /// Idempotent: committing a committed log is a no-op.
    pub fn commit(&self) -> Result<(), ObLogError> {
        let mut state = self.lock_state()?;
        match *state {
            LogState::Committed => return Ok(()),
            LogState::Aborted => return Err(ObLogError::AlreadyClosed(LogState::Aborted)),
            LogState::Prepared => {}
        }

        {
            let mut file = self.lock_file()?;
            file.write_all(LogLine::Commit.render().as_bytes())?;
            file.sync_all()?;
        }

        *state = LogState::Committed;
        info!(path = %self.path.display(), "obsoletion log committed");
        Ok(())
    }

    /// Writes the `ABORT` marker and fsyncs. Idempotent on aborted logs.
    pub fn abort(&self) -> Result<(), ObLogError> {
        let mut state = self.lock_state()?;
        match *state {
            LogState::Aborted => return Ok(()),
            LogState::Committed => return Err(ObLogError::AlreadyClosed(LogState::Committed)),
            LogState::Prepared => {}
        }

        {
            let mut file = self.lock_file()?;
            file.write_all(LogLine::Abort.render().as_bytes())?;
            file.sync_all()?;
        }

        *state = LogState::Aborted;
        info!(path = %self.path.display(), "obsoletion log aborted");
        Ok(())
    }

    fn append(&self, line: LogLine) -> Result<(), ObLogError> {
        {
            let state = self.lock_state()?;
            if *state != LogState::Prepared {
                return Err(ObLogError::AlreadyClosed(*state));
            }
        }
        let mut file = self.lock_file()?;
        file.write_all(line.render().as_bytes())?;
        Ok(())
    }

    fn lock_file(&self) -> Result<std::sync::MutexGuard<'_, File>, ObLogError> {
        self.file
            .lock()
            .map_err(|_| ObLogError::Internal("Mutex poisoned".into()))
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, LogState>, ObLogError> {
        self.state
            .lock()
            .map_err(|_| ObLogError::Internal("Mutex poisoned".into()))
    }
}

// ------------------------------------------------------------------------------------------------
// Recovery
// ------------------------------------------------------------------------------------------------

/// Outcome of recovering one leftover log file.
#[derive(Debug)]
pub struct RecoveredLog {
    /// The log file that was replayed (and then removed).
    pub log_path: PathBuf,

    /// Operation tag parsed from the filename.
    pub op_tag: String,

    /// Transaction id parsed from the filename.
    pub id: Uuid,

    /// Terminal state the log had reached.
    pub state: LogState,

    /// Component files deleted during recovery.
    pub deleted: Vec<PathBuf>,

    /// Descriptor bases whose files were kept.
    pub kept: Vec<String>,
}

/// Replays every unfinished obsoletion log in `dir`.
///
/// For each log: committed ⇒ delete `REMOVE` files, keep `ADD` files;
/// anything else ⇒ delete `ADD` files, keep `REMOVE` files. The log
/// file is removed once its direction has been applied.
pub fn recover_directory(dir: &Path) -> Result<Vec<RecoveredLog>, ObLogError> {
    let mut recovered = Vec::new();

    let mut log_paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(OBLOG_EXT))
        .collect();
    log_paths.sort();

    for log_path in log_paths {
        recovered.push(recover_one(&log_path)?);
    }

    if !recovered.is_empty() {
        fsync_dir(dir)?;
    }

    Ok(recovered)
}

fn recover_one(log_path: &Path) -> Result<RecoveredLog, ObLogError> {
    let (op_tag, id) = parse_log_name(log_path)?;

    let mut content = String::new();
    File::open(log_path)?.read_to_string(&mut content)?;

    let mut adds = Vec::new();
    let mut removes = Vec::new();
    let mut state = LogState::Prepared;

    for raw in content.lines() {
        match LogLine::parse(raw) {
            Some(LogLine::Add(base)) => adds.push(base),
            Some(LogLine::Remove(base)) => removes.push(base),
            Some(LogLine::Commit) => state = LogState::Committed,
            Some(LogLine::Abort) => state = LogState::Aborted,
            None => {
                // Torn or corrupt tail: everything after it never
                // happened. In particular no terminal marker follows.
                warn!(path = %log_path.display(), line = raw, "damaged obsoletion log line, stopping replay");
                break;
            }
        }
    }

    let (doomed, kept) = match state {
        LogState::Committed => (removes, adds),
        LogState::Prepared | LogState::Aborted => (adds, removes),
    };

    let mut deleted = Vec::new();
    for base in &doomed {
        let descriptor = Descriptor::from_base_path(base)?;
        for (_, path) in descriptor.existing_components() {
            fs::remove_file(&path)?;
            deleted.push(path);
        }
    }

    fs::remove_file(log_path)?;

    info!(
        path = %log_path.display(),
        ?state,
        deleted = deleted.len(),
        kept = kept.len(),
        "obsoletion log recovered"
    );

    Ok(RecoveredLog {
        log_path: log_path.to_path_buf(),
        op_tag,
        id,
        state,
        deleted,
        kept,
    })
}

/// Splits `<op>-<uuid>.oblog` into its tag and id. The uuid is the
/// final 36 characters of the stem; the tag may itself contain dashes.
fn parse_log_name(path: &Path) -> Result<(String, Uuid), ObLogError> {
    const UUID_LEN: usize = 36;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ObLogError::Internal(format!("bad log name: {}", path.display())))?;

    if stem.len() <= UUID_LEN {
        return Err(ObLogError::Internal(format!(
            "bad log name: {}",
            path.display()
        )));
    }
    let (prefix, uuid_str) = stem.split_at(stem.len() - UUID_LEN);
    let op_tag = prefix
        .strip_suffix('-')
        .ok_or_else(|| ObLogError::Internal(format!("bad log name: {}", path.display())))?;
    let id = Uuid::parse_str(uuid_str)
        .map_err(|_| ObLogError::Internal(format!("bad log name: {}", path.display())))?;

    Ok((op_tag.to_string(), id))
}

/// Fsyncs a directory so renames/creates within it are durable.
fn fsync_dir(dir: &Path) -> Result<(), ObLogError> {
    let dir_file = File::open(dir)?;
    dir_file.sync_all()?;
    Ok(())
}
