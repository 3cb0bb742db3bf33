//! # Compaction Split-Writer Module
//!
//! Support component for compactions that want their output partitioned
//! into geometrically decreasing sstables instead of one monolith: a
//! compaction expected to write `T` bytes produces sstables of
//! `T/2, T/4, T/8, …` until the next size would fall below a
//! configurable floor, with the remainder in one final sstable.
//!
//! The helper only drives the *schedule* — when to close the current
//! output and open the next, and how many keys to estimate per output.
//! Actual sstable writing lives behind [`OutputSink`]; table content is
//! none of this module's business.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io;

use thiserror::Error;
use tracing::debug;

/// Default smallest scheduled sstable: 50 MB.
pub const DEFAULT_SIZE_FLOOR: u64 = 50 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by the split writer.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// The sink failed to open or switch an output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Split-writer misuse (e.g. appending before `start`).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Tuning for the geometric schedule.
#[derive(Debug, Clone, Copy)]
pub struct SplitWriterConfig {
    /// Sizes below this are not scheduled; whatever is left at that
    /// point goes into one final sstable.
    pub size_floor: u64,
}

impl Default for SplitWriterConfig {
    fn default() -> Self {
        Self {
            size_floor: DEFAULT_SIZE_FLOOR,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Schedule
// ------------------------------------------------------------------------------------------------

/// The geometric byte budgets for a total of `total` bytes: `total/2,
/// total/4, …`, stopping before a budget would fall below `floor`. The
/// remainder has no budget — it is written into one final sstable.
pub fn geometric_targets(total: u64, floor: u64) -> Vec<u64> {
    let mut targets = Vec::new();
    let mut next = total / 2;
    while next >= floor && next > 0 {
        targets.push(next);
        next /= 2;
    }
    targets
}

// ------------------------------------------------------------------------------------------------
// Output sink
// ------------------------------------------------------------------------------------------------

/// The writer side the schedule drives. One implementation per sstable
/// format; tests use an in-memory recorder.
pub trait OutputSink {
    /// Closes the current output (if any) and opens the next, sized for
    /// `estimated_keys`.
    fn open_output(&mut self, estimated_keys: u64) -> Result<(), io::Error>;

    /// On-disk bytes of the current output so far.
    fn current_bytes(&self) -> u64;
}

// ------------------------------------------------------------------------------------------------
// Split writer
// ------------------------------------------------------------------------------------------------

/// Drives an [`OutputSink`] through the geometric schedule.
///
/// Usage: `start()`, then call `maybe_switch()` between appends; the
/// current output is closed and the next opened whenever its bytes
/// exceed the current budget and more budgets remain.
#[derive(Debug)]
pub struct SplitWriter<S: OutputSink> {
    sink: S,

    /// Byte budgets, largest first. Outputs past the last budget are
    /// the single remainder sstable.
    targets: Vec<u64>,

    /// Index of the output currently being written.
    current: usize,

    expected_total_bytes: u64,
    estimated_total_keys: u64,
    started: bool,
}

impl<S: OutputSink> SplitWriter<S> {
    pub fn new(
        sink: S,
        expected_total_bytes: u64,
        estimated_total_keys: u64,
        config: &SplitWriterConfig,
    ) -> Self {
        let targets = geometric_targets(expected_total_bytes, config.size_floor);
        debug!(
            expected_total_bytes,
            estimated_total_keys,
            outputs = targets.len() + 1,
            "split schedule computed"
        );
        Self {
            sink,
            targets,
            current: 0,
            expected_total_bytes,
            estimated_total_keys,
            started: false,
        }
    }

    /// Opens the first output.
    pub fn start(&mut self) -> Result<(), CompactionError> {
        if self.started {
            return Err(CompactionError::Internal("split writer started twice".into()));
        }
        self.started = true;
        let keys = self.keys_for(0);
        self.sink.open_output(keys)?;
        Ok(())
    }

    /// Switches outputs when the current one ran past its budget and
    /// more budgets remain. Returns whether a switch happened.
    pub fn maybe_switch(&mut self) -> Result<bool, CompactionError> {
        if !self.started {
            return Err(CompactionError::Internal(
                "maybe_switch before start".into(),
            ));
        }
        if self.current >= self.targets.len() {
            // Already writing the remainder sstable.
            return Ok(false);
        }
        if self.sink.current_bytes() <= self.targets[self.current] {
            return Ok(false);
        }

        self.current += 1;
        let keys = self.keys_for(self.current);
        self.sink.open_output(keys)?;
        debug!(output = self.current, estimated_keys = keys, "output switched");
        Ok(true)
    }

    /// Estimated keys for output `index`, proportional to its share of
    /// the expected bytes.
    fn keys_for(&self, index: usize) -> u64 {
        if self.expected_total_bytes == 0 {
            return self.estimated_total_keys;
        }

        let share = if index < self.targets.len() {
            self.targets[index]
        } else {
            // The remainder: whatever the schedule left over.
            let scheduled: u64 = self.targets.iter().sum();
            self.expected_total_bytes.saturating_sub(scheduled)
        };

        ((u128::from(self.estimated_total_keys) * u128::from(share))
            / u128::from(self.expected_total_bytes)) as u64
    }

    /// Number of outputs the schedule will produce at most (budgeted
    /// outputs plus the remainder).
    pub fn planned_outputs(&self) -> usize {
        self.targets.len() + 1
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
