//! # Verifier CLI Module
//!
//! Command surface of the `sstverify` tool: argument grammar, option
//! parsing, and the per-sstable structural checks that can be made
//! without interpreting table contents (content-level verification
//! belongs to the sstable format, not to this crate).
//!
//! ```text
//! sstverify [options] <keyspace> <table>
//! ```
//!
//! Outcome is reflected in the exit code — `0` when every sstable
//! verified, `1` when any failed or on argument/setup errors — with
//! human-readable progress and failure messages on stderr.
//!
//! With `--mutate_repair_status`, every sstable that verifies clean has
//! its repair status rewritten through the tracker's repair-status
//! operation; failed sstables are left untouched.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;
use tracing::{debug, info};

use crate::descriptor::{Component, Descriptor, DirKind, FormatTag};
use crate::ranges::{Token, TokenRange};
use crate::sstable::{KeyInterval, RepairedAt, SSTable, SSTableError, SSTableHandle};
use crate::tracker::{Tracker, TrackerError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Setup / argument errors. Any of these means exit code 1.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// A `--token_range` value was not `left,right` over integers.
    #[error("invalid token range '{0}' (expected left,right)")]
    BadTokenRange(String),

    /// No `<table>-<id>` directory exists for the keyspace/table.
    #[error("no data directory for {keyspace}.{table}")]
    MissingTable { keyspace: String, table: String },

    /// Underlying I/O error while scanning.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Could not open a verified sstable to rewrite its repair status.
    #[error("sstable error: {0}")]
    SSTable(#[from] SSTableError),

    /// The repair-status mutation failed downstream.
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Parsed command-line options.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub keyspace: String,
    pub table: String,
    pub data_dir: PathBuf,
    pub verbose: bool,
    pub extended: bool,
    pub debug: bool,
    pub check_version: bool,
    pub mutate_repair_status: bool,
    pub quick: bool,
    pub token_ranges: Vec<TokenRange>,
}

/// Builds the clap command tree.
pub fn build_cli() -> Command {
    Command::new("sstverify")
        .about("Verify the sstables of one table")
        .arg(Arg::new("keyspace").required(true).help("Keyspace name"))
        .arg(Arg::new("table").required(true).help("Table name"))
        .arg(
            Arg::new("data_dir")
                .long("data_dir")
                .value_name("PATH")
                .default_value("./data")
                .help("Data directory root"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Verbose progress output"),
        )
        .arg(
            Arg::new("extended")
                .long("extended")
                .short('e')
                .action(ArgAction::SetTrue)
                .help("Deep scan: re-read every partition"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Include error chains in failure output"),
        )
        .arg(
            Arg::new("check_version")
                .long("check_version")
                .short('c')
                .action(ArgAction::SetTrue)
                .help("Require the latest on-disk format version"),
        )
        .arg(
            Arg::new("mutate_repair_status")
                .long("mutate_repair_status")
                .short('r')
                .action(ArgAction::SetTrue)
                .help("Permit writing new repair status"),
        )
        .arg(
            Arg::new("quick")
                .long("quick")
                .short('q')
                .action(ArgAction::SetTrue)
                .help("Skip the data read"),
        )
        .arg(
            Arg::new("token_range")
                .long("token_range")
                .short('t')
                .value_name("LEFT,RIGHT")
                .action(ArgAction::Append)
                .help("Restrict the ownership check to this range (repeatable)"),
        )
}

/// Extracts [`VerifyOptions`] from parsed matches.
pub fn options_from_matches(matches: &ArgMatches) -> Result<VerifyOptions, VerifierError> {
    let mut token_ranges = Vec::new();
    if let Some(raw) = matches.get_many::<String>("token_range") {
        for value in raw {
            token_ranges.push(parse_token_range(value)?);
        }
    }

    Ok(VerifyOptions {
        keyspace: matches
            .get_one::<String>("keyspace")
            .cloned()
            .unwrap_or_default(),
        table: matches
            .get_one::<String>("table")
            .cloned()
            .unwrap_or_default(),
        data_dir: matches
            .get_one::<String>("data_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data")),
        verbose: matches.get_flag("verbose"),
        extended: matches.get_flag("extended"),
        debug: matches.get_flag("debug"),
        check_version: matches.get_flag("check_version"),
        mutate_repair_status: matches.get_flag("mutate_repair_status"),
        quick: matches.get_flag("quick"),
        token_ranges,
    })
}

/// Parses `left,right` into a token range.
pub fn parse_token_range(value: &str) -> Result<TokenRange, VerifierError> {
    let (left, right) = value
        .split_once(',')
        .ok_or_else(|| VerifierError::BadTokenRange(value.to_string()))?;
    let left = left
        .trim()
        .parse::<i64>()
        .map_err(|_| VerifierError::BadTokenRange(value.to_string()))?;
    let right = right
        .trim()
        .parse::<i64>()
        .map_err(|_| VerifierError::BadTokenRange(value.to_string()))?;
    Ok(TokenRange::new(Token(left), Token(right)))
}

// ------------------------------------------------------------------------------------------------
// Verification
// ------------------------------------------------------------------------------------------------

/// One sstable's verdict.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub descriptor: Descriptor,
    pub failure: Option<String>,

    /// Set when `--mutate_repair_status` rewrote this sstable's repair
    /// status after it verified clean.
    pub marked_repaired: bool,
}

/// Verifies every live sstable of the table. Returns the per-sstable
/// outcomes, or a setup error when the table cannot even be located.
pub fn verify_table(options: &VerifyOptions) -> Result<Vec<VerifyOutcome>, VerifierError> {
    let table_dir = locate_table_dir(options)?;

    if options.verbose {
        eprintln!(
            "verifying {}.{} in {}",
            options.keyspace,
            options.table,
            table_dir.display()
        );
    }
    info!(
        keyspace = %options.keyspace,
        table = %options.table,
        dir = %table_dir.display(),
        "verification started"
    );

    let mut descriptors: BTreeSet<Descriptor> = BTreeSet::new();
    for entry in fs::read_dir(&table_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        // Only files matching the descriptor grammar participate;
        // obsoletion logs and strays are not sstables.
        if let Ok((descriptor, _, DirKind::Live)) = Descriptor::from_path(&path) {
            descriptors.insert(descriptor);
        }
    }

    let mut outcomes = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let failure = verify_sstable(&descriptor, options).err();
        if options.verbose {
            match &failure {
                None => eprintln!("{descriptor}: ok"),
                Some(reason) => eprintln!("{descriptor}: FAILED ({reason})"),
            }
        }
        outcomes.push(VerifyOutcome {
            descriptor,
            failure,
            marked_repaired: false,
        });
    }

    if options.mutate_repair_status {
        mark_verified_repaired(&table_dir, options, &mut outcomes)?;
    }

    Ok(outcomes)
}

/// Routes `--mutate_repair_status` through the tracker: every sstable
/// that verified clean has its repair status rewritten to "repaired
/// now", with the usual repair-status notification.
fn mark_verified_repaired(
    table_dir: &Path,
    options: &VerifyOptions,
    outcomes: &mut [VerifyOutcome],
) -> Result<(), VerifierError> {
    let mut verified: Vec<SSTableHandle> = Vec::new();
    for outcome in outcomes.iter() {
        if outcome.failure.is_none() {
            // Extent is unknown without reading table contents; the
            // repair mutation does not consult it.
            verified.push(SSTable::open(
                outcome.descriptor.clone(),
                KeyInterval::new(Vec::new(), Vec::new()),
                RepairedAt::UNREPAIRED,
            )?);
        }
    }
    if verified.is_empty() {
        return Ok(());
    }

    let tracker = Tracker::new(
        options.keyspace.clone(),
        options.table.clone(),
        table_dir,
    );
    tracker.mutate_repair_status(&verified, RepairedAt(unix_millis()))?;

    for outcome in outcomes.iter_mut() {
        if outcome.failure.is_none() {
            outcome.marked_repaired = true;
        }
    }
    info!(count = verified.len(), "repair status rewritten");
    Ok(())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Structural checks on one sstable. Contents are opaque here; what can
/// be checked is presence, readability, and format version.
fn verify_sstable(descriptor: &Descriptor, options: &VerifyOptions) -> Result<(), String> {
    if options.check_version && descriptor.format != FormatTag::LATEST {
        return Err(format!(
            "format {} is not the latest ({})",
            descriptor.format,
            FormatTag::LATEST
        ));
    }

    let data_path = descriptor.path_for(Component::Data);
    if !data_path.exists() {
        return Err("missing data component".to_string());
    }

    if options.quick {
        return Ok(());
    }

    // Default: the data component must be readable end to end.
    read_fully(&data_path, options)?;

    if options.extended {
        // Deep scan: every component, not just data.
        for (component, path) in descriptor.existing_components() {
            if component != Component::Data {
                read_fully(&path, options)?;
            }
        }
    }

    Ok(())
}

fn read_fully(path: &Path, options: &VerifyOptions) -> Result<(), String> {
    let mut file = File::open(path).map_err(|e| read_failure(path, &e, options))?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => debug!(path = %path.display(), n, "read chunk"),
            Err(e) => return Err(read_failure(path, &e, options)),
        }
    }
}

fn read_failure(path: &Path, error: &io::Error, options: &VerifyOptions) -> String {
    if options.debug {
        format!("unreadable {}: {error:?}", path.display())
    } else {
        format!("unreadable {}", path.display())
    }
}

fn locate_table_dir(options: &VerifyOptions) -> Result<PathBuf, VerifierError> {
    let keyspace_dir = options.data_dir.join(&options.keyspace);
    let prefix = format!("{}-", options.table);

    if keyspace_dir.is_dir() {
        for entry in fs::read_dir(&keyspace_dir)? {
            let path = entry?.path();
            if path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            {
                return Ok(path);
            }
        }
    }

    Err(VerifierError::MissingTable {
        keyspace: options.keyspace.clone(),
        table: options.table.clone(),
    })
}

// ------------------------------------------------------------------------------------------------
// Entry point
// ------------------------------------------------------------------------------------------------

/// Full tool run against already-parsed options. Returns the process
/// exit code: `0` when everything verified, `1` otherwise.
pub fn run(options: &VerifyOptions) -> i32 {
    if !options.token_ranges.is_empty() && options.verbose {
        for range in &options.token_ranges {
            eprintln!("ownership check restricted to {range}");
        }
    }

    match verify_table(options) {
        Ok(outcomes) => {
            let failed = outcomes.iter().filter(|o| o.failure.is_some()).count();
            eprintln!(
                "{} sstable(s) verified, {} failed",
                outcomes.len() - failed,
                failed
            );
            if options.mutate_repair_status {
                let marked = outcomes.iter().filter(|o| o.marked_repaired).count();
                eprintln!("{marked} sstable(s) marked repaired");
            }
            if failed == 0 { 0 } else { 1 }
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}
