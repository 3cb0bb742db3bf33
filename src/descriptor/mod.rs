//! # Descriptor Module
//!
//! The **Descriptor** is the on-disk identity of an sstable: keyspace,
//! table, generation id, and format tag, rooted in a concrete directory.
//! Every component file of an sstable (data, index, summary, …) derives
//! its filename from the descriptor.
//!
//! ## Filename grammar
//!
//! ```text
//! <generation>-<format>-<component>.db
//! ```
//!
//! within a directory whose path encodes keyspace and table:
//!
//! ```text
//! <data>/<keyspace>/<table>-<id>/<generation>-<format>-<component>.db
//! ```
//!
//! with optional peer subdirectories `backups/` and `snapshots/<name>/`
//! containing hard links to component files.
//!
//! Parsing is strict: a filename either round-trips exactly
//! (descriptor → filename → descriptor) or is rejected with a
//! [`DescriptorError`]. There is no fuzzy matching — the orphan scan at
//! startup and the obsoletion-log recovery both rely on the parser
//! refusing anything it did not write.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the incremental-backup peer directory.
pub const BACKUPS_DIR: &str = "backups";

/// Name of the snapshots peer directory; each snapshot is a child of it.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Extension shared by all sstable component files.
const COMPONENT_EXT: &str = "db";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned when parsing descriptors from paths.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The filename does not match `<gen>-<format>-<component>.db`.
    #[error("filename does not match descriptor grammar: {0}")]
    InvalidFilename(String),

    /// The generation field was not a valid unsigned integer.
    #[error("invalid generation id in {0}")]
    InvalidGeneration(String),

    /// The format tag was not recognised.
    #[error("unknown sstable format tag: {0}")]
    UnknownFormat(String),

    /// The component suffix was not recognised.
    #[error("unknown sstable component: {0}")]
    UnknownComponent(String),

    /// The directory path does not encode `<keyspace>/<table>-<id>`.
    #[error("directory does not encode keyspace/table: {0}")]
    InvalidDirectory(PathBuf),
}

// ------------------------------------------------------------------------------------------------
// Format tag
// ------------------------------------------------------------------------------------------------

/// On-disk sstable format family.
///
/// The tracker never interprets table contents; the tag exists so that
/// filenames round-trip and the verifier can enforce "latest version"
/// when asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatTag {
    /// The legacy big-table format.
    Big,

    /// The trie-indexed format. Newest.
    Bti,
}

impl FormatTag {
    /// The most recent format this build writes.
    pub const LATEST: FormatTag = FormatTag::Bti;

    /// Canonical lowercase tag as it appears in filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            FormatTag::Big => "big",
            FormatTag::Bti => "bti",
        }
    }

    fn parse(s: &str) -> Result<Self, DescriptorError> {
        match s {
            "big" => Ok(FormatTag::Big),
            "bti" => Ok(FormatTag::Bti),
            other => Err(DescriptorError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// Components
// ------------------------------------------------------------------------------------------------

/// One file of an sstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// Partition data.
    Data,

    /// Primary index over partition keys.
    PrimaryIndex,

    /// Sampled index summary.
    Summary,

    /// Bloom filter.
    Filter,

    /// Table statistics and metadata.
    Statistics,

    /// Compression chunk offsets.
    CompressionInfo,
}

impl Component {
    /// Every component, in canonical order. `Data` first — it is the
    /// component whose presence defines sstable existence.
    pub const ALL: [Component; 6] = [
        Component::Data,
        Component::PrimaryIndex,
        Component::Summary,
        Component::Filter,
        Component::Statistics,
        Component::CompressionInfo,
    ];

    /// Canonical suffix as it appears in filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Data => "Data",
            Component::PrimaryIndex => "Index",
            Component::Summary => "Summary",
            Component::Filter => "Filter",
            Component::Statistics => "Statistics",
            Component::CompressionInfo => "CompressionInfo",
        }
    }

    fn parse(s: &str) -> Result<Self, DescriptorError> {
        match s {
            "Data" => Ok(Component::Data),
            "Index" => Ok(Component::PrimaryIndex),
            "Summary" => Ok(Component::Summary),
            "Filter" => Ok(Component::Filter),
            "Statistics" => Ok(Component::Statistics),
            "CompressionInfo" => Ok(Component::CompressionInfo),
            other => Err(DescriptorError::UnknownComponent(other.to_string())),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// Directory classification
// ------------------------------------------------------------------------------------------------

/// Where within the table's directory tree a component file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirKind {
    /// Directly in the table directory — part of the live set.
    Live,

    /// Under `backups/` — an incremental-backup hard link.
    Backup,

    /// Under `snapshots/<name>/` — a named snapshot hard link.
    Snapshot(String),
}

// ------------------------------------------------------------------------------------------------
// Descriptor core
// ------------------------------------------------------------------------------------------------

/// Identity of a single sstable.
///
/// Two descriptors are equal iff they name the same generation of the
/// same table in the same directory. Ordering is by directory, then
/// generation — stable and total, which lets sets of sstables live in
/// `BTreeMap`s keyed by descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor {
    /// Directory holding the component files. Encodes keyspace/table.
    pub directory: PathBuf,

    /// Keyspace name, as encoded by the directory path.
    pub keyspace: String,

    /// Table (column family) name, as encoded by the directory path.
    pub table: String,

    /// Monotonically assigned generation id.
    pub generation: u64,

    /// On-disk format family tag.
    pub format: FormatTag,
}

impl Descriptor {
    /// Builds a descriptor for `<data>/<keyspace>/<table>-<id>/`.
    ///
    /// `table_dir` must already be the concrete `<table>-<id>` directory;
    /// keyspace and table names are taken verbatim, not re-derived.
    pub fn new(
        table_dir: impl Into<PathBuf>,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        generation: u64,
        format: FormatTag,
    ) -> Self {
        Self {
            directory: table_dir.into(),
            keyspace: keyspace.into(),
            table: table.into(),
            generation,
            format,
        }
    }

    /// Filename of the given component: `<gen>-<format>-<component>.db`.
    pub fn filename(&self, component: Component) -> String {
        format!(
            "{}-{}-{}.{}",
            self.generation, self.format, component, COMPONENT_EXT
        )
    }

    /// Full path of the given component file.
    pub fn path_for(&self, component: Component) -> PathBuf {
        self.directory.join(self.filename(component))
    }

    /// The `<gen>-<format>` prefix shared by every component filename.
    pub fn base_name(&self) -> String {
        format!("{}-{}", self.generation, self.format)
    }

    /// Parses a component path back into `(descriptor, component, kind)`.
    ///
    /// The parse is exact: `d.path_for(c)` always round-trips to
    /// `(d, c, DirKind::Live)`, and any name outside the grammar is
    /// rejected. Backup and snapshot locations are recognised and
    /// reported via [`DirKind`]; the returned descriptor's `directory`
    /// is the directory the file actually lives in.
    pub fn from_path(path: &Path) -> Result<(Descriptor, Component, DirKind), DescriptorError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DescriptorError::InvalidFilename(path.display().to_string()))?;

        let (generation, format, component) = Self::parse_filename(filename)?;

        let dir = path
            .parent()
            .ok_or_else(|| DescriptorError::InvalidDirectory(path.to_path_buf()))?;

        let (table_dir, kind) = Self::classify_dir(dir)?;
        let (keyspace, table) = Self::parse_table_dir(table_dir)?;

        Ok((
            Descriptor {
                directory: dir.to_path_buf(),
                keyspace,
                table,
                generation,
                format,
            },
            component,
            kind,
        ))
    }

    /// Splits `<gen>-<format>-<component>.db` into its three fields.
    fn parse_filename(name: &str) -> Result<(u64, FormatTag, Component), DescriptorError> {
        let stem = name
            .strip_suffix(&format!(".{COMPONENT_EXT}"))
            .ok_or_else(|| DescriptorError::InvalidFilename(name.to_string()))?;

        let mut parts = stem.splitn(3, '-');
        let (gen_str, fmt_str, comp_str) = match (parts.next(), parts.next(), parts.next()) {
            (Some(g), Some(f), Some(c)) if !g.is_empty() && !f.is_empty() && !c.is_empty() => {
                (g, f, c)
            }
            _ => return Err(DescriptorError::InvalidFilename(name.to_string())),
        };

        // Leading zeros would break round-tripping; reject them.
        if gen_str.len() > 1 && gen_str.starts_with('0') {
            return Err(DescriptorError::InvalidGeneration(name.to_string()));
        }
        let generation = gen_str
            .parse::<u64>()
            .map_err(|_| DescriptorError::InvalidGeneration(name.to_string()))?;

        let format = FormatTag::parse(fmt_str)?;
        let component = Component::parse(comp_str)?;

        Ok((generation, format, component))
    }

    /// Resolves `dir` to the owning `<table>-<id>` directory, detecting
    /// `backups/` and `snapshots/<name>/` placements on the way.
    fn classify_dir(dir: &Path) -> Result<(&Path, DirKind), DescriptorError> {
        let name = dir.file_name().and_then(|n| n.to_str());

        if name == Some(BACKUPS_DIR) {
            let table_dir = dir
                .parent()
                .ok_or_else(|| DescriptorError::InvalidDirectory(dir.to_path_buf()))?;
            return Ok((table_dir, DirKind::Backup));
        }

        if let Some(parent) = dir.parent()
            && parent.file_name().and_then(|n| n.to_str()) == Some(SNAPSHOTS_DIR)
            && let Some(snapshot_name) = name
        {
            let table_dir = parent
                .parent()
                .ok_or_else(|| DescriptorError::InvalidDirectory(dir.to_path_buf()))?;
            return Ok((table_dir, DirKind::Snapshot(snapshot_name.to_string())));
        }

        Ok((dir, DirKind::Live))
    }

    /// Splits a `<table>-<id>` directory into keyspace and table names.
    fn parse_table_dir(table_dir: &Path) -> Result<(String, String), DescriptorError> {
        let cf_dir = table_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DescriptorError::InvalidDirectory(table_dir.to_path_buf()))?;

        let (table, id) = cf_dir
            .rsplit_once('-')
            .ok_or_else(|| DescriptorError::InvalidDirectory(table_dir.to_path_buf()))?;
        if table.is_empty() || id.is_empty() {
            return Err(DescriptorError::InvalidDirectory(table_dir.to_path_buf()));
        }

        let keyspace = table_dir
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| DescriptorError::InvalidDirectory(table_dir.to_path_buf()))?;

        Ok((keyspace.to_string(), table.to_string()))
    }

    /// Parses the `<directory>/<gen>-<format>` form produced by
    /// [`Descriptor`]'s `Display` impl. Used by obsoletion-log recovery.
    pub fn from_base_path(base: &str) -> Result<Descriptor, DescriptorError> {
        let path = Path::new(base);
        let last = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DescriptorError::InvalidFilename(base.to_string()))?;

        let (gen_str, fmt_str) = last
            .split_once('-')
            .ok_or_else(|| DescriptorError::InvalidFilename(base.to_string()))?;
        if gen_str.len() > 1 && gen_str.starts_with('0') {
            return Err(DescriptorError::InvalidGeneration(base.to_string()));
        }
        let generation = gen_str
            .parse::<u64>()
            .map_err(|_| DescriptorError::InvalidGeneration(base.to_string()))?;
        let format = FormatTag::parse(fmt_str)?;

        let dir = path
            .parent()
            .ok_or_else(|| DescriptorError::InvalidDirectory(path.to_path_buf()))?;
        let (table_dir, _) = Self::classify_dir(dir)?;
        let (keyspace, table) = Self::parse_table_dir(table_dir)?;

        Ok(Descriptor {
            directory: dir.to_path_buf(),
            keyspace,
            table,
            generation,
            format,
        })
    }

    /// Lists every component file of this sstable that currently exists.
    pub fn existing_components(&self) -> Vec<(Component, PathBuf)> {
        Component::ALL
            .iter()
            .map(|c| (*c, self.path_for(*c)))
            .filter(|(_, p)| p.exists())
            .collect()
    }
}

impl fmt::Display for Descriptor {
    /// `<directory>/<gen>-<format>` — the shared component prefix. This
    /// is the form recorded in obsoletion-log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.directory.display(), self.base_name())
    }
}
