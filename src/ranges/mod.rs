//! # Range & Split Module
//!
//! Token-ring arithmetic for the local node: given the ring membership
//! and the node's owned token ranges, produce a sorted, normalized
//! (unwrapped) list of weighted ranges and, on demand, split points
//! dividing them into N equally-weighted parts.
//!
//! ## Model
//!
//! Tokens are signed 64-bit ring positions. A range `(left, right]` is
//! half-open on the left; `left == right` denotes the full ring and
//! `left > right` a range wrapping past the ring boundary. Wrap-around
//! ranges are **unwrapped** into one or two ordinary ranges before any
//! arithmetic — everything downstream of the constructor sees only
//! non-wrapping ranges.
//!
//! Full replicas carry weight 1.0, transient replicas 0.1, so an
//! equal-weight split lands proportionally more boundaries inside
//! fully-owned territory.
//!
//! ## Caching and staleness
//!
//! [`SortedLocalRanges`] is immutable once built. Split results are
//! cached per part-count; the instance is explicitly invalidated (one
//! shot, monotonic) or reports itself out of date when the live ring
//! version advances past the one it was built from.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

// ------------------------------------------------------------------------------------------------
// Tokens and ranges
// ------------------------------------------------------------------------------------------------

/// A position on the token ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub i64);

impl Token {
    /// The smallest ring position.
    pub const MIN: Token = Token(i64::MIN);

    /// The largest ring position.
    pub const MAX: Token = Token(i64::MAX);
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open token interval `(left, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenRange {
    pub left: Token,
    pub right: Token,
}

impl TokenRange {
    pub fn new(left: Token, right: Token) -> Self {
        Self { left, right }
    }

    /// The full ring, `(MIN, MIN]` unwrapping to `(MIN, MAX]`.
    pub fn full_ring() -> Self {
        Self::new(Token::MIN, Token::MIN)
    }

    /// True when this range crosses (or covers) the ring boundary.
    pub fn wraps(&self) -> bool {
        self.left >= self.right
    }

    /// Normalizes into one or two non-wrapping ranges, dropping empty
    /// parts.
    pub fn unwrap_range(&self) -> Vec<TokenRange> {
        if !self.wraps() {
            return vec![*self];
        }
        if self.left == self.right {
            // Full ring.
            return vec![TokenRange::new(Token::MIN, Token::MAX)];
        }

        let mut parts = Vec::with_capacity(2);
        if self.left < Token::MAX {
            parts.push(TokenRange::new(self.left, Token::MAX));
        }
        if Token::MIN < self.right {
            parts.push(TokenRange::new(Token::MIN, self.right));
        }
        parts
    }

    /// Number of tokens in a non-wrapping range.
    fn width(&self) -> u128 {
        debug_assert!(!self.wraps());
        (self.right.0 as i128 - self.left.0 as i128) as u128
    }

    /// Intersection of two non-wrapping ranges; `None` when empty.
    pub fn intersection(&self, other: &TokenRange) -> Option<TokenRange> {
        debug_assert!(!self.wraps() && !other.wraps());
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        (left < right).then_some(TokenRange::new(left, right))
    }

    /// Whether `token` falls inside this non-wrapping range.
    pub fn contains(&self, token: Token) -> bool {
        debug_assert!(!self.wraps());
        self.left < token && token <= self.right
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}]", self.left, self.right)
    }
}

// ------------------------------------------------------------------------------------------------
// Weighted ranges
// ------------------------------------------------------------------------------------------------

/// Ownership weight of a full replica.
pub const FULL_WEIGHT: f64 = 1.0;

/// Ownership weight of a transient replica.
pub const TRANSIENT_WEIGHT: f64 = 0.1;

/// A non-wrapping range with an ownership weight in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRange {
    pub weight: f64,
    pub range: TokenRange,
}

impl WeightedRange {
    pub fn new(weight: f64, range: TokenRange) -> Self {
        Self { weight, range }
    }

    /// Weighted size in tenth-of-token units — integer arithmetic so
    /// split boundaries stay exact over the full 64-bit ring.
    fn tenths(&self) -> u128 {
        self.range.width() * weight_tenths(self.weight) as u128
    }
}

fn weight_tenths(weight: f64) -> u32 {
    // Weights are 1.0 or 0.1 in practice; anything else rounds to the
    // nearest tenth with a floor of one.
    ((weight * 10.0).round() as u32).max(1)
}

// ------------------------------------------------------------------------------------------------
// Ring inputs
// ------------------------------------------------------------------------------------------------

/// Identity of the local node, as supplied by cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One range the local node replicates, with full/transient status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaRange {
    pub range: TokenRange,
    pub full: bool,
}

/// The local node's slice of the ring at one membership version.
#[derive(Debug, Clone, PartialEq)]
pub struct RingSnapshot {
    pub version: u64,
    pub ranges_at_endpoint: Vec<ReplicaRange>,
}

/// Supplies the live ring version so consumers can detect staleness.
pub trait RingVersionSource: Send + Sync {
    fn current_version(&self) -> u64;
}

/// A shared, monotonically advancing ring version.
#[derive(Debug, Default)]
pub struct RingVersion {
    version: AtomicU64,
}

impl RingVersion {
    pub fn new(initial: u64) -> Self {
        Self {
            version: AtomicU64::new(initial),
        }
    }

    pub fn advance(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl RingVersionSource for RingVersion {
    fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

// ------------------------------------------------------------------------------------------------
// Partitioner / splitter
// ------------------------------------------------------------------------------------------------

/// How a splitter may place boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Boundaries may land anywhere inside a range.
    AlwaysSplit,

    /// Boundaries only ever land on existing range endpoints.
    WholeRangesOnly,
}

/// Subdivides weighted ranges into equally-weighted parts.
pub trait Splitter: Send + Sync {
    /// Produces up to `parts − 1` strictly ascending boundary tokens.
    fn split(&self, ranges: &[WeightedRange], parts: usize, policy: SplitPolicy) -> Vec<Token>;
}

/// Maps partition keys to ring positions; optionally provides a
/// splitter for its token space.
pub trait Partitioner: Send + Sync {
    fn name(&self) -> &'static str;

    fn token_of(&self, key: &[u8]) -> Token;

    fn splitter(&self) -> Option<&dyn Splitter>;
}

/// Hash partitioner over the full signed 64-bit ring. Supports
/// splitting.
#[derive(Debug, Default)]
pub struct HashedPartitioner {
    splitter: EvenSplitter,
}

impl Partitioner for HashedPartitioner {
    fn name(&self) -> &'static str {
        "hashed"
    }

    fn token_of(&self, key: &[u8]) -> Token {
        // FNV-1a, folded into the signed token space.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key {
            h ^= u64::from(*byte);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Token(h as i64)
    }

    fn splitter(&self) -> Option<&dyn Splitter> {
        Some(&self.splitter)
    }
}

/// Byte-ordered partitioner: tokens preserve key order. No splitter —
/// its keyspace distribution is unknowable a priori.
#[derive(Debug, Default)]
pub struct OrderedPartitioner;

impl Partitioner for OrderedPartitioner {
    fn name(&self) -> &'static str {
        "ordered"
    }

    fn token_of(&self, key: &[u8]) -> Token {
        let mut raw = [0u8; 8];
        for (i, byte) in key.iter().take(8).enumerate() {
            raw[i] = *byte;
        }
        // Shift into signed space so b"" maps to MIN.
        Token((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
    }

    fn splitter(&self) -> Option<&dyn Splitter> {
        None
    }
}

/// Weight-proportional splitter using exact integer arithmetic.
#[derive(Debug, Default)]
pub struct EvenSplitter;

impl Splitter for EvenSplitter {
    fn split(&self, ranges: &[WeightedRange], parts: usize, policy: SplitPolicy) -> Vec<Token> {
        if parts <= 1 || ranges.is_empty() {
            return Vec::new();
        }

        let total: u128 = ranges.iter().map(WeightedRange::tenths).sum();
        if total == 0 {
            return Vec::new();
        }

        let mut boundaries: Vec<Token> = Vec::with_capacity(parts - 1);
        let mut accumulated: u128 = 0;
        let mut part = 1usize;

        for wr in ranges {
            let contribution = wr.tenths();

            while part < parts {
                let target = total * part as u128 / parts as u128;
                if target > accumulated + contribution {
                    break;
                }

                let token = match policy {
                    SplitPolicy::AlwaysSplit => {
                        let offset =
                            (target - accumulated) / u128::from(weight_tenths(wr.weight));
                        Token((wr.range.left.0 as i128 + offset as i128) as i64)
                    }
                    SplitPolicy::WholeRangesOnly => wr.range.right,
                };

                if boundaries.last().is_none_or(|last| *last < token)
                    && token > wr.range.left
                {
                    boundaries.push(token);
                }
                part += 1;
            }

            accumulated += contribution;
        }

        boundaries
    }
}

// ------------------------------------------------------------------------------------------------
// Sorted local ranges
// ------------------------------------------------------------------------------------------------

/// The local node's owned ranges: normalized, weighted, sorted by left
/// endpoint, immutable once built. Split results are cached per
/// part-count.
pub struct SortedLocalRanges {
    ring_version: u64,
    ranges: Vec<WeightedRange>,
    partitioner: Arc<dyn Partitioner>,
    version_source: Arc<dyn RingVersionSource>,
    invalidated: AtomicBool,
    splits: Mutex<HashMap<usize, Arc<[Token]>>>,
}

impl SortedLocalRanges {
    /// Builds from a ring snapshot: full replicas weigh 1.0, transient
    /// 0.1; wrap-around ranges are unwrapped at the ring boundary; the
    /// result is sorted by left endpoint.
    pub fn build(
        snapshot: &RingSnapshot,
        partitioner: Arc<dyn Partitioner>,
        version_source: Arc<dyn RingVersionSource>,
    ) -> Self {
        let mut ranges = Vec::new();
        for replica in &snapshot.ranges_at_endpoint {
            let weight = if replica.full {
                FULL_WEIGHT
            } else {
                TRANSIENT_WEIGHT
            };
            for part in replica.range.unwrap_range() {
                ranges.push(WeightedRange::new(weight, part));
            }
        }
        ranges.sort_by(|a, b| {
            (a.range.left, a.range.right)
                .cmp(&(b.range.left, b.range.right))
        });

        debug!(
            ring_version = snapshot.version,
            ranges = ranges.len(),
            "sorted local ranges built"
        );

        Self {
            ring_version: snapshot.version,
            ranges,
            partitioner,
            version_source,
            invalidated: AtomicBool::new(false),
            splits: Mutex::new(HashMap::new()),
        }
    }

    pub fn ring_version(&self) -> u64 {
        self.ring_version
    }

    pub fn ranges(&self) -> &[WeightedRange] {
        &self.ranges
    }

    /// Boundary tokens dividing the owned ranges into `num_parts`
    /// equally-weighted parts. At most `num_parts − 1` tokens, strictly
    /// ascending. Cached: repeated calls return the identical list.
    ///
    /// Uses the partitioner's splitter with [`SplitPolicy::AlwaysSplit`]
    /// when one exists; otherwise falls back to the stored ranges'
    /// right endpoints.
    pub fn split(&self, num_parts: usize) -> Arc<[Token]> {
        {
            let cache = self.splits.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(&num_parts) {
                return Arc::clone(cached);
            }
        }

        let tokens: Vec<Token> = match self.partitioner.splitter() {
            Some(splitter) => splitter.split(&self.ranges, num_parts, SplitPolicy::AlwaysSplit),
            None => self
                .ranges
                .iter()
                .map(|wr| wr.range.right)
                .take(num_parts.saturating_sub(1))
                .collect(),
        };
        let tokens: Arc<[Token]> = tokens.into();

        let mut cache = self.splits.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cache.entry(num_parts).or_insert(tokens))
    }

    /// Intersections of every stored range with `range`, weights
    /// preserved, empties dropped.
    pub fn subrange(&self, range: &TokenRange) -> Vec<WeightedRange> {
        let parts = range.unwrap_range();
        let mut result = Vec::new();
        for wr in &self.ranges {
            for part in &parts {
                if let Some(overlap) = wr.range.intersection(part) {
                    result.push(WeightedRange::new(wr.weight, overlap));
                }
            }
        }
        result
    }

    /// One-shot, monotonic invalidation.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// True iff invalidated or the live ring version has advanced past
    /// the one this instance was built from.
    pub fn is_out_of_date(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
            || self.version_source.current_version() > self.ring_version
    }
}

impl PartialEq for SortedLocalRanges {
    /// Value equality: same ring version, same normalized ranges. The
    /// split cache and staleness flags do not participate.
    fn eq(&self, other: &Self) -> bool {
        self.ring_version == other.ring_version && self.ranges == other.ranges
    }
}

impl fmt::Debug for SortedLocalRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedLocalRanges")
            .field("ring_version", &self.ring_version)
            .field("ranges", &self.ranges.len())
            .field("partitioner", &self.partitioner.name())
            .finish_non_exhaustive()
    }
}
