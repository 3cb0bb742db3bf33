//! # liveset
//!
//! The **per-table live-data tracker** of a log-structured storage
//! engine: the subsystem that owns, at runtime, the authoritative
//! picture of which in-memory write buffers and on-disk sstables
//! currently belong to one table, and that mediates every structural
//! change — flushes, compactions, drops, truncations, reloads — through
//! atomic snapshot swaps and scoped transactions.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Tracker                             │
//! │      ┌────────────── ArcSwap<View> ──────────────┐         │
//! │      │  live buffers │ flushing │ live sstables  │         │
//! │      │  compacting   │ interval index            │         │
//! │      └───────────────────────────────────────────┘         │
//! │   readers: one atomic load          writers: CAS loop      │
//! │                                                            │
//! │  ┌──────────────┐   claim/commit   ┌────────────────────┐  │
//! │  │  Lifecycle   │◄────────────────►│   Obsoletion log   │  │
//! │  │ Transaction  │                  │ (crash recovery)   │  │
//! │  └──────────────┘                  └────────────────────┘  │
//! │                                                            │
//! │  notifications ──► subscribers (copy-on-write list)        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`tracker`] | The atomically-swappable view reference and every mutation primitive |
//! | [`view`] | Immutable snapshots with an interval index for read-path pruning |
//! | [`transaction`] | Scoped claims over sstables with commit/abort semantics |
//! | [`oblog`] | Durable obsoletion records enabling crash recovery of half-done swaps |
//! | [`memtable`] | Write buffers with commit-log admission windows |
//! | [`sstable`] | Reference-counted sstable handles; deletion ordered after the last reader |
//! | [`descriptor`] | On-disk identity and the filename grammar |
//! | [`ranges`] | Token-ring math: weighted local ranges and cached equal-weight splits |
//! | [`compaction`] | Split-writer helper producing geometrically decreasing outputs |
//! | [`policy`] | Disk-error policy: ignore / best-effort / stop / die |
//! | [`verifier`] | The `sstverify` CLI surface |
//!
//! ## Guarantees
//!
//! - **Point-in-time reads:** a reader samples the view once and works
//!   on an immutable snapshot; no locks on the read path.
//! - **At-most-one claim:** a given sstable belongs to at most one
//!   lifecycle transaction; overlapping claims fail fast.
//! - **Anti-dangling:** files of a replaced sstable are deleted only
//!   after the last outstanding reference drops.
//! - **Crash safety:** the obsoletion log is fsynced before any
//!   deletion; recovery resolves every half-done swap to all-old or
//!   all-new.

pub mod compaction;
pub mod descriptor;
pub mod fault;
pub mod memtable;
pub mod oblog;
pub mod policy;
pub mod ranges;
pub mod sstable;
pub mod tracker;
pub mod transaction;
pub mod verifier;
pub mod view;
