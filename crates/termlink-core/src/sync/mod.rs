//! Versioned screen synchronization.
//!
//! This module provides:
//! - Snapshot and diff types with a pure cell-level diff
//! - The state synchronizer serving long-poll waiters
//! - JSON wire types for remote consumers

mod diff;
mod synchronizer;
mod wire;

pub use diff::{CellChange, Diff, VersionedSnapshot, diff_screens};
pub use synchronizer::StateSynchronizer;
pub use wire::{PollRequest, PollResponse, WireCell, WireChange, WireDiff, WireState};
