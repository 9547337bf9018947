//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size bucketing of enumerated files ([`SizeIndex`])
//! - Concurrent digest indexing ([`HashIndex`])
//! - The walk, filter, hash, group pipeline ([`DuplicateFinder`])

pub mod finder;
pub mod groups;
pub mod index;

pub use finder::{
    hash_candidates, DuplicateFinder, FinderConfig, FinderError, HashStats, ScanSummary,
};
pub use groups::{DedupGroup, GroupingStats, SizeIndex};
pub use index::HashIndex;
