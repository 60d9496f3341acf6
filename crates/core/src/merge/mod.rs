//! Merge requests, conflict detection, and branch merging.
//!
//! The merge subsystem is responsible for:
//! 1. **Requests** -- opening merge requests and recording their conflicts.
//! 2. **Resolution** -- applying per-conflict decisions until none remain.
//! 3. **Merging** -- computing merged content and landing the merge commit.

pub mod engine;
pub mod strategy;

pub use engine::{MergeEngine, NewMergeRequest};
pub use strategy::{apply_manual, auto_merge, cherry_pick, compute_merged, merge_values};
