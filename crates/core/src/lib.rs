//! Chronicle core library.
//!
//! This crate provides the foundational components for version-controlled
//! campaign content: configuration, database persistence, content-addressed
//! version storage, branching, merge requests with conflict tracking, and
//! event delivery.

pub mod branch;
pub mod config;
pub mod content;
pub mod db;
pub mod engine;
pub mod errors;
pub mod events;
pub mod merge;
pub mod models;
pub mod store;

// Re-exports for convenience.
pub use branch::{BranchRegistry, NewBranch};
pub use config::AppConfig;
pub use db::Database;
pub use engine::Chronicle;
pub use errors::ChronicleError;
pub use events::{Event, EventEmitter, EventPublisher, RecordingPublisher};
pub use merge::{MergeEngine, NewMergeRequest};
pub use store::{NewVersion, VersionStore};
