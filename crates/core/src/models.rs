//! Domain model types used throughout Chronicle.
//!
//! These types bridge the version store, branch registry, merge engine, and
//! database layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Branch that every campaign's first commit lands on unless told otherwise.
pub const MAIN_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// An immutable content snapshot, analogous to a commit.
///
/// The `hash` is the hex SHA-256 of the canonical serialization of `content`
/// and acts as the primary key. A version is never mutated or deleted after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub hash: String,
    pub campaign_id: String,
    /// 0 entries = root, 1 = normal commit, 2 = merge commit.
    pub parent_hashes: Vec<String>,
    pub branch_name: String,
    pub version_type: VersionType,
    pub author: String,
    pub commit_message: String,
    pub title: String,
    pub summary: Option<String>,
    /// Arbitrary structured campaign/chapter payload.
    pub content: Value,
    /// Free-form side-channel map.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Metadata-only projection of a [`Version`] (no content payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub hash: String,
    pub campaign_id: String,
    pub parent_hashes: Vec<String>,
    pub branch_name: String,
    pub version_type: VersionType,
    pub author: String,
    pub commit_message: String,
    pub title: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What stage of authoring a version captures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Skeleton,
    Draft,
    Published,
    Played,
    Branch,
    Merge,
}

impl VersionType {
    /// Parse a version-type string.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "skeleton" => Self::Skeleton,
            "published" => Self::Published,
            "played" => Self::Played,
            "branch" => Self::Branch,
            "merge" => Self::Merge,
            _ => Self::Draft,
        }
    }
}

impl std::fmt::Display for VersionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skeleton => write!(f, "skeleton"),
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Played => write!(f, "played"),
            Self::Branch => write!(f, "branch"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// A named mutable pointer to a version.
///
/// `head` always references an existing version of the same campaign; it
/// moves only through the commit and merge paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub campaign_id: String,
    pub name: String,
    pub head: String,
    /// Ancestor hash the branch diverged from; null for implicitly created
    /// branches.
    pub base: Option<String>,
    pub branch_type: BranchType,
    pub description: Option<String>,
    pub is_merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// True for the campaign's main storyline, which never gets retired by
    /// a merge.
    pub fn is_main(&self) -> bool {
        self.branch_type == BranchType::Main
    }
}

/// What kind of storyline a branch tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    Main,
    Alternate,
    PlayerChoice,
    Experimental,
    Parallel,
}

impl BranchType {
    /// Parse a branch-type string.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "main" => Self::Main,
            "player_choice" => Self::PlayerChoice,
            "experimental" => Self::Experimental,
            "parallel" => Self::Parallel,
            _ => Self::Alternate,
        }
    }
}

impl std::fmt::Display for BranchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Alternate => write!(f, "alternate"),
            Self::PlayerChoice => write!(f, "player_choice"),
            Self::Experimental => write!(f, "experimental"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge request
// ---------------------------------------------------------------------------

/// A proposed merge between two branches, with conflict tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: String,
    pub campaign_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub reviewers: Vec<String>,
    pub status: MergeRequestStatus,
    pub merged_by: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_hash: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Merge request lifecycle state.
///
/// Transitions: open → conflicts → open → merged, or open/conflicts →
/// closed. `merged` and `closed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeRequestStatus {
    Open,
    Conflicts,
    Merged,
    Closed,
}

impl MergeRequestStatus {
    /// Parse a status string.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "conflicts" => Self::Conflicts,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }

    /// True for states that admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

impl std::fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Conflicts => write!(f, "conflicts"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict (model-layer)
// ---------------------------------------------------------------------------

/// One disputed content path inside a merge request.
///
/// This is distinct from `content::diff::DiffEntry` which is the in-memory
/// detection-time representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub merge_request_id: String,
    /// First segment of the conflicting path; `campaign` for root-level keys.
    pub entity_type: String,
    /// Dotted path into the content tree.
    pub path: String,
    /// Leaf segment of the path.
    pub field: String,
    pub conflict_type: ConflictType,
    /// Stringified value on the source side; `"missing"` if absent.
    pub source_value: String,
    /// Stringified value on the target side; `"missing"` if absent.
    pub target_value: String,
    pub resolution_options: Vec<ConflictResolution>,
    pub resolution: Option<ConflictResolution>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_data: Option<Value>,
}

impl Conflict {
    /// True once a resolution has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// How the two sides of a conflict differ.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides present with different values.
    ValueMismatch,
    /// The key exists only on the target side.
    MissingInSource,
    /// The key exists only on the source side.
    MissingInTarget,
}

impl ConflictType {
    /// Parse a conflict-type string.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "missing_in_source" => Self::MissingInSource,
            "missing_in_target" => Self::MissingInTarget,
            _ => Self::ValueMismatch,
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValueMismatch => write!(f, "value_mismatch"),
            Self::MissingInSource => write!(f, "missing_in_source"),
            Self::MissingInTarget => write!(f, "missing_in_target"),
        }
    }
}

/// How a conflict (or a manual-merge path) is resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    TakeSource,
    TakeTarget,
    Merge,
}

impl ConflictResolution {
    /// Parse a resolution string; unknown strings are no resolution.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "take_source" => Some(Self::TakeSource),
            "take_target" => Some(Self::TakeTarget),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeSource => write!(f, "take_source"),
            Self::TakeTarget => write!(f, "take_target"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Caller input for resolving one conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionInput {
    pub resolution: ConflictResolution,
    pub resolved_by: String,
    #[serde(default)]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Merge strategy
// ---------------------------------------------------------------------------

/// How merged content is computed from two branch heads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Caller supplies per-path choices; target content is the base.
    Manual,
    /// Recursive structural merge; target wins scalar conflicts.
    Auto,
    /// Caller supplies paths to copy from source into target.
    CherryPick,
}

impl MergeStrategy {
    /// Parse a strategy string; `None` means the strategy is unsupported.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            "cherry_pick" => Some(Self::CherryPick),
            _ => None,
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
            Self::CherryPick => write!(f, "cherry_pick"),
        }
    }
}

/// How `ConflictResolution::Merge` combines the two values at a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueMergeStrategy {
    /// Strings join with a blank line; the default.
    Concat,
    /// Lists and maps union, target side first.
    Union,
    SourceWins,
    TargetWins,
}

impl std::fmt::Display for ValueMergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concat => write!(f, "concat"),
            Self::Union => write!(f, "union"),
            Self::SourceWins => write!(f, "source_wins"),
            Self::TargetWins => write!(f, "target_wins"),
        }
    }
}

/// Per-path choice for the manual merge strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathChoice {
    pub choice: ConflictResolution,
    #[serde(default)]
    pub merge_strategy: Option<ValueMergeStrategy>,
}

/// Resolution data supplied to `merge_branches`.
///
/// `choices` drives the manual strategy (dotted path → choice); `paths`
/// drives cherry-pick. A `BTreeMap` keeps overlay order deterministic when
/// chosen paths nest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionData {
    #[serde(default)]
    pub choices: BTreeMap<String, PathChoice>,
    #[serde(default)]
    pub paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Audit entry
// ---------------------------------------------------------------------------

/// An audit-log entry as read back from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub campaign_id: Option<String>,
    pub subject: Option<String>,
    pub details: String,
}

// ---------------------------------------------------------------------------
// Campaign status
// ---------------------------------------------------------------------------

/// High-level per-campaign summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatus {
    pub campaign_id: String,
    pub version_count: i64,
    pub branch_count: i64,
    pub open_merge_requests: i64,
    pub unresolved_conflicts: i64,
    pub branches: Vec<Branch>,
}
