//! Error types for the Chronicle core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`ChronicleError`] enum unifies them all for callers that want
//! a single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ChronicleError {
    /// True when the error is a lost compare-and-swap and the whole
    /// operation can be retried from a fresh read.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChronicleError::Database(DatabaseError::CasMismatch { .. })
                | ChronicleError::Store(StoreError::Database(DatabaseError::CasMismatch { .. }))
                | ChronicleError::Branch(BranchError::Database(DatabaseError::CasMismatch { .. }))
                | ChronicleError::Merge(MergeError::Database(DatabaseError::CasMismatch { .. }))
        )
    }
}

// ---------------------------------------------------------------------------
// Content store errors
// ---------------------------------------------------------------------------

/// Errors from the version content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested version hash was not found.
    #[error("version not found: {0}")]
    VersionNotFound(String),

    /// Content-addressed dedup: a version with this hash already exists.
    #[error("duplicate version: content hash {0} already exists")]
    DuplicateVersion(String),

    /// Stored content no longer hashes to the recorded identifier.
    #[error("version {hash} failed integrity check (content hashes to {actual})")]
    CorruptVersion {
        hash: String,
        actual: String,
    },

    /// A parent walk revisited a hash — corrupt history, never auto-repaired.
    #[error("history cycle detected at version {hash} in campaign '{campaign_id}'")]
    HistoryCycle {
        campaign_id: String,
        hash: String,
    },

    /// Database error while reading or writing versions.
    #[error("store database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Branch registry errors
// ---------------------------------------------------------------------------

/// Errors from the branch registry.
#[derive(Debug, Error)]
pub enum BranchError {
    /// The requested branch does not exist in the campaign.
    #[error("branch '{name}' not found in campaign '{campaign_id}'")]
    NotFound {
        campaign_id: String,
        name: String,
    },

    /// A branch with this name already exists in the campaign.
    #[error("branch '{name}' already exists in campaign '{campaign_id}'")]
    Duplicate {
        campaign_id: String,
        name: String,
    },

    /// The start point does not resolve to a version in this campaign.
    #[error("invalid start point {hash}: {detail}")]
    InvalidStartPoint {
        hash: String,
        detail: String,
    },

    /// The branch name contains characters outside the allowed set.
    #[error("invalid branch name '{0}' (allowed: letters, digits, '.', '_', '-', '/')")]
    InvalidName(String),

    /// Database error while reading or writing branches.
    #[error("branch database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Merge engine errors
// ---------------------------------------------------------------------------

/// Errors from merge request handling and branch merging.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The requested merge request ID was not found.
    #[error("merge request not found: {0}")]
    RequestNotFound(String),

    /// The requested conflict ID was not found.
    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    /// A named branch does not exist in the campaign.
    #[error("invalid branch '{name}' for merge in campaign '{campaign_id}'")]
    InvalidBranch {
        campaign_id: String,
        name: String,
    },

    /// The merge request is in a terminal state for this operation.
    #[error("merge request {id} is '{status}'; operation requires {required}")]
    InvalidState {
        id: String,
        status: String,
        required: String,
    },

    /// The strategy needs resolution data and none was supplied.
    #[error("merge strategy '{0}' requires resolution data")]
    MissingResolutionData(String),

    /// The strategy name is not one of manual / auto / cherry_pick.
    #[error("unsupported merge strategy: {0}")]
    UnsupportedStrategy(String),

    /// Underlying store error during merge.
    #[error("merge store error: {0}")]
    Store(#[from] StoreError),

    /// Underlying branch error during merge.
    #[error("merge branch error: {0}")]
    Branch(#[from] BranchError),

    /// Database error while persisting merge state.
    #[error("merge database error: {0}")]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Event emitter errors
// ---------------------------------------------------------------------------

/// Errors from event publishing channels. These are logged and swallowed by
/// the emitter — they never fail the operation that produced the event.
#[derive(Debug, Error)]
pub enum EventError {
    /// Webhook delivery failed (non-success HTTP status).
    #[error("webhook delivery failed (HTTP {status}): {body}")]
    WebhookRejected {
        status: u16,
        body: String,
    },

    /// HTTP-level transport error (network, TLS, etc.).
    #[error("event HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Event payload could not be serialized.
    #[error("event payload serialization error: {0}")]
    SerializeError(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error(
        "required environment variable '{var}' is not set (referenced by config field '{field}')"
    )]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A conditional update matched zero rows: the row's guarded column no
    /// longer holds the value the caller read. Transient — retry from a
    /// fresh read.
    #[error("concurrent modification of {entity} '{id}': expected value changed underneath")]
    CasMismatch {
        entity: String,
        id: String,
    },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Convenience conversions
// ---------------------------------------------------------------------------

// ChronicleError implements `std::error::Error` via `thiserror`, which means
// `anyhow::Error: From<ChronicleError>` is already provided by the blanket
// impl in `anyhow`. No manual `From` impl is needed.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = StoreError::DuplicateVersion("abc123".into());
        assert_eq!(
            err.to_string(),
            "duplicate version: content hash abc123 already exists"
        );

        let err = BranchError::NotFound {
            campaign_id: "camp-1".into(),
            name: "alt".into(),
        };
        assert_eq!(err.to_string(), "branch 'alt' not found in campaign 'camp-1'");

        let err = MergeError::UnsupportedStrategy("rebase".into());
        assert_eq!(err.to_string(), "unsupported merge strategy: rebase");

        let err = ConfigError::EnvVarMissing {
            var: "CHRONICLE_WEBHOOK_SECRET".into(),
            field: "events.webhook_secret_env".into(),
        };
        assert!(err.to_string().contains("CHRONICLE_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_chronicle_error_from_subsystem() {
        let store_err = StoreError::VersionNotFound("deadbeef".into());
        let top: ChronicleError = store_err.into();
        assert!(matches!(top, ChronicleError::Store(_)));

        let db_err = DatabaseError::NotFound {
            entity: "merge request".into(),
            id: "mr-1".into(),
        };
        let top: ChronicleError = ChronicleError::Database(db_err);
        assert!(matches!(top, ChronicleError::Database(_)));
    }

    #[test]
    fn test_cas_mismatch_is_transient() {
        let err: ChronicleError = StoreError::Database(DatabaseError::CasMismatch {
            entity: "branch".into(),
            id: "camp-1/main".into(),
        })
        .into();
        assert!(err.is_transient());

        let err: ChronicleError = StoreError::VersionNotFound("abc".into()).into();
        assert!(!err.is_transient());
    }
}
