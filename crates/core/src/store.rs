//! Content store: immutable, content-addressed versions.
//!
//! A version's hash is the SHA-256 of its canonicalized content, so
//! identical content always lands on the same hash and is never stored
//! twice. Creating a version and advancing (or creating) its branch happen
//! in one transaction.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::content::content_hash;
use crate::db::{queries, Database};
use crate::errors::{DatabaseError, StoreError};
use crate::events::{topics, Event, EventEmitter};
use crate::models::{Branch, BranchType, Version, VersionSummary, VersionType, MAIN_BRANCH};

/// Parameters for [`VersionStore::create_version`].
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub campaign_id: String,
    pub content: Value,
    pub title: String,
    pub commit_message: String,
    pub author: String,
    pub version_type: VersionType,
    /// Branch that receives the commit. Defaults to `main`.
    pub branch_name: Option<String>,
    /// Explicit parents. When empty and the branch already exists, the
    /// branch's current head becomes the single parent.
    pub parent_hashes: Vec<String>,
    pub summary: Option<String>,
    pub metadata: Value,
}

/// Append-only store of [`Version`] snapshots.
pub struct VersionStore<'a> {
    db: &'a Database,
    events: &'a EventEmitter,
}

impl<'a> VersionStore<'a> {
    pub fn new(db: &'a Database, events: &'a EventEmitter) -> Self {
        Self { db, events }
    }

    /// Create an immutable version and advance (or create) its branch, in
    /// one transaction.
    ///
    /// Fails with [`StoreError::DuplicateVersion`] when content with the
    /// same hash was already committed.
    pub fn create_version(&self, new: NewVersion) -> Result<Version, StoreError> {
        let branch_name = new
            .branch_name
            .clone()
            .unwrap_or_else(|| MAIN_BRANCH.to_string());
        let hash = content_hash(&new.content);

        let version = self.db.transaction::<_, StoreError, _>(|conn| {
            if queries::version_exists(conn, &hash)? {
                return Err(StoreError::DuplicateVersion(hash.clone()));
            }

            let existing = match queries::get_branch(conn, &new.campaign_id, &branch_name) {
                Ok(branch) => Some(branch),
                Err(DatabaseError::NotFound { .. }) => None,
                Err(e) => return Err(e.into()),
            };

            let mut parent_hashes = new.parent_hashes.clone();
            if parent_hashes.is_empty() {
                if let Some(ref branch) = existing {
                    parent_hashes = vec![branch.head.clone()];
                }
            }

            let version = Version {
                hash: hash.clone(),
                campaign_id: new.campaign_id.clone(),
                parent_hashes,
                branch_name: branch_name.clone(),
                version_type: new.version_type,
                author: new.author.clone(),
                commit_message: new.commit_message.clone(),
                title: new.title.clone(),
                summary: new.summary.clone(),
                content: new.content.clone(),
                metadata: new.metadata.clone(),
                created_at: Utc::now(),
            };
            queries::insert_version(conn, &version)?;

            match existing {
                Some(branch) => {
                    queries::advance_branch_head(
                        conn,
                        &new.campaign_id,
                        &branch_name,
                        &branch.head,
                        &version.hash,
                    )?;
                }
                None => {
                    let now = Utc::now();
                    let branch_type = if branch_name == MAIN_BRANCH {
                        BranchType::Main
                    } else {
                        BranchType::Alternate
                    };
                    queries::insert_branch(
                        conn,
                        &Branch {
                            campaign_id: new.campaign_id.clone(),
                            name: branch_name.clone(),
                            head: version.hash.clone(),
                            base: None,
                            branch_type,
                            description: None,
                            is_merged: false,
                            merged_at: None,
                            metadata: json!({}),
                            created_at: now,
                            updated_at: now,
                        },
                    )?;
                }
            }

            let _ = queries::insert_audit_log(
                conn,
                &version.author,
                "create_version",
                Some(&version.campaign_id),
                Some(&version.hash),
                &json!({"branch": branch_name, "version_type": version.version_type}).to_string(),
            );

            Ok(version)
        })?;

        info!(
            campaign_id = %version.campaign_id,
            hash = %version.hash,
            branch = %version.branch_name,
            "created version"
        );
        self.events.emit(Event::new(
            topics::VERSION_CREATED,
            Some(&version.campaign_id),
            json!({
                "campaign_id": version.campaign_id,
                "version_hash": version.hash,
                "branch": version.branch_name,
                "version_type": version.version_type,
            }),
        ));

        Ok(version)
    }

    /// Get a version by hash, verifying that its stored content still hashes
    /// to its key.
    pub fn get_version(&self, hash: &str) -> Result<Version, StoreError> {
        let version = match self.db.get_version(hash) {
            Ok(version) => version,
            Err(DatabaseError::NotFound { .. }) => {
                return Err(StoreError::VersionNotFound(hash.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let actual = content_hash(&version.content);
        if actual != version.hash {
            return Err(StoreError::CorruptVersion {
                hash: version.hash,
                actual,
            });
        }
        Ok(version)
    }

    /// Get a version's metadata without its content payload.
    pub fn get_version_summary(&self, hash: &str) -> Result<VersionSummary, StoreError> {
        match self.db.get_version_summary(hash) {
            Ok(summary) => Ok(summary),
            Err(DatabaseError::NotFound { .. }) => {
                Err(StoreError::VersionNotFound(hash.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk a branch's history newest-first along each version's first
    /// parent, stopping at a root version or after `max_count` entries.
    ///
    /// A revisited hash means the stored graph is corrupt and fails with
    /// [`StoreError::HistoryCycle`].
    pub fn get_version_history(
        &self,
        campaign_id: &str,
        branch: Option<&str>,
        max_count: Option<usize>,
    ) -> Result<Vec<Version>, StoreError> {
        let branch_name = branch.unwrap_or(MAIN_BRANCH);

        self.db.transaction::<_, StoreError, _>(|conn| {
            let head = queries::get_branch(conn, campaign_id, branch_name)?.head;

            let mut versions = Vec::new();
            let mut visited = HashSet::new();
            let mut next = Some(head);

            while let Some(hash) = next {
                if let Some(max) = max_count {
                    if versions.len() >= max {
                        break;
                    }
                }
                if !visited.insert(hash.clone()) {
                    return Err(StoreError::HistoryCycle {
                        campaign_id: campaign_id.to_string(),
                        hash,
                    });
                }
                let version = queries::get_version(conn, &hash)?;
                next = version.parent_hashes.first().cloned();
                versions.push(version);
            }

            Ok(versions)
        })
    }
}
