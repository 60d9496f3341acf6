//! Engine facade: one handle wiring configuration, storage, and events.
//!
//! [`Chronicle`] owns the database and the event emitter and exposes every
//! public operation by delegating to the stateless components
//! ([`VersionStore`], [`BranchRegistry`], [`MergeEngine`]). Configuration
//! defaults (branch, author) are applied here so the components stay free
//! of config concerns.

use std::collections::BTreeMap;

use tracing::info;

use crate::branch::{BranchRegistry, NewBranch};
use crate::config::AppConfig;
use crate::content::DiffEntry;
use crate::db::Database;
use crate::errors::{ChronicleError, DatabaseError, MergeError};
use crate::events::{EventEmitter, EventPublisher};
use crate::merge::{MergeEngine, NewMergeRequest};
use crate::models::{
    AuditEntry, Branch, CampaignStatus, Conflict, MergeRequest, MergeRequestStatus,
    ResolutionData, ResolutionInput, Version, VersionSummary,
};
use crate::store::{NewVersion, VersionStore};

/// Main entry point for embedding the version engine.
pub struct Chronicle {
    config: AppConfig,
    db: Database,
    events: EventEmitter,
}

impl Chronicle {
    /// Open (or create) the database named by the configuration, run
    /// migrations, and attach event channels from `[events]`.
    pub fn open(config: AppConfig) -> Result<Self, ChronicleError> {
        let db = Database::new(&config.storage.db_path)?;
        db.initialize()?;
        let events = EventEmitter::from_config(&config.events);
        info!(db_path = %config.storage.db_path.display(), "chronicle engine ready");
        Ok(Self {
            config,
            db,
            events,
        })
    }

    /// Engine over an in-memory database with no event channels, for tests
    /// and dry runs. Attach publishers with [`Self::add_event_channel`].
    pub fn in_memory() -> Result<Self, ChronicleError> {
        let db = Database::in_memory()?;
        db.initialize()?;
        Ok(Self {
            config: AppConfig::default(),
            db,
            events: EventEmitter::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Attach an additional event channel.
    pub fn add_event_channel(&mut self, channel: Box<dyn EventPublisher>) {
        self.events.add_channel(channel);
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    /// Commit a content snapshot. A missing branch name falls back to
    /// `[engine].default_branch` and an empty author to
    /// `[engine].default_author`.
    pub fn create_version(&self, mut new: NewVersion) -> Result<Version, ChronicleError> {
        if new.branch_name.is_none() {
            new.branch_name = Some(self.config.engine.default_branch.clone());
        }
        if new.author.is_empty() {
            if let Some(ref author) = self.config.engine.default_author {
                new.author = author.clone();
            }
        }
        Ok(VersionStore::new(&self.db, &self.events).create_version(new)?)
    }

    pub fn get_version(&self, hash: &str) -> Result<Version, ChronicleError> {
        Ok(VersionStore::new(&self.db, &self.events).get_version(hash)?)
    }

    pub fn get_version_summary(&self, hash: &str) -> Result<VersionSummary, ChronicleError> {
        Ok(VersionStore::new(&self.db, &self.events).get_version_summary(hash)?)
    }

    /// Walk a branch's history newest-first. `branch` falls back to the
    /// configured default branch; `max_count` of `None` walks to the root.
    pub fn get_version_history(
        &self,
        campaign_id: &str,
        branch: Option<&str>,
        max_count: Option<usize>,
    ) -> Result<Vec<Version>, ChronicleError> {
        let branch = branch.unwrap_or(&self.config.engine.default_branch);
        Ok(VersionStore::new(&self.db, &self.events).get_version_history(
            campaign_id,
            Some(branch),
            max_count,
        )?)
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    pub fn create_branch(&self, new: NewBranch) -> Result<Branch, ChronicleError> {
        Ok(BranchRegistry::new(&self.db, &self.events).create_branch(new)?)
    }

    pub fn get_branch(&self, campaign_id: &str, name: &str) -> Result<Branch, ChronicleError> {
        Ok(BranchRegistry::new(&self.db, &self.events).get_branch(campaign_id, name)?)
    }

    pub fn list_branches(&self, campaign_id: &str) -> Result<Vec<Branch>, ChronicleError> {
        Ok(BranchRegistry::new(&self.db, &self.events).list_branches(campaign_id)?)
    }

    // -----------------------------------------------------------------------
    // Merge requests
    // -----------------------------------------------------------------------

    /// Open a merge request. An empty author falls back to
    /// `[engine].default_author`.
    pub fn create_merge_request(
        &self,
        mut new: NewMergeRequest,
    ) -> Result<MergeRequest, ChronicleError> {
        if new.author.is_empty() {
            if let Some(ref author) = self.config.engine.default_author {
                new.author = author.clone();
            }
        }
        Ok(MergeEngine::new(&self.db, &self.events).create_merge_request(new)?)
    }

    /// Diff two versions' content trees without persisting anything.
    pub fn detect_conflicts(
        &self,
        campaign_id: &str,
        source_hash: &str,
        target_hash: &str,
    ) -> Result<Vec<DiffEntry>, ChronicleError> {
        Ok(MergeEngine::new(&self.db, &self.events).detect_conflicts(
            campaign_id,
            source_hash,
            target_hash,
        )?)
    }

    pub fn resolve_conflicts(
        &self,
        merge_request_id: &str,
        resolutions: &BTreeMap<String, ResolutionInput>,
    ) -> Result<Vec<Conflict>, ChronicleError> {
        Ok(MergeEngine::new(&self.db, &self.events)
            .resolve_conflicts(merge_request_id, resolutions)?)
    }

    pub fn merge_branches(
        &self,
        merge_request_id: &str,
        strategy: &str,
        message: &str,
        author: &str,
        resolution_data: Option<ResolutionData>,
    ) -> Result<Version, ChronicleError> {
        let author = if author.is_empty() {
            self.config
                .engine
                .default_author
                .clone()
                .unwrap_or_default()
        } else {
            author.to_string()
        };
        Ok(MergeEngine::new(&self.db, &self.events).merge_branches(
            merge_request_id,
            strategy,
            message,
            &author,
            resolution_data,
        )?)
    }

    pub fn close_merge_request(
        &self,
        merge_request_id: &str,
        closed_by: &str,
    ) -> Result<MergeRequest, ChronicleError> {
        Ok(MergeEngine::new(&self.db, &self.events)
            .close_merge_request(merge_request_id, closed_by)?)
    }

    pub fn get_merge_request(&self, id: &str) -> Result<MergeRequest, ChronicleError> {
        match self.db.get_merge_request(id) {
            Ok(request) => Ok(request),
            Err(DatabaseError::NotFound { .. }) => {
                Err(MergeError::RequestNotFound(id.to_string()).into())
            }
            Err(e) => Err(ChronicleError::Database(e)),
        }
    }

    pub fn list_merge_requests(
        &self,
        campaign_id: &str,
        status: Option<MergeRequestStatus>,
    ) -> Result<Vec<MergeRequest>, ChronicleError> {
        Ok(self.db.list_merge_requests(campaign_id, status)?)
    }

    pub fn get_conflict(&self, id: &str) -> Result<Conflict, ChronicleError> {
        match self.db.get_conflict(id) {
            Ok(conflict) => Ok(conflict),
            Err(DatabaseError::NotFound { .. }) => {
                Err(MergeError::ConflictNotFound(id.to_string()).into())
            }
            Err(e) => Err(ChronicleError::Database(e)),
        }
    }

    pub fn list_conflicts(
        &self,
        merge_request_id: &str,
        unresolved_only: bool,
    ) -> Result<Vec<Conflict>, ChronicleError> {
        Ok(self
            .db
            .list_conflicts_for_request(merge_request_id, unresolved_only)?)
    }

    // -----------------------------------------------------------------------
    // Status & audit
    // -----------------------------------------------------------------------

    /// Per-campaign roll-up: version/branch counts, open merge requests,
    /// unresolved conflicts, and the branch list.
    pub fn campaign_status(&self, campaign_id: &str) -> Result<CampaignStatus, ChronicleError> {
        Ok(self.db.campaign_status(campaign_id)?)
    }

    /// Latest audit entries, newest first.
    pub fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>, ChronicleError> {
        Ok(self.db.recent_audit(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionType;
    use serde_json::json;

    fn draft(content: serde_json::Value) -> NewVersion {
        NewVersion {
            campaign_id: "camp-1".to_string(),
            content,
            title: "The Ambush".to_string(),
            commit_message: "commit".to_string(),
            author: "gm".to_string(),
            version_type: VersionType::Draft,
            branch_name: None,
            parent_hashes: vec![],
            summary: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn test_commit_uses_configured_default_branch() {
        let mut engine = Chronicle::in_memory().unwrap();
        engine.config.engine.default_branch = "campaign".to_string();

        let version = engine.create_version(draft(json!({"title": "A"}))).unwrap();
        assert_eq!(version.branch_name, "campaign");
        assert!(engine.get_branch("camp-1", "campaign").is_ok());
    }

    #[test]
    fn test_empty_author_falls_back_to_configured_default() {
        let mut engine = Chronicle::in_memory().unwrap();
        engine.config.engine.default_author = Some("dungeon-master".to_string());

        let mut new = draft(json!({"title": "A"}));
        new.author = String::new();
        let version = engine.create_version(new).unwrap();
        assert_eq!(version.author, "dungeon-master");
    }

    #[test]
    fn test_round_trip_and_status_counters() {
        let engine = Chronicle::in_memory().unwrap();

        let v1 = engine.create_version(draft(json!({"title": "A"}))).unwrap();
        engine.create_version(draft(json!({"title": "B"}))).unwrap();

        assert_eq!(engine.get_version(&v1.hash).unwrap().content, json!({"title": "A"}));
        assert_eq!(engine.get_version_history("camp-1", None, None).unwrap().len(), 2);

        let status = engine.campaign_status("camp-1").unwrap();
        assert_eq!(status.version_count, 2);
        assert_eq!(status.branch_count, 1);
        assert_eq!(status.open_merge_requests, 0);
        assert_eq!(status.unresolved_conflicts, 0);

        let audit = engine.recent_audit(10).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, "create_version");
    }

    #[test]
    fn test_missing_merge_request_maps_to_merge_error() {
        let engine = Chronicle::in_memory().unwrap();
        let err = engine.get_merge_request("nope").unwrap_err();
        assert!(matches!(
            err,
            ChronicleError::Merge(MergeError::RequestNotFound(_))
        ));

        let err = engine.get_conflict("nope").unwrap_err();
        assert!(matches!(
            err,
            ChronicleError::Merge(MergeError::ConflictNotFound(_))
        ));
    }
}
