//! Merge request lifecycle: open, resolve, merge, close.
//!
//! Every state change runs inside one transaction and conditions its
//! UPDATEs on the state read at the start, so two game masters racing on
//! the same request cannot both win. Events go out only after commit.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::strategy;
use crate::content::{content_hash, diff_trees, DiffEntry};
use crate::db::{queries, Database};
use crate::errors::{DatabaseError, MergeError, StoreError};
use crate::events::{topics, Event, EventEmitter};
use crate::models::{
    Conflict, MergeRequest, MergeRequestStatus, MergeStrategy, ResolutionData, ResolutionInput,
    Version, VersionType,
};

/// Parameters for [`MergeEngine::create_merge_request`].
#[derive(Debug, Clone)]
pub struct NewMergeRequest {
    pub campaign_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub reviewers: Vec<String>,
    pub metadata: Value,
}

/// Orchestrates merge requests between two branches of a campaign.
pub struct MergeEngine<'a> {
    db: &'a Database,
    events: &'a EventEmitter,
}

impl<'a> MergeEngine<'a> {
    pub fn new(db: &'a Database, events: &'a EventEmitter) -> Self {
        Self { db, events }
    }

    /// Open a merge request, diff the two branch heads, and persist one
    /// conflict row per divergent path. The request starts in `conflicts`
    /// when the diff found anything, `open` otherwise.
    pub fn create_merge_request(
        &self,
        new: NewMergeRequest,
    ) -> Result<MergeRequest, MergeError> {
        let (request, conflict_count) = self.db.transaction::<_, MergeError, _>(|conn| {
            let source = branch_for_merge(conn, &new.campaign_id, &new.source_branch)?;
            let target = branch_for_merge(conn, &new.campaign_id, &new.target_branch)?;

            let source_head = queries::get_version(conn, &source.head)?;
            let target_head = queries::get_version(conn, &target.head)?;
            let entries = diff_trees(&source_head.content, &target_head.content);

            let status = if entries.is_empty() {
                MergeRequestStatus::Open
            } else {
                MergeRequestStatus::Conflicts
            };
            let now = Utc::now();
            let request = MergeRequest {
                id: Uuid::new_v4().to_string(),
                campaign_id: new.campaign_id.clone(),
                source_branch: new.source_branch.clone(),
                target_branch: new.target_branch.clone(),
                title: new.title.clone(),
                description: new.description.clone(),
                author: new.author.clone(),
                reviewers: new.reviewers.clone(),
                status,
                merged_by: None,
                merged_at: None,
                merge_commit_hash: None,
                metadata: new.metadata.clone(),
                created_at: now,
                updated_at: now,
            };
            queries::insert_merge_request(conn, &request)?;

            for entry in &entries {
                queries::insert_conflict(conn, &conflict_from_entry(&request.id, entry))?;
            }

            let _ = queries::insert_audit_log(
                conn,
                &request.author,
                "create_merge_request",
                Some(&request.campaign_id),
                Some(&request.id),
                &json!({
                    "source": request.source_branch,
                    "target": request.target_branch,
                    "conflicts": entries.len(),
                })
                .to_string(),
            );

            Ok((request, entries.len()))
        })?;

        info!(
            campaign_id = %request.campaign_id,
            merge_request_id = %request.id,
            source = %request.source_branch,
            target = %request.target_branch,
            conflicts = conflict_count,
            "opened merge request"
        );
        self.events.emit(Event::new(
            topics::MERGE_REQUEST_CREATED,
            Some(&request.campaign_id),
            json!({
                "campaign_id": request.campaign_id,
                "merge_request_id": request.id,
                "source": request.source_branch,
                "target": request.target_branch,
                "has_conflicts": conflict_count > 0,
                "conflict_count": conflict_count,
            }),
        ));

        Ok(request)
    }

    /// Diff two versions' content trees without persisting anything.
    pub fn detect_conflicts(
        &self,
        campaign_id: &str,
        source_hash: &str,
        target_hash: &str,
    ) -> Result<Vec<DiffEntry>, MergeError> {
        let source = version_by_hash(self.db, source_hash)?;
        let target = version_by_hash(self.db, target_hash)?;

        let entries = diff_trees(&source.content, &target.content);
        debug!(
            campaign_id,
            source = source_hash,
            target = target_hash,
            conflicts = entries.len(),
            "diffed versions"
        );
        Ok(entries)
    }

    /// Apply per-conflict decisions. Conflicts already resolved are skipped,
    /// and once none remain the request moves from `conflicts` back to
    /// `open`. Returns the targeted conflicts as they stand afterwards.
    pub fn resolve_conflicts(
        &self,
        merge_request_id: &str,
        resolutions: &BTreeMap<String, ResolutionInput>,
    ) -> Result<Vec<Conflict>, MergeError> {
        let (request, updated, resolved, remaining) =
            self.db.transaction::<_, MergeError, _>(|conn| {
                let request = request_for_update(conn, merge_request_id)?;

                let mut resolved = 0usize;
                for (conflict_id, input) in resolutions {
                    let conflict = match queries::get_conflict(conn, conflict_id) {
                        Ok(conflict) => conflict,
                        Err(DatabaseError::NotFound { .. }) => {
                            return Err(MergeError::ConflictNotFound(conflict_id.clone()))
                        }
                        Err(e) => return Err(e.into()),
                    };
                    if conflict.merge_request_id != merge_request_id {
                        return Err(MergeError::ConflictNotFound(conflict_id.clone()));
                    }
                    if queries::apply_conflict_resolution(
                        conn,
                        conflict_id,
                        input.resolution,
                        &input.resolved_by,
                        input.data.as_ref(),
                    )? {
                        resolved += 1;
                    }
                }

                let remaining = queries::count_unresolved_conflicts(conn, merge_request_id)?;
                if remaining == 0 && request.status == MergeRequestStatus::Conflicts {
                    queries::update_merge_request_status(
                        conn,
                        merge_request_id,
                        MergeRequestStatus::Conflicts,
                        MergeRequestStatus::Open,
                    )?;
                }

                let actor = resolutions
                    .values()
                    .next()
                    .map(|input| input.resolved_by.clone())
                    .unwrap_or_else(|| "-".to_string());
                let _ = queries::insert_audit_log(
                    conn,
                    &actor,
                    "resolve_conflicts",
                    Some(&request.campaign_id),
                    Some(merge_request_id),
                    &json!({"resolved": resolved, "remaining": remaining}).to_string(),
                );

                let mut updated = Vec::with_capacity(resolutions.len());
                for conflict_id in resolutions.keys() {
                    updated.push(queries::get_conflict(conn, conflict_id)?);
                }
                let request = queries::get_merge_request(conn, merge_request_id)?;
                Ok((request, updated, resolved, remaining))
            })?;

        info!(
            merge_request_id,
            resolved,
            remaining,
            status = %request.status,
            "applied conflict resolutions"
        );
        self.events.emit(Event::new(
            topics::CONFLICTS_RESOLVED,
            Some(&request.campaign_id),
            json!({
                "merge_request_id": request.id,
                "resolved": resolved,
                "remaining": remaining,
                "status": request.status,
            }),
        ));

        Ok(updated)
    }

    /// Land a merge request: compute merged content via the named strategy,
    /// commit it as a merge version on the target branch, and mark the
    /// request merged. A source branch that is not the campaign's main line
    /// is flagged merged as well.
    pub fn merge_branches(
        &self,
        merge_request_id: &str,
        strategy_name: &str,
        message: &str,
        author: &str,
        resolution_data: Option<ResolutionData>,
    ) -> Result<Version, MergeError> {
        let strategy = MergeStrategy::parse(strategy_name)
            .ok_or_else(|| MergeError::UnsupportedStrategy(strategy_name.to_string()))?;

        let (version, request) = self.db.transaction::<_, MergeError, _>(|conn| {
            let request = request_for_update(conn, merge_request_id)?;

            let source = branch_for_merge(conn, &request.campaign_id, &request.source_branch)?;
            let target = branch_for_merge(conn, &request.campaign_id, &request.target_branch)?;
            let source_head = queries::get_version(conn, &source.head)?;
            let target_head = queries::get_version(conn, &target.head)?;

            let merged_content = strategy::compute_merged(
                strategy,
                &source_head.content,
                &target_head.content,
                resolution_data.as_ref(),
            )?;
            let hash = content_hash(&merged_content);
            if queries::version_exists(conn, &hash)? {
                return Err(StoreError::DuplicateVersion(hash).into());
            }

            let version = Version {
                hash: hash.clone(),
                campaign_id: request.campaign_id.clone(),
                parent_hashes: vec![source.head.clone(), target.head.clone()],
                branch_name: request.target_branch.clone(),
                version_type: VersionType::Merge,
                author: author.to_string(),
                commit_message: message.to_string(),
                title: target_head.title.clone(),
                summary: None,
                content: merged_content,
                metadata: json!({
                    "merge_request_id": request.id,
                    "strategy": strategy,
                    "resolution_data": serde_json::to_value(&resolution_data)
                        .unwrap_or(Value::Null),
                }),
                created_at: Utc::now(),
            };
            queries::insert_version(conn, &version)?;

            queries::set_merge_request_merged(
                conn,
                merge_request_id,
                request.status,
                author,
                &version.hash,
            )?;
            queries::advance_branch_head(
                conn,
                &request.campaign_id,
                &request.target_branch,
                &target.head,
                &version.hash,
            )?;
            if !source.is_main() {
                queries::mark_branch_merged(conn, &request.campaign_id, &request.source_branch)?;
            }

            let _ = queries::insert_audit_log(
                conn,
                author,
                "merge_branches",
                Some(&request.campaign_id),
                Some(merge_request_id),
                &json!({
                    "source": request.source_branch,
                    "target": request.target_branch,
                    "strategy": strategy,
                    "merge_commit": version.hash,
                })
                .to_string(),
            );

            Ok((version, request))
        })?;

        info!(
            campaign_id = %request.campaign_id,
            merge_request_id,
            merge_commit = %version.hash,
            strategy = %strategy,
            "merged branches"
        );
        self.events.emit(Event::new(
            topics::BRANCHES_MERGED,
            Some(&request.campaign_id),
            json!({
                "campaign_id": request.campaign_id,
                "merge_request_id": request.id,
                "source": request.source_branch,
                "target": request.target_branch,
                "merge_commit_hash": version.hash,
                "strategy": strategy,
            }),
        ));

        Ok(version)
    }

    /// Close a merge request without merging. Only non-terminal requests can
    /// be closed.
    pub fn close_merge_request(
        &self,
        merge_request_id: &str,
        closed_by: &str,
    ) -> Result<MergeRequest, MergeError> {
        let request = self.db.transaction::<_, MergeError, _>(|conn| {
            let request = request_for_update(conn, merge_request_id)?;
            queries::update_merge_request_status(
                conn,
                merge_request_id,
                request.status,
                MergeRequestStatus::Closed,
            )?;

            let _ = queries::insert_audit_log(
                conn,
                closed_by,
                "close_merge_request",
                Some(&request.campaign_id),
                Some(merge_request_id),
                &json!({"previous_status": request.status}).to_string(),
            );

            Ok(queries::get_merge_request(conn, merge_request_id)?)
        })?;

        info!(merge_request_id, closed_by, "closed merge request");
        self.events.emit(Event::new(
            topics::MERGE_REQUEST_CLOSED,
            Some(&request.campaign_id),
            json!({
                "campaign_id": request.campaign_id,
                "merge_request_id": request.id,
                "closed_by": closed_by,
            }),
        ));

        Ok(request)
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Load a merge request that still admits state changes.
fn request_for_update(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<MergeRequest, MergeError> {
    let request = match queries::get_merge_request(conn, id) {
        Ok(request) => request,
        Err(DatabaseError::NotFound { .. }) => {
            return Err(MergeError::RequestNotFound(id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    if request.status.is_terminal() {
        return Err(MergeError::InvalidState {
            id: id.to_string(),
            status: request.status.to_string(),
            required: "open or conflicts".to_string(),
        });
    }
    Ok(request)
}

fn branch_for_merge(
    conn: &rusqlite::Connection,
    campaign_id: &str,
    name: &str,
) -> Result<crate::models::Branch, MergeError> {
    match queries::get_branch(conn, campaign_id, name) {
        Ok(branch) => Ok(branch),
        Err(DatabaseError::NotFound { .. }) => Err(MergeError::InvalidBranch {
            campaign_id: campaign_id.to_string(),
            name: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn version_by_hash(db: &Database, hash: &str) -> Result<Version, MergeError> {
    match db.get_version(hash) {
        Ok(version) => Ok(version),
        Err(DatabaseError::NotFound { .. }) => {
            Err(StoreError::VersionNotFound(hash.to_string()).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn conflict_from_entry(merge_request_id: &str, entry: &DiffEntry) -> Conflict {
    Conflict {
        id: Uuid::new_v4().to_string(),
        merge_request_id: merge_request_id.to_string(),
        entity_type: entity_type_for(&entry.path),
        path: entry.path.clone(),
        field: entry.field.clone(),
        conflict_type: entry.conflict_type,
        source_value: entry.source_value.clone(),
        target_value: entry.target_value.clone(),
        resolution_options: entry.resolution_options.clone(),
        resolution: None,
        resolved_by: None,
        resolved_at: None,
        resolution_data: None,
    }
}

/// First path segment names the entity a conflict belongs to; root-level
/// keys belong to the campaign itself.
fn entity_type_for(path: &str) -> String {
    match path.split_once('.') {
        Some((entity, _)) => entity.to_string(),
        None => "campaign".to_string(),
    }
}
