//! Typed query helpers for every table in the Chronicle database.
//!
//! Helpers that participate in multi-statement operations are free functions
//! over `&Connection` so they compose inside one transaction; [`Database`]
//! carries lock-and-delegate convenience methods for single reads.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models;

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const VERSION_COLUMNS: &str = "hash, campaign_id, parent_hashes, branch_name, version_type, \
     author, commit_message, title, summary, content, metadata, created_at";

const BRANCH_COLUMNS: &str = "campaign_id, name, head, base, branch_type, description, \
     is_merged, merged_at, metadata, created_at, updated_at";

const MERGE_REQUEST_COLUMNS: &str = "id, campaign_id, source_branch, target_branch, title, \
     description, author, reviewers, status, merged_by, merged_at, merge_commit_hash, \
     metadata, created_at, updated_at";

const CONFLICT_COLUMNS: &str = "id, merge_request_id, entity_type, path, field, conflict_type, \
     source_value, target_value, resolution_options, resolution, resolved_by, resolved_at, \
     resolution_data";

fn version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<models::Version> {
    let parent_hashes: String = row.get(2)?;
    let version_type: String = row.get(4)?;
    let content: String = row.get(9)?;
    let metadata: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    Ok(models::Version {
        hash: row.get(0)?,
        campaign_id: row.get(1)?,
        parent_hashes: parse_string_list(&parent_hashes),
        branch_name: row.get(3)?,
        version_type: models::VersionType::from_str_val(&version_type),
        author: row.get(5)?,
        commit_message: row.get(6)?,
        title: row.get(7)?,
        summary: row.get(8)?,
        content: parse_json(&content),
        metadata: parse_json(&metadata),
        created_at: parse_datetime(&created_at),
    })
}

fn version_summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<models::VersionSummary> {
    let parent_hashes: String = row.get(2)?;
    let version_type: String = row.get(4)?;
    let created_at: String = row.get(9)?;
    Ok(models::VersionSummary {
        hash: row.get(0)?,
        campaign_id: row.get(1)?,
        parent_hashes: parse_string_list(&parent_hashes),
        branch_name: row.get(3)?,
        version_type: models::VersionType::from_str_val(&version_type),
        author: row.get(5)?,
        commit_message: row.get(6)?,
        title: row.get(7)?,
        summary: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

fn branch_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<models::Branch> {
    let branch_type: String = row.get(4)?;
    let merged_at: Option<String> = row.get(7)?;
    let metadata: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(models::Branch {
        campaign_id: row.get(0)?,
        name: row.get(1)?,
        head: row.get(2)?,
        base: row.get(3)?,
        branch_type: models::BranchType::from_str_val(&branch_type),
        description: row.get(5)?,
        is_merged: row.get(6)?,
        merged_at: merged_at.as_deref().map(parse_datetime),
        metadata: parse_json(&metadata),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn merge_request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<models::MergeRequest> {
    let reviewers: String = row.get(7)?;
    let status: String = row.get(8)?;
    let merged_at: Option<String> = row.get(10)?;
    let metadata: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;
    Ok(models::MergeRequest {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        source_branch: row.get(2)?,
        target_branch: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        author: row.get(6)?,
        reviewers: parse_string_list(&reviewers),
        status: models::MergeRequestStatus::from_str_val(&status),
        merged_by: row.get(9)?,
        merged_at: merged_at.as_deref().map(parse_datetime),
        merge_commit_hash: row.get(11)?,
        metadata: parse_json(&metadata),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn conflict_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<models::Conflict> {
    let conflict_type: String = row.get(5)?;
    let resolution_options: String = row.get(8)?;
    let resolution: Option<String> = row.get(9)?;
    let resolved_at: Option<String> = row.get(11)?;
    let resolution_data: Option<String> = row.get(12)?;
    Ok(models::Conflict {
        id: row.get(0)?,
        merge_request_id: row.get(1)?,
        entity_type: row.get(2)?,
        path: row.get(3)?,
        field: row.get(4)?,
        conflict_type: models::ConflictType::from_str_val(&conflict_type),
        source_value: row.get(6)?,
        target_value: row.get(7)?,
        resolution_options: parse_resolution_options(&resolution_options),
        resolution: resolution
            .as_deref()
            .and_then(models::ConflictResolution::from_str_val),
        resolved_by: row.get(10)?,
        resolved_at: resolved_at.as_deref().map(parse_datetime),
        resolution_data: resolution_data.as_deref().map(parse_json),
    })
}

// ---------------------------------------------------------------------------
// versions
// ---------------------------------------------------------------------------

/// Check whether a version with this hash exists.
pub(crate) fn version_exists(conn: &Connection, hash: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM versions WHERE hash = ?1",
        params![hash],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Insert a version row. Immutable once written; there is no update path.
pub(crate) fn insert_version(
    conn: &Connection,
    version: &models::Version,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO versions (hash, campaign_id, parent_hashes, branch_name, version_type,
                               author, commit_message, title, summary, content, metadata,
                               created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            version.hash,
            version.campaign_id,
            to_json_text(&version.parent_hashes, "[]"),
            version.branch_name,
            version.version_type.to_string(),
            version.author,
            version.commit_message,
            version.title,
            version.summary,
            crate::content::canonical_json(&version.content),
            to_json_text(&version.metadata, "{}"),
            version.created_at.to_rfc3339(),
        ],
    )?;
    debug!(hash = %version.hash, campaign_id = %version.campaign_id,
           branch = %version.branch_name, "inserted version");
    Ok(())
}

/// Get a version by hash (error if not found).
pub(crate) fn get_version(conn: &Connection, hash: &str) -> Result<models::Version, DatabaseError> {
    conn.query_row(
        &format!("SELECT {VERSION_COLUMNS} FROM versions WHERE hash = ?1"),
        params![hash],
        version_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: "version".into(),
            id: hash.to_string(),
        },
        other => other.into(),
    })
}

/// Get a version's metadata-only projection by hash (error if not found).
pub(crate) fn get_version_summary(
    conn: &Connection,
    hash: &str,
) -> Result<models::VersionSummary, DatabaseError> {
    conn.query_row(
        "SELECT hash, campaign_id, parent_hashes, branch_name, version_type, author,
                commit_message, title, summary, created_at
         FROM versions WHERE hash = ?1",
        params![hash],
        version_summary_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: "version".into(),
            id: hash.to_string(),
        },
        other => other.into(),
    })
}

/// Count versions belonging to a campaign.
pub(crate) fn count_versions(conn: &Connection, campaign_id: &str) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM versions WHERE campaign_id = ?1",
        params![campaign_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// branches
// ---------------------------------------------------------------------------

/// Get a branch by campaign and name (error if not found).
pub(crate) fn get_branch(
    conn: &Connection,
    campaign_id: &str,
    name: &str,
) -> Result<models::Branch, DatabaseError> {
    conn.query_row(
        &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE campaign_id = ?1 AND name = ?2"),
        params![campaign_id, name],
        branch_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: "branch".into(),
            id: format!("{campaign_id}/{name}"),
        },
        other => other.into(),
    })
}

/// Check whether a branch exists in a campaign.
pub(crate) fn branch_exists(
    conn: &Connection,
    campaign_id: &str,
    name: &str,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM branches WHERE campaign_id = ?1 AND name = ?2",
        params![campaign_id, name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Insert a branch row.
pub(crate) fn insert_branch(
    conn: &Connection,
    branch: &models::Branch,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO branches (campaign_id, name, head, base, branch_type, description,
                               is_merged, merged_at, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            branch.campaign_id,
            branch.name,
            branch.head,
            branch.base,
            branch.branch_type.to_string(),
            branch.description,
            branch.is_merged,
            branch.merged_at.map(|dt| dt.to_rfc3339()),
            to_json_text(&branch.metadata, "{}"),
            branch.created_at.to_rfc3339(),
            branch.updated_at.to_rfc3339(),
        ],
    )?;
    debug!(campaign_id = %branch.campaign_id, name = %branch.name, head = %branch.head,
           "inserted branch");
    Ok(())
}

/// Compare-and-swap the branch head: the update applies only while `head`
/// still equals `expected_head`. Zero rows changed means another writer got
/// there first; callers retry from a fresh read.
pub(crate) fn advance_branch_head(
    conn: &Connection,
    campaign_id: &str,
    name: &str,
    expected_head: &str,
    new_head: &str,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE branches SET head = ?1, updated_at = ?2
         WHERE campaign_id = ?3 AND name = ?4 AND head = ?5",
        params![new_head, now, campaign_id, name, expected_head],
    )?;
    if changed == 0 {
        return Err(DatabaseError::CasMismatch {
            entity: "branch".into(),
            id: format!("{campaign_id}/{name}"),
        });
    }
    debug!(campaign_id, name, new_head, "advanced branch head");
    Ok(())
}

/// Mark a branch as consumed by a merge.
pub(crate) fn mark_branch_merged(
    conn: &Connection,
    campaign_id: &str,
    name: &str,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE branches SET is_merged = 1, merged_at = ?1, updated_at = ?1
         WHERE campaign_id = ?2 AND name = ?3",
        params![now, campaign_id, name],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "branch".into(),
            id: format!("{campaign_id}/{name}"),
        });
    }
    debug!(campaign_id, name, "marked branch merged");
    Ok(())
}

/// List all branches of a campaign ordered by name.
pub(crate) fn list_branches(
    conn: &Connection,
    campaign_id: &str,
) -> Result<Vec<models::Branch>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE campaign_id = ?1 ORDER BY name"
    ))?;
    let branches = stmt
        .query_map(params![campaign_id], branch_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(branches)
}

// ---------------------------------------------------------------------------
// merge_requests
// ---------------------------------------------------------------------------

/// Insert a merge request row.
pub(crate) fn insert_merge_request(
    conn: &Connection,
    request: &models::MergeRequest,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO merge_requests (id, campaign_id, source_branch, target_branch, title,
                                     description, author, reviewers, status, merged_by,
                                     merged_at, merge_commit_hash, metadata, created_at,
                                     updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            request.id,
            request.campaign_id,
            request.source_branch,
            request.target_branch,
            request.title,
            request.description,
            request.author,
            to_json_text(&request.reviewers, "[]"),
            request.status.to_string(),
            request.merged_by,
            request.merged_at.map(|dt| dt.to_rfc3339()),
            request.merge_commit_hash,
            to_json_text(&request.metadata, "{}"),
            request.created_at.to_rfc3339(),
            request.updated_at.to_rfc3339(),
        ],
    )?;
    debug!(id = %request.id, source = %request.source_branch,
           target = %request.target_branch, "inserted merge request");
    Ok(())
}

/// Get a merge request by ID (error if not found).
pub(crate) fn get_merge_request(
    conn: &Connection,
    id: &str,
) -> Result<models::MergeRequest, DatabaseError> {
    conn.query_row(
        &format!("SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests WHERE id = ?1"),
        params![id],
        merge_request_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: "merge request".into(),
            id: id.to_string(),
        },
        other => other.into(),
    })
}

/// Compare-and-swap the merge request status. Zero rows changed means the
/// status moved underneath the caller; retry from a fresh read.
pub(crate) fn update_merge_request_status(
    conn: &Connection,
    id: &str,
    expected: models::MergeRequestStatus,
    new_status: models::MergeRequestStatus,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE merge_requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![new_status.to_string(), now, id, expected.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::CasMismatch {
            entity: "merge request".into(),
            id: id.to_string(),
        });
    }
    debug!(id, from = %expected, to = %new_status, "updated merge request status");
    Ok(())
}

/// Finalize a merge request as merged, guarded on the status the caller
/// read. Records who merged, when, and the merge commit hash.
pub(crate) fn set_merge_request_merged(
    conn: &Connection,
    id: &str,
    expected: models::MergeRequestStatus,
    merged_by: &str,
    merge_commit_hash: &str,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE merge_requests
         SET status = 'merged', merged_by = ?1, merged_at = ?2, merge_commit_hash = ?3,
             updated_at = ?2
         WHERE id = ?4 AND status = ?5",
        params![merged_by, now, merge_commit_hash, id, expected.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::CasMismatch {
            entity: "merge request".into(),
            id: id.to_string(),
        });
    }
    debug!(id, merged_by, merge_commit_hash, "merge request merged");
    Ok(())
}

/// List merge requests for a campaign, optionally filtered by status.
pub(crate) fn list_merge_requests(
    conn: &Connection,
    campaign_id: &str,
    status: Option<models::MergeRequestStatus>,
) -> Result<Vec<models::MergeRequest>, DatabaseError> {
    let (sql, bound_params): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status {
        Some(s) => (
            format!(
                "SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests
                 WHERE campaign_id = ?1 AND status = ?2 ORDER BY created_at DESC"
            ),
            vec![
                Box::new(campaign_id.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(s.to_string()),
            ],
        ),
        None => (
            format!(
                "SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests
                 WHERE campaign_id = ?1 ORDER BY created_at DESC"
            ),
            vec![Box::new(campaign_id.to_string()) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound_params.iter().map(|p| p.as_ref()).collect();
    let requests = stmt
        .query_map(param_refs.as_slice(), merge_request_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(requests)
}

/// Count merge requests of a campaign that are still actionable.
pub(crate) fn count_open_merge_requests(
    conn: &Connection,
    campaign_id: &str,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM merge_requests
         WHERE campaign_id = ?1 AND status IN ('open', 'conflicts')",
        params![campaign_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// conflicts
// ---------------------------------------------------------------------------

/// Insert a conflict row.
pub(crate) fn insert_conflict(
    conn: &Connection,
    conflict: &models::Conflict,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conflicts (id, merge_request_id, entity_type, path, field, conflict_type,
                                source_value, target_value, resolution_options, resolution,
                                resolved_by, resolved_at, resolution_data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            conflict.id,
            conflict.merge_request_id,
            conflict.entity_type,
            conflict.path,
            conflict.field,
            conflict.conflict_type.to_string(),
            conflict.source_value,
            conflict.target_value,
            to_json_text(&conflict.resolution_options, "[]"),
            conflict.resolution.map(|r| r.to_string()),
            conflict.resolved_by,
            conflict.resolved_at.map(|dt| dt.to_rfc3339()),
            conflict
                .resolution_data
                .as_ref()
                .map(|v| to_json_text(v, "null")),
        ],
    )?;
    debug!(id = %conflict.id, path = %conflict.path, "inserted conflict");
    Ok(())
}

/// Get a conflict by ID (error if not found).
pub(crate) fn get_conflict(conn: &Connection, id: &str) -> Result<models::Conflict, DatabaseError> {
    conn.query_row(
        &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"),
        params![id],
        conflict_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: "conflict".into(),
            id: id.to_string(),
        },
        other => other.into(),
    })
}

/// List a merge request's conflicts ordered by path.
pub(crate) fn list_conflicts_for_request(
    conn: &Connection,
    merge_request_id: &str,
    unresolved_only: bool,
) -> Result<Vec<models::Conflict>, DatabaseError> {
    let sql = if unresolved_only {
        format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts
             WHERE merge_request_id = ?1 AND resolution IS NULL ORDER BY path"
        )
    } else {
        format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts
             WHERE merge_request_id = ?1 ORDER BY path"
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let conflicts = stmt
        .query_map(params![merge_request_id], conflict_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(conflicts)
}

/// Count a merge request's unresolved conflicts.
pub(crate) fn count_unresolved_conflicts(
    conn: &Connection,
    merge_request_id: &str,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conflicts WHERE merge_request_id = ?1 AND resolution IS NULL",
        params![merge_request_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Count unresolved conflicts across a campaign's actionable merge requests.
pub(crate) fn count_unresolved_conflicts_in_campaign(
    conn: &Connection,
    campaign_id: &str,
) -> Result<i64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conflicts c
         JOIN merge_requests mr ON mr.id = c.merge_request_id
         WHERE mr.campaign_id = ?1 AND c.resolution IS NULL
           AND mr.status IN ('open', 'conflicts')",
        params![campaign_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Record a resolution on a conflict, guarded so an already-resolved row is
/// left untouched. Returns whether the update applied.
pub(crate) fn apply_conflict_resolution(
    conn: &Connection,
    conflict_id: &str,
    resolution: models::ConflictResolution,
    resolved_by: &str,
    resolution_data: Option<&Value>,
) -> Result<bool, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE conflicts
         SET resolution = ?1, resolved_by = ?2, resolved_at = ?3, resolution_data = ?4
         WHERE id = ?5 AND resolution IS NULL",
        params![
            resolution.to_string(),
            resolved_by,
            now,
            resolution_data.map(|v| to_json_text(v, "null")),
            conflict_id,
        ],
    )?;
    if changed > 0 {
        debug!(conflict_id, resolution = %resolution, resolved_by, "applied conflict resolution");
    }
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// audit_log
// ---------------------------------------------------------------------------

/// Insert an audit-log entry.
pub(crate) fn insert_audit_log(
    conn: &Connection,
    actor: &str,
    action: &str,
    campaign_id: Option<&str>,
    subject: Option<&str>,
    details: &str,
) -> Result<i64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO audit_log (actor, action, campaign_id, subject, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![actor, action, campaign_id, subject, details, now],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, action, "inserted audit_log entry");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Database convenience methods
// ---------------------------------------------------------------------------

impl Database {
    /// Get a version by hash.
    pub fn get_version(&self, hash: &str) -> Result<models::Version, DatabaseError> {
        get_version(&self.conn(), hash)
    }

    /// Get a version's metadata-only projection by hash.
    pub fn get_version_summary(&self, hash: &str) -> Result<models::VersionSummary, DatabaseError> {
        get_version_summary(&self.conn(), hash)
    }

    /// Check whether a version with this hash exists.
    pub fn version_exists(&self, hash: &str) -> Result<bool, DatabaseError> {
        version_exists(&self.conn(), hash)
    }

    /// Get a branch by campaign and name.
    pub fn get_branch(
        &self,
        campaign_id: &str,
        name: &str,
    ) -> Result<models::Branch, DatabaseError> {
        get_branch(&self.conn(), campaign_id, name)
    }

    /// List all branches of a campaign ordered by name.
    pub fn list_branches(&self, campaign_id: &str) -> Result<Vec<models::Branch>, DatabaseError> {
        list_branches(&self.conn(), campaign_id)
    }

    /// Get a merge request by ID.
    pub fn get_merge_request(&self, id: &str) -> Result<models::MergeRequest, DatabaseError> {
        get_merge_request(&self.conn(), id)
    }

    /// List merge requests for a campaign, optionally filtered by status.
    pub fn list_merge_requests(
        &self,
        campaign_id: &str,
        status: Option<models::MergeRequestStatus>,
    ) -> Result<Vec<models::MergeRequest>, DatabaseError> {
        list_merge_requests(&self.conn(), campaign_id, status)
    }

    /// Get a conflict by ID.
    pub fn get_conflict(&self, id: &str) -> Result<models::Conflict, DatabaseError> {
        get_conflict(&self.conn(), id)
    }

    /// List a merge request's conflicts ordered by path.
    pub fn list_conflicts_for_request(
        &self,
        merge_request_id: &str,
        unresolved_only: bool,
    ) -> Result<Vec<models::Conflict>, DatabaseError> {
        list_conflicts_for_request(&self.conn(), merge_request_id, unresolved_only)
    }

    /// Count a merge request's unresolved conflicts.
    pub fn count_unresolved_conflicts(
        &self,
        merge_request_id: &str,
    ) -> Result<i64, DatabaseError> {
        count_unresolved_conflicts(&self.conn(), merge_request_id)
    }

    /// Aggregate per-campaign counters for status reporting.
    pub fn campaign_status(
        &self,
        campaign_id: &str,
    ) -> Result<models::CampaignStatus, DatabaseError> {
        let conn = self.conn();
        let branches = list_branches(&conn, campaign_id)?;
        Ok(models::CampaignStatus {
            campaign_id: campaign_id.to_string(),
            version_count: count_versions(&conn, campaign_id)?,
            branch_count: branches.len() as i64,
            open_merge_requests: count_open_merge_requests(&conn, campaign_id)?,
            unresolved_conflicts: count_unresolved_conflicts_in_campaign(&conn, campaign_id)?,
            branches,
        })
    }

    /// List recent audit-log entries, newest first.
    pub fn recent_audit(&self, limit: u32) -> Result<Vec<models::AuditEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, actor, action, campaign_id, subject, details
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                let created_at: String = row.get(1)?;
                Ok(models::AuditEntry {
                    id: row.get(0)?,
                    timestamp: parse_datetime(&created_at),
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    campaign_id: row.get(4)?,
                    subject: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse a datetime string, returning Utc::now() as a fallback if parsing fails.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::Null)
}

fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn parse_resolution_options(s: &str) -> Vec<models::ConflictResolution> {
    serde_json::from_str(s).unwrap_or_default()
}

fn to_json_text<T: Serialize>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| fallback.to_string())
}
