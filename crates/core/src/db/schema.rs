//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The `schema_version`
//! user-version pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
/// Versions start at 1. The current schema version is stored in the SQLite
/// `user_version` pragma.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial schema",
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            hash            TEXT PRIMARY KEY,
            campaign_id     TEXT NOT NULL,
            parent_hashes   TEXT NOT NULL DEFAULT '[]',
            branch_name     TEXT NOT NULL,
            version_type    TEXT NOT NULL DEFAULT 'draft',
            author          TEXT NOT NULL DEFAULT '',
            commit_message  TEXT NOT NULL DEFAULT '',
            title           TEXT NOT NULL DEFAULT '',
            summary         TEXT,
            content         TEXT NOT NULL,
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_versions_campaign ON versions (campaign_id);
        CREATE INDEX IF NOT EXISTS idx_versions_campaign_branch
            ON versions (campaign_id, branch_name);

        CREATE TABLE IF NOT EXISTS branches (
            campaign_id     TEXT NOT NULL,
            name            TEXT NOT NULL,
            head            TEXT NOT NULL REFERENCES versions (hash),
            base            TEXT,
            branch_type     TEXT NOT NULL DEFAULT 'alternate',
            description     TEXT,
            is_merged       INTEGER NOT NULL DEFAULT 0,
            merged_at       TEXT,
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (campaign_id, name)
        );

        CREATE TABLE IF NOT EXISTS merge_requests (
            id                TEXT PRIMARY KEY,
            campaign_id       TEXT NOT NULL,
            source_branch     TEXT NOT NULL,
            target_branch     TEXT NOT NULL,
            title             TEXT NOT NULL DEFAULT '',
            description       TEXT,
            author            TEXT NOT NULL DEFAULT '',
            reviewers         TEXT NOT NULL DEFAULT '[]',
            status            TEXT NOT NULL DEFAULT 'open'
                              CHECK (status IN ('open', 'conflicts', 'merged', 'closed')),
            merged_by         TEXT,
            merged_at         TEXT,
            merge_commit_hash TEXT,
            metadata          TEXT NOT NULL DEFAULT '{}',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_merge_requests_campaign ON merge_requests (campaign_id);
        CREATE INDEX IF NOT EXISTS idx_merge_requests_status ON merge_requests (status);

        CREATE TABLE IF NOT EXISTS conflicts (
            id                  TEXT PRIMARY KEY,
            merge_request_id    TEXT NOT NULL REFERENCES merge_requests (id) ON DELETE CASCADE,
            entity_type         TEXT NOT NULL DEFAULT 'campaign',
            path                TEXT NOT NULL,
            field               TEXT NOT NULL DEFAULT '',
            conflict_type       TEXT NOT NULL DEFAULT 'value_mismatch',
            source_value        TEXT NOT NULL DEFAULT '',
            target_value        TEXT NOT NULL DEFAULT '',
            resolution_options  TEXT NOT NULL DEFAULT '[]',
            resolution          TEXT,
            resolved_by         TEXT,
            resolved_at         TEXT,
            resolution_data     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_conflicts_merge_request ON conflicts (merge_request_id);
        "#,
    ),
    (
        2,
        "audit log",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            actor       TEXT NOT NULL DEFAULT '',
            action      TEXT NOT NULL,
            campaign_id TEXT,
            subject     TEXT,
            details     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
        "#,
    ),
    (
        3,
        "index unresolved conflicts",
        r#"
        CREATE INDEX IF NOT EXISTS idx_conflicts_unresolved
            ON conflicts (merge_request_id) WHERE resolution IS NULL;
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 3);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        assert!(tables.contains(&"versions".to_string()));
        assert!(tables.contains(&"branches".to_string()));
        assert!(tables.contains(&"merge_requests".to_string()));
        assert!(tables.contains(&"conflicts".to_string()));
        assert!(tables.contains(&"audit_log".to_string()));
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO merge_requests (id, campaign_id, source_branch, target_branch,
                                         status, created_at, updated_at)
             VALUES ('mr-1', 'camp-1', 'alt', 'main', 'bogus',
                     '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
