//! Branch registry: named, mutable pointers into the content store.
//!
//! Branches are created here (or implicitly by the store's first commit to a
//! name); their heads move only through the store's commit path and the
//! merge engine's merge path.

use std::sync::OnceLock;

use chrono::Utc;
use regex_lite::Regex;
use serde_json::{json, Value};
use tracing::info;

use crate::db::{queries, Database};
use crate::errors::{BranchError, DatabaseError};
use crate::events::{topics, Event, EventEmitter};
use crate::models::{Branch, BranchType};

/// Parameters for [`BranchRegistry::create_branch`].
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub campaign_id: String,
    pub name: String,
    /// Version hash the branch diverges from; becomes both `base` and the
    /// initial `head`.
    pub start_point: String,
    pub branch_type: BranchType,
    pub description: Option<String>,
    pub metadata: Value,
}

/// Registry of [`Branch`] pointers, scoped per campaign.
pub struct BranchRegistry<'a> {
    db: &'a Database,
    events: &'a EventEmitter,
}

impl<'a> BranchRegistry<'a> {
    pub fn new(db: &'a Database, events: &'a EventEmitter) -> Self {
        Self { db, events }
    }

    /// Create a branch pointing at an existing version of the same campaign.
    pub fn create_branch(&self, new: NewBranch) -> Result<Branch, BranchError> {
        validate_branch_name(&new.name)?;

        let branch = self.db.transaction::<_, BranchError, _>(|conn| {
            if queries::branch_exists(conn, &new.campaign_id, &new.name)? {
                return Err(BranchError::Duplicate {
                    campaign_id: new.campaign_id.clone(),
                    name: new.name.clone(),
                });
            }

            let start = match queries::get_version(conn, &new.start_point) {
                Ok(version) => version,
                Err(DatabaseError::NotFound { .. }) => {
                    return Err(BranchError::InvalidStartPoint {
                        hash: new.start_point.clone(),
                        detail: "version does not exist".into(),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            if start.campaign_id != new.campaign_id {
                return Err(BranchError::InvalidStartPoint {
                    hash: new.start_point.clone(),
                    detail: format!("version belongs to campaign '{}'", start.campaign_id),
                });
            }

            let now = Utc::now();
            let branch = Branch {
                campaign_id: new.campaign_id.clone(),
                name: new.name.clone(),
                head: new.start_point.clone(),
                base: Some(new.start_point.clone()),
                branch_type: new.branch_type,
                description: new.description.clone(),
                is_merged: false,
                merged_at: None,
                metadata: new.metadata.clone(),
                created_at: now,
                updated_at: now,
            };
            queries::insert_branch(conn, &branch)?;

            let _ = queries::insert_audit_log(
                conn,
                "-",
                "create_branch",
                Some(&branch.campaign_id),
                Some(&branch.name),
                &json!({"start_point": branch.base, "branch_type": branch.branch_type})
                    .to_string(),
            );

            Ok(branch)
        })?;

        info!(
            campaign_id = %branch.campaign_id,
            name = %branch.name,
            head = %branch.head,
            "created branch"
        );
        self.events.emit(Event::new(
            topics::BRANCH_CREATED,
            Some(&branch.campaign_id),
            json!({
                "campaign_id": branch.campaign_id,
                "branch": branch.name,
                "branch_type": branch.branch_type,
                "start_point": branch.base,
            }),
        ));

        Ok(branch)
    }

    /// Get a branch by campaign and name.
    pub fn get_branch(&self, campaign_id: &str, name: &str) -> Result<Branch, BranchError> {
        match self.db.get_branch(campaign_id, name) {
            Ok(branch) => Ok(branch),
            Err(DatabaseError::NotFound { .. }) => Err(BranchError::NotFound {
                campaign_id: campaign_id.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// List a campaign's branches ordered by name.
    pub fn list_branches(&self, campaign_id: &str) -> Result<Vec<Branch>, BranchError> {
        Ok(self.db.list_branches(campaign_id)?)
    }
}

/// Branch names: leading alphanumeric, then alphanumerics plus `. _ / -`,
/// at most 100 characters.
pub fn validate_branch_name(name: &str) -> Result<(), BranchError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,99}$").expect("hardcoded pattern compiles")
    });
    if re.is_match(name) {
        Ok(())
    } else {
        Err(BranchError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionType;
    use crate::store::{NewVersion, VersionStore};

    fn setup() -> (Database, EventEmitter) {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        (db, EventEmitter::new())
    }

    fn commit(db: &Database, events: &EventEmitter, campaign_id: &str, content: Value) -> String {
        VersionStore::new(db, events)
            .create_version(NewVersion {
                campaign_id: campaign_id.to_string(),
                content,
                title: "Chapter One".to_string(),
                commit_message: "initial".to_string(),
                author: "gm".to_string(),
                version_type: VersionType::Draft,
                branch_name: None,
                parent_hashes: vec![],
                summary: None,
                metadata: json!({}),
            })
            .unwrap()
            .hash
    }

    fn new_branch(campaign_id: &str, name: &str, start_point: &str) -> NewBranch {
        NewBranch {
            campaign_id: campaign_id.to_string(),
            name: name.to_string(),
            start_point: start_point.to_string(),
            branch_type: BranchType::Alternate,
            description: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn test_create_branch_from_existing_version() {
        let (db, events) = setup();
        let head = commit(&db, &events, "camp-1", json!({"title": "A"}));

        let registry = BranchRegistry::new(&db, &events);
        let branch = registry
            .create_branch(new_branch("camp-1", "alt", &head))
            .unwrap();

        assert_eq!(branch.head, head);
        assert_eq!(branch.base.as_deref(), Some(head.as_str()));
        assert!(!branch.is_merged);

        let loaded = registry.get_branch("camp-1", "alt").unwrap();
        assert_eq!(loaded.head, head);
    }

    #[test]
    fn test_duplicate_branch_rejected() {
        let (db, events) = setup();
        let head = commit(&db, &events, "camp-1", json!({"title": "A"}));

        let registry = BranchRegistry::new(&db, &events);
        registry
            .create_branch(new_branch("camp-1", "alt", &head))
            .unwrap();
        let err = registry
            .create_branch(new_branch("camp-1", "alt", &head))
            .unwrap_err();
        assert!(matches!(err, BranchError::Duplicate { .. }));
    }

    #[test]
    fn test_unknown_start_point_rejected() {
        let (db, events) = setup();
        commit(&db, &events, "camp-1", json!({"title": "A"}));

        let registry = BranchRegistry::new(&db, &events);
        let err = registry
            .create_branch(new_branch("camp-1", "alt", "ffff"))
            .unwrap_err();
        assert!(matches!(err, BranchError::InvalidStartPoint { .. }));
    }

    #[test]
    fn test_start_point_must_belong_to_campaign() {
        let (db, events) = setup();
        let other = commit(&db, &events, "camp-2", json!({"title": "Elsewhere"}));

        let registry = BranchRegistry::new(&db, &events);
        let err = registry
            .create_branch(new_branch("camp-1", "alt", &other))
            .unwrap_err();
        assert!(matches!(err, BranchError::InvalidStartPoint { .. }));
    }

    #[test]
    fn test_list_branches_sorted() {
        let (db, events) = setup();
        let head = commit(&db, &events, "camp-1", json!({"title": "A"}));

        let registry = BranchRegistry::new(&db, &events);
        registry
            .create_branch(new_branch("camp-1", "zeta", &head))
            .unwrap();
        registry
            .create_branch(new_branch("camp-1", "alpha", &head))
            .unwrap();

        let names: Vec<_> = registry
            .list_branches("camp-1")
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "main", "zeta"]);
    }

    #[test]
    fn test_branch_name_validation() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("what-if/dragon.wins_2").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("-leading-dash").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name(&"x".repeat(101)).is_err());
    }
}
