//! End-to-end tests for the campaign version engine.
//!
//! These tests exercise the public `Chronicle` facade over real SQLite
//! databases (in-memory and on disk):
//! - Committing content-addressed versions and walking history
//! - Branching and re-merging divergent storylines
//! - Merge requests: conflict detection, resolution, merge, close
//! - The event stream observed through an attached recording channel

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use chronicle_core::branch::NewBranch;
use chronicle_core::config::AppConfig;
use chronicle_core::engine::Chronicle;
use chronicle_core::errors::{ChronicleError, EventError, MergeError, StoreError};
use chronicle_core::events::{topics, Event, EventPublisher, RecordingPublisher};
use chronicle_core::merge::NewMergeRequest;
use chronicle_core::models::{
    BranchType, ConflictResolution, ConflictType, MergeRequest, MergeRequestStatus, PathChoice,
    ResolutionData, ResolutionInput, Version, VersionType,
};
use chronicle_core::store::NewVersion;

// ===========================================================================
// Helpers
// ===========================================================================

/// Forwards every event into a shared recorder so tests can inspect the
/// stream after the engine has run.
struct Recorder(Arc<RecordingPublisher>);

impl EventPublisher for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn publish(&self, event: &Event) -> Result<(), EventError> {
        self.0.publish(event)
    }
}

/// A channel that rejects every delivery.
struct FailingChannel;

impl EventPublisher for FailingChannel {
    fn name(&self) -> &str {
        "failing"
    }

    fn publish(&self, _event: &Event) -> Result<(), EventError> {
        Err(EventError::WebhookRejected {
            status: 503,
            body: "service unavailable".into(),
        })
    }
}

fn engine_with_recorder() -> (Chronicle, Arc<RecordingPublisher>) {
    let mut engine = Chronicle::in_memory().expect("failed to create engine");
    let recorder = Arc::new(RecordingPublisher::new());
    engine.add_event_channel(Box::new(Recorder(recorder.clone())));
    (engine, recorder)
}

fn commit(engine: &Chronicle, branch: Option<&str>, content: Value) -> Version {
    engine
        .create_version(NewVersion {
            campaign_id: "camp-1".into(),
            content,
            title: "The Ambush at Greenest".into(),
            commit_message: "update chapter".into(),
            author: "gm".into(),
            version_type: VersionType::Draft,
            branch_name: branch.map(String::from),
            parent_hashes: vec![],
            summary: None,
            metadata: json!({}),
        })
        .expect("failed to create version")
}

fn fork(engine: &Chronicle, name: &str, start: &str) {
    engine
        .create_branch(NewBranch {
            campaign_id: "camp-1".into(),
            name: name.into(),
            start_point: start.into(),
            branch_type: BranchType::PlayerChoice,
            description: Some("what if the party sides with the dragon".into()),
            metadata: json!({}),
        })
        .expect("failed to create branch");
}

fn open_mr(engine: &Chronicle, source: &str, target: &str) -> MergeRequest {
    engine
        .create_merge_request(NewMergeRequest {
            campaign_id: "camp-1".into(),
            source_branch: source.into(),
            target_branch: target.into(),
            title: "Fold the rewrite back into the main storyline".into(),
            description: None,
            author: "gm".into(),
            reviewers: vec!["editor".into()],
            metadata: json!({}),
        })
        .expect("failed to create merge request")
}

fn choice(resolution: ConflictResolution) -> PathChoice {
    PathChoice {
        choice: resolution,
        merge_strategy: None,
    }
}

// ===========================================================================
// Test 1: Full campaign lifecycle
// ===========================================================================

/// Commit, branch, diverge, open a merge request, resolve its conflicts,
/// and land a manual merge. Checks every persistent effect along the way.
#[test]
fn test_full_campaign_lifecycle() {
    let engine = Chronicle::in_memory().unwrap();

    // One storyline edited "title" and kept "note"; the other rewrote
    // "title" and never had "note".
    let v1 = commit(&engine, None, json!({"title": "A", "note": "x"}));
    fork(&engine, "alt", &v1.hash);
    let alt_head = commit(&engine, Some("alt"), json!({"title": "B"}));

    let request = open_mr(&engine, "alt", "main");
    assert_eq!(request.status, MergeRequestStatus::Conflicts);

    let conflicts = engine.list_conflicts(&request.id, false).unwrap();
    assert_eq!(conflicts.len(), 2, "both paths must be reported");
    assert_eq!(conflicts[0].path, "note");
    assert_eq!(conflicts[0].conflict_type, ConflictType::MissingInSource);
    assert_eq!(conflicts[0].source_value, "missing");
    assert_eq!(conflicts[0].target_value, "x");
    assert_eq!(conflicts[1].path, "title");
    assert_eq!(conflicts[1].conflict_type, ConflictType::ValueMismatch);
    assert_eq!(conflicts[1].source_value, "B");
    assert_eq!(conflicts[1].target_value, "A");

    // Resolve both; the request flips back to open.
    let mut resolutions = BTreeMap::new();
    resolutions.insert(
        conflicts[0].id.clone(),
        ResolutionInput {
            resolution: ConflictResolution::TakeTarget,
            resolved_by: "editor".into(),
            data: None,
        },
    );
    resolutions.insert(
        conflicts[1].id.clone(),
        ResolutionInput {
            resolution: ConflictResolution::TakeSource,
            resolved_by: "editor".into(),
            data: None,
        },
    );
    let updated = engine.resolve_conflicts(&request.id, &resolutions).unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|c| c.is_resolved()));
    let reopened = engine.get_merge_request(&request.id).unwrap();
    assert_eq!(reopened.status, MergeRequestStatus::Open);
    assert!(engine.list_conflicts(&request.id, true).unwrap().is_empty());

    // Land a manual merge mirroring the recorded decisions.
    let mut choices = BTreeMap::new();
    choices.insert("title".to_string(), choice(ConflictResolution::TakeSource));
    choices.insert("note".to_string(), choice(ConflictResolution::TakeTarget));
    let merge = engine
        .merge_branches(
            &request.id,
            "manual",
            "land the rewrite",
            "gm",
            Some(ResolutionData {
                choices,
                paths: vec![],
            }),
        )
        .unwrap();

    assert_eq!(merge.content, json!({"title": "B", "note": "x"}));
    assert_eq!(merge.parent_hashes, vec![alt_head.hash.clone(), v1.hash.clone()]);
    assert_eq!(merge.version_type, VersionType::Merge);
    assert_eq!(merge.branch_name, "main");

    // The target branch advanced, the source branch retired.
    assert_eq!(engine.get_branch("camp-1", "main").unwrap().head, merge.hash);
    assert!(engine.get_branch("camp-1", "alt").unwrap().is_merged);

    let merged = engine.get_merge_request(&request.id).unwrap();
    assert_eq!(merged.status, MergeRequestStatus::Merged);
    assert_eq!(merged.merged_by.as_deref(), Some("gm"));
    assert_eq!(merged.merge_commit_hash.as_deref(), Some(merge.hash.as_str()));

    // Main's history now runs through the merged storyline (first parent).
    let history = engine.get_version_history("camp-1", None, None).unwrap();
    let hashes: Vec<_> = history.iter().map(|v| v.hash.clone()).collect();
    assert_eq!(hashes, vec![merge.hash, alt_head.hash, v1.hash]);

    let status = engine.campaign_status("camp-1").unwrap();
    assert_eq!(status.version_count, 3);
    assert_eq!(status.branch_count, 2);
    assert_eq!(status.open_merge_requests, 0);
    assert_eq!(status.unresolved_conflicts, 0);

    // Every mutating step left an audit entry, newest first.
    let actions: Vec<_> = engine
        .recent_audit(10)
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            "merge_branches",
            "resolve_conflicts",
            "create_merge_request",
            "create_version",
            "create_branch",
            "create_version",
        ]
    );
}

// ===========================================================================
// Test 2: Event stream order and payloads
// ===========================================================================

/// Every committed operation emits exactly one event, after its transaction,
/// in operation order.
#[test]
fn test_event_stream_order_and_payloads() {
    let (engine, recorder) = engine_with_recorder();

    let v1 = commit(&engine, None, json!({"title": "A", "note": "x"}));
    fork(&engine, "alt", &v1.hash);
    commit(&engine, Some("alt"), json!({"title": "B"}));

    let request = open_mr(&engine, "alt", "main");
    let conflicts = engine.list_conflicts(&request.id, false).unwrap();

    let mut resolutions = BTreeMap::new();
    for conflict in &conflicts {
        resolutions.insert(
            conflict.id.clone(),
            ResolutionInput {
                resolution: ConflictResolution::TakeTarget,
                resolved_by: "editor".into(),
                data: None,
            },
        );
    }
    engine.resolve_conflicts(&request.id, &resolutions).unwrap();

    let mut choices = BTreeMap::new();
    choices.insert("title".to_string(), choice(ConflictResolution::TakeSource));
    let merge = engine
        .merge_branches(
            &request.id,
            "manual",
            "land it",
            "gm",
            Some(ResolutionData {
                choices,
                paths: vec![],
            }),
        )
        .unwrap();

    assert_eq!(
        recorder.topics(),
        vec![
            topics::VERSION_CREATED,
            topics::BRANCH_CREATED,
            topics::VERSION_CREATED,
            topics::MERGE_REQUEST_CREATED,
            topics::CONFLICTS_RESOLVED,
            topics::BRANCHES_MERGED,
        ]
    );

    let events = recorder.recorded();
    assert!(events
        .iter()
        .all(|event| event.campaign_id.as_deref() == Some("camp-1")));

    let opened = &events[3];
    assert_eq!(opened.payload["has_conflicts"], json!(true));
    assert_eq!(opened.payload["conflict_count"], json!(2));

    let resolved = &events[4];
    assert_eq!(resolved.payload["resolved"], json!(2));
    assert_eq!(resolved.payload["remaining"], json!(0));
    assert_eq!(resolved.payload["status"], json!("open"));

    let landed = &events[5];
    assert_eq!(landed.payload["merge_commit_hash"], json!(merge.hash));
    assert_eq!(landed.payload["strategy"], json!("manual"));
}

// ===========================================================================
// Test 3: Failing event channel never blocks operations
// ===========================================================================

/// A channel that rejects deliveries is logged and skipped; the operation
/// commits and other channels still receive the event.
#[test]
fn test_failing_channel_never_blocks_operations() {
    let mut engine = Chronicle::in_memory().unwrap();
    let recorder = Arc::new(RecordingPublisher::new());
    engine.add_event_channel(Box::new(FailingChannel));
    engine.add_event_channel(Box::new(Recorder(recorder.clone())));

    let version = commit(&engine, None, json!({"title": "A"}));

    assert!(engine.get_version(&version.hash).is_ok());
    assert_eq!(recorder.topics(), vec![topics::VERSION_CREATED]);
}

// ===========================================================================
// Test 4: Identical heads cannot land a merge commit
// ===========================================================================

/// A merge request between branches with identical content opens clean, but
/// any merge of it would recreate existing content and is rejected by the
/// content-addressed store. Closing is the way out.
#[test]
fn test_identical_heads_cannot_land_a_merge_commit() {
    let (engine, recorder) = engine_with_recorder();

    let head = commit(&engine, None, json!({"title": "A"}));
    fork(&engine, "copy", &head.hash);

    let request = open_mr(&engine, "copy", "main");
    assert_eq!(request.status, MergeRequestStatus::Open);
    assert!(engine.list_conflicts(&request.id, false).unwrap().is_empty());

    let err = engine
        .merge_branches(&request.id, "auto", "noop merge", "gm", None)
        .unwrap_err();
    assert!(matches!(
        err,
        ChronicleError::Merge(MergeError::Store(StoreError::DuplicateVersion(_)))
    ));

    let closed = engine.close_merge_request(&request.id, "gm").unwrap();
    assert_eq!(closed.status, MergeRequestStatus::Closed);
    assert_eq!(
        recorder.topics().last().map(String::as_str),
        Some(topics::MERGE_REQUEST_CLOSED)
    );
}

// ===========================================================================
// Test 5: Cherry-pick merges a single storyline thread
// ===========================================================================

/// Cherry-picking copies only the named paths from the source head, leaving
/// disputed paths outside the list untouched.
#[test]
fn test_cherry_pick_merges_named_paths_only() {
    let engine = Chronicle::in_memory().unwrap();

    let v1 = commit(
        &engine,
        None,
        json!({"title": "A", "npcs": {"guide": "Nesim"}}),
    );
    fork(&engine, "alt", &v1.hash);
    commit(
        &engine,
        Some("alt"),
        json!({"title": "B", "npcs": {"guide": "Nesim", "villain": "Rezmir"}}),
    );

    let request = open_mr(&engine, "alt", "main");
    let merge = engine
        .merge_branches(
            &request.id,
            "cherry_pick",
            "pull in the villain only",
            "gm",
            Some(ResolutionData {
                choices: BTreeMap::new(),
                paths: vec!["npcs.villain".into()],
            }),
        )
        .unwrap();

    assert_eq!(
        merge.content,
        json!({"title": "A", "npcs": {"guide": "Nesim", "villain": "Rezmir"}})
    );
}

// ===========================================================================
// Test 6: Failed merges leave the request intact
// ===========================================================================

/// Strategy validation happens before any write: an unknown strategy or
/// missing resolution data leaves the request and branches untouched.
#[test]
fn test_failed_merges_leave_request_intact() {
    let engine = Chronicle::in_memory().unwrap();

    let v1 = commit(&engine, None, json!({"title": "A", "note": "x"}));
    fork(&engine, "alt", &v1.hash);
    commit(&engine, Some("alt"), json!({"title": "B"}));

    let request = open_mr(&engine, "alt", "main");

    let err = engine
        .merge_branches(&request.id, "rebase", "msg", "gm", None)
        .unwrap_err();
    assert!(matches!(
        err,
        ChronicleError::Merge(MergeError::UnsupportedStrategy(_))
    ));

    let err = engine
        .merge_branches(&request.id, "manual", "msg", "gm", None)
        .unwrap_err();
    assert!(matches!(
        err,
        ChronicleError::Merge(MergeError::MissingResolutionData(_))
    ));

    let untouched = engine.get_merge_request(&request.id).unwrap();
    assert_eq!(untouched.status, MergeRequestStatus::Conflicts);
    assert_eq!(engine.get_branch("camp-1", "main").unwrap().head, v1.hash);
}

// ===========================================================================
// Test 7: Campaigns are isolated
// ===========================================================================

/// Branches, merge requests, and status counters never leak across
/// campaigns, even though both campaigns use the branch name "main".
#[test]
fn test_campaigns_are_isolated() {
    let engine = Chronicle::in_memory().unwrap();

    commit(&engine, None, json!({"title": "Dragons of Icespire"}));
    engine
        .create_version(NewVersion {
            campaign_id: "camp-2".into(),
            content: json!({"title": "Curse of the Crimson Throne"}),
            title: "Prologue".into(),
            commit_message: "start the second table".into(),
            author: "other-gm".into(),
            version_type: VersionType::Draft,
            branch_name: None,
            parent_hashes: vec![],
            summary: None,
            metadata: json!({}),
        })
        .unwrap();

    let status_1 = engine.campaign_status("camp-1").unwrap();
    let status_2 = engine.campaign_status("camp-2").unwrap();
    assert_eq!(status_1.version_count, 1);
    assert_eq!(status_2.version_count, 1);
    assert_eq!(status_1.branch_count, 1);
    assert_eq!(status_2.branch_count, 1);

    assert_eq!(engine.list_branches("camp-1").unwrap().len(), 1);
    assert!(engine.list_merge_requests("camp-2", None).unwrap().is_empty());
}

// ===========================================================================
// Test 8: On-disk persistence across engine restarts
// ===========================================================================

/// Everything written through one engine instance is readable after closing
/// it and opening a fresh one over the same database file.
#[test]
fn test_reopen_from_disk_preserves_everything() {
    let tmp = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.storage.db_path = tmp.path().join("chronicle.db");

    let v1 = {
        let engine = Chronicle::open(config.clone()).unwrap();
        let v1 = commit(&engine, None, json!({"title": "A"}));
        commit(&engine, None, json!({"title": "B"}));
        v1
    };

    let engine = Chronicle::open(config).unwrap();
    assert_eq!(engine.get_version(&v1.hash).unwrap().content, json!({"title": "A"}));
    assert_eq!(engine.get_version_history("camp-1", None, None).unwrap().len(), 2);
    assert_eq!(engine.campaign_status("camp-1").unwrap().version_count, 2);
}
