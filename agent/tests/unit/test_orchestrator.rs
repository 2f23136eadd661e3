//! Processing pass tests with a scripted repository

use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use mepbot::deploy::fsm::DeploymentStatus;
use mepbot::deploy::orchestrator::{
    Orchestrator, PipelineOptions, LOG_ALREADY_MERGED, LOG_BLACKLISTED, LOG_CONFLICT, LOG_MERGED,
    LOG_NOT_FOUND, LOG_NO_CHANGES,
};
use mepbot::extract::classifier::PrefixConvention;
use mepbot::extract::extractor::BranchExtractor;
use mepbot::git::engine::GitOperationResult;
use mepbot::git::workspace::Workspace;
use mepbot::models::deployment::{Deployment, DeploymentPatch};
use mepbot::storage::deployments::{Candidate, DeploymentStore, DeploymentUpdate};

use crate::support::{deployments_in, BrokenWorkspace, FixedWorkspace, MockGit};

struct Harness {
    _dir: TempDir,
    store: Arc<DeploymentStore>,
    git: Arc<MockGit>,
    orchestrator: Orchestrator,
}

fn harness(git: MockGit) -> Harness {
    let dir = tempdir().unwrap();
    let workspace = Arc::new(FixedWorkspace(dir.path().to_path_buf()));
    harness_with(dir, git, workspace)
}

fn harness_with(dir: TempDir, git: MockGit, workspace: Arc<dyn Workspace>) -> Harness {
    let (_, store) = deployments_in(dir.path());
    let git = Arc::new(git);
    let extractor = BranchExtractor::new(
        PrefixConvention {
            prefixes: vec!["GEO".to_string(), "FOO".to_string()],
            hints: Vec::new(),
        },
        50,
    )
    .unwrap();

    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(extractor),
        git.clone(),
        workspace,
        PipelineOptions::default(),
    );
    Harness {
        _dir: dir,
        store,
        git,
        orchestrator,
    }
}

async fn seed(store: &DeploymentStore, id: &str, content: &str) {
    store
        .ingest_candidate(Candidate {
            id: id.to_string(),
            content: content.to_string(),
            from: None,
            channel_id: None,
            created_at: None,
        })
        .await
        .unwrap();
}

/// Put a deployment in the state a finished pass leaves behind
async fn mark_processed(store: &DeploymentStore, id: &str, approved: Option<bool>, tag: &str) {
    let mut patch = DeploymentPatch::new(id);
    patch.status = Some(DeploymentStatus::Processed);
    patch.approved = Some(approved);
    patch.next_tag = Some(Some(tag.to_string()));
    store.patch(patch).await.unwrap();
}

fn log_of<'a>(deployment: &'a Deployment, branch: &str) -> Option<&'a str> {
    deployment
        .processing_logs
        .iter()
        .find(|l| l.branch == branch)
        .map(|l| l.message.as_str())
}

#[tokio::test]
async fn test_pass_merges_and_computes_tag() {
    let git = MockGit::with_branches(&["GEO-1-preprod", "GEO-1", "GEO-2"]);
    git.set_tag("origin/prod", "1.2.3");
    git.set_tag("origin/preprod", "1.2.3");
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1 GEO-2").await;

    let report = h.orchestrator.process_pending().await.unwrap().unwrap();

    assert_eq!(report.processed, vec!["m1"]);
    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert_eq!(d.processed_branches, vec!["GEO-1-preprod", "GEO-2"]);
    assert_eq!(log_of(&d, "GEO-1"), Some(LOG_MERGED));
    assert_eq!(log_of(&d, "GEO-2"), Some(LOG_MERGED));
    assert_eq!(d.next_tag.as_deref(), Some("1.2.4-RC1"));
    assert!(!d.deployed);

    let calls = h.git.calls();
    assert_eq!(&calls[..3], &["fetch", "checkout preprod", "reset origin/preprod"]);
    assert_eq!(
        h.git.calls_starting_with("pull"),
        vec!["pull GEO-1-preprod", "pull GEO-2"]
    );
    assert!(h.git.calls_starting_with("tag").is_empty());
}

#[tokio::test]
async fn test_staging_ahead_bumps_candidate() {
    let git = MockGit::with_branches(&["GEO-1"]);
    git.set_tag("origin/prod", "1.2.3");
    git.set_tag("origin/preprod", "1.3.0-RC1");
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.next_tag.as_deref(), Some("1.3.0-RC2"));
}

#[tokio::test]
async fn test_all_conflicts_leave_nothing_processed() {
    let git = MockGit::with_branches(&["GEO-1", "GEO-2"]);
    git.set_pull("GEO-1", GitOperationResult::conflict("CONFLICT (content)"));
    git.set_pull("GEO-2", GitOperationResult::conflict("CONFLICT (content)"));
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1 GEO-2").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert!(d.processed_branches.is_empty());
    assert_eq!(d.next_tag, None);
    assert_eq!(log_of(&d, "GEO-1"), Some(LOG_CONFLICT));
    assert_eq!(log_of(&d, "GEO-2"), Some(LOG_CONFLICT));
    assert!(d.processing_branch_errors.is_empty());
}

#[tokio::test]
async fn test_blacklisted_branch_is_never_pulled() {
    let git = MockGit::with_branches(&["FOO-123", "GEO-1"]);
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy FOO-123 GEO-1").await;
    h.store
        .apply_update(
            "m1",
            DeploymentUpdate {
                blacklisted_branches: Some(vec!["FOO-123".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    let blacklisted: Vec<_> = d
        .processing_logs
        .iter()
        .filter(|l| l.branch == "FOO-123")
        .collect();
    assert_eq!(blacklisted.len(), 1);
    assert_eq!(blacklisted[0].message, LOG_BLACKLISTED);
    assert_eq!(h.git.calls_starting_with("pull"), vec!["pull GEO-1"]);
    assert_eq!(d.processed_branches, vec!["GEO-1"]);
}

#[tokio::test]
async fn test_missing_and_merged_branches_are_skipped() {
    let git = MockGit::with_branches(&["GEO-2"]);
    git.merged.lock().unwrap().insert("GEO-2-preprod".to_string());
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1 GEO-2").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(log_of(&d, "GEO-1"), Some(LOG_NOT_FOUND));
    assert_eq!(log_of(&d, "GEO-2"), Some(LOG_ALREADY_MERGED));
    assert!(d.processed_branches.is_empty());
    assert!(h.git.calls_starting_with("pull").is_empty());
}

#[tokio::test]
async fn test_up_to_date_branch_counts_as_processed_without_tag() {
    let git = MockGit::with_branches(&["GEO-1"]);
    git.set_pull("GEO-1", GitOperationResult::ok("Already up to date.\n"));
    git.set_tag("origin/prod", "1.2.3");
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(log_of(&d, "GEO-1"), Some(LOG_NO_CHANGES));
    assert_eq!(d.processed_branches, vec!["GEO-1"]);
    assert_eq!(d.next_tag, None);
}

#[tokio::test]
async fn test_pull_failure_is_recorded_per_branch() {
    let git = MockGit::with_branches(&["GEO-1", "GEO-2"]);
    git.set_pull("GEO-1", GitOperationResult::failed("", "fatal: early EOF"));
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1 GEO-2").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert_eq!(d.processing_branch_errors.len(), 1);
    assert_eq!(d.processing_branch_errors[0].branch, "GEO-1");
    assert_eq!(d.processing_branch_errors[0].cause, "fatal: early EOF");
    assert_eq!(d.processed_branches, vec!["GEO-2"]);
}

#[tokio::test]
async fn test_fetch_failure_still_finishes_deployment() {
    let git = MockGit::with_branches(&["GEO-1"]);
    *git.fail_fetch.lock().unwrap() = true;
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;

    let report = h.orchestrator.process_pending().await.unwrap().unwrap();

    assert_eq!(report.processed, vec!["m1"]);
    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert_eq!(d.processing_errors.len(), 1);
    assert!(h.git.calls_starting_with("pull").is_empty());
}

#[tokio::test]
async fn test_no_branches_means_no_git_work() {
    let h = harness(MockGit::default());
    seed(&h.store, "m1", "agent:deploy whatever is ready").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert!(h.git.calls().is_empty());
}

#[tokio::test]
async fn test_release_pass_tags_and_pushes() {
    let git = MockGit::with_branches(&["GEO-1"]);
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;
    mark_processed(&h.store, "m1", Some(true), "1.2.4-RC1").await;

    let report = h.orchestrator.process_pending().await.unwrap().unwrap();
    assert_eq!(report.processed, vec!["m1"]);

    let d = h.store.require("m1").await.unwrap();
    assert!(d.deployed);
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert_eq!(d.next_tag.as_deref(), Some("1.2.4-RC1"));
    assert_eq!(h.git.calls_starting_with("tag"), vec!["tag 1.2.4-RC1"]);
    assert_eq!(
        h.git.calls_starting_with("push"),
        vec!["push preprod 1.2.4-RC1"]
    );

    // Deployed work is never picked up again
    let again = h.orchestrator.process_pending().await.unwrap().unwrap();
    assert!(again.processed.is_empty());
}

#[tokio::test]
async fn test_failed_tag_creation_skips_push() {
    let git = MockGit::with_branches(&["GEO-1"]);
    *git.fail_tag.lock().unwrap() = true;
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;
    mark_processed(&h.store, "m1", Some(true), "1.2.4-RC1").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert!(!d.deployed);
    assert_eq!(d.processing_errors.len(), 1);
    assert!(h.git.calls_starting_with("push").is_empty());
}

#[tokio::test]
async fn test_failed_push_leaves_deployment_undeployed() {
    let git = MockGit::with_branches(&["GEO-1"]);
    *git.fail_push.lock().unwrap() = true;
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;
    mark_processed(&h.store, "m1", Some(true), "1.2.4-RC1").await;

    h.orchestrator.process_pending().await.unwrap();

    let d = h.store.require("m1").await.unwrap();
    assert!(!d.deployed);
    assert_eq!(d.processing_errors.len(), 1);
}

#[tokio::test]
async fn test_rejected_deployment_is_not_reselected() {
    let h = harness(MockGit::with_branches(&["GEO-1"]));
    seed(&h.store, "m1", "agent:deploy GEO-1").await;
    mark_processed(&h.store, "m1", Some(false), "1.2.4-RC1").await;

    let report = h.orchestrator.process_pending().await.unwrap().unwrap();

    assert!(report.processed.is_empty());
    assert!(h.git.calls().is_empty());
}

#[tokio::test]
async fn test_workspace_failure_is_recorded_on_deployment() {
    let dir = tempdir().unwrap();
    let h = harness_with(dir, MockGit::default(), Arc::new(BrokenWorkspace));
    seed(&h.store, "m1", "agent:deploy GEO-1").await;

    let report = h.orchestrator.process_pending().await.unwrap().unwrap();
    assert_eq!(report.processed, vec!["m1"]);

    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Processed);
    assert_eq!(d.processing_errors.len(), 1);
    assert!(d.processing_errors[0].contains("no repository configured"));
    assert!(d.next_tag.is_none());
    assert!(h.git.calls().is_empty());
    assert!(!h.orchestrator.is_in_flight());
}

#[tokio::test]
async fn test_requeued_release_is_tagged_again() {
    let git = MockGit::with_branches(&["GEO-1"]);
    git.set_tag("origin/prod", "1.2.3");
    let h = harness(git);
    seed(&h.store, "m1", "agent:deploy GEO-1").await;
    mark_processed(&h.store, "m1", Some(true), "1.2.4-RC1").await;
    h.orchestrator.process_pending().await.unwrap();
    assert!(h.store.require("m1").await.unwrap().deployed);

    let requeued = h
        .store
        .apply_update(
            "m1",
            DeploymentUpdate {
                status: Some(DeploymentStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!requeued.deployed);
    assert!(requeued.next_tag.is_none());
    assert!(requeued.approved.is_none());

    h.git.set_tag("origin/preprod", "1.2.4-RC1");
    h.orchestrator.process_pending().await.unwrap();
    let d = h.store.require("m1").await.unwrap();
    assert_eq!(d.next_tag.as_deref(), Some("1.2.4-RC2"));
    assert!(!d.deployed);

    h.store
        .apply_update(
            "m1",
            DeploymentUpdate {
                approved: Some(Some(true)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let report = h.orchestrator.process_pending().await.unwrap().unwrap();
    assert_eq!(report.processed, vec!["m1"]);

    assert!(h.store.require("m1").await.unwrap().deployed);
    assert_eq!(
        h.git.calls_starting_with("tag"),
        vec!["tag 1.2.4-RC1", "tag 1.2.4-RC2"]
    );
    assert_eq!(
        h.git.calls_starting_with("push"),
        vec!["push preprod 1.2.4-RC1", "push preprod 1.2.4-RC2"]
    );
}

#[tokio::test]
async fn test_concurrent_pass_is_skipped() {
    let h = harness(MockGit::with_branches(&["GEO-1"]));
    seed(&h.store, "m1", "agent:deploy GEO-1").await;

    let lease = h.orchestrator.try_lease().unwrap();
    assert!(h.orchestrator.is_in_flight());
    assert!(h.orchestrator.process_pending().await.unwrap().is_none());
    assert_eq!(
        h.store.require("m1").await.unwrap().status,
        DeploymentStatus::Pending
    );

    drop(lease);
    assert!(h.orchestrator.process_pending().await.unwrap().is_some());
}
