//! Git engine tests against a scripted command runner

use std::path::Path;
use std::sync::Arc;

use mepbot::git::engine::{GitEngine, GitOps};
use mepbot::git::runner::CommandOutput;

use crate::support::ScriptedRunner;

fn engine() -> (Arc<ScriptedRunner>, GitEngine) {
    let runner = Arc::new(ScriptedRunner::default());
    let engine = GitEngine::new(runner.clone(), "origin");
    (runner, engine)
}

#[tokio::test]
async fn test_pull_conflict_aborts_and_restores_head() {
    let (runner, engine) = engine();
    runner
        .on("rev-parse HEAD", CommandOutput::ok("abc123\n"))
        .on(
            "pull --no-rebase --ff origin GEO-1",
            CommandOutput::failed(
                "Auto-merging a.txt\nCONFLICT (content): Merge conflict in a.txt\n",
                "Automatic merge failed; fix conflicts and then commit the result.",
            ),
        );

    let result = engine.pull(Path::new("/repo"), "GEO-1").await;

    assert!(result.is_conflict());
    assert_eq!(
        runner.calls(),
        vec![
            "fetch origin GEO-1",
            "rev-parse HEAD",
            "pull --no-rebase --ff origin GEO-1",
            "merge --abort",
            "reset --hard abc123",
        ]
    );
}

#[tokio::test]
async fn test_pull_conflict_detected_from_unmerged_paths() {
    let (runner, engine) = engine();
    runner
        .on("rev-parse HEAD", CommandOutput::ok("abc123\n"))
        .on(
            "pull --no-rebase --ff origin GEO-1",
            CommandOutput::failed("", "Automatic merge failed"),
        )
        .on("diff --name-only --diff-filter=U", CommandOutput::ok("a.txt\n"));

    let result = engine.pull(Path::new("/repo"), "GEO-1").await;

    assert!(result.is_conflict());
    assert!(runner.calls().contains(&"merge --abort".to_string()));
}

#[tokio::test]
async fn test_pull_failure_without_conflict_is_not_reset() {
    let (runner, engine) = engine();
    runner.on(
        "pull --no-rebase --ff origin GEO-1",
        CommandOutput::failed("", "fatal: couldn't find remote ref GEO-1"),
    );

    let result = engine.pull(Path::new("/repo"), "GEO-1").await;

    assert!(!result.success);
    assert!(!result.is_conflict());
    assert_eq!(result.message(), "fatal: couldn't find remote ref GEO-1");
    assert!(!runner.calls().iter().any(|c| c.starts_with("merge") || c.starts_with("reset")));
}

#[tokio::test]
async fn test_pull_stops_when_fetch_fails() {
    let (runner, engine) = engine();
    runner.on(
        "fetch origin GEO-1",
        CommandOutput::failed("", "fatal: unable to access"),
    );

    let result = engine.pull(Path::new("/repo"), "GEO-1").await;

    assert!(!result.success);
    assert_eq!(runner.calls(), vec!["fetch origin GEO-1"]);
}

#[tokio::test]
async fn test_pull_up_to_date() {
    let (runner, engine) = engine();
    runner.on(
        "pull --no-rebase --ff origin GEO-1",
        CommandOutput::ok("Already up to date.\n"),
    );

    let result = engine.pull(Path::new("/repo"), "GEO-1").await;
    assert!(result.is_up_to_date());
}

#[tokio::test]
async fn test_checkout_retries_after_reset() {
    let (runner, engine) = engine();
    runner
        .on(
            "checkout preprod",
            CommandOutput::failed("", "error: Your local changes would be overwritten"),
        )
        .on("checkout preprod", CommandOutput::ok(""));

    let result = engine.checkout(Path::new("/repo"), "preprod").await;

    assert!(result.success);
    assert_eq!(
        runner.calls(),
        vec!["checkout preprod", "reset --hard HEAD", "checkout preprod"]
    );
}

#[tokio::test]
async fn test_branch_exists_matches_exact_names() {
    let (runner, engine) = engine();
    let listing = "* preprod\n  remotes/origin/HEAD -> origin/preprod\n  remotes/origin/GEO-12-preprod\n";
    runner
        .on("branch --all", CommandOutput::ok(listing))
        .on("branch --all", CommandOutput::ok(listing));

    assert!(engine.branch_exists(Path::new("/repo"), "GEO-12-preprod").await);
    assert!(!engine.branch_exists(Path::new("/repo"), "GEO-1").await);
}

#[tokio::test]
async fn test_is_branch_merged_uses_merged_listing() {
    let (runner, engine) = engine();
    runner.on(
        "branch --all --merged HEAD",
        CommandOutput::ok("* preprod\n  remotes/origin/GEO-7\n"),
    );

    assert!(engine.is_branch_merged(Path::new("/repo"), "GEO-7").await);
    assert!(!engine.is_branch_merged(Path::new("/repo"), "GEO-8").await);
}

#[tokio::test]
async fn test_latest_tag_takes_first_line() {
    let (runner, engine) = engine();
    runner.on(
        "tag --merged origin/prod --sort=-creatordate",
        CommandOutput::ok("\n1.4.0\n1.3.9\n"),
    );

    assert_eq!(
        engine.latest_tag(Path::new("/repo"), "origin/prod").await,
        Some("1.4.0".to_string())
    );
    assert_eq!(engine.latest_tag(Path::new("/repo"), "origin/preprod").await, None);
}

#[tokio::test]
async fn test_push_sends_branch_and_tag() {
    let (runner, engine) = engine();

    let result = engine
        .push_branch_and_tag(Path::new("/repo"), "preprod", "1.4.1-RC1")
        .await;

    assert!(result.success);
    assert_eq!(runner.calls(), vec!["push origin preprod 1.4.1-RC1"]);
}
