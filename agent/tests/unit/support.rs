//! Hand-written fakes shared by the tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mepbot::chat::{ChatMessage, MessageSource};
use mepbot::errors::BotError;
use mepbot::extract::classifier::{Classifier, PrefixConvention};
use mepbot::filesys::file::File;
use mepbot::git::engine::{GitOperationResult, GitOps};
use mepbot::git::runner::{CommandOutput, CommandRunner};
use mepbot::git::workspace::Workspace;
use mepbot::storage::deployments::DeploymentStore;
use mepbot::storage::document::DocumentStore;

pub fn documents_in(dir: &Path) -> Arc<DocumentStore> {
    Arc::new(DocumentStore::new(File::new(dir.join("data.json"))))
}

pub fn deployments_in(dir: &Path) -> (Arc<DocumentStore>, Arc<DeploymentStore>) {
    let documents = documents_in(dir);
    let deployments = Arc::new(DeploymentStore::new(documents.clone()));
    (documents, deployments)
}

// ================================== GIT ========================================== //

/// Scriptable [`GitOps`] recording every call
#[derive(Default)]
pub struct MockGit {
    pub branches: Mutex<HashSet<String>>,
    pub merged: Mutex<HashSet<String>>,
    pub pull_results: Mutex<HashMap<String, GitOperationResult>>,
    pub tags: Mutex<HashMap<String, String>>,
    pub fail_tag: Mutex<bool>,
    pub fail_push: Mutex<bool>,
    pub fail_fetch: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
}

impl MockGit {
    pub fn with_branches(branches: &[&str]) -> Self {
        let git = Self::default();
        git.branches
            .lock()
            .unwrap()
            .extend(branches.iter().map(|b| b.to_string()));
        git
    }

    pub fn set_pull(&self, branch: &str, result: GitOperationResult) {
        self.pull_results
            .lock()
            .unwrap()
            .insert(branch.to_string(), result);
    }

    pub fn set_tag(&self, reference: &str, tag: &str) {
        self.tags
            .lock()
            .unwrap()
            .insert(reference.to_string(), tag.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitOps for MockGit {
    async fn checkout(&self, _repo: &Path, branch: &str) -> GitOperationResult {
        self.record(format!("checkout {branch}"));
        GitOperationResult::ok("")
    }

    async fn reset_hard(&self, _repo: &Path, reference: &str) -> GitOperationResult {
        self.record(format!("reset {reference}"));
        GitOperationResult::ok("")
    }

    async fn fetch(&self, _repo: &Path) -> GitOperationResult {
        self.record("fetch".to_string());
        if *self.fail_fetch.lock().unwrap() {
            return GitOperationResult::failed("", "fatal: unable to access remote");
        }
        GitOperationResult::ok("")
    }

    async fn pull(&self, _repo: &Path, branch: &str) -> GitOperationResult {
        self.record(format!("pull {branch}"));
        self.pull_results
            .lock()
            .unwrap()
            .get(branch)
            .cloned()
            .unwrap_or_else(|| GitOperationResult::ok("Merge made by the 'ort' strategy."))
    }

    async fn is_branch_merged(&self, _repo: &Path, branch: &str) -> bool {
        self.merged.lock().unwrap().contains(branch)
    }

    async fn branch_exists(&self, _repo: &Path, name: &str) -> bool {
        self.branches.lock().unwrap().contains(name)
    }

    async fn latest_tag(&self, _repo: &Path, reference: &str) -> Option<String> {
        self.tags.lock().unwrap().get(reference).cloned()
    }

    async fn create_tag(&self, _repo: &Path, tag: &str) -> GitOperationResult {
        self.record(format!("tag {tag}"));
        if *self.fail_tag.lock().unwrap() {
            return GitOperationResult::failed("", format!("fatal: tag '{tag}' already exists"));
        }
        GitOperationResult::ok("")
    }

    async fn push_branch_and_tag(&self, _repo: &Path, branch: &str, tag: &str) -> GitOperationResult {
        self.record(format!("push {branch} {tag}"));
        if *self.fail_push.lock().unwrap() {
            return GitOperationResult::failed("", "rejected");
        }
        GitOperationResult::ok("")
    }
}

/// Working copy that is always ready
pub struct FixedWorkspace(pub PathBuf);

#[async_trait]
impl Workspace for FixedWorkspace {
    async fn prepare(&self) -> Result<PathBuf, BotError> {
        Ok(self.0.clone())
    }
}

/// Workspace that can never be prepared
pub struct BrokenWorkspace;

#[async_trait]
impl Workspace for BrokenWorkspace {
    async fn prepare(&self) -> Result<PathBuf, BotError> {
        Err(BotError::ConfigError("no repository configured".to_string()))
    }
}

/// [`CommandRunner`] answering from a script keyed by the joined arguments
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, Vec<CommandOutput>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Queue `output` for the next run of `command`; unscripted commands succeed silently
    pub fn on(&self, command: &str, output: CommandOutput) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push(output);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, _dir: &Path, args: &[&str]) -> Result<CommandOutput, BotError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push(command.clone());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&command) {
            Some(queue) if !queue.is_empty() => Ok(queue.remove(0)),
            _ => Ok(CommandOutput::ok("")),
        }
    }
}

// =============================== CLASSIFIER ====================================== //

/// Classifier with a canned answer
pub struct FakeClassifier {
    answer: Result<Vec<String>, String>,
    pub calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn answering(branches: &[&str]) -> Self {
        Self {
            answer: Ok(branches.iter().map(|b| b.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(
        &self,
        _text: &str,
        _conventions: &PrefixConvention,
    ) -> Result<Vec<String>, BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(BotError::ClassifierError)
    }
}

// ================================== CHAT ========================================= //

/// Message source with a fixed page
pub struct FakeSource {
    pub messages: Vec<ChatMessage>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn latest_messages(&self, _channel_id: &str, top: u32) -> Result<Vec<ChatMessage>, BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.messages.iter().take(top as usize).cloned().collect())
    }
}

pub fn message(id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        content: content.to_string(),
        from: Some("Dana".to_string()),
        created_at: None,
    }
}
