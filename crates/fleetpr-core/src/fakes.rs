//! In-memory fakes for the collaborator ports (testing only)
//!
//! Provides `MemoryVcs`, `MemoryForge`, and `CommitGraphBuilder` so the scan
//! coordinator and batch pipeline can be exercised without git or a forge.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::differ::{CommitGraph, CommitGraphSnapshot, CommitNode};
use crate::domain::commit::CommitId;
use crate::domain::error::{FleetError, Result};
use crate::domain::pull_request::PullRequestRef;
use crate::domain::repo::{remote_ref, BranchPair};
use crate::domain::workflow::{WorkflowJob, WorkflowRun};
use crate::ports::{PullRequestForge, VersionControl, WorkflowRuns};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// CommitGraphBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`CommitGraphSnapshot`]s whose refs are remote-tracking
/// branches.
#[derive(Debug, Default)]
pub struct CommitGraphBuilder {
    graph: CommitGraphSnapshot,
    next_id: u64,
}

impl CommitGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit with an explicit id.
    pub fn commit(mut self, id: &str, message: &str, parents: &[&str]) -> Self {
        self.graph.insert_commit(CommitNode::new(
            id,
            message,
            parents.iter().map(|p| CommitId::from(*p)).collect(),
        ));
        self
    }

    /// Point `refs/remotes/origin/<branch>` at `id`.
    pub fn remote_branch(mut self, branch: &str, id: &str) -> Self {
        self.graph.set_ref(remote_ref(branch), CommitId::from(id));
        self
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:07x}{}", self.next_id, "0".repeat(33))
    }

    /// A base branch at a shared root and a head branch `messages.len()`
    /// commits ahead of it (oldest message first).
    pub fn ahead(mut self, pair: &BranchPair, messages: &[&str]) -> Self {
        let root = self.fresh_id();
        self = self.commit(&root, "initial", &[]).remote_branch(&pair.base, &root);
        let mut tip = root;
        for message in messages {
            let id = self.fresh_id();
            self = self.commit(&id, message, &[tip.as_str()]);
            tip = id;
        }
        self.remote_branch(&pair.head, &tip)
    }

    pub fn build(self) -> CommitGraphSnapshot {
        self.graph
    }
}

// ---------------------------------------------------------------------------
// MemoryVcs
// ---------------------------------------------------------------------------

/// In-memory version control keyed by repository path.
///
/// Fetching succeeds when every requested branch resolves in the
/// repository's graph, otherwise it reports them as
/// [`FleetError::RefNotFound`].
#[derive(Debug, Default)]
pub struct MemoryVcs {
    graphs: Mutex<HashMap<PathBuf, CommitGraphSnapshot>>,
    local_branches: Mutex<HashSet<(PathBuf, String)>>,
    delays: Mutex<HashMap<PathBuf, Duration>>,
    fetch_failures: Mutex<HashMap<PathBuf, String>>,
    fetches: Mutex<Vec<PathBuf>>,
    dirty: Mutex<HashSet<PathBuf>>,
    incoming: Mutex<HashMap<PathBuf, usize>>,
    pull_failures: Mutex<HashMap<PathBuf, String>>,
    pulls: Mutex<Vec<(PathBuf, String)>>,
}

impl MemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_graph(&self, repo: impl Into<PathBuf>, graph: CommitGraphSnapshot) {
        lock(&self.graphs).insert(repo.into(), graph);
    }

    pub fn add_local_branch(&self, repo: impl Into<PathBuf>, branch: impl Into<String>) {
        lock(&self.local_branches).insert((repo.into(), branch.into()));
    }

    /// Delay every fetch of `repo` by `delay`.
    pub fn set_delay(&self, repo: impl Into<PathBuf>, delay: Duration) {
        lock(&self.delays).insert(repo.into(), delay);
    }

    /// Make every fetch of `repo` fail with a transport error.
    pub fn fail_fetch(&self, repo: impl Into<PathBuf>, message: impl Into<String>) {
        lock(&self.fetch_failures).insert(repo.into(), message.into());
    }

    /// Report uncommitted changes in `repo`.
    pub fn set_dirty(&self, repo: impl Into<PathBuf>) {
        lock(&self.dirty).insert(repo.into());
    }

    /// Commits the next pull of `repo` fast-forwards over. Later pulls find
    /// nothing new.
    pub fn set_incoming(&self, repo: impl Into<PathBuf>, commits: usize) {
        lock(&self.incoming).insert(repo.into(), commits);
    }

    /// Make every pull of `repo` fail.
    pub fn fail_pull(&self, repo: impl Into<PathBuf>, message: impl Into<String>) {
        lock(&self.pull_failures).insert(repo.into(), message.into());
    }

    /// `(repository, branch)` pairs pulled so far, in call order.
    pub fn pulled(&self) -> Vec<(PathBuf, String)> {
        lock(&self.pulls).clone()
    }

    /// Repositories fetched so far, in call order.
    pub fn fetched(&self) -> Vec<PathBuf> {
        lock(&self.fetches).clone()
    }

    fn graph(&self, repo: &Path) -> CommitGraphSnapshot {
        lock(&self.graphs).get(repo).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl VersionControl for MemoryVcs {
    async fn fetch_remote_branches(&self, repo: &Path, branches: &[String]) -> Result<()> {
        let delay = lock(&self.delays).get(repo).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.fetches).push(repo.to_path_buf());

        if let Some(message) = lock(&self.fetch_failures).get(repo) {
            return Err(FleetError::Transport(format!("git fetch: {message}")));
        }
        let graph = self.graph(repo);
        let missing: Vec<String> = branches
            .iter()
            .filter(|b| graph.resolve(&remote_ref(b)).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FleetError::RefNotFound { branches: missing })
        }
    }

    async fn has_remote_branch(&self, repo: &Path, branch: &str) -> Result<bool> {
        Ok(self.graph(repo).resolve(&remote_ref(branch)).is_some())
    }

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool> {
        Ok(lock(&self.local_branches).contains(&(repo.to_path_buf(), branch.to_string())))
    }

    async fn is_dirty(&self, repo: &Path) -> Result<bool> {
        Ok(lock(&self.dirty).contains(repo))
    }

    async fn pull(&self, repo: &Path, branch: &str) -> Result<usize> {
        lock(&self.pulls).push((repo.to_path_buf(), branch.to_string()));
        if let Some(message) = lock(&self.pull_failures).get(repo) {
            return Err(FleetError::Transport(format!("git merge: {message}")));
        }
        Ok(lock(&self.incoming).remove(repo).unwrap_or(0))
    }

    async fn load_graph(&self, repo: &Path, _pair: &BranchPair) -> Result<CommitGraphSnapshot> {
        Ok(self.graph(repo))
    }
}

// ---------------------------------------------------------------------------
// MemoryForge
// ---------------------------------------------------------------------------

/// Forge operation selector for [`MemoryForge::fail_on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForgeOp {
    Find,
    Create,
    Update,
    Merge,
    ListRuns,
}

/// A PR created through [`MemoryForge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPr {
    pub repo: PathBuf,
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct OpenPr {
    head: String,
    base: String,
    pr: PullRequestRef,
}

/// In-memory forge keyed by repository path. Created PRs become open PRs;
/// merged PRs are closed.
#[derive(Debug)]
pub struct MemoryForge {
    open: Mutex<HashMap<PathBuf, Vec<OpenPr>>>,
    runs: Mutex<HashMap<PathBuf, Vec<WorkflowRun>>>,
    jobs: Mutex<HashMap<(PathBuf, u64), Vec<WorkflowJob>>>,
    failures: Mutex<HashSet<(PathBuf, ForgeOp)>>,
    created: Mutex<Vec<RecordedPr>>,
    updated: Mutex<Vec<RecordedPr>>,
    merged: Mutex<Vec<(PathBuf, u64)>>,
    authenticated: AtomicBool,
    next_number: AtomicU64,
}

impl Default for MemoryForge {
    fn default() -> Self {
        Self {
            open: Mutex::default(),
            runs: Mutex::default(),
            jobs: Mutex::default(),
            failures: Mutex::default(),
            created: Mutex::default(),
            updated: Mutex::default(),
            merged: Mutex::default(),
            authenticated: AtomicBool::new(true),
            next_number: AtomicU64::new(1),
        }
    }
}

impl MemoryForge {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(repo: &Path, number: u64) -> String {
        let name = repo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("https://forge.test/{name}/pull/{number}")
    }

    /// Seed an open PR from `head` into `base` and return it.
    pub fn add_open_pr(
        &self,
        repo: impl Into<PathBuf>,
        head: &str,
        base: &str,
        title: &str,
    ) -> PullRequestRef {
        let repo = repo.into();
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let pr = PullRequestRef::new(number, Self::url(&repo, number), title);
        lock(&self.open).entry(repo).or_default().push(OpenPr {
            head: head.to_string(),
            base: base.to_string(),
            pr: pr.clone(),
        });
        pr
    }

    /// Seed a workflow run. Runs are listed in seeding order.
    pub fn add_run(&self, repo: impl Into<PathBuf>, run: WorkflowRun) {
        lock(&self.runs).entry(repo.into()).or_default().push(run);
    }

    pub fn set_jobs(&self, repo: impl Into<PathBuf>, run_id: u64, jobs: Vec<WorkflowJob>) {
        lock(&self.jobs).insert((repo.into(), run_id), jobs);
    }

    pub fn fail_on(&self, repo: impl Into<PathBuf>, op: ForgeOp) {
        lock(&self.failures).insert((repo.into(), op));
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<RecordedPr> {
        lock(&self.created).clone()
    }

    pub fn updated(&self) -> Vec<RecordedPr> {
        lock(&self.updated).clone()
    }

    pub fn merged(&self) -> Vec<(PathBuf, u64)> {
        lock(&self.merged).clone()
    }

    fn check(&self, repo: &Path, op: ForgeOp) -> Result<()> {
        if lock(&self.failures).contains(&(repo.to_path_buf(), op)) {
            return Err(FleetError::Transport(format!("forge {op:?} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl PullRequestForge for MemoryForge {
    async fn check_auth(&self) -> Result<()> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FleetError::NotAuthenticated("no forge credentials".to_string()))
        }
    }

    async fn find_open_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>> {
        self.check(repo, ForgeOp::Find)?;
        Ok(lock(&self.open).get(repo).and_then(|prs| {
            prs.iter()
                .find(|p| p.head == head && p.base == base)
                .map(|p| p.pr.clone())
        }))
    }

    async fn create_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef> {
        self.check(repo, ForgeOp::Create)?;
        let pr = self.add_open_pr(repo, head, base, title);
        lock(&self.created).push(RecordedPr {
            repo: repo.to_path_buf(),
            number: pr.number,
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(pr)
    }

    async fn update_pr(
        &self,
        repo: &Path,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef> {
        self.check(repo, ForgeOp::Update)?;
        let mut open = lock(&self.open);
        let entry = open
            .get_mut(repo)
            .and_then(|prs| prs.iter_mut().find(|p| p.pr.number == number))
            .ok_or_else(|| FleetError::Transport(format!("no open PR #{number}")))?;
        entry.pr.title = title.to_string();
        let recorded = RecordedPr {
            repo: repo.to_path_buf(),
            number,
            head: entry.head.clone(),
            base: entry.base.clone(),
            title: title.to_string(),
            body: body.to_string(),
        };
        let pr = entry.pr.clone();
        drop(open);
        lock(&self.updated).push(recorded);
        Ok(pr)
    }

    async fn merge_pr(&self, repo: &Path, number: u64) -> Result<()> {
        self.check(repo, ForgeOp::Merge)?;
        let mut open = lock(&self.open);
        let prs = open.get_mut(repo).ok_or_else(|| {
            FleetError::Transport(format!("no open PR #{number} in {}", repo.display()))
        })?;
        let before = prs.len();
        prs.retain(|p| p.pr.number != number);
        if prs.len() == before {
            return Err(FleetError::Transport(format!("no open PR #{number}")));
        }
        drop(open);
        lock(&self.merged).push((repo.to_path_buf(), number));
        Ok(())
    }
}

#[async_trait]
impl WorkflowRuns for MemoryForge {
    async fn list_runs(&self, repo: &Path, limit: usize) -> Result<Vec<WorkflowRun>> {
        self.check(repo, ForgeOp::ListRuns)?;
        let mut runs = lock(&self.runs).get(repo).cloned().unwrap_or_default();
        runs.truncate(limit);
        Ok(runs)
    }

    async fn run_jobs(&self, repo: &Path, run_id: u64) -> Result<Vec<WorkflowJob>> {
        lock(&self.jobs)
            .get(&(repo.to_path_buf(), run_id))
            .cloned()
            .ok_or_else(|| FleetError::Transport(format!("no workflow run {run_id}")))
    }
}
