//! Scan session: worker pool, result stream and cancellation token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::domain::commit::DiffResult;
use crate::domain::repo::{ReleaseTrack, RepositoryRef};
use crate::obs;
use crate::ports::VersionControl;
use crate::tickets::TicketPattern;

/// Knobs for a scan session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Keep the error text of failed scans instead of reporting a plain
    /// empty result.
    pub surface_errors: bool,
}

/// One worker's published result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Position of the repository in the session's repository list.
    pub index: usize,
    pub repo: String,
    /// Empty when the scan failed.
    pub diff: DiffResult,
    /// Fetch or diff error, present only with
    /// [`ScanOptions::surface_errors`].
    pub error: Option<String>,
}

struct WorkerContext {
    session_id: String,
    track: ReleaseTrack,
    vcs: Arc<dyn VersionControl>,
    tickets: Arc<TicketPattern>,
    options: ScanOptions,
    cancel: CancellationToken,
    results: mpsc::Sender<ScanResult>,
    published: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
}

impl WorkerContext {
    async fn run(self, index: usize, repo: RepositoryRef) {
        self.scan(index, &repo).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    async fn scan(&self, index: usize, repo: &RepositoryRef) {
        if self.cancel.is_cancelled() {
            return;
        }

        let pair = self.track.branch_pair(repo);
        // An in-flight call is allowed to finish; its result is dropped below.
        let result = match self
            .vcs
            .fetch_and_diff(repo.path(), &pair, &self.tickets)
            .await
        {
            Ok(diff) => ScanResult {
                index,
                repo: repo.display_name.clone(),
                diff,
                error: None,
            },
            Err(e) => {
                obs::emit_scan_error(
                    &self.session_id,
                    &repo.display_name,
                    &e,
                    self.options.surface_errors,
                );
                ScanResult {
                    index,
                    repo: repo.display_name.clone(),
                    diff: DiffResult::default(),
                    error: self.options.surface_errors.then(|| e.to_string()),
                }
            }
        };

        if self.cancel.is_cancelled() {
            return;
        }
        let commits = result.diff.len();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            sent = self.results.send(result) => {
                if sent.is_ok() {
                    self.published.fetch_add(1, Ordering::SeqCst);
                    obs::emit_scan_result(&self.session_id, &repo.display_name, commits);
                }
            }
        }
    }
}

/// A running scan over a fixed repository list.
///
/// Results arrive in completion order. Dropping the session cancels any
/// worker that has not published yet.
pub struct ScanSession {
    id: Uuid,
    track: ReleaseTrack,
    repo_count: usize,
    results: mpsc::Receiver<ScanResult>,
    cancel: CancellationToken,
    running: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
    closed: bool,
}

impl ScanSession {
    /// Launch one worker per repository. Must be called inside a tokio
    /// runtime.
    pub fn start(
        repos: &[RepositoryRef],
        track: ReleaseTrack,
        vcs: Arc<dyn VersionControl>,
        tickets: TicketPattern,
        options: ScanOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        let session_id = id.to_string();
        // Room for every worker plus one: publishing never waits on a reader.
        let (tx, rx) = mpsc::channel(repos.len() + 1);
        let cancel = CancellationToken::new();
        let tickets = Arc::new(tickets);
        let published = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(repos.len()));

        // Workers and the join task inherit the session span from here.
        let _session = obs::SessionSpan::enter("scan", &session_id);
        obs::emit_scan_started(&session_id, track.slug(), repos.len());

        let mut workers = JoinSet::new();
        for (index, repo) in repos.iter().cloned().enumerate() {
            let ctx = WorkerContext {
                session_id: session_id.clone(),
                track,
                vcs: Arc::clone(&vcs),
                tickets: Arc::clone(&tickets),
                options,
                cancel: cancel.clone(),
                results: tx.clone(),
                published: Arc::clone(&published),
                running: Arc::clone(&running),
            };
            let span = tracing::info_span!("scan.worker", repo = %repo.display_name);
            workers.spawn(ctx.run(index, repo).instrument(span));
        }

        let started = Instant::now();
        let join = tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(session_id = %session_id, error = %e, "scan worker panicked");
                }
            }
            // Last sender: the stream closes strictly after every worker returned.
            drop(tx);
            obs::emit_scan_closed(
                &session_id,
                published.load(Ordering::SeqCst),
                started.elapsed().as_millis() as u64,
            );
        }
        .instrument(tracing::Span::current()));

        Self {
            id,
            track,
            repo_count: repos.len(),
            results: rx,
            cancel,
            running,
            join: Some(join),
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn track(&self) -> ReleaseTrack {
        self.track
    }

    pub fn repo_count(&self) -> usize {
        self.repo_count
    }

    /// Wait for the next result. `None` once every worker has returned and
    /// all published results were consumed.
    pub async fn next_result(&mut self) -> Option<ScanResult> {
        if self.closed {
            return None;
        }
        let next = self.results.recv().await;
        if next.is_none() {
            self.closed = true;
        }
        next
    }

    /// Ask unfinished workers to stop. Results already queued may still be
    /// delivered.
    pub fn cancel(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        obs::emit_scan_cancelled(&self.id.to_string(), self.running.load(Ordering::SeqCst));
    }

    /// Handle that cancels this session when triggered.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `true` once the stream reported end-of-results.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Workers that have not returned yet.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume every remaining result until the stream closes, then wait for
    /// the join task.
    pub async fn drain(&mut self) -> Vec<ScanResult> {
        let mut rest = Vec::new();
        while let Some(result) = self.next_result().await {
            rest.push(result);
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(session_id = %self.id, error = %e, "scan join task failed");
            }
        }
        rest
    }

    /// Cancel and wait until every worker has returned, discarding stale
    /// results.
    pub async fn shutdown(mut self) {
        self.cancel();
        self.drain().await;
    }

    /// Results as a stream, ending when the session closes.
    pub fn into_stream(self) -> impl Stream<Item = ScanResult> + Send {
        stream::unfold(self, |mut session| async move {
            session.next_result().await.map(|r| (r, session))
        })
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repo::BranchPair;
    use crate::fakes::{CommitGraphBuilder, MemoryVcs};
    use futures::StreamExt;
    use std::time::Duration;

    fn fleet(vcs: &MemoryVcs, commits: &[usize]) -> Vec<RepositoryRef> {
        let pair = BranchPair::new("staging", "dev");
        commits
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let path = format!("/fleet/repo-{i}");
                let messages: Vec<String> = (0..*n).map(|c| format!("feat: {c} ATT-{i}")).collect();
                let refs: Vec<&str> = messages.iter().map(String::as_str).collect();
                vcs.set_graph(&path, CommitGraphBuilder::new().ahead(&pair, &refs).build());
                RepositoryRef::new(&path, format!("backend/repo-{i}"), "main")
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_results_arrive_then_stream_closes() {
        let vcs = Arc::new(MemoryVcs::new());
        let repos = fleet(&vcs, &[2, 0, 1]);
        let mut session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::disabled(),
            ScanOptions::default(),
        );

        let mut results = session.drain().await;
        results.sort_by_key(|r| r.index);
        let counts: Vec<usize> = results.iter().map(|r| r.diff.len()).collect();
        assert_eq!(counts, vec![2, 0, 1]);
        assert!(session.is_closed());
        assert_eq!(session.running(), 0);
        assert!(session.next_result().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_arrive_in_completion_order() {
        let vcs = Arc::new(MemoryVcs::new());
        let repos = fleet(&vcs, &[1, 1, 1]);
        vcs.set_delay("/fleet/repo-0", Duration::from_millis(300));
        vcs.set_delay("/fleet/repo-1", Duration::from_millis(100));
        vcs.set_delay("/fleet/repo-2", Duration::from_millis(200));

        let session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::disabled(),
            ScanOptions::default(),
        );
        let order: Vec<usize> = session.into_stream().map(|r| r.index).collect().await;
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_publishes_nothing() {
        let vcs = Arc::new(MemoryVcs::new());
        let repos = fleet(&vcs, &[1, 1]);
        let mut session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::disabled(),
            ScanOptions::default(),
        );
        session.cancel();
        assert!(session.drain().await.is_empty());
        assert!(vcs.fetched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_degrade_to_empty_unless_surfaced() {
        let vcs = Arc::new(MemoryVcs::new());
        let repos = fleet(&vcs, &[3]);
        vcs.fail_fetch("/fleet/repo-0", "connection reset");

        for surface_errors in [false, true] {
            let mut session = ScanSession::start(
                &repos,
                ReleaseTrack::DevToStaging,
                vcs.clone(),
                TicketPattern::disabled(),
                ScanOptions { surface_errors },
            );
            let results = session.drain().await;
            assert_eq!(results.len(), 1);
            assert!(results[0].diff.is_empty());
            assert_eq!(results[0].error.is_some(), surface_errors);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_branch_degrades_to_empty() {
        let vcs = Arc::new(MemoryVcs::new());
        vcs.set_graph(
            "/fleet/no-dev",
            CommitGraphBuilder::new()
                .commit("a", "a", &[])
                .remote_branch("staging", "a")
                .build(),
        );
        let repos = vec![RepositoryRef::new("/fleet/no-dev", "backend/no-dev", "main")];
        let mut session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::disabled(),
            ScanOptions { surface_errors: true },
        );
        let results = session.drain().await;
        assert!(results[0].diff.is_empty());
        assert!(results[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("dev")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fleet_closes_immediately() {
        let vcs = Arc::new(MemoryVcs::new());
        let mut session = ScanSession::start(
            &[],
            ReleaseTrack::StagingToStable,
            vcs,
            TicketPattern::disabled(),
            ScanOptions::default(),
        );
        assert!(session.next_result().await.is_none());
        assert!(session.is_closed());
    }
}
