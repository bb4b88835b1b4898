//! Batch pipeline state machine.
//!
//! A [`BatchRun`] moves through
//! `SelectingRepos → WaitingForScans → CheckingExistingPrs →
//! AwaitingConfirmation → Processing(i) → Summarized`.
//! [`BatchPipeline`] performs the transitions. A refused transition leaves
//! the run in the phase it was in.

use std::fmt;
use std::sync::Arc;

use fleetpr_core::obs;
use fleetpr_core::{
    render_pr_body, ReleaseTrack, RepositoryRef, ScanBoard, ScanOptions, ScanResult, ScanSession,
    ScanState,
};
use tokio::time::Instant;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::context::ReleaseContext;
use crate::error::{BatchError, BatchResult};
use crate::outcome::{BatchOutcome, SkipReason};
use crate::preflight::{check_existing_prs, PreflightReport};
use crate::progress::{BatchObserver, BatchStep, NoopObserver};
use crate::selection::SelectionSet;
use crate::summary::BatchSummary;

/// Concurrent existing-PR lookups when none is configured.
pub const DEFAULT_PREFLIGHT_CONCURRENCY: usize = 4;

/// Where a batch run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    SelectingRepos,
    WaitingForScans,
    CheckingExistingPrs,
    AwaitingConfirmation,
    /// Handling the repository at this position of the repository list.
    Processing(usize),
    Summarized,
    /// Unrecoverable failure; [`BatchRun::recover`] returns to `return_to`.
    Error {
        message: String,
        return_to: Box<BatchPhase>,
    },
}

impl BatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchPhase::Summarized)
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::SelectingRepos => f.write_str("selecting repositories"),
            BatchPhase::WaitingForScans => f.write_str("waiting for scans"),
            BatchPhase::CheckingExistingPrs => f.write_str("checking existing PRs"),
            BatchPhase::AwaitingConfirmation => f.write_str("awaiting confirmation"),
            BatchPhase::Processing(i) => write!(f, "processing repository {}", i + 1),
            BatchPhase::Summarized => f.write_str("summarized"),
            BatchPhase::Error { message, .. } => write!(f, "failed: {message}"),
        }
    }
}

/// State of one batch run: the repository list, the user's selection, the
/// scan board and the outcomes recorded so far.
#[derive(Debug, Clone)]
pub struct BatchRun {
    id: Uuid,
    track: ReleaseTrack,
    title: Option<String>,
    repos: Vec<RepositoryRef>,
    selection: SelectionSet,
    board: ScanBoard,
    phase: BatchPhase,
    preflight: Option<PreflightReport>,
    outcomes: Vec<BatchOutcome>,
    started: Option<Instant>,
    duration_ms: u64,
}

impl BatchRun {
    /// A run over `repos` with nothing selected and nothing scanned.
    pub fn new(repos: Vec<RepositoryRef>, track: ReleaseTrack) -> Self {
        let len = repos.len();
        Self {
            id: Uuid::new_v4(),
            track,
            title: None,
            repos,
            selection: SelectionSet::new(len),
            board: ScanBoard::new(len),
            phase: BatchPhase::SelectingRepos,
            preflight: None,
            outcomes: Vec::new(),
            started: None,
            duration_ms: 0,
        }
    }

    /// Use `title` for every PR instead of the track's default title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn track(&self) -> ReleaseTrack {
        self.track
    }

    pub fn repos(&self) -> &[RepositoryRef] {
        &self.repos
    }

    pub fn phase(&self) -> &BatchPhase {
        &self.phase
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// The selection is editable only while selecting.
    pub fn selection_mut(&mut self) -> BatchResult<&mut SelectionSet> {
        self.expect_phase(&BatchPhase::SelectingRepos, "change the selection")?;
        Ok(&mut self.selection)
    }

    pub fn board(&self) -> &ScanBoard {
        &self.board
    }

    pub fn preflight(&self) -> Option<&PreflightReport> {
        self.preflight.as_ref()
    }

    /// Recorded outcomes, in processing order. "Not selected" skips are
    /// never recorded.
    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    /// Record a scan result. Accepted in every phase so results that
    /// arrive while the user is still selecting are kept.
    pub fn apply_scan(&mut self, result: &ScanResult) -> bool {
        self.board.apply(result)
    }

    /// Selected repositories still waiting for a scan result.
    pub fn pending_selected(&self) -> usize {
        self.selection
            .indices()
            .filter(|&i| self.board.get(i).is_some_and(ScanState::is_pending))
            .count()
    }

    /// PR title for `repo`.
    pub fn title_for(&self, repo: &RepositoryRef) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.track.default_title(&repo.stable_branch))
    }

    /// Leave the error phase for the phase it names. Returns `false` when
    /// the run is not in the error phase.
    pub fn recover(&mut self) -> bool {
        let phase = std::mem::replace(&mut self.phase, BatchPhase::SelectingRepos);
        match phase {
            BatchPhase::Error { return_to, .. } => {
                self.phase = *return_to;
                true
            }
            other => {
                self.phase = other;
                false
            }
        }
    }

    /// Back to selection with a fresh scan board. Outcomes are discarded;
    /// the selection is kept.
    pub fn reset(&mut self) {
        self.board = ScanBoard::new(self.repos.len());
        self.phase = BatchPhase::SelectingRepos;
        self.preflight = None;
        self.outcomes.clear();
        self.started = None;
        self.duration_ms = 0;
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_outcomes(&self.outcomes, self.duration_ms)
    }

    fn expect_phase(&self, expected: &BatchPhase, action: &'static str) -> BatchResult<()> {
        if self.phase == *expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> BatchError {
        BatchError::InvalidTransition {
            phase: self.phase.to_string(),
            action,
        }
    }

    /// `true` when a selected repository has commits, i.e. when
    /// [`BatchPipeline::confirm`] would be accepted.
    pub fn has_work(&self) -> bool {
        self.selection
            .indices()
            .any(|i| self.board.get(i).and_then(ScanState::diff).is_some())
    }
}

/// Drives [`BatchRun`]s through their phases against the collaborators in
/// a [`ReleaseContext`].
#[derive(Clone)]
pub struct BatchPipeline {
    ctx: ReleaseContext,
    observer: Arc<dyn BatchObserver>,
    concurrency: usize,
}

impl BatchPipeline {
    pub fn new(ctx: ReleaseContext) -> Self {
        Self {
            ctx,
            observer: Arc::new(NoopObserver),
            concurrency: DEFAULT_PREFLIGHT_CONCURRENCY,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound on concurrent existing-PR lookups during the preflight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn context(&self) -> &ReleaseContext {
        &self.ctx
    }

    /// Start scanning every repository of `run`.
    pub fn start_scan(&self, run: &BatchRun, options: ScanOptions) -> ScanSession {
        ScanSession::start(
            &run.repos,
            run.track,
            Arc::clone(&self.ctx.vcs),
            self.ctx.tickets.clone(),
            options,
        )
    }

    fn session(run: &BatchRun) -> tracing::Span {
        obs::session_span("batch", &run.id.to_string())
    }

    fn transition(&self, run: &mut BatchRun, phase: BatchPhase) {
        let _session = obs::SessionSpan::enter("batch", &run.id.to_string());
        debug!(run_id = %run.id, from = %run.phase, to = %phase, "batch phase change");
        run.phase = phase;
        self.observer.on_phase(&run.phase);
    }

    fn fail(&self, run: &mut BatchRun, message: String, return_to: BatchPhase) {
        self.transition(
            run,
            BatchPhase::Error {
                message,
                return_to: Box::new(return_to),
            },
        );
    }

    /// Commit the current selection. An empty selection is refused and the
    /// run keeps selecting.
    pub fn commit_selection(&self, run: &mut BatchRun) -> BatchResult<()> {
        run.expect_phase(&BatchPhase::SelectingRepos, "commit a selection")?;
        if run.selection.is_empty() {
            return Err(BatchError::EmptySelection);
        }
        self.transition(run, BatchPhase::WaitingForScans);
        Ok(())
    }

    /// Consume scan results until every selected repository has left the
    /// pending state, then cancel the session.
    ///
    /// Unselected repositories are not waited for. If the session closes
    /// while selected repositories are still pending, the run enters the
    /// error phase and returns [`BatchError::ScanClosed`].
    pub async fn wait_for_scans(
        &self,
        run: &mut BatchRun,
        session: &mut ScanSession,
    ) -> BatchResult<()> {
        let span = Self::session(run);
        self.settle_scans(run, session).instrument(span).await
    }

    async fn settle_scans(&self, run: &mut BatchRun, session: &mut ScanSession) -> BatchResult<()> {
        run.expect_phase(&BatchPhase::WaitingForScans, "wait for scans")?;
        while !run.board.all_settled(run.selection.indices()) {
            match session.next_result().await {
                Some(result) => {
                    run.apply_scan(&result);
                }
                None => {
                    let err = BatchError::ScanClosed {
                        pending: run.pending_selected(),
                    };
                    self.fail(run, err.to_string(), BatchPhase::SelectingRepos);
                    return Err(err);
                }
            }
        }
        session.cancel();
        self.transition(run, BatchPhase::CheckingExistingPrs);
        Ok(())
    }

    /// Count open PRs among the selected repositories with commits.
    pub async fn check_existing(&self, run: &mut BatchRun) -> BatchResult<PreflightReport> {
        let span = Self::session(run);
        self.preflight(run).instrument(span).await
    }

    async fn preflight(&self, run: &mut BatchRun) -> BatchResult<PreflightReport> {
        run.expect_phase(&BatchPhase::CheckingExistingPrs, "check existing PRs")?;
        let report = check_existing_prs(
            Arc::clone(&self.ctx.forge),
            &run.repos,
            &run.selection,
            &run.board,
            run.track,
            self.concurrency,
        )
        .await;
        info!(
            run_id = %run.id,
            existing = report.existing_prs,
            with_commits = report.repos_with_commits,
            "preflight finished"
        );
        run.preflight = Some(report.clone());
        self.transition(run, BatchPhase::AwaitingConfirmation);
        Ok(report)
    }

    /// Start processing. Refused when no selected repository has commits.
    pub fn confirm(&self, run: &mut BatchRun) -> BatchResult<()> {
        run.expect_phase(&BatchPhase::AwaitingConfirmation, "confirm")?;
        if !run.has_work() {
            return Err(BatchError::NothingToProcess);
        }
        run.started = Some(Instant::now());
        self.transition(run, BatchPhase::Processing(0));
        Ok(())
    }

    /// Return to selection without processing anything.
    pub fn decline(&self, run: &mut BatchRun) -> BatchResult<()> {
        run.expect_phase(&BatchPhase::AwaitingConfirmation, "decline")?;
        run.preflight = None;
        self.transition(run, BatchPhase::SelectingRepos);
        Ok(())
    }

    /// Handle the repository at the current position and advance.
    ///
    /// Returns the outcome, including the unrecorded "not selected" skip, or
    /// `None` once the run is summarized.
    pub async fn process_next(&self, run: &mut BatchRun) -> BatchResult<Option<BatchOutcome>> {
        let span = Self::session(run);
        self.advance(run).instrument(span).await
    }

    async fn advance(&self, run: &mut BatchRun) -> BatchResult<Option<BatchOutcome>> {
        let index = match run.phase {
            BatchPhase::Processing(i) => i,
            BatchPhase::Summarized => return Ok(None),
            _ => return Err(run.invalid("process a repository")),
        };
        let Some(repo) = run.repos.get(index).cloned() else {
            self.finish(run);
            return Ok(None);
        };

        let outcome = if run.selection.contains(index) {
            let title = run.title_for(&repo);
            let span = tracing::info_span!("batch.repo", repo = %repo.display_name);
            let outcome = self
                .process_repo(&repo, run.track, &title)
                .instrument(span)
                .await;
            obs::emit_batch_outcome(
                &outcome.repo,
                outcome.status.label(),
                outcome.pr_url.as_deref(),
            );
            self.observer.on_outcome(&outcome);
            run.outcomes.push(outcome.clone());
            outcome
        } else {
            BatchOutcome::skipped(&repo.display_name, SkipReason::NotSelected)
        };

        if index + 1 < run.repos.len() {
            self.transition(run, BatchPhase::Processing(index + 1));
        } else {
            self.finish(run);
        }
        Ok(Some(outcome))
    }

    /// Process every remaining repository and summarize.
    pub async fn run_to_completion(&self, run: &mut BatchRun) -> BatchResult<BatchSummary> {
        while self.process_next(run).await?.is_some() {}
        Ok(run.summary())
    }

    fn finish(&self, run: &mut BatchRun) {
        run.duration_ms = run
            .started
            .map_or(0, |s| s.elapsed().as_millis() as u64);
        let summary = run.summary();
        obs::emit_batch_finished(
            summary.succeeded(),
            summary.skipped,
            summary.failed,
            summary.duration_ms,
        );
        self.transition(run, BatchPhase::Summarized);
    }

    fn step(&self, repo: &RepositoryRef, step: BatchStep) {
        obs::emit_batch_step(&repo.display_name, step.label());
        self.observer.on_step(repo, step);
    }

    /// Fetch, diff, look up the open PR and create or update it for one
    /// repository. Every failure becomes a `Failed` outcome.
    pub async fn process_repo(
        &self,
        repo: &RepositoryRef,
        track: ReleaseTrack,
        title: &str,
    ) -> BatchOutcome {
        let name = repo.display_name.as_str();
        let pair = track.branch_pair(repo);

        self.step(repo, BatchStep::FetchingBranches);
        if let Err(e) = self
            .ctx
            .vcs
            .fetch_remote_branches(repo.path(), &pair.branches())
            .await
        {
            return BatchOutcome::failed(name, e);
        }

        self.step(repo, BatchStep::GettingCommits);
        let diff = match self.ctx.vcs.diff(repo.path(), &pair, &self.ctx.tickets).await {
            Ok(diff) => diff,
            Err(e) => return BatchOutcome::failed(name, e),
        };
        if diff.is_empty() {
            return BatchOutcome::skipped(name, SkipReason::NoCommits);
        }

        self.step(repo, BatchStep::CheckingExistingPr);
        let existing = match self
            .ctx
            .forge
            .find_open_pr(repo.path(), &pair.head, &pair.base)
            .await
        {
            Ok(existing) => existing,
            Err(e) => return BatchOutcome::failed(name, e),
        };

        let body = render_pr_body(&diff.tickets, &self.ctx.org);
        match existing {
            Some(pr) => {
                self.step(repo, BatchStep::UpdatingPr);
                match self
                    .ctx
                    .forge
                    .update_pr(repo.path(), pr.number, title, &body)
                    .await
                {
                    Ok(pr) => BatchOutcome::updated(name, pr.url, diff.tickets),
                    Err(e) => BatchOutcome::failed(name, e),
                }
            }
            None => {
                self.step(repo, BatchStep::CreatingPr);
                match self
                    .ctx
                    .forge
                    .create_pr(repo.path(), &pair.head, &pair.base, title, &body)
                    .await
                {
                    Ok(pr) => BatchOutcome::created(name, pr.url, diff.tickets),
                    Err(e) => BatchOutcome::failed(name, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetpr_core::fakes::{CommitGraphBuilder, MemoryForge, MemoryVcs};
    use fleetpr_core::{DiffResult, TicketPattern};

    fn repo(name: &str) -> RepositoryRef {
        RepositoryRef::new(format!("/fleet/{name}"), format!("backend/{name}"), "main")
    }

    fn pipeline(vcs: MemoryVcs, forge: MemoryForge) -> BatchPipeline {
        BatchPipeline::new(ReleaseContext::new(
            Arc::new(vcs),
            Arc::new(forge),
            TicketPattern::compile("ATT-[0-9]+").unwrap(),
            "acme",
        ))
    }

    fn scanned(index: usize, commits: usize) -> ScanResult {
        let commits = (0..commits)
            .map(|i| fleetpr_core::CommitRecord::new(format!("c{i}"), "msg", vec![]))
            .collect();
        ScanResult {
            index,
            repo: format!("repo-{index}"),
            diff: DiffResult::from_commits(commits),
            error: None,
        }
    }

    #[test]
    fn test_empty_selection_stays_selecting() {
        let p = pipeline(MemoryVcs::new(), MemoryForge::new());
        let mut run = BatchRun::new(vec![repo("api")], ReleaseTrack::DevToStaging);
        let err = p.commit_selection(&mut run).unwrap_err();
        assert!(matches!(err, BatchError::EmptySelection));
        assert_eq!(run.phase(), &BatchPhase::SelectingRepos);
    }

    #[test]
    fn test_selection_locked_after_commit() {
        let p = pipeline(MemoryVcs::new(), MemoryForge::new());
        let mut run = BatchRun::new(vec![repo("api")], ReleaseTrack::DevToStaging);
        run.selection_mut().unwrap().select(0);
        p.commit_selection(&mut run).unwrap();
        assert_eq!(run.phase(), &BatchPhase::WaitingForScans);
        let err = run.selection_mut().unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot change the selection while waiting for scans"
        );
    }

    #[tokio::test]
    async fn test_confirm_refused_without_commits() {
        let p = pipeline(MemoryVcs::new(), MemoryForge::new());
        let mut run = BatchRun::new(vec![repo("api")], ReleaseTrack::DevToStaging);
        run.apply_scan(&scanned(0, 0));
        run.selection_mut().unwrap().select(0);
        p.commit_selection(&mut run).unwrap();

        let vcs = Arc::new(MemoryVcs::new());
        let mut session = ScanSession::start(
            &[],
            ReleaseTrack::DevToStaging,
            vcs,
            TicketPattern::disabled(),
            ScanOptions::default(),
        );
        p.wait_for_scans(&mut run, &mut session).await.unwrap();
        let report = p.check_existing(&mut run).await.unwrap();
        assert_eq!(report.repos_with_commits, 0);

        let err = p.confirm(&mut run).unwrap_err();
        assert!(matches!(err, BatchError::NothingToProcess));
        assert_eq!(run.phase(), &BatchPhase::AwaitingConfirmation);
        p.decline(&mut run).unwrap();
        assert_eq!(run.phase(), &BatchPhase::SelectingRepos);
    }

    #[tokio::test]
    async fn test_decline_with_pending_work_returns_to_selecting() {
        let vcs = MemoryVcs::new();
        let api = repo("api");
        vcs.set_graph(
            api.path(),
            CommitGraphBuilder::new()
                .ahead(&ReleaseTrack::DevToStaging.branch_pair(&api), &["feat: ATT-3"])
                .build(),
        );
        let p = pipeline(vcs, MemoryForge::new());
        let mut run = BatchRun::new(vec![api], ReleaseTrack::DevToStaging);
        let mut session = p.start_scan(&run, ScanOptions::default());
        run.selection_mut().unwrap().select(0);
        p.commit_selection(&mut run).unwrap();
        p.wait_for_scans(&mut run, &mut session).await.unwrap();
        p.check_existing(&mut run).await.unwrap();

        assert!(run.has_work());
        p.decline(&mut run).unwrap();
        assert_eq!(run.phase(), &BatchPhase::SelectingRepos);
        assert!(run.preflight().is_none());
        assert!(run.outcomes().is_empty());
        assert!(run.selection().contains(0));

        // Once processing has started it can no longer be declined.
        p.commit_selection(&mut run).unwrap();
        p.wait_for_scans(&mut run, &mut session).await.unwrap();
        p.check_existing(&mut run).await.unwrap();
        p.confirm(&mut run).unwrap();
        let err = p.decline(&mut run).unwrap_err();
        assert!(matches!(err, BatchError::InvalidTransition { action: "decline", .. }));
        assert_eq!(run.phase(), &BatchPhase::Processing(0));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_process_repo_updates_existing_pr() {
        let vcs = MemoryVcs::new();
        let forge = MemoryForge::new();
        let api = repo("api");
        let pair = ReleaseTrack::DevToStaging.branch_pair(&api);
        vcs.set_graph(
            api.path(),
            CommitGraphBuilder::new()
                .ahead(&pair, &["feat: login ATT-7", "fix: att-7 typo"])
                .build(),
        );
        let existing = forge.add_open_pr(api.path(), "dev", "staging", "old");
        let p = pipeline(vcs, forge);

        let outcome = p
            .process_repo(&api, ReleaseTrack::DevToStaging, "dev → staging")
            .await;
        assert_eq!(outcome.status, crate::outcome::OutcomeStatus::Updated);
        assert_eq!(outcome.pr_url.as_deref(), Some(existing.url.as_str()));
        assert_eq!(outcome.tickets, vec!["ATT-7".to_string()]);
    }

    #[test]
    fn test_recover_returns_to_named_phase() {
        let mut run = BatchRun::new(vec![repo("api")], ReleaseTrack::DevToStaging);
        assert!(!run.recover());
        run.phase = BatchPhase::Error {
            message: "scan ended".into(),
            return_to: Box::new(BatchPhase::SelectingRepos),
        };
        assert!(run.recover());
        assert_eq!(run.phase(), &BatchPhase::SelectingRepos);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(BatchPhase::Processing(0).to_string(), "processing repository 1");
        assert!(BatchPhase::Summarized.is_terminal());
    }
}
