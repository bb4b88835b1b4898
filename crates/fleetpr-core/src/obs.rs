//! Structured observability hooks for scan sessions and batch runs.
//!
//! This module provides:
//! - Session-scoped tracing spans: [`session_span`] for instrumenting futures,
//!   the `SessionSpan` RAII guard for synchronous sections
//! - Emission functions for scan and batch lifecycle events
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("scan", "5f0c...");
/// // every event now carries session_id = "5f0c..."
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(kind: &str, session_id: &str) -> Self {
        Self {
            _span: session_span(kind, session_id).entered(),
        }
    }
}

/// The session span itself, for `.instrument(..)` on futures that cross
/// await points.
pub fn session_span(kind: &str, session_id: &str) -> tracing::Span {
    tracing::info_span!("fleetpr.session", kind = %kind, session_id = %session_id)
}

/// Emit event: scan session launched one worker per repository.
pub fn emit_scan_started(session_id: &str, track: &str, repos: usize) {
    info!(event = "scan.started", session_id = %session_id, track = %track, repos = repos);
}

/// Emit event: a worker published its result.
pub fn emit_scan_result(session_id: &str, repo: &str, commits: usize) {
    info!(event = "scan.result", session_id = %session_id, repo = %repo, commits = commits);
}

/// Emit event: a worker's fetch or diff failed and degraded to "no commits".
///
/// Logged at `warn` when `surfaced`, otherwise at `debug`.
pub fn emit_scan_error(session_id: &str, repo: &str, error: &dyn std::fmt::Display, surfaced: bool) {
    if surfaced {
        warn!(event = "scan.error", session_id = %session_id, repo = %repo, error = %error);
    } else {
        tracing::debug!(event = "scan.error", session_id = %session_id, repo = %repo, error = %error);
    }
}

/// Emit event: cancellation requested with `pending` workers still running.
pub fn emit_scan_cancelled(session_id: &str, pending: usize) {
    info!(event = "scan.cancelled", session_id = %session_id, pending = pending);
}

/// Emit event: every worker returned and the result stream closed.
pub fn emit_scan_closed(session_id: &str, published: usize, duration_ms: u64) {
    info!(
        event = "scan.closed",
        session_id = %session_id,
        published = published,
        duration_ms = duration_ms,
    );
}

/// Emit event: batch pipeline is about to perform a step for a repository.
pub fn emit_batch_step(repo: &str, step: &str) {
    info!(event = "batch.step", repo = %repo, step = %step);
}

/// Emit event: a repository's batch outcome was recorded.
pub fn emit_batch_outcome(repo: &str, status: &str, url: Option<&str>) {
    info!(event = "batch.outcome", repo = %repo, status = %status, url = url.unwrap_or(""));
}

/// Emit event: batch run summarized.
pub fn emit_batch_finished(succeeded: usize, skipped: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        succeeded = succeeded,
        skipped = skipped,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: one repository of a pull-all walk finished.
pub fn emit_pull_outcome(repo: &str, branch: &str, status: &str) {
    info!(event = "pull.outcome", repo = %repo, branch = %branch, status = %status);
}

/// Emit event: one release PR merge attempt finished.
pub fn emit_merge_outcome(repo: &str, number: u64, success: bool) {
    info!(event = "merge.outcome", repo = %repo, number = number, success = success);
}
