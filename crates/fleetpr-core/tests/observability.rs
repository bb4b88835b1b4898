//! Observability tests for scan session and batch lifecycle tracing.

use std::sync::Arc;

use fleetpr_core::fakes::{CommitGraphBuilder, MemoryVcs};
use fleetpr_core::obs::{
    emit_batch_finished, emit_batch_outcome, emit_batch_step, emit_merge_outcome,
    emit_scan_error, SessionSpan,
};
use fleetpr_core::{
    BranchPair, ReleaseTrack, RepositoryRef, ScanOptions, ScanSession, TicketPattern,
};
use tracing_test::traced_test;

#[traced_test]
#[tokio::test(start_paused = true)]
async fn scan_session_emits_lifecycle_events() {
    let vcs = Arc::new(MemoryVcs::new());
    let pair = BranchPair::new("staging", "dev");
    vcs.set_graph("/fleet/web", CommitGraphBuilder::new().ahead(&pair, &["feat"]).build());
    let repos = vec![RepositoryRef::new("/fleet/web", "frontend/web", "main")];

    let mut session = ScanSession::start(
        &repos,
        ReleaseTrack::DevToStaging,
        vcs,
        TicketPattern::disabled(),
        ScanOptions::default(),
    );
    let session_id = session.id().to_string();
    session.drain().await;

    assert!(logs_contain("scan.started"));
    assert!(logs_contain("scan.result"));
    assert!(logs_contain("scan.closed"));

    // Worker events sit inside the session span, not just next to its id.
    let expected = format!("fleetpr.session{{kind=scan session_id={session_id}}}");
    logs_assert(|lines: &[&str]| {
        lines
            .iter()
            .find(|line| line.contains("scan.result"))
            .filter(|line| line.contains(&expected) && line.contains("scan.worker"))
            .map(|_| ())
            .ok_or_else(|| format!("no scan.result line inside {expected}"))
    });
}

#[traced_test]
#[test]
fn surfaced_scan_error_logs_warning() {
    emit_scan_error("s-1", "backend/api", &"connection reset", true);
    assert!(logs_contain("scan.error"));
    assert!(logs_contain("connection reset"));
}

#[traced_test]
#[test]
fn batch_events_carry_repository_and_status() {
    let _span = SessionSpan::enter("batch", "b-1");
    emit_batch_step("frontend/web", "Creating PR...");
    emit_batch_outcome("frontend/web", "created", Some("https://forge.test/web/pull/1"));
    emit_batch_finished(1, 0, 0, 12);
    emit_merge_outcome("frontend/web", 1, true);

    assert!(logs_contain("batch.step"));
    assert!(logs_contain("Creating PR..."));
    assert!(logs_contain("batch.outcome"));
    assert!(logs_contain("batch.finished"));
    assert!(logs_contain("merge.outcome"));
}
