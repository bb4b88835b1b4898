//! Early-cancellation behaviour of the scan coordinator.
//!
//! Ten repositories are scanned; three are selected and answer quickly, the
//! other seven are slow. The consumer cancels as soon as the selected three
//! have settled and the stream must close without waiting for the slow ones
//! to publish.

use std::sync::Arc;
use std::time::Duration;

use fleetpr_core::fakes::{CommitGraphBuilder, MemoryVcs};
use fleetpr_core::{
    BranchPair, ReleaseTrack, RepositoryRef, ScanBoard, ScanOptions, ScanSession, TicketPattern,
};
use tokio::time::Instant;

const FAST: Duration = Duration::from_millis(50);
const SLOW: Duration = Duration::from_secs(30);

fn fleet(vcs: &MemoryVcs, selected: &[usize]) -> Vec<RepositoryRef> {
    let pair = BranchPair::new("staging", "dev");
    (0..10)
        .map(|i| {
            let path = format!("/fleet/svc-{i}");
            vcs.set_graph(
                &path,
                CommitGraphBuilder::new()
                    .ahead(&pair, &["feat: ATT-1 work"])
                    .build(),
            );
            let delay = if selected.contains(&i) { FAST } else { SLOW };
            vcs.set_delay(&path, delay);
            RepositoryRef::new(&path, format!("backend/svc-{i}"), "main")
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn cancellation_fires_once_selected_repositories_report() {
    let selected = [2usize, 5, 7];
    let vcs = Arc::new(MemoryVcs::new());
    let repos = fleet(&vcs, &selected);
    let started = Instant::now();

    let mut session = ScanSession::start(
        &repos,
        ReleaseTrack::DevToStaging,
        vcs.clone(),
        TicketPattern::disabled(),
        ScanOptions::default(),
    );
    let mut board = ScanBoard::new(repos.len());

    while !board.all_settled(selected) {
        let result = session
            .next_result()
            .await
            .expect("stream closed before selected repositories settled");
        board.apply(&result);
    }
    session.cancel();
    let cancelled_at = started.elapsed();
    assert!(
        cancelled_at < SLOW,
        "cancellation waited for slow repositories: {cancelled_at:?}"
    );
    for index in selected {
        assert_eq!(board.get(index).unwrap().commit_count(), 1);
    }

    // Slow workers finish their in-flight fetch, then discard the result.
    let stale = session.drain().await;
    assert!(stale.is_empty(), "cancelled workers published: {stale:?}");
    assert!(session.is_closed());
    assert_eq!(session.running(), 0);
    assert!(started.elapsed() <= SLOW + FAST);
    assert_eq!(board.pending_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_session_cancels_workers() {
    let vcs = Arc::new(MemoryVcs::new());
    let repos = fleet(&vcs, &[0]);
    let handle;
    {
        let mut session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::disabled(),
            ScanOptions::default(),
        );
        handle = session.cancel_handle();
        let first = session.next_result().await.unwrap();
        assert_eq!(first.index, 0);
    }
    assert!(handle.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn rescanning_an_unchanged_fleet_is_idempotent() {
    let vcs = Arc::new(MemoryVcs::new());
    let repos = fleet(&vcs, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut session = ScanSession::start(
            &repos,
            ReleaseTrack::DevToStaging,
            vcs.clone(),
            TicketPattern::compile("ATT-[0-9]+").unwrap(),
            ScanOptions::default(),
        );
        let mut results = session.drain().await;
        results.sort_by_key(|r| r.index);
        runs.push(results);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].len(), 10);
    assert!(runs[0].iter().all(|r| r.diff.tickets == vec!["ATT-1"]));
}
