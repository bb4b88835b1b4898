//! fleetpr - release PRs across a fleet of git repositories
//!
//! ## Commands
//!
//! - `scan`: diff the release branches of every repository, printing results as they arrive
//! - `batch`: create or update release PRs for a selection of repositories
//! - `single`: create or update the release PR of the current repository
//! - `open-prs`: list open release PRs across the fleet
//! - `merge`: merge selected open release PRs
//! - `pull`: fast-forward one branch in every repository
//! - `actions`: recent CI workflow runs, or the jobs of one run

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use fleetpr_batch::{
    list_open_release_prs, list_recent_runs, merge_candidates, merge_selected, BatchPipeline,
    BatchRun, FleetPull, OutcomeStatus, PullBranch, PullStatus, PullSummary, ReleaseContext,
    SelectionSet, SingleRelease, WatchObserver,
};
use fleetpr_core::adapters::dry_run::sample_repositories;
use fleetpr_core::{
    current_repository, discover_repositories, DryRunForge, DryRunVcs, FleetConfig, GhCli, GitCli,
    PullRequestForge, ReleaseTrack, RepositoryRef, ScanOptions, ScanSession, ScanState,
    VersionControl, WorkflowRuns,
};

#[derive(Parser)]
#[command(name = "fleetpr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release PRs across a fleet of git repositories", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/fleetpr.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Simulate git and GitHub with synthetic, delayed results
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every repository and print its pending commits
    Scan {
        /// Release track: dev-staging or staging-stable
        #[arg(short, long, default_value = "dev-staging")]
        track: ReleaseTrack,
    },

    /// Create or update release PRs for the selected repositories
    Batch {
        /// Release track: dev-staging or staging-stable
        #[arg(short, long, default_value = "dev-staging")]
        track: ReleaseTrack,

        /// Repository to include, by display name or short name (repeatable)
        #[arg(short, long = "select")]
        select: Vec<String>,

        /// Include every discovered repository
        #[arg(long, conflicts_with = "select")]
        all: bool,

        /// PR title (default: "<head> → <base>")
        #[arg(long)]
        title: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Create or update the release PR of one repository
    Single {
        /// Release track: dev-staging or staging-stable
        #[arg(short, long, default_value = "dev-staging")]
        track: ReleaseTrack,

        /// Directory inside the repository (default: current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// PR title (default: "<head> → <base>")
        #[arg(long)]
        title: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List open release PRs across the fleet
    OpenPrs,

    /// Merge open release PRs of the selected repositories
    Merge {
        /// Repository whose release PRs to merge (repeatable)
        #[arg(short, long = "select")]
        select: Vec<String>,

        /// Merge every open release PR
        #[arg(long, conflicts_with = "select")]
        all: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Fast-forward one branch in every repository
    Pull {
        /// Branch to pull; "main" means each repository's stable branch
        #[arg(short, long, default_value = "main")]
        branch: PullBranch,
    },

    /// Show recent CI workflow runs across the fleet
    Actions {
        /// Repository of the run whose jobs to show
        #[arg(long, requires = "run")]
        repo: Option<String>,

        /// Show the jobs of this run
        #[arg(long, requires = "repo")]
        run: Option<u64>,
    },
}

/// Collaborators and settings shared by every command.
struct App {
    config: FleetConfig,
    dry_run: bool,
    vcs: Arc<dyn VersionControl>,
    forge: Arc<dyn PullRequestForge>,
    runs: Arc<dyn WorkflowRuns>,
}

impl App {
    fn new(config: FleetConfig, dry_run: bool) -> Self {
        let timeout = config.scan.git_timeout();
        let (vcs, forge, runs): (
            Arc<dyn VersionControl>,
            Arc<dyn PullRequestForge>,
            Arc<dyn WorkflowRuns>,
        ) = if dry_run {
            let forge = Arc::new(DryRunForge);
            (Arc::new(DryRunVcs), forge.clone(), forge)
        } else {
            let gh = Arc::new(GhCli::new(timeout));
            (Arc::new(GitCli::new(timeout)), gh.clone(), gh)
        };
        Self {
            config,
            dry_run,
            vcs,
            forge,
            runs,
        }
    }

    fn context(&self) -> Result<ReleaseContext> {
        Ok(ReleaseContext::new(
            Arc::clone(&self.vcs),
            Arc::clone(&self.forge),
            self.config.ticket_pattern()?,
            self.config.tickets.org.clone(),
        ))
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            surface_errors: self.config.scan.surface_errors,
        }
    }

    async fn check_auth(&self) -> Result<()> {
        self.forge.check_auth().await?;
        Ok(())
    }

    /// Repositories under the configured root. A dry run with nothing on
    /// disk uses the sample fleet.
    async fn repositories(&self) -> Result<Vec<RepositoryRef>> {
        let root = self.config.root();
        let found = discover_repositories(&root, &self.config.paths.groups, self.vcs.as_ref()).await;
        match found {
            Ok(repos) if !repos.is_empty() => Ok(repos),
            Ok(_) | Err(_) if self.dry_run => {
                debug!("no repositories on disk, using the sample fleet");
                Ok(sample_repositories())
            }
            Ok(_) => anyhow::bail!("No repositories found under {}", root.display()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to discover repositories")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    fleetpr_core::init_tracing(cli.json, level);

    let config = FleetConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let app = App::new(config, cli.dry_run);
    if app.dry_run {
        println!("(DRY RUN) no git or GitHub calls will be made\n");
    }

    match cli.command {
        Commands::Scan { track } => cmd_scan(&app, track).await,
        Commands::Batch {
            track,
            select,
            all,
            title,
            yes,
        } => cmd_batch(&app, track, &select, all, title, yes).await,
        Commands::Single {
            track,
            path,
            title,
            yes,
        } => cmd_single(&app, track, path.as_deref(), title, yes).await,
        Commands::OpenPrs => cmd_open_prs(&app).await,
        Commands::Merge { select, all, yes } => cmd_merge(&app, &select, all, yes).await,
        Commands::Pull { branch } => cmd_pull(&app, &branch).await,
        Commands::Actions { repo, run } => match (repo, run) {
            (Some(repo), Some(run)) => cmd_run_jobs(&app, &repo, run).await,
            _ => cmd_actions(&app).await,
        },
    }
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Apply the user's answer to a run awaiting confirmation. Returns `true`
/// when processing started.
fn answer_confirmation(
    pipeline: &BatchPipeline,
    run: &mut BatchRun,
    approved: bool,
) -> Result<bool> {
    if approved {
        pipeline.confirm(run)?;
    } else {
        pipeline.decline(run)?;
    }
    Ok(approved)
}

fn describe(state: &ScanState) -> String {
    match state {
        ScanState::Pending => "…".to_string(),
        ScanState::Empty { warning: None } => "no commits".to_string(),
        ScanState::Empty {
            warning: Some(warning),
        } => format!("no commits (⚠ {warning})"),
        ScanState::Populated { diff } => {
            let mut line = format!("{} commit(s)", diff.len());
            if !diff.tickets.is_empty() {
                line.push_str(&format!(" [{}]", diff.tickets.join(", ")));
            }
            line
        }
    }
}

/// Print scan results in completion order.
async fn cmd_scan(app: &App, track: ReleaseTrack) -> Result<()> {
    app.check_auth().await?;
    let repos = app.repositories().await?;
    let mut session = ScanSession::start(
        &repos,
        track,
        Arc::clone(&app.vcs),
        app.config.ticket_pattern()?,
        app.scan_options(),
    );

    println!("Scanning {} repositories ({})\n", repos.len(), track.slug());
    let mut with_commits = 0;
    while let Some(result) = session.next_result().await {
        let state = ScanState::from(&result);
        if state.diff().is_some() {
            with_commits += 1;
        }
        let mark = if state.diff().is_some() { "✓" } else { "·" };
        println!("  {mark} {}: {}", result.repo, describe(&state));
        if let Some(diff) = state.diff() {
            for commit in &diff.commits {
                println!("      {} {}", commit.short_hash, commit.summary);
            }
        }
    }
    println!("\n{with_commits}/{} repositories have commits to release", repos.len());
    Ok(())
}

async fn cmd_batch(
    app: &App,
    track: ReleaseTrack,
    select: &[String],
    all: bool,
    title: Option<String>,
    yes: bool,
) -> Result<()> {
    if select.is_empty() && !all {
        anyhow::bail!("Select repositories with --select NAME or --all");
    }
    app.check_auth().await?;
    let repos = app.repositories().await?;

    let (observer, mut progress) = WatchObserver::new();
    let pipeline = BatchPipeline::new(app.context()?)
        .with_observer(Arc::new(observer))
        .with_concurrency(app.config.scan.existing_pr_concurrency);

    let mut run = BatchRun::new(repos, track);
    if let Some(title) = title {
        run = run.with_title(title);
    }
    let mut session = pipeline.start_scan(&run, app.scan_options());

    *run.selection_mut()? = if all {
        SelectionSet::all(run.repos().len())
    } else {
        SelectionSet::from_names(run.repos(), select)?
    };
    pipeline.commit_selection(&mut run)?;

    println!("Waiting for {} selected repositories...", run.selection().count());
    pipeline.wait_for_scans(&mut run, &mut session).await?;
    session.shutdown().await;

    for index in run.selection().indices() {
        if let Some(state) = run.board().get(index) {
            println!("  {}: {}", run.repos()[index].display_name, describe(state));
        }
    }

    let report = pipeline.check_existing(&mut run).await?;
    println!(
        "\n{} repositories with commits, {} already have an open PR",
        report.repos_with_commits, report.existing_prs
    );
    if !report.tickets.is_empty() {
        println!("Tickets: {}", report.tickets.join(", "));
    }

    if !run.has_work() {
        println!("Nothing to do: no selected repository has commits to merge.");
        return Ok(());
    }
    let approved = confirm(
        &format!("Create/update {} release PRs?", report.repos_with_commits),
        yes,
    )?;
    if !answer_confirmation(&pipeline, &mut run, approved)? {
        println!("Aborted.");
        return Ok(());
    }

    let render = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            if let (Some(repo), Some(step)) = (snapshot.repo, snapshot.step) {
                eprintln!("  {repo}: {step}");
            }
        }
    });
    let summary = pipeline.run_to_completion(&mut run).await?;
    drop(pipeline);
    render.await.ok();

    println!();
    for outcome in &summary.outcomes {
        let mark = match outcome.status {
            OutcomeStatus::Created | OutcomeStatus::Updated => "✓",
            OutcomeStatus::Skipped { .. } => "·",
            OutcomeStatus::Failed { .. } => "✗",
        };
        match &outcome.pr_url {
            Some(url) => println!("  {mark} {}: {} {url}", outcome.repo, outcome.status),
            None => println!("  {mark} {}: {}", outcome.repo, outcome.status),
        }
    }
    println!(
        "\nSummary: {} succeeded, {} skipped, {} failed ({}ms)",
        summary.succeeded(),
        summary.skipped,
        summary.failed,
        summary.duration_ms
    );

    if summary.has_failures() {
        anyhow::bail!("{} repositories failed", summary.failed)
    }
    Ok(())
}

async fn cmd_single(
    app: &App,
    track: ReleaseTrack,
    path: Option<&Path>,
    title: Option<String>,
    yes: bool,
) -> Result<()> {
    app.check_auth().await?;
    let start = match path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let repo = if app.dry_run {
        sample_repositories()
            .into_iter()
            .next()
            .context("Sample fleet is empty")?
    } else {
        current_repository(&start, app.vcs.as_ref()).await?
    };

    let single = SingleRelease::new(app.context()?);
    let plan = single
        .prepare(&repo, track, title)
        .await
        .with_context(|| format!("Failed to diff {}", repo.display_name))?;

    println!("{} ({})", repo.display_name, plan.pair);
    if !plan.has_commits() {
        println!("No commits to merge.");
        return Ok(());
    }
    for commit in &plan.diff.commits {
        println!("  {} {}", commit.short_hash, commit.summary);
    }
    if let Some(pr) = &plan.existing {
        println!("Open PR #{} will be updated: {}", pr.number, pr.url);
    }

    let action = if plan.is_update() { "Update" } else { "Create" };
    if !confirm(&format!("{action} PR \"{}\"?", plan.title), yes)? {
        println!("Aborted.");
        return Ok(());
    }
    let outcome = single.submit(&plan).await?;
    println!(
        "✓ {}: {}",
        outcome.status,
        outcome.pr_url.unwrap_or_default()
    );
    Ok(())
}

async fn cmd_open_prs(app: &App) -> Result<()> {
    app.check_auth().await?;
    let repos = app.repositories().await?;
    let open = list_open_release_prs(Arc::clone(&app.forge), &repos).await;
    let candidates = merge_candidates(&open);
    if candidates.is_empty() {
        println!("No open release PRs.");
        return Ok(());
    }
    for candidate in &candidates {
        println!("  {}  {}", candidate.label(), candidate.pr.url);
    }
    Ok(())
}

async fn cmd_merge(app: &App, select: &[String], all: bool, yes: bool) -> Result<()> {
    if select.is_empty() && !all {
        anyhow::bail!("Select repositories with --select NAME or --all");
    }
    app.check_auth().await?;
    let repos = app.repositories().await?;
    let open = list_open_release_prs(Arc::clone(&app.forge), &repos).await;
    let candidates = merge_candidates(&open);

    let chosen: Vec<_> = if all {
        candidates
    } else {
        let listed: Vec<RepositoryRef> = open.iter().map(|o| o.repo.clone()).collect();
        let selection = SelectionSet::from_names(&listed, select)
            .context("Selected repository has no open release PR")?;
        let names: Vec<&str> = selection
            .indices()
            .map(|i| listed[i].display_name.as_str())
            .collect();
        candidates
            .into_iter()
            .filter(|c| names.contains(&c.repo.display_name.as_str()))
            .collect()
    };
    if chosen.is_empty() {
        println!("No open release PRs to merge.");
        return Ok(());
    }

    for candidate in &chosen {
        println!("  {}", candidate.label());
    }
    if !confirm(&format!("Merge {} PRs?", chosen.len()), yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let outcomes = merge_selected(app.forge.as_ref(), &chosen).await;
    let mut failed = 0;
    for outcome in &outcomes {
        if outcome.success {
            println!("  ✓ {} #{} merged", outcome.repo, outcome.number);
        } else {
            failed += 1;
            println!(
                "  ✗ {} #{}: {}",
                outcome.repo,
                outcome.number,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} merges failed")
    }
    Ok(())
}

fn print_pull_summary(summary: &PullSummary) {
    println!(
        "\nSummary: {} updated ({} commits), {} up to date, {} skipped, {} failed",
        summary.updated, summary.commits, summary.up_to_date, summary.skipped, summary.failed
    );
}

/// Pull every repository in fleet order, printing each result as it lands.
async fn cmd_pull(app: &App, branch: &PullBranch) -> Result<()> {
    let repos = app.repositories().await?;
    let pull = FleetPull::new(Arc::clone(&app.vcs));

    println!("Pulling {branch} in {} repositories\n", repos.len());
    let mut outcomes = Vec::with_capacity(repos.len());
    for repo in &repos {
        let outcome = pull.pull_repo(repo, branch).await;
        let mark = match outcome.status {
            PullStatus::Updated { .. } => "✓",
            PullStatus::UpToDate => "=",
            PullStatus::SkippedNoBranch | PullStatus::SkippedDirty => "·",
            PullStatus::Failed { .. } => "✗",
        };
        println!("  {mark} {} ({}): {}", outcome.repo, outcome.branch, outcome.status);
        outcomes.push(outcome);
    }

    let summary = PullSummary::from_outcomes(outcomes);
    print_pull_summary(&summary);
    if summary.has_failures() {
        anyhow::bail!("{} repositories failed to pull", summary.failed)
    }
    Ok(())
}

async fn cmd_actions(app: &App) -> Result<()> {
    app.check_auth().await?;
    let repos = app.repositories().await?;
    let entries = list_recent_runs(Arc::clone(&app.runs), &repos, Utc::now()).await;
    if entries.is_empty() {
        println!("No recent workflow runs.");
        return Ok(());
    }
    for entry in &entries {
        let run = &entry.run;
        println!(
            "  {:<12} {:<24} {:<10} {:<8} {} [{}] #{}",
            run.state_label(),
            entry.repo.display_name,
            run.workflow_name,
            run.head_branch,
            run.display_title,
            run.updated_at.format("%Y-%m-%d %H:%M"),
            run.database_id,
        );
    }
    Ok(())
}

async fn cmd_run_jobs(app: &App, repo: &str, run_id: u64) -> Result<()> {
    app.check_auth().await?;
    let repos = app.repositories().await?;
    let selection = SelectionSet::from_names(&repos, &[repo.to_string()])?;
    let index = selection
        .indices()
        .next()
        .with_context(|| format!("Unknown repository {repo}"))?;
    let repo = &repos[index];

    let jobs = app
        .runs
        .run_jobs(repo.path(), run_id)
        .await
        .with_context(|| format!("Failed to load jobs of run {run_id}"))?;
    println!("{} run #{run_id}", repo.display_name);
    for job in &jobs {
        let state = if job.conclusion.is_empty() {
            &job.status
        } else {
            &job.conclusion
        };
        println!("  {} ({state})", job.name);
        for step in &job.steps {
            let state = if step.conclusion.is_empty() {
                &step.status
            } else {
                &step.conclusion
            };
            println!("    {}. {} ({state})", step.number, step.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetpr_batch::BatchPhase;
    use fleetpr_core::fakes::{CommitGraphBuilder, MemoryForge, MemoryVcs};
    use fleetpr_core::{CommitRecord, DiffResult, TicketPattern};

    #[test]
    fn test_cli_parses_batch_selection() {
        let cli = Cli::parse_from([
            "fleetpr", "--dry-run", "batch", "--track", "staging-stable", "-s", "web", "-s",
            "api", "--yes",
        ]);
        assert!(cli.dry_run);
        match cli.command {
            Commands::Batch {
                track, select, yes, ..
            } => {
                assert_eq!(track, ReleaseTrack::StagingToStable);
                assert_eq!(select, vec!["web", "api"]);
                assert!(yes);
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_track() {
        assert!(Cli::try_parse_from(["fleetpr", "scan", "--track", "prod"]).is_err());
    }

    #[test]
    fn test_describe_scan_states() {
        let diff = DiffResult::from_commits(vec![CommitRecord::new(
            "abc1234",
            "feat: x",
            vec!["ATT-1".into()],
        )]);
        assert_eq!(
            describe(&ScanState::Populated { diff }),
            "1 commit(s) [ATT-1]"
        );
        assert_eq!(
            describe(&ScanState::Empty {
                warning: Some("git fetch: timeout".into())
            }),
            "no commits (⚠ git fetch: timeout)"
        );
    }

    #[test]
    fn test_cli_parses_pull_and_actions() {
        let cli = Cli::parse_from(["fleetpr", "pull"]);
        assert!(matches!(
            cli.command,
            Commands::Pull {
                branch: PullBranch::Stable
            }
        ));
        let cli = Cli::parse_from(["fleetpr", "actions", "--repo", "web", "--run", "42"]);
        match cli.command {
            Commands::Actions { repo, run } => {
                assert_eq!(repo.as_deref(), Some("web"));
                assert_eq!(run, Some(42));
            }
            _ => panic!("expected actions"),
        }
        assert!(Cli::try_parse_from(["fleetpr", "actions", "--run", "42"]).is_err());
    }

    /// A pipeline and run over one repository with commits, driven to
    /// `AwaitingConfirmation`.
    async fn awaiting_confirmation() -> (BatchPipeline, BatchRun) {
        let vcs = Arc::new(MemoryVcs::new());
        let repo = RepositoryRef::new("/fleet/api", "backend/api", "main");
        vcs.set_graph(
            repo.path(),
            CommitGraphBuilder::new()
                .ahead(&ReleaseTrack::DevToStaging.branch_pair(&repo), &["feat: ATT-1"])
                .build(),
        );
        let pipeline = BatchPipeline::new(ReleaseContext::new(
            vcs,
            Arc::new(MemoryForge::new()),
            TicketPattern::disabled(),
            "acme",
        ));
        let mut run = BatchRun::new(vec![repo], ReleaseTrack::DevToStaging);
        let mut session = pipeline.start_scan(&run, ScanOptions::default());
        run.selection_mut().unwrap().select(0);
        pipeline.commit_selection(&mut run).unwrap();
        pipeline.wait_for_scans(&mut run, &mut session).await.unwrap();
        session.shutdown().await;
        pipeline.check_existing(&mut run).await.unwrap();
        assert!(run.has_work());
        (pipeline, run)
    }

    #[tokio::test]
    async fn test_declined_batch_returns_to_selection() {
        let (pipeline, mut run) = awaiting_confirmation().await;
        assert!(!answer_confirmation(&pipeline, &mut run, false).unwrap());
        assert_eq!(run.phase(), &BatchPhase::SelectingRepos);
        assert!(run.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_approved_batch_starts_processing() {
        let (pipeline, mut run) = awaiting_confirmation().await;
        assert!(answer_confirmation(&pipeline, &mut run, true).unwrap());
        assert_eq!(run.phase(), &BatchPhase::Processing(0));
    }

    #[tokio::test]
    async fn test_dry_run_falls_back_to_sample_fleet() {
        let mut config = FleetConfig::default();
        config.paths.root = "/nonexistent/fleet".to_string();
        let app = App::new(config, true);
        let repos = app.repositories().await.unwrap();
        assert_eq!(repos, sample_repositories());
    }
}
