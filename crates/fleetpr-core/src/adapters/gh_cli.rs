//! [`PullRequestForge`] backed by the GitHub `gh` command line.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{FleetError, Result};
use crate::domain::pull_request::PullRequestRef;
use crate::domain::workflow::{WorkflowJob, WorkflowRun};
use crate::ports::{PullRequestForge, WorkflowRuns};

const PR_FIELDS: &str = "number,url,title,state";
const RUN_FIELDS: &str =
    "databaseId,displayTitle,workflowName,status,conclusion,headBranch,event,url,createdAt,updatedAt";

/// Shells out to `gh` in the repository's working tree.
#[derive(Debug, Clone)]
pub struct GhCli {
    timeout: Duration,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl GhCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, repo: Option<&Path>, args: &[&str]) -> Result<Output> {
        debug!(?args, "running gh");
        let mut cmd = Command::new("gh");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(repo) = repo {
            cmd.current_dir(repo);
        }
        let child = cmd.spawn()?;

        tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                FleetError::Transport(format!(
                    "gh {} timed out after {} seconds",
                    args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(FleetError::from)
    }

    /// Run `gh` and return stdout, mapping a non-zero exit to a transport
    /// error carrying the combined output.
    async fn run_checked(&self, repo: &Path, what: &str, args: &[&str]) -> Result<String> {
        let output = self.run(Some(repo), args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::Transport(format!(
                "{what} failed: {}",
                format!("{stdout}{stderr}").trim()
            )));
        }
        Ok(stdout)
    }

    async fn view_pr(&self, repo: &Path, number: u64) -> Result<PullRequestRef> {
        let number = number.to_string();
        let out = self
            .run_checked(repo, "gh pr view", &["pr", "view", &number, "--json", PR_FIELDS])
            .await?;
        serde_json::from_str(&out)
            .map_err(|e| FleetError::Parse(format!("failed to parse gh pr view output: {e}")))
    }
}

#[async_trait]
impl PullRequestForge for GhCli {
    async fn check_auth(&self) -> Result<()> {
        let output = self.run(None, &["auth", "status"]).await;
        match output {
            Ok(out) if out.status.success() => Ok(()),
            _ => Err(FleetError::NotAuthenticated(
                "not authenticated with GitHub CLI. Run 'gh auth login' first".to_string(),
            )),
        }
    }

    async fn find_open_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>> {
        let out = self
            .run_checked(
                repo,
                "gh pr list",
                &[
                    "pr", "list", "--head", head, "--base", base, "--state", "open", "--json",
                    PR_FIELDS,
                ],
            )
            .await?;
        parse_pr_list(&out)
    }

    async fn create_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef> {
        let out = self
            .run_checked(
                repo,
                "gh pr create",
                &[
                    "pr", "create", "--head", head, "--base", base, "--title", title, "--body",
                    body,
                ],
            )
            .await?;
        Ok(parse_created_pr(&out, title))
    }

    async fn update_pr(
        &self,
        repo: &Path,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef> {
        let num = number.to_string();
        self.run_checked(
            repo,
            "gh pr edit",
            &["pr", "edit", &num, "--title", title, "--body", body],
        )
        .await?;
        self.view_pr(repo, number).await
    }

    async fn merge_pr(&self, repo: &Path, number: u64) -> Result<()> {
        let num = number.to_string();
        self.run_checked(
            repo,
            "gh pr merge",
            &["pr", "merge", &num, "--merge", "--delete-branch=false"],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowRuns for GhCli {
    async fn list_runs(&self, repo: &Path, limit: usize) -> Result<Vec<WorkflowRun>> {
        let limit = limit.to_string();
        let out = self
            .run_checked(
                repo,
                "gh run list",
                &["run", "list", "--limit", &limit, "--json", RUN_FIELDS],
            )
            .await?;
        serde_json::from_str(&out)
            .map_err(|e| FleetError::Parse(format!("failed to parse gh run list output: {e}")))
    }

    async fn run_jobs(&self, repo: &Path, run_id: u64) -> Result<Vec<WorkflowJob>> {
        let id = run_id.to_string();
        let out = self
            .run_checked(repo, "gh run view", &["run", "view", &id, "--json", "jobs"])
            .await?;
        parse_run_jobs(&out)
    }
}

#[derive(Deserialize)]
struct RunJobs {
    jobs: Vec<WorkflowJob>,
}

/// gh reports unset job timestamps as year 1.
fn parse_run_jobs(out: &str) -> Result<Vec<WorkflowJob>> {
    let parsed: RunJobs = serde_json::from_str(out)
        .map_err(|e| FleetError::Parse(format!("failed to parse gh run view output: {e}")))?;
    Ok(parsed
        .jobs
        .into_iter()
        .map(|mut job| {
            job.started_at = job.started_at.filter(|t| t.year() > 1);
            job.completed_at = job.completed_at.filter(|t| t.year() > 1);
            job
        })
        .collect())
}

fn parse_pr_list(out: &str) -> Result<Option<PullRequestRef>> {
    let prs: Vec<PullRequestRef> = serde_json::from_str(out)
        .map_err(|e| FleetError::Parse(format!("failed to parse gh pr list output: {e}")))?;
    Ok(prs.into_iter().next())
}

/// `gh pr create` prints the new PR's URL; the number is its last segment.
fn parse_created_pr(out: &str, title: &str) -> PullRequestRef {
    let url = out.trim().to_string();
    let number = url
        .rsplit('/')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    PullRequestRef::new(number, url, title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_list_takes_first() {
        let out = r#"[{"number":42,"url":"https://github.com/acme/web/pull/42","title":"dev → staging","state":"OPEN"}]"#;
        let pr = parse_pr_list(out).unwrap().unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.state, "OPEN");
        assert!(parse_pr_list("[]").unwrap().is_none());
    }

    #[test]
    fn test_parse_pr_list_rejects_garbage() {
        let err = parse_pr_list("not json").unwrap_err();
        assert!(matches!(err, FleetError::Parse(_)));
    }

    #[test]
    fn test_parse_run_jobs_clears_zero_timestamps() {
        let out = r#"{"jobs":[{"name":"test","status":"in_progress","conclusion":"",
            "startedAt":"2026-10-18T09:00:00Z","completedAt":"0001-01-01T00:00:00Z",
            "url":"https://github.com/acme/web/actions/runs/1/job/2",
            "steps":[{"name":"Checkout","number":1,"status":"completed","conclusion":"success"}]}]}"#;
        let jobs = parse_run_jobs(out).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].started_at.is_some());
        assert!(jobs[0].completed_at.is_none());
        assert_eq!(jobs[0].steps[0].conclusion, "success");
    }

    #[test]
    fn test_parse_created_pr_number_from_url() {
        let pr = parse_created_pr("https://github.com/acme/web/pull/123\n", "Release");
        assert_eq!(pr.number, 123);
        assert_eq!(pr.url, "https://github.com/acme/web/pull/123");
        assert_eq!(pr.title, "Release");
    }
}
