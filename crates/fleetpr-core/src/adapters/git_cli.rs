//! [`VersionControl`] backed by the `git` command line.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::differ::{CommitGraphSnapshot, CommitNode};
use crate::domain::commit::CommitId;
use crate::domain::error::{FleetError, Result};
use crate::domain::repo::{remote_ref, BranchPair, REMOTE};
use crate::ports::VersionControl;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%B%x1e";
const MISSING_REF_MARKER: &str = "couldn't find remote ref";

/// Shells out to `git` in the repository's working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, repo: &Path, args: &[&str]) -> Result<Output> {
        debug!(repo = %repo.display(), ?args, "running git");
        let child = Command::new("git")
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                FleetError::Transport(format!(
                    "git {} timed out after {} seconds",
                    args.first().copied().unwrap_or_default(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(FleetError::from)
    }

    /// Resolve `reference` to a commit id, `None` when it does not exist.
    pub async fn resolve(&self, repo: &Path, reference: &str) -> Result<Option<CommitId>> {
        let spec = format!("{reference}^{{commit}}");
        let output = self
            .run(repo, &["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!sha.is_empty()).then(|| CommitId::new(sha)))
    }

    async fn ref_exists(&self, repo: &Path, reference: &str) -> Result<bool> {
        Ok(self.resolve(repo, reference).await?.is_some())
    }

    /// Run `git` and return trimmed stdout; a non-zero exit becomes a
    /// transport error naming the subcommand.
    async fn run_checked(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(repo, args).await?;
        if !output.status.success() {
            return Err(FleetError::Transport(format!(
                "git {}: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn fetch_remote_branches(&self, repo: &Path, branches: &[String]) -> Result<()> {
        let mut args = vec!["fetch", REMOTE];
        args.extend(branches.iter().map(String::as_str));
        let output = self.run(repo, &args).await?;
        if output.status.success() {
            return Ok(());
        }

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Err(classify_fetch_failure(combined.trim(), branches))
    }

    async fn has_remote_branch(&self, repo: &Path, branch: &str) -> Result<bool> {
        self.ref_exists(repo, &remote_ref(branch)).await
    }

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool> {
        self.ref_exists(repo, &format!("refs/heads/{branch}")).await
    }

    async fn is_dirty(&self, repo: &Path) -> Result<bool> {
        let status = self.run_checked(repo, &["status", "--porcelain"]).await?;
        Ok(!status.is_empty())
    }

    async fn pull(&self, repo: &Path, branch: &str) -> Result<usize> {
        self.run_checked(repo, &["checkout", "--quiet", branch]).await?;
        let before = self.run_checked(repo, &["rev-parse", "HEAD"]).await?;
        let upstream = format!("{REMOTE}/{branch}");
        self.run_checked(repo, &["merge", "--ff-only", "--quiet", &upstream])
            .await?;
        let range = format!("{before}..HEAD");
        let count = self.run_checked(repo, &["rev-list", "--count", &range]).await?;
        count
            .parse()
            .map_err(|e| FleetError::Parse(format!("git rev-list count {count:?}: {e}")))
    }

    async fn load_graph(&self, repo: &Path, pair: &BranchPair) -> Result<CommitGraphSnapshot> {
        let mut graph = CommitGraphSnapshot::new();
        let mut tips = Vec::new();
        for reference in [pair.base_ref(), pair.head_ref()] {
            if let Some(id) = self.resolve(repo, &reference).await? {
                tips.push(id.as_str().to_string());
                graph.set_ref(reference, id);
            }
        }
        if tips.is_empty() {
            return Ok(graph);
        }

        let mut args = vec!["log", LOG_FORMAT];
        args.extend(tips.iter().map(String::as_str));
        args.push("--");
        let output = self.run(repo, &args).await?;
        if !output.status.success() {
            return Err(FleetError::Transport(format!(
                "git log: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        for node in parse_log(&String::from_utf8_lossy(&output.stdout))? {
            graph.insert_commit(node);
        }
        Ok(graph)
    }
}

/// Map a failed `git fetch` to the error taxonomy.
///
/// Missing refs become [`FleetError::RefNotFound`] naming the branches git
/// reported (or all requested branches if none can be picked out).
fn classify_fetch_failure(output: &str, requested: &[String]) -> FleetError {
    if output.contains(MISSING_REF_MARKER) {
        let mut missing: Vec<String> = output
            .lines()
            .filter_map(|line| line.split(MISSING_REF_MARKER).nth(1))
            .map(|rest| rest.trim().trim_start_matches("refs/heads/").to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if missing.is_empty() {
            missing = requested.to_vec();
        }
        missing.dedup();
        return FleetError::RefNotFound { branches: missing };
    }
    if output.is_empty() {
        return FleetError::Transport(
            "git fetch: Failed to fetch from remote (check network/auth)".to_string(),
        );
    }
    FleetError::Transport(format!("git fetch: {output}"))
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
fn parse_log(output: &str) -> Result<Vec<CommitNode>> {
    let mut nodes = Vec::new();
    for record in output.split(RECORD_SEP) {
        let record = record.trim_start_matches('\n');
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(3, FIELD_SEP);
        let (Some(hash), Some(parents), Some(message)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(FleetError::Parse(format!(
                "malformed git log record: {:?}",
                record.chars().take(80).collect::<String>()
            )));
        };
        let parents = parents.split_whitespace().map(CommitId::from).collect();
        nodes.push(CommitNode::new(hash.trim(), message.trim_end(), parents));
    }
    Ok(nodes)
}
