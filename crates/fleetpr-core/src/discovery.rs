//! Repository discovery under the configured fleet root.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::{FleetError, Result};
use crate::domain::repo::RepositoryRef;
use crate::ports::VersionControl;

/// Directory walk limit for patterns containing `**`.
const MAX_GLOB_DEPTH: usize = 6;

/// One configured repository group, e.g. `frontend` → `frontend/*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoGroup {
    pub category: String,
    /// Glob relative to the fleet root. `*` does not cross `/`.
    pub pattern: String,
}

impl RepoGroup {
    pub fn new(category: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            pattern: pattern.into(),
        }
    }

    fn matcher(&self) -> Result<GlobMatcher> {
        GlobBuilder::new(&self.pattern)
            .literal_separator(true)
            .build()
            .map(|g| g.compile_matcher())
            .map_err(|e| {
                FleetError::Discovery(format!(
                    "invalid {} glob {:?}: {e}",
                    self.category, self.pattern
                ))
            })
    }

    fn depth(&self) -> usize {
        if self.pattern.contains("**") {
            MAX_GLOB_DEPTH
        } else {
            self.pattern.split('/').filter(|s| !s.is_empty()).count()
        }
    }
}

/// A repository found on disk, before its stable branch is known.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: PathBuf,
    display_name: String,
    parent: Option<String>,
}

/// `true` when `path` holds a git work tree (`.git` directory or file).
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Nearest enclosing git work tree of `start`, walking up.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find(|p| is_git_repo(p)).map(Path::to_path_buf)
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules"
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Directories up to `depth` levels below `root`, as paths relative to
/// `root`. Hidden directories and `node_modules` are not entered.
fn walk_dirs(root: &Path, rel: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth == 0 {
        return;
    }
    let Ok(entries) = fs::read_dir(root.join(rel)) else {
        return;
    };
    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_dir || skip_dir(&name) {
            continue;
        }
        let child = rel.join(&name);
        out.push(child.clone());
        walk_dirs(root, &child, depth - 1, out);
    }
}

fn relative_glob_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Nested git repositories directly inside `parent_path`.
fn nested_repos(parent_path: &Path, category: &str, parent_name: &str) -> Vec<Candidate> {
    let Ok(entries) = fs::read_dir(parent_path) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let path = e.path();
            (!skip_dir(&name) && is_git_repo(&path)).then(|| Candidate {
                path,
                display_name: format!("{category}/{parent_name}/{name}"),
                parent: Some(parent_name.to_string()),
            })
        })
        .collect()
}

/// Matched repositories in group order. A path matched by several groups
/// is kept under the first.
fn find_candidates(root: &Path, groups: &[RepoGroup]) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    for group in groups {
        let matcher = group.matcher()?;
        let mut dirs = Vec::new();
        walk_dirs(root, Path::new(""), group.depth(), &mut dirs);
        dirs.sort();

        for rel in dirs {
            if !matcher.is_match(relative_glob_path(&rel)) {
                continue;
            }
            let path = root.join(&rel);
            if !is_git_repo(&path) {
                continue;
            }
            let name = dir_name(&path);
            let nested = nested_repos(&path, &group.category, &name);
            if nested.is_empty() {
                if seen.insert(path.clone()) {
                    candidates.push(Candidate {
                        path,
                        display_name: format!("{}/{name}", group.category),
                        parent: None,
                    });
                }
            } else {
                debug!(parent = %name, count = nested.len(), "replacing parent with nested repositories");
                candidates.extend(nested.into_iter().filter(|c| seen.insert(c.path.clone())));
            }
        }
    }
    Ok(candidates)
}

/// Category, then top-level before nested, nested grouped by parent, then
/// display name.
fn fleet_order(a: &RepositoryRef, b: &RepositoryRef) -> Ordering {
    a.category()
        .cmp(b.category())
        .then_with(|| match (&a.parent, &b.parent) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(pa), Some(pb)) => pa.cmp(pb),
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.display_name.cmp(&b.display_name))
}

/// Discover every repository under `root` matching `groups`.
///
/// A matched repository whose immediate children are themselves git
/// repositories is replaced by those children. Stable branches are
/// detected concurrently through `vcs`.
pub async fn discover_repositories(
    root: &Path,
    groups: &[RepoGroup],
    vcs: &dyn VersionControl,
) -> Result<Vec<RepositoryRef>> {
    if !root.is_dir() {
        return Err(FleetError::Discovery(format!(
            "fleet root {} is not a directory",
            root.display()
        )));
    }
    let candidates = find_candidates(root, groups)?;

    let stable = join_all(
        candidates
            .iter()
            .map(|c| vcs.detect_stable_branch(&c.path)),
    )
    .await;

    let mut repos: Vec<RepositoryRef> = candidates
        .into_iter()
        .zip(stable)
        .map(|(c, stable)| {
            let repo = RepositoryRef::new(c.path, c.display_name, stable);
            match c.parent {
                Some(parent) => repo.with_parent(parent),
                None => repo,
            }
        })
        .collect();
    repos.sort_by(fleet_order);

    info!(root = %root.display(), count = repos.len(), "discovered repositories");
    Ok(repos)
}

/// The repository containing `start`, named after its directory.
pub async fn current_repository(
    start: &Path,
    vcs: &dyn VersionControl,
) -> Result<RepositoryRef> {
    let root = find_repo_root(start).ok_or_else(|| {
        FleetError::Discovery(format!(
            "{} is not inside a git repository",
            start.display()
        ))
    })?;
    let stable = vcs.detect_stable_branch(&root).await;
    let name = dir_name(&root);
    Ok(RepositoryRef::new(root, name, stable))
}
