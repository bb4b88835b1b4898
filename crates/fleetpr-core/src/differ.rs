//! Commit range differ over a merge-commit DAG.
//!
//! [`diff_commits`] answers "which commits are reachable from the head ref
//! but not from the base ref". Both walks follow every parent edge of merge
//! commits, and the head walk never stops early at the first base-reachable
//! commit: a merge can have one parent already in base and another parent
//! still carrying unmerged work.

use std::collections::{HashMap, HashSet};

use crate::domain::commit::{CommitId, CommitRecord, DiffResult};
use crate::domain::error::{FleetError, Result};
use crate::domain::repo::BranchPair;
use crate::tickets::TicketPattern;

/// A single commit as seen by the differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode {
    pub id: CommitId,
    /// Full commit message.
    pub message: String,
    /// Parent ids, first parent first.
    pub parents: Vec<CommitId>,
}

impl CommitNode {
    pub fn new(id: impl Into<String>, message: impl Into<String>, parents: Vec<CommitId>) -> Self {
        Self {
            id: CommitId::new(id),
            message: message.into(),
            parents,
        }
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Read access to a commit graph.
pub trait CommitGraph {
    /// Resolve a ref (e.g. `refs/remotes/origin/dev`) to a commit id.
    fn resolve(&self, reference: &str) -> Option<CommitId>;

    /// Look up a commit. `None` for objects outside the graph (shallow
    /// boundaries), which terminates that branch of a walk.
    fn commit(&self, id: &CommitId) -> Option<&CommitNode>;

    /// Pre-order depth-first walk from `start`, first parent first, visiting
    /// each reachable commit exactly once.
    fn ancestors(&self, start: &CommitId) -> Ancestors<'_, Self>
    where
        Self: Sized,
    {
        Ancestors::new(self, start.clone())
    }
}

/// Iterator over every commit reachable from a starting commit, following
/// all parents.
pub struct Ancestors<'g, G: CommitGraph + ?Sized> {
    graph: &'g G,
    stack: Vec<CommitId>,
    visited: HashSet<CommitId>,
}

impl<'g, G: CommitGraph + ?Sized> Ancestors<'g, G> {
    pub fn new(graph: &'g G, start: CommitId) -> Self {
        Self {
            graph,
            stack: vec![start],
            visited: HashSet::new(),
        }
    }
}

impl<'g, G: CommitGraph + ?Sized> Iterator for Ancestors<'g, G> {
    type Item = &'g CommitNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.graph.commit(&id) else {
                continue;
            };
            for parent in node.parents.iter().rev() {
                if !self.visited.contains(parent) {
                    self.stack.push(parent.clone());
                }
            }
            return Some(node);
        }
        None
    }
}

/// In-memory commit graph plus the refs resolved when it was loaded.
#[derive(Debug, Clone, Default)]
pub struct CommitGraphSnapshot {
    commits: HashMap<CommitId, CommitNode>,
    refs: HashMap<String, CommitId>,
}

impl CommitGraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_commit(&mut self, node: CommitNode) {
        self.commits.insert(node.id.clone(), node);
    }

    pub fn set_ref(&mut self, reference: impl Into<String>, id: CommitId) {
        self.refs.insert(reference.into(), id);
    }

    pub fn remove_ref(&mut self, reference: &str) -> Option<CommitId> {
        self.refs.remove(reference)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl CommitGraph for CommitGraphSnapshot {
    fn resolve(&self, reference: &str) -> Option<CommitId> {
        self.refs.get(reference).cloned()
    }

    fn commit(&self, id: &CommitId) -> Option<&CommitNode> {
        self.commits.get(id)
    }
}

/// Commits reachable from `pair.head_ref()` but not from `pair.base_ref()`.
///
/// Unresolvable refs produce [`FleetError::RefNotFound`] naming every missing
/// branch. Tickets come from the full message; the summary keeps only the
/// first line.
pub fn diff_commits<G: CommitGraph>(
    graph: &G,
    pair: &BranchPair,
    tickets: &TicketPattern,
) -> Result<DiffResult> {
    let base = graph.resolve(&pair.base_ref());
    let head = graph.resolve(&pair.head_ref());

    let (base, head) = match (base, head) {
        (Some(base), Some(head)) => (base, head),
        (base, head) => {
            let mut missing = Vec::new();
            if base.is_none() {
                missing.push(pair.base.clone());
            }
            if head.is_none() {
                missing.push(pair.head.clone());
            }
            return Err(FleetError::RefNotFound { branches: missing });
        }
    };

    let base_reachable: HashSet<&CommitId> = graph.ancestors(&base).map(|c| &c.id).collect();

    let mut seen: HashSet<&CommitId> = HashSet::new();
    let mut commits = Vec::new();
    for node in graph.ancestors(&head) {
        // No early exit here: keep walking past base-reachable commits.
        if base_reachable.contains(&node.id) || !seen.insert(&node.id) {
            continue;
        }
        commits.push(CommitRecord::new(
            node.id.short(),
            node.summary(),
            tickets.extract(&node.message),
        ));
    }

    Ok(DiffResult::from_commits(commits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CommitId {
        CommitId::new(s)
    }

    fn node(name: &str, msg: &str, parents: &[&str]) -> CommitNode {
        CommitNode::new(name, msg, parents.iter().map(|p| id(p)).collect())
    }

    fn pair() -> BranchPair {
        BranchPair::new("staging", "dev")
    }

    /// root - a - b (staging)
    ///          \
    ///           c - d (dev)
    fn linear_graph() -> CommitGraphSnapshot {
        let mut g = CommitGraphSnapshot::new();
        g.insert_commit(node("root0000", "root", &[]));
        g.insert_commit(node("a0000000", "a", &["root0000"]));
        g.insert_commit(node("b0000000", "b", &["a0000000"]));
        g.insert_commit(node("c0000000", "feat: c ATT-3", &["a0000000"]));
        g.insert_commit(node("d0000000", "feat: d\n\nCloses att-4", &["c0000000"]));
        g.set_ref("refs/remotes/origin/staging", id("b0000000"));
        g.set_ref("refs/remotes/origin/dev", id("d0000000"));
        g
    }

    #[test]
    fn test_linear_diff_in_head_traversal_order() {
        let tickets = TicketPattern::compile("ATT-[0-9]+").unwrap();
        let diff = diff_commits(&linear_graph(), &pair(), &tickets).unwrap();
        let hashes: Vec<&str> = diff.commits.iter().map(|c| c.short_hash.as_str()).collect();
        assert_eq!(hashes, vec!["d000000", "c000000"]);
        assert_eq!(diff.commits[0].summary, "feat: d");
        assert_eq!(diff.commits[0].tickets, vec!["ATT-4"]);
        assert_eq!(diff.tickets, vec!["ATT-3", "ATT-4"]);
    }

    #[test]
    fn test_merge_with_unmerged_second_parent_is_not_dropped() {
        // base: root - m1 (staging)
        // head: merge(m1, f2) where f2 - f1 - root never reached staging.
        let mut g = CommitGraphSnapshot::new();
        g.insert_commit(node("root0000", "root", &[]));
        g.insert_commit(node("m1000000", "already merged", &["root0000"]));
        g.insert_commit(node("f1000000", "feature one", &["root0000"]));
        g.insert_commit(node("f2000000", "feature two", &["f1000000"]));
        g.insert_commit(node("mg000000", "Merge feature", &["m1000000", "f2000000"]));
        g.set_ref("refs/remotes/origin/staging", id("m1000000"));
        g.set_ref("refs/remotes/origin/dev", id("mg000000"));

        let diff = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap();
        let hashes: Vec<&str> = diff.commits.iter().map(|c| c.short_hash.as_str()).collect();
        assert_eq!(hashes, vec!["mg00000", "f200000", "f100000"]);
    }

    #[test]
    fn test_base_walk_follows_all_merge_parents() {
        // staging contains a merge that brought in x; dev builds on x alone.
        let mut g = CommitGraphSnapshot::new();
        g.insert_commit(node("root0000", "root", &[]));
        g.insert_commit(node("x0000000", "x", &["root0000"]));
        g.insert_commit(node("s1000000", "s1", &["root0000"]));
        g.insert_commit(node("sm000000", "merge x", &["s1000000", "x0000000"]));
        g.insert_commit(node("y0000000", "y", &["x0000000"]));
        g.set_ref("refs/remotes/origin/staging", id("sm000000"));
        g.set_ref("refs/remotes/origin/dev", id("y0000000"));

        let diff = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap();
        let hashes: Vec<&str> = diff.commits.iter().map(|c| c.short_hash.as_str()).collect();
        assert_eq!(hashes, vec!["y000000"]);
    }

    #[test]
    fn test_diamond_emits_each_commit_once() {
        let mut g = CommitGraphSnapshot::new();
        g.insert_commit(node("root0000", "root", &[]));
        g.insert_commit(node("l0000000", "left", &["root0000"]));
        g.insert_commit(node("r0000000", "right", &["root0000"]));
        g.insert_commit(node("j0000000", "join", &["l0000000", "r0000000"]));
        g.insert_commit(node("t0000000", "top", &["j0000000", "r0000000"]));
        g.set_ref("refs/remotes/origin/staging", id("root0000"));
        g.set_ref("refs/remotes/origin/dev", id("t0000000"));

        let diff = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap();
        let hashes: Vec<&str> = diff.commits.iter().map(|c| c.short_hash.as_str()).collect();
        assert_eq!(hashes, vec!["t000000", "j000000", "l000000", "r000000"]);
    }

    #[test]
    fn test_identical_refs_yield_empty_diff() {
        let mut g = linear_graph();
        g.set_ref("refs/remotes/origin/dev", id("b0000000"));
        let diff = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_missing_refs_are_named() {
        let mut g = linear_graph();
        g.remove_ref("refs/remotes/origin/dev");
        let err = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap_err();
        match err {
            FleetError::RefNotFound { branches } => assert_eq!(branches, vec!["dev"]),
            other => panic!("unexpected error: {other}"),
        }

        g.remove_ref("refs/remotes/origin/staging");
        let err = diff_commits(&g, &pair(), &TicketPattern::disabled()).unwrap_err();
        match err {
            FleetError::RefNotFound { branches } => {
                assert_eq!(branches, vec!["staging", "dev"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_diff_is_idempotent() {
        let g = linear_graph();
        let tickets = TicketPattern::compile("ATT-[0-9]+").unwrap();
        let first = diff_commits(&g, &pair(), &tickets).unwrap();
        let second = diff_commits(&g, &pair(), &tickets).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ancestors_skips_commits_outside_graph() {
        let mut g = CommitGraphSnapshot::new();
        g.insert_commit(node("c0000000", "c", &["missing0"]));
        let visited: Vec<&str> = g.ancestors(&id("c0000000")).map(|c| c.id.as_str()).collect();
        assert_eq!(visited, vec!["c0000000"]);
    }
}
