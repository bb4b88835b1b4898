//! Commit records and per-repository diff results.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the abbreviated hash shown to users.
pub const SHORT_HASH_LEN: usize = 7;

/// Full object id of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters (or the whole id if shorter).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(SHORT_HASH_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}

/// One commit on the head side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Abbreviated hash (7 chars).
    pub short_hash: String,

    /// First line of the commit message.
    pub summary: String,

    /// Uppercased, de-duplicated, sorted ticket ids found in the full message.
    pub tickets: Vec<String>,
}

impl CommitRecord {
    pub fn new(short_hash: impl Into<String>, summary: impl Into<String>, tickets: Vec<String>) -> Self {
        Self {
            short_hash: short_hash.into(),
            summary: summary.into(),
            tickets,
        }
    }
}

/// Commits reachable from head but not from base, for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Head-history traversal order, first seen wins.
    pub commits: Vec<CommitRecord>,

    /// Union of all commit tickets, sorted and de-duplicated.
    pub tickets: Vec<String>,
}

impl DiffResult {
    /// Build a result, deriving the ticket union from `commits`.
    pub fn from_commits(commits: Vec<CommitRecord>) -> Self {
        let tickets = collect_tickets(&commits);
        Self { commits, tickets }
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }
}

/// All unique tickets across `commits`, sorted.
pub fn collect_tickets(commits: &[CommitRecord]) -> Vec<String> {
    commits
        .iter()
        .flat_map(|c| c.tickets.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_truncates_to_seven() {
        let id = CommitId::new("0123456789abcdef");
        assert_eq!(id.short(), "0123456");
        assert_eq!(CommitId::new("abc").short(), "abc");
    }

    #[test]
    fn test_collect_tickets_merges_and_sorts() {
        let commits = vec![
            CommitRecord::new("a", "one", vec!["ATT-2".into(), "ATT-10".into()]),
            CommitRecord::new("b", "two", vec!["ATT-1".into(), "ATT-2".into()]),
            CommitRecord::new("c", "three", vec![]),
        ];
        assert_eq!(collect_tickets(&commits), vec!["ATT-1", "ATT-10", "ATT-2"]);
    }

    #[test]
    fn test_empty_diff_result() {
        let diff = DiffResult::from_commits(vec![]);
        assert!(diff.is_empty());
        assert!(diff.tickets.is_empty());
    }
}
