//! User selection over a repository list.

use std::collections::BTreeSet;

use fleetpr_core::RepositoryRef;

use crate::error::{BatchError, BatchResult};

/// Selected positions in a repository list, iterated in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    selected: BTreeSet<usize>,
    len: usize,
}

impl SelectionSet {
    /// Empty selection over a list of `len` entries.
    pub fn new(len: usize) -> Self {
        Self {
            selected: BTreeSet::new(),
            len,
        }
    }

    pub fn all(len: usize) -> Self {
        Self {
            selected: (0..len).collect(),
            len,
        }
    }

    /// Select repositories by display name (`frontend/web`) or short name
    /// (`web`).
    pub fn from_names<S: AsRef<str>>(repos: &[RepositoryRef], names: &[S]) -> BatchResult<Self> {
        let mut selection = Self::new(repos.len());
        for name in names {
            let name = name.as_ref();
            let matches: Vec<usize> = repos
                .iter()
                .enumerate()
                .filter(|(_, r)| r.display_name == name)
                .map(|(i, _)| i)
                .collect();
            let matches = if matches.is_empty() {
                repos
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.short_name() == name)
                    .map(|(i, _)| i)
                    .collect()
            } else {
                matches
            };
            if matches.is_empty() {
                return Err(BatchError::UnknownRepository(name.to_string()));
            }
            selection.selected.extend(matches);
        }
        Ok(selection)
    }

    /// Select `index`; out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.len {
            self.selected.insert(index);
        }
    }

    pub fn deselect(&mut self, index: usize) {
        self.selected.remove(&index);
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.selected.remove(&index) {
            self.select(index);
        }
    }

    pub fn select_all(&mut self) {
        self.selected = (0..self.len).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn contains(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Selected indices in ascending (list) order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().copied()
    }

    pub fn count(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn list_len(&self) -> usize {
        self.len
    }
}
