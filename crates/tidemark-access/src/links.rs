//! The link relation: unrestricted "refers to" edges between identifiers.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregation::next_key_after;

/// Source identifier -> set of referred identifiers.
///
/// An entry exists only while its set is non-empty.
#[derive(Clone, Debug, Default)]
pub struct LinkRelation {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl LinkRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers with at least one outgoing link.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub(crate) fn next_id_after(&self, after: Option<&str>) -> Option<&str> {
        next_key_after(&self.edges, after)
    }

    /// Identifiers referred to by `id`.
    pub fn referred(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(id)
    }

    /// Add `id -> referred`. Returns `false` if the edge already existed.
    pub fn insert(&mut self, id: &str, referred: &str) -> bool {
        self.edges
            .entry(id.to_string())
            .or_default()
            .insert(referred.to_string())
    }

    /// Remove one edge, dropping `id`'s entry when its last edge goes.
    pub fn remove(&mut self, id: &str, referred: &str) -> bool {
        let Some(set) = self.edges.get_mut(id) else {
            return false;
        };
        let removed = set.remove(referred);
        if set.is_empty() {
            self.edges.remove(id);
        }
        removed
    }

    /// Remove every outgoing edge of `id`.
    pub fn remove_all(&mut self, id: &str) -> Option<BTreeSet<String>> {
        self.edges.remove(id)
    }
}
