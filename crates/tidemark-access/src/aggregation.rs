//! The aggregation relation: a forest of parent/child containment edges.
//!
//! Each identifier has at most one parent. Assigning a new parent detaches
//! the identifier from its previous one, so children sets across the forest
//! are always disjoint.
//!
//! # Invariants
//!
//! - Every child's `parent` points at a node whose `children` contains it.
//! - No identifier is its own ancestor ([`AggregationForest::insert`] rejects
//!   edges that would close a cycle).
//! - A node exists only while it takes part in at least one edge. Isolated
//!   nodes are pruned so that "known through aggregation" stays exact.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{AccessError, AccessResult};

/// One identifier's position in the forest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregationNode {
    /// The aggregating identifier, `None` for roots.
    pub parent: Option<String>,
    /// Directly aggregated identifiers.
    pub children: BTreeSet<String>,
}

impl AggregationNode {
    fn is_isolated(&self) -> bool {
        self.parent.is_none() && self.children.is_empty()
    }
}

/// Parent/child containment forest keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct AggregationForest {
    nodes: BTreeMap<String, AggregationNode>,
}

impl AggregationForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers taking part in at least one edge.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Identifiers in the forest, in key order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// First identifier strictly after `after` (or the first one).
    pub(crate) fn next_id_after(&self, after: Option<&str>) -> Option<&str> {
        next_key_after(&self.nodes, after)
    }

    /// The parent of `id`, if it has one.
    pub fn parent(&self, id: &str) -> Option<&str> {
        self.nodes.get(id)?.parent.as_deref()
    }

    /// Direct children of `id`, `None` if it is not in the forest.
    pub fn children(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(id).map(|node| &node.children)
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Aggregate `child` under `parent`.
    ///
    /// If `child` already has a different parent it is moved. Rejects edges
    /// where `child` is `parent` itself or one of its ancestors.
    pub fn insert(&mut self, parent: &str, child: &str) -> AccessResult<()> {
        if self.is_ancestor_or_self(child, parent) {
            return Err(AccessError::AggregationCycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let previous = self.parent(child).map(str::to_owned);
        if previous.as_deref() == Some(parent) {
            return Ok(());
        }
        if let Some(old_parent) = previous {
            debug!(child, from = %old_parent, to = parent, "moving aggregated id");
            self.unlink_child(&old_parent, child);
            self.prune(&old_parent);
        }

        self.nodes
            .entry(parent.to_string())
            .or_default()
            .children
            .insert(child.to_string());
        self.nodes.entry(child.to_string()).or_default().parent = Some(parent.to_string());
        Ok(())
    }

    /// Remove the single edge `parent -> child`.
    ///
    /// The child becomes a root and keeps its own subtree. Either end is
    /// dropped from the forest if the edge was its last one. Returns `false`
    /// if no such edge existed.
    pub fn remove_edge(&mut self, parent: &str, child: &str) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.unlink_child(parent, child);
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.prune(parent);
        self.prune(child);
        true
    }

    /// Clear both directions of `id`'s parent link.
    pub fn detach_from_parent(&mut self, id: &str) {
        let Some(parent) = self.parent(id).map(str::to_owned) else {
            return;
        };
        self.unlink_child(&parent, id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
        }
        self.prune(&parent);
        self.prune(id);
    }

    /// Remove `id` and every descendant. Returns the removed identifiers,
    /// `id` first. Identifiers not in the forest yield just `[id]`.
    pub fn remove_subtree(&mut self, id: &str) -> Vec<String> {
        self.detach_from_parent(id);

        let mut removed = Vec::new();
        let mut pending = vec![id.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                pending.extend(node.children.into_iter().rev());
            }
            removed.push(current);
        }
        removed
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    /// Depth-first traversal starting at `root` (yielded first).
    pub fn closure<'a>(&'a self, root: &'a str) -> Closure<'a> {
        Closure {
            forest: self,
            root: Some(root),
            stack: Vec::new(),
        }
    }

    /// Returns `true` if `ancestor` is `id` or lies on `id`'s parent chain.
    fn is_ancestor_or_self(&self, ancestor: &str, id: &str) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    fn unlink_child(&mut self, parent: &str, child: &str) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.remove(child);
        }
    }

    fn prune(&mut self, id: &str) {
        if self.nodes.get(id).is_some_and(AggregationNode::is_isolated) {
            self.nodes.remove(id);
        }
    }
}

/// Lazy depth-first walk over an aggregation subtree.
///
/// Keeps an explicit stack of sibling iterators instead of recursing, so deep
/// or wide trees cost heap, not call stack. Single pass.
pub struct Closure<'a> {
    forest: &'a AggregationForest,
    root: Option<&'a str>,
    stack: Vec<std::collections::btree_set::Iter<'a, String>>,
}

impl<'a> Iterator for Closure<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.root.take() {
            Some(root) => root,
            None => loop {
                let top = self.stack.last_mut()?;
                match top.next() {
                    Some(child) => break child.as_str(),
                    None => {
                        self.stack.pop();
                    }
                }
            },
        };
        if let Some(children) = self.forest.children(next) {
            self.stack.push(children.iter());
        }
        Some(next)
    }
}

pub(crate) fn next_key_after<'a, V>(
    map: &'a BTreeMap<String, V>,
    after: Option<&str>,
) -> Option<&'a str> {
    use std::ops::Bound;

    let lower = match after {
        Some(key) => Bound::Excluded(key),
        None => Bound::Unbounded,
    };
    map.range::<str, _>((lower, Bound::Unbounded))
        .next()
        .map(|(k, _)| k.as_str())
}
