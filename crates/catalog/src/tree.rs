//! Breadth-first descendant enumeration over parent references.
//!
//! The walk itself is pure: the caller feeds it the direct children of each
//! node it hands out, so the same logic drives both store-backed lookups (one
//! child query per node) and in-memory slices.

use std::collections::{HashSet, VecDeque};

use storefront_core::CategoryId;

use crate::category::Category;

/// Frontier + visited-set state for a breadth-first descendant walk.
///
/// The result always contains the root. Ids are enqueued at most once, so
/// malformed cyclic data terminates instead of looping.
#[derive(Debug, Clone)]
pub struct DescendantWalk {
    frontier: VecDeque<CategoryId>,
    visited: HashSet<CategoryId>,
    order: Vec<CategoryId>,
}

impl DescendantWalk {
    pub fn new(root: CategoryId) -> Self {
        let mut visited = HashSet::new();
        visited.insert(root);
        Self {
            frontier: VecDeque::from([root]),
            visited,
            order: vec![root],
        }
    }

    /// Next node whose children should be looked up, if any remain.
    pub fn next_parent(&mut self) -> Option<CategoryId> {
        self.frontier.pop_front()
    }

    /// Record the direct children of the node last returned by `next_parent`.
    pub fn push_children<I>(&mut self, children: I)
    where
        I: IntoIterator<Item = CategoryId>,
    {
        for child in children {
            if self.visited.insert(child) {
                self.frontier.push_back(child);
                self.order.push(child);
            }
        }
    }

    /// Every id reached so far, root first, in breadth-first order.
    pub fn visited_in_order(&self) -> &[CategoryId] {
        &self.order
    }

    pub fn into_set(self) -> HashSet<CategoryId> {
        self.visited
    }
}

/// Descendant set of `root` (including `root`) within an in-memory slice.
pub fn descendant_ids_in(categories: &[Category], root: CategoryId) -> HashSet<CategoryId> {
    let mut walk = DescendantWalk::new(root);
    while let Some(parent) = walk.next_parent() {
        walk.push_children(
            categories
                .iter()
                .filter(|c| c.parent == Some(parent))
                .map(|c| c.id),
        );
    }
    walk.into_set()
}
