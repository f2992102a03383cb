//! Revision lineage reconstruction from a flat object list.
//!
//! # Responsibility
//! - Rebuild the display hierarchy using revision-key suffix matching only.
//! - Produce the flat sorted alternative when the list presentation is active.
//!
//! # Invariants
//! - Each child key is exactly one generation below its parent's key.
//! - Objects whose direct ancestor is missing attach under the root at the
//!   smallest generation gap that matches.
//! - Every input object appears exactly once in the output.
//! - Siblings are kept in `ListOrdering` order.

use crate::model::graph::{Handle, ModelGraph};
use crate::model::ordering::{ListOrdering, Presentation};
use crate::model::revision::RevisionKey;
use std::cmp::Ordering;

/// One node of a revision tree. The root node carries no object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub handle: Option<Handle>,
    pub revision: RevisionKey,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn placeholder(revision: RevisionKey) -> Self {
        Self {
            handle: None,
            revision,
            children: Vec::new(),
        }
    }

    /// Number of object nodes in this subtree, excluding a placeholder.
    pub fn count(&self) -> usize {
        usize::from(self.handle.is_some())
            + self.children.iter().map(TreeNode::count).sum::<usize>()
    }

    /// Child handles in display order.
    pub fn child_handles(&self) -> Vec<Handle> {
        self.children.iter().filter_map(|child| child.handle).collect()
    }
}

/// Rooted revision tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionTree {
    pub root: TreeNode,
}

/// Builds revision trees under one ordering policy.
pub struct RevisionTreeBuilder<'g> {
    graph: &'g ModelGraph,
    ordering: ListOrdering,
}

impl<'g> RevisionTreeBuilder<'g> {
    pub fn new(graph: &'g ModelGraph, ordering: ListOrdering) -> Self {
        Self { graph, ordering }
    }

    /// Builds whatever the ordering's presentation asks for: the revision
    /// tree, or a flat sorted list hung directly under the root.
    pub fn present(&self, list: &[Handle]) -> RevisionTree {
        match self.ordering.presentation {
            Presentation::Tree => self.build(list),
            Presentation::List => self.build_flat(list),
        }
    }

    /// Every live handle as a leaf child of the root, in `ListOrdering`
    /// order. Dangling handles are ignored.
    pub fn build_flat(&self, list: &[Handle]) -> RevisionTree {
        let mut root = TreeNode::placeholder(RevisionKey::empty());
        for handle in list.iter().copied() {
            if !self.graph.contains(handle) {
                continue;
            }
            let node = TreeNode {
                handle: Some(handle),
                revision: self.revision_of(handle),
                children: Vec::new(),
            };
            self.insert_sorted(&mut root.children, node);
        }
        RevisionTree { root }
    }

    /// Builds a tree under an unversioned placeholder root.
    pub fn build(&self, list: &[Handle]) -> RevisionTree {
        self.build_with_root(list, RevisionKey::empty())
    }

    /// Builds a tree under a placeholder root carrying `root_revision`.
    ///
    /// Dangling handles are ignored.
    pub fn build_with_root(&self, list: &[Handle], root_revision: RevisionKey) -> RevisionTree {
        let mut remaining = list
            .iter()
            .copied()
            .filter(|handle| self.graph.contains(*handle))
            .collect::<Vec<_>>();
        let mut root = TreeNode::placeholder(root_revision);

        let deepest = remaining
            .iter()
            .map(|handle| self.revision_of(*handle).len())
            .max()
            .unwrap_or(0);

        let mut generation_gap = 1;
        while !remaining.is_empty() && generation_gap <= deepest {
            let matches = take_matching(&mut remaining, |handle| {
                self.revision_of(handle)
                    .is_descendant_of(&root.revision, generation_gap)
            });
            for matched in matches {
                let node = self.resolve(matched, &mut remaining);
                self.insert_sorted(&mut root.children, node);
            }
            generation_gap += 1;
        }

        // Keys that never extend the root key still get a place.
        while !remaining.is_empty() {
            let leftover = remaining.remove(0);
            let node = self.resolve(leftover, &mut remaining);
            self.insert_sorted(&mut root.children, node);
        }

        RevisionTree { root }
    }

    fn resolve(&self, handle: Handle, remaining: &mut Vec<Handle>) -> TreeNode {
        let revision = self.revision_of(handle);
        let matches = take_matching(remaining, |candidate| {
            self.revision_of(candidate).is_descendant_of(&revision, 1)
        });

        let mut node = TreeNode {
            handle: Some(handle),
            revision,
            children: Vec::new(),
        };
        for matched in matches {
            let child = self.resolve(matched, remaining);
            self.insert_sorted(&mut node.children, child);
        }
        node
    }

    fn insert_sorted(&self, siblings: &mut Vec<TreeNode>, node: TreeNode) {
        let position = siblings
            .binary_search_by(|existing| match (existing.handle, node.handle) {
                (Some(existing), Some(inserted)) => {
                    match (self.graph.get(existing), self.graph.get(inserted)) {
                        (Some(left), Some(right)) => {
                            self.ordering.compare(left, right).then(Ordering::Less)
                        }
                        _ => Ordering::Less,
                    }
                }
                _ => Ordering::Less,
            })
            .unwrap_or_else(|position| position);
        siblings.insert(position, node);
    }

    fn revision_of(&self, handle: Handle) -> RevisionKey {
        self.graph
            .get(handle)
            .map(|object| object.header.revision.clone())
            .unwrap_or_default()
    }
}

fn take_matching(
    remaining: &mut Vec<Handle>,
    mut predicate: impl FnMut(Handle) -> bool,
) -> Vec<Handle> {
    let mut matched = Vec::new();
    remaining.retain(|handle| {
        if predicate(*handle) {
            matched.push(*handle);
            false
        } else {
            true
        }
    });
    matched
}
