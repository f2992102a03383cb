//! Canonical template pool.
//!
//! # Responsibility
//! - Hold per-kind lists of canonical (templated) objects.
//! - Deduplicate insertions by superficial structural comparison.
//! - Track queued deletions and the replicas created by the last copy.
//!
//! # Invariants
//! - `insert_once` is the only deduplicating entry point; `find_equal`
//!   answers the same question without inserting.
//! - Deletion flushing is not transactional: a failure stops the flush and
//!   keeps the failed entry and everything after it queued.
//! - `is_modified` compares positionally, so reordering counts as change.
//! - The replica register is cleared at the start of every replicate/revise.

use crate::model::error::ModelResult;
use crate::model::graph::{Handle, ModelGraph};
use crate::model::object::ObjectKind;
use crate::model::ordering::ListOrdering;
use crate::repo::graph_io::GraphLoader;
use crate::repo::model_store::{ModelStore, StoreResult};
use log::{error, info};
use std::collections::BTreeMap;

/// Kind filter for pool listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindSelector {
    One(ObjectKind),
    All,
}

/// Per-kind collection of canonical objects living in a `ModelGraph`.
#[derive(Debug, Clone, Default)]
pub struct TemplatePool {
    lists: BTreeMap<ObjectKind, Vec<Handle>>,
    pending_deletions: Vec<Handle>,
    replicas: Vec<Handle>,
    ordering: ListOrdering,
}

impl TemplatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ordering(ordering: ListOrdering) -> Self {
        Self {
            ordering,
            ..Self::default()
        }
    }

    pub fn ordering(&self) -> ListOrdering {
        self.ordering
    }

    pub fn set_ordering(&mut self, ordering: ListOrdering) {
        self.ordering = ordering;
    }

    /// Raw list for one kind in insertion order.
    pub fn handles(&self, kind: ObjectKind) -> &[Handle] {
        self.lists.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of entries across kinds.
    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.lists.values().any(|list| list.contains(&handle))
    }

    /// Canonical list sorted by the active ordering.
    pub fn list_by_kind(&self, graph: &ModelGraph, selector: KindSelector) -> Vec<Handle> {
        let mut handles = match selector {
            KindSelector::One(kind) => self.handles(kind).to_vec(),
            KindSelector::All => self.lists.values().flatten().copied().collect(),
        };
        handles.retain(|handle| graph.contains(*handle));
        handles.sort_by(|left, right| match (graph.get(*left), graph.get(*right)) {
            (Some(left), Some(right)) => self.ordering.compare(left, right),
            _ => std::cmp::Ordering::Equal,
        });
        handles
    }

    /// Finds the entry with storage `id` in the `kind` list.
    pub fn lookup(&self, graph: &ModelGraph, kind: ObjectKind, id: i64) -> Option<Handle> {
        self.handles(kind)
            .iter()
            .copied()
            .find(|handle| graph.get(*handle).is_some_and(|object| object.id() == id))
    }

    /// First entry superficially equal to `handle`, which may be `handle`
    /// itself when it is already pooled.
    pub fn find_equal(&self, graph: &ModelGraph, handle: Handle) -> Option<Handle> {
        let object = graph.get(handle)?;
        self.handles(object.kind())
            .iter()
            .copied()
            .find(|existing| graph.structural_compare(*existing, handle, true))
    }

    /// Appends `handle` unless a superficially equal entry already exists.
    ///
    /// Returns `true` when the entry was added.
    pub fn insert_once(&mut self, graph: &ModelGraph, handle: Handle) -> bool {
        let Some(object) = graph.get(handle) else {
            return false;
        };
        if self.find_equal(graph, handle).is_some() {
            return false;
        }
        self.lists.entry(object.kind()).or_default().push(handle);
        true
    }

    /// Appends every handle to the `kind` list without deduplication.
    pub fn insert_bulk(&mut self, handles: &[Handle], kind: ObjectKind) {
        self.lists
            .entry(kind)
            .or_default()
            .extend_from_slice(handles);
    }

    /// Removes `handle` from whichever list holds it.
    pub fn remove(&mut self, handle: Handle) -> bool {
        let mut removed = false;
        for list in self.lists.values_mut() {
            let before = list.len();
            list.retain(|existing| *existing != handle);
            removed |= list.len() != before;
        }
        removed
    }

    /// Queues `handle` for deletion on the next flush.
    pub fn mark_for_deletion(&mut self, handle: Handle) {
        if !self.pending_deletions.contains(&handle) {
            self.pending_deletions.push(handle);
        }
    }

    pub fn pending_deletions(&self) -> &[Handle] {
        &self.pending_deletions
    }

    /// Deletes queued templates through `store`, in queue order.
    ///
    /// Unsaved entries are dropped without a store call. Each deleted entry
    /// leaves the pool and the arena immediately.
    ///
    /// # Errors
    /// - The first store failure stops the flush; that entry and the rest
    ///   stay queued.
    pub fn flush_deletions(
        &mut self,
        graph: &mut ModelGraph,
        store: &mut dyn ModelStore,
    ) -> StoreResult<usize> {
        let mut deleted = 0;
        while let Some(handle) = self.pending_deletions.first().copied() {
            if let Some(object) = graph.get(handle) {
                if object.id() > 0 {
                    if let Err(err) = store.delete(object.kind(), object.id()) {
                        error!(
                            "event=template_flush module=templates status=error handle={} deleted={} error={}",
                            handle, deleted, err
                        );
                        return Err(err);
                    }
                }
            }
            self.pending_deletions.remove(0);
            self.remove(handle);
            graph.remove(handle);
            deleted += 1;
        }
        info!(
            "event=template_flush module=templates status=ok deleted={}",
            deleted
        );
        Ok(deleted)
    }

    /// True when any entry has never been saved.
    pub fn has_unsaved_entries(&self, graph: &ModelGraph) -> bool {
        self.lists
            .values()
            .flatten()
            .any(|handle| graph.get(*handle).is_some_and(|object| object.is_new()))
    }

    /// Bulk-populates every kind from `store`. Returns the number loaded.
    ///
    /// One loader serves every kind, so a template nested inside another
    /// template is loaded once and shared.
    pub fn load_from_store(
        &mut self,
        graph: &mut ModelGraph,
        store: &dyn ModelStore,
    ) -> ModelResult<usize> {
        let mut per_kind = Vec::with_capacity(ObjectKind::ALL.len());
        {
            let mut loader = GraphLoader::new(graph, store);
            for kind in ObjectKind::ALL {
                let mut handles = Vec::new();
                for record in store.load_templates(kind, None)? {
                    handles.push(loader.insert_record(record)?);
                }
                per_kind.push((kind, handles));
            }
        }

        let mut loaded = 0;
        for (kind, handles) in per_kind {
            loaded += handles.len();
            self.insert_bulk(&handles, kind);
        }
        info!(
            "event=template_load module=templates status=ok loaded={}",
            loaded
        );
        Ok(loaded)
    }

    /// Compares this pool against a freshly loaded copy of the stored one.
    ///
    /// Any length difference or positional pair failing full structural
    /// comparison counts as modified.
    pub fn is_modified(&self, graph: &ModelGraph, store: &dyn ModelStore) -> ModelResult<bool> {
        let mut stored_graph = ModelGraph::new();
        let mut stored = TemplatePool::new();
        stored.load_from_store(&mut stored_graph, store)?;

        for kind in ObjectKind::ALL {
            let mine = self.handles(kind);
            let theirs = stored.handles(kind);
            if mine.len() != theirs.len() {
                return Ok(true);
            }
            let all_equal = mine
                .iter()
                .zip(theirs.iter())
                .all(|(left, right)| graph.structural_eq(*left, &stored_graph, *right, false));
            if !all_equal {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Editable snapshot: every entry replaced by a non-recursive clone.
    pub fn duplicate(&self, graph: &mut ModelGraph) -> ModelResult<TemplatePool> {
        let mut copy = TemplatePool::with_ordering(self.ordering);
        for (kind, handles) in &self.lists {
            let mut cloned = Vec::with_capacity(handles.len());
            for handle in handles {
                cloned.push(graph.clone_object(*handle, false)?);
            }
            copy.insert_bulk(&cloned, *kind);
        }
        Ok(copy)
    }

    /// Forgets replicas registered by the previous copy operation.
    pub fn clear_replicas(&mut self) {
        self.replicas.clear();
    }

    pub fn register_replica(&mut self, handle: Handle) {
        self.replicas.push(handle);
    }

    /// Nodes created by the most recent replicate/revise.
    pub fn replicas(&self) -> &[Handle] {
        &self.replicas
    }
}
