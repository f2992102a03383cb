//! Arena-backed object graph and copy operators.
//!
//! # Responsibility
//! - Own every live `DomainObject` in handle-addressed slots.
//! - Provide structural comparison (full vs superficial).
//! - Implement clone/replicate/revise/hollow copies and template promotion.
//!
//! # Invariants
//! - Handles are never reused; removed slots stay empty.
//! - Copies are staged and only become visible once fully built.
//! - Per slot, a referenced object is copied iff the mode is a deep clone or
//!   the object is not a template; templates are otherwise shared by handle.
//! - One copy operation maps each source handle to at most one copy, so
//!   aliased references stay aliased in the result.

use crate::model::error::{ModelError, ModelResult};
use crate::model::object::{now_epoch_ms, DomainObject, ObjectKind, BROKEN_ID, NEW_ID};
use crate::model::revision::RevisionKey;
use crate::repo::model_store::ModelStore;
use crate::template::pool::TemplatePool;
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Stable arena address of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Copy semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Identity-preserving copy. `deep` copies every referenced object,
    /// templates included; otherwise every reference is shared.
    Clone { deep: bool },
    /// Structurally independent copy with `id = 0` on every copied node.
    Replicate,
    /// Replicate plus freshly allocated revisions; a template source is
    /// un-templated and attached to `new_parent_id`.
    Revise { new_parent_id: Option<i64> },
}

impl CopyMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Clone { .. } => "clone",
            Self::Replicate => "replicate",
            Self::Revise { .. } => "revise",
        }
    }
}

/// Arena of model objects.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    slots: Vec<Option<DomainObject>>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one object and returns its handle.
    pub fn insert(&mut self, object: DomainObject) -> Handle {
        let handle = Handle::from_index(self.slots.len());
        self.slots.push(Some(object));
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<&DomainObject> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut DomainObject> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    /// Like `get`, but reports a dangling handle as an error.
    pub fn object(&self, handle: Handle) -> ModelResult<&DomainObject> {
        self.get(handle).ok_or(ModelError::UnknownHandle(handle))
    }

    pub fn object_mut(&mut self, handle: Handle) -> ModelResult<&mut DomainObject> {
        self.get_mut(handle).ok_or(ModelError::UnknownHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Empties one slot. Other objects still referencing it now dangle.
    pub fn remove(&mut self, handle: Handle) -> Option<DomainObject> {
        self.slots.get_mut(handle.index()).and_then(Option::take)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| Handle::from_index(index))
    }

    /// Owned children of `parent` that have `kind`.
    pub fn children_of_kind(&self, parent: Handle, kind: ObjectKind) -> Vec<Handle> {
        let Some(object) = self.get(parent) else {
            return Vec::new();
        };
        object
            .owned_children()
            .into_iter()
            .filter(|child| self.get(*child).map(DomainObject::kind) == Some(kind))
            .collect()
    }

    /// `root` and everything reachable from it, depth-first, owned children
    /// before links. Dangling handles are skipped.
    pub fn reachable(&self, root: Handle) -> Vec<Handle> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.walk(root, true, &mut visited, &mut order);
        order
    }

    /// `root` and its owned descendants only.
    pub fn owned_subtree(&self, root: Handle) -> Vec<Handle> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.walk(root, false, &mut visited, &mut order);
        order
    }

    fn walk(
        &self,
        handle: Handle,
        follow_links: bool,
        visited: &mut HashSet<Handle>,
        order: &mut Vec<Handle>,
    ) {
        let Some(object) = self.get(handle) else {
            return;
        };
        if !visited.insert(handle) {
            return;
        }
        order.push(handle);
        for child in object.owned_children() {
            self.walk(child, follow_links, visited, order);
        }
        if follow_links {
            for target in object.links() {
                self.walk(target, follow_links, visited, order);
            }
        }
    }

    /// Structural comparison between `left` here and `right` in `other`.
    ///
    /// Full mode compares identity, template and lock flags, revision and
    /// every naming/payload field. Superficial mode compares naming and
    /// payload only. Child and link slots are compared pairwise in the
    /// same mode; the first mismatch short-circuits.
    pub fn structural_eq(
        &self,
        left: Handle,
        other: &ModelGraph,
        right: Handle,
        superficial: bool,
    ) -> bool {
        let (Some(mine), Some(theirs)) = (self.get(left), other.get(right)) else {
            return false;
        };
        if mine.kind() != theirs.kind()
            || !mine.header.matches(&theirs.header, superficial)
            || !mine.body.payload_matches(&theirs.body)
        {
            return false;
        }

        let my_slots = mine.slots();
        let their_slots = theirs.slots();
        my_slots.len() == their_slots.len()
            && my_slots
                .iter()
                .zip(their_slots.iter())
                .all(|((my_role, my_handle), (their_role, their_handle))| {
                    my_role == their_role
                        && self.structural_eq(*my_handle, other, *their_handle, superficial)
                })
    }

    /// Same-arena shorthand for `structural_eq`.
    pub fn structural_compare(&self, left: Handle, right: Handle, superficial: bool) -> bool {
        self.structural_eq(left, self, right, superficial)
    }

    /// Copies `source` with identity preserved.
    pub fn clone_object(&mut self, source: Handle, deep: bool) -> ModelResult<Handle> {
        let (root, _) = self.copy_with(source, CopyMode::Clone { deep }, None)?;
        Ok(root)
    }

    /// Deep-copies `source` and its non-template descendants with `id = 0`.
    ///
    /// The pool's replica register is cleared first and then lists every
    /// node created by this call.
    pub fn copy_replicate(
        &mut self,
        source: Handle,
        pool: &mut TemplatePool,
    ) -> ModelResult<Handle> {
        pool.clear_replicas();
        let (root, created) = self.copy_with(source, CopyMode::Replicate, None)?;
        for handle in created {
            pool.register_replica(handle);
        }
        Ok(root)
    }

    /// Replicates `source` and allocates the next revision for every copy.
    ///
    /// # Errors
    /// - Store failures and malformed allocated revisions abort the copy;
    ///   nothing is added to the arena in that case.
    pub fn copy_revise(
        &mut self,
        source: Handle,
        pool: &mut TemplatePool,
        store: &dyn ModelStore,
        new_parent_id: Option<i64>,
    ) -> ModelResult<Handle> {
        pool.clear_replicas();
        let (root, created) =
            self.copy_with(source, CopyMode::Revise { new_parent_id }, Some(store))?;
        for handle in created {
            pool.register_replica(handle);
        }
        Ok(root)
    }

    /// Placeholder copy: every reference dropped and `id = BROKEN_ID`.
    pub fn copy_hollow(&mut self, source: Handle) -> ModelResult<Handle> {
        let mut hollow = self.object(source)?.clone();
        hollow.clear_slots();
        hollow.header.id = BROKEN_ID;
        Ok(self.insert(hollow))
    }

    fn copy_with(
        &mut self,
        source: Handle,
        mode: CopyMode,
        store: Option<&dyn ModelStore>,
    ) -> ModelResult<(Handle, Vec<Handle>)> {
        let base = self.slots.len();
        let staged = {
            let mut job = CopyJob {
                graph: &*self,
                store,
                mode,
                base,
                staged: Vec::new(),
                mapping: HashMap::new(),
                now: now_epoch_ms(),
            };
            job.copy_node(source, true)?;
            job.staged
        };

        let created = (base..base + staged.len())
            .map(Handle::from_index)
            .collect::<Vec<_>>();
        self.slots.extend(staged.into_iter().map(Some));
        debug!(
            "event=object_copy module=model status=ok mode={} source={} copied={}",
            mode.as_str(),
            source,
            created.len()
        );
        Ok((Handle::from_index(base), created))
    }

    /// Promotes `handle` to a template and registers it in `pool`.
    ///
    /// Returns the canonical handle: `handle` itself when it was promoted, or
    /// the superficially equal entry the pool already held. In the second
    /// case `handle` is left untouched.
    pub fn mark_as_template(
        &mut self,
        handle: Handle,
        pool: &mut TemplatePool,
    ) -> ModelResult<Handle> {
        let object = self.object(handle)?;
        if object.is_broken() {
            return Err(ModelError::BrokenObject(handle));
        }
        if object.is_template() {
            return Err(ModelError::AlreadyTemplate(handle));
        }
        if let Some(existing) = pool.find_equal(self, handle) {
            info!(
                "event=template_mark module=model status=skipped handle={} existing={}",
                handle, existing
            );
            return Ok(existing);
        }

        let object = self.object_mut(handle)?;
        object.header.is_template = true;
        object.header.parent_id = None;
        object.touch();
        pool.insert_once(self, handle);
        info!(
            "event=template_mark module=model status=ok handle={}",
            handle
        );
        Ok(handle)
    }

    /// Detaches a template from template status and attaches it to `parent_id`.
    ///
    /// With `deep_link_copy` a fully independent deep clone is detached
    /// instead and the original stays as it was.
    pub fn un_template(
        &mut self,
        handle: Handle,
        parent_id: Option<i64>,
        deep_link_copy: bool,
    ) -> ModelResult<Handle> {
        let target = if deep_link_copy {
            self.clone_object(handle, true)?
        } else {
            handle
        };
        let object = self.object_mut(target)?;
        object.header.is_template = false;
        object.header.parent_id = parent_id;
        object.touch();
        Ok(target)
    }

    /// Re-inserts an edited template as a fully independent structural copy.
    ///
    /// Returns the handle that now sits in the pool. When the edit made the
    /// template equal to another entry, that entry is returned and no copy
    /// is made.
    pub fn retemplate(&mut self, handle: Handle, pool: &mut TemplatePool) -> ModelResult<Handle> {
        if !self.object(handle)?.is_template() {
            return Err(ModelError::NotTemplate(handle));
        }
        pool.remove(handle);
        if let Some(existing) = pool.find_equal(self, handle) {
            return Ok(existing);
        }
        let copy = self.un_template(handle, None, true)?;
        self.mark_as_template(copy, pool)
    }
}

struct CopyJob<'a> {
    graph: &'a ModelGraph,
    store: Option<&'a dyn ModelStore>,
    mode: CopyMode,
    base: usize,
    staged: Vec<DomainObject>,
    mapping: HashMap<Handle, Handle>,
    now: i64,
}

impl CopyJob<'_> {
    fn copy_node(&mut self, source: Handle, is_root: bool) -> ModelResult<Handle> {
        if let Some(mapped) = self.mapping.get(&source) {
            return Ok(*mapped);
        }

        let graph = self.graph;
        let original = graph.object(source)?;
        let mut copy = original.clone();

        match self.mode {
            CopyMode::Clone { .. } => {}
            CopyMode::Replicate => self.reset_identity(&mut copy, is_root),
            CopyMode::Revise { new_parent_id } => {
                self.reset_identity(&mut copy, is_root);
                if !original.is_broken() {
                    copy.header.revision =
                        self.allocate_revision(original.kind(), &original.header.revision)?;
                }
                if is_root && original.is_template() {
                    copy.header.is_template = false;
                    copy.header.parent_id = new_parent_id;
                }
            }
        }

        let handle = Handle::from_index(self.base + self.staged.len());
        self.mapping.insert(source, handle);
        self.staged.push(copy);

        let mut remapped = Vec::new();
        for (_, child) in original.slots() {
            remapped.push(self.copy_slot(child)?);
        }
        let mut remapped = remapped.into_iter();
        self.staged[handle.index() - self.base].map_slots(|_, old| remapped.next().unwrap_or(old));
        Ok(handle)
    }

    fn copy_slot(&mut self, child: Handle) -> ModelResult<Handle> {
        let copy_child = match self.mode {
            CopyMode::Clone { deep } => deep,
            CopyMode::Replicate | CopyMode::Revise { .. } => {
                !self.graph.object(child)?.is_template()
            }
        };
        if copy_child {
            self.copy_node(child, false)
        } else {
            Ok(child)
        }
    }

    fn reset_identity(&self, copy: &mut DomainObject, is_root: bool) {
        if !copy.is_broken() {
            copy.header.id = NEW_ID;
        }
        copy.header.created_at = self.now;
        copy.header.modified_at = self.now;
        if !is_root && !copy.is_template() {
            copy.header.parent_id = None;
        }
    }

    fn allocate_revision(
        &self,
        kind: ObjectKind,
        current: &RevisionKey,
    ) -> ModelResult<RevisionKey> {
        let Some(store) = self.store else {
            return Ok(current.clone());
        };
        let allocated = store.next_revision(kind, &current.to_string())?;
        let mut key = RevisionKey::parse(&allocated)?;

        let newest_in_flight = self
            .staged
            .iter()
            .filter(|object| object.kind() == kind)
            .map(|object| &object.header.revision)
            .filter(|revision| {
                revision.len() == key.len() && revision.parent_prefix() == key.parent_prefix()
            })
            .max_by(|left, right| left.compare(right));
        if let Some(newest) = newest_in_flight {
            if key.compare(newest) != Ordering::Greater {
                key = key.bump_minor_after(newest);
            }
        }

        Ok(ensure_after(key, current))
    }
}

fn ensure_after(key: RevisionKey, source: &RevisionKey) -> RevisionKey {
    if key.compare(source) == Ordering::Greater {
        return key;
    }
    if !key.is_empty() && key.len() <= source.len() {
        let bumped = key.bump_minor_after(source);
        if bumped.compare(source) == Ordering::Greater {
            return bumped;
        }
    }
    source.child(1)
}

#[cfg(test)]
mod tests {
    use super::{ensure_after, ModelGraph};
    use crate::model::object::{DomainObject, ObjectKind};
    use crate::model::revision::RevisionKey;

    fn key(text: &str) -> RevisionKey {
        RevisionKey::parse(text).expect("valid revision")
    }

    #[test]
    fn ensure_after_keeps_keys_already_ahead() {
        assert_eq!(ensure_after(key("2.3.7"), &key("2.3")), key("2.3.7"));
        assert_eq!(ensure_after(key("2.2"), &key("2.3")), key("2.4"));
        assert_eq!(ensure_after(key("2.2.9"), &key("2.3")), key("2.3.1"));
        assert_eq!(ensure_after(key(""), &key("")), key("1"));
    }

    #[test]
    fn removed_handles_are_not_reused() {
        let mut graph = ModelGraph::new();
        let first = graph.insert(DomainObject::new(ObjectKind::Trial, "a"));
        graph.remove(first);
        let second = graph.insert(DomainObject::new(ObjectKind::Trial, "b"));
        assert_ne!(first, second);
        assert!(graph.get(first).is_none());
        assert_eq!(graph.len(), 1);
    }
}
