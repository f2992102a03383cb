//! Model use-case service.
//!
//! # Responsibility
//! - Orchestrate whole-tree load/save/delete over a `ModelStore`.
//! - Run the validation pass, including script syntax checks.
//! - Expose store-backed copy operators, revision trees and the
//!   list-or-tree view selected by the policy.
//!
//! # Invariants
//! - `save_tree` runs the field checks of `validate` before touching the
//!   store.
//! - A record is written only after every link it holds has a stored id.
//! - Saves are sequential and non-atomic; a failure leaves earlier nodes
//!   persisted, and a retry is safe because saving is keyed by id.
//! - The service never holds the arena; callers pass it per call.

use crate::config::ModelPolicy;
use crate::messages::MessageLog;
use crate::model::error::{ModelError, ModelResult};
use crate::model::graph::{Handle, ModelGraph};
use crate::model::object::{test_valid_name, DomainObject, ObjectBody, ObjectKind};
use crate::model::tree::{RevisionTree, RevisionTreeBuilder};
use crate::repo::graph_io::{record_from_object, GraphLoader};
use crate::repo::model_store::{ModelStore, StoreResult, StoredSummary};
use crate::script::ScriptEngine;
use crate::template::pool::{KindSelector, TemplatePool};
use log::{error, info, warn};
use std::time::Instant;

/// Error text queued when a script needs checking and no engine exists.
pub const ENGINE_NOT_FOUND: &str = "scripting engine not found";

struct FieldProblem {
    field: &'static str,
    value: String,
    reason: FieldReason,
}

enum FieldReason {
    ShortName,
    DescriptionLength { chars: usize, limit: usize },
    Date,
    Overlap,
}

impl FieldProblem {
    fn message(&self, kind: &str, label: &str) -> String {
        match self.reason {
            FieldReason::ShortName => format!("{kind} `{}`: invalid short name", self.value),
            FieldReason::DescriptionLength { chars, limit } => {
                format!("{label}: description has {chars} characters, limit is {limit}")
            }
            FieldReason::Date => format!("{label}: invalid {} date", self.field),
            FieldReason::Overlap => {
                format!("{label}: overlap matrix must be square and symmetric")
            }
        }
    }
}

/// Use-case service wrapper for model persistence and validation.
pub struct ModelService<S: ModelStore> {
    store: S,
    policy: ModelPolicy,
}

impl<S: ModelStore> ModelService<S> {
    /// Creates a service with the default policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, ModelPolicy::default())
    }

    pub fn with_policy(store: S, policy: ModelPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ModelPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Checks every owned node under `handle`, queuing problems into `log`.
    ///
    /// Returns `true` when nothing was reported.
    pub fn validate(
        &self,
        graph: &ModelGraph,
        handle: Handle,
        engine: &mut dyn ScriptEngine,
        log: &mut MessageLog,
    ) -> ModelResult<bool> {
        let errors_before = log.error_count();
        engine.clear();
        let mut engine_missing_reported = false;

        for node in graph.owned_subtree(handle) {
            let object = graph.object(node)?;
            let label = object.display_name();
            for problem in self.field_problems(object) {
                log.push_error(problem.message(object.kind().as_str(), &label));
            }

            let script = match &object.body {
                ObjectBody::Attribute(body) => Some(body.expression.as_str()),
                ObjectBody::Action(body) => Some(body.script.as_str()),
                _ => None,
            };

            if let Some(source) = script.filter(|source| !source.trim().is_empty()) {
                if !engine.has_engine() {
                    if !engine_missing_reported {
                        log.push_error(ENGINE_NOT_FOUND);
                        engine_missing_reported = true;
                    }
                } else {
                    let before_check = log.error_count();
                    if !engine.parse_check(source, log) && log.error_count() == before_check {
                        log.push_error(format!("{label}: script failed to parse"));
                    }
                }
            }
        }

        let failed = log.error_count() - errors_before;
        if failed > 0 {
            warn!(
                "event=model_validate module=service status=error handle={} errors={}",
                handle, failed
            );
        }
        Ok(failed == 0)
    }

    /// Field checks shared by `validate` and `save_tree`.
    fn field_problems(&self, object: &DomainObject) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        let header = &object.header;
        if !test_valid_name(&header.short_name) {
            problems.push(FieldProblem {
                field: "short_name",
                value: header.short_name.clone(),
                reason: FieldReason::ShortName,
            });
        }
        let description_chars = header.description.chars().count();
        if description_chars > self.policy.max_description_chars {
            problems.push(FieldProblem {
                field: "description",
                value: format!("{description_chars} characters"),
                reason: FieldReason::DescriptionLength {
                    chars: description_chars,
                    limit: self.policy.max_description_chars,
                },
            });
        }
        match &object.body {
            ObjectBody::Timestep(body) => {
                for (field, date) in [("start", body.start), ("end", body.end)] {
                    if !date.is_valid() {
                        problems.push(FieldProblem {
                            field,
                            value: format!("{}/{}", date.day, date.month),
                            reason: FieldReason::Date,
                        });
                    }
                }
            }
            ObjectBody::Spatial(body) if !body.overlap_is_consistent() => {
                problems.push(FieldProblem {
                    field: "overlap",
                    value: format!("{} polygons", body.polygons.len()),
                    reason: FieldReason::Overlap,
                });
            }
            _ => {}
        }
        problems
    }

    /// Loads `(kind, id)` with its owned subtree into `graph`.
    ///
    /// Template children already held by `pool` are shared by handle.
    pub fn load_tree(
        &self,
        graph: &mut ModelGraph,
        pool: &TemplatePool,
        kind: ObjectKind,
        id: i64,
    ) -> ModelResult<Handle> {
        let started_at = Instant::now();
        let handle = GraphLoader::new(graph, &self.store)
            .with_templates(pool)
            .load(kind, id)
            .map_err(|err| {
                error!(
                    "event=tree_load module=service status=error kind={} id={} error={}",
                    kind.as_str(),
                    id,
                    err
                );
                err
            })?;
        info!(
            "event=tree_load module=service status=ok kind={} id={} duration_ms={}",
            kind.as_str(),
            id,
            started_at.elapsed().as_millis()
        );
        Ok(handle)
    }

    /// Loads every stored template into `pool`.
    pub fn load_templates(
        &self,
        graph: &mut ModelGraph,
        pool: &mut TemplatePool,
    ) -> ModelResult<usize> {
        pool.load_from_store(graph, &self.store)
    }

    /// Persists `handle` and its owned subtree; returns the stored id.
    ///
    /// # Errors
    /// - `ModelError::InvalidField` naming the first field that fails the
    ///   checks `validate` runs outside the script engine; nothing is saved
    ///   in that case.
    /// - `ModelError::BrokenObject` when asked to save a placeholder.
    /// - Store failures stop the walk; earlier nodes stay saved.
    pub fn save_tree(&mut self, graph: &mut ModelGraph, handle: Handle) -> ModelResult<i64> {
        for node in graph.owned_subtree(handle) {
            let object = graph.object(node)?;
            if let Some(problem) = self.field_problems(object).into_iter().next() {
                warn!(
                    "event=tree_save module=service status=rejected handle={} field={}",
                    node, problem.field
                );
                return Err(ModelError::InvalidField {
                    handle: node,
                    field: problem.field,
                    value: problem.value,
                });
            }
        }

        let parent_id = graph.object(handle)?.header.parent_id;
        let id = self.save_node(graph, handle, parent_id).map_err(|err| {
            error!(
                "event=tree_save module=service status=error handle={} error={}",
                handle, err
            );
            err
        })?;
        info!(
            "event=tree_save module=service status=ok handle={} id={}",
            handle, id
        );
        Ok(id)
    }

    fn save_node(
        &mut self,
        graph: &mut ModelGraph,
        handle: Handle,
        parent_id: Option<i64>,
    ) -> ModelResult<i64> {
        let object = graph.object_mut(handle)?;
        if object.is_broken() {
            return Err(ModelError::BrokenObject(handle));
        }
        if !object.is_template() {
            object.header.parent_id = parent_id;
        }
        let children = object.owned_children();
        let links = object.links();

        for target in links {
            let linked = graph.object(target)?;
            if linked.is_new() {
                let link_parent = if linked.is_template() { None } else { parent_id };
                self.save_node(graph, target, link_parent)?;
            }
        }

        if graph.object(handle)?.is_new() {
            let id = self.store.save(&record_from_object(graph, handle)?)?;
            graph.object_mut(handle)?.header.id = id;
        }
        let id = graph.object(handle)?.id();

        for child in children {
            let child_object = graph.object(child)?;
            if child_object.is_template() {
                if child_object.is_new() {
                    self.save_node(graph, child, None)?;
                }
            } else {
                self.save_node(graph, child, Some(id))?;
            }
        }
        self.store.save(&record_from_object(graph, handle)?)?;
        Ok(id)
    }

    /// Deletes `handle`'s owned non-template subtree from the store and the
    /// arena, children first.
    pub fn delete_tree(&mut self, graph: &mut ModelGraph, handle: Handle) -> ModelResult<usize> {
        let object = graph.object(handle)?;
        if object.is_broken() {
            return Err(ModelError::BrokenObject(handle));
        }
        let children = object.owned_children();

        let mut deleted = 0;
        for child in children {
            if !graph.object(child)?.is_template() {
                deleted += self.delete_tree(graph, child)?;
            }
        }

        let object = graph.object(handle)?;
        if !object.is_new() {
            self.store.delete(object.kind(), object.id())?;
        }
        graph.remove(handle);
        info!(
            "event=tree_delete module=service status=ok handle={} deleted={}",
            handle,
            deleted + 1
        );
        Ok(deleted + 1)
    }

    /// Revises `handle` using store-allocated revisions.
    pub fn revise(
        &self,
        graph: &mut ModelGraph,
        pool: &mut TemplatePool,
        handle: Handle,
        new_parent_id: Option<i64>,
    ) -> ModelResult<Handle> {
        graph.copy_revise(handle, pool, &self.store, new_parent_id)
    }

    /// Deletes queued template removals through the store.
    pub fn flush_template_deletions(
        &mut self,
        graph: &mut ModelGraph,
        pool: &mut TemplatePool,
    ) -> StoreResult<usize> {
        pool.flush_deletions(graph, &mut self.store)
    }

    /// True when `pool` differs from the stored templates.
    pub fn templates_modified(
        &self,
        graph: &ModelGraph,
        pool: &TemplatePool,
    ) -> ModelResult<bool> {
        pool.is_modified(graph, &self.store)
    }

    /// Labels of other stored objects of `kind`, for pick lists.
    pub fn other_labels(
        &self,
        kind: ObjectKind,
        exclude_id: i64,
    ) -> StoreResult<Vec<StoredSummary>> {
        self.store.list_other(kind, exclude_id)
    }

    /// Stored non-template objects of `kind` without a parent.
    pub fn orphans(&self, kind: ObjectKind) -> StoreResult<Vec<StoredSummary>> {
        self.store.list_orphans(kind)
    }

    /// Builds `list` in the policy's presentation: flat and sorted for
    /// `Presentation::List`, nested by revision for `Presentation::Tree`.
    pub fn present(&self, graph: &ModelGraph, list: &[Handle]) -> RevisionTree {
        RevisionTreeBuilder::new(graph, self.policy.ordering).present(list)
    }

    /// Builds the revision tree of `list` under the active sort key,
    /// regardless of presentation.
    pub fn revision_tree(&self, graph: &ModelGraph, list: &[Handle]) -> RevisionTree {
        RevisionTreeBuilder::new(graph, self.policy.ordering).build(list)
    }

    /// Builds the revision tree of the pool's `kind` templates.
    pub fn template_tree(
        &self,
        graph: &ModelGraph,
        pool: &TemplatePool,
        kind: ObjectKind,
    ) -> RevisionTree {
        let list = pool.list_by_kind(graph, KindSelector::One(kind));
        self.revision_tree(graph, &list)
    }
}
