//! Conversion between arena objects and flat store records.
//!
//! # Responsibility
//! - Flatten one arena object into an `ObjectRecord` (children by id).
//! - Rebuild arena objects from records, loading children through a store.
//!
//! # Invariants
//! - Within one loader, each stored `(kind, id)` maps to exactly one handle,
//!   so links that alias a sibling child resolve to that same handle.
//! - Stored templates already present in an attached pool are reused
//!   instead of loaded twice.

use crate::model::error::{ModelError, ModelResult};
use crate::model::graph::{Handle, ModelGraph};
use crate::model::object::{
    ClassDefBody, DomainObject, ElementBody, ObjectBody, ObjectHeader, ObjectKind, TimestepBody,
    BROKEN_ID,
};
use crate::repo::model_store::{LinkRecord, ModelStore, ObjectRecord, RecordBody, StoreError};
use crate::template::pool::TemplatePool;
use std::collections::HashMap;

/// Flattens `handle` into a record; links must already carry their stored
/// ids.
///
/// # Errors
/// - `ModelError::UnsavedLink` when a timestep links to an unsaved object.
pub fn record_from_object(graph: &ModelGraph, handle: Handle) -> ModelResult<ObjectRecord> {
    let object = graph.object(handle)?;
    let id_of = |child: Handle| graph.object(child).map(DomainObject::id);
    let ids_of = |children: &[Handle]| -> ModelResult<Vec<i64>> {
        children.iter().map(|child| id_of(*child)).collect()
    };

    let body = match &object.body {
        ObjectBody::ClassDef(body) => RecordBody::ClassDef {
            elements: ids_of(&body.elements)?,
            spatial: body.spatial.map(id_of).transpose()?,
        },
        ObjectBody::Element(body) => RecordBody::Element {
            attributes: ids_of(&body.attributes)?,
            actions: ids_of(&body.actions)?,
            timesteps: ids_of(&body.timesteps)?,
        },
        ObjectBody::Attribute(body) => RecordBody::Attribute(body.clone()),
        ObjectBody::Action(body) => RecordBody::Action(body.clone()),
        ObjectBody::Spatial(body) => RecordBody::Spatial(body.clone()),
        ObjectBody::Trial(body) => RecordBody::Trial(body.clone()),
        ObjectBody::Report(body) => RecordBody::Report(body.clone()),
        ObjectBody::Timestep(body) => RecordBody::Timestep {
            start: body.start,
            end: body.end,
            action: body
                .action
                .map(|target| link_record(graph, target))
                .transpose()?,
            attribute: body
                .attribute
                .map(|target| link_record(graph, target))
                .transpose()?,
        },
    };

    let header = &object.header;
    Ok(ObjectRecord {
        id: header.id,
        parent_id: header.parent_id,
        is_template: header.is_template,
        revision: header.revision.clone(),
        short_name: header.short_name.clone(),
        description: header.description.clone(),
        author: header.author.clone(),
        created_at: header.created_at,
        modified_at: header.modified_at,
        locked: header.locked,
        display_position: header.display_position,
        body,
    })
}

fn link_record(graph: &ModelGraph, target: Handle) -> ModelResult<LinkRecord> {
    let linked = graph.object(target)?;
    if linked.is_broken() {
        return Ok(LinkRecord::Broken(Box::new(record_from_object(
            graph, target,
        )?)));
    }
    if linked.is_new() {
        return Err(ModelError::UnsavedLink(target));
    }
    Ok(LinkRecord::Id(linked.id()))
}

/// Rebuilds object trees from a store into one arena.
pub struct GraphLoader<'a> {
    graph: &'a mut ModelGraph,
    store: &'a dyn ModelStore,
    templates: Option<&'a TemplatePool>,
    loaded: HashMap<(ObjectKind, i64), Handle>,
}

impl<'a> GraphLoader<'a> {
    pub fn new(graph: &'a mut ModelGraph, store: &'a dyn ModelStore) -> Self {
        Self {
            graph,
            store,
            templates: None,
            loaded: HashMap::new(),
        }
    }

    /// Reuses templates already held by `pool` instead of reloading them.
    pub fn with_templates(mut self, pool: &'a TemplatePool) -> Self {
        self.templates = Some(pool);
        self
    }

    /// Loads `(kind, id)` and its owned subtree.
    ///
    /// # Errors
    /// - `StoreError::NotFound` when the store has no such row.
    pub fn load(&mut self, kind: ObjectKind, id: i64) -> ModelResult<Handle> {
        if let Some(handle) = self.known(kind, id) {
            return Ok(handle);
        }
        let record = self
            .store
            .load(kind, id)?
            .ok_or(StoreError::NotFound { kind, id })?;
        if record.kind() != kind {
            return Err(ModelError::KindMismatch {
                expected: kind,
                actual: record.kind(),
            });
        }
        self.insert_record(record)
    }

    /// Inserts an already fetched record, loading its children.
    pub fn insert_record(&mut self, record: ObjectRecord) -> ModelResult<Handle> {
        let kind = record.kind();
        if record.id > 0 {
            if let Some(handle) = self.known(kind, record.id) {
                return Ok(handle);
            }
        }

        let ObjectRecord {
            id,
            parent_id,
            is_template,
            revision,
            short_name,
            description,
            author,
            created_at,
            modified_at,
            locked,
            display_position,
            body,
        } = record;

        let body = match body {
            RecordBody::ClassDef { elements, spatial } => ObjectBody::ClassDef(ClassDefBody {
                elements: self.load_all(ObjectKind::Element, &elements)?,
                spatial: spatial
                    .map(|child| self.load(ObjectKind::Spatial, child))
                    .transpose()?,
            }),
            RecordBody::Element {
                attributes,
                actions,
                timesteps,
            } => ObjectBody::Element(ElementBody {
                attributes: self.load_all(ObjectKind::Attribute, &attributes)?,
                actions: self.load_all(ObjectKind::Action, &actions)?,
                timesteps: self.load_all(ObjectKind::Timestep, &timesteps)?,
            }),
            RecordBody::Attribute(body) => ObjectBody::Attribute(body),
            RecordBody::Action(body) => ObjectBody::Action(body),
            RecordBody::Spatial(body) => ObjectBody::Spatial(body),
            RecordBody::Trial(body) => ObjectBody::Trial(body),
            RecordBody::Report(body) => ObjectBody::Report(body),
            RecordBody::Timestep {
                start,
                end,
                action,
                attribute,
            } => ObjectBody::Timestep(TimestepBody {
                start,
                end,
                action: action
                    .map(|link| self.load_link(ObjectKind::Action, link))
                    .transpose()?,
                attribute: attribute
                    .map(|link| self.load_link(ObjectKind::Attribute, link))
                    .transpose()?,
            }),
        };

        let object = DomainObject {
            header: ObjectHeader {
                id,
                parent_id,
                is_template,
                revision,
                short_name,
                description,
                author,
                created_at,
                modified_at,
                locked,
                display_position,
            },
            body,
        };
        let handle = self.graph.insert(object);
        if id > 0 {
            self.loaded.insert((kind, id), handle);
        }
        Ok(handle)
    }

    fn load_all(&mut self, kind: ObjectKind, ids: &[i64]) -> ModelResult<Vec<Handle>> {
        ids.iter().map(|id| self.load(kind, *id)).collect()
    }

    fn load_link(&mut self, kind: ObjectKind, link: LinkRecord) -> ModelResult<Handle> {
        match link {
            LinkRecord::Id(id) => self.load(kind, id),
            LinkRecord::Broken(record) => {
                let mut record = *record;
                record.id = BROKEN_ID;
                self.insert_record(record)
            }
        }
    }

    fn known(&self, kind: ObjectKind, id: i64) -> Option<Handle> {
        if let Some(handle) = self.loaded.get(&(kind, id)) {
            return Some(*handle);
        }
        self.templates
            .and_then(|pool| pool.lookup(&*self.graph, kind, id))
    }
}
