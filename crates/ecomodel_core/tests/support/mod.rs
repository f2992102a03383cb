#![allow(dead_code)]

use ecomodel_core::repo::model_store::allocate_child_revision;
use ecomodel_core::{
    ActionBody, ActionType, AttributeBody, DayMonth, DomainObject, ElementBody, Handle,
    ModelGraph, ModelStore, ObjectBody, ObjectKind, ObjectRecord, RevisionKey, StoreError,
    StoreResult, StoredSummary, TimestepBody,
};
use std::collections::{BTreeMap, HashSet};

/// Handles of one element with an attribute, an action and a timestep that
/// links both.
pub struct ElementFixture {
    pub element: Handle,
    pub attribute: Handle,
    pub action: Handle,
    pub timestep: Handle,
}

pub fn attribute(name: &str, expression: &str) -> DomainObject {
    DomainObject::with_body(
        name,
        ObjectBody::Attribute(AttributeBody {
            expression: expression.to_string(),
            units: "kg".to_string(),
        }),
    )
}

pub fn action(name: &str, script: &str) -> DomainObject {
    DomainObject::with_body(
        name,
        ObjectBody::Action(ActionBody {
            action_type: ActionType::Iterative,
            script: script.to_string(),
        }),
    )
}

pub fn timestep(name: &str, action: Option<Handle>, attribute: Option<Handle>) -> DomainObject {
    DomainObject::with_body(
        name,
        ObjectBody::Timestep(TimestepBody {
            start: DayMonth::new(1, 3),
            end: DayMonth::new(31, 5),
            action,
            attribute,
        }),
    )
}

pub fn revisioned(mut object: DomainObject, revision: &str) -> DomainObject {
    object.header.revision = RevisionKey::parse(revision).unwrap();
    object
}

pub fn element_fixture(graph: &mut ModelGraph, name: &str) -> ElementFixture {
    let attribute = graph.insert(attribute("biomass", "leaf + stem"));
    let action = graph.insert(action("grow", "biomass = biomass * 1.1"));
    let timestep = graph.insert(timestep("spring", Some(action), Some(attribute)));
    let element = graph.insert(DomainObject::with_body(
        name,
        ObjectBody::Element(ElementBody {
            attributes: vec![attribute],
            actions: vec![action],
            timesteps: vec![timestep],
        }),
    ));
    ElementFixture {
        element,
        attribute,
        action,
        timestep,
    }
}

pub fn timestep_links(graph: &ModelGraph, handle: Handle) -> (Option<Handle>, Option<Handle>) {
    match &graph.get(handle).unwrap().body {
        ObjectBody::Timestep(body) => (body.action, body.attribute),
        other => panic!("not a timestep: {other:?}"),
    }
}

pub fn element_children(graph: &ModelGraph, handle: Handle) -> ElementBody {
    match &graph.get(handle).unwrap().body {
        ObjectBody::Element(body) => body.clone(),
        other => panic!("not an element: {other:?}"),
    }
}

/// In-memory store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    pub records: BTreeMap<i64, ObjectRecord>,
    next_id: i64,
    pub fail_delete: HashSet<i64>,
    pub fail_save_after: Option<usize>,
    pub saves: usize,
    pub deleted: Vec<i64>,
    /// Returned verbatim by `next_revision` when set.
    pub forced_revision: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryStore {
    fn load(&self, kind: ObjectKind, id: i64) -> StoreResult<Option<ObjectRecord>> {
        Ok(self
            .records
            .get(&id)
            .filter(|record| record.kind() == kind)
            .cloned())
    }

    fn save(&mut self, record: &ObjectRecord) -> StoreResult<i64> {
        if let Some(limit) = self.fail_save_after {
            if self.saves >= limit {
                return Err(StoreError::Rejected("disk full".to_string()));
            }
        }
        self.saves += 1;
        let id = if record.id == 0 {
            self.next_id += 1;
            self.next_id
        } else {
            record.id
        };
        let mut stored = record.clone();
        stored.id = id;
        self.records.insert(id, stored);
        Ok(id)
    }

    fn delete(&mut self, kind: ObjectKind, id: i64) -> StoreResult<()> {
        if self.fail_delete.contains(&id) {
            return Err(StoreError::Rejected(format!("cannot delete {id}")));
        }
        match self.records.remove(&id) {
            Some(_) => {
                self.deleted.push(id);
                Ok(())
            }
            None => Err(StoreError::NotFound { kind, id }),
        }
    }

    fn next_revision(&self, kind: ObjectKind, current: &str) -> StoreResult<String> {
        if let Some(forced) = &self.forced_revision {
            return Ok(forced.clone());
        }
        let current = RevisionKey::parse(current)?;
        let used = self
            .records
            .values()
            .filter(|record| record.kind() == kind)
            .map(|record| &record.revision);
        Ok(allocate_child_revision(&current, used).to_string())
    }

    fn load_templates(
        &self,
        kind: ObjectKind,
        exclude_id: Option<i64>,
    ) -> StoreResult<Vec<ObjectRecord>> {
        Ok(self
            .records
            .values()
            .filter(|record| record.kind() == kind && record.is_template)
            .filter(|record| Some(record.id) != exclude_id)
            .cloned()
            .collect())
    }

    fn list_other(&self, kind: ObjectKind, exclude_id: i64) -> StoreResult<Vec<StoredSummary>> {
        Ok(self
            .records
            .values()
            .filter(|record| record.kind() == kind && record.id != exclude_id)
            .map(summary)
            .collect())
    }

    fn list_orphans(&self, kind: ObjectKind) -> StoreResult<Vec<StoredSummary>> {
        Ok(self
            .records
            .values()
            .filter(|record| {
                record.kind() == kind && !record.is_template && record.parent_id.is_none()
            })
            .map(summary)
            .collect())
    }
}

fn summary(record: &ObjectRecord) -> StoredSummary {
    StoredSummary {
        id: record.id,
        short_name: record.short_name.clone(),
        revision: record.revision.clone(),
    }
}
