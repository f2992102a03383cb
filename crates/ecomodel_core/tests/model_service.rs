mod support;

use ecomodel_core::{
    open_db_in_memory, record_from_object, DayMonth, DomainObject, Handle, ListOrdering,
    MessageLog, ModelError, ModelGraph, ModelPolicy, ModelService, ModelStore, NoScriptEngine,
    ObjectBody, ObjectKind, Polygon, Presentation, ScriptEngine, SortKey, SpatialBody,
    SqliteModelStore, StoreError, TemplatePool, ENGINE_NOT_FOUND,
};
use support::{element_children, element_fixture, revisioned, timestep_links, MemoryStore};

/// Engine that rejects any source containing `??`.
#[derive(Default)]
struct StrictEngine {
    clears: usize,
    checked: Vec<String>,
}

impl ScriptEngine for StrictEngine {
    fn has_engine(&self) -> bool {
        true
    }

    fn parse_check(&mut self, source: &str, _log: &mut MessageLog) -> bool {
        self.checked.push(source.to_string());
        !source.contains("??")
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[test]
fn saved_tree_loads_back_with_links_aliased() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteModelStore::try_new(&conn).unwrap());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");

    let id = service.save_tree(&mut graph, fixture.element).unwrap();
    assert!(id > 0);
    assert_eq!(graph.get(fixture.timestep).unwrap().header.parent_id, Some(id));

    let mut loaded_graph = ModelGraph::new();
    let pool = TemplatePool::new();
    let loaded = service
        .load_tree(&mut loaded_graph, &pool, ObjectKind::Element, id)
        .unwrap();

    assert!(graph.structural_eq(fixture.element, &loaded_graph, loaded, false));
    let children = element_children(&loaded_graph, loaded);
    assert_eq!(
        timestep_links(&loaded_graph, children.timesteps[0]),
        (Some(children.actions[0]), Some(children.attributes[0]))
    );
}

#[test]
fn template_children_are_shared_with_the_loaded_pool() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteModelStore::try_new(&conn).unwrap());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.attribute).unwrap().header.is_template = true;

    let id = service.save_tree(&mut graph, fixture.element).unwrap();
    let attribute = graph.get(fixture.attribute).unwrap();
    assert!(attribute.id() > 0);
    assert_eq!(attribute.header.parent_id, None);

    let mut fresh = ModelGraph::new();
    let mut pool = TemplatePool::new();
    assert_eq!(service.load_templates(&mut fresh, &mut pool).unwrap(), 1);
    let loaded = service
        .load_tree(&mut fresh, &pool, ObjectKind::Element, id)
        .unwrap();

    let shared = pool.handles(ObjectKind::Attribute)[0];
    assert_eq!(element_children(&fresh, loaded).attributes, vec![shared]);
    assert!(!service.templates_modified(&fresh, &pool).unwrap());
}

#[test]
fn invalid_short_name_blocks_every_write() {
    let mut service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.action).unwrap().header.short_name = "grow_".to_string();

    let err = service.save_tree(&mut graph, fixture.element).unwrap_err();

    match err {
        ModelError::InvalidField {
            handle,
            field,
            value,
        } => {
            assert_eq!(handle, fixture.action);
            assert_eq!(field, "short_name");
            assert_eq!(value, "grow_");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.store().saves, 0);
    assert!(graph.get(fixture.element).unwrap().is_new());
}

/// Saves `handle` expecting a field rejection; returns `(field, value)`.
fn rejected_field(graph: &mut ModelGraph, handle: Handle) -> (&'static str, String) {
    let mut service = ModelService::new(MemoryStore::new());
    let err = service.save_tree(graph, handle).unwrap_err();
    assert_eq!(service.store().saves, 0);
    assert!(graph.get(handle).unwrap().is_new());
    match err {
        ModelError::InvalidField { field, value, .. } => (field, value),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn overlong_description_blocks_every_write() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.attribute).unwrap().header.description = "a".repeat(300);

    let (field, value) = rejected_field(&mut graph, fixture.element);

    assert_eq!(field, "description");
    assert_eq!(value, "300 characters");
}

#[test]
fn impossible_timestep_date_blocks_every_write() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    if let ObjectBody::Timestep(body) = &mut graph.get_mut(fixture.timestep).unwrap().body {
        body.start = DayMonth::new(31, 4);
    }

    let (field, value) = rejected_field(&mut graph, fixture.element);

    assert_eq!(field, "start");
    assert_eq!(value, "31/4");
    assert!(graph.get(fixture.timestep).unwrap().is_new());
}

#[test]
fn asymmetric_overlap_matrix_blocks_every_write() {
    let mut graph = ModelGraph::new();
    let polygon = |name: &str| Polygon {
        name: name.to_string(),
        points: vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)],
    };
    let plots = graph.insert(DomainObject::with_body(
        "plots",
        ObjectBody::Spatial(SpatialBody {
            polygons: vec![polygon("north"), polygon("south")],
            overlap: vec![vec![1.0, 0.5], vec![0.2, 1.0]],
        }),
    ));

    let (field, value) = rejected_field(&mut graph, plots);

    assert_eq!(field, "overlap");
    assert_eq!(value, "2 polygons");
}

#[test]
fn replicated_timestep_saves_its_copied_links_first() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteModelStore::try_new(&conn).unwrap());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let mut pool = TemplatePool::new();
    let copy = graph.copy_replicate(fixture.timestep, &mut pool).unwrap();
    let (action, attribute) = timestep_links(&graph, copy);
    let (action, attribute) = (action.unwrap(), attribute.unwrap());
    assert!(graph.get(action).unwrap().is_new());

    let id = service.save_tree(&mut graph, copy).unwrap();

    assert!(!graph.get(action).unwrap().is_new());
    assert!(!graph.get(attribute).unwrap().is_new());
    let mut loaded_graph = ModelGraph::new();
    let loaded = service
        .load_tree(&mut loaded_graph, &TemplatePool::new(), ObjectKind::Timestep, id)
        .unwrap();
    let (loaded_action, loaded_attribute) = timestep_links(&loaded_graph, loaded);
    let loaded_action = loaded_graph.get(loaded_action.unwrap()).unwrap();
    assert_eq!(loaded_action.id(), graph.get(action).unwrap().id());
    assert_eq!(loaded_action.header.short_name, "grow");
    assert_eq!(
        loaded_graph.get(loaded_attribute.unwrap()).unwrap().id(),
        graph.get(attribute).unwrap().id()
    );
}

#[test]
fn flattening_a_link_to_an_unsaved_object_fails() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");

    assert!(matches!(
        record_from_object(&graph, fixture.timestep),
        Err(ModelError::UnsavedLink(handle)) if handle == fixture.action
    ));
}

#[test]
fn failed_save_keeps_earlier_nodes_and_retry_completes() {
    let mut service = ModelService::new(MemoryStore::new());
    service.store_mut().fail_save_after = Some(2);
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");

    let err = service.save_tree(&mut graph, fixture.element).unwrap_err();
    assert!(matches!(err, ModelError::Store(StoreError::Rejected(_))));
    assert!(!graph.get(fixture.element).unwrap().is_new());
    assert!(!graph.get(fixture.attribute).unwrap().is_new());
    assert!(graph.get(fixture.action).unwrap().is_new());

    service.store_mut().fail_save_after = None;
    service.save_tree(&mut graph, fixture.element).unwrap();
    assert_eq!(service.store().records.len(), 4);
}

#[test]
fn broken_placeholders_cannot_be_saved_directly() {
    let mut service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let hollow = graph.copy_hollow(fixture.action).unwrap();

    assert!(matches!(
        service.save_tree(&mut graph, hollow),
        Err(ModelError::BrokenObject(_))
    ));
}

#[test]
fn delete_tree_skips_template_children() {
    let mut service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.attribute).unwrap().header.is_template = true;
    service.save_tree(&mut graph, fixture.element).unwrap();
    let template_id = graph.get(fixture.attribute).unwrap().id();

    let deleted = service.delete_tree(&mut graph, fixture.element).unwrap();

    assert_eq!(deleted, 3);
    assert!(!graph.contains(fixture.element));
    assert!(!graph.contains(fixture.timestep));
    assert!(graph.contains(fixture.attribute));
    let remaining = service.store().records.keys().copied().collect::<Vec<_>>();
    assert_eq!(remaining, vec![template_id]);
}

#[test]
fn validation_reports_missing_engine_once() {
    let service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let mut log = MessageLog::new();

    let ok = service
        .validate(&graph, fixture.element, &mut NoScriptEngine, &mut log)
        .unwrap();

    assert!(!ok);
    assert_eq!(log.unread_errors(), vec![ENGINE_NOT_FOUND.to_string()]);
}

#[test]
fn validation_without_scripts_needs_no_engine() {
    let service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    for handle in [fixture.attribute, fixture.action] {
        match &mut graph.get_mut(handle).unwrap().body {
            ObjectBody::Attribute(body) => body.expression.clear(),
            ObjectBody::Action(body) => body.script = "   ".to_string(),
            _ => unreachable!(),
        }
    }
    let mut log = MessageLog::new();

    assert!(service
        .validate(&graph, fixture.element, &mut NoScriptEngine, &mut log)
        .unwrap());
    assert_eq!(log.error_count(), 0);
}

#[test]
fn validation_collects_field_and_script_problems() {
    let policy = ModelPolicy {
        max_description_chars: 10,
        ..ModelPolicy::default()
    };
    let service = ModelService::with_policy(MemoryStore::new(), policy);
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.element).unwrap().header.description = "é".repeat(11);
    graph.get_mut(fixture.attribute).unwrap().header.description = "ü".repeat(10);
    if let ObjectBody::Timestep(body) = &mut graph.get_mut(fixture.timestep).unwrap().body {
        body.end = DayMonth::new(29, 2);
    }
    if let ObjectBody::Action(body) = &mut graph.get_mut(fixture.action).unwrap().body {
        body.script = "biomass = ??".to_string();
    }
    let mut engine = StrictEngine::default();
    let mut log = MessageLog::new();

    let ok = service
        .validate(&graph, fixture.element, &mut engine, &mut log)
        .unwrap();

    assert!(!ok);
    assert_eq!(engine.clears, 1);
    assert_eq!(engine.checked.len(), 2);
    let errors = log.unread_errors();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("limit is 10"));
    assert!(errors.iter().any(|text| text.contains("script failed to parse")));
    assert!(errors.iter().any(|text| text.contains("invalid end date")));
    assert!(log.unread_errors().is_empty());
}

#[test]
fn revise_through_service_uses_stored_revisions() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteModelStore::try_new(&conn).unwrap());
    let mut graph = ModelGraph::new();
    let source = graph.insert(revisioned(support::attribute("biomass", "leaf"), "1"));
    service.save_tree(&mut graph, source).unwrap();
    let mut pool = TemplatePool::new();

    let first = service.revise(&mut graph, &mut pool, source, None).unwrap();
    service.save_tree(&mut graph, first).unwrap();
    let second = service.revise(&mut graph, &mut pool, source, None).unwrap();

    assert_eq!(graph.get(first).unwrap().header.revision.to_string(), "1.1");
    assert_eq!(graph.get(second).unwrap().header.revision.to_string(), "1.2");
    assert_eq!(pool.replicas(), &[second]);

    let others = service.other_labels(ObjectKind::Attribute, 0).unwrap();
    assert_eq!(others.len(), 2);
    let tree = service.revision_tree(&graph, &[second, source, first]);
    assert_eq!(tree.root.child_handles(), vec![source]);
    assert_eq!(tree.root.children[0].child_handles(), vec![first, second]);
    assert_eq!(service.orphans(ObjectKind::Attribute).unwrap().len(), 2);
    assert!(service.store().next_revision(ObjectKind::Attribute, "1").is_ok());
}

#[test]
fn presentation_policy_picks_list_or_tree() {
    let mut graph = ModelGraph::new();
    let root = graph.insert(revisioned(support::attribute("biomass", "leaf"), "1"));
    let child = graph.insert(revisioned(support::attribute("biomass", "stem"), "1.1"));
    let list_service = ModelService::new(MemoryStore::new());
    let tree_service = ModelService::with_policy(
        MemoryStore::new(),
        ModelPolicy {
            ordering: ListOrdering::new(SortKey::Name, Presentation::Tree),
            ..ModelPolicy::default()
        },
    );

    let flat = list_service.present(&graph, &[child, root]);
    let nested = tree_service.present(&graph, &[child, root]);

    assert_eq!(flat.root.child_handles(), vec![root, child]);
    assert_eq!(nested.root.child_handles(), vec![root]);
    assert_eq!(nested.root.children[0].child_handles(), vec![child]);
}

#[test]
fn template_tree_lists_pool_entries_by_revision_lineage() {
    let service = ModelService::new(MemoryStore::new());
    let mut graph = ModelGraph::new();
    let mut pool = TemplatePool::new();
    let root = graph.insert(revisioned(support::attribute("biomass", "leaf"), "1"));
    let child = graph.insert(revisioned(support::attribute("biomass", "stem"), "1.1"));
    pool.insert_bulk(&[child, root], ObjectKind::Attribute);

    let tree = service.template_tree(&graph, &pool, ObjectKind::Attribute);

    assert_eq!(tree.root.child_handles(), vec![root]);
    assert_eq!(tree.root.children[0].child_handles(), vec![child]);
    assert_eq!(
        service.present(&graph, &[child, root]).root.child_handles(),
        vec![root, child]
    );
    assert!(service
        .template_tree(&graph, &pool, ObjectKind::Trial)
        .root
        .children
        .is_empty());
}
