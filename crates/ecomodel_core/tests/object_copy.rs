mod support;

use ecomodel_core::{
    record_from_object, ClassDefBody, DomainObject, Handle, ModelError, ModelGraph, ModelStore,
    ObjectBody, RevisionKey, TemplatePool, BROKEN_ID,
};
use std::cmp::Ordering;
use support::{
    attribute, element_children, element_fixture, revisioned, timestep_links, ElementFixture,
    MemoryStore,
};

/// Class with id 42 holding one concrete element and one template element.
fn class_with_template_child(graph: &mut ModelGraph) -> (Handle, ElementFixture, ElementFixture) {
    let concrete = element_fixture(graph, "grass");
    let shared = element_fixture(graph, "shrub");
    graph.get_mut(shared.element).unwrap().header.is_template = true;
    graph.get_mut(shared.element).unwrap().header.id = 7;

    let class = graph.insert(DomainObject::with_body(
        "meadow",
        ObjectBody::ClassDef(ClassDefBody {
            elements: vec![concrete.element, shared.element],
            spatial: None,
        }),
    ));
    graph.get_mut(class).unwrap().header.id = 42;
    (class, concrete, shared)
}

fn class_elements(graph: &ModelGraph, handle: Handle) -> Vec<Handle> {
    match &graph.get(handle).unwrap().body {
        ObjectBody::ClassDef(body) => body.elements.clone(),
        other => panic!("not a class: {other:?}"),
    }
}

#[test]
fn replicate_resets_ids_and_shares_template_children() {
    let mut graph = ModelGraph::new();
    let (class, concrete, shared) = class_with_template_child(&mut graph);
    for handle in [concrete.attribute, concrete.action, concrete.timestep] {
        graph.get_mut(handle).unwrap().header.id = 100 + handle.index() as i64;
    }
    let mut pool = TemplatePool::new();

    let copy = graph.copy_replicate(class, &mut pool).unwrap();

    assert_ne!(copy, class);
    assert_eq!(graph.get(copy).unwrap().id(), 0);
    let elements = class_elements(&graph, copy);
    assert_ne!(elements[0], concrete.element);
    assert_eq!(elements[1], shared.element);
    assert_eq!(graph.get(elements[1]).unwrap().id(), 7);

    for handle in graph.owned_subtree(elements[0]) {
        assert_eq!(graph.get(handle).unwrap().id(), 0);
    }
    assert!(graph.structural_compare(copy, class, true));
    assert!(!graph.structural_compare(copy, class, false));
    // class, element, attribute, action, timestep
    assert_eq!(pool.replicas().len(), 5);
}

#[test]
fn replicate_keeps_timestep_links_aliased_to_copied_children() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let mut pool = TemplatePool::new();

    let copy = graph.copy_replicate(fixture.element, &mut pool).unwrap();
    let children = element_children(&graph, copy);
    let (action, attribute) = timestep_links(&graph, children.timesteps[0]);

    assert_eq!(action, Some(children.actions[0]));
    assert_eq!(attribute, Some(children.attributes[0]));
    assert_ne!(action, Some(fixture.action));
}

#[test]
fn replicate_clears_replicas_from_previous_copy() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let mut pool = TemplatePool::new();

    graph.copy_replicate(fixture.element, &mut pool).unwrap();
    graph.copy_replicate(fixture.attribute, &mut pool).unwrap();

    assert_eq!(pool.replicas().len(), 1);
}

#[test]
fn revise_orders_after_source_and_detaches_template() {
    let mut graph = ModelGraph::new();
    let source = graph.insert(revisioned(attribute("biomass", "leaf"), "2.3"));
    graph.get_mut(source).unwrap().header.is_template = true;
    let mut store = MemoryStore::new();
    for revision in ["2.3", "2.3.1", "2.3.6"] {
        let mut record = record_from_object(&graph, source).unwrap();
        record.id = 0;
        record.revision = RevisionKey::parse(revision).unwrap();
        store.save(&record).unwrap();
    }
    let mut pool = TemplatePool::new();

    let revised = graph
        .copy_revise(source, &mut pool, &store, Some(99))
        .unwrap();

    let object = graph.get(revised).unwrap();
    assert_eq!(object.header.revision.to_string(), "2.3.7");
    assert_eq!(
        object.header.revision.compare(&graph.get(source).unwrap().header.revision),
        Ordering::Greater
    );
    assert!(!object.is_template());
    assert_eq!(object.header.parent_id, Some(99));
    assert!(graph.get(source).unwrap().is_template());
}

#[test]
fn revise_bumps_in_flight_siblings_apart() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let second = graph.insert(revisioned(attribute("height", "1"), "1"));
    graph.get_mut(fixture.attribute).unwrap().header.revision = RevisionKey::parse("1").unwrap();
    if let ObjectBody::Element(body) = &mut graph.get_mut(fixture.element).unwrap().body {
        body.attributes.push(second);
    }
    let store = MemoryStore::new();
    let mut pool = TemplatePool::new();

    let revised = graph
        .copy_revise(fixture.element, &mut pool, &store, None)
        .unwrap();

    let attributes = element_children(&graph, revised).attributes;
    let first_key = graph.get(attributes[0]).unwrap().header.revision.to_string();
    let second_key = graph.get(attributes[1]).unwrap().header.revision.to_string();
    assert_eq!(first_key, "1.1");
    assert_eq!(second_key, "1.2");
}

#[test]
fn revise_never_returns_a_key_behind_the_source() {
    let mut graph = ModelGraph::new();
    let source = graph.insert(revisioned(attribute("biomass", "leaf"), "2"));
    let mut store = MemoryStore::new();
    store.forced_revision = Some("1".to_string());
    let mut pool = TemplatePool::new();

    let revised = graph.copy_revise(source, &mut pool, &store, None).unwrap();

    assert_eq!(graph.get(revised).unwrap().header.revision.to_string(), "3");
}

#[test]
fn malformed_allocated_revision_aborts_without_partial_copies() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let mut store = MemoryStore::new();
    store.forced_revision = Some("1.x".to_string());
    let mut pool = TemplatePool::new();
    let before = graph.len();

    let err = graph
        .copy_revise(fixture.element, &mut pool, &store, None)
        .unwrap_err();

    assert!(matches!(err, ModelError::Revision(_)));
    assert_eq!(graph.len(), before);
    assert!(pool.replicas().is_empty());
}

#[test]
fn hollow_copy_is_a_broken_placeholder() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");

    let hollow = graph.copy_hollow(fixture.element).unwrap();

    let object = graph.get(hollow).unwrap();
    assert!(object.is_broken());
    assert_eq!(object.id(), BROKEN_ID);
    assert!(object.owned_children().is_empty());
    assert_eq!(object.header.short_name, "grass");
}

#[test]
fn broken_placeholders_stay_broken_through_replicate() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    let hollow = graph.copy_hollow(fixture.action).unwrap();
    let mut pool = TemplatePool::new();

    let copy = graph.copy_replicate(hollow, &mut pool).unwrap();

    assert!(graph.get(copy).unwrap().is_broken());
}

#[test]
fn shallow_clone_shares_children_and_deep_clone_copies_templates() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.attribute).unwrap().header.is_template = true;

    let shallow = graph.clone_object(fixture.element, false).unwrap();
    assert_eq!(
        element_children(&graph, shallow).attributes,
        vec![fixture.attribute]
    );

    let deep = graph.clone_object(fixture.element, true).unwrap();
    let deep_attribute = element_children(&graph, deep).attributes[0];
    assert_ne!(deep_attribute, fixture.attribute);
    assert!(graph.structural_compare(deep, fixture.element, false));
}

#[test]
fn un_template_with_deep_copy_leaves_original_untouched() {
    let mut graph = ModelGraph::new();
    let fixture = element_fixture(&mut graph, "grass");
    graph.get_mut(fixture.element).unwrap().header.is_template = true;

    let detached = graph.un_template(fixture.element, Some(5), true).unwrap();

    assert_ne!(detached, fixture.element);
    assert!(graph.get(fixture.element).unwrap().is_template());
    let object = graph.get(detached).unwrap();
    assert!(!object.is_template());
    assert_eq!(object.header.parent_id, Some(5));
}
