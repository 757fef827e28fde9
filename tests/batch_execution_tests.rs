//! Batch Execution Integration Tests
//!
//! Tests for:
//! - Create operations with temp-id resolution
//! - Mutations (updateElement, updateRelationship, setProperty)
//! - Folder routing and moveToFolder
//! - Undo round-trips through the command stack
//! - Batch vs per-operation granularity equivalence

use std::time::{Duration, Instant};

use archiplan::{
    Clock, Engine, EngineConfig, IdSource, InMemoryCommandStack, Model, OpResult, Plan,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct SeqIds(u32);

impl IdSource for SeqIds {
    fn next_id(&mut self) -> String {
        self.0 += 1;
        format!("n{:04}", self.0)
    }
}

struct NoSleepClock;

impl Clock for NoSleepClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) {}
}

fn test_engine() -> Engine {
    // Surface the engine's tracing events in test output.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = EngineConfig {
        settle_delay_ms: 0,
        ..EngineConfig::default()
    };
    Engine::new(config)
        .with_clock(Box::new(NoSleepClock))
        .with_id_source(Box::new(SeqIds(0)))
}

fn run(
    engine: &mut Engine,
    model: &mut Model,
    stack: &mut InMemoryCommandStack,
    json: &str,
) -> Vec<OpResult> {
    let plan = Plan::from_json(json).unwrap();
    engine.execute_plan(model, stack, "test plan", plan).unwrap()
}

// ============================================================================
// Create Operations
// ============================================================================

#[test]
fn test_create_linked_pair() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
            {"op":"createElement","type":"business-actor","name":"Bob","tempId":"b"},
            {"op":"createRelationship","type":"assignment-relationship",
             "sourceId":"a","targetId":"b","name":"assigned","tempId":"r"}
        ]}"#,
    );

    assert_eq!(results.len(), 3);
    let alice = results[0].real_id.clone().unwrap();
    let bob = results[1].real_id.clone().unwrap();
    let rel = results[2].real_id.clone().unwrap();
    assert_ne!(alice, bob);
    assert_ne!(alice, rel);
    assert_ne!(bob, rel);

    // The relationship's endpoints equal the realIds of Alice and Bob.
    assert_eq!(results[2].source.as_ref(), Some(&alice));
    assert_eq!(results[2].target.as_ref(), Some(&bob));
    assert_eq!(results[2].source_name.as_deref(), Some("Alice"));
    assert_eq!(results[2].target_name.as_deref(), Some("Bob"));

    let committed = model.relationship(&rel).unwrap();
    assert_eq!(committed.source, alice);
    assert_eq!(committed.target, bob);
    assert_eq!(committed.name, "assigned");
    assert_eq!(model.stats().elements, 2);
    assert_eq!(model.stats().relationships, 1);
}

#[test]
fn test_kinds_are_normalized_on_the_way_in() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[{"op":"createElement","type":"ApplicationComponent","name":"Portal"}]}"#,
    );
    assert_eq!(results[0].kind.as_deref(), Some("application-component"));

    let id = results[0].real_id.clone().unwrap();
    assert_eq!(model.element(&id).unwrap().kind, "application-component");
}

#[test]
fn test_elements_route_to_canonical_folders() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"goal","name":"Be solvent"},
            {"op":"createElement","type":"node","name":"Host-1"},
            {"op":"createElement","type":"business-actor","name":"Clerk","tempId":"c"},
            {"op":"createRelationship","type":"association-relationship","sourceId":"c","targetId":"c"}
        ]}"#,
    );

    for (result, kind) in results.iter().take(3).zip([
        archiplan::FolderKind::Motivation,
        archiplan::FolderKind::Technology,
        archiplan::FolderKind::Business,
    ]) {
        let id = result.real_id.clone().unwrap();
        let folder = model.parent_folder_of(&id).unwrap();
        assert_eq!(folder.kind, kind, "element {id} in wrong folder");
    }
    let rel_id = results[3].real_id.clone().unwrap();
    assert_eq!(
        model.parent_folder_of(&rel_id).unwrap().kind,
        archiplan::FolderKind::Relations
    );
}

#[test]
fn test_create_with_properties_and_documentation() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[{"op":"createElement","type":"application-component","name":"Portal",
            "documentation":"Customer portal",
            "properties":{"owner":"team-a","tier":"gold"}}]}"#,
    );

    let element = model.element(results[0].real_id.as_ref().unwrap()).unwrap();
    assert_eq!(element.documentation, "Customer portal");
    assert_eq!(element.properties.len(), 2);
    assert!(element
        .properties
        .iter()
        .any(|p| p.key == "owner" && p.value == "team-a"));
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_update_element_and_set_property() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
            {"op":"updateElement","id":"a","name":"Alice B.","documentation":"renamed"},
            {"op":"setProperty","id":"a","key":"env","value":"prod"},
            {"op":"setProperty","id":"a","key":"env","value":"staging"}
        ]}"#,
    );

    assert_eq!(
        results[1].updated.as_ref().unwrap(),
        &vec!["name".to_string(), "documentation".to_string()]
    );
    let element = model.element(results[0].real_id.as_ref().unwrap()).unwrap();
    assert_eq!(element.name, "Alice B.");
    assert_eq!(element.documentation, "renamed");
    // Same key updated in place, not appended twice.
    assert_eq!(element.properties.len(), 1);
    assert_eq!(element.properties[0].value, "staging");
}

#[test]
fn test_update_relationship_access_and_strength() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"application-component","name":"App","tempId":"x"},
            {"op":"createElement","type":"data-object","name":"Orders","tempId":"y"},
            {"op":"createRelationship","type":"access-relationship",
             "sourceId":"x","targetId":"y","accessType":"read","tempId":"r"},
            {"op":"updateRelationship","id":"r","accessType":"read-write","name":"reads orders"}
        ]}"#,
    );

    let rel = model.relationship(results[2].real_id.as_ref().unwrap()).unwrap();
    assert_eq!(rel.access_type, Some(archiplan::AccessType::ReadWrite));
    assert_eq!(rel.name, "reads orders");
}

#[test]
fn test_move_to_folder() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createFolder","name":"Actors","parentType":"business","tempId":"f"},
            {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
            {"op":"moveToFolder","id":"a","folderId":"f"}
        ]}"#,
    );

    let folder_id = results[0].folder_id.clone().unwrap();
    let element_id = results[1].real_id.clone().unwrap();
    assert_eq!(model.parent_folder_of(&element_id).unwrap().id, folder_id);
    assert_eq!(results[2].folder_id.as_ref(), Some(&folder_id));
}

#[test]
fn test_move_to_incompatible_folder_rejected() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[{"op":"createElement","type":"business-actor","name":"Alice"}]}"#,
    );
    let baseline = model.clone();

    let plan = Plan::from_json(
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"Bob","tempId":"b"},
            {"op":"moveToFolder","id":"b","parentType":"motivation"}
        ]}"#,
    )
    .unwrap();
    let err = engine
        .execute_plan(&mut model, &mut stack, "bad move", plan)
        .unwrap_err();
    assert_eq!(err.code(), "ValidationError");
    // Compile-time failure: nothing was executed.
    assert_eq!(model, baseline);
}

// ============================================================================
// Undo / Redo Round-Trips
// ============================================================================

#[test]
fn test_plan_is_one_undo_entry_and_restores_exactly() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let pristine = model.clone();

    run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
            {"op":"createElement","type":"business-actor","name":"Bob","tempId":"b"},
            {"op":"createRelationship","type":"serving-relationship","sourceId":"a","targetId":"b"},
            {"op":"createView","name":"Overview","tempId":"v"},
            {"op":"addToView","viewId":"v","elementId":"a","x":10,"y":20}
        ]}"#,
    );
    assert!(stack.can_undo());

    assert!(stack.undo(&mut model).unwrap());
    assert!(!stack.can_undo(), "whole plan was a single undo entry");
    assert_eq!(model, pristine, "undo must restore the pre-plan model");

    assert!(stack.redo(&mut model).unwrap());
    assert_eq!(model.stats().elements, 2);
    assert_eq!(model.stats().relationships, 1);
    assert_eq!(model.stats().views, 1);
}

#[test]
fn test_create_then_delete_in_one_plan_leaves_no_trace() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let pristine = model.clone();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"Ephemeral","tempId":"e"},
            {"op":"createElement","type":"business-actor","name":"Keeper","tempId":"k"},
            {"op":"createRelationship","type":"flow-relationship","sourceId":"e","targetId":"k","tempId":"r"},
            {"op":"deleteElement","id":"e","cascade":true}
        ]}"#,
    );

    // The ephemeral element and its relationship are gone; Keeper stays.
    assert_eq!(model.stats().elements, 1);
    assert_eq!(model.stats().relationships, 0);
    let keeper = results[1].real_id.clone().unwrap();
    assert!(model.element(&keeper).is_some());
    assert!(archiplan::detect_orphans(&model).is_empty());

    // And the single undo entry still restores the pristine model.
    stack.undo(&mut model).unwrap();
    assert_eq!(model, pristine);
}

#[test]
fn test_granularity_modes_produce_identical_post_state() {
    let plan_json = r#"{"changes":[
        {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
        {"op":"createElement","type":"business-role","name":"Clerk","tempId":"r"},
        {"op":"createRelationship","type":"assignment-relationship","sourceId":"a","targetId":"r"},
        {"op":"updateElement","id":"a","documentation":"doc"},
        {"op":"setProperty","id":"r","key":"grade","value":"7"}
    ]}"#;

    let mut batch_model = Model::new("m");
    let mut engine = test_engine();
    let mut stack = InMemoryCommandStack::default();
    run(&mut engine, &mut batch_model, &mut stack, plan_json);

    let mut per_op_model = Model::new("m");
    let mut engine2 = test_engine();
    let mut stack2 = InMemoryCommandStack::default();
    let mut plan = Plan::from_json(plan_json).unwrap();
    plan.granularity = archiplan::Granularity::PerOperation;
    engine2
        .execute_plan(&mut per_op_model, &mut stack2, "test plan", plan)
        .unwrap();

    // Same deterministic id source, same input: identical committed state
    // regardless of undo granularity. (Scaffolded folder ids differ per
    // model, so compare the entity stores.)
    assert_eq!(batch_model.stats().elements, per_op_model.stats().elements);
    for element in batch_model.store_elements() {
        assert_eq!(per_op_model.element(&element.id), Some(element));
    }
    for rel in batch_model.store_relationships() {
        assert_eq!(per_op_model.relationship(&rel.id), Some(rel));
    }

    // Per-operation mode pairs each operation with its own undo entry.
    assert!(stack2.undo_labels().len() > stack.undo_labels().len());
}

// ============================================================================
// Result Shape
// ============================================================================

#[test]
fn test_results_in_input_order_with_op_tags() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"A"},
            {"op":"createView","name":"V"},
            {"op":"createFolder","name":"F","parentType":"business"}
        ]}"#,
    );
    let tags: Vec<&str> = results.iter().map(|r| r.op.as_str()).collect();
    assert_eq!(tags, vec!["createElement", "createView", "createFolder"]);
}

#[test]
fn test_failed_plan_returns_error_and_no_side_effects() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let pristine = model.clone();

    let plan = Plan::from_json(
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"A"},
            {"op":"createRelationship","type":"flow-relationship","sourceId":"ghost","targetId":"ghost2"}
        ]}"#,
    )
    .unwrap();
    let err = engine
        .execute_plan(&mut model, &mut stack, "bad", plan)
        .unwrap_err();
    assert_eq!(err.code(), "MissingReference");
    assert_eq!(err.operation_index(), Some(1));
    assert_eq!(model, pristine, "compile errors abort before chunk #1");
    assert!(!stack.can_undo());
}
