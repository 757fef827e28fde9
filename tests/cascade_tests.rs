//! Cascade Deletion Tests
//!
//! Tests for:
//! - deleteElement cascade across relationships, visuals and connections
//! - cascade=false leaving references untouched
//! - deleteRelationship sweeping its connections from every view
//! - Undo restoring the full closure

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

/// Elements A and B, relationship R: A->B, view V showing both with a
/// connection for R. Returns (A, B, R, V, vA, vB, cR).
#[allow(clippy::type_complexity)]
fn linked_pair_with_view(
    engine: &mut Engine,
    model: &mut Model,
    stack: &mut InMemoryCommandStack,
) -> (String, String, String, String, String, String, String) {
    let results = run(
        engine,
        model,
        stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"A","tempId":"a"},
            {"op":"createElement","type":"business-actor","name":"B","tempId":"b"},
            {"op":"createRelationship","type":"flow-relationship","sourceId":"a","targetId":"b","tempId":"r"},
            {"op":"createView","name":"Main","tempId":"v"},
            {"op":"addToView","viewId":"v","elementId":"a","tempId":"va"},
            {"op":"addToView","viewId":"v","elementId":"b","tempId":"vb"},
            {"op":"addConnectionToView","viewId":"v","relationshipId":"r"}
        ]}"#,
    );
    (
        results[0].real_id.clone().unwrap(),
        results[1].real_id.clone().unwrap(),
        results[2].real_id.clone().unwrap(),
        results[3].view_id.clone().unwrap(),
        results[4].visual_id.clone().unwrap(),
        results[5].visual_id.clone().unwrap(),
        results[6].connection_id.clone().unwrap(),
    )
}

// ============================================================================
// Element Cascade
// ============================================================================

#[test]
fn test_cascade_delete_element() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let (a, b, r, v, va, vb, c_r) = linked_pair_with_view(&mut engine, &mut model, &mut stack);
    let before_delete = model.clone();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        &format!(r#"{{"changes":[{{"op":"deleteElement","id":"{a}","cascade":true}}]}}"#),
    );
    assert_eq!(results[0].cascade, Some(true));
    assert_eq!(results[0].name.as_deref(), Some("A"));

    // R, vA and cR are gone; B, V and vB remain.
    assert!(model.element(&a).is_none());
    assert!(model.relationship(&r).is_none());
    let view = model.view(&v).unwrap();
    assert!(view.node(&va).is_none());
    assert!(view.node(&vb).is_some());
    assert!(model.element(&b).is_some());
    assert!(view
        .node(&vb)
        .unwrap()
        .target_connections
        .iter()
        .all(|id| id != &c_r));
    assert!(archiplan::detect_orphans(&model).is_empty());

    // Undo restores everything.
    stack.undo(&mut model).unwrap();
    assert_eq!(model, before_delete);
}

#[test]
fn test_delete_element_without_cascade_only_removes_element() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let (a, _b, r, ..) = linked_pair_with_view(&mut engine, &mut model, &mut stack);

    run(
        &mut engine,
        &mut model,
        &mut stack,
        &format!(r#"{{"changes":[{{"op":"deleteElement","id":"{a}","cascade":false}}]}}"#),
    );
    assert!(model.element(&a).is_none());
    // The incident relationship is left behind, now dangling.
    assert!(model.relationship(&r).is_some());
}

#[test]
fn test_cascade_covers_multiple_views() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"A","tempId":"a"},
            {"op":"createElement","type":"business-actor","name":"B","tempId":"b"},
            {"op":"createRelationship","type":"triggering-relationship","sourceId":"a","targetId":"b","tempId":"r"},
            {"op":"createView","name":"V1","tempId":"v1"},
            {"op":"createView","name":"V2","tempId":"v2"},
            {"op":"addToView","viewId":"v1","elementId":"a"},
            {"op":"addToView","viewId":"v1","elementId":"b"},
            {"op":"addToView","viewId":"v2","elementId":"a"},
            {"op":"addToView","viewId":"v2","elementId":"b"},
            {"op":"addConnectionToView","viewId":"v1","relationshipId":"r"},
            {"op":"addConnectionToView","viewId":"v2","relationshipId":"r"}
        ]}"#,
    );
    let a = results[0].real_id.clone().unwrap();
    let v1 = results[3].view_id.clone().unwrap();
    let v2 = results[4].view_id.clone().unwrap();

    run(
        &mut engine,
        &mut model,
        &mut stack,
        &format!(r#"{{"changes":[{{"op":"deleteElement","id":"{a}"}}]}}"#),
    );

    // No visual for A and no connection survives in either view.
    for view_id in [&v1, &v2] {
        let view = model.view(view_id).unwrap();
        for node_id in view.node_ids() {
            let node = view.node(node_id).unwrap();
            assert!(node.source_connections.is_empty());
            assert!(node.concept() != Some(&a));
        }
    }
    assert_eq!(model.stats().relationships, 0);
}

// ============================================================================
// Relationship Deletion
// ============================================================================

#[test]
fn test_delete_relationship_sweeps_connections() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let (a, b, r, v, va, vb, _c_r) = linked_pair_with_view(&mut engine, &mut model, &mut stack);

    run(
        &mut engine,
        &mut model,
        &mut stack,
        &format!(r#"{{"changes":[{{"op":"deleteRelationship","id":"{r}"}}]}}"#),
    );

    assert!(model.relationship(&r).is_none());
    // Elements and visuals survive; only the connection went away.
    assert!(model.element(&a).is_some());
    assert!(model.element(&b).is_some());
    let view = model.view(&v).unwrap();
    assert!(view.node(&va).is_some());
    assert!(view.node(&vb).is_some());
    assert!(view.node(&va).unwrap().source_connections.is_empty());
    assert!(view.node(&vb).unwrap().target_connections.is_empty());
}

// ============================================================================
// View Deletion
// ============================================================================

#[test]
fn test_delete_view() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();

    let (_a, _b, r, v, ..) = linked_pair_with_view(&mut engine, &mut model, &mut stack);
    let before = model.clone();

    let results = run(
        &mut engine,
        &mut model,
        &mut stack,
        &format!(r#"{{"changes":[{{"op":"deleteView","viewId":"{v}"}}]}}"#),
    );
    assert_eq!(results[0].view_name.as_deref(), Some("Main"));
    assert!(model.view(&v).is_none());
    // The relationship itself is untouched by view deletion.
    assert!(model.relationship(&r).is_some());

    stack.undo(&mut model).unwrap();
    assert_eq!(model, before);
}
