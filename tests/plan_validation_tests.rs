//! Plan Validation Tests
//!
//! Tests for:
//! - Envelope boundaries (empty, oversized, bad keys, bad strategies)
//! - Unknown operation tags failing at decode
//! - Kind membership after normalisation
//! - Colour / numeric range validation
//! - Validation failing before any side effect

use std::time::{Duration, Instant};

use archiplan::{Clock, Engine, EngineConfig, IdSource, InMemoryCommandStack, Model, Plan};

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

fn run_err(json: &str) -> archiplan::EngineError {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let plan = Plan::from_json(json).unwrap();
    engine
        .execute_plan(&mut model, &mut stack, "test plan", plan)
        .unwrap_err()
}

// ============================================================================
// Envelope
// ============================================================================

#[test]
fn test_empty_changes_rejected() {
    let err = run_err(r#"{"changes":[]}"#);
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_oversized_plan_rejected() {
    let changes: Vec<String> = (0..5)
        .map(|i| format!(r#"{{"op":"createElement","type":"goal","name":"G{i}"}}"#))
        .collect();
    let json = format!(r#"{{"changes":[{}]}}"#, changes.join(","));

    let config = EngineConfig {
        max_changes_per_plan: 4,
        settle_delay_ms: 0,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config)
        .with_clock(Box::new(NoSleepClock))
        .with_id_source(Box::new(SeqIds(0)));
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let err = engine
        .execute_plan(&mut model, &mut stack, "too big", Plan::from_json(&json).unwrap())
        .unwrap_err();
    assert_eq!(err.code(), "ValidationError");
    assert!(err.to_string().contains("maximum is 4"));
}

#[test]
fn test_unknown_op_tag_fails_at_decode() {
    let err = Plan::from_json(r#"{"changes":[{"op":"teleportElement","id":"x"}]}"#).unwrap_err();
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_invalid_idempotency_key() {
    let err = run_err(
        r#"{"changes":[{"op":"deleteElement","id":"x"}],"idempotencyKey":"has spaces"}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_invalid_plan_strategy() {
    let err = run_err(
        r#"{"changes":[{"op":"createElement","type":"goal","name":"G"}],"duplicateStrategy":"merge"}"#,
    );
    assert_eq!(err.code(), "InvalidDuplicateStrategy");
}

// ============================================================================
// Kind Checks
// ============================================================================

#[test]
fn test_invalid_element_kind() {
    let err = run_err(r#"{"changes":[{"op":"createElement","type":"nonsense-kind","name":"X"}]}"#);
    assert_eq!(err.code(), "InvalidElementKind");
    assert_eq!(err.operation_index(), Some(0));
}

#[test]
fn test_invalid_relationship_kind() {
    let err = run_err(
        r#"{"changes":[{"op":"createRelationship","type":"friendship","sourceId":"a","targetId":"b"}]}"#,
    );
    assert_eq!(err.code(), "InvalidRelationshipKind");
}

#[test]
fn test_relationship_kind_not_accepted_as_element_kind() {
    let err = run_err(
        r#"{"changes":[{"op":"createElement","type":"flow-relationship","name":"X"}]}"#,
    );
    assert_eq!(err.code(), "InvalidElementKind");
}

// ============================================================================
// Field Checks
// ============================================================================

#[test]
fn test_bad_colour_rejected() {
    let err = run_err(
        r##"{"changes":[{"op":"styleViewObject","viewObjectId":"v","fillColor":"#ff00"}]}"##,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_opacity_out_of_range() {
    let err = run_err(
        r#"{"changes":[{"op":"styleViewObject","viewObjectId":"v","opacity":300}]}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_line_width_out_of_range() {
    let err = run_err(
        r#"{"changes":[{"op":"styleConnection","connectionId":"c","lineWidth":9}]}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_update_without_any_field_rejected() {
    let err = run_err(r#"{"changes":[{"op":"updateElement","id":"x"}]}"#);
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_move_view_object_without_geometry_rejected() {
    let err = run_err(r#"{"changes":[{"op":"moveViewObject","viewObjectId":"v"}]}"#);
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_invalid_access_type() {
    let err = run_err(
        r#"{"changes":[{"op":"createRelationship","type":"access-relationship",
            "sourceId":"a","targetId":"b","accessType":"peek"}]}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_invalid_router_type() {
    let err = run_err(
        r#"{"changes":[{"op":"setViewRouter","viewId":"v","routerType":"diagonal"}]}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

#[test]
fn test_invalid_layout_algorithm() {
    let err = run_err(
        r#"{"changes":[{"op":"layoutView","viewId":"v","algorithm":"force-directed"}]}"#,
    );
    assert_eq!(err.code(), "ValidationError");
}

// ============================================================================
// No Side Effects Before Failure
// ============================================================================

#[test]
fn test_validation_failure_leaves_model_untouched() {
    let mut engine = test_engine();
    let mut model = Model::new("m");
    let mut stack = InMemoryCommandStack::default();
    let pristine = model.clone();

    // Operation 0 is fine, operation 1 fails validation.
    let plan = Plan::from_json(
        r#"{"changes":[
            {"op":"createElement","type":"business-actor","name":"A"},
            {"op":"createElement","type":"not-a-kind","name":"B"}
        ]}"#,
    )
    .unwrap();
    let err = engine
        .execute_plan(&mut model, &mut stack, "half bad", plan)
        .unwrap_err();
    assert_eq!(err.code(), "InvalidElementKind");
    assert_eq!(err.operation_index(), Some(1));
    assert_eq!(model, pristine);
    assert!(!stack.can_undo());
}

#[test]
fn test_error_record_wire_shape() {
    let err = run_err(r#"{"changes":[{"op":"createElement","type":"bogus","name":"X"}]}"#);
    let record = err.to_record();
    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("\"code\":\"InvalidElementKind\""));
    assert!(json.contains("\"operationIndex\":0"));
}
