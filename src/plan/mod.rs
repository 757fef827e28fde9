//! Change plans: the wire-facing envelope, the closed operation set, and
//! per-operation results.
//!
//! A plan is an ordered list of heterogeneous operations applied as a single
//! undoable transaction (or one transaction per operation, see
//! [`Granularity`]). The operation set is a tagged sum type; unknown tags
//! fail at decode. Successful plans return one [`OpResult`] per input
//! operation, in input order.

pub mod duplicates;
pub mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

/// Distinguishes an absent field from an explicit `null` (which clears a
/// style attribute back to its default).
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Undo granularity of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Granularity {
    /// One undoable transaction per chunk (default).
    #[default]
    Batch,
    /// Every operation forms its own chunk and undo entry.
    PerOperation,
}

/// How duplicate creations are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateStrategy {
    /// Reject the plan with `DuplicateElement`/`DuplicateRelationship`.
    #[default]
    Error,
    /// Return the existing match's id; error on more than one match.
    Reuse,
    /// Append `" (n)"` until unique. Elements only.
    Rename,
}

impl DuplicateStrategy {
    /// Parse a wire token. Rejecting unknown tokens is the validator's job,
    /// so this returns `None` rather than an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "reuse" => Some(Self::Reuse),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }
}

/// The plan envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub changes: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Plan-wide duplicate strategy token; per-operation `onDuplicate`
    /// overrides it. Kept as a string so unknown tokens surface as
    /// `InvalidDuplicateStrategy`, not a decode failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_strategy: Option<String>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Plan {
    /// Decode a plan from JSON. Unknown operation tags and malformed
    /// envelopes surface as `ValidationError`.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::validation(format!("malformed plan: {e}")))
    }
}

/// Create-branch of `createOrGetElement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Match-branch of `createOrGetElement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMatch {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// Create-branch of `createOrGetRelationship`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
}

/// Match-branch of `createOrGetRelationship`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMatch {
    #[serde(rename = "type")]
    pub kind: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
}

/// The closed operation set. Tag is the wire `op` field; unknown tags are a
/// decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    CreateElement {
        #[serde(rename = "type")]
        kind: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<BTreeMap<String, String>>,
        #[serde(default, alias = "folderId", skip_serializing_if = "Option::is_none")]
        folder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    CreateOrGetElement {
        create: ElementSpec,
        #[serde(rename = "match")]
        match_spec: ElementMatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_duplicate: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    CreateRelationship {
        #[serde(rename = "type")]
        kind: String,
        source_id: String,
        target_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strength: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    CreateOrGetRelationship {
        create: RelationshipSpec,
        #[serde(rename = "match")]
        match_spec: RelationshipMatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_duplicate: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    SetProperty {
        id: String,
        key: String,
        value: String,
    },
    UpdateElement {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<BTreeMap<String, String>>,
    },
    UpdateRelationship {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strength: Option<String>,
    },
    DeleteElement {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cascade: Option<bool>,
    },
    DeleteRelationship {
        id: String,
    },
    MoveToFolder {
        id: String,
        #[serde(default, alias = "folder", skip_serializing_if = "Option::is_none")]
        folder_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_folder: Option<String>,
    },
    CreateFolder {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_folder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    CreateView {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewpoint: Option<String>,
        #[serde(default, alias = "folder", skip_serializing_if = "Option::is_none")]
        folder_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    DeleteView {
        view_id: String,
    },
    DuplicateView {
        view_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    SetViewRouter {
        view_id: String,
        router_type: String,
    },
    LayoutView {
        view_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        algorithm: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rankdir: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nodesep: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ranksep: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edgesep: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        marginx: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        marginy: Option<f64>,
    },
    AddToView {
        view_id: String,
        element_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_visual_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    NestInView {
        view_id: String,
        visual_id: String,
        parent_visual_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    AddConnectionToView {
        view_id: String,
        relationship_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_visual_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_visual_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_swap_direction: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_resolve_visuals: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skip_existing_connections: Option<bool>,
    },
    DeleteConnectionFromView {
        view_id: String,
        connection_id: String,
    },
    StyleViewObject {
        #[serde(alias = "visualId")]
        view_object_id: String,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        fill_color: Option<Option<String>>,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        line_color: Option<Option<String>>,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        font_color: Option<Option<String>>,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        font: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opacity: Option<f64>,
    },
    StyleConnection {
        connection_id: String,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        line_color: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_width: Option<f64>,
        #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
        font_color: Option<Option<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_position: Option<f64>,
    },
    MoveViewObject {
        #[serde(alias = "visualId")]
        view_object_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    CreateNote {
        view_id: String,
        #[serde(alias = "text")]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    CreateGroup {
        view_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        documentation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
}

impl Operation {
    /// The wire tag of this operation.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateElement { .. } => "createElement",
            Self::CreateOrGetElement { .. } => "createOrGetElement",
            Self::CreateRelationship { .. } => "createRelationship",
            Self::CreateOrGetRelationship { .. } => "createOrGetRelationship",
            Self::SetProperty { .. } => "setProperty",
            Self::UpdateElement { .. } => "updateElement",
            Self::UpdateRelationship { .. } => "updateRelationship",
            Self::DeleteElement { .. } => "deleteElement",
            Self::DeleteRelationship { .. } => "deleteRelationship",
            Self::MoveToFolder { .. } => "moveToFolder",
            Self::CreateFolder { .. } => "createFolder",
            Self::CreateView { .. } => "createView",
            Self::DeleteView { .. } => "deleteView",
            Self::DuplicateView { .. } => "duplicateView",
            Self::SetViewRouter { .. } => "setViewRouter",
            Self::LayoutView { .. } => "layoutView",
            Self::AddToView { .. } => "addToView",
            Self::NestInView { .. } => "nestInView",
            Self::AddConnectionToView { .. } => "addConnectionToView",
            Self::DeleteConnectionFromView { .. } => "deleteConnectionFromView",
            Self::StyleViewObject { .. } => "styleViewObject",
            Self::StyleConnection { .. } => "styleConnection",
            Self::MoveViewObject { .. } => "moveViewObject",
            Self::CreateNote { .. } => "createNote",
            Self::CreateGroup { .. } => "createGroup",
        }
    }

    /// Is this a delete operation (compiled in pass 3)?
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteElement { .. }
                | Self::DeleteRelationship { .. }
                | Self::DeleteView { .. }
                | Self::DeleteConnectionFromView { .. }
        )
    }
}

/// Result of one operation, in input order. All fields other than `op` are
/// operation-specific; absent fields are omitted from the wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    #[serde(default)]
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_view_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_view_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_visual_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resolved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes_positioned: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges_routed: Option<usize>,
}

impl OpResult {
    pub fn new(op: &Operation) -> Self {
        Self {
            op: op.tag().to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_operations() {
        let plan = Plan::from_json(
            r#"{"changes":[
                {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
                {"op":"deleteElement","id":"x","cascade":false}
            ]}"#,
        )
        .expect("valid plan");
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.changes[0].tag(), "createElement");
        assert!(plan.changes[1].is_delete());
    }

    #[test]
    fn unknown_tag_fails_decode() {
        let err = Plan::from_json(r#"{"changes":[{"op":"mintElement","name":"x"}]}"#)
            .expect_err("unknown tag must fail");
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn aliases_are_accepted() {
        let plan = Plan::from_json(
            r##"{"changes":[
                {"op":"styleViewObject","visualId":"v1","fillColor":"#ff0000"},
                {"op":"createNote","viewId":"v","text":"hello"}
            ]}"##,
        )
        .expect("valid plan");
        match &plan.changes[0] {
            Operation::StyleViewObject {
                view_object_id,
                fill_color,
                ..
            } => {
                assert_eq!(view_object_id, "v1");
                assert_eq!(fill_color.clone().flatten().as_deref(), Some("#ff0000"));
            }
            other => panic!("unexpected op {other:?}"),
        }
        match &plan.changes[1] {
            Operation::CreateNote { content, .. } => assert_eq!(content, "hello"),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn null_style_clears_but_absent_does_not() {
        let plan = Plan::from_json(
            r#"{"changes":[{"op":"styleViewObject","viewObjectId":"v1","fillColor":null}]}"#,
        )
        .expect("valid plan");
        match &plan.changes[0] {
            Operation::StyleViewObject {
                fill_color,
                line_color,
                ..
            } => {
                assert_eq!(fill_color, &Some(None));
                assert_eq!(line_color, &None);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}
