//! Plan validation: envelope checks, per-operation schema checks, kind
//! normalisation (written back into the plan), upsert match consistency,
//! and duplicate analysis against both the committed model and the
//! intra-plan duplicate index.
//!
//! Validation runs before compilation; a validation failure means no
//! sub-command was emitted and the model is untouched. Duplicate decisions
//! (create / reuse / rename) are made here so that the index stays
//! consistent with what a full re-scan would report after commit.

use std::sync::OnceLock;

use regex::Regex;

use super::duplicates::{DuplicateIndex, ElementEntry, RelationshipEntry};
use super::{DuplicateStrategy, Operation, Plan};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{traversal, Model};
use crate::registry::{
    is_valid_element_kind, is_valid_relationship_kind, normalize_kind, FolderKind,
};
use crate::style;

const ACCESS_TYPES: &[&str] = &["read", "write", "access", "read-write"];
const STRENGTHS: &[&str] = &["+", "-", "=", "?"];
const ROUTERS: &[&str] = &["bendpoint", "manhattan"];
const LAYOUT_ALGORITHMS: &[&str] = &["dagre", "sugiyama"];
const RANK_DIRECTIONS: &[&str] = &["TB", "BT", "LR", "RL"];

fn idempotency_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new("^[A-Za-z0-9:_-]{1,128}$").unwrap()
    })
}

/// Does `key` match the accepted idempotency-key pattern?
pub(crate) fn is_valid_idempotency_key(key: &str) -> bool {
    idempotency_key_pattern().is_match(key)
}

/// Duplicate decision for a create-style operation, consumed by the
/// compiler. Reuse produces no sub-commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DupDecision {
    /// Create a fresh entity.
    Create,
    /// Reuse an entity already committed in the model.
    ReuseExisting { id: String },
    /// Reuse an entity another operation of this plan creates.
    ReusePending { op_index: usize },
    /// Create a fresh entity under a uniquified name.
    Renamed { name: String },
}

/// Output of validation: duplicate decisions aligned with the plan's
/// operations, plus the populated index.
#[derive(Debug)]
pub struct ValidatedPlan {
    pub decisions: Vec<Option<DupDecision>>,
    pub index: DuplicateIndex,
}

#[derive(Debug)]
struct SnapshotElement {
    id: String,
    kind: String,
    name: String,
}

#[derive(Debug)]
struct SnapshotRelationship {
    id: String,
    kind: String,
    source: String,
    target: String,
    access_type: Option<String>,
    strength: Option<String>,
}

/// Folder-reachable entities of the committed model, captured once per
/// validation run.
#[derive(Debug, Default)]
struct ModelSnapshot {
    elements: Vec<SnapshotElement>,
    relationships: Vec<SnapshotRelationship>,
}

impl ModelSnapshot {
    fn capture(model: &Model) -> Self {
        let mut snap = Self::default();
        for fid in traversal::folder_ids_depth_first(model) {
            let Some(folder) = model.folder(&fid) else {
                continue;
            };
            for item in &folder.items {
                if let Some(e) = model.element(item) {
                    snap.elements.push(SnapshotElement {
                        id: e.id.clone(),
                        kind: e.kind.clone(),
                        name: e.name.clone(),
                    });
                } else if let Some(r) = model.relationship(item) {
                    snap.relationships.push(SnapshotRelationship {
                        id: r.id.clone(),
                        kind: r.kind.clone(),
                        source: r.source.clone(),
                        target: r.target.clone(),
                        access_type: r.access_type.map(|a| a.as_str().to_string()),
                        strength: r.strength.map(|s| s.as_str().to_string()),
                    });
                }
            }
        }
        snap
    }

    fn element_matches(&self, kind: &str, name: &str) -> Vec<&SnapshotElement> {
        self.elements
            .iter()
            .filter(|e| e.kind == kind && e.name == name)
            .collect()
    }

    fn element_name_taken(&self, kind: &str, name: &str) -> bool {
        self.elements.iter().any(|e| e.kind == kind && e.name == name)
    }

    fn relationship_matches(
        &self,
        kind: &str,
        source: &str,
        target: &str,
        access_type: Option<&str>,
        strength: Option<&str>,
    ) -> Vec<&SnapshotRelationship> {
        self.relationships
            .iter()
            .filter(|r| {
                r.kind == kind
                    && r.source == source
                    && r.target == target
                    && access_type.is_none_or(|a| r.access_type.as_deref() == Some(a))
                    && strength.is_none_or(|s| r.strength.as_deref() == Some(s))
            })
            .collect()
    }
}

/// Validate a plan in place. Normalised kinds and tokens are written back
/// into the operations.
pub fn validate_plan(
    model: &Model,
    plan: &mut Plan,
    config: &EngineConfig,
) -> Result<ValidatedPlan, EngineError> {
    if plan.changes.is_empty() {
        return Err(EngineError::validation("changes must not be empty"));
    }
    if plan.changes.len() > config.max_changes_per_plan {
        return Err(EngineError::validation(format!(
            "plan has {} changes, maximum is {}",
            plan.changes.len(),
            config.max_changes_per_plan
        )));
    }
    if let Some(key) = &plan.idempotency_key {
        if !idempotency_key_pattern().is_match(key) {
            return Err(EngineError::validation(format!(
                "idempotencyKey '{key}' must match ^[A-Za-z0-9:_-]{{1,128}}$"
            )));
        }
    }
    let plan_strategy = match &plan.duplicate_strategy {
        None => DuplicateStrategy::default(),
        Some(token) => DuplicateStrategy::parse(token).ok_or_else(|| {
            EngineError::InvalidDuplicateStrategy {
                strategy: token.clone(),
                operation_index: None,
            }
        })?,
    };

    let snapshot = ModelSnapshot::capture(model);
    let mut index = DuplicateIndex::new();
    let mut decisions: Vec<Option<DupDecision>> = Vec::with_capacity(plan.changes.len());

    for i in 0..plan.changes.len() {
        let decision = validate_operation(&mut plan.changes[i], i, plan_strategy, &snapshot, &mut index)
            .map_err(|e| e.at_op(i))?;
        decisions.push(decision);
    }

    Ok(ValidatedPlan { decisions, index })
}

fn validate_operation(
    op: &mut Operation,
    i: usize,
    plan_strategy: DuplicateStrategy,
    snapshot: &ModelSnapshot,
    index: &mut DuplicateIndex,
) -> Result<Option<DupDecision>, EngineError> {
    match op {
        Operation::CreateElement {
            kind,
            name,
            folder,
            temp_id,
            ..
        } => {
            require_nonempty(name, "name")?;
            *kind = normalize_element_kind(kind)?;
            if let Some(f) = folder {
                require_nonempty(f, "folder")?;
            }
            claim_temp(index, temp_id.as_deref(), i)?;
            let decision =
                decide_element(snapshot, index, plan_strategy, kind, name, temp_id.as_deref(), i)?;
            Ok(Some(decision))
        }
        Operation::CreateOrGetElement {
            create,
            match_spec,
            on_duplicate,
            temp_id,
        } => {
            require_nonempty(&create.name, "create.name")?;
            require_nonempty(&match_spec.name, "match.name")?;
            create.kind = normalize_element_kind(&create.kind)?;
            match_spec.kind = normalize_element_kind(&match_spec.kind)?;
            if create.kind != match_spec.kind || create.name != match_spec.name {
                return Err(EngineError::InvalidMatchSpecification {
                    message: format!(
                        "create ({} '{}') and match ({} '{}') must agree on type and name",
                        create.kind, create.name, match_spec.kind, match_spec.name
                    ),
                    operation_index: None,
                });
            }
            let strategy = parse_strategy(on_duplicate.as_deref(), plan_strategy)?;
            claim_temp(index, temp_id.as_deref(), i)?;
            let decision = decide_element(
                snapshot,
                index,
                strategy,
                &match_spec.kind,
                &match_spec.name,
                temp_id.as_deref(),
                i,
            )?;
            Ok(Some(decision))
        }
        Operation::CreateRelationship {
            kind,
            source_id,
            target_id,
            access_type,
            strength,
            temp_id,
            ..
        } => {
            require_nonempty(source_id, "sourceId")?;
            require_nonempty(target_id, "targetId")?;
            *kind = normalize_relationship_kind(kind)?;
            check_access_type(access_type.as_deref())?;
            check_strength(strength.as_deref())?;
            if plan_strategy == DuplicateStrategy::Rename {
                return Err(EngineError::InvalidDuplicateStrategy {
                    strategy: "rename".into(),
                    operation_index: None,
                });
            }
            claim_temp(index, temp_id.as_deref(), i)?;
            let decision = decide_relationship(
                snapshot,
                index,
                plan_strategy,
                kind,
                source_id,
                target_id,
                access_type.as_deref(),
                strength.as_deref(),
                temp_id.as_deref(),
                i,
            )?;
            Ok(Some(decision))
        }
        Operation::CreateOrGetRelationship {
            create,
            match_spec,
            on_duplicate,
            temp_id,
        } => {
            require_nonempty(&create.source_id, "create.sourceId")?;
            require_nonempty(&create.target_id, "create.targetId")?;
            create.kind = normalize_relationship_kind(&create.kind)?;
            match_spec.kind = normalize_relationship_kind(&match_spec.kind)?;
            check_access_type(create.access_type.as_deref())?;
            check_strength(create.strength.as_deref())?;
            check_access_type(match_spec.access_type.as_deref())?;
            check_strength(match_spec.strength.as_deref())?;
            let identity_agrees = create.kind == match_spec.kind
                && create.source_id == match_spec.source_id
                && create.target_id == match_spec.target_id
                && match_spec
                    .access_type
                    .as_deref()
                    .is_none_or(|a| create.access_type.as_deref() == Some(a))
                && match_spec
                    .strength
                    .as_deref()
                    .is_none_or(|s| create.strength.as_deref() == Some(s));
            if !identity_agrees {
                return Err(EngineError::InvalidMatchSpecification {
                    message: "create and match must agree on type, source, target and kind-specific attributes".into(),
                    operation_index: None,
                });
            }
            let strategy = parse_strategy(on_duplicate.as_deref(), plan_strategy)?;
            if strategy == DuplicateStrategy::Rename {
                return Err(EngineError::InvalidDuplicateStrategy {
                    strategy: "rename".into(),
                    operation_index: None,
                });
            }
            claim_temp(index, temp_id.as_deref(), i)?;
            let decision = decide_relationship(
                snapshot,
                index,
                strategy,
                &match_spec.kind,
                &match_spec.source_id,
                &match_spec.target_id,
                match_spec.access_type.as_deref(),
                match_spec.strength.as_deref(),
                temp_id.as_deref(),
                i,
            )?;
            Ok(Some(decision))
        }
        Operation::SetProperty { id, key, .. } => {
            require_nonempty(id, "id")?;
            require_nonempty(key, "key")?;
            Ok(None)
        }
        Operation::UpdateElement {
            id,
            name,
            documentation,
            properties,
        } => {
            require_nonempty(id, "id")?;
            if name.is_none() && documentation.is_none() && properties.is_none() {
                return Err(EngineError::validation(
                    "updateElement requires at least one of name, documentation, properties",
                ));
            }
            if let Some(n) = name {
                require_nonempty(n, "name")?;
            }
            Ok(None)
        }
        Operation::UpdateRelationship {
            id,
            name,
            documentation,
            access_type,
            strength,
        } => {
            require_nonempty(id, "id")?;
            if name.is_none() && documentation.is_none() && access_type.is_none() && strength.is_none()
            {
                return Err(EngineError::validation(
                    "updateRelationship requires at least one of name, documentation, accessType, strength",
                ));
            }
            check_access_type(access_type.as_deref())?;
            check_strength(strength.as_deref())?;
            Ok(None)
        }
        Operation::DeleteElement { id, .. } | Operation::DeleteRelationship { id } => {
            require_nonempty(id, "id")?;
            Ok(None)
        }
        Operation::MoveToFolder {
            id,
            folder_id,
            parent_type,
            parent_folder,
        } => {
            require_nonempty(id, "id")?;
            if folder_id.is_none() && parent_type.is_none() && parent_folder.is_none() {
                return Err(EngineError::validation(
                    "moveToFolder requires one of folderId, parentType, parentFolder",
                ));
            }
            check_folder_kind_token(parent_type.as_deref())?;
            Ok(None)
        }
        Operation::CreateFolder {
            name,
            parent_id,
            parent_type,
            parent_folder,
            temp_id,
            ..
        } => {
            require_nonempty(name, "name")?;
            if parent_id.is_none() && parent_type.is_none() && parent_folder.is_none() {
                return Err(EngineError::validation(
                    "createFolder requires one of parentId, parentType, parentFolder",
                ));
            }
            check_folder_kind_token(parent_type.as_deref())?;
            claim_temp(index, temp_id.as_deref(), i)?;
            Ok(None)
        }
        Operation::CreateView { name, temp_id, .. } => {
            require_nonempty(name, "name")?;
            claim_temp(index, temp_id.as_deref(), i)?;
            Ok(None)
        }
        Operation::DeleteView { view_id } => {
            require_nonempty(view_id, "viewId")?;
            Ok(None)
        }
        Operation::DuplicateView { view_id, name } => {
            require_nonempty(view_id, "viewId")?;
            if let Some(n) = name {
                require_nonempty(n, "name")?;
            }
            Ok(None)
        }
        Operation::SetViewRouter {
            view_id,
            router_type,
        } => {
            require_nonempty(view_id, "viewId")?;
            let token = router_type.to_lowercase();
            if !ROUTERS.contains(&token.as_str()) {
                return Err(EngineError::validation(format!(
                    "routerType '{router_type}' must be one of {ROUTERS:?}"
                )));
            }
            *router_type = token;
            Ok(None)
        }
        Operation::LayoutView {
            view_id,
            algorithm,
            rankdir,
            nodesep,
            ranksep,
            edgesep,
            marginx,
            marginy,
        } => {
            require_nonempty(view_id, "viewId")?;
            if let Some(a) = algorithm {
                let token = a.to_lowercase();
                if !LAYOUT_ALGORITHMS.contains(&token.as_str()) {
                    return Err(EngineError::validation(format!(
                        "layout algorithm '{a}' must be one of {LAYOUT_ALGORITHMS:?}"
                    )));
                }
                *a = token;
            }
            if let Some(d) = rankdir {
                let token = d.to_uppercase();
                if !RANK_DIRECTIONS.contains(&token.as_str()) {
                    return Err(EngineError::validation(format!(
                        "rankdir '{d}' must be one of {RANK_DIRECTIONS:?}"
                    )));
                }
                *d = token;
            }
            for (label, v) in [
                ("nodesep", nodesep),
                ("ranksep", ranksep),
                ("edgesep", edgesep),
                ("marginx", marginx),
                ("marginy", marginy),
            ] {
                check_finite_non_negative(label, *v)?;
            }
            Ok(None)
        }
        Operation::AddToView {
            view_id,
            element_id,
            x,
            y,
            width,
            height,
            parent_visual_id,
            temp_id,
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(element_id, "elementId")?;
            check_finite("x", *x)?;
            check_finite("y", *y)?;
            check_positive_size("width", *width)?;
            check_positive_size("height", *height)?;
            if let Some(p) = parent_visual_id {
                require_nonempty(p, "parentVisualId")?;
            }
            claim_temp(index, temp_id.as_deref(), i)?;
            Ok(None)
        }
        Operation::NestInView {
            view_id,
            visual_id,
            parent_visual_id,
            x,
            y,
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(visual_id, "visualId")?;
            require_nonempty(parent_visual_id, "parentVisualId")?;
            if visual_id == parent_visual_id {
                return Err(EngineError::validation(
                    "cannot nest a visual into itself",
                ));
            }
            check_finite("x", *x)?;
            check_finite("y", *y)?;
            Ok(None)
        }
        Operation::AddConnectionToView {
            view_id,
            relationship_id,
            ..
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(relationship_id, "relationshipId")?;
            Ok(None)
        }
        Operation::DeleteConnectionFromView {
            view_id,
            connection_id,
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(connection_id, "connectionId")?;
            Ok(None)
        }
        Operation::StyleViewObject {
            view_object_id,
            fill_color,
            line_color,
            font_color,
            opacity,
            ..
        } => {
            require_nonempty(view_object_id, "viewObjectId")?;
            normalize_color_field("fillColor", fill_color)?;
            normalize_color_field("lineColor", line_color)?;
            normalize_color_field("fontColor", font_color)?;
            if let Some(v) = opacity {
                style::parse_opacity(*v).map_err(EngineError::validation)?;
            }
            Ok(None)
        }
        Operation::StyleConnection {
            connection_id,
            line_color,
            line_width,
            font_color,
            text_position,
        } => {
            require_nonempty(connection_id, "connectionId")?;
            normalize_color_field("lineColor", line_color)?;
            normalize_color_field("fontColor", font_color)?;
            if let Some(v) = line_width {
                style::parse_line_width(*v).map_err(EngineError::validation)?;
            }
            if let Some(v) = text_position {
                style::parse_text_position(*v).map_err(EngineError::validation)?;
            }
            Ok(None)
        }
        Operation::MoveViewObject {
            view_object_id,
            x,
            y,
            width,
            height,
        } => {
            require_nonempty(view_object_id, "viewObjectId")?;
            if x.is_none() && y.is_none() && width.is_none() && height.is_none() {
                return Err(EngineError::validation(
                    "moveViewObject requires at least one of x, y, width, height",
                ));
            }
            check_finite("x", *x)?;
            check_finite("y", *y)?;
            check_positive_size("width", *width)?;
            check_positive_size("height", *height)?;
            Ok(None)
        }
        Operation::CreateNote {
            view_id,
            content,
            x,
            y,
            width,
            height,
            temp_id,
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(content, "content")?;
            check_finite("x", *x)?;
            check_finite("y", *y)?;
            check_positive_size("width", *width)?;
            check_positive_size("height", *height)?;
            claim_temp(index, temp_id.as_deref(), i)?;
            Ok(None)
        }
        Operation::CreateGroup {
            view_id,
            name,
            x,
            y,
            width,
            height,
            temp_id,
            ..
        } => {
            require_nonempty(view_id, "viewId")?;
            require_nonempty(name, "name")?;
            check_finite("x", *x)?;
            check_finite("y", *y)?;
            check_positive_size("width", *width)?;
            check_positive_size("height", *height)?;
            claim_temp(index, temp_id.as_deref(), i)?;
            Ok(None)
        }
    }
}

// Duplicate analysis

fn decide_element(
    snapshot: &ModelSnapshot,
    index: &mut DuplicateIndex,
    strategy: DuplicateStrategy,
    kind: &str,
    name: &str,
    temp_id: Option<&str>,
    op_index: usize,
) -> Result<DupDecision, EngineError> {
    let model_matches = snapshot.element_matches(kind, name);
    let plan_matches = index.element_matches(kind, name);
    let total = model_matches.len() + plan_matches.len();

    let decision = match strategy {
        DuplicateStrategy::Error if total > 0 => {
            return Err(EngineError::DuplicateElement {
                kind: kind.to_string(),
                name: name.to_string(),
                operation_index: None,
            });
        }
        DuplicateStrategy::Reuse if total > 1 => {
            return Err(EngineError::AmbiguousMatch {
                kind: kind.to_string(),
                name: name.to_string(),
                count: total,
                operation_index: None,
            });
        }
        DuplicateStrategy::Reuse if total == 1 => {
            if let Some(existing) = model_matches.first() {
                DupDecision::ReuseExisting {
                    id: existing.id.clone(),
                }
            } else {
                DupDecision::ReusePending {
                    op_index: plan_matches[0].op_index,
                }
            }
        }
        DuplicateStrategy::Rename if total > 0 => {
            let renamed = uniquified_name(snapshot, index, kind, name);
            DupDecision::Renamed { name: renamed }
        }
        _ => DupDecision::Create,
    };

    // Reuse adds nothing new to the model, so only creations register.
    let final_name = match &decision {
        DupDecision::Renamed { name } => Some(name.clone()),
        DupDecision::Create => Some(name.to_string()),
        DupDecision::ReuseExisting { .. } | DupDecision::ReusePending { .. } => None,
    };
    if let Some(final_name) = final_name {
        index.register_element(ElementEntry {
            op_index,
            kind: kind.to_string(),
            name: final_name,
            temp_id: temp_id.map(String::from),
        });
    }
    Ok(decision)
}

fn decide_relationship(
    snapshot: &ModelSnapshot,
    index: &mut DuplicateIndex,
    strategy: DuplicateStrategy,
    kind: &str,
    source_ref: &str,
    target_ref: &str,
    access_type: Option<&str>,
    strength: Option<&str>,
    temp_id: Option<&str>,
    op_index: usize,
) -> Result<DupDecision, EngineError> {
    // A temp-id ref cannot match anything already committed.
    let refs_are_real =
        index.temp_element(source_ref).is_none() && index.temp_element(target_ref).is_none();
    let model_matches = if refs_are_real {
        snapshot.relationship_matches(kind, source_ref, target_ref, access_type, strength)
    } else {
        Vec::new()
    };
    let plan_matches =
        index.relationship_matches(kind, source_ref, target_ref, access_type, strength);
    let total = model_matches.len() + plan_matches.len();

    let decision = match strategy {
        DuplicateStrategy::Error if total > 0 => {
            return Err(EngineError::DuplicateRelationship {
                kind: kind.to_string(),
                source_id: source_ref.to_string(),
                target: target_ref.to_string(),
                operation_index: None,
            });
        }
        DuplicateStrategy::Reuse if total > 1 => {
            return Err(EngineError::AmbiguousMatch {
                kind: kind.to_string(),
                name: format!("{source_ref}->{target_ref}"),
                count: total,
                operation_index: None,
            });
        }
        DuplicateStrategy::Reuse if total == 1 => {
            if let Some(existing) = model_matches.first() {
                DupDecision::ReuseExisting {
                    id: existing.id.clone(),
                }
            } else {
                DupDecision::ReusePending {
                    op_index: plan_matches[0].op_index,
                }
            }
        }
        // Rename was rejected earlier for relationships.
        _ => DupDecision::Create,
    };

    if decision == DupDecision::Create {
        index.register_relationship(RelationshipEntry {
            op_index,
            kind: kind.to_string(),
            source_ref: source_ref.to_string(),
            target_ref: target_ref.to_string(),
            access_type: access_type.map(String::from),
            strength: strength.map(String::from),
            temp_id: temp_id.map(String::from),
        });
    }
    Ok(decision)
}

/// Smallest `"name (n)"` (n = 2, 3, …) not taken by the model or the plan.
fn uniquified_name(
    snapshot: &ModelSnapshot,
    index: &DuplicateIndex,
    kind: &str,
    base: &str,
) -> String {
    let mut n = 2usize;
    loop {
        let candidate = format!("{base} ({n})");
        if !snapshot.element_name_taken(kind, &candidate)
            && !index.element_name_taken(kind, &candidate)
        {
            return candidate;
        }
        n += 1;
    }
}

// Field-level helpers

fn claim_temp(
    index: &mut DuplicateIndex,
    temp_id: Option<&str>,
    op_index: usize,
) -> Result<(), EngineError> {
    if let Some(t) = temp_id {
        require_nonempty(t, "tempId")?;
        index.claim_temp_id(t, op_index).map_err(|prior| {
            EngineError::validation(format!(
                "tempId '{t}' already claimed by operation {prior}"
            ))
        })?;
    }
    Ok(())
}

fn require_nonempty(value: &str, what: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn normalize_element_kind(kind: &str) -> Result<String, EngineError> {
    let normalized = normalize_kind(kind);
    if !is_valid_element_kind(&normalized) {
        return Err(EngineError::InvalidElementKind {
            kind: kind.to_string(),
            operation_index: None,
        });
    }
    Ok(normalized)
}

fn normalize_relationship_kind(kind: &str) -> Result<String, EngineError> {
    let normalized = normalize_kind(kind);
    if !is_valid_relationship_kind(&normalized) {
        return Err(EngineError::InvalidRelationshipKind {
            kind: kind.to_string(),
            operation_index: None,
        });
    }
    Ok(normalized)
}

fn parse_strategy(
    token: Option<&str>,
    fallback: DuplicateStrategy,
) -> Result<DuplicateStrategy, EngineError> {
    match token {
        None => Ok(fallback),
        Some(t) => DuplicateStrategy::parse(t).ok_or_else(|| EngineError::InvalidDuplicateStrategy {
            strategy: t.to_string(),
            operation_index: None,
        }),
    }
}

fn check_access_type(token: Option<&str>) -> Result<(), EngineError> {
    if let Some(t) = token {
        if !ACCESS_TYPES.contains(&t) {
            return Err(EngineError::validation(format!(
                "accessType '{t}' must be one of {ACCESS_TYPES:?}"
            )));
        }
    }
    Ok(())
}

fn check_strength(token: Option<&str>) -> Result<(), EngineError> {
    if let Some(t) = token {
        if !STRENGTHS.contains(&t) {
            return Err(EngineError::validation(format!(
                "strength '{t}' must be one of {STRENGTHS:?}"
            )));
        }
    }
    Ok(())
}

fn check_folder_kind_token(token: Option<&str>) -> Result<(), EngineError> {
    if let Some(t) = token {
        if FolderKind::parse(t).is_none() {
            return Err(EngineError::validation(format!(
                "parentType '{t}' is not a folder kind"
            )));
        }
    }
    Ok(())
}

fn check_finite(label: &str, v: Option<f64>) -> Result<(), EngineError> {
    if let Some(v) = v {
        if !v.is_finite() {
            return Err(EngineError::validation(format!("{label} must be finite")));
        }
    }
    Ok(())
}

fn check_positive_size(label: &str, v: Option<f64>) -> Result<(), EngineError> {
    if let Some(v) = v {
        if !v.is_finite() || v <= 0.0 {
            return Err(EngineError::validation(format!(
                "{label} must be a positive finite number"
            )));
        }
    }
    Ok(())
}

fn check_finite_non_negative(label: &str, v: Option<f64>) -> Result<(), EngineError> {
    if let Some(v) = v {
        if !v.is_finite() || v < 0.0 {
            return Err(EngineError::validation(format!(
                "{label} must be a non-negative finite number"
            )));
        }
    }
    Ok(())
}

fn normalize_color_field(
    label: &str,
    field: &mut Option<Option<String>>,
) -> Result<(), EngineError> {
    if let Some(Some(raw)) = field {
        let normalized = style::parse_color(raw)
            .map_err(|e| EngineError::validation(format!("{label}: {e}")))?;
        *raw = normalized;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, Model};
    use crate::plan::Plan;

    fn model_with_actor(name: &str) -> Model {
        let mut model = Model::new("m");
        let folder_id = traversal::find_folder_by_kind(&model, FolderKind::Business)
            .map(|f| f.id.clone())
            .expect("business folder");
        model.insert_element_record(Element::new("e1".into(), "business-actor", name));
        model
            .folder_mut(&folder_id)
            .expect("folder")
            .items
            .push("e1".into());
        model
    }

    fn validate(model: &Model, json: &str) -> Result<ValidatedPlan, EngineError> {
        let mut plan = Plan::from_json(json).expect("decodable plan");
        validate_plan(model, &mut plan, &EngineConfig::default())
    }

    #[test]
    fn empty_changes_rejected() {
        let model = Model::new("m");
        let err = validate(&model, r#"{"changes":[]}"#).expect_err("must fail");
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn kind_is_normalized_and_written_back() {
        let model = Model::new("m");
        let mut plan = Plan::from_json(
            r#"{"changes":[{"op":"createElement","type":"BusinessActor","name":"Alice"}]}"#,
        )
        .expect("decodable");
        validate_plan(&model, &mut plan, &EngineConfig::default()).expect("valid");
        match &plan.changes[0] {
            Operation::CreateElement { kind, .. } => assert_eq!(kind, "business-actor"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_element_with_error_strategy() {
        let model = model_with_actor("Acme");
        let err = validate(
            &model,
            r#"{"changes":[{"op":"createElement","type":"business-actor","name":"Acme"}]}"#,
        )
        .expect_err("duplicate");
        assert_eq!(err.code(), "DuplicateElement");
        assert_eq!(err.operation_index(), Some(0));
    }

    #[test]
    fn rename_decision_uniquifies() {
        let model = model_with_actor("Acme");
        let validated = validate(
            &model,
            r#"{"changes":[{"op":"createOrGetElement",
                "create":{"type":"business-actor","name":"Acme"},
                "match":{"type":"business-actor","name":"Acme"},
                "onDuplicate":"rename"}]}"#,
        )
        .expect("valid");
        assert_eq!(
            validated.decisions[0],
            Some(DupDecision::Renamed {
                name: "Acme (2)".into()
            })
        );
    }

    #[test]
    fn reuse_with_two_matches_is_ambiguous() {
        let mut model = model_with_actor("Portal");
        let folder_id = traversal::find_folder_by_kind(&model, FolderKind::Business)
            .map(|f| f.id.clone())
            .expect("folder");
        model.insert_element_record(Element::new("e2".into(), "business-actor", "Portal"));
        model
            .folder_mut(&folder_id)
            .expect("folder")
            .items
            .push("e2".into());

        let err = validate(
            &model,
            r#"{"changes":[{"op":"createOrGetElement",
                "create":{"type":"business-actor","name":"Portal"},
                "match":{"type":"business-actor","name":"Portal"},
                "onDuplicate":"reuse"}]}"#,
        )
        .expect_err("ambiguous");
        assert_eq!(err.code(), "AmbiguousMatch");
    }

    #[test]
    fn rename_rejected_for_relationships() {
        let model = Model::new("m");
        let err = validate(
            &model,
            r#"{"changes":[{"op":"createOrGetRelationship",
                "create":{"type":"flow-relationship","sourceId":"a","targetId":"b"},
                "match":{"type":"flow-relationship","sourceId":"a","targetId":"b"},
                "onDuplicate":"rename"}]}"#,
        )
        .expect_err("rename is elements-only");
        assert_eq!(err.code(), "InvalidDuplicateStrategy");
    }

    #[test]
    fn mismatched_upsert_specs_rejected() {
        let model = Model::new("m");
        let err = validate(
            &model,
            r#"{"changes":[{"op":"createOrGetElement",
                "create":{"type":"business-actor","name":"Alice"},
                "match":{"type":"business-role","name":"Alice"}}]}"#,
        )
        .expect_err("mismatch");
        assert_eq!(err.code(), "InvalidMatchSpecification");
    }

    #[test]
    fn self_nesting_rejected() {
        let model = Model::new("m");
        let err = validate(
            &model,
            r#"{"changes":[{"op":"nestInView","viewId":"v","visualId":"a","parentVisualId":"a"}]}"#,
        )
        .expect_err("self nest");
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn bad_idempotency_key_rejected() {
        let model = Model::new("m");
        let err = validate(
            &model,
            r#"{"changes":[{"op":"deleteElement","id":"x"}],"idempotencyKey":"bad key!"}"#,
        )
        .expect_err("bad key");
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn colour_fields_normalized_in_place() {
        let model = Model::new("m");
        let mut plan = Plan::from_json(
            r#"{"changes":[{"op":"styleViewObject","viewObjectId":"v1","fillColor":"ff00aa"}]}"#,
        )
        .expect("decodable");
        validate_plan(&model, &mut plan, &EngineConfig::default()).expect("valid");
        match &plan.changes[0] {
            Operation::StyleViewObject { fill_color, .. } => {
                assert_eq!(fill_color.clone().flatten().as_deref(), Some("#FF00AA"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_temp_id_rejected() {
        let model = Model::new("m");
        let err = validate(
            &model,
            r#"{"changes":[
                {"op":"createElement","type":"business-actor","name":"A","tempId":"t"},
                {"op":"createElement","type":"business-actor","name":"B","tempId":"t"}
            ]}"#,
        )
        .expect_err("temp id reuse");
        assert_eq!(err.code(), "ValidationError");
        assert_eq!(err.operation_index(), Some(1));
    }
}
