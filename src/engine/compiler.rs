//! The batch compiler: lowers a validated plan to per-operation sub-command
//! lists in three ordered passes.
//!
//! Pass 1 compiles element creations (ids are allocated here). Pass 2
//! compiles relationship creations, mutations and additive view operations
//! in plan order. Pass 3 compiles deletes, so that same-plan
//! create-then-delete composes. Throughout, a temp-id map resolves
//! client-chosen identifiers, a relationship endpoint cache stands in for
//! `source`/`target` reads that would return nothing before commit, and a
//! `(view, element) -> visual` index wires connections to visuals created
//! earlier in the same plan.
//!
//! Compilation never mutates the model: a compile error aborts the plan
//! before the first chunk executes.

use std::collections::{BTreeMap, HashMap};

use super::cascade::{
    self, PendingConnection, PendingRelationship, PendingState, PendingVisual,
};
use super::chunk::OpUnit;
use super::subcommand::{
    ConnectionStyleField, NodeStyleField, PropertyOwner, StyleValue, SubCommand,
};
use super::IdSource;
use crate::error::EngineError;
use crate::model::{
    traversal, AccessType, Bounds, Container, Element, Folder, Id, InfluenceStrength, Model,
    Relationship, RouterKind, View, VisualBody, VisualConnection, VisualNode,
};
use crate::plan::validate::{DupDecision, ValidatedPlan};
use crate::plan::{OpResult, Operation, Plan};
use crate::registry::{folder_kind_for, FolderKind};

/// Output of compilation: one unit and one (pre-execution) result per
/// operation, in input order.
pub(crate) struct CompiledPlan {
    pub units: Vec<OpUnit>,
    pub results: Vec<OpResult>,
}

#[derive(Debug, Clone)]
enum TempTarget {
    Element(Id),
    Relationship(Id),
    Folder(Id),
    View(Id),
    Visual { view: Id, id: Id },
}

#[derive(Debug, Clone)]
struct Endpoint {
    id: Id,
    name: String,
}

#[derive(Debug, Clone)]
struct RelInfo {
    kind: String,
    source: Endpoint,
    target: Endpoint,
}

#[derive(Debug, Clone)]
struct ResolvedVisual {
    id: Id,
    element: Option<Id>,
    nestable: bool,
    bounds: Bounds,
}

pub(crate) fn compile(
    model: &Model,
    ids: &mut dyn IdSource,
    plan: &Plan,
    validated: &ValidatedPlan,
) -> Result<CompiledPlan, EngineError> {
    let mut compiler = Compiler {
        model,
        ids,
        temp: HashMap::new(),
        relationships: HashMap::new(),
        visual_index: HashMap::new(),
        pending: PendingState::default(),
        pending_elements: HashMap::new(),
        pending_folders: HashMap::new(),
        pending_views: HashMap::new(),
        op_ids: HashMap::new(),
        units: plan
            .changes
            .iter()
            .enumerate()
            .map(|(i, _)| OpUnit {
                op_index: i,
                commands: Vec::new(),
                created_element_ids: Vec::new(),
                created_relationship_ids: Vec::new(),
            })
            .collect(),
        results: plan.changes.iter().map(OpResult::new).collect(),
    };

    // Pass 1: element creations.
    for (i, op) in plan.changes.iter().enumerate() {
        match op {
            Operation::CreateElement {
                kind,
                name,
                documentation,
                properties,
                folder,
                temp_id,
            } => compiler
                .compile_create_element(
                    i,
                    kind,
                    name,
                    documentation.as_deref(),
                    properties.as_ref(),
                    folder.as_deref(),
                    temp_id.as_deref(),
                    &validated.decisions[i],
                    false,
                )
                .map_err(|e| e.at_op(i))?,
            Operation::CreateOrGetElement {
                create, temp_id, ..
            } => compiler
                .compile_create_element(
                    i,
                    &create.kind,
                    &create.name,
                    create.documentation.as_deref(),
                    create.properties.as_ref(),
                    create.folder.as_deref(),
                    temp_id.as_deref(),
                    &validated.decisions[i],
                    true,
                )
                .map_err(|e| e.at_op(i))?,
            _ => {}
        }
    }

    // Pass 2: relationship creations, mutations, additive view operations.
    for (i, op) in plan.changes.iter().enumerate() {
        if op.is_delete()
            || matches!(
                op,
                Operation::CreateElement { .. } | Operation::CreateOrGetElement { .. }
            )
        {
            continue;
        }
        compiler
            .compile_mutation(i, op, &validated.decisions[i])
            .map_err(|e| e.at_op(i))?;
    }

    // Pass 3: deletes.
    for (i, op) in plan.changes.iter().enumerate() {
        if op.is_delete() {
            compiler.compile_delete(i, op).map_err(|e| e.at_op(i))?;
        }
    }

    Ok(CompiledPlan {
        units: compiler.units,
        results: compiler.results,
    })
}

struct Compiler<'a> {
    model: &'a Model,
    ids: &'a mut dyn IdSource,
    temp: HashMap<String, TempTarget>,
    /// Endpoint cache for relationships created in this plan.
    relationships: HashMap<Id, RelInfo>,
    /// `(view, element) -> visual` for visuals created in this plan.
    visual_index: HashMap<(Id, Id), Id>,
    pending: PendingState,
    /// `real id -> (kind, name)` for elements created in this plan.
    pending_elements: HashMap<Id, (String, String)>,
    /// `real id -> (kind, name)` for folders created in this plan.
    pending_folders: HashMap<Id, (FolderKind, String)>,
    /// `real id -> name` for views created in this plan.
    pending_views: HashMap<Id, String>,
    /// `op index -> created-or-reused id`.
    op_ids: HashMap<usize, Id>,
    units: Vec<OpUnit>,
    results: Vec<OpResult>,
}

impl<'a> Compiler<'a> {
    #[allow(clippy::too_many_arguments)]
    fn compile_create_element(
        &mut self,
        i: usize,
        kind: &str,
        name: &str,
        documentation: Option<&str>,
        properties: Option<&BTreeMap<String, String>>,
        folder: Option<&str>,
        temp_id: Option<&str>,
        decision: &Option<DupDecision>,
        is_upsert: bool,
    ) -> Result<(), EngineError> {
        self.results[i].kind = Some(kind.to_string());

        match decision {
            Some(DupDecision::ReuseExisting { id }) => {
                let (existing_id, existing_name) = traversal::find_element(self.model, id)
                    .map(|e| (e.id.clone(), e.name.clone()))
                    .ok_or_else(|| EngineError::missing("element", id.clone()))?;
                self.op_ids.insert(i, existing_id.clone());
                if let Some(t) = temp_id {
                    self.temp
                        .insert(t.to_string(), TempTarget::Element(existing_id.clone()));
                }
                let result = &mut self.results[i];
                result.action = Some("reused".into());
                result.real_id = Some(existing_id);
                result.name = Some(existing_name);
                return Ok(());
            }
            Some(DupDecision::ReusePending { op_index }) => {
                let id = self
                    .op_ids
                    .get(op_index)
                    .cloned()
                    .ok_or_else(|| EngineError::validation("reuse target was not compiled"))?;
                let (_, pending_name) = self
                    .pending_elements
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| EngineError::validation("reuse target is not an element"))?;
                self.op_ids.insert(i, id.clone());
                if let Some(t) = temp_id {
                    self.temp
                        .insert(t.to_string(), TempTarget::Element(id.clone()));
                }
                let result = &mut self.results[i];
                result.action = Some("reused".into());
                result.real_id = Some(id);
                result.name = Some(pending_name);
                return Ok(());
            }
            _ => {}
        }

        let final_name = match decision {
            Some(DupDecision::Renamed { name }) => name.clone(),
            _ => name.to_string(),
        };
        let folder_id =
            self.resolve_folder_spec(folder, None, None, Some(folder_kind_for(kind)))?;
        let id = self.ids.next_id();

        let commands = &mut self.units[i].commands;
        commands.push(SubCommand::InsertElement {
            folder: folder_id,
            element: Element::new(id.clone(), kind, ""),
        });
        commands.push(SubCommand::SetElementName {
            id: id.clone(),
            value: final_name.clone(),
            old: None,
        });
        if let Some(doc) = documentation {
            commands.push(SubCommand::SetElementDocumentation {
                id: id.clone(),
                value: doc.to_string(),
                old: None,
            });
        }
        if let Some(props) = properties {
            for (key, value) in props {
                commands.push(SubCommand::SetProperty {
                    owner: PropertyOwner::Element(id.clone()),
                    key: key.clone(),
                    value: value.clone(),
                    old: None,
                });
            }
        }

        self.units[i].created_element_ids.push(id.clone());
        let result = &mut self.results[i];
        if is_upsert {
            result.action = Some(match decision {
                Some(DupDecision::Renamed { .. }) => "renamed".into(),
                _ => "created".into(),
            });
        }
        result.real_id = Some(id.clone());
        result.name = Some(final_name.clone());
        self.op_ids.insert(i, id.clone());
        self.pending_elements
            .insert(id.clone(), (kind.to_string(), final_name));
        if let Some(t) = temp_id {
            self.temp.insert(t.to_string(), TempTarget::Element(id));
        }
        Ok(())
    }

    fn compile_mutation(
        &mut self,
        i: usize,
        op: &Operation,
        decision: &Option<DupDecision>,
    ) -> Result<(), EngineError> {
        match op {
            Operation::CreateRelationship {
                kind,
                source_id,
                target_id,
                name,
                documentation,
                access_type,
                strength,
                temp_id,
            } => self.compile_create_relationship(
                i,
                kind,
                source_id,
                target_id,
                name.as_deref(),
                documentation.as_deref(),
                access_type.as_deref(),
                strength.as_deref(),
                temp_id.as_deref(),
                decision,
                false,
            ),
            Operation::CreateOrGetRelationship {
                create, temp_id, ..
            } => self.compile_create_relationship(
                i,
                &create.kind,
                &create.source_id,
                &create.target_id,
                create.name.as_deref(),
                create.documentation.as_deref(),
                create.access_type.as_deref(),
                create.strength.as_deref(),
                temp_id.as_deref(),
                decision,
                true,
            ),
            Operation::SetProperty { id, key, value } => {
                let (owner, real_id) = self.resolve_property_owner(id)?;
                self.units[i].commands.push(SubCommand::SetProperty {
                    owner,
                    key: key.clone(),
                    value: value.clone(),
                    old: None,
                });
                let result = &mut self.results[i];
                result.id = Some(real_id);
                result.key = Some(key.clone());
                result.value = Some(value.clone());
                Ok(())
            }
            Operation::UpdateElement {
                id,
                name,
                documentation,
                properties,
            } => {
                let (real_id, ..) = self
                    .resolve_element_ref(id)
                    .ok_or_else(|| EngineError::missing("element", id.clone()))?;
                let mut updated = Vec::new();
                let commands = &mut self.units[i].commands;
                if let Some(n) = name {
                    commands.push(SubCommand::SetElementName {
                        id: real_id.clone(),
                        value: n.clone(),
                        old: None,
                    });
                    updated.push("name".into());
                }
                if let Some(d) = documentation {
                    commands.push(SubCommand::SetElementDocumentation {
                        id: real_id.clone(),
                        value: d.clone(),
                        old: None,
                    });
                    updated.push("documentation".into());
                }
                if let Some(props) = properties {
                    for (key, value) in props {
                        commands.push(SubCommand::SetProperty {
                            owner: PropertyOwner::Element(real_id.clone()),
                            key: key.clone(),
                            value: value.clone(),
                            old: None,
                        });
                    }
                    updated.push("properties".into());
                }
                let result = &mut self.results[i];
                result.id = Some(real_id);
                result.updated = Some(updated);
                Ok(())
            }
            Operation::UpdateRelationship {
                id,
                name,
                documentation,
                access_type,
                strength,
            } => {
                let real_id = self
                    .resolve_relationship_ref(id)
                    .map(|(id, _)| id)
                    .ok_or_else(|| EngineError::missing("relationship", id.clone()))?;
                let mut updated = Vec::new();
                let commands = &mut self.units[i].commands;
                if let Some(n) = name {
                    commands.push(SubCommand::SetRelationshipName {
                        id: real_id.clone(),
                        value: n.clone(),
                        old: None,
                    });
                    updated.push("name".into());
                }
                if let Some(d) = documentation {
                    commands.push(SubCommand::SetRelationshipDocumentation {
                        id: real_id.clone(),
                        value: d.clone(),
                        old: None,
                    });
                    updated.push("documentation".into());
                }
                if let Some(a) = access_type {
                    commands.push(SubCommand::SetRelationshipAccessType {
                        id: real_id.clone(),
                        value: AccessType::parse(a),
                        old: None,
                    });
                    updated.push("accessType".into());
                }
                if let Some(s) = strength {
                    commands.push(SubCommand::SetRelationshipStrength {
                        id: real_id.clone(),
                        value: InfluenceStrength::parse(s),
                        old: None,
                    });
                    updated.push("strength".into());
                }
                let result = &mut self.results[i];
                result.id = Some(real_id);
                result.updated = Some(updated);
                Ok(())
            }
            Operation::MoveToFolder {
                id,
                folder_id,
                parent_type,
                parent_folder,
            } => self.compile_move_to_folder(
                i,
                id,
                folder_id.as_deref(),
                parent_type.as_deref(),
                parent_folder.as_deref(),
            ),
            Operation::CreateFolder {
                name,
                parent_id,
                parent_type,
                parent_folder,
                documentation,
                temp_id,
            } => {
                let parent = self.resolve_folder_spec(
                    parent_id.as_deref(),
                    parent_type.as_deref(),
                    parent_folder.as_deref(),
                    None,
                )?;
                let parent_kind = self.folder_kind_of(&parent)?;
                let id = self.ids.next_id();
                let mut folder = Folder::new(id.clone(), name.clone(), parent_kind);
                if let Some(d) = documentation {
                    folder.documentation = d.clone();
                }
                self.units[i].commands.push(SubCommand::InsertFolder {
                    parent: parent.clone(),
                    folder,
                });
                self.pending_folders
                    .insert(id.clone(), (parent_kind, name.clone()));
                if let Some(t) = temp_id {
                    self.temp.insert(t.clone(), TempTarget::Folder(id.clone()));
                }
                let result = &mut self.results[i];
                result.folder_id = Some(id);
                result.parent_id = Some(parent);
                Ok(())
            }
            Operation::CreateView {
                name,
                documentation,
                viewpoint,
                folder_id,
                temp_id,
            } => {
                let folder = self.resolve_folder_spec(
                    folder_id.as_deref(),
                    None,
                    None,
                    Some(FolderKind::Views),
                )?;
                let id = self.ids.next_id();
                let mut view = View::new(id.clone(), name.clone());
                if let Some(d) = documentation {
                    view.documentation = d.clone();
                }
                view.viewpoint = viewpoint.clone();
                self.units[i]
                    .commands
                    .push(SubCommand::InsertView { folder, view });
                self.pending_views.insert(id.clone(), name.clone());
                if let Some(t) = temp_id {
                    self.temp.insert(t.clone(), TempTarget::View(id.clone()));
                }
                let result = &mut self.results[i];
                result.view_id = Some(id);
                result.view_name = Some(name.clone());
                result.viewpoint = viewpoint.clone();
                Ok(())
            }
            Operation::DuplicateView { view_id, name } => self.compile_duplicate_view(i, view_id, name.as_deref()),
            Operation::SetViewRouter {
                view_id,
                router_type,
            } => {
                let view = self
                    .resolve_view_ref(view_id)
                    .ok_or_else(|| EngineError::missing("view", view_id.clone()))?;
                let value = if router_type == "manhattan" {
                    RouterKind::Manhattan
                } else {
                    RouterKind::Bendpoint
                };
                self.units[i].commands.push(SubCommand::SetViewRouter {
                    id: view.clone(),
                    value,
                    old: None,
                });
                self.results[i].view_id = Some(view);
                Ok(())
            }
            Operation::LayoutView {
                view_id,
                rankdir,
                nodesep,
                ranksep,
                marginx,
                marginy,
                ..
            } => self.compile_layout_view(
                i,
                view_id,
                rankdir.as_deref(),
                *nodesep,
                *ranksep,
                *marginx,
                *marginy,
            ),
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
                let view = self
                    .resolve_view_ref(view_id)
                    .ok_or_else(|| EngineError::missing("view", view_id.clone()))?;
                let (element, ..) = self
                    .resolve_element_ref(element_id)
                    .ok_or_else(|| EngineError::missing("element", element_id.clone()))?;
                let container = match parent_visual_id {
                    Some(p) => {
                        let parent = self
                            .resolve_visual_in_view(&view, p)
                            .ok_or_else(|| EngineError::missing("visual", p.clone()))?;
                        if !parent.nestable {
                            return Err(EngineError::UnsupportedContainer {
                                visual: parent.id,
                                operation_index: None,
                            });
                        }
                        Container::Node(parent.id)
                    }
                    None => Container::Root,
                };
                let bounds = merge_bounds(Bounds::DEFAULT, *x, *y, *width, *height);
                let id = self.ids.next_id();
                self.units[i].commands.push(SubCommand::InsertVisual {
                    view: view.clone(),
                    container: container.clone(),
                    node: VisualNode::new(
                        id.clone(),
                        VisualBody::Element {
                            concept: element.clone(),
                        },
                        bounds,
                    ),
                });
                self.visual_index
                    .insert((view.clone(), element.clone()), id.clone());
                self.pending.visuals.push(PendingVisual {
                    view: view.clone(),
                    id: id.clone(),
                    element: Some(element),
                    container,
                    bounds,
                    nestable: true,
                });
                if let Some(t) = temp_id {
                    self.temp.insert(
                        t.clone(),
                        TempTarget::Visual {
                            view: view.clone(),
                            id: id.clone(),
                        },
                    );
                }
                let result = &mut self.results[i];
                result.visual_id = Some(id);
                result.view_id = Some(view);
                Ok(())
            }
            Operation::NestInView {
                view_id,
                visual_id,
                parent_visual_id,
                x,
                y,
            } => {
                let view = self
                    .resolve_view_ref(view_id)
                    .ok_or_else(|| EngineError::missing("view", view_id.clone()))?;
                let visual = self
                    .resolve_visual_in_view(&view, visual_id)
                    .ok_or_else(|| EngineError::missing("visual", visual_id.clone()))?;
                let parent = self
                    .resolve_visual_in_view(&view, parent_visual_id)
                    .ok_or_else(|| EngineError::missing("visual", parent_visual_id.clone()))?;
                if visual.id == parent.id {
                    return Err(EngineError::validation("cannot nest a visual into itself"));
                }
                if !parent.nestable {
                    return Err(EngineError::UnsupportedContainer {
                        visual: parent.id,
                        operation_index: None,
                    });
                }
                if let Some(committed) = self.model.view(&view) {
                    if committed.is_self_or_descendant(&visual.id, &parent.id) {
                        return Err(EngineError::validation(
                            "circular nesting: target container is inside the moved visual",
                        ));
                    }
                }
                let bounds = Bounds {
                    x: x.map_or(visual.bounds.x, |v| v as i32),
                    y: y.map_or(visual.bounds.y, |v| v as i32),
                    width: visual.bounds.width,
                    height: visual.bounds.height,
                };
                self.units[i].commands.push(SubCommand::MoveVisual {
                    view,
                    visual: visual.id.clone(),
                    container: Container::Node(parent.id.clone()),
                    bounds,
                    old: None,
                });
                let result = &mut self.results[i];
                result.visual_id = Some(visual.id);
                result.parent_visual_id = Some(parent.id);
                Ok(())
            }
            Operation::AddConnectionToView {
                view_id,
                relationship_id,
                source_visual_id,
                target_visual_id,
                auto_swap_direction,
                auto_resolve_visuals,
                skip_existing_connections,
            } => self.compile_add_connection(
                i,
                view_id,
                relationship_id,
                source_visual_id.as_deref(),
                target_visual_id.as_deref(),
                auto_swap_direction.unwrap_or(false),
                auto_resolve_visuals.unwrap_or(true),
                skip_existing_connections.unwrap_or(false),
            ),
            Operation::StyleViewObject {
                view_object_id,
                fill_color,
                line_color,
                font_color,
                font,
                opacity,
            } => {
                let (view, visual) = self
                    .locate_visual(view_object_id)
                    .ok_or_else(|| EngineError::missing("visual", view_object_id.clone()))?;
                let mut updated = Vec::new();
                let commands = &mut self.units[i].commands;
                let mut push = |field: NodeStyleField, value: StyleValue, label: &str| {
                    commands.push(SubCommand::SetNodeStyleField {
                        view: view.clone(),
                        visual: visual.id.clone(),
                        field,
                        value,
                        old: None,
                    });
                    updated.push(label.to_string());
                };
                if let Some(v) = fill_color {
                    push(NodeStyleField::FillColor, StyleValue::Text(v.clone()), "fillColor");
                }
                if let Some(v) = line_color {
                    push(NodeStyleField::LineColor, StyleValue::Text(v.clone()), "lineColor");
                }
                if let Some(v) = font_color {
                    push(NodeStyleField::FontColor, StyleValue::Text(v.clone()), "fontColor");
                }
                if let Some(v) = font {
                    push(NodeStyleField::Font, StyleValue::Text(v.clone()), "font");
                }
                if let Some(v) = opacity {
                    push(
                        NodeStyleField::Opacity,
                        StyleValue::Number(Some(*v as u8)),
                        "opacity",
                    );
                }
                let result = &mut self.results[i];
                result.visual_id = Some(visual.id);
                result.updated = Some(updated);
                Ok(())
            }
            Operation::StyleConnection {
                connection_id,
                line_color,
                line_width,
                font_color,
                text_position,
            } => {
                let view = self
                    .locate_connection(connection_id)
                    .ok_or_else(|| EngineError::missing("connection", connection_id.clone()))?;
                let mut updated = Vec::new();
                let commands = &mut self.units[i].commands;
                let mut push = |field: ConnectionStyleField, value: StyleValue, label: &str| {
                    commands.push(SubCommand::SetConnectionStyleField {
                        view: view.clone(),
                        connection: connection_id.clone(),
                        field,
                        value,
                        old: None,
                    });
                    updated.push(label.to_string());
                };
                if let Some(v) = line_color {
                    push(
                        ConnectionStyleField::LineColor,
                        StyleValue::Text(v.clone()),
                        "lineColor",
                    );
                }
                if let Some(v) = line_width {
                    push(
                        ConnectionStyleField::LineWidth,
                        StyleValue::Number(Some(*v as u8)),
                        "lineWidth",
                    );
                }
                if let Some(v) = font_color {
                    push(
                        ConnectionStyleField::FontColor,
                        StyleValue::Text(v.clone()),
                        "fontColor",
                    );
                }
                if let Some(v) = text_position {
                    push(
                        ConnectionStyleField::TextPosition,
                        StyleValue::Number(Some(*v as u8)),
                        "textPosition",
                    );
                }
                let result = &mut self.results[i];
                result.connection_id = Some(connection_id.clone());
                result.updated = Some(updated);
                Ok(())
            }
            Operation::MoveViewObject {
                view_object_id,
                x,
                y,
                width,
                height,
            } => {
                let (view, visual) = self
                    .locate_visual(view_object_id)
                    .ok_or_else(|| EngineError::missing("visual", view_object_id.clone()))?;
                let bounds = merge_bounds(visual.bounds, *x, *y, *width, *height);
                self.units[i].commands.push(SubCommand::SetBounds {
                    view,
                    visual: visual.id.clone(),
                    bounds,
                    old: None,
                });
                let result = &mut self.results[i];
                result.visual_id = Some(visual.id);
                result.x = Some(bounds.x);
                result.y = Some(bounds.y);
                result.width = Some(bounds.width);
                result.height = Some(bounds.height);
                Ok(())
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
                let id = self.compile_free_visual(
                    i,
                    view_id,
                    VisualBody::Note {
                        content: content.clone(),
                    },
                    merge_bounds(Bounds::DEFAULT, *x, *y, *width, *height),
                    temp_id.as_deref(),
                    false,
                )?;
                self.results[i].note_id = Some(id);
                Ok(())
            }
            Operation::CreateGroup {
                view_id,
                name,
                documentation,
                x,
                y,
                width,
                height,
                temp_id,
            } => {
                let id = self.compile_free_visual(
                    i,
                    view_id,
                    VisualBody::Group {
                        name: name.clone(),
                        documentation: documentation.clone().unwrap_or_default(),
                    },
                    merge_bounds(Bounds::DEFAULT, *x, *y, *width, *height),
                    temp_id.as_deref(),
                    true,
                )?;
                self.results[i].group_id = Some(id);
                Ok(())
            }
            // Creates handled in pass 1, deletes in pass 3.
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_create_relationship(
        &mut self,
        i: usize,
        kind: &str,
        source_id: &str,
        target_id: &str,
        name: Option<&str>,
        documentation: Option<&str>,
        access_type: Option<&str>,
        strength: Option<&str>,
        temp_id: Option<&str>,
        decision: &Option<DupDecision>,
        is_upsert: bool,
    ) -> Result<(), EngineError> {
        self.results[i].kind = Some(kind.to_string());

        match decision {
            Some(DupDecision::ReuseExisting { id }) => {
                let existing = traversal::find_relationship(self.model, id)
                    .ok_or_else(|| EngineError::missing("relationship", id.clone()))?;
                let result = &mut self.results[i];
                result.action = Some("reused".into());
                result.real_id = Some(existing.id.clone());
                result.source = Some(existing.source.clone());
                result.target = Some(existing.target.clone());
                self.op_ids.insert(i, existing.id.clone());
                if let Some(t) = temp_id {
                    self.temp
                        .insert(t.to_string(), TempTarget::Relationship(existing.id.clone()));
                }
                return Ok(());
            }
            Some(DupDecision::ReusePending { op_index }) => {
                let id = self
                    .op_ids
                    .get(op_index)
                    .cloned()
                    .ok_or_else(|| EngineError::validation("reuse target was not compiled"))?;
                let info = self
                    .relationships
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| EngineError::validation("reuse target is not a relationship"))?;
                let result = &mut self.results[i];
                result.action = Some("reused".into());
                result.real_id = Some(id.clone());
                result.source = Some(info.source.id);
                result.target = Some(info.target.id);
                self.op_ids.insert(i, id.clone());
                if let Some(t) = temp_id {
                    self.temp.insert(t.to_string(), TempTarget::Relationship(id));
                }
                return Ok(());
            }
            _ => {}
        }

        let (source, source_name, _) = self
            .resolve_element_ref(source_id)
            .ok_or_else(|| EngineError::missing("source element", source_id.to_string()))?;
        let (target, target_name, _) = self
            .resolve_element_ref(target_id)
            .ok_or_else(|| EngineError::missing("target element", target_id.to_string()))?;
        let folder = self.resolve_folder_spec(None, None, None, Some(FolderKind::Relations))?;
        let id = self.ids.next_id();

        let commands = &mut self.units[i].commands;
        commands.push(SubCommand::InsertRelationship {
            folder,
            relationship: Relationship::new(id.clone(), kind, String::new(), String::new()),
        });
        commands.push(SubCommand::SetRelationshipEndpoints {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            old: None,
        });
        if let Some(n) = name {
            commands.push(SubCommand::SetRelationshipName {
                id: id.clone(),
                value: n.to_string(),
                old: None,
            });
        }
        if let Some(d) = documentation {
            commands.push(SubCommand::SetRelationshipDocumentation {
                id: id.clone(),
                value: d.to_string(),
                old: None,
            });
        }
        if let Some(a) = access_type {
            commands.push(SubCommand::SetRelationshipAccessType {
                id: id.clone(),
                value: AccessType::parse(a),
                old: None,
            });
        }
        if let Some(s) = strength {
            commands.push(SubCommand::SetRelationshipStrength {
                id: id.clone(),
                value: InfluenceStrength::parse(s),
                old: None,
            });
        }

        self.units[i].created_relationship_ids.push(id.clone());
        let result = &mut self.results[i];
        if is_upsert {
            result.action = Some("created".into());
        }
        result.real_id = Some(id.clone());
        result.source = Some(source.clone());
        result.target = Some(target.clone());
        result.source_name = Some(source_name.clone());
        result.target_name = Some(target_name.clone());

        self.relationships.insert(
            id.clone(),
            RelInfo {
                kind: kind.to_string(),
                source: Endpoint {
                    id: source.clone(),
                    name: source_name,
                },
                target: Endpoint {
                    id: target.clone(),
                    name: target_name,
                },
            },
        );
        self.pending.relationships.push(PendingRelationship {
            id: id.clone(),
            source,
            target,
        });
        self.op_ids.insert(i, id.clone());
        if let Some(t) = temp_id {
            self.temp.insert(t.to_string(), TempTarget::Relationship(id));
        }
        Ok(())
    }

    fn compile_move_to_folder(
        &mut self,
        i: usize,
        id: &str,
        folder_id: Option<&str>,
        parent_type: Option<&str>,
        parent_folder: Option<&str>,
    ) -> Result<(), EngineError> {
        let (real_id, required_kind) = if let Some((eid, _, kind)) = self.resolve_element_ref(id) {
            (eid, folder_kind_for(&kind))
        } else if let Some((rid, _)) = self.resolve_relationship_ref(id) {
            (rid, FolderKind::Relations)
        } else if let Some(vid) = self.resolve_view_ref(id) {
            (vid, FolderKind::Views)
        } else {
            return Err(EngineError::missing("model item", id.to_string()));
        };
        let folder = self.resolve_folder_spec(folder_id, parent_type, parent_folder, None)?;
        let folder_kind = self.folder_kind_of(&folder)?;
        if folder_kind != required_kind {
            return Err(EngineError::validation(format!(
                "folder kind {folder_kind:?} cannot contain this item (expected {required_kind:?})"
            )));
        }
        self.units[i].commands.push(SubCommand::MoveItemToFolder {
            id: real_id.clone(),
            folder: folder.clone(),
            old: None,
        });
        let result = &mut self.results[i];
        result.id = Some(real_id);
        result.folder_id = Some(folder);
        Ok(())
    }

    fn compile_duplicate_view(
        &mut self,
        i: usize,
        view_id: &str,
        name: Option<&str>,
    ) -> Result<(), EngineError> {
        let source_id = self
            .resolve_view_ref(view_id)
            .ok_or_else(|| EngineError::missing("view", view_id.to_string()))?;
        let source = traversal::find_view(self.model, &source_id)
            .ok_or_else(|| EngineError::missing("view", view_id.to_string()))?;
        let folder = self
            .model
            .parent_folder_of(&source_id)
            .map(|f| f.id.clone())
            .ok_or_else(|| EngineError::missing("folder of view", view_id.to_string()))?;

        // Fresh ids for the view and every descendant node and connection.
        let mut node_ids: HashMap<Id, Id> = HashMap::new();
        let mut conn_ids: HashMap<Id, Id> = HashMap::new();
        for (old, _) in traversal::visuals_depth_first(source) {
            node_ids.insert(old.clone(), self.ids.next_id());
        }
        for (old, _) in traversal::visuals_depth_first(source) {
            if let Some(node) = source.node(&old) {
                for conn in &node.source_connections {
                    conn_ids.insert(conn.id.clone(), self.ids.next_id());
                }
            }
        }

        let new_id = self.ids.next_id();
        let new_name = name.map_or_else(|| format!("{} (copy)", source.name), str::to_string);
        let mut copy = View::new(new_id.clone(), new_name.clone());
        copy.documentation = source.documentation.clone();
        copy.viewpoint = source.viewpoint.clone();
        copy.router = source.router;
        copy.children = source
            .children
            .iter()
            .filter_map(|c| node_ids.get(c).cloned())
            .collect();
        for (old, _) in traversal::visuals_depth_first(source) {
            let Some(node) = source.node(&old) else { continue };
            let Some(new_node_id) = node_ids.get(&old) else {
                continue;
            };
            let mut cloned = VisualNode::new(new_node_id.clone(), node.body.clone(), node.bounds);
            cloned.style = node.style.clone();
            cloned.children = node
                .children
                .iter()
                .filter_map(|c| node_ids.get(c).cloned())
                .collect();
            cloned.source_connections = node
                .source_connections
                .iter()
                .filter_map(|conn| {
                    Some(VisualConnection {
                        id: conn_ids.get(&conn.id)?.clone(),
                        relationship: conn.relationship.clone(),
                        source: node_ids.get(&conn.source)?.clone(),
                        target: node_ids.get(&conn.target)?.clone(),
                        bendpoints: conn.bendpoints.clone(),
                        style: conn.style.clone(),
                    })
                })
                .collect();
            cloned.target_connections = node
                .target_connections
                .iter()
                .filter_map(|c| conn_ids.get(c).cloned())
                .collect();
            copy.insert_node(cloned);
        }

        self.units[i]
            .commands
            .push(SubCommand::InsertView { folder, view: copy });
        self.pending_views.insert(new_id.clone(), new_name.clone());
        let result = &mut self.results[i];
        result.new_view_id = Some(new_id);
        result.new_view_name = Some(new_name);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_layout_view(
        &mut self,
        i: usize,
        view_id: &str,
        rankdir: Option<&str>,
        nodesep: Option<f64>,
        ranksep: Option<f64>,
        marginx: Option<f64>,
        marginy: Option<f64>,
    ) -> Result<(), EngineError> {
        let view = self
            .resolve_view_ref(view_id)
            .ok_or_else(|| EngineError::missing("view", view_id.to_string()))?;

        // Root-level nodes, committed and pending, in order.
        let mut nodes: Vec<(Id, Bounds)> = Vec::new();
        if let Some(committed) = self.model.view(&view) {
            for child in &committed.children {
                if let Some(node) = committed.node(child) {
                    nodes.push((node.id.clone(), node.bounds));
                }
            }
        }
        for pending in &self.pending.visuals {
            if pending.view == view && pending.container == Container::Root {
                nodes.push((pending.id.clone(), pending.bounds));
            }
        }

        let horizontal = matches!(rankdir, Some("LR" | "RL"));
        let nodesep = nodesep.unwrap_or(50.0) as i32;
        let ranksep = ranksep.unwrap_or(50.0) as i32;
        let marginx = marginx.unwrap_or(20.0) as i32;
        let marginy = marginy.unwrap_or(20.0) as i32;
        let columns = (nodes.len() as f64).sqrt().ceil().max(1.0) as usize;

        let commands = &mut self.units[i].commands;
        for (index, (node_id, bounds)) in nodes.iter().enumerate() {
            let (rank, file) = (index / columns, index % columns);
            let (col, row) = if horizontal { (rank, file) } else { (file, rank) };
            let placed = Bounds {
                x: marginx + (col as i32) * (180 + nodesep),
                y: marginy + (row as i32) * (90 + ranksep),
                width: bounds.width,
                height: bounds.height,
            };
            commands.push(SubCommand::SetBounds {
                view: view.clone(),
                visual: node_id.clone(),
                bounds: placed,
                old: None,
            });
        }

        // Re-routing: clear bendpoints so the view router takes over.
        let mut edges = 0usize;
        if let Some(committed) = self.model.view(&view) {
            for (nid, _) in traversal::visuals_depth_first(committed) {
                if let Some(node) = committed.node(&nid) {
                    for conn in &node.source_connections {
                        commands.push(SubCommand::ClearBendpoints {
                            view: view.clone(),
                            connection: conn.id.clone(),
                            old: None,
                        });
                        edges += 1;
                    }
                }
            }
        }
        for pending in &self.pending.connections {
            if pending.view == view {
                commands.push(SubCommand::ClearBendpoints {
                    view: view.clone(),
                    connection: pending.id.clone(),
                    old: None,
                });
                edges += 1;
            }
        }

        let result = &mut self.results[i];
        result.view_id = Some(view);
        result.nodes_positioned = Some(nodes.len());
        result.edges_routed = Some(edges);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_add_connection(
        &mut self,
        i: usize,
        view_id: &str,
        relationship_id: &str,
        source_visual_id: Option<&str>,
        target_visual_id: Option<&str>,
        auto_swap: bool,
        auto_resolve: bool,
        skip_existing: bool,
    ) -> Result<(), EngineError> {
        let view = self
            .resolve_view_ref(view_id)
            .ok_or_else(|| EngineError::missing("view", view_id.to_string()))?;
        let (rel_id, info) = self
            .resolve_relationship_ref(relationship_id)
            .ok_or_else(|| EngineError::missing("relationship", relationship_id.to_string()))?;
        let (rel_source, rel_target) = (info.source.id.clone(), info.target.id.clone());

        let mut auto_resolved = false;
        let resolve_endpoint = |this: &Self,
                                    explicit: Option<&str>,
                                    element: &str|
         -> Result<Option<ResolvedVisual>, EngineError> {
            if let Some(v) = explicit {
                return this
                    .resolve_visual_in_view(&view, v)
                    .map(Some)
                    .ok_or_else(|| EngineError::missing("visual", v.to_string()));
            }
            if !auto_resolve {
                return Ok(None);
            }
            Ok(this.find_visual_for_element(&view, element))
        };

        let source_vis = resolve_endpoint(self, source_visual_id, &rel_source)?;
        let target_vis = resolve_endpoint(self, target_visual_id, &rel_target)?;
        if source_visual_id.is_none() && source_vis.is_some()
            || target_visual_id.is_none() && target_vis.is_some()
        {
            auto_resolved = true;
        }

        let (Some(mut source_vis), Some(mut target_vis)) = (source_vis, target_vis) else {
            let result = &mut self.results[i];
            result.skipped = Some(true);
            result.reason = Some("source or target element is not present in the view".into());
            return Ok(());
        };

        // Direction check: visuals' backing elements must equal the
        // relationship's endpoints.
        let src_backing = source_vis.element.clone().ok_or_else(|| {
            EngineError::validation("connection endpoints must be element-backed visuals")
        })?;
        let tgt_backing = target_vis.element.clone().ok_or_else(|| {
            EngineError::validation("connection endpoints must be element-backed visuals")
        })?;
        if src_backing == rel_target && tgt_backing == rel_source && rel_source != rel_target {
            if !auto_swap {
                return Err(EngineError::DirectionMismatch {
                    relationship: rel_id,
                    operation_index: None,
                });
            }
            std::mem::swap(&mut source_vis, &mut target_vis);
        } else if !(src_backing == rel_source && tgt_backing == rel_target) {
            return Err(EngineError::validation(
                "visuals do not represent the relationship endpoints",
            ));
        }

        if skip_existing && self.connection_exists(&view, &rel_id, &source_vis.id, &target_vis.id) {
            let result = &mut self.results[i];
            result.skipped = Some(true);
            result.reason = Some("connection already exists".into());
            return Ok(());
        }

        let id = self.ids.next_id();
        self.units[i].commands.push(SubCommand::AddConnection {
            view: view.clone(),
            connection: VisualConnection {
                id: id.clone(),
                relationship: rel_id.clone(),
                source: source_vis.id.clone(),
                target: target_vis.id.clone(),
                bendpoints: Vec::new(),
                style: Default::default(),
            },
        });
        self.pending.connections.push(PendingConnection {
            view,
            id: id.clone(),
            relationship: rel_id,
            source: source_vis.id,
            target: target_vis.id,
        });
        let result = &mut self.results[i];
        result.connection_id = Some(id);
        if auto_resolved {
            result.auto_resolved = Some(true);
        }
        Ok(())
    }

    fn compile_free_visual(
        &mut self,
        i: usize,
        view_id: &str,
        body: VisualBody,
        bounds: Bounds,
        temp_id: Option<&str>,
        nestable: bool,
    ) -> Result<Id, EngineError> {
        let view = self
            .resolve_view_ref(view_id)
            .ok_or_else(|| EngineError::missing("view", view_id.to_string()))?;
        let id = self.ids.next_id();
        self.units[i].commands.push(SubCommand::InsertVisual {
            view: view.clone(),
            container: Container::Root,
            node: VisualNode::new(id.clone(), body, bounds),
        });
        self.pending.visuals.push(PendingVisual {
            view: view.clone(),
            id: id.clone(),
            element: None,
            container: Container::Root,
            bounds,
            nestable,
        });
        if let Some(t) = temp_id {
            self.temp.insert(
                t.to_string(),
                TempTarget::Visual {
                    view,
                    id: id.clone(),
                },
            );
        }
        Ok(id)
    }

    fn compile_delete(&mut self, i: usize, op: &Operation) -> Result<(), EngineError> {
        match op {
            Operation::DeleteElement { id, cascade } => {
                let (real_id, name, _) = self
                    .resolve_element_ref(id)
                    .ok_or_else(|| EngineError::missing("element", id.clone()))?;
                let cascade = cascade.unwrap_or(true);
                let commands = if cascade {
                    cascade::element_cascade(self.model, &self.pending, &real_id)
                } else {
                    vec![SubCommand::RemoveElement {
                        id: real_id.clone(),
                        removed: None,
                    }]
                };
                self.units[i].commands = commands;
                let result = &mut self.results[i];
                result.id = Some(real_id);
                result.name = Some(name);
                result.cascade = Some(cascade);
                Ok(())
            }
            Operation::DeleteRelationship { id } => {
                let (real_id, info) = self
                    .resolve_relationship_ref(id)
                    .ok_or_else(|| EngineError::missing("relationship", id.clone()))?;
                self.units[i].commands =
                    cascade::relationship_cascade(self.model, &self.pending, &real_id);
                let name = traversal::find_relationship(self.model, &real_id)
                    .map_or_else(|| info.kind.clone(), |r| r.name.clone());
                let result = &mut self.results[i];
                result.id = Some(real_id);
                result.name = Some(name);
                Ok(())
            }
            Operation::DeleteView { view_id } => {
                let real_id = self
                    .resolve_view_ref(view_id)
                    .ok_or_else(|| EngineError::missing("view", view_id.clone()))?;
                let name = traversal::find_view(self.model, &real_id)
                    .map(|v| v.name.clone())
                    .or_else(|| self.pending_views.get(&real_id).cloned())
                    .unwrap_or_default();
                self.units[i].commands.push(SubCommand::RemoveView {
                    id: real_id.clone(),
                    removed: None,
                });
                let result = &mut self.results[i];
                result.view_id = Some(real_id);
                result.view_name = Some(name);
                Ok(())
            }
            Operation::DeleteConnectionFromView {
                view_id,
                connection_id,
            } => {
                let view = self
                    .resolve_view_ref(view_id)
                    .ok_or_else(|| EngineError::missing("view", view_id.clone()))?;
                let committed = self
                    .model
                    .view(&view)
                    .and_then(|v| traversal::find_connection_in_view(v, connection_id))
                    .is_some();
                let pending = self
                    .pending
                    .connections
                    .iter()
                    .any(|c| c.view == view && c.id == *connection_id);
                if !committed && !pending {
                    return Err(EngineError::missing("connection", connection_id.clone()));
                }
                self.units[i].commands.push(SubCommand::RemoveConnection {
                    view,
                    id: connection_id.clone(),
                    removed: None,
                });
                self.results[i].connection_id = Some(connection_id.clone());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // Reference resolution. Temp-ids resolve first, then the committed model.

    fn resolve_property_owner(&self, r: &str) -> Result<(PropertyOwner, Id), EngineError> {
        if let Some((id, ..)) = self.resolve_element_ref(r) {
            return Ok((PropertyOwner::Element(id.clone()), id));
        }
        if let Some((id, _)) = self.resolve_relationship_ref(r) {
            return Ok((PropertyOwner::Relationship(id.clone()), id));
        }
        Err(EngineError::missing("element or relationship", r.to_string()))
    }

    fn resolve_element_ref(&self, r: &str) -> Option<(Id, String, String)> {
        if let Some(TempTarget::Element(id)) = self.temp.get(r) {
            if let Some((kind, name)) = self.pending_elements.get(id) {
                return Some((id.clone(), name.clone(), kind.clone()));
            }
            if let Some(e) = traversal::find_element(self.model, id) {
                return Some((e.id.clone(), e.name.clone(), e.kind.clone()));
            }
            return None;
        }
        traversal::find_element(self.model, r)
            .map(|e| (e.id.clone(), e.name.clone(), e.kind.clone()))
    }

    fn resolve_relationship_ref(&self, r: &str) -> Option<(Id, RelInfo)> {
        let lookup = |id: &str| -> Option<(Id, RelInfo)> {
            if let Some(info) = self.relationships.get(id) {
                return Some((id.to_string(), info.clone()));
            }
            let rel = traversal::find_relationship(self.model, id)?;
            let source_name = self
                .model
                .element(&rel.source)
                .map(|e| e.name.clone())
                .unwrap_or_default();
            let target_name = self
                .model
                .element(&rel.target)
                .map(|e| e.name.clone())
                .unwrap_or_default();
            Some((
                rel.id.clone(),
                RelInfo {
                    kind: rel.kind.clone(),
                    source: Endpoint {
                        id: rel.source.clone(),
                        name: source_name,
                    },
                    target: Endpoint {
                        id: rel.target.clone(),
                        name: target_name,
                    },
                },
            ))
        };
        if let Some(TempTarget::Relationship(id)) = self.temp.get(r) {
            return lookup(id);
        }
        lookup(r)
    }

    fn resolve_view_ref(&self, r: &str) -> Option<Id> {
        if let Some(TempTarget::View(id)) = self.temp.get(r) {
            return Some(id.clone());
        }
        if self.pending_views.contains_key(r) {
            return Some(r.to_string());
        }
        traversal::find_view(self.model, r).map(|v| v.id.clone())
    }

    fn resolve_visual_in_view(&self, view: &str, r: &str) -> Option<ResolvedVisual> {
        if let Some(TempTarget::Visual { view: v, id }) = self.temp.get(r) {
            if v == view {
                return self.pending_visual(view, id);
            }
            return None;
        }
        if let Some(found) = self.pending_visual(view, r) {
            return Some(found);
        }
        let node = self.model.view(view)?.node(r)?;
        Some(ResolvedVisual {
            id: node.id.clone(),
            element: node.concept().cloned(),
            nestable: node.can_contain(),
            bounds: node.bounds,
        })
    }

    fn pending_visual(&self, view: &str, id: &str) -> Option<ResolvedVisual> {
        self.pending
            .visuals
            .iter()
            .find(|p| p.view == view && p.id == id)
            .map(|p| ResolvedVisual {
                id: p.id.clone(),
                element: p.element.clone(),
                nestable: p.nestable,
                bounds: p.bounds,
            })
    }

    /// Same-plan visual index first, then the committed view tree.
    fn find_visual_for_element(&self, view: &str, element: &str) -> Option<ResolvedVisual> {
        if let Some(id) = self
            .visual_index
            .get(&(view.to_string(), element.to_string()))
        {
            return self.pending_visual(view, id);
        }
        let committed = self.model.view(view)?;
        traversal::find_visual_for_concept_in_view(committed, element).map(|node| ResolvedVisual {
            id: node.id.clone(),
            element: node.concept().cloned(),
            nestable: node.can_contain(),
            bounds: node.bounds,
        })
    }

    /// Locate a visual when the operation does not name its view.
    fn locate_visual(&self, r: &str) -> Option<(Id, ResolvedVisual)> {
        if let Some(TempTarget::Visual { view, id }) = self.temp.get(r) {
            return self.pending_visual(view, id).map(|v| (view.clone(), v));
        }
        if let Some(p) = self.pending.visuals.iter().find(|p| p.id == r) {
            return self
                .pending_visual(&p.view, &p.id)
                .map(|v| (p.view.clone(), v));
        }
        for view in traversal::find_all_views(self.model) {
            if let Some(node) = view.node(r) {
                return Some((
                    view.id.clone(),
                    ResolvedVisual {
                        id: node.id.clone(),
                        element: node.concept().cloned(),
                        nestable: node.can_contain(),
                        bounds: node.bounds,
                    },
                ));
            }
        }
        None
    }

    /// Locate a committed connection's view by connection id.
    fn locate_connection(&self, r: &str) -> Option<Id> {
        for view in traversal::find_all_views(self.model) {
            if traversal::find_connection_in_view(view, r).is_some() {
                return Some(view.id.clone());
            }
        }
        None
    }

    fn connection_exists(&self, view: &str, rel: &str, source: &str, target: &str) -> bool {
        if let Some(committed) = self.model.view(view) {
            let hit = traversal::find_connections_for_relationship(committed, rel)
                .into_iter()
                .any(|h| h.source == source && h.target == target);
            if hit {
                return true;
            }
        }
        self.pending.connections.iter().any(|c| {
            c.view == view && c.relationship == rel && c.source == source && c.target == target
        })
    }

    /// Folder resolution order: temp-id, then id, then name, then
    /// folder-kind token, then the router default.
    fn resolve_folder_token(&self, token: &str) -> Option<Id> {
        if let Some(TempTarget::Folder(id)) = self.temp.get(token) {
            return Some(id.clone());
        }
        if self.pending_folders.contains_key(token) || self.model.folder(token).is_some() {
            return Some(token.to_string());
        }
        if let Some(folder) = traversal::find_folder_by_name(self.model, token) {
            return Some(folder.id.clone());
        }
        let lowered = token.to_lowercase();
        if let Some((id, _)) = self
            .pending_folders
            .iter()
            .find(|(_, (_, name))| name.to_lowercase() == lowered)
        {
            return Some(id.clone());
        }
        if let Some(kind) = FolderKind::parse(token) {
            return traversal::find_folder_by_kind(self.model, kind).map(|f| f.id.clone());
        }
        None
    }

    fn resolve_folder_spec(
        &self,
        token: Option<&str>,
        parent_type: Option<&str>,
        parent_name: Option<&str>,
        default_kind: Option<FolderKind>,
    ) -> Result<Id, EngineError> {
        if let Some(t) = token {
            return self
                .resolve_folder_token(t)
                .ok_or_else(|| EngineError::missing("folder", t.to_string()));
        }
        if let Some(pt) = parent_type {
            let kind = FolderKind::parse(pt)
                .ok_or_else(|| EngineError::missing("folder", pt.to_string()))?;
            return traversal::find_folder_by_kind(self.model, kind)
                .map(|f| f.id.clone())
                .ok_or_else(|| EngineError::missing("folder", pt.to_string()));
        }
        if let Some(pn) = parent_name {
            return self
                .resolve_folder_token(pn)
                .ok_or_else(|| EngineError::missing("folder", pn.to_string()));
        }
        if let Some(kind) = default_kind {
            return traversal::find_folder_by_kind(self.model, kind)
                .map(|f| f.id.clone())
                .ok_or_else(|| EngineError::validation(format!("model has no {kind:?} folder")));
        }
        Err(EngineError::missing("folder", "<unspecified>"))
    }

    fn folder_kind_of(&self, id: &str) -> Result<FolderKind, EngineError> {
        if let Some((kind, _)) = self.pending_folders.get(id) {
            return Ok(*kind);
        }
        self.model
            .folder(id)
            .map(|f| f.kind)
            .ok_or_else(|| EngineError::missing("folder", id.to_string()))
    }
}

fn merge_bounds(
    base: Bounds,
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
) -> Bounds {
    Bounds {
        x: x.map_or(base.x, |v| v as i32),
        y: y.map_or(base.y, |v| v as i32),
        width: width.map_or(base.width, |v| v as i32),
        height: height.map_or(base.height, |v| v as i32),
    }
}
