//! Atomic sub-commands: one apply/revert pair per mutation.
//!
//! Applying a sub-command transforms the model from state S to S';
//! reverting restores S exactly. Owning containers are resolved lazily at
//! apply/revert time, never captured at build time, because earlier
//! sub-commands in the same transaction may not yet have installed the
//! parent. A failure inside apply or revert is fatal for the transaction
//! and surfaces as a host error.

use anyhow::{anyhow, bail, Result};

use crate::model::{
    AccessType, Bounds, Container, Element, Folder, Id, InfluenceStrength, Model, Point,
    Property, Relationship, RouterKind, View, VisualConnection, VisualNode,
};

/// A sequence of sub-commands dispatched to the command stack as one
/// undoable transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub label: String,
    pub commands: Vec<SubCommand>,
}

impl Transaction {
    pub fn new(label: impl Into<String>, commands: Vec<SubCommand>) -> Self {
        Self {
            label: label.into(),
            commands,
        }
    }
}

/// Owner of a property list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyOwner {
    Element(Id),
    Relationship(Id),
}

/// Addressable scalar style field of a visual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStyleField {
    FillColor,
    LineColor,
    FontColor,
    Font,
    Opacity,
}

/// Addressable scalar style field of a visual connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStyleField {
    LineColor,
    LineWidth,
    FontColor,
    TextPosition,
}

/// A scalar style value. Colour and font fields carry strings, opacity /
/// line width / text position carry small integers. `None` clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleValue {
    Text(Option<String>),
    Number(Option<u8>),
}

/// Memory of a removed visual subtree, for exact restore.
#[derive(Debug, Clone)]
pub struct RemovedVisual {
    container: Container,
    index: usize,
    /// The removed node and every descendant record.
    nodes: Vec<VisualNode>,
}

/// Memory of a removed connection (record plus both list positions).
#[derive(Debug, Clone)]
pub struct RemovedConnection {
    source: Id,
    source_index: usize,
    target: Id,
    target_index: usize,
    connection: VisualConnection,
}

/// The atomic mutation set. Labels group into the five user-visible
/// sub-command kinds.
#[derive(Debug, Clone)]
pub enum SubCommand {
    // set-scalar-feature
    SetElementName {
        id: Id,
        value: String,
        old: Option<String>,
    },
    SetElementDocumentation {
        id: Id,
        value: String,
        old: Option<String>,
    },
    SetRelationshipName {
        id: Id,
        value: String,
        old: Option<String>,
    },
    SetRelationshipDocumentation {
        id: Id,
        value: String,
        old: Option<String>,
    },
    SetRelationshipEndpoints {
        id: Id,
        source: Id,
        target: Id,
        old: Option<(Id, Id)>,
    },
    SetRelationshipAccessType {
        id: Id,
        value: Option<AccessType>,
        old: Option<Option<AccessType>>,
    },
    SetRelationshipStrength {
        id: Id,
        value: Option<InfluenceStrength>,
        old: Option<Option<InfluenceStrength>>,
    },
    SetProperty {
        owner: PropertyOwner,
        key: String,
        value: String,
        /// `Some(Some(v))` - updated an existing property that held `v`;
        /// `Some(None)` - appended a new property.
        old: Option<Option<String>>,
    },
    SetViewName {
        id: Id,
        value: String,
        old: Option<String>,
    },
    SetViewRouter {
        id: Id,
        value: RouterKind,
        old: Option<RouterKind>,
    },
    SetNodeStyleField {
        view: Id,
        visual: Id,
        field: NodeStyleField,
        value: StyleValue,
        old: Option<StyleValue>,
    },
    SetConnectionStyleField {
        view: Id,
        connection: Id,
        field: ConnectionStyleField,
        value: StyleValue,
        old: Option<StyleValue>,
    },
    ClearBendpoints {
        view: Id,
        connection: Id,
        old: Option<Vec<Point>>,
    },

    // set-bounds
    SetBounds {
        view: Id,
        visual: Id,
        bounds: Bounds,
        old: Option<Bounds>,
    },

    // add-to-ordered-list
    InsertElement {
        folder: Id,
        element: Element,
    },
    InsertRelationship {
        folder: Id,
        relationship: Relationship,
    },
    InsertFolder {
        parent: Id,
        folder: Folder,
    },
    InsertView {
        folder: Id,
        view: View,
    },
    InsertVisual {
        view: Id,
        container: Container,
        node: VisualNode,
    },
    AddConnection {
        view: Id,
        connection: VisualConnection,
    },
    MoveItemToFolder {
        id: Id,
        folder: Id,
        old: Option<(Id, usize)>,
    },

    // remove-from-ordered-list
    RemoveElement {
        id: Id,
        removed: Option<(Id, usize, Element)>,
    },
    RemoveRelationship {
        id: Id,
        removed: Option<(Id, usize, Relationship)>,
    },
    RemoveView {
        id: Id,
        removed: Option<(Id, usize, View)>,
    },
    RemoveVisual {
        view: Id,
        id: Id,
        removed: Option<RemovedVisual>,
    },
    RemoveConnection {
        view: Id,
        id: Id,
        removed: Option<RemovedConnection>,
    },

    // replace-bounds (atomic re-parent)
    MoveVisual {
        view: Id,
        visual: Id,
        container: Container,
        bounds: Bounds,
        old: Option<(Container, usize, Bounds)>,
    },
}

impl SubCommand {
    /// User-visible sub-command kind label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetElementName { .. }
            | Self::SetElementDocumentation { .. }
            | Self::SetRelationshipName { .. }
            | Self::SetRelationshipDocumentation { .. }
            | Self::SetRelationshipEndpoints { .. }
            | Self::SetRelationshipAccessType { .. }
            | Self::SetRelationshipStrength { .. }
            | Self::SetProperty { .. }
            | Self::SetViewName { .. }
            | Self::SetViewRouter { .. }
            | Self::SetNodeStyleField { .. }
            | Self::SetConnectionStyleField { .. }
            | Self::ClearBendpoints { .. } => "set-scalar-feature",
            Self::SetBounds { .. } => "set-bounds",
            Self::InsertElement { .. }
            | Self::InsertRelationship { .. }
            | Self::InsertFolder { .. }
            | Self::InsertView { .. }
            | Self::InsertVisual { .. }
            | Self::AddConnection { .. }
            | Self::MoveItemToFolder { .. } => "add-to-ordered-list",
            Self::RemoveElement { .. }
            | Self::RemoveRelationship { .. }
            | Self::RemoveView { .. }
            | Self::RemoveVisual { .. }
            | Self::RemoveConnection { .. } => "remove-from-ordered-list",
            Self::MoveVisual { .. } => "replace-bounds",
        }
    }

    /// Apply this sub-command, remembering whatever revert needs.
    pub fn apply(&mut self, model: &mut Model) -> Result<()> {
        match self {
            Self::SetElementName { id, value, old } => {
                let e = element_mut(model, id)?;
                *old = Some(std::mem::replace(&mut e.name, value.clone()));
            }
            Self::SetElementDocumentation { id, value, old } => {
                let e = element_mut(model, id)?;
                *old = Some(std::mem::replace(&mut e.documentation, value.clone()));
            }
            Self::SetRelationshipName { id, value, old } => {
                let r = relationship_mut(model, id)?;
                *old = Some(std::mem::replace(&mut r.name, value.clone()));
            }
            Self::SetRelationshipDocumentation { id, value, old } => {
                let r = relationship_mut(model, id)?;
                *old = Some(std::mem::replace(&mut r.documentation, value.clone()));
            }
            Self::SetRelationshipEndpoints {
                id,
                source,
                target,
                old,
            } => {
                let r = relationship_mut(model, id)?;
                *old = Some((r.source.clone(), r.target.clone()));
                r.source = source.clone();
                r.target = target.clone();
            }
            Self::SetRelationshipAccessType { id, value, old } => {
                let r = relationship_mut(model, id)?;
                *old = Some(std::mem::replace(&mut r.access_type, *value));
            }
            Self::SetRelationshipStrength { id, value, old } => {
                let r = relationship_mut(model, id)?;
                *old = Some(std::mem::replace(&mut r.strength, *value));
            }
            Self::SetProperty {
                owner,
                key,
                value,
                old,
            } => {
                let properties = properties_mut(model, owner)?;
                match properties.iter_mut().find(|p| p.key == *key) {
                    Some(p) => {
                        *old = Some(Some(std::mem::replace(&mut p.value, value.clone())));
                    }
                    None => {
                        properties.push(Property {
                            key: key.clone(),
                            value: value.clone(),
                        });
                        *old = Some(None);
                    }
                }
            }
            Self::SetViewName { id, value, old } => {
                let v = view_mut(model, id)?;
                *old = Some(std::mem::replace(&mut v.name, value.clone()));
            }
            Self::SetViewRouter { id, value, old } => {
                let v = view_mut(model, id)?;
                *old = Some(std::mem::replace(&mut v.router, *value));
            }
            Self::SetNodeStyleField {
                view,
                visual,
                field,
                value,
                old,
            } => {
                let node = node_mut(model, view, visual)?;
                *old = Some(write_node_style(node, *field, value.clone())?);
            }
            Self::SetConnectionStyleField {
                view,
                connection,
                field,
                value,
                old,
            } => {
                let conn = connection_mut(model, view, connection)?;
                *old = Some(write_connection_style(conn, *field, value.clone())?);
            }
            Self::ClearBendpoints {
                view,
                connection,
                old,
            } => {
                let conn = connection_mut(model, view, connection)?;
                *old = Some(std::mem::take(&mut conn.bendpoints));
            }
            Self::SetBounds {
                view,
                visual,
                bounds,
                old,
            } => {
                let node = node_mut(model, view, visual)?;
                *old = Some(std::mem::replace(&mut node.bounds, *bounds));
            }
            Self::InsertElement { folder, element } => {
                if model.element(&element.id).is_some() {
                    bail!("element '{}' already exists", element.id);
                }
                let id = element.id.clone();
                model.insert_element_record(element.clone());
                folder_mut(model, folder)?.items.push(id);
            }
            Self::InsertRelationship {
                folder,
                relationship,
            } => {
                if model.relationship(&relationship.id).is_some() {
                    bail!("relationship '{}' already exists", relationship.id);
                }
                let id = relationship.id.clone();
                model.insert_relationship_record(relationship.clone());
                folder_mut(model, folder)?.items.push(id);
            }
            Self::InsertFolder { parent, folder } => {
                if model.folder(&folder.id).is_some() {
                    bail!("folder '{}' already exists", folder.id);
                }
                let id = folder.id.clone();
                model.insert_folder_record(folder.clone());
                folder_mut(model, parent)?.folders.push(id);
            }
            Self::InsertView { folder, view } => {
                if model.view(&view.id).is_some() {
                    bail!("view '{}' already exists", view.id);
                }
                let id = view.id.clone();
                model.insert_view_record(view.clone());
                folder_mut(model, folder)?.items.push(id);
            }
            Self::InsertVisual {
                view,
                container,
                node,
            } => {
                let v = view_mut(model, view)?;
                if v.node(&node.id).is_some() {
                    bail!("visual '{}' already exists in view '{view}'", node.id);
                }
                let id = node.id.clone();
                v.insert_node(node.clone());
                v.container_children_mut(container)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?
                    .push(id);
            }
            Self::AddConnection { view, connection } => {
                let conn = connection.clone();
                let v = view_mut(model, view)?;
                let source = v
                    .node_mut(&conn.source)
                    .ok_or_else(|| anyhow!("source visual '{}' not found", conn.source))?;
                source.source_connections.push(conn.clone());
                let target = v
                    .node_mut(&conn.target)
                    .ok_or_else(|| anyhow!("target visual '{}' not found", conn.target))?;
                target.target_connections.push(conn.id);
            }
            Self::MoveItemToFolder { id, folder, old } => {
                let (from, index) = detach_item(model, id)?;
                *old = Some((from, index));
                folder_mut(model, folder)?.items.push(id.clone());
            }
            Self::RemoveElement { id, removed } => {
                let (folder, index) = detach_item(model, id)?;
                let record = model
                    .take_element_record(id)
                    .ok_or_else(|| anyhow!("element '{id}' missing from store"))?;
                *removed = Some((folder, index, record));
            }
            Self::RemoveRelationship { id, removed } => {
                let (folder, index) = detach_item(model, id)?;
                let record = model
                    .take_relationship_record(id)
                    .ok_or_else(|| anyhow!("relationship '{id}' missing from store"))?;
                *removed = Some((folder, index, record));
            }
            Self::RemoveView { id, removed } => {
                let (folder, index) = detach_item(model, id)?;
                let record = model
                    .take_view_record(id)
                    .ok_or_else(|| anyhow!("view '{id}' missing from store"))?;
                *removed = Some((folder, index, record));
            }
            Self::RemoveVisual { view, id, removed } => {
                let v = view_mut(model, view)?;
                let container = v
                    .parent_of(id)
                    .ok_or_else(|| anyhow!("visual '{id}' not found in view '{view}'"))?;
                let children = v
                    .container_children_mut(&container)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?;
                let index = remove_id(children, id)?;
                let nodes = take_subtree(v, id)?;
                *removed = Some(RemovedVisual {
                    container,
                    index,
                    nodes,
                });
            }
            Self::RemoveConnection { view, id, removed } => {
                *removed = Some(detach_connection(view_mut(model, view)?, id)?);
            }
            Self::MoveVisual {
                view,
                visual,
                container,
                bounds,
                old,
            } => {
                let v = view_mut(model, view)?;
                let from = v
                    .parent_of(visual)
                    .ok_or_else(|| anyhow!("visual '{visual}' not found in view '{view}'"))?;
                let from_children = v
                    .container_children_mut(&from)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?;
                let index = remove_id(from_children, visual)?;
                v.container_children_mut(container)
                    .ok_or_else(|| anyhow!("target container not found in view '{view}'"))?
                    .push(visual.clone());
                let node = v
                    .node_mut(visual)
                    .ok_or_else(|| anyhow!("visual '{visual}' missing from view '{view}'"))?;
                let old_bounds = std::mem::replace(&mut node.bounds, *bounds);
                *old = Some((from, index, old_bounds));
            }
        }
        Ok(())
    }

    /// Revert this sub-command, restoring the state its apply observed.
    pub fn revert(&mut self, model: &mut Model) -> Result<()> {
        match self {
            Self::SetElementName { id, old, .. } => {
                let value = taken(old)?;
                element_mut(model, id)?.name = value;
            }
            Self::SetElementDocumentation { id, old, .. } => {
                let value = taken(old)?;
                element_mut(model, id)?.documentation = value;
            }
            Self::SetRelationshipName { id, old, .. } => {
                let value = taken(old)?;
                relationship_mut(model, id)?.name = value;
            }
            Self::SetRelationshipDocumentation { id, old, .. } => {
                let value = taken(old)?;
                relationship_mut(model, id)?.documentation = value;
            }
            Self::SetRelationshipEndpoints { id, old, .. } => {
                let (source, target) = taken(old)?;
                let r = relationship_mut(model, id)?;
                r.source = source;
                r.target = target;
            }
            Self::SetRelationshipAccessType { id, old, .. } => {
                let value = taken(old)?;
                relationship_mut(model, id)?.access_type = value;
            }
            Self::SetRelationshipStrength { id, old, .. } => {
                let value = taken(old)?;
                relationship_mut(model, id)?.strength = value;
            }
            Self::SetProperty {
                owner, key, old, ..
            } => {
                let prior = taken(old)?;
                let properties = properties_mut(model, owner)?;
                match prior {
                    Some(value) => {
                        let p = properties
                            .iter_mut()
                            .find(|p| p.key == *key)
                            .ok_or_else(|| anyhow!("property '{key}' vanished"))?;
                        p.value = value;
                    }
                    None => {
                        let index = properties
                            .iter()
                            .rposition(|p| p.key == *key)
                            .ok_or_else(|| anyhow!("property '{key}' vanished"))?;
                        properties.remove(index);
                    }
                }
            }
            Self::SetViewName { id, old, .. } => {
                let value = taken(old)?;
                view_mut(model, id)?.name = value;
            }
            Self::SetViewRouter { id, old, .. } => {
                let value = taken(old)?;
                view_mut(model, id)?.router = value;
            }
            Self::SetNodeStyleField {
                view,
                visual,
                field,
                old,
                ..
            } => {
                let value = taken(old)?;
                let node = node_mut(model, view, visual)?;
                write_node_style(node, *field, value)?;
            }
            Self::SetConnectionStyleField {
                view,
                connection,
                field,
                old,
                ..
            } => {
                let value = taken(old)?;
                let conn = connection_mut(model, view, connection)?;
                write_connection_style(conn, *field, value)?;
            }
            Self::ClearBendpoints {
                view,
                connection,
                old,
            } => {
                let value = taken(old)?;
                connection_mut(model, view, connection)?.bendpoints = value;
            }
            Self::SetBounds {
                view, visual, old, ..
            } => {
                let value = taken(old)?;
                node_mut(model, view, visual)?.bounds = value;
            }
            Self::InsertElement { folder, element } => {
                let folder = folder.clone();
                let id = element.id.clone();
                remove_id(&mut folder_mut(model, &folder)?.items, &id)?;
                model.take_element_record(&id);
            }
            Self::InsertRelationship {
                folder,
                relationship,
            } => {
                let folder = folder.clone();
                let id = relationship.id.clone();
                remove_id(&mut folder_mut(model, &folder)?.items, &id)?;
                model.take_relationship_record(&id);
            }
            Self::InsertFolder { parent, folder } => {
                let parent = parent.clone();
                let id = folder.id.clone();
                remove_id(&mut folder_mut(model, &parent)?.folders, &id)?;
                model.take_folder_record(&id);
            }
            Self::InsertView { folder, view } => {
                let folder = folder.clone();
                let id = view.id.clone();
                remove_id(&mut folder_mut(model, &folder)?.items, &id)?;
                model.take_view_record(&id);
            }
            Self::InsertVisual {
                view,
                container,
                node,
            } => {
                let v = view_mut(model, view)?;
                let children = v
                    .container_children_mut(container)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?;
                remove_id(children, &node.id)?;
                v.take_node(&node.id);
            }
            Self::AddConnection { view, connection } => {
                let id = connection.id.clone();
                detach_connection(view_mut(model, view)?, &id)?;
            }
            Self::MoveItemToFolder { id, folder, old } => {
                let (from, index) = taken(old)?;
                remove_id(&mut folder_mut(model, folder)?.items, id)?;
                let from_folder = folder_mut(model, &from)?;
                from_folder.items.insert(index.min(from_folder.items.len()), id.clone());
            }
            Self::RemoveElement { removed, .. } => {
                let (folder, index, record) = taken(removed)?;
                let id = record.id.clone();
                model.insert_element_record(record);
                let f = folder_mut(model, &folder)?;
                f.items.insert(index.min(f.items.len()), id);
            }
            Self::RemoveRelationship { removed, .. } => {
                let (folder, index, record) = taken(removed)?;
                let id = record.id.clone();
                model.insert_relationship_record(record);
                let f = folder_mut(model, &folder)?;
                f.items.insert(index.min(f.items.len()), id);
            }
            Self::RemoveView { removed, .. } => {
                let (folder, index, record) = taken(removed)?;
                let id = record.id.clone();
                model.insert_view_record(record);
                let f = folder_mut(model, &folder)?;
                f.items.insert(index.min(f.items.len()), id);
            }
            Self::RemoveVisual { view, id, removed } => {
                let RemovedVisual {
                    container,
                    index,
                    nodes,
                } = taken(removed)?;
                let v = view_mut(model, view)?;
                for node in nodes {
                    v.insert_node(node);
                }
                let children = v
                    .container_children_mut(&container)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?;
                children.insert(index.min(children.len()), id.clone());
            }
            Self::RemoveConnection { view, removed, .. } => {
                let RemovedConnection {
                    source,
                    source_index,
                    target,
                    target_index,
                    connection,
                } = taken(removed)?;
                let v = view_mut(model, view)?;
                let conn_id = connection.id.clone();
                let src = v
                    .node_mut(&source)
                    .ok_or_else(|| anyhow!("source visual '{source}' not found"))?;
                src.source_connections
                    .insert(source_index.min(src.source_connections.len()), connection);
                let tgt = v
                    .node_mut(&target)
                    .ok_or_else(|| anyhow!("target visual '{target}' not found"))?;
                tgt.target_connections
                    .insert(target_index.min(tgt.target_connections.len()), conn_id);
            }
            Self::MoveVisual {
                view, visual, old, ..
            } => {
                let (from, index, bounds) = taken(old)?;
                let v = view_mut(model, view)?;
                let current = v
                    .parent_of(visual)
                    .ok_or_else(|| anyhow!("visual '{visual}' not found in view '{view}'"))?;
                let children = v
                    .container_children_mut(&current)
                    .ok_or_else(|| anyhow!("container not found in view '{view}'"))?;
                remove_id(children, visual)?;
                let original = v
                    .container_children_mut(&from)
                    .ok_or_else(|| anyhow!("original container not found in view '{view}'"))?;
                original.insert(index.min(original.len()), visual.clone());
                let node = v
                    .node_mut(visual)
                    .ok_or_else(|| anyhow!("visual '{visual}' missing from view '{view}'"))?;
                node.bounds = bounds;
            }
        }
        Ok(())
    }
}

// Lazy resolution helpers

fn taken<T>(slot: &mut Option<T>) -> Result<T> {
    slot.take()
        .ok_or_else(|| anyhow!("revert without a prior apply"))
}

fn element_mut<'a>(model: &'a mut Model, id: &str) -> Result<&'a mut Element> {
    model
        .element_mut(id)
        .ok_or_else(|| anyhow!("element '{id}' not found"))
}

fn relationship_mut<'a>(model: &'a mut Model, id: &str) -> Result<&'a mut Relationship> {
    model
        .relationship_mut(id)
        .ok_or_else(|| anyhow!("relationship '{id}' not found"))
}

fn view_mut<'a>(model: &'a mut Model, id: &str) -> Result<&'a mut View> {
    model
        .view_mut(id)
        .ok_or_else(|| anyhow!("view '{id}' not found"))
}

fn folder_mut<'a>(model: &'a mut Model, id: &str) -> Result<&'a mut Folder> {
    model
        .folder_mut(id)
        .ok_or_else(|| anyhow!("folder '{id}' not found"))
}

fn node_mut<'a>(model: &'a mut Model, view: &str, visual: &str) -> Result<&'a mut VisualNode> {
    view_mut(model, view)?
        .node_mut(visual)
        .ok_or_else(|| anyhow!("visual '{visual}' not found in view '{view}'"))
}

fn connection_mut<'a>(
    model: &'a mut Model,
    view: &str,
    connection: &str,
) -> Result<&'a mut VisualConnection> {
    let v = view_mut(model, view)?;
    let owner = v
        .node_ids()
        .find(|id| {
            v.node(id)
                .is_some_and(|n| n.source_connections.iter().any(|c| c.id == connection))
        })
        .cloned()
        .ok_or_else(|| anyhow!("connection '{connection}' not found in view '{view}'"))?;
    let node = v
        .node_mut(&owner)
        .ok_or_else(|| anyhow!("visual '{owner}' vanished"))?;
    node.source_connections
        .iter_mut()
        .find(|c| c.id == connection)
        .ok_or_else(|| anyhow!("connection '{connection}' vanished"))
}

fn properties_mut<'a>(model: &'a mut Model, owner: &PropertyOwner) -> Result<&'a mut Vec<Property>> {
    match owner {
        PropertyOwner::Element(id) => Ok(&mut element_mut(model, id)?.properties),
        PropertyOwner::Relationship(id) => Ok(&mut relationship_mut(model, id)?.properties),
    }
}

fn remove_id(list: &mut Vec<Id>, id: &str) -> Result<usize> {
    let index = list
        .iter()
        .position(|x| x == id)
        .ok_or_else(|| anyhow!("'{id}' not present in ordered list"))?;
    list.remove(index);
    Ok(index)
}

/// Detach an item id from whichever folder holds it, remembering position.
fn detach_item(model: &mut Model, id: &str) -> Result<(Id, usize)> {
    let folder_id = model
        .parent_folder_of(id)
        .map(|f| f.id.clone())
        .ok_or_else(|| anyhow!("'{id}' is not contained in any folder"))?;
    let folder = folder_mut(model, &folder_id)?;
    let index = remove_id(&mut folder.items, id)?;
    Ok((folder_id, index))
}

/// Remove a node and its whole subtree from the view's node store.
fn take_subtree(view: &mut View, root: &str) -> Result<Vec<VisualNode>> {
    let mut out = Vec::new();
    let mut queue = vec![root.to_string()];
    while let Some(id) = queue.pop() {
        let node = view
            .take_node(&id)
            .ok_or_else(|| anyhow!("visual '{id}' missing from view"))?;
        queue.extend(node.children.iter().cloned());
        out.push(node);
    }
    Ok(out)
}

/// Remove a connection from both its source out-list and target in-list.
fn detach_connection(view: &mut View, id: &str) -> Result<RemovedConnection> {
    let owner = view
        .node_ids()
        .find(|nid| {
            view.node(nid)
                .is_some_and(|n| n.source_connections.iter().any(|c| c.id == id))
        })
        .cloned()
        .ok_or_else(|| anyhow!("connection '{id}' not found"))?;
    let source_node = view
        .node_mut(&owner)
        .ok_or_else(|| anyhow!("visual '{owner}' vanished"))?;
    let source_index = source_node
        .source_connections
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| anyhow!("connection '{id}' vanished"))?;
    let connection = source_node.source_connections.remove(source_index);
    let target = connection.target.clone();
    let target_node = view
        .node_mut(&target)
        .ok_or_else(|| anyhow!("target visual '{target}' not found"))?;
    let target_index = target_node
        .target_connections
        .iter()
        .position(|c| c == id)
        .ok_or_else(|| anyhow!("back-reference for connection '{id}' missing"))?;
    target_node.target_connections.remove(target_index);
    Ok(RemovedConnection {
        source: owner,
        source_index,
        target,
        target_index,
        connection,
    })
}

fn write_node_style(
    node: &mut VisualNode,
    field: NodeStyleField,
    value: StyleValue,
) -> Result<StyleValue> {
    match (field, value) {
        (NodeStyleField::FillColor, StyleValue::Text(v)) => Ok(StyleValue::Text(
            std::mem::replace(&mut node.style.fill_color, v),
        )),
        (NodeStyleField::LineColor, StyleValue::Text(v)) => Ok(StyleValue::Text(
            std::mem::replace(&mut node.style.line_color, v),
        )),
        (NodeStyleField::FontColor, StyleValue::Text(v)) => Ok(StyleValue::Text(
            std::mem::replace(&mut node.style.font_color, v),
        )),
        (NodeStyleField::Font, StyleValue::Text(v)) => {
            Ok(StyleValue::Text(std::mem::replace(&mut node.style.font, v)))
        }
        (NodeStyleField::Opacity, StyleValue::Number(v)) => Ok(StyleValue::Number(
            std::mem::replace(&mut node.style.opacity, v),
        )),
        (field, value) => bail!("style value {value:?} does not fit field {field:?}"),
    }
}

fn write_connection_style(
    conn: &mut VisualConnection,
    field: ConnectionStyleField,
    value: StyleValue,
) -> Result<StyleValue> {
    match (field, value) {
        (ConnectionStyleField::LineColor, StyleValue::Text(v)) => Ok(StyleValue::Text(
            std::mem::replace(&mut conn.style.line_color, v),
        )),
        (ConnectionStyleField::FontColor, StyleValue::Text(v)) => Ok(StyleValue::Text(
            std::mem::replace(&mut conn.style.font_color, v),
        )),
        (ConnectionStyleField::LineWidth, StyleValue::Number(v)) => Ok(StyleValue::Number(
            std::mem::replace(&mut conn.style.line_width, v),
        )),
        (ConnectionStyleField::TextPosition, StyleValue::Number(v)) => Ok(StyleValue::Number(
            std::mem::replace(&mut conn.style.text_position, v),
        )),
        (field, value) => bail!("style value {value:?} does not fit field {field:?}"),
    }
}
