//! Cascade planning: the transitive closure of sub-commands implied by a
//! cascading delete.
//!
//! Deleting an element removes every incident relationship, every visual
//! connection representing those relationships in every view, every visual
//! backed by the element, and every connection attached to those visuals or
//! their nested children. The closure is computed over the committed model
//! via the traversal primitives, plus the plan's own pending creations so
//! that create-then-delete composes within one plan.

use std::collections::BTreeSet;

use super::subcommand::SubCommand;
use crate::model::{traversal, Container, Id, Model};

/// Entities the current plan creates, visible to cascade planning before
/// they are committed.
#[derive(Debug, Default)]
pub(crate) struct PendingState {
    pub relationships: Vec<PendingRelationship>,
    pub visuals: Vec<PendingVisual>,
    pub connections: Vec<PendingConnection>,
}

#[derive(Debug)]
pub(crate) struct PendingRelationship {
    pub id: Id,
    pub source: Id,
    pub target: Id,
}

#[derive(Debug)]
pub(crate) struct PendingVisual {
    pub view: Id,
    pub id: Id,
    /// Backing element, if the visual represents one.
    pub element: Option<Id>,
    pub container: Container,
    pub bounds: crate::model::Bounds,
    /// Whether the visual may contain nested children (notes may not).
    pub nestable: bool,
}

#[derive(Debug)]
pub(crate) struct PendingConnection {
    pub view: Id,
    pub id: Id,
    pub relationship: Id,
    pub source: Id,
    pub target: Id,
}

/// Sub-commands removing element `element_id` and its full closure.
pub(crate) fn element_cascade(
    model: &Model,
    pending: &PendingState,
    element_id: &str,
) -> Vec<SubCommand> {
    let mut relationship_ids: Vec<Id> = Vec::new();
    for (rel, _) in traversal::find_relationships_for_element(model, element_id) {
        relationship_ids.push(rel.id.clone());
    }
    for rel in &pending.relationships {
        if rel.source == element_id || rel.target == element_id {
            relationship_ids.push(rel.id.clone());
        }
    }
    dedup_in_place(&mut relationship_ids);

    // (view, visual) pairs backed by the element, committed and pending.
    let mut visuals: Vec<(Id, Id)> = Vec::new();
    for view in traversal::find_all_views(model) {
        for (node, _) in traversal::find_visuals_for_element(view, element_id) {
            visuals.push((view.id.clone(), node.id.clone()));
        }
    }
    for visual in &pending.visuals {
        if visual.element.as_deref() == Some(element_id) {
            visuals.push((visual.view.clone(), visual.id.clone()));
        }
    }

    let mut commands = Vec::new();
    let mut removed_connections: BTreeSet<Id> = BTreeSet::new();

    // Connections of the incident relationships, across every view.
    for rel_id in &relationship_ids {
        push_connection_removals(model, pending, rel_id, &mut removed_connections, &mut commands);
    }

    // Connections attached to the element's visuals (or their subtrees).
    for (view_id, visual_id) in &visuals {
        push_visual_connection_removals(
            model,
            pending,
            view_id,
            visual_id,
            &mut removed_connections,
            &mut commands,
        );
    }

    for (view_id, visual_id) in &visuals {
        commands.push(SubCommand::RemoveVisual {
            view: view_id.clone(),
            id: visual_id.clone(),
            removed: None,
        });
    }
    for rel_id in &relationship_ids {
        commands.push(SubCommand::RemoveRelationship {
            id: rel_id.clone(),
            removed: None,
        });
    }
    commands.push(SubCommand::RemoveElement {
        id: element_id.to_string(),
        removed: None,
    });
    commands
}

/// Sub-commands removing relationship `rel_id` and every connection
/// representing it.
pub(crate) fn relationship_cascade(
    model: &Model,
    pending: &PendingState,
    rel_id: &str,
) -> Vec<SubCommand> {
    let mut commands = Vec::new();
    let mut removed: BTreeSet<Id> = BTreeSet::new();
    push_connection_removals(model, pending, rel_id, &mut removed, &mut commands);
    commands.push(SubCommand::RemoveRelationship {
        id: rel_id.to_string(),
        removed: None,
    });
    commands
}

/// Remove every connection representing `rel_id`, in every view.
fn push_connection_removals(
    model: &Model,
    pending: &PendingState,
    rel_id: &str,
    removed: &mut BTreeSet<Id>,
    commands: &mut Vec<SubCommand>,
) {
    for view in traversal::find_all_views(model) {
        for hit in traversal::find_connections_for_relationship(view, rel_id) {
            if removed.insert(hit.connection.id.clone()) {
                commands.push(SubCommand::RemoveConnection {
                    view: view.id.clone(),
                    id: hit.connection.id.clone(),
                    removed: None,
                });
            }
        }
    }
    for conn in &pending.connections {
        if conn.relationship == rel_id && removed.insert(conn.id.clone()) {
            commands.push(SubCommand::RemoveConnection {
                view: conn.view.clone(),
                id: conn.id.clone(),
                removed: None,
            });
        }
    }
}

/// Remove every connection attached to `visual_id` or a node nested
/// beneath it.
fn push_visual_connection_removals(
    model: &Model,
    pending: &PendingState,
    view_id: &str,
    visual_id: &str,
    removed: &mut BTreeSet<Id>,
    commands: &mut Vec<SubCommand>,
) {
    if let Some(view) = model.view(view_id) {
        // The visual and its whole subtree: removing a container removes its
        // nested children, so their connections must go too.
        let mut subtree: Vec<Id> = vec![visual_id.to_string()];
        let mut i = 0;
        while i < subtree.len() {
            if let Some(node) = view.node(&subtree[i]) {
                subtree.extend(node.children.iter().cloned());
            }
            i += 1;
        }
        for member in &subtree {
            for hit in traversal::find_connections_for_visual(view, member) {
                if removed.insert(hit.connection.id.clone()) {
                    commands.push(SubCommand::RemoveConnection {
                        view: view_id.to_string(),
                        id: hit.connection.id.clone(),
                        removed: None,
                    });
                }
            }
        }
    }
    for conn in &pending.connections {
        if conn.view == view_id
            && (conn.source == visual_id || conn.target == visual_id)
            && removed.insert(conn.id.clone())
        {
            commands.push(SubCommand::RemoveConnection {
                view: conn.view.clone(),
                id: conn.id.clone(),
                removed: None,
            });
        }
    }
}

fn dedup_in_place(ids: &mut Vec<Id>) {
    let mut seen = BTreeSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::subcommand::SubCommand;
    use crate::model::{Bounds, Element, Model, Relationship, View, VisualBody, VisualConnection, VisualNode};
    use crate::registry::FolderKind;

    /// Elements A and B, relationship R: A->B, view V with visuals and a
    /// connection for R (the §8 cascade fixture).
    fn fixture() -> Model {
        let mut model = Model::new("m");
        let business = traversal::find_folder_by_kind(&model, FolderKind::Business)
            .map(|f| f.id.clone())
            .expect("business");
        let relations = traversal::find_folder_by_kind(&model, FolderKind::Relations)
            .map(|f| f.id.clone())
            .expect("relations");
        let views = traversal::find_folder_by_kind(&model, FolderKind::Views)
            .map(|f| f.id.clone())
            .expect("views");

        model.insert_element_record(Element::new("A".into(), "business-actor", "A"));
        model.insert_element_record(Element::new("B".into(), "business-actor", "B"));
        model
            .folder_mut(&business)
            .expect("folder")
            .items
            .extend(["A".to_string(), "B".to_string()]);

        model.insert_relationship_record(Relationship::new(
            "R".into(),
            "flow-relationship",
            "A".into(),
            "B".into(),
        ));
        model.folder_mut(&relations).expect("folder").items.push("R".into());

        let mut view = View::new("V".into(), "Main");
        let mut va = VisualNode::new(
            "vA".into(),
            VisualBody::Element { concept: "A".into() },
            Bounds::DEFAULT,
        );
        let mut vb = VisualNode::new(
            "vB".into(),
            VisualBody::Element { concept: "B".into() },
            Bounds::DEFAULT,
        );
        va.source_connections.push(VisualConnection {
            id: "cR".into(),
            relationship: "R".into(),
            source: "vA".into(),
            target: "vB".into(),
            bendpoints: Vec::new(),
            style: Default::default(),
        });
        vb.target_connections.push("cR".into());
        view.insert_node(va);
        view.insert_node(vb);
        view.children.extend(["vA".to_string(), "vB".to_string()]);
        model.insert_view_record(view);
        model.folder_mut(&views).expect("folder").items.push("V".into());
        model
    }

    #[test]
    fn element_cascade_covers_full_closure() {
        let model = fixture();
        let commands = element_cascade(&model, &PendingState::default(), "A");

        let removed_connections = commands
            .iter()
            .filter(|c| matches!(c, SubCommand::RemoveConnection { .. }))
            .count();
        let removed_visuals = commands
            .iter()
            .filter(|c| matches!(c, SubCommand::RemoveVisual { .. }))
            .count();
        let removed_relationships = commands
            .iter()
            .filter(|c| matches!(c, SubCommand::RemoveRelationship { .. }))
            .count();
        assert_eq!(removed_connections, 1, "cR once despite two discovery paths");
        assert_eq!(removed_visuals, 1, "vA only");
        assert_eq!(removed_relationships, 1);
        assert!(matches!(
            commands.last(),
            Some(SubCommand::RemoveElement { id, .. }) if id == "A"
        ));
    }

    #[test]
    fn relationship_cascade_removes_connections_first() {
        let model = fixture();
        let commands = relationship_cascade(&model, &PendingState::default(), "R");
        assert!(matches!(commands[0], SubCommand::RemoveConnection { .. }));
        assert!(matches!(
            commands.last(),
            Some(SubCommand::RemoveRelationship { id, .. }) if id == "R"
        ));
    }
}
