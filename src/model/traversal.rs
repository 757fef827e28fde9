//! Read-only traversal primitives over the folder tree and view trees.
//!
//! These are the sole mechanism by which the cascade planner discovers the
//! indirect consequences of a delete, and by which connection auto-wiring
//! locates visuals. All walks are synchronous and depth-first; none of them
//! mutate. Connections are discovered through source out-lists only (the
//! sub-command factory installs them there).

use super::{Container, Element, Folder, Id, Model, Relationship, View, VisualConnection, VisualNode};
use crate::registry::FolderKind;

/// Folder ids in depth-first order from the model root.
pub fn folder_ids_depth_first(model: &Model) -> Vec<Id> {
    let mut out = Vec::new();
    let mut stack: Vec<&Id> = model.root_folders().iter().rev().collect();
    while let Some(id) = stack.pop() {
        if let Some(folder) = model.folder(id) {
            out.push(folder.id.clone());
            stack.extend(folder.folders.iter().rev());
        }
    }
    out
}

/// Find an element by id, walking folders recursively.
pub fn find_element<'a>(model: &'a Model, id: &str) -> Option<&'a Element> {
    for fid in folder_ids_depth_first(model) {
        let folder = model.folder(&fid)?;
        if folder.items.iter().any(|i| i == id) {
            return model.element(id);
        }
    }
    None
}

/// Find a relationship by id, walking folders recursively.
pub fn find_relationship<'a>(model: &'a Model, id: &str) -> Option<&'a Relationship> {
    for fid in folder_ids_depth_first(model) {
        let folder = model.folder(&fid)?;
        if folder.items.iter().any(|i| i == id) {
            return model.relationship(id);
        }
    }
    None
}

/// Find a view by id, walking folders recursively.
pub fn find_view<'a>(model: &'a Model, id: &str) -> Option<&'a View> {
    for fid in folder_ids_depth_first(model) {
        let folder = model.folder(&fid)?;
        if folder.items.iter().any(|i| i == id) {
            return model.view(id);
        }
    }
    None
}

/// Find a folder by id.
pub fn find_folder_by_id<'a>(model: &'a Model, id: &str) -> Option<&'a Folder> {
    let ids = folder_ids_depth_first(model);
    ids.iter().find(|fid| fid.as_str() == id).and_then(|fid| model.folder(fid))
}

/// Find a folder by name, case-insensitively. Top-level folders are scanned
/// first, then the tree is descended in depth-first order.
pub fn find_folder_by_name<'a>(model: &'a Model, name: &str) -> Option<&'a Folder> {
    let wanted = name.to_lowercase();
    for fid in model.root_folders() {
        if let Some(folder) = model.folder(fid) {
            if folder.name.to_lowercase() == wanted {
                return Some(folder);
            }
        }
    }
    for fid in folder_ids_depth_first(model) {
        if let Some(folder) = model.folder(&fid) {
            if folder.name.to_lowercase() == wanted {
                return Some(folder);
            }
        }
    }
    None
}

/// Find the canonical top-level folder of a kind.
pub fn find_folder_by_kind(model: &Model, kind: FolderKind) -> Option<&Folder> {
    model
        .root_folders()
        .iter()
        .filter_map(|id| model.folder(id))
        .find(|f| f.kind == kind)
}

/// Collect every view reachable by folder traversal, in traversal order.
pub fn find_all_views(model: &Model) -> Vec<&View> {
    let mut out = Vec::new();
    for fid in folder_ids_depth_first(model) {
        if let Some(folder) = model.folder(&fid) {
            for item in &folder.items {
                if let Some(view) = model.view(item) {
                    out.push(view);
                }
            }
        }
    }
    out
}

/// Every relationship with `element_id` as either endpoint, paired with its
/// parent folder.
pub fn find_relationships_for_element<'a>(
    model: &'a Model,
    element_id: &str,
) -> Vec<(&'a Relationship, &'a Folder)> {
    let mut out = Vec::new();
    for fid in folder_ids_depth_first(model) {
        let Some(folder) = model.folder(&fid) else {
            continue;
        };
        for item in &folder.items {
            if let Some(rel) = model.relationship(item) {
                if rel.source == element_id || rel.target == element_id {
                    out.push((rel, folder));
                }
            }
        }
    }
    out
}

/// Visual ids of a view in depth-first order, paired with their container.
pub fn visuals_depth_first(view: &View) -> Vec<(Id, Container)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&Id, Container)> = view
        .children
        .iter()
        .rev()
        .map(|id| (id, Container::Root))
        .collect();
    while let Some((id, container)) = stack.pop() {
        out.push((id.clone(), container));
        if let Some(node) = view.node(id) {
            for child in node.children.iter().rev() {
                stack.push((child, Container::Node(node.id.clone())));
            }
        }
    }
    out
}

/// Every visual in `view` backed by `element_id`, with its container.
pub fn find_visuals_for_element<'a>(
    view: &'a View,
    element_id: &str,
) -> Vec<(&'a VisualNode, Container)> {
    visuals_depth_first(view)
        .into_iter()
        .filter_map(|(id, container)| view.node(&id).map(|n| (n, container)))
        .filter(|(n, _)| n.concept().is_some_and(|c| c == element_id))
        .collect()
}

/// First visual in `view` backed by `element_id`, in depth-first order.
pub fn find_visual_for_concept_in_view<'a>(
    view: &'a View,
    element_id: &str,
) -> Option<&'a VisualNode> {
    visuals_depth_first(view)
        .into_iter()
        .filter_map(|(id, _)| view.node(&id))
        .find(|n| n.concept().is_some_and(|c| c == element_id))
}

/// A connection located in a view, with its endpoint visual ids.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionHit<'a> {
    pub connection: &'a VisualConnection,
    pub source: &'a Id,
    pub target: &'a Id,
}

/// Every connection in `view` representing `relationship_id`.
pub fn find_connections_for_relationship<'a>(
    view: &'a View,
    relationship_id: &str,
) -> Vec<ConnectionHit<'a>> {
    let mut out = Vec::new();
    for (id, _) in visuals_depth_first(view) {
        let Some(node) = view.node(&id) else { continue };
        for conn in &node.source_connections {
            if conn.relationship == relationship_id {
                out.push(ConnectionHit {
                    connection: conn,
                    source: &conn.source,
                    target: &conn.target,
                });
            }
        }
    }
    out
}

/// Every connection touching `visual_id` as source or target.
pub fn find_connections_for_visual<'a>(view: &'a View, visual_id: &str) -> Vec<ConnectionHit<'a>> {
    let mut out = Vec::new();
    for (id, _) in visuals_depth_first(view) {
        let Some(node) = view.node(&id) else { continue };
        for conn in &node.source_connections {
            if conn.source == visual_id || conn.target == visual_id {
                out.push(ConnectionHit {
                    connection: conn,
                    source: &conn.source,
                    target: &conn.target,
                });
            }
        }
    }
    out
}

/// Locate a connection by id. Searches source out-lists only.
pub fn find_connection_in_view<'a>(view: &'a View, connection_id: &str) -> Option<ConnectionHit<'a>> {
    for (id, _) in visuals_depth_first(view) {
        let node = view.node(&id)?;
        for conn in &node.source_connections {
            if conn.id == connection_id {
                return Some(ConnectionHit {
                    connection: conn,
                    source: &conn.source,
                    target: &conn.target,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, VisualBody};

    fn view_with_pair() -> View {
        let mut view = View::new("v".into(), "Main");
        let mut a = VisualNode::new(
            "va".into(),
            VisualBody::Element { concept: "A".into() },
            Bounds::DEFAULT,
        );
        let b = VisualNode::new(
            "vb".into(),
            VisualBody::Element { concept: "B".into() },
            Bounds::DEFAULT,
        );
        a.source_connections.push(VisualConnection {
            id: "c".into(),
            relationship: "R".into(),
            source: "va".into(),
            target: "vb".into(),
            bendpoints: Vec::new(),
            style: Default::default(),
        });
        let mut b = b;
        b.target_connections.push("c".into());
        view.insert_node(a);
        view.insert_node(b);
        view.children.push("va".into());
        view.children.push("vb".into());
        view
    }

    #[test]
    fn finds_visuals_by_concept() {
        let view = view_with_pair();
        let hits = find_visuals_for_element(&view, "A");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "va");
        assert_eq!(hits[0].1, Container::Root);
    }

    #[test]
    fn finds_connections_by_relationship_and_visual() {
        let view = view_with_pair();
        let by_rel = find_connections_for_relationship(&view, "R");
        assert_eq!(by_rel.len(), 1);
        assert_eq!(by_rel[0].source, "va");
        assert_eq!(by_rel[0].target, "vb");

        // Discoverable from the target side too, via the source out-list scan.
        let by_visual = find_connections_for_visual(&view, "vb");
        assert_eq!(by_visual.len(), 1);
        assert_eq!(by_visual[0].connection.id, "c");
    }

    #[test]
    fn connection_lookup_by_id() {
        let view = view_with_pair();
        assert!(find_connection_in_view(&view, "c").is_some());
        assert!(find_connection_in_view(&view, "zzz").is_none());
    }
}
