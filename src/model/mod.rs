//! The in-memory ArchiMate model: typed elements, directed typed
//! relationships, a folder tree, and views of visual nodes and connections.
//!
//! Records are arena-allocated: the model owns one store map per entity
//! class, and the folder tree / visual trees reference records by id.
//! Mutators capture ids (stable handles), never references, and re-resolve
//! containers at apply time.
//!
//! Containment invariants (checked by the engine, reported by
//! [`orphans`](crate::model::orphans)):
//! - every element/relationship/view id appears in exactly one folder's
//!   item list and is reachable from the model root;
//! - relationship endpoints resolve to live elements;
//! - a visual node never contains itself transitively.

pub mod orphans;
pub mod traversal;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::FolderKind;

/// Stable, globally-unique entity identifier.
pub type Id = String;

/// A single key/value property. Property lists are insertion-ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// Access mode of an `access-relationship`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    Read,
    Write,
    Access,
    ReadWrite,
}

impl AccessType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "access" => Some(Self::Access),
            "read-write" => Some(Self::ReadWrite),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Access => "access",
            Self::ReadWrite => "read-write",
        }
    }
}

/// Strength of an `influence-relationship`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfluenceStrength {
    #[serde(rename = "+")]
    Positive,
    #[serde(rename = "-")]
    Negative,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "?")]
    Unknown,
}

impl InfluenceStrength {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Self::Positive),
            "-" => Some(Self::Negative),
            "=" => Some(Self::Equal),
            "?" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "+",
            Self::Negative => "-",
            Self::Equal => "=",
            Self::Unknown => "?",
        }
    }
}

/// Connection routing algorithm of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    #[default]
    Bendpoint,
    Manhattan,
}

/// Position and size of a visual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Default placement for `addToView` when the caller gives no geometry.
    pub const DEFAULT: Bounds = Bounds {
        x: 100,
        y: 100,
        width: 120,
        height: 55,
    };
}

impl Default for Bounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A bendpoint on a visual connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Style of a visual node. `None` means the renderer default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStyle {
    pub fill_color: Option<String>,
    pub line_color: Option<String>,
    pub font_color: Option<String>,
    pub font: Option<String>,
    pub opacity: Option<u8>,
}

/// Style of a visual connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStyle {
    pub line_color: Option<String>,
    pub line_width: Option<u8>,
    pub font_color: Option<String>,
    pub text_position: Option<u8>,
}

/// A typed model element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: Id,
    pub kind: String,
    pub name: String,
    pub documentation: String,
    pub properties: Vec<Property>,
}

impl Element {
    pub fn new(id: Id, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            name: name.into(),
            documentation: String::new(),
            properties: Vec::new(),
        }
    }
}

/// A directed typed relationship between two elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Id,
    pub kind: String,
    pub name: String,
    pub documentation: String,
    pub source: Id,
    pub target: Id,
    pub access_type: Option<AccessType>,
    pub strength: Option<InfluenceStrength>,
    pub properties: Vec<Property>,
}

impl Relationship {
    pub fn new(id: Id, kind: impl Into<String>, source: Id, target: Id) -> Self {
        Self {
            id,
            kind: kind.into(),
            name: String::new(),
            documentation: String::new(),
            source,
            target,
            access_type: None,
            strength: None,
            properties: Vec::new(),
        }
    }
}

/// A folder in the model tree. `items` holds element, relationship and view
/// ids in insertion order; `folders` holds child folder ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Id,
    pub name: String,
    pub kind: FolderKind,
    pub documentation: String,
    pub folders: Vec<Id>,
    pub items: Vec<Id>,
}

impl Folder {
    pub fn new(id: Id, name: impl Into<String>, kind: FolderKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            documentation: String::new(),
            folders: Vec::new(),
            items: Vec::new(),
        }
    }
}

/// What a visual node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisualBody {
    /// Backed by a model element.
    Element { concept: Id },
    /// Free-standing note text, no backing concept.
    Note { content: String },
    /// Free-standing group container, no backing concept.
    Group { name: String, documentation: String },
}

/// A node in a view's visual tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: Id,
    pub body: VisualBody,
    pub bounds: Bounds,
    pub style: NodeStyle,
    /// Nested child visual ids, in z-order.
    pub children: Vec<Id>,
    /// Connections whose source is this visual. The out-list owns the
    /// connection records; targets hold back-references only.
    pub source_connections: Vec<VisualConnection>,
    /// Ids of connections whose target is this visual.
    pub target_connections: Vec<Id>,
}

impl VisualNode {
    pub fn new(id: Id, body: VisualBody, bounds: Bounds) -> Self {
        Self {
            id,
            body,
            bounds,
            style: NodeStyle::default(),
            children: Vec::new(),
            source_connections: Vec::new(),
            target_connections: Vec::new(),
        }
    }

    /// Backing element id, if this visual stands for one.
    pub fn concept(&self) -> Option<&Id> {
        match &self.body {
            VisualBody::Element { concept } => Some(concept),
            VisualBody::Note { .. } | VisualBody::Group { .. } => None,
        }
    }

    /// Element-backed visuals and groups may nest children; notes may not.
    pub fn can_contain(&self) -> bool {
        !matches!(self.body, VisualBody::Note { .. })
    }
}

/// A connection between two visuals, representing a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualConnection {
    pub id: Id,
    pub relationship: Id,
    pub source: Id,
    pub target: Id,
    pub bendpoints: Vec<Point>,
    pub style: ConnectionStyle,
}

/// Parent slot of a visual inside a view: the view root or a nesting node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Root,
    Node(Id),
}

/// A view: an ordered tree of visual nodes plus their connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: Id,
    pub name: String,
    pub documentation: String,
    pub viewpoint: Option<String>,
    pub router: RouterKind,
    /// Root-level visual ids, in z-order.
    pub children: Vec<Id>,
    nodes: HashMap<Id, VisualNode>,
}

impl View {
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            documentation: String::new(),
            viewpoint: None,
            router: RouterKind::default(),
            children: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&VisualNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut VisualNode> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &Id> {
        self.nodes.keys()
    }

    /// Install a node record. Does not attach it to any container list.
    pub(crate) fn insert_node(&mut self, node: VisualNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node record. Does not detach it from container lists.
    pub(crate) fn take_node(&mut self, id: &str) -> Option<VisualNode> {
        self.nodes.remove(id)
    }

    /// Child id list of a container, resolved lazily.
    pub fn container_children(&self, container: &Container) -> Option<&Vec<Id>> {
        match container {
            Container::Root => Some(&self.children),
            Container::Node(id) => self.nodes.get(id).map(|n| &n.children),
        }
    }

    pub(crate) fn container_children_mut(&mut self, container: &Container) -> Option<&mut Vec<Id>> {
        match container {
            Container::Root => Some(&mut self.children),
            Container::Node(id) => self.nodes.get_mut(id).map(|n| &mut n.children),
        }
    }

    /// Find the container currently holding `visual`.
    pub fn parent_of(&self, visual: &str) -> Option<Container> {
        if self.children.iter().any(|c| c == visual) {
            return Some(Container::Root);
        }
        self.nodes
            .values()
            .find(|n| n.children.iter().any(|c| c == visual))
            .map(|n| Container::Node(n.id.clone()))
    }

    /// Is `candidate` equal to `node` or nested anywhere beneath it?
    pub fn is_self_or_descendant(&self, node: &str, candidate: &str) -> bool {
        if node == candidate {
            return true;
        }
        let mut stack: Vec<&Id> = match self.nodes.get(node) {
            Some(n) => n.children.iter().collect(),
            None => return false,
        };
        while let Some(id) = stack.pop() {
            if id == candidate {
                return true;
            }
            if let Some(n) = self.nodes.get(id.as_str()) {
                stack.extend(n.children.iter());
            }
        }
        false
    }
}

/// Read-only model summary for operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub elements: usize,
    pub relationships: usize,
    pub views: usize,
    pub folders: usize,
}

/// The model: entity stores plus the folder tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    root: Vec<Id>,
    folders: HashMap<Id, Folder>,
    elements: HashMap<Id, Element>,
    relationships: HashMap<Id, Relationship>,
    views: HashMap<Id, View>,
}

impl Model {
    /// Create an empty model scaffolded with the nine canonical top-level
    /// folders, so the folder router always has a default target.
    pub fn new(name: impl Into<String>) -> Self {
        let mut model = Self {
            name: name.into(),
            root: Vec::new(),
            folders: HashMap::new(),
            elements: HashMap::new(),
            relationships: HashMap::new(),
            views: HashMap::new(),
        };
        for kind in FolderKind::ALL {
            let id = format!("folder-{}", uuid::Uuid::new_v4());
            model
                .folders
                .insert(id.clone(), Folder::new(id.clone(), kind.display_name(), kind));
            model.root.push(id);
        }
        model
    }

    /// Top-level folder ids in scaffold order.
    pub fn root_folders(&self) -> &[Id] {
        &self.root
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn folder_mut(&mut self, id: &str) -> Option<&mut Folder> {
        self.folders.get_mut(id)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationships.get(id)
    }

    pub fn relationship_mut(&mut self, id: &str) -> Option<&mut Relationship> {
        self.relationships.get_mut(id)
    }

    pub fn view(&self, id: &str) -> Option<&View> {
        self.views.get(id)
    }

    pub fn view_mut(&mut self, id: &str) -> Option<&mut View> {
        self.views.get_mut(id)
    }

    // Store-level mutation, used by sub-commands only. List membership is
    // managed separately by the ordered-list commands.

    pub(crate) fn insert_element_record(&mut self, element: Element) {
        self.elements.insert(element.id.clone(), element);
    }

    pub(crate) fn take_element_record(&mut self, id: &str) -> Option<Element> {
        self.elements.remove(id)
    }

    pub(crate) fn insert_relationship_record(&mut self, relationship: Relationship) {
        self.relationships.insert(relationship.id.clone(), relationship);
    }

    pub(crate) fn take_relationship_record(&mut self, id: &str) -> Option<Relationship> {
        self.relationships.remove(id)
    }

    pub(crate) fn insert_view_record(&mut self, view: View) {
        self.views.insert(view.id.clone(), view);
    }

    pub(crate) fn take_view_record(&mut self, id: &str) -> Option<View> {
        self.views.remove(id)
    }

    pub(crate) fn insert_folder_record(&mut self, folder: Folder) {
        self.folders.insert(folder.id.clone(), folder);
    }

    pub(crate) fn take_folder_record(&mut self, id: &str) -> Option<Folder> {
        self.folders.remove(id)
    }

    /// Every element in the backing store, regardless of folder membership.
    pub fn store_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Every relationship in the backing store.
    pub fn store_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Every view in the backing store.
    pub fn store_views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    /// Every folder in the backing store.
    pub fn store_folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    /// Folder currently containing item `id` (element, relationship or view).
    pub fn parent_folder_of(&self, id: &str) -> Option<&Folder> {
        self.folders
            .values()
            .find(|f| f.items.iter().any(|i| i == id))
    }

    /// Folder currently listing `id` as a child folder.
    pub fn parent_of_folder(&self, id: &str) -> Option<&Folder> {
        self.folders
            .values()
            .find(|f| f.folders.iter().any(|c| c == id))
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            elements: self.elements.len(),
            relationships: self.relationships.len(),
            views: self.views.len(),
            folders: self.folders.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_scaffolds_canonical_folders() {
        let model = Model::new("test");
        assert_eq!(model.root_folders().len(), 9);
        let kinds: Vec<FolderKind> = model
            .root_folders()
            .iter()
            .filter_map(|id| model.folder(id))
            .map(|f| f.kind)
            .collect();
        assert!(kinds.contains(&FolderKind::Relations));
        assert!(kinds.contains(&FolderKind::Views));
    }

    #[test]
    fn view_parent_and_descendant_checks() {
        let mut view = View::new("v".into(), "Main");
        let mut group = VisualNode::new(
            "g".into(),
            VisualBody::Group {
                name: "G".into(),
                documentation: String::new(),
            },
            Bounds::DEFAULT,
        );
        group.children.push("a".into());
        view.insert_node(group);
        view.insert_node(VisualNode::new(
            "a".into(),
            VisualBody::Element {
                concept: "e1".into(),
            },
            Bounds::DEFAULT,
        ));
        view.children.push("g".into());

        assert_eq!(view.parent_of("g"), Some(Container::Root));
        assert_eq!(view.parent_of("a"), Some(Container::Node("g".into())));
        assert!(view.is_self_or_descendant("g", "a"));
        assert!(view.is_self_or_descendant("g", "g"));
        assert!(!view.is_self_or_descendant("a", "g"));
    }

    #[test]
    fn notes_cannot_contain() {
        let note = VisualNode::new(
            "n".into(),
            VisualBody::Note {
                content: "hi".into(),
            },
            Bounds::DEFAULT,
        );
        assert!(!note.can_contain());
        assert!(note.concept().is_none());
    }
}
