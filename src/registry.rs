//! Type registry: the closed element/relationship kind sets, kind-string
//! normalisation, and the kind → canonical folder mapping.
//!
//! External clients spell kinds in PascalCase, camelCase, snake_case,
//! UPPER_CASE or with whitespace; [`normalize_kind`] folds all of those to
//! the canonical kebab-case spelling before membership checks.

use serde::{Deserialize, Serialize};

/// The closed element kind set (ArchiMate 3.x, all layers).
pub const ELEMENT_KINDS: &[&str] = &[
    // Strategy
    "resource",
    "capability",
    "course-of-action",
    "value-stream",
    // Business
    "business-actor",
    "business-role",
    "business-collaboration",
    "business-interface",
    "business-process",
    "business-function",
    "business-interaction",
    "business-event",
    "business-service",
    "business-object",
    "contract",
    "representation",
    "product",
    // Application
    "application-component",
    "application-collaboration",
    "application-interface",
    "application-function",
    "application-interaction",
    "application-process",
    "application-event",
    "application-service",
    "data-object",
    // Technology
    "node",
    "device",
    "system-software",
    "technology-collaboration",
    "technology-interface",
    "path",
    "communication-network",
    "technology-function",
    "technology-process",
    "technology-interaction",
    "technology-event",
    "technology-service",
    "artifact",
    // Physical
    "equipment",
    "facility",
    "distribution-network",
    "material",
    // Motivation
    "stakeholder",
    "driver",
    "assessment",
    "goal",
    "outcome",
    "principle",
    "requirement",
    "constraint",
    "meaning",
    "value",
    // Implementation & migration
    "work-package",
    "deliverable",
    "implementation-event",
    "plateau",
    "gap",
    // Other
    "location",
    "grouping",
    "junction",
];

/// The closed relationship kind set.
pub const RELATIONSHIP_KINDS: &[&str] = &[
    "composition-relationship",
    "aggregation-relationship",
    "assignment-relationship",
    "realization-relationship",
    "serving-relationship",
    "access-relationship",
    "influence-relationship",
    "triggering-relationship",
    "flow-relationship",
    "specialization-relationship",
    "association-relationship",
];

/// Canonical folder kinds of a model's top-level folder tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Strategy,
    Business,
    Application,
    Technology,
    Motivation,
    ImplementationMigration,
    Other,
    Relations,
    Views,
}

impl FolderKind {
    /// All folder kinds, in the order the model scaffolds them.
    pub const ALL: [FolderKind; 9] = [
        FolderKind::Strategy,
        FolderKind::Business,
        FolderKind::Application,
        FolderKind::Technology,
        FolderKind::Motivation,
        FolderKind::ImplementationMigration,
        FolderKind::Other,
        FolderKind::Relations,
        FolderKind::Views,
    ];

    /// Display name of the canonical top-level folder of this kind.
    pub fn display_name(self) -> &'static str {
        match self {
            FolderKind::Strategy => "Strategy",
            FolderKind::Business => "Business",
            FolderKind::Application => "Application",
            FolderKind::Technology => "Technology & Physical",
            FolderKind::Motivation => "Motivation",
            FolderKind::ImplementationMigration => "Implementation & Migration",
            FolderKind::Other => "Other",
            FolderKind::Relations => "Relations",
            FolderKind::Views => "Views",
        }
    }

    /// Parse a folder-kind token as accepted in operation `folder` fields.
    pub fn parse(token: &str) -> Option<FolderKind> {
        match normalize_kind(token).as_str() {
            "strategy" => Some(FolderKind::Strategy),
            "business" => Some(FolderKind::Business),
            "application" => Some(FolderKind::Application),
            "technology" | "technology-physical" => Some(FolderKind::Technology),
            "motivation" => Some(FolderKind::Motivation),
            "implementation-migration" => Some(FolderKind::ImplementationMigration),
            "other" => Some(FolderKind::Other),
            "relations" => Some(FolderKind::Relations),
            "views" | "diagrams" => Some(FolderKind::Views),
            _ => None,
        }
    }
}

/// Normalise an external kind spelling to canonical kebab-case.
///
/// Accepts `BusinessActor`, `businessActor`, `business_actor`,
/// `BUSINESS_ACTOR` and `Business Actor`; idempotent on canonical input.
pub fn normalize_kind(s: &str) -> String {
    let s = s.trim();
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in s.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            prev_lower_or_digit = false;
        } else if ch.is_uppercase() {
            // camel/Pascal boundary: lower-to-upper transition starts a word
            if prev_lower_or_digit && !out.ends_with('-') && !out.is_empty() {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Is `s` (after normalisation by the caller) a valid element kind?
pub fn is_valid_element_kind(s: &str) -> bool {
    ELEMENT_KINDS.contains(&s)
}

/// Is `s` (after normalisation by the caller) a valid relationship kind?
pub fn is_valid_relationship_kind(s: &str) -> bool {
    RELATIONSHIP_KINDS.contains(&s)
}

/// Canonical parent folder for an element or relationship kind.
///
/// Total over the registry: strategy kinds go to `strategy`, `business-*`
/// plus {contract, representation, product} to `business`, `application-*`
/// plus data-object to `application`, technology and physical kinds to
/// `technology`, motivation kinds to `motivation`, implementation/migration
/// kinds to `implementation_migration`, {location, grouping, junction} to
/// `other`, and every `*-relationship` to `relations`.
pub fn folder_kind_for(kind: &str) -> FolderKind {
    if kind.ends_with("-relationship") {
        return FolderKind::Relations;
    }
    match kind {
        "resource" | "capability" | "course-of-action" | "value-stream" => FolderKind::Strategy,
        "contract" | "representation" | "product" => FolderKind::Business,
        "data-object" => FolderKind::Application,
        "node" | "device" | "system-software" | "path" | "communication-network" | "artifact"
        | "equipment" | "facility" | "distribution-network" | "material" => FolderKind::Technology,
        "stakeholder" | "driver" | "assessment" | "goal" | "outcome" | "principle"
        | "requirement" | "constraint" | "meaning" | "value" => FolderKind::Motivation,
        "work-package" | "deliverable" | "implementation-event" | "plateau" | "gap" => {
            FolderKind::ImplementationMigration
        }
        "location" | "grouping" | "junction" => FolderKind::Other,
        k if k.starts_with("business-") => FolderKind::Business,
        k if k.starts_with("application-") => FolderKind::Application,
        k if k.starts_with("technology-") => FolderKind::Technology,
        _ => FolderKind::Other,
    }
}
