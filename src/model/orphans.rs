//! Orphan detection: entities present in the backing store but unreachable
//! from the folder tree.
//!
//! The detector reports; it never repairs. A non-empty report after a
//! successful plan indicates a containment invariant violation in the host's
//! command stack.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{traversal, Id, Model};

/// Ids present in the store but absent from the folder-tree snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrphanReport {
    pub elements: Vec<Id>,
    pub relationships: Vec<Id>,
    pub views: Vec<Id>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.relationships.is_empty() && self.views.is_empty()
    }

    pub fn total(&self) -> usize {
        self.elements.len() + self.relationships.len() + self.views.len()
    }
}

/// Compare the backing store against the folder-based snapshot.
pub fn detect_orphans(model: &Model) -> OrphanReport {
    let mut reachable: HashSet<&str> = HashSet::new();
    for fid in traversal::folder_ids_depth_first(model) {
        if let Some(folder) = model.folder(&fid) {
            for item in &folder.items {
                reachable.insert(item.as_str());
            }
        }
    }

    let mut report = OrphanReport::default();
    for e in model.store_elements() {
        if !reachable.contains(e.id.as_str()) {
            report.elements.push(e.id.clone());
        }
    }
    for r in model.store_relationships() {
        if !reachable.contains(r.id.as_str()) {
            report.relationships.push(r.id.clone());
        }
    }
    for v in model.store_views() {
        if !reachable.contains(v.id.as_str()) {
            report.views.push(v.id.clone());
        }
    }
    report.elements.sort();
    report.relationships.sort();
    report.views.sort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Element;

    #[test]
    fn empty_model_has_no_orphans() {
        let model = Model::new("m");
        assert!(detect_orphans(&model).is_empty());
    }

    #[test]
    fn store_entry_without_folder_membership_is_orphaned() {
        let mut model = Model::new("m");
        model.insert_element_record(Element::new("e1".into(), "business-actor", "Ghost"));
        let report = detect_orphans(&model);
        assert_eq!(report.elements, vec!["e1".to_string()]);
        assert_eq!(report.total(), 1);
    }
}
