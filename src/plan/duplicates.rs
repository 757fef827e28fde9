//! Per-plan duplicate index.
//!
//! Tracks entities the current plan creates, keyed by their match
//! signature, plus every temp-id the plan claims. Discarded at plan end.
//! The index is what makes intra-batch duplicate detection possible before
//! any id has been allocated: entries refer to operations by index, not by
//! id.

use std::collections::HashMap;

/// An element registered by a create-style operation.
#[derive(Debug, Clone)]
pub struct ElementEntry {
    pub op_index: usize,
    /// Normalised kind.
    pub kind: String,
    /// Final name, after any rename decision.
    pub name: String,
    pub temp_id: Option<String>,
}

/// A relationship registered by a create-style operation. Source and target
/// refs may be temp-ids or real ids.
#[derive(Debug, Clone)]
pub struct RelationshipEntry {
    pub op_index: usize,
    pub kind: String,
    pub source_ref: String,
    pub target_ref: String,
    pub access_type: Option<String>,
    pub strength: Option<String>,
    pub temp_id: Option<String>,
}

/// Per-plan registries of created entities and claimed temp-ids.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    elements: Vec<ElementEntry>,
    relationships: Vec<RelationshipEntry>,
    temp_ids: HashMap<String, usize>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a temp-id for the operation at `op_index`. A temp-id may be
    /// claimed once per plan.
    pub fn claim_temp_id(&mut self, temp_id: &str, op_index: usize) -> Result<(), usize> {
        if let Some(prior) = self.temp_ids.get(temp_id) {
            return Err(*prior);
        }
        self.temp_ids.insert(temp_id.to_string(), op_index);
        Ok(())
    }

    pub fn register_element(&mut self, entry: ElementEntry) {
        self.elements.push(entry);
    }

    pub fn register_relationship(&mut self, entry: RelationshipEntry) {
        self.relationships.push(entry);
    }

    /// Elements created so far whose `(kind, name)` signature matches.
    pub fn element_matches(&self, kind: &str, name: &str) -> Vec<&ElementEntry> {
        self.elements
            .iter()
            .filter(|e| e.kind == kind && e.name == name)
            .collect()
    }

    /// Is any created element already using `(kind, name)`? Used by the
    /// rename counter.
    pub fn element_name_taken(&self, kind: &str, name: &str) -> bool {
        self.elements.iter().any(|e| e.kind == kind && e.name == name)
    }

    /// Relationships created so far matching the signature. `access_type`
    /// and `strength` constrain the match only when the probe supplies them.
    pub fn relationship_matches(
        &self,
        kind: &str,
        source_ref: &str,
        target_ref: &str,
        access_type: Option<&str>,
        strength: Option<&str>,
    ) -> Vec<&RelationshipEntry> {
        self.relationships
            .iter()
            .filter(|r| {
                r.kind == kind
                    && r.source_ref == source_ref
                    && r.target_ref == target_ref
                    && access_type.is_none_or(|a| r.access_type.as_deref() == Some(a))
                    && strength.is_none_or(|s| r.strength.as_deref() == Some(s))
            })
            .collect()
    }

    /// The element claiming `temp_id`, if any. Relationship operations use
    /// this to resolve same-plan source/target references.
    pub fn temp_element(&self, temp_id: &str) -> Option<&ElementEntry> {
        self.elements
            .iter()
            .find(|e| e.temp_id.as_deref() == Some(temp_id))
    }

    /// Is `temp_id` claimed by any operation (element or otherwise)?
    pub fn temp_id_claimed(&self, temp_id: &str) -> bool {
        self.temp_ids.contains_key(temp_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_single_claim() {
        let mut index = DuplicateIndex::new();
        assert!(index.claim_temp_id("a", 0).is_ok());
        assert_eq!(index.claim_temp_id("a", 3), Err(0));
    }

    #[test]
    fn element_signature_matching() {
        let mut index = DuplicateIndex::new();
        index.register_element(ElementEntry {
            op_index: 0,
            kind: "business-actor".into(),
            name: "Alice".into(),
            temp_id: Some("a".into()),
        });
        assert_eq!(index.element_matches("business-actor", "Alice").len(), 1);
        assert!(index.element_matches("business-actor", "Bob").is_empty());
        assert!(index.element_name_taken("business-actor", "Alice"));
        assert_eq!(index.temp_element("a").map(|e| e.op_index), Some(0));
    }

    #[test]
    fn relationship_signature_respects_optional_fields() {
        let mut index = DuplicateIndex::new();
        index.register_relationship(RelationshipEntry {
            op_index: 1,
            kind: "access-relationship".into(),
            source_ref: "a".into(),
            target_ref: "b".into(),
            access_type: Some("write".into()),
            strength: None,
            temp_id: None,
        });
        // Unconstrained probe matches.
        assert_eq!(
            index
                .relationship_matches("access-relationship", "a", "b", None, None)
                .len(),
            1
        );
        // Probe with a different access type does not.
        assert!(index
            .relationship_matches("access-relationship", "a", "b", Some("read"), None)
            .is_empty());
    }
}
