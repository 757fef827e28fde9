//! Error types for plan validation, compilation and execution.
//!
//! Every error carries a stable wire `code` (see [`EngineError::code`]) and,
//! where one applies, the index of the offending operation in the submitted
//! plan. Failed plans return a single [`ErrorRecord`] and no partial results.

use serde::{Deserialize, Serialize};

/// Engine error type.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    // Plan shape errors
    /// Envelope or per-operation schema violation
    #[error("validation error: {message}")]
    Validation {
        message: String,
        operation_index: Option<usize>,
    },

    /// Element kind not in the registry after normalisation
    #[error("invalid element kind: '{kind}'")]
    InvalidElementKind {
        kind: String,
        operation_index: Option<usize>,
    },

    /// Relationship kind not in the registry after normalisation
    #[error("invalid relationship kind: '{kind}'")]
    InvalidRelationshipKind {
        kind: String,
        operation_index: Option<usize>,
    },

    /// Duplicate strategy outside {error, reuse, rename}
    #[error("invalid duplicate strategy: '{strategy}'")]
    InvalidDuplicateStrategy {
        strategy: String,
        operation_index: Option<usize>,
    },

    /// Upsert create/match objects disagree on type or identity fields
    #[error("invalid match specification: {message}")]
    InvalidMatchSpecification {
        message: String,
        operation_index: Option<usize>,
    },

    // Duplicate errors
    /// Element with the same (kind, name) already exists, strategy is `error`
    #[error("duplicate element: {kind} '{name}'")]
    DuplicateElement {
        kind: String,
        name: String,
        operation_index: Option<usize>,
    },

    /// Relationship with the same signature already exists, strategy is `error`
    #[error("duplicate relationship: {kind} {source_id} -> {target}")]
    DuplicateRelationship {
        kind: String,
        source_id: String,
        target: String,
        operation_index: Option<usize>,
    },

    /// More than one candidate for a `reuse` upsert
    #[error("ambiguous match: {count} candidates for {kind} '{name}'")]
    AmbiguousMatch {
        kind: String,
        name: String,
        count: usize,
        operation_index: Option<usize>,
    },

    // Reference errors
    /// Source/target/visual/view/folder id does not resolve
    #[error("missing reference: {what} '{id}'")]
    MissingReference {
        what: String,
        id: String,
        operation_index: Option<usize>,
    },

    /// Connection direction inconsistent with its relationship
    #[error("direction mismatch: connection endpoints are swapped relative to relationship '{relationship}'")]
    DirectionMismatch {
        relationship: String,
        operation_index: Option<usize>,
    },

    /// Nesting into a visual that cannot contain children
    #[error("unsupported container: visual '{visual}' cannot contain children")]
    UnsupportedContainer {
        visual: String,
        operation_index: Option<usize>,
    },

    // Execution errors
    /// Post-execute verification found ids missing from the committed model
    #[error("silent rollback detected: {missing} of {expected} created objects missing after commit")]
    SilentRollback {
        expected: usize,
        missing: usize,
        missing_ids: Vec<String>,
    },

    /// Plan exceeded its time budget between chunks
    #[error("plan timed out after {timeout_ms}ms ({chunks_committed} chunks committed)")]
    Timeout {
        timeout_ms: u64,
        chunks_committed: usize,
    },

    /// Failure surfaced by the command stack, factory or model reader
    #[error("host error: {message}")]
    Host {
        message: String,
        operation_index: Option<usize>,
    },
}

impl EngineError {
    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::InvalidElementKind { .. } => "InvalidElementKind",
            Self::InvalidRelationshipKind { .. } => "InvalidRelationshipKind",
            Self::InvalidDuplicateStrategy { .. } => "InvalidDuplicateStrategy",
            Self::InvalidMatchSpecification { .. } => "InvalidMatchSpecification",
            Self::DuplicateElement { .. } => "DuplicateElement",
            Self::DuplicateRelationship { .. } => "DuplicateRelationship",
            Self::AmbiguousMatch { .. } => "AmbiguousMatch",
            Self::MissingReference { .. } => "MissingReference",
            Self::DirectionMismatch { .. } => "DirectionMismatch",
            Self::UnsupportedContainer { .. } => "UnsupportedContainer",
            Self::SilentRollback { .. } => "SilentRollback",
            Self::Timeout { .. } => "Timeout",
            Self::Host { .. } => "HostError",
        }
    }

    /// Index of the offending operation, when one applies.
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            Self::Validation {
                operation_index, ..
            }
            | Self::InvalidElementKind {
                operation_index, ..
            }
            | Self::InvalidRelationshipKind {
                operation_index, ..
            }
            | Self::InvalidDuplicateStrategy {
                operation_index, ..
            }
            | Self::InvalidMatchSpecification {
                operation_index, ..
            }
            | Self::DuplicateElement {
                operation_index, ..
            }
            | Self::DuplicateRelationship {
                operation_index, ..
            }
            | Self::AmbiguousMatch {
                operation_index, ..
            }
            | Self::MissingReference {
                operation_index, ..
            }
            | Self::DirectionMismatch {
                operation_index, ..
            }
            | Self::UnsupportedContainer {
                operation_index, ..
            }
            | Self::Host {
                operation_index, ..
            } => *operation_index,
            Self::SilentRollback { .. } | Self::Timeout { .. } => None,
        }
    }

    /// Attach an operation index to an error produced without one.
    pub(crate) fn at_op(mut self, index: usize) -> Self {
        match &mut self {
            Self::Validation {
                operation_index, ..
            }
            | Self::InvalidElementKind {
                operation_index, ..
            }
            | Self::InvalidRelationshipKind {
                operation_index, ..
            }
            | Self::InvalidDuplicateStrategy {
                operation_index, ..
            }
            | Self::InvalidMatchSpecification {
                operation_index, ..
            }
            | Self::DuplicateElement {
                operation_index, ..
            }
            | Self::DuplicateRelationship {
                operation_index, ..
            }
            | Self::AmbiguousMatch {
                operation_index, ..
            }
            | Self::MissingReference {
                operation_index, ..
            }
            | Self::DirectionMismatch {
                operation_index, ..
            }
            | Self::UnsupportedContainer {
                operation_index, ..
            }
            | Self::Host {
                operation_index, ..
            } => *operation_index = Some(index),
            Self::SilentRollback { .. } | Self::Timeout { .. } => {}
        }
        self
    }

    /// Convenience constructor for envelope/schema violations.
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            operation_index: None,
        }
    }

    /// Convenience constructor for unresolved references.
    pub(crate) fn missing(what: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingReference {
            what: what.into(),
            id: id.into(),
            operation_index: None,
        }
    }

    /// Flatten to the wire record shape: `{code, message, operationIndex?}`.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().to_string(),
            message: self.to_string(),
            operation_index: self.operation_index(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Host {
            message: format!("{e:#}"),
            operation_index: None,
        }
    }
}

/// Wire form of a failed plan: a single error record, no partial results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = EngineError::DuplicateElement {
            kind: "business-actor".into(),
            name: "Alice".into(),
            operation_index: Some(3),
        };
        assert_eq!(e.code(), "DuplicateElement");
        assert_eq!(e.operation_index(), Some(3));
    }

    #[test]
    fn record_serializes_camel_case() {
        let rec = EngineError::validation("changes must not be empty").to_record();
        let json = serde_json::to_string(&rec).expect("serializable");
        assert!(json.contains("\"code\":\"ValidationError\""));
        assert!(!json.contains("operationIndex"));
    }

    #[test]
    fn at_op_attaches_index() {
        let e = EngineError::missing("view", "v-1").at_op(7);
        assert_eq!(e.operation_index(), Some(7));
    }
}
