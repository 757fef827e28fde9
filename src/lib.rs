//! # ArchiPlan Batch Mutation Engine
//!
//! A batched mutation engine for an in-memory ArchiMate model: typed
//! elements, directed typed relationships, views of visual objects and
//! connections, and a folder tree. Remote clients submit *change plans* -
//! ordered lists of heterogeneous operations - and the engine applies each
//! plan as a single undoable transaction on top of an undoable command
//! stack, with cross-reference cascading, inline duplicate detection,
//! silent-rollback detection and bounded chunking.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Change Plan (JSON)
//!     ↓
//! [Plan Decoder]        → Plan (closed operation sum type)
//!     ↓
//! [Validator]           → schema checks, kind normalisation, duplicate analysis
//!     ↓
//! [Batch Compiler]      → three passes: creates → mutations → deletes
//!     ↓
//! [Chunker]             → operation-aligned sub-command chunks
//!     ↓
//! [Command Stack]       → one undoable transaction per chunk
//!     ↓
//! [Verifier]            → post-commit existence check (silent rollback)
//!     ↓
//! [Result Rewriter]     → ids/names re-read from committed objects
//!     ↓
//! Results (one per operation, input order)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use archiplan::{Engine, InMemoryCommandStack, Model, Plan};
//!
//! let mut model = Model::new("enterprise");
//! let mut stack = InMemoryCommandStack::default();
//! let mut engine = Engine::new(archiplan::Config::load()?.engine);
//!
//! let plan = Plan::from_json(r#"{"changes":[
//!     {"op":"createElement","type":"business-actor","name":"Alice","tempId":"a"},
//!     {"op":"createElement","type":"business-actor","name":"Bob","tempId":"b"},
//!     {"op":"createRelationship","type":"assignment-relationship",
//!      "sourceId":"a","targetId":"b","name":"assigned"}
//! ]}"#)?;
//!
//! let results = engine.execute_plan(&mut model, &mut stack, "import actors", plan)?;
//! stack.undo(&mut model)?; // the whole plan is one undo entry
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | element/relationship kind sets, normalisation, folder router |
//! | `model` | the in-memory model, traversal primitives, orphan detection |
//! | `style` | colour/opacity/line-width parsing and normalisation |
//! | `plan` | plan envelope, operation sum type, validator, duplicate index |
//! | `engine` | sub-commands, command stack, compiler, chunker, executor |
//! | `idempotency` | LRU + TTL registry of prior plan results |
//! | `config` | figment-based configuration loading |

pub mod config;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod plan;
pub mod registry;
pub mod style;

// Re-export the host-facing surface.
pub use config::{Config, EngineConfig, IdempotencyConfig, LoggingConfig};
pub use engine::stack::{CommandStack, InMemoryCommandStack};
pub use engine::subcommand::{SubCommand, Transaction};
pub use engine::{Clock, Engine, IdSource, SystemClock, UuidIdSource};
pub use error::{EngineError, ErrorRecord};
pub use idempotency::IdempotencyRegistry;
pub use model::orphans::{detect_orphans, OrphanReport};
pub use model::{
    AccessType, Bounds, Container, Element, Folder, Id, InfluenceStrength, Model, ModelStats,
    Point, Property, Relationship, RouterKind, View, VisualBody, VisualConnection, VisualNode,
};
pub use plan::{DuplicateStrategy, Granularity, OpResult, Operation, Plan};
pub use registry::{
    folder_kind_for, is_valid_element_kind, is_valid_relationship_kind, normalize_kind,
    FolderKind, ELEMENT_KINDS, RELATIONSHIP_KINDS,
};
