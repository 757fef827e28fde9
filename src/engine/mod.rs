//! The batch executor: validates a plan, compiles it to sub-command chunks,
//! executes each chunk as one undoable transaction, verifies the committed
//! state, and rewrites results from live objects.
//!
//! The engine is single-threaded and stateless across plans: it never
//! spawns threads, all sub-commands run in the caller's stack frame, and
//! the host serialises plan submissions. Between chunks it sleeps briefly
//! (via the [`Clock`] host trait) so command-stack-internal asynchrony can
//! settle before the existence check. The engine is not transactional
//! across chunks: committed chunks stay committed on timeout or failure.

mod cascade;
mod chunk;
mod compiler;
pub mod stack;
pub mod subcommand;

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{traversal, Id, Model};
use crate::plan::validate::validate_plan;
use crate::plan::{OpResult, Plan};
use stack::CommandStack;
use subcommand::Transaction;

/// Host-provided allocator of fresh entity ids.
pub trait IdSource {
    fn next_id(&mut self) -> Id;
}

/// Default id source: random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&mut self) -> Id {
        format!("id-{}", uuid::Uuid::new_v4())
    }
}

/// Host-provided clock, used only for the inter-chunk settle delay and the
/// plan timeout budget.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Default clock: real time, blocking sleep.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The batched mutation engine.
pub struct Engine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdSource>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Box::new(SystemClock),
            ids: Box::new(UuidIdSource),
        }
    }

    /// Substitute the clock (tests use a no-op clock).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Substitute the id source (tests use a deterministic sequence).
    pub fn with_id_source(mut self, ids: Box<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Apply one plan against the model through the command stack.
    ///
    /// Returns one result per input operation, in input order. On failure
    /// returns a single error and no partial results; chunks committed
    /// before the failure remain committed.
    pub fn execute_plan(
        &mut self,
        model: &mut Model,
        stack: &mut dyn CommandStack,
        label: &str,
        mut plan: Plan,
    ) -> Result<Vec<OpResult>, EngineError> {
        let started = self.clock.now();

        let validated = validate_plan(model, &mut plan, &self.config)?;
        info!(ops = plan.changes.len(), label, "plan_validated");

        let compiled = compiler::compile(model, self.ids.as_mut(), &plan, &validated)?;
        let total_commands: usize = compiled.units.iter().map(|u| u.commands.len()).sum();
        let mut results = compiled.results;
        let chunks =
            chunk::chunk_units(compiled.units, self.config.chunk_threshold, plan.granularity);
        let chunk_count = chunks.len();
        info!(
            sub_commands = total_commands,
            chunks = chunk_count,
            "plan_compiled"
        );

        let mut created_elements: Vec<Id> = Vec::new();
        let mut created_relationships: Vec<Id> = Vec::new();

        for (ci, units) in chunks.into_iter().enumerate() {
            let mut commands = Vec::new();
            for mut unit in units {
                created_elements.append(&mut unit.created_element_ids);
                created_relationships.append(&mut unit.created_relationship_ids);
                commands.append(&mut unit.commands);
            }
            // An id this plan deletes again is legitimately absent afterwards;
            // take it out of the verification set before the chunk runs.
            for cmd in &commands {
                match cmd {
                    subcommand::SubCommand::RemoveElement { id, .. } => {
                        created_elements.retain(|c| c != id);
                    }
                    subcommand::SubCommand::RemoveRelationship { id, .. } => {
                        created_relationships.retain(|c| c != id);
                    }
                    _ => {}
                }
            }
            // Reused or skipped operations can leave a chunk empty.
            if commands.is_empty() {
                continue;
            }

            let tx_label = if chunk_count > 1 {
                format!("{label} [{}/{chunk_count}]", ci + 1)
            } else {
                label.to_string()
            };
            let command_count = commands.len();
            stack
                .execute(model, Transaction::new(tx_label, commands))
                .map_err(|e| EngineError::Host {
                    message: format!("{e:#}"),
                    operation_index: None,
                })?;
            info!(
                chunk = ci + 1,
                chunks = chunk_count,
                sub_commands = command_count,
                "chunk_committed"
            );

            // Let the stack's async paths settle, then check for silent
            // rollback over every id created so far.
            self.clock
                .sleep(Duration::from_millis(self.config.settle_delay_ms));
            self.verify_created(model, &created_elements, &created_relationships)?;

            if let Some(timeout_ms) = plan.timeout_ms {
                if ci + 1 < chunk_count {
                    let elapsed = self.clock.now().duration_since(started).as_millis() as u64;
                    if elapsed > timeout_ms {
                        warn!(timeout_ms, chunks_committed = ci + 1, "plan_timeout");
                        return Err(EngineError::Timeout {
                            timeout_ms,
                            chunks_committed: ci + 1,
                        });
                    }
                }
            }
        }

        rewrite_results(model, &mut results);
        info!(results = results.len(), "plan_completed");
        Ok(results)
    }

    /// Existence check after a chunk commit. A missing id means the stack
    /// silently dropped state it reported as committed.
    fn verify_created(
        &self,
        model: &Model,
        elements: &[Id],
        relationships: &[Id],
    ) -> Result<(), EngineError> {
        let mut missing: Vec<Id> = elements
            .iter()
            .filter(|id| traversal::find_element(model, id).is_none())
            .cloned()
            .collect();
        missing.extend(
            relationships
                .iter()
                .filter(|id| traversal::find_relationship(model, id).is_none())
                .cloned(),
        );
        if missing.is_empty() {
            return Ok(());
        }
        let expected = elements.len() + relationships.len();
        let missing_count = missing.len();
        missing.truncate(self.config.missing_id_report_limit);
        error!(expected, missing = missing_count, "silent_rollback_detected");
        Err(EngineError::SilentRollback {
            expected,
            missing: missing_count,
            missing_ids: missing,
        })
    }
}

/// Replace pre-execution snapshots in the results with ids and names read
/// back from the committed model. Entities deleted later in the same plan
/// keep their snapshot values.
fn rewrite_results(model: &Model, results: &mut [OpResult]) {
    for result in results.iter_mut() {
        let Some(id) = result.real_id.clone() else {
            continue;
        };
        match result.op.as_str() {
            "createElement" | "createOrGetElement" => {
                if let Some(e) = model.element(&id) {
                    result.name = Some(e.name.clone());
                    result.kind = Some(e.kind.clone());
                }
            }
            "createRelationship" | "createOrGetRelationship" => {
                if let Some(rel) = model.relationship(&id) {
                    result.kind = Some(rel.kind.clone());
                    result.source = Some(rel.source.clone());
                    result.target = Some(rel.target.clone());
                    result.source_name = model.element(&rel.source).map(|e| e.name.clone());
                    result.target_name = model.element(&rel.target).map(|e| e.name.clone());
                }
            }
            _ => {}
        }
    }
}
