//! Digest core: batch types, the run slot, and the orchestrator.

pub mod batch;
pub mod orchestrator;
pub mod run_slot;

pub use batch::{BODY_SEPARATOR, Batch, BatchEntry, FIELD_SEPARATOR, SummaryRecord};
pub use orchestrator::{AdapterHealth, Orchestrator, OrchestratorConfig, RunResult};
pub use run_slot::{RunGuard, RunSlot, RunState};
