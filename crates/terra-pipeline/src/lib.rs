//! Stage sequencing and scheduling on top of the erosion core.
//!
//! [`PipelineOrchestrator`] owns the canonical height field and drives the
//! simulators through the Topology -> Erosion -> Coloring -> Sectioned stage
//! machine. [`ContinuousRunner`] keeps a job running in the background while
//! enabled.

mod error;
mod orchestrator;
mod scheduler;
pub mod settings;
mod stage;

pub use error::RunnerError;
pub use orchestrator::PipelineOrchestrator;
pub use scheduler::{ContinuousRunner, DEFAULT_POLL_INTERVAL};
pub use stage::{NoopHooks, PipelineStage, StageHooks, StageMachine, StageState, Transition};
