//! Service layer
//!
//! Services contain the agent's business logic: turning a job request into a
//! container run and its result, and delivering results to callbacks.
//!
//! Execution is trait-based so the HTTP layer can be tested without a
//! container runtime.

mod callback;
mod execution;
mod plan;

pub use callback::{CallbackError, CallbackNotifier};
pub use execution::{JobEngine, JobExecutor, JobPhase, spawn_job};
pub use plan::JobPlan;
