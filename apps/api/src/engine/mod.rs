//! The customization engine: validates submissions, drives generation and
//! rendering for each run, and publishes the result as the owner's working artifact.

pub mod handlers;
mod in_flight;
pub mod orchestrator;
pub mod run;

pub use orchestrator::{EngineError, EngineSettings, Orchestrator, SubmitError};
pub use run::{RunId, RunStatus};
