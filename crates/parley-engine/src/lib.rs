//! # parley-engine
//!
//! Drives a conversation on top of the context store:
//!
//! - [`ToolRegistry`]: explicit tool registration and behavior lookup
//! - [`ToolOrchestrator`]: identify, gate, execute and assemble tool calls
//! - [`TurnLoop`]: model calls with retry until no tool call runs
//! - [`providers`]: just-in-time context, fanned out concurrently
//! - [`ChatStatus`]: the observable status report
//! - [`EngineBuilder`]: a running session wired from settings

#![deny(unsafe_code)]

pub mod builder;
pub mod confirm;
pub mod error;
pub mod failure;
pub mod jobs;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod status;
pub mod tool;
pub mod tools;
pub mod turn;

#[cfg(test)]
mod testing;

pub use builder::{Engine, EngineBuilder};
pub use confirm::{
    ApprovalPreferences, AutoApprove, Confirmation, ConfirmationResponse, ScriptedConfirmation,
};
pub use error::EngineError;
pub use failure::FailureTracker;
pub use jobs::{JobInfo, JobRunner};
pub use orchestrator::{OrchestratorConfig, RoundOutcome, ToolOrchestrator};
pub use providers::{ContextProvider, ResourceStatusProvider};
pub use registry::ToolRegistry;
pub use status::{ChatStatus, Phase, StatusReport};
pub use tool::{SessionHandle, Tool, ToolContext};
pub use turn::{TurnConfig, TurnLoop, TurnOutcome};
