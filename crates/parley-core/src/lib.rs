//! # parley-core
//!
//! Shared vocabulary for the parley conversation engine:
//!
//! - **Branded IDs**: `SessionId`, `PartId`, `JobId`
//! - **Parts**: [`Part`] with a stable identity handle and a [`PartKind`] payload
//! - **Messages**: [`Message`] with role, usage metadata and a dependency map
//! - **Resources**: [`StatefulResource`] snapshots and [`ResourceStatus`]
//! - **Tools**: descriptors, behaviors, outputs and per-call outcomes
//! - **Model**: the [`ModelClient`] collaborator and its error classification

#![deny(unsafe_code)]

pub mod ids;
pub mod messages;
pub mod model;
pub mod outcome;
pub mod parts;
pub mod resource;
pub mod retry;
pub mod tools;

pub use ids::{JobId, PartId, SessionId};
pub use messages::{Dependencies, Message, Role, Usage};
pub use model::{GenerationConfig, ModelClient, ModelError, ModelResponse};
pub use outcome::{Decision, IdentifiedCall, ToolCallOutcome, ToolCallStatus};
pub use parts::{ExecutionOutcome, Part, PartKind};
pub use resource::{ResourceMeta, ResourceStatus, StatefulResource};
pub use retry::RetryConfig;
pub use tools::{
    Attachment, BehaviorLookup, ParamType, ParameterSpec, ToolBehavior, ToolDescriptor, ToolError,
    ToolOutput,
};
