//! # parley-context
//!
//! The conversation context engine:
//!
//! - [`ContextStore`]: the ordered message list behind one mutation lock
//! - [`prune`]: dependency-graph closure, ephemeral aging, stateful replacement
//! - [`tracker`]: freshness of external resources mirrored into context

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod prune;
pub mod store;
pub mod tracker;

pub use error::{ContextError, ProbeError};
pub use events::ContextEvent;
pub use prune::PruneReport;
pub use store::{ContextConfig, ContextStore};
pub use tracker::{FsProbe, LiveProbe, ResourceRow, ResourceTracker};
