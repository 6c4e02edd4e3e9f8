//! # parley-llm
//!
//! Wrappers around the [`ModelClient`](parley_core::ModelClient) collaborator:
//!
//! - [`RetryingClient`]: allow-list retry with exponential backoff and jitter
//! - [`MockModelClient`]: scripted responses for tests

#![deny(unsafe_code)]

pub mod mock;
pub mod retrying;

pub use mock::{MockModelClient, MockResponse};
pub use retrying::{ErrorRecord, RetryingClient};
