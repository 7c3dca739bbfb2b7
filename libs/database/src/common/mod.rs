//! Utilities shared across storage connectors

pub mod retry;

pub use retry::{RetryConfig, retry_if};
