//! MongoDB connector
//!
//! Builds a pooled client from [`MongoConfig`] and verifies it with a `ping`
//! before handing it out.

mod config;
mod connector;

pub use config::MongoConfig;
pub use connector::{
    MongoError, connect_from_config, connect_from_config_with_retry, is_transient_error,
};

// Re-export MongoDB types for convenience
pub use mongodb::{Client, Collection, Database};
