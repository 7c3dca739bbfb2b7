//! Shared storage plumbing: retry with backoff and the MongoDB connector.
//!
//! # Features
//!
//! - `mongodb` - MongoDB connector
//! - `config` - read connector settings through `core_config::EnvReader`
//! - `all` - everything above
//!
//! # Examples
//!
//! ## Retrying a transient operation
//!
//! ```ignore
//! use database::common::{RetryConfig, retry_if};
//!
//! let written = retry_if(
//!     || async { client.write(batch).await },
//!     RetryConfig::new().with_max_retries(5),
//!     |e: &WriteError| e.is_transient(),
//! )
//! .await?;
//! ```
//!
//! ## MongoDB
//!
//! ```ignore
//! use database::mongodb::{MongoConfig, connect_from_config_with_retry};
//!
//! let config = MongoConfig::new("mongodb://localhost:27017", "vectors");
//! let client = connect_from_config_with_retry(&config, None).await?;
//! let collection = client.database(config.database()).collection::<Document>("chunks");
//! ```

// Always available modules
pub mod common;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use common::{RetryConfig, retry_if};
