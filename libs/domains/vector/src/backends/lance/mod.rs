mod config;
mod store;

pub use config::{DEFAULT_LANCE_URI, LanceConfig};
pub use store::LanceAdapter;
