mod config;
mod store;

pub use config::{DEFAULT_EMBEDDING_FIELD, DEFAULT_NUM_CANDIDATES, MongoVectorConfig};
pub use store::MongoVectorAdapter;
