mod client;
mod config;

pub use client::PineconeAdapter;
pub use config::{
    DEFAULT_UPSERT_BATCH_SIZE, PINECONE_API_VERSION, PINECONE_CONTROLLER_URL, PineconeConfig,
};
