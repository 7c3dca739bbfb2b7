mod client;
mod config;

pub use client::QdrantAdapter;
pub use config::QdrantConfig;
