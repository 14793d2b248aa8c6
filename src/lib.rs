pub mod batch;
pub mod candidates;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;

#[cfg(test)]
pub mod tests;

pub use config::AppConfig;
pub use errors::*;
