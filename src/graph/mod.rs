//! Medical knowledge graph access (Neo4j over HTTP)
//!
//! The graph holds Disease, Drug, Symptom, Food, Check, Cure, Producer and
//! Department nodes, each carrying a `name` and, once
//! [`EmbeddingWriter`] has run, an embedding vector used by the vector index.

pub mod client;
pub mod diagnostics;
pub mod embedding_writer;

pub use client::CypherRunner;
pub use client::GraphClient;
pub use client::QueryResult;
pub use client::Record;
pub use diagnostics::diagnose;
pub use diagnostics::GraphDiagnostics;
pub use embedding_writer::EmbeddingWriter;
pub use embedding_writer::LabelProgress;
