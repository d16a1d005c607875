//! Retrieval-augmented generation: chunking, embeddings, the flat vector
//! index, and the index manager that keeps all three consistent with the
//! knowledge base.

pub mod chunker;
pub mod embedder;
pub mod engine;
mod error;
pub mod vector_store;

pub use engine::{IndexManager, RebuildReport, RetrievedChunk};
pub use error::{RagError, Result};
