//! Knowledge indexing and retrieval pipeline, §4.5-§4.7.
//!
//! Leaves-first: [`chunker`] parses raw markdown, [`embeddings`] turns text
//! into vectors, [`vector_store`] persists `{id -> (embedding, metadata)}`,
//! [`rag_engine`] ties chunking/embedding/storage together per reviewer,
//! [`retriever`] merges the global and project tiers, and [`drift`] audits
//! the knowledge files themselves for staleness and contradictions.

pub mod chunker;
pub mod drift;
pub mod embeddings;
pub mod rag_engine;
pub mod retriever;
pub mod vector_store;
