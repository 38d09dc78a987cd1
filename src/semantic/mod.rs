//! Semantic search infrastructure for notes and forum posts.
//!
//! This module provides local semantic search capabilities using fastembed-rs
//! for generating embeddings and a flat in-memory vector index.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `index`: Append-only vector index with exact squared-L2 search
//! - `storage`: Binary encoding for `<source>.index` persistence
//! - `preprocess`: Front-matter stripping and preview truncation

pub mod embeddings;
mod index;
pub mod preprocess;
mod storage;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use index::{FlatIndex, IndexError, Neighbor};
pub use storage::{decode_index, encode_index, VectorStorageError};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
