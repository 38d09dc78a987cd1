//! A vector index bundled with the metadata records it was built from.
//!
//! Record `i` describes vector `i`. `CorpusIndex` refuses to exist with
//! mismatched lengths and is persisted and loaded only as a pair:
//! `<source>.index` + `<source>.meta.json`.

use serde::{Deserialize, Serialize};

use crate::semantic::{decode_index, encode_index, FlatIndex, Neighbor, VectorStorageError};
use crate::storage::StorageManager;

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Note,
    Discourse,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Note => "note",
            Source::Discourse => "discourse",
        }
    }

    pub fn index_ident(&self) -> String {
        format!("{}.index", self.as_str())
    }

    pub fn meta_ident(&self) -> String {
        format!("{}.meta.json", self.as_str())
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored for every indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Preview of at most 500 characters
    pub content: String,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("index holds {vectors} vectors but metadata holds {records} records")]
    LengthMismatch { vectors: usize, records: usize },

    #[error("artifact missing: {0}")]
    Missing(String),

    #[error("vector storage: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("metadata is malformed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One searchable hit, resolved to its metadata record.
#[derive(Debug, Clone)]
pub struct CorpusHit<'a> {
    pub neighbor: Neighbor,
    pub meta: &'a DocumentMeta,
}

#[derive(Debug, Clone)]
pub struct CorpusIndex {
    source: Source,
    index: FlatIndex,
    metadata: Vec<DocumentMeta>,
}

impl CorpusIndex {
    pub fn new(
        source: Source,
        index: FlatIndex,
        metadata: Vec<DocumentMeta>,
    ) -> Result<Self, CorpusError> {
        if index.len() != metadata.len() {
            return Err(CorpusError::LengthMismatch {
                vectors: index.len(),
                records: metadata.len(),
            });
        }

        Ok(Self {
            source,
            index,
            metadata,
        })
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    #[cfg(test)]
    pub fn metadata(&self) -> &[DocumentMeta] {
        &self.metadata
    }

    /// `k` nearest documents, closest first.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<CorpusHit<'_>>, crate::semantic::IndexError> {
        let neighbors = self.index.search(query, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| match self.metadata.get(neighbor.position) {
                Some(meta) => Some(CorpusHit { neighbor, meta }),
                None => {
                    // unreachable while the length invariant holds
                    log::error!(
                        "{} index returned position {} past {} records",
                        self.source,
                        neighbor.position,
                        self.metadata.len()
                    );
                    None
                }
            })
            .collect())
    }

    /// Persist both artifacts, or neither.
    pub fn save(&self, store: &dyn StorageManager, model_id: &[u8; 32]) -> Result<(), CorpusError> {
        let index_bytes = encode_index(&self.index, model_id)?;
        let meta_bytes = serde_json::to_vec_pretty(&self.metadata)?;

        store.write_together(&[
            (self.source.index_ident().as_str(), index_bytes.as_slice()),
            (self.source.meta_ident().as_str(), meta_bytes.as_slice()),
        ])?;

        Ok(())
    }

    /// Load a persisted pair, checking model, dimensions and lengths.
    pub fn load(
        store: &dyn StorageManager,
        source: Source,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<Self, CorpusError> {
        for ident in [source.index_ident(), source.meta_ident()] {
            if !store.exists(&ident) {
                return Err(CorpusError::Missing(ident));
            }
        }

        let index = decode_index(&store.read(&source.index_ident())?, model_id, dimensions)?;
        let metadata: Vec<DocumentMeta> =
            serde_json::from_slice(&store.read(&source.meta_ident())?)?;

        Self::new(source, index, metadata)
    }
}
