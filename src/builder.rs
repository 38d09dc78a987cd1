//! Offline index construction.
//!
//! Loaders turn a raw corpus (note files or forum posts) into documents;
//! `IndexBuilder` embeds them and persists the `CorpusIndex` pair.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use crate::corpus::{CorpusError, CorpusIndex, DocumentMeta, Source};
use crate::semantic::preprocess::{preprocess_note, preprocess_post, truncate_preview};
use crate::semantic::{Embedder, EmbeddingError, FlatIndex, IndexError};
use crate::storage::StorageManager;

/// Documents embedded per encoder call
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("persist error: {0}")]
    Corpus(#[from] CorpusError),
}

/// Entry of the notes metadata list.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteEntry {
    pub title: String,
    #[serde(default)]
    pub original_url: String,
    pub filename: String,
}

/// Entry of the forum post collection.
#[derive(Debug, Clone, Deserialize)]
pub struct PostEntry {
    pub topic_title: String,
    #[serde(default)]
    pub url: String,
    pub content: String,
}

/// A preprocessed document ready for embedding.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Full text that gets embedded
    pub content: String,
    /// Record persisted next to the vector; `content` holds the preview
    pub meta: DocumentMeta,
}

/// Documents of one source plus what was dropped on the way.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub documents: Vec<SourceDocument>,
    pub skipped_missing: usize,
    pub skipped_empty: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BuildReport {
    pub indexed: usize,
    pub skipped_missing: usize,
    pub skipped_empty: usize,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BuildError> {
    let data = std::fs::read(path).map_err(|source| BuildError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| BuildError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load notes listed in `metadata_file` from `notes_dir`.
pub fn load_notes(metadata_file: &Path, notes_dir: &Path) -> Result<LoadedCorpus, BuildError> {
    let entries: Vec<NoteEntry> = read_json(metadata_file)?;
    let mut corpus = LoadedCorpus::default();

    for entry in entries {
        let path = notes_dir.join(&entry.filename);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("skipping {}: file not found", path.display());
                corpus.skipped_missing += 1;
                continue;
            }
            Err(source) => {
                return Err(BuildError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let Some(content) = preprocess_note(&raw) else {
            log::debug!("skipping {}: empty after front matter", entry.filename);
            corpus.skipped_empty += 1;
            continue;
        };

        corpus.documents.push(SourceDocument {
            meta: DocumentMeta {
                title: entry.title,
                url: entry.original_url,
                content: truncate_preview(&content),
                source: Some(Source::Note),
                filename: Some(entry.filename),
            },
            content,
        });
    }

    Ok(corpus)
}

/// Load forum posts from a JSON collection.
pub fn load_posts(posts_file: &Path) -> Result<LoadedCorpus, BuildError> {
    let posts: Vec<PostEntry> = read_json(posts_file)?;
    let mut corpus = LoadedCorpus::default();

    for post in posts {
        let Some(content) = preprocess_post(&post.content) else {
            log::debug!("skipping post '{}': empty content", post.topic_title);
            corpus.skipped_empty += 1;
            continue;
        };

        corpus.documents.push(SourceDocument {
            meta: DocumentMeta {
                title: post.topic_title,
                url: post.url,
                content: truncate_preview(&content),
                source: Some(Source::Discourse),
                filename: None,
            },
            content,
        });
    }

    Ok(corpus)
}

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn StorageManager,
    show_progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder, store: &'a dyn StorageManager) -> Self {
        Self {
            embedder,
            store,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Embed every document and persist the index pair for `source`.
    ///
    /// With no documents nothing is written and `indexed` is zero;
    /// previously persisted artifacts stay untouched.
    pub fn build(&self, source: Source, corpus: LoadedCorpus) -> Result<BuildReport, BuildError> {
        let mut report = BuildReport {
            indexed: 0,
            skipped_missing: corpus.skipped_missing,
            skipped_empty: corpus.skipped_empty,
        };

        if corpus.documents.is_empty() {
            log::warn!("no {source} documents to index");
            return Ok(report);
        }

        let bar = if self.show_progress {
            ProgressBar::new(corpus.documents.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(source.to_string());

        // sized by the encoder; `add` rejects vectors of any other length
        let mut index =
            FlatIndex::with_capacity(self.embedder.dimensions(), corpus.documents.len());
        let mut metadata = Vec::with_capacity(corpus.documents.len());

        for batch in corpus.documents.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|doc| doc.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }

            for (doc, vector) in batch.iter().zip(vectors) {
                index.add(&vector)?;
                metadata.push(doc.meta.clone());
            }
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        let corpus_index = CorpusIndex::new(source, index, metadata)?;
        corpus_index.save(self.store, &self.embedder.model_id_hash())?;

        report.indexed = corpus_index.len();
        log::info!(
            "saved {source} index with {} documents ({} missing, {} empty skipped)",
            report.indexed,
            report.skipped_missing,
            report.skipped_empty
        );

        Ok(report)
    }
}
