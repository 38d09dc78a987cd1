//! Question answering over the persisted note and forum indexes.
//!
//! Provides a high-level interface for retrieval:
//! - Loads the embedding model and both corpus indexes exactly once
//! - Embeds each question once and searches every requested source
//! - Resolves hits to answers, re-reading note content from disk

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::corpus::{CorpusError, CorpusHit, CorpusIndex, Source};
use crate::semantic::preprocess::line_window;
use crate::semantic::{Embedder, EmbeddingError, IndexError};
use crate::storage::StorageManager;

/// Shown instead of note content when the note file is gone
pub const MISSING_CONTENT_PLACEHOLDER: &str = "Content not available.";

/// Builds the embedder when the service initializes.
pub type EmbedderFactory =
    Box<dyn Fn() -> Result<Arc<dyn Embedder>, EmbeddingError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Embedding model unavailable: {0}")]
    Init(EmbeddingError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Which corpora a question is run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    Note,
    Discourse,
    #[default]
    All,
}

impl SourceFilter {
    /// Sources in visit order.
    pub fn sources(&self) -> &'static [Source] {
        match self {
            SourceFilter::Note => &[Source::Note],
            SourceFilter::Discourse => &[Source::Discourse],
            SourceFilter::All => &[Source::Discourse, Source::Note],
        }
    }
}

impl std::str::FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "note" => Ok(SourceFilter::Note),
            "discourse" => Ok(SourceFilter::Discourse),
            "all" => Ok(SourceFilter::All),
            other => Err(format!(
                "unknown source '{other}', expected note, discourse or all"
            )),
        }
    }
}

/// A matched document as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub title: String,
    pub url: String,
    pub content: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Paths and line window used to answer questions.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Directory the note files are re-read from
    pub notes_dir: PathBuf,
    /// First line (1-based) of the note content window
    pub rehydrate_start_line: usize,
    pub rehydrate_line_count: usize,
}

/// Counts of degraded-mode events, for logs and assertions.
#[derive(Debug, Default)]
pub struct DegradationCounters {
    unavailable_sources: AtomicU64,
    missing_note_files: AtomicU64,
    dropped_positions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DegradationSnapshot {
    /// Sources that failed to load at initialization
    pub unavailable_sources: u64,
    /// Note answers served with the placeholder
    pub missing_note_files: u64,
    /// Index positions with no metadata record
    pub dropped_positions: u64,
}

impl DegradationCounters {
    pub fn snapshot(&self) -> DegradationSnapshot {
        DegradationSnapshot {
            unavailable_sources: self.unavailable_sources.load(Ordering::Relaxed),
            missing_note_files: self.missing_note_files.load(Ordering::Relaxed),
            dropped_positions: self.dropped_positions.load(Ordering::Relaxed),
        }
    }
}

/// Components loaded once per process.
struct RetrievalState {
    embedder: Arc<dyn Embedder>,
    notes: Option<CorpusIndex>,
    discourse: Option<CorpusIndex>,
}

impl RetrievalState {
    fn corpus(&self, source: Source) -> Option<&CorpusIndex> {
        match source {
            Source::Note => self.notes.as_ref(),
            Source::Discourse => self.discourse.as_ref(),
        }
    }
}

pub struct RetrievalService {
    settings: RetrievalSettings,
    store: Arc<dyn StorageManager>,
    embedder_factory: EmbedderFactory,
    state: OnceCell<RetrievalState>,
    counters: DegradationCounters,
}

impl RetrievalService {
    /// Create a service in an uninitialized state.
    ///
    /// The embedder and indexes are loaded by `initialize()` or on the
    /// first `search()`, whichever comes first.
    pub fn new(
        settings: RetrievalSettings,
        store: Arc<dyn StorageManager>,
        embedder_factory: EmbedderFactory,
    ) -> Self {
        Self {
            settings,
            store,
            embedder_factory,
            state: OnceCell::new(),
            counters: DegradationCounters::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Force loading of the model and indexes.
    pub fn initialize(&self) -> Result<(), RetrievalError> {
        self.state().map(|_| ())
    }

    /// Number of documents loaded for `source`; 0 if absent or not initialized.
    pub fn indexed_count(&self, source: Source) -> usize {
        self.state
            .get()
            .and_then(|state| state.corpus(source))
            .map(CorpusIndex::len)
            .unwrap_or(0)
    }

    pub fn counters(&self) -> DegradationSnapshot {
        self.counters.snapshot()
    }

    /// Answer `question` with at most `top_k` documents.
    ///
    /// Each source contributes its own `top_k` nearest documents in distance
    /// order; sources are concatenated in visit order (discourse before notes)
    /// and the result is cut to `top_k`. Distances are not compared across
    /// sources.
    pub fn search(
        &self,
        question: &str,
        top_k: usize,
        filter: SourceFilter,
    ) -> Result<Vec<Answer>, RetrievalError> {
        if top_k == 0 {
            return Ok(vec![]);
        }

        let state = self.state()?;

        let corpora: Vec<&CorpusIndex> = filter
            .sources()
            .iter()
            .filter_map(|source| {
                let corpus = state.corpus(*source);
                if corpus.is_none() {
                    log::debug!("{source} index not loaded, skipping");
                }
                corpus
            })
            .collect();

        if corpora.is_empty() {
            return Ok(vec![]);
        }

        let query = state.embedder.embed(question)?;

        let mut answers = Vec::with_capacity(top_k);
        for corpus in corpora {
            // later sources cannot make it past the cut
            if answers.len() >= top_k {
                break;
            }

            let hits = corpus.search(&query, top_k)?;
            let dropped = top_k.min(corpus.len()).saturating_sub(hits.len());
            if dropped > 0 {
                self.counters
                    .dropped_positions
                    .fetch_add(dropped as u64, Ordering::Relaxed);
            }

            answers.extend(hits.into_iter().map(|hit| self.resolve(corpus.source(), hit)));
        }
        answers.truncate(top_k);

        Ok(answers)
    }

    /// Turn a hit into an answer for the index it was found in.
    fn resolve(&self, source: Source, hit: CorpusHit<'_>) -> Answer {
        let meta = hit.meta;
        log::debug!(
            "{source} hit #{} '{}' at distance {:.4}",
            hit.neighbor.position,
            meta.title,
            hit.neighbor.distance
        );
        if let Some(tagged) = meta.source.filter(|tagged| *tagged != source) {
            log::warn!(
                "record '{}' in the {source} index is tagged {tagged}",
                meta.title
            );
        }

        match source {
            Source::Note => Answer {
                title: meta.title.clone(),
                url: String::new(),
                content: self.rehydrate_note(meta.filename.as_deref()),
                source: Source::Note,
                filename: meta.filename.clone(),
            },
            Source::Discourse => Answer {
                title: meta.title.clone(),
                url: meta.url.clone(),
                content: meta.content.clone(),
                source: Source::Discourse,
                filename: meta.filename.clone(),
            },
        }
    }

    /// Read the configured line window of a note, or the placeholder.
    fn rehydrate_note(&self, filename: Option<&str>) -> String {
        let Some(filename) = filename else {
            self.counters
                .missing_note_files
                .fetch_add(1, Ordering::Relaxed);
            log::warn!("note record without filename, serving placeholder");
            return MISSING_CONTENT_PLACEHOLDER.to_string();
        };

        let path = self.settings.notes_dir.join(filename);
        match std::fs::read_to_string(&path) {
            Ok(raw) => line_window(
                &raw,
                self.settings.rehydrate_start_line,
                self.settings.rehydrate_line_count,
            ),
            Err(err) => {
                self.counters
                    .missing_note_files
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("cannot read note {}: {err}", path.display());
                MISSING_CONTENT_PLACEHOLDER.to_string()
            }
        }
    }

    fn state(&self) -> Result<&RetrievalState, RetrievalError> {
        self.state.get_or_try_init(|| self.do_init())
    }

    fn do_init(&self) -> Result<RetrievalState, RetrievalError> {
        let embedder = (self.embedder_factory)().map_err(RetrievalError::Init)?;
        log::info!(
            "initializing retrieval with model '{}' ({} dimensions)",
            embedder.name(),
            embedder.dimensions()
        );

        let notes = self.load_corpus(embedder.as_ref(), Source::Note);
        let discourse = self.load_corpus(embedder.as_ref(), Source::Discourse);

        Ok(RetrievalState {
            embedder,
            notes,
            discourse,
        })
    }

    fn load_corpus(&self, embedder: &dyn Embedder, source: Source) -> Option<CorpusIndex> {
        match CorpusIndex::load(
            self.store.as_ref(),
            source,
            &embedder.model_id_hash(),
            embedder.dimensions(),
        ) {
            Ok(corpus) => {
                if corpus.is_empty() {
                    log::warn!("{source} index holds no documents");
                }
                log::info!(
                    "loaded {} {source} documents ({} dimensions)",
                    corpus.len(),
                    corpus.dimensions()
                );
                Some(corpus)
            }
            Err(err) => {
                self.counters
                    .unavailable_sources
                    .fetch_add(1, Ordering::Relaxed);
                match err {
                    CorpusError::Missing(ident) => {
                        log::warn!("{source} search disabled: {ident} not found")
                    }
                    err => log::error!("{source} search disabled: {err}"),
                }
                None
            }
        }
    }
}
