//! Shared fixtures: a deterministic embedder and a small corpus on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::builder::{load_notes, load_posts, IndexBuilder};
use crate::corpus::Source;
use crate::retrieval::{EmbedderFactory, RetrievalService, RetrievalSettings};
use crate::semantic::{Embedder, EmbeddingError};
use crate::storage::{BackendLocal, StorageManager};

/// Every word the fixtures use; each gets its own dimension.
const VOCAB: &[&str] = &[
    "the", "deadline", "for", "assignment", "submission", "is", "march", "5", "how", "do", "i",
    "join", "zoom", "session", "what", "are", "prerequisites", "exam", "website", "not",
    "loading", "properly", "where", "can", "find", "lecture", "notes", "when", "1", "2",
    "covers", "arrays", "store", "elements", "contiguously", "linked", "lists", "and",
    "pointers",
];

/// Bag-of-words embedder over `VOCAB`, L2-normalized.
///
/// Unknown words are ignored, so there are no hash collisions to reason about.
pub struct VocabEmbedder {
    name: String,
    fail: bool,
    calls: AtomicUsize,
}

impl Default for VocabEmbedder {
    fn default() -> Self {
        Self::named("vocab-test")
    }
}

impl VocabEmbedder {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Same model id as `default()`, but every embed call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for VocabEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        VOCAB.len()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::EmbeddingFailed("encoder offline".to_string()));
        }

        let mut vector = vec![0f32; VOCAB.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            if let Some(dim) = VOCAB.iter().position(|w| *w == token) {
                vector[dim] += 1.0;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

/// Factory handing out `embedder`, counting how often it is asked.
pub fn factory_for(embedder: Arc<VocabEmbedder>, built: Arc<AtomicUsize>) -> EmbedderFactory {
    Box::new(move || {
        built.fetch_add(1, Ordering::SeqCst);
        Ok(embedder.clone() as Arc<dyn Embedder>)
    })
}

pub const POSTS_JSON: &str = r#"[
    {"topic_title": "Deadline", "url": "https://forum.example/t/1", "content": "The deadline for assignment submission is March 5."},
    {"topic_title": "Zoom", "url": "https://forum.example/t/2", "content": "How do I join the Zoom session?"},
    {"topic_title": "Prerequisites", "url": "https://forum.example/t/3", "content": "What are the prerequisites for the exam?"},
    {"topic_title": "Website", "url": "https://forum.example/t/4", "content": "The website is not loading properly."},
    {"topic_title": "Lecture notes", "url": "https://forum.example/t/5", "content": "Where can I find the lecture notes?"}
]"#;

pub const WEEK1_NOTE: &str =
    "---\ntitle: Week 1\ndate: 2025-01-06\n---\nLecture 1 covers arrays.\nArrays store elements contiguously.\n";

pub const WEEK2_NOTE: &str =
    "---\ntitle: Week 2\ndate: 2025-01-13\n---\nLecture 2 covers linked lists and pointers.\n";

/// A data directory with both indexes built by `VocabEmbedder::default()`.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<BackendLocal>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_sources(&[Source::Note, Source::Discourse])
    }

    /// Build only the indexes for `sources`.
    pub fn with_sources(sources: &[Source]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BackendLocal::new(dir.path()).unwrap());

        std::fs::write(dir.path().join("posts.json"), POSTS_JSON).unwrap();
        let notes_dir = dir.path().join("markdown_files");
        std::fs::create_dir_all(&notes_dir).unwrap();
        std::fs::write(notes_dir.join("week1.md"), WEEK1_NOTE).unwrap();
        std::fs::write(notes_dir.join("week2.md"), WEEK2_NOTE).unwrap();
        std::fs::write(notes_dir.join("blank.md"), "---\ntitle: Blank\n---\n").unwrap();
        std::fs::write(
            dir.path().join("metadata.json"),
            r#"[
                {"title": "Week 1", "original_url": "https://notes.example/w1", "filename": "week1.md"},
                {"title": "Week 2", "original_url": "https://notes.example/w2", "filename": "week2.md"},
                {"title": "Blank", "original_url": "https://notes.example/b", "filename": "blank.md"},
                {"title": "Gone", "original_url": "https://notes.example/g", "filename": "gone.md"}
            ]"#,
        )
        .unwrap();

        let embedder = VocabEmbedder::default();
        let builder = IndexBuilder::new(&embedder, store.as_ref());
        for source in sources {
            let corpus = match source {
                Source::Note => load_notes(&dir.path().join("metadata.json"), &notes_dir),
                Source::Discourse => load_posts(&dir.path().join("posts.json")),
            }
            .unwrap();
            builder.build(*source, corpus).unwrap();
        }

        Self { dir, store }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.dir.path().join("markdown_files")
    }

    pub fn settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            notes_dir: self.notes_dir(),
            rehydrate_start_line: 5,
            rehydrate_line_count: 8,
        }
    }

    pub fn service_with(&self, factory: EmbedderFactory) -> RetrievalService {
        RetrievalService::new(
            self.settings(),
            self.store.clone() as Arc<dyn StorageManager>,
            factory,
        )
    }

    /// Service backed by a fresh `VocabEmbedder`, which is returned for inspection.
    pub fn service(&self) -> (RetrievalService, Arc<VocabEmbedder>) {
        let embedder = Arc::new(VocabEmbedder::default());
        let service = self.service_with(factory_for(
            embedder.clone(),
            Arc::new(AtomicUsize::new(0)),
        ));
        (service, embedder)
    }
}
