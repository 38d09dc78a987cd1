//! Process-wide wiring: data directory, config and the long-lived services.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use homedir::my_home;

use crate::builder::{self, BuildReport, IndexBuilder};
use crate::config::Config;
use crate::corpus::Source;
use crate::images::ImageIngestor;
use crate::retrieval::{EmbedderFactory, RetrievalService, RetrievalSettings};
use crate::semantic::{Embedder, EmbeddingModel};
use crate::storage::{BackendLocal, StorageManager};
use crate::web::SharedState;

const BASE_PATH_ENV: &str = "VTA_BASE_PATH";

/// Everything a command needs, built once from the data directory.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<BackendLocal>,
}

impl AppContext {
    /// Resolve the data directory and load its config.
    pub fn load() -> Result<Self> {
        Self::load_with(Self::get_base_path()?)
    }

    pub fn load_with(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let config = Config::load_with(&base_path)?;
        let store = Arc::new(
            BackendLocal::new(&base_path)
                .with_context(|| format!("cannot open data directory {}", base_path.display()))?,
        );

        Ok(Self { config, store })
    }

    fn get_base_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(BASE_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/virtual-ta"))
    }

    /// Factory for the configured fastembed model.
    pub fn embedder_factory(&self) -> EmbedderFactory {
        let model = self.config.model.clone();
        let cache_dir = self.config.base_path().to_path_buf();
        let timeout = Duration::from_secs(self.config.download_timeout_secs);

        Box::new(move || {
            let model = EmbeddingModel::new(&model, cache_dir.clone(), Some(timeout))?;
            Ok(Arc::new(model) as Arc<dyn Embedder>)
        })
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            notes_dir: self.config.notes_dir(),
            rehydrate_start_line: self.config.rehydrate_start_line,
            rehydrate_line_count: self.config.rehydrate_line_count,
        }
    }

    pub fn retrieval(&self, embedder_factory: EmbedderFactory) -> RetrievalService {
        RetrievalService::new(
            self.retrieval_settings(),
            self.store.clone() as Arc<dyn StorageManager>,
            embedder_factory,
        )
    }

    pub fn shared_state(&self, embedder_factory: EmbedderFactory) -> Arc<SharedState> {
        Arc::new(SharedState {
            retrieval: Arc::new(self.retrieval(embedder_factory)),
            images: Arc::new(ImageIngestor::new(
                self.config.image.clone(),
                self.store.clone() as Arc<dyn StorageManager>,
            )),
            default_top_k: self.config.default_top_k,
        })
    }

    /// Rebuild the index pair for one source from its configured corpus.
    pub fn build_index(
        &self,
        embedder: &dyn Embedder,
        source: Source,
        show_progress: bool,
    ) -> Result<BuildReport> {
        let corpus = match source {
            Source::Note => builder::load_notes(
                &self.config.resolve(&self.config.notes.metadata_file),
                &self.config.notes_dir(),
            )?,
            Source::Discourse => {
                builder::load_posts(&self.config.resolve(&self.config.discourse.posts_file))?
            }
        };

        let report = IndexBuilder::new(embedder, self.store.as_ref())
            .with_progress(show_progress)
            .build(source, corpus)?;

        Ok(report)
    }
}
