use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::semantic::DEFAULT_MODEL;
use crate::storage::{self, StorageManager};

const CONFIG_IDENT: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TOP_K: usize = 5;
/// Notes carry a fixed-size front-matter block; the body starts at line 5
const DEFAULT_REHYDRATE_START_LINE: usize = 5;
const DEFAULT_REHYDRATE_LINE_COUNT: usize = 8;

/// Where the offline builder finds note files
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotesConfig {
    /// Directory holding the note files
    #[serde(default = "default_notes_dir")]
    pub dir: String,

    /// JSON list of `{title, original_url, filename}`
    #[serde(default = "default_notes_metadata_file")]
    pub metadata_file: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            dir: default_notes_dir(),
            metadata_file: default_notes_metadata_file(),
        }
    }
}

fn default_notes_dir() -> String {
    "markdown_files".to_string()
}

fn default_notes_metadata_file() -> String {
    "metadata.json".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiscourseConfig {
    /// JSON list of `{topic_title, url, content}`
    #[serde(default = "default_posts_file")]
    pub posts_file: String,
}

impl Default for DiscourseConfig {
    fn default() -> Self {
        Self {
            posts_file: default_posts_file(),
        }
    }
}

fn default_posts_file() -> String {
    "discourse_posts.json".to_string()
}

/// What happens to an image attached to a question
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// Extract text with tesseract and echo it back
    #[default]
    Ocr,
    /// Store the decoded bytes for later inspection
    Save,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    #[serde(default)]
    pub mode: ImageMode,

    /// File name (inside the data directory) used in `save` mode
    #[serde(default = "default_image_save_as")]
    pub save_as: String,

    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,

    /// Tesseract language code
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            mode: ImageMode::default(),
            save_as: default_image_save_as(),
            tesseract_bin: default_tesseract_bin(),
            lang: default_ocr_lang(),
        }
    }
}

fn default_image_save_as() -> String {
    "uploaded_image.png".to_string()
}

fn default_tesseract_bin() -> String {
    "tesseract".to_string()
}

fn default_ocr_lang() -> String {
    "eng".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Result budget used by the CLI when none is given
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default)]
    pub notes: NotesConfig,

    #[serde(default)]
    pub discourse: DiscourseConfig,

    /// First line (1-based) of a note shown as answer content
    #[serde(default = "default_rehydrate_start_line")]
    pub rehydrate_start_line: usize,

    #[serde(default = "default_rehydrate_line_count")]
    pub rehydrate_line_count: usize,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            model: default_model(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            default_top_k: DEFAULT_TOP_K,
            notes: NotesConfig::default(),
            discourse: DiscourseConfig::default(),
            rehydrate_start_line: DEFAULT_REHYDRATE_START_LINE,
            rehydrate_line_count: DEFAULT_REHYDRATE_LINE_COUNT,
            image: ImageConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_rehydrate_start_line() -> usize {
    DEFAULT_REHYDRATE_START_LINE
}

fn default_rehydrate_line_count() -> usize {
    DEFAULT_REHYDRATE_LINE_COUNT
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.model.trim().is_empty() {
            bail!("model cannot be empty");
        }

        if self.download_timeout_secs == 0 {
            bail!("download_timeout_secs must be greater than 0");
        }

        if self.default_top_k == 0 {
            bail!("default_top_k must be greater than 0");
        }

        if self.rehydrate_start_line == 0 {
            bail!("rehydrate_start_line is 1-based, got 0");
        }

        if self.image.mode == ImageMode::Save && self.image.save_as.trim().is_empty() {
            bail!("image.save_as cannot be empty in save mode");
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults if absent.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path.as_ref())
            .with_context(|| format!("cannot create {}", base_path.as_ref().display()))?;

        if !store.exists(CONFIG_IDENT) {
            store.write(CONFIG_IDENT, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_IDENT)?)
            .context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.as_ref().to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;
        store.write(CONFIG_IDENT, serde_yml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path against the data directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.resolve(&self.notes.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join("config.yaml").exists());
        assert_eq!(config.model, "all-MiniLM-L6-v2");
        assert_eq!(config.rehydrate_start_line, 5);
        assert_eq!(config.rehydrate_line_count, 8);
        assert_eq!(config.image.mode, ImageMode::Ocr);
        assert_eq!(config.notes_dir(), tmp.path().join("markdown_files"));
    }

    #[test]
    fn test_partial_config_fills_defaults_and_resaves() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.yaml"),
            "listen_addr: 127.0.0.1:9000\nimage:\n  mode: save\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.image.mode, ImageMode::Save);
        assert_eq!(config.image.save_as, "uploaded_image.png");

        let saved = std::fs::read_to_string(tmp.path().join("config.yaml")).unwrap();
        assert!(saved.contains("rehydrate_start_line"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "default_top_k: 0\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());

        std::fs::write(tmp.path().join("config.yaml"), "rehydrate_start_line: 0\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_malformed_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "image: [not, a, map]\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }
}
