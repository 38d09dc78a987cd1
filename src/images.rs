//! Handling of images attached to questions.
//!
//! Depending on `image.mode` an image is either run through tesseract or
//! stored as-is. Failures never fail the request: they come back as text.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;

use crate::config::{ImageConfig, ImageMode};
use crate::storage::StorageManager;

const ERROR_PREFIX: &str = "Error in image processing";

/// What became of an attached image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Extracted text, or the error string in OCR mode
    pub text: Option<String>,
    /// Stored file, or the error string in save mode
    pub saved: Option<String>,
}

pub struct ImageIngestor {
    config: ImageConfig,
    store: Arc<dyn StorageManager>,
}

impl ImageIngestor {
    pub fn new(config: ImageConfig, store: Arc<dyn StorageManager>) -> Self {
        Self { config, store }
    }

    /// Process a base64 image according to the configured mode.
    pub fn ingest(&self, image_b64: &str) -> ImageReport {
        match self.config.mode {
            ImageMode::Ocr => ImageReport {
                text: Some(self.extract_text(image_b64).unwrap_or_else(|err| {
                    log::warn!("ocr failed: {err:#}");
                    format!("{ERROR_PREFIX}: {err:#}")
                })),
                saved: None,
            },
            ImageMode::Save => ImageReport {
                text: None,
                saved: Some(match self.save(image_b64) {
                    Ok(path) => path.display().to_string(),
                    Err(err) => {
                        log::warn!("saving image failed: {err:#}");
                        format!("{ERROR_PREFIX}: {err:#}")
                    }
                }),
            },
        }
    }

    /// Run tesseract over the image and return whitespace-joined text.
    pub fn extract_text(&self, image_b64: &str) -> Result<String> {
        let data = decode(image_b64)?;
        let img = image::load_from_memory(&data).context("Failed to decode image")?;

        let mut tmpfile = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .context("Failed to create temp file")?;
        img.to_rgb8()
            .write_to(tmpfile.as_file_mut(), ImageFormat::Png)
            .context("Failed to write temp image")?;

        log::debug!(
            "running {} on {}",
            self.config.tesseract_bin,
            tmpfile.path().display()
        );

        let output = Command::new(&self.config.tesseract_bin)
            .arg(tmpfile.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.lang)
            .output()
            .with_context(|| format!("Failed to execute {}", self.config.tesseract_bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Command failed ({}): {}", output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Store the decoded bytes under the configured name.
    pub fn save(&self, image_b64: &str) -> Result<PathBuf> {
        let data = decode(image_b64)?;
        self.store
            .write(&self.config.save_as, &data)
            .with_context(|| format!("Failed to store {}", self.config.save_as))?;

        Ok(PathBuf::from(&self.config.save_as))
    }
}

/// Decode base64, accepting a `data:<mime>;base64,` prefix.
fn decode(image_b64: &str) -> Result<Vec<u8>> {
    let payload = match image_b64.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => image_b64,
    };

    STANDARD
        .decode(payload.trim())
        .context("Invalid base64 image")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendLocal;

    fn create_test_png() -> Vec<u8> {
        let mut img = image::RgbaImage::new(4, 4);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));

        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        buf
    }

    fn ingestor(mode: ImageMode, dir: &std::path::Path) -> (ImageIngestor, Arc<BackendLocal>) {
        let store = Arc::new(BackendLocal::new(dir).unwrap());
        let config = ImageConfig {
            mode,
            tesseract_bin: "definitely-not-a-real-tesseract".to_string(),
            ..Default::default()
        };
        (ImageIngestor::new(config, store.clone()), store)
    }

    #[test]
    fn test_decode_plain_and_data_url() {
        let encoded = STANDARD.encode(b"abc");
        assert_eq!(decode(&encoded).unwrap(), b"abc");
        assert_eq!(
            decode(&format!("data:image/png;base64,{encoded}")).unwrap(),
            b"abc"
        );
    }

    #[test]
    fn test_save_mode_writes_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let (ingestor, store) = ingestor(ImageMode::Save, tmp.path());
        let png = create_test_png();

        let report = ingestor.ingest(&STANDARD.encode(&png));

        assert_eq!(report.text, None);
        assert_eq!(report.saved.as_deref(), Some("uploaded_image.png"));
        assert_eq!(store.read("uploaded_image.png").unwrap(), png);
    }

    #[test]
    fn test_save_mode_bad_base64_is_reported_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let (ingestor, store) = ingestor(ImageMode::Save, tmp.path());

        let report = ingestor.ingest("%%% not base64 %%%");

        let saved = report.saved.unwrap();
        assert!(saved.starts_with("Error in image processing: Invalid base64 image"));
        assert!(!store.exists("uploaded_image.png"));
    }

    #[test]
    fn test_ocr_mode_rejects_non_image() {
        let tmp = tempfile::tempdir().unwrap();
        let (ingestor, _) = ingestor(ImageMode::Ocr, tmp.path());

        let report = ingestor.ingest(&STANDARD.encode(b"plain bytes"));

        assert_eq!(report.saved, None);
        assert!(report
            .text
            .unwrap()
            .starts_with("Error in image processing: Failed to decode image"));
    }

    #[test]
    fn test_ocr_mode_missing_binary_is_reported_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let (ingestor, _) = ingestor(ImageMode::Ocr, tmp.path());

        let report = ingestor.ingest(&STANDARD.encode(create_test_png()));

        let text = report.text.unwrap();
        assert!(text.starts_with("Error in image processing: Failed to execute"));
    }
}
