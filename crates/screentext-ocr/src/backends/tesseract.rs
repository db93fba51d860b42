use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::ColorType;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use leptess::LepTess;
use tracing::{debug, warn};

use screentext_types::ImageBuffer;

use crate::config::OcrConfig;
use crate::engine::TextEngine;
use crate::error::OcrError;
use crate::preprocess;

/// Fixed trained-data subfolder resolved next to the running executable.
pub const TESSDATA_DIR_NAME: &str = "tessdata";

/// Settings for the classical recognition engine.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Directory of trained-data files; `tessdata/` next to the executable
    /// when absent.
    pub data_dir: Option<PathBuf>,
    pub language: String,
}

impl TesseractConfig {
    pub fn from_shared(config: &OcrConfig) -> Self {
        Self {
            data_dir: config.tessdata_dir.clone(),
            language: config.language.clone(),
        }
    }

    pub fn default_data_dir() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        exe.parent().map(|dir| dir.join(TESSDATA_DIR_NAME))
    }
}

struct TessContext(LepTess);

// The raw TessBaseAPI pointer inside LepTess is only touched while the
// engine mutex is held.
unsafe impl Send for TessContext {}

/// Classical recognition engine over a long-lived tesseract context.
///
/// Input is always conditioned (grayscale, binarize, denoise) before it
/// reaches the engine; recognition quality collapses on raw captures.
pub struct TesseractEngine {
    inner: Mutex<Option<TessContext>>,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let data_dir = config.data_dir.clone().or_else(TesseractConfig::default_data_dir);
        let data_dir_str = match &data_dir {
            Some(path) => Some(utf8_path(path)?),
            None => None,
        };
        let context = LepTess::new(data_dir_str, &config.language).map_err(|err| {
            OcrError::backend(
                "tesseract",
                format!(
                    "failed to initialise engine for language '{}': {err}",
                    config.language
                ),
            )
        })?;
        debug!(language = %config.language, "tesseract engine initialised");
        Ok(Self {
            inner: Mutex::new(Some(TessContext(context))),
        })
    }

    fn recognize_locked(context: &mut TessContext, image: &ImageBuffer) -> Result<String, OcrError> {
        let conditioned = preprocess::condition(image)?;
        let png = encode_png(&conditioned)?;
        context
            .0
            .set_image_from_mem(&png)
            .map_err(|err| OcrError::backend("tesseract", format!("failed to load image: {err}")))?;
        let text = context
            .0
            .get_utf8_text()
            .map_err(|err| OcrError::backend("tesseract", format!("recognition failed: {err}")))?;
        Ok(text.trim().to_string())
    }
}

impl TextEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    /// Unlike the neural engine, internal failures collapse to an empty
    /// string; only disposal surfaces as an error.
    fn recognize(&self, image: &ImageBuffer) -> Result<String, OcrError> {
        let mut guard = self.inner.lock().expect("tesseract engine poisoned");
        let context = guard
            .as_mut()
            .ok_or_else(|| OcrError::disposed("tesseract"))?;
        match Self::recognize_locked(context, image) {
            Ok(text) => Ok(text),
            Err(err) => {
                warn!(error = %err, "tesseract recognition failed; returning empty text");
                Ok(String::new())
            }
        }
    }

    fn dispose(&self) {
        if self
            .inner
            .lock()
            .expect("tesseract engine poisoned")
            .take()
            .is_some()
        {
            debug!("tesseract engine released");
        }
    }
}

/// The in-memory handoff format the engine accepts.
fn encode_png(image: &ImageBuffer) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(image.data(), image.width(), image.height(), ColorType::L8)
        .map_err(|err| {
            OcrError::backend("tesseract", format!("failed to encode image: {err}"))
        })?;
    Ok(buffer)
}

fn utf8_path(path: &Path) -> Result<&str, OcrError> {
    path.to_str().ok_or_else(|| {
        OcrError::configuration(format!(
            "tessdata path '{}' is not valid UTF-8",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use screentext_types::PixelFormat;

    #[test]
    fn shared_config_defaults_to_exe_relative_tessdata() {
        let config = TesseractConfig::from_shared(&OcrConfig::default());
        assert_eq!(config.language, "eng");
        assert!(config.data_dir.is_none());

        if let Some(dir) = TesseractConfig::default_data_dir() {
            assert!(dir.ends_with(TESSDATA_DIR_NAME));
        }
    }

    #[test]
    fn conditioned_output_encodes_as_png() {
        let image = ImageBuffer::from_owned(3, 2, PixelFormat::Gray8, vec![0, 255, 0, 255, 0, 255])
            .unwrap();
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
