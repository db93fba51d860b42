use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::OcrError;

/// Closed set of recognition engines the service can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Paddle,
    Tesseract,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Paddle => "paddle",
            EngineKind::Tesseract => "tesseract",
        }
    }

    /// Lenient resolution used for the live "selected OCR engine" setting.
    ///
    /// A case-insensitive `"tesseract"` selects the classical engine;
    /// anything else, including an absent or empty value, selects the
    /// neural default.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value {
            Some(name) if name.trim().eq_ignore_ascii_case("tesseract") => EngineKind::Tesseract,
            _ => EngineKind::Paddle,
        }
    }
}

impl FromStr for EngineKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paddle" | "paddleocr" => Ok(EngineKind::Paddle),
            "tesseract" => Ok(EngineKind::Tesseract),
            other => Err(OcrError::unsupported_engine(other)),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction-time settings shared by the engine registry.
///
/// The live engine selection is deliberately not part of this struct; it is
/// re-read on every recognition call through
/// [`EngineSelection`](crate::EngineSelection).
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Recognition model file for the paddle engine.
    pub model_path: Option<PathBuf>,
    /// Character dictionary for the paddle engine; a built-in ASCII set is
    /// used when absent.
    pub dictionary_path: Option<PathBuf>,
    /// Directory holding tesseract trained data; defaults to `tessdata/`
    /// next to the running executable.
    pub tessdata_dir: Option<PathBuf>,
    /// Trained-data language for the tesseract engine.
    pub language: String,
}

pub const DEFAULT_LANGUAGE: &str = "eng";

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            dictionary_path: None,
            tessdata_dir: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_resolution_is_case_insensitive() {
        assert_eq!(
            EngineKind::from_setting(Some("TeSsErAcT")),
            EngineKind::Tesseract
        );
        assert_eq!(
            EngineKind::from_setting(Some(" tesseract ")),
            EngineKind::Tesseract
        );
    }

    #[test]
    fn unknown_or_absent_setting_selects_the_neural_default() {
        assert_eq!(EngineKind::from_setting(None), EngineKind::Paddle);
        assert_eq!(EngineKind::from_setting(Some("")), EngineKind::Paddle);
        assert_eq!(
            EngineKind::from_setting(Some("paddleocr")),
            EngineKind::Paddle
        );
        assert_eq!(
            EngineKind::from_setting(Some("easyocr")),
            EngineKind::Paddle
        );
    }

    #[test]
    fn strict_parse_rejects_unknown_names() {
        assert!(matches!(
            "easyocr".parse::<EngineKind>(),
            Err(OcrError::UnsupportedEngine { name }) if name == "easyocr"
        ));
        assert_eq!("PaddleOCR".parse::<EngineKind>().unwrap(), EngineKind::Paddle);
        assert_eq!("tesseract".parse::<EngineKind>().unwrap(), EngineKind::Tesseract);
    }
}
