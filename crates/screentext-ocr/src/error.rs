use screentext_types::ImageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("{engine} engine has been released and is no longer available")]
    Disposed { engine: &'static str },

    #[error("unsupported OCR engine '{name}'")]
    UnsupportedEngine { name: String },

    #[error("{engine} engine failed: {message}")]
    Backend {
        engine: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl OcrError {
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    pub fn disposed(engine: &'static str) -> Self {
        Self::Disposed { engine }
    }

    pub fn unsupported_engine(name: impl Into<String>) -> Self {
        Self::UnsupportedEngine { name: name.into() }
    }

    pub fn backend(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            engine,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<ImageError> for OcrError {
    fn from(err: ImageError) -> Self {
        Self::InvalidImage {
            reason: err.to_string(),
        }
    }
}
