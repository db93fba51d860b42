mod backends;
mod config;
mod engine;
mod error;
pub mod preprocess;
mod registry;
mod service;

#[cfg(feature = "engine-paddle")]
pub use backends::paddle::{PaddleConfig, PaddleEngine};
#[cfg(feature = "engine-tesseract")]
pub use backends::tesseract::{TesseractConfig, TesseractEngine, TESSDATA_DIR_NAME};
pub use config::{DEFAULT_LANGUAGE, EngineKind, OcrConfig};
pub use engine::{NoopEngine, TextEngine};
pub use error::OcrError;
pub use preprocess::condition;
pub use registry::{EngineBuilder, EngineRegistry, SharedEngine};
pub use service::{EngineSelection, OcrService};
