use std::sync::Arc;

use screentext_types::ImageBuffer;

use crate::config::EngineKind;
use crate::error::OcrError;
use crate::registry::EngineRegistry;

/// Live source of the "selected OCR engine" setting.
///
/// Queried on every call so a configuration change takes effect on the next
/// recognition without restarting the process.
pub trait EngineSelection: Send + Sync {
    fn selected_engine(&self) -> Option<String>;
}

impl<F> EngineSelection for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn selected_engine(&self) -> Option<String> {
        self()
    }
}

/// The single recognition entry point used by the rest of the application.
pub struct OcrService {
    registry: Arc<EngineRegistry>,
    selection: Arc<dyn EngineSelection>,
}

impl OcrService {
    pub fn new(registry: Arc<EngineRegistry>, selection: Arc<dyn EngineSelection>) -> Self {
        Self {
            registry,
            selection,
        }
    }

    /// The engine the next recognition call will route to, derived from the
    /// live configuration value.
    pub fn current_engine(&self) -> EngineKind {
        EngineKind::from_setting(self.selection.selected_engine().as_deref())
    }

    /// Recognizes text with the currently selected engine.
    ///
    /// No retry logic: a backend failure is this call's failure, and the
    /// classical engine's empty-string policy passes through unchanged.
    pub fn recognize(&self, image: &ImageBuffer) -> Result<String, OcrError> {
        let engine = self.registry.get(self.current_engine())?;
        engine.recognize(image)
    }
}
