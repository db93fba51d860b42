use screentext_types::ImageBuffer;

use crate::error::OcrError;

/// Common interface for all recognition engines.
pub trait TextEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extracts plain text from a captured image.
    ///
    /// The buffer is borrowed for the duration of the call and never
    /// retained. Calls on one engine instance are serialized internally;
    /// the native contexts are not proven re-entrant.
    fn recognize(&self, image: &ImageBuffer) -> Result<String, OcrError>;

    /// Releases the native recognition context. Idempotent; every later
    /// operation fails with [`OcrError::Disposed`].
    fn dispose(&self);
}

/// Placeholder engine used while a real backend is not wired.
#[derive(Debug, Default)]
pub struct NoopEngine;

impl TextEngine for NoopEngine {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn recognize(&self, _: &ImageBuffer) -> Result<String, OcrError> {
        Ok(String::new())
    }

    fn dispose(&self) {}
}
