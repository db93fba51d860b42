use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{EngineKind, OcrConfig};
use crate::engine::TextEngine;
use crate::error::OcrError;

pub type SharedEngine = Arc<dyn TextEngine>;
pub type EngineBuilder = Box<dyn Fn() -> Result<SharedEngine, OcrError> + Send + Sync>;

struct EngineSlot {
    builder: EngineBuilder,
    cell: OnceCell<SharedEngine>,
}

impl EngineSlot {
    fn new(builder: EngineBuilder) -> Self {
        Self {
            builder,
            cell: OnceCell::new(),
        }
    }

    fn get(&self) -> Result<SharedEngine, OcrError> {
        // get_or_try_init leaves the slot empty on failure, so a transient
        // construction error is not cached for the lifetime of the process.
        self.cell.get_or_try_init(|| (self.builder)()).cloned()
    }
}

/// Owns the process-wide engine instances.
///
/// Each variant is constructed at most once, on first demand, and released
/// exactly once through [`release_all`](EngineRegistry::release_all). The
/// registry does not support reinitialization after release; a later `get`
/// fails with [`OcrError::Disposed`].
pub struct EngineRegistry {
    paddle: EngineSlot,
    tesseract: EngineSlot,
    released: AtomicBool,
}

impl EngineRegistry {
    /// Wires the real backends for the engines compiled into this build.
    pub fn new(config: &OcrConfig) -> Self {
        let paddle_config = config.clone();
        let tesseract_config = config.clone();
        Self::with_builders(
            Box::new(move || build_paddle(&paddle_config)),
            Box::new(move || build_tesseract(&tesseract_config)),
        )
    }

    /// Builds a registry from custom engine constructors.
    pub fn with_builders(paddle: EngineBuilder, tesseract: EngineBuilder) -> Self {
        Self {
            paddle: EngineSlot::new(paddle),
            tesseract: EngineSlot::new(tesseract),
            released: AtomicBool::new(false),
        }
    }

    /// Returns the shared instance for `kind`, constructing it on the first
    /// call from any thread.
    pub fn get(&self, kind: EngineKind) -> Result<SharedEngine, OcrError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(OcrError::disposed(kind.as_str()));
        }
        let engine = self.slot(kind).get()?;
        // A release that raced the construction above has already missed
        // this instance; dispose is idempotent, so tear it down here.
        if self.released.load(Ordering::SeqCst) {
            engine.dispose();
            return Err(OcrError::disposed(kind.as_str()));
        }
        Ok(engine)
    }

    /// Releases every constructed engine exactly once, in any order.
    ///
    /// The second and later calls are no-ops.
    pub fn release_all(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in [&self.paddle, &self.tesseract] {
            if let Some(engine) = slot.cell.get() {
                debug!(engine = engine.name(), "releasing recognition engine");
                engine.dispose();
            }
        }
    }

    fn slot(&self, kind: EngineKind) -> &EngineSlot {
        match kind {
            EngineKind::Paddle => &self.paddle,
            EngineKind::Tesseract => &self.tesseract,
        }
    }
}

#[cfg(feature = "engine-paddle")]
fn build_paddle(config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    use crate::backends::paddle::{PaddleConfig, PaddleEngine};
    let engine = PaddleEngine::new(PaddleConfig::from_shared(config)?)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "engine-paddle"))]
fn build_paddle(_config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    Err(OcrError::configuration(
        "paddle engine is not compiled in; rebuild with the \"engine-paddle\" feature",
    ))
}

#[cfg(feature = "engine-tesseract")]
fn build_tesseract(config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    use crate::backends::tesseract::{TesseractConfig, TesseractEngine};
    let engine = TesseractEngine::new(TesseractConfig::from_shared(config))?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "engine-tesseract"))]
fn build_tesseract(_config: &OcrConfig) -> Result<SharedEngine, OcrError> {
    Err(OcrError::configuration(
        "tesseract engine is not compiled in; rebuild with the \"engine-tesseract\" feature",
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::engine::NoopEngine;
    use screentext_types::ImageBuffer;

    struct CountingEngine {
        name: &'static str,
        disposals: Arc<AtomicUsize>,
    }

    impl TextEngine for CountingEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn recognize(&self, _: &ImageBuffer) -> Result<String, OcrError> {
            Ok(self.name.to_string())
        }

        fn dispose(&self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_builder(
        name: &'static str,
        constructions: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
    ) -> EngineBuilder {
        Box::new(move || {
            constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingEngine {
                name,
                disposals: Arc::clone(&disposals),
            }) as SharedEngine)
        })
    }

    fn noop_builder() -> EngineBuilder {
        Box::new(|| Ok(Arc::new(NoopEngine) as SharedEngine))
    }

    #[test]
    fn concurrent_first_calls_construct_exactly_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let disposals = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(EngineRegistry::with_builders(
            counting_builder("paddle", Arc::clone(&constructions), disposals),
            noop_builder(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get(EngineKind::Paddle).unwrap())
            })
            .collect();
        let engines: Vec<SharedEngine> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        for engine in &engines[1..] {
            assert!(Arc::ptr_eq(&engines[0], engine));
        }
    }

    #[test]
    fn get_after_release_fails_disposed_from_any_thread() {
        let registry = Arc::new(EngineRegistry::with_builders(
            noop_builder(),
            noop_builder(),
        ));
        registry.get(EngineKind::Tesseract).unwrap();
        registry.release_all();

        assert!(matches!(
            registry.get(EngineKind::Tesseract),
            Err(OcrError::Disposed { .. })
        ));

        let remote = Arc::clone(&registry);
        let result = thread::spawn(move || remote.get(EngineKind::Paddle))
            .join()
            .unwrap();
        assert!(matches!(result, Err(OcrError::Disposed { .. })));
    }

    #[test]
    fn double_release_disposes_each_engine_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let disposals = Arc::new(AtomicUsize::new(0));
        let registry = EngineRegistry::with_builders(
            counting_builder("paddle", constructions, Arc::clone(&disposals)),
            noop_builder(),
        );
        registry.get(EngineKind::Paddle).unwrap();

        registry.release_all();
        registry.release_all();
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_skips_engines_never_constructed() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let registry = EngineRegistry::with_builders(
            counting_builder("paddle", Arc::new(AtomicUsize::new(0)), Arc::clone(&disposals)),
            noop_builder(),
        );
        registry.release_all();
        assert_eq!(disposals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let healthy = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&healthy);
        let registry = EngineRegistry::with_builders(
            Box::new(move || {
                if gate.load(Ordering::SeqCst) {
                    Ok(Arc::new(NoopEngine) as SharedEngine)
                } else {
                    Err(OcrError::backend("paddle", "model file missing"))
                }
            }),
            noop_builder(),
        );

        assert!(registry.get(EngineKind::Paddle).is_err());
        healthy.store(true, Ordering::SeqCst);
        assert!(registry.get(EngineKind::Paddle).is_ok());
    }
}
