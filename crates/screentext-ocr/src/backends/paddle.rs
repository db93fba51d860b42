use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ndarray::{Array4, CowArray, IxDyn};
use once_cell::sync::OnceCell;
use ort::environment::Environment;
use ort::session::{Session, SessionBuilder};
use ort::value::Value;
use tracing::debug;

use screentext_types::ImageBuffer;

use crate::config::OcrConfig;
use crate::engine::TextEngine;
use crate::error::OcrError;
use crate::preprocess;

const INPUT_HEIGHT: usize = 48;
const INPUT_WIDTH: usize = 320;

// Row-projection line split over raw luma. A row counts as active when
// enough of its pixels deviate from the background (median) luma.
const LINE_CONTRAST_DELTA: i16 = 32;
const LINE_ACTIVITY_THRESHOLD: f32 = 0.02;
const LINE_GAP_BRIDGE: usize = 2;
const MIN_LINE_HEIGHT: usize = 4;
const LINE_MARGIN: usize = 2;

static ENVIRONMENT: OnceCell<Arc<Environment>> = OnceCell::new();

fn environment() -> Result<Arc<Environment>, OcrError> {
    ENVIRONMENT
        .get_or_try_init(|| {
            Environment::builder()
                .with_name("screentext-ocr")
                .build()
                .map(Arc::new)
                .map_err(|err| {
                    OcrError::backend(
                        "paddle",
                        format!("failed to initialise ONNX runtime environment: {err}"),
                    )
                })
        })
        .cloned()
}

/// Settings for the neural recognition engine.
#[derive(Debug, Clone)]
pub struct PaddleConfig {
    pub model_path: PathBuf,
    pub dictionary_path: Option<PathBuf>,
    /// Rotated-text detection. Inputs are assumed upright; enabling this
    /// fails construction because no angle model is bundled.
    pub allow_rotated_text: bool,
    /// 180-degree orientation classification, disabled for the same reason.
    pub classify_orientation: bool,
}

impl PaddleConfig {
    pub fn new(model_path: PathBuf) -> Self {
        Self {
            model_path,
            dictionary_path: None,
            allow_rotated_text: false,
            classify_orientation: false,
        }
    }

    pub fn from_shared(config: &OcrConfig) -> Result<Self, OcrError> {
        let model_path = config.model_path.clone().ok_or_else(|| {
            OcrError::configuration(
                "paddle engine requires a recognition model; set `model` in the \
                 configuration file or pass --model",
            )
        })?;
        Ok(Self {
            model_path,
            dictionary_path: config.dictionary_path.clone(),
            allow_rotated_text: false,
            classify_orientation: false,
        })
    }
}

struct PaddleContext {
    _environment: Arc<Environment>,
    session: Session,
    alphabet: Vec<char>,
}

/// Neural recognition engine over an ONNX PP-OCR recognition model.
///
/// Operates on the raw capture; the conditioning pipeline is deliberately
/// not applied here, since the model is trained on unbinarized input.
pub struct PaddleEngine {
    inner: Mutex<Option<PaddleContext>>,
}

impl PaddleEngine {
    pub fn new(config: PaddleConfig) -> Result<Self, OcrError> {
        if config.allow_rotated_text || config.classify_orientation {
            return Err(OcrError::configuration(
                "rotated-text detection and orientation classification are disabled; \
                 inputs are assumed upright",
            ));
        }
        if !config.model_path.exists() {
            return Err(OcrError::backend(
                "paddle",
                format!(
                    "recognition model '{}' does not exist",
                    config.model_path.display()
                ),
            ));
        }

        let alphabet = match &config.dictionary_path {
            Some(path) => load_dictionary(path)?,
            None => default_alphabet(),
        };

        let environment = environment()?;
        let session = SessionBuilder::new(&environment)
            .map_err(map_session_error)?
            .with_model_from_file(&config.model_path)
            .map_err(map_session_error)?;
        debug!(model = %config.model_path.display(), "paddle engine initialised");

        Ok(Self {
            inner: Mutex::new(Some(PaddleContext {
                _environment: environment,
                session,
                alphabet,
            })),
        })
    }

    fn recognize_line(
        context: &PaddleContext,
        gray: &[u8],
        width: usize,
        band: &Range<usize>,
    ) -> Result<String, OcrError> {
        let band_pixels = &gray[band.start * width..band.end * width];
        let normalized = resize_line(
            band_pixels,
            width,
            band.len(),
            INPUT_WIDTH,
            INPUT_HEIGHT,
        );
        let input = rec_input_tensor(&normalized, INPUT_WIDTH, INPUT_HEIGHT)?;
        let (data, shape) = run_model(&context.session, &input)?;
        decode_ctc(&data, &shape, &context.alphabet)
    }
}

impl TextEngine for PaddleEngine {
    fn name(&self) -> &'static str {
        "paddle"
    }

    fn recognize(&self, image: &ImageBuffer) -> Result<String, OcrError> {
        let guard = self.inner.lock().expect("paddle engine poisoned");
        let context = guard.as_ref().ok_or_else(|| OcrError::disposed("paddle"))?;

        if image.is_empty() {
            return Err(OcrError::invalid_image(
                "image has zero width or zero height",
            ));
        }

        let width = image.width() as usize;
        let height = image.height() as usize;
        let gray = preprocess::to_grayscale(image);

        let mut bands = split_lines(&gray, width, height);
        if bands.is_empty() {
            bands.push(0..height);
        }

        let mut lines = Vec::with_capacity(bands.len());
        for band in &bands {
            let text = Self::recognize_line(context, &gray, width, band)?;
            if !text.trim().is_empty() {
                lines.push(text);
            }
        }
        Ok(lines.join("\n"))
    }

    fn dispose(&self) {
        if self
            .inner
            .lock()
            .expect("paddle engine poisoned")
            .take()
            .is_some()
        {
            debug!("paddle engine released");
        }
    }
}

fn map_session_error(err: ort::error::OrtError) -> OcrError {
    OcrError::backend("paddle", format!("failed to load recognition model: {err}"))
}

fn run_model(session: &Session, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), OcrError> {
    let allocator = session.allocator();
    let input_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(input.view().into_dyn());
    let tensor = Value::from_array(allocator, &input_dyn)
        .map_err(|err| OcrError::backend("paddle", format!("failed to prepare input: {err}")))?;
    let outputs = session
        .run(vec![tensor])
        .map_err(|err| OcrError::backend("paddle", format!("inference failed: {err}")))?;
    let tensor = outputs
        .into_iter()
        .next()
        .ok_or_else(|| OcrError::backend("paddle", "model produced no output"))?
        .try_extract::<f32>()
        .map_err(|err| OcrError::backend("paddle", format!("inference failed: {err}")))?;
    let view = tensor.view();
    let shape = view.shape().to_vec();
    let data = view.iter().copied().collect::<Vec<f32>>();
    Ok((data, shape))
}

/// Splits raw luma into horizontal text-line bands by row projection.
fn split_lines(gray: &[u8], width: usize, height: usize) -> Vec<Range<usize>> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    // The median luma is the background; ink is whatever deviates from it.
    let background = median_luma(gray);

    let mut active = vec![false; height];
    for (y, row) in gray.chunks_exact(width).enumerate() {
        let ink = row
            .iter()
            .filter(|&&v| (v as i16 - background).abs() > LINE_CONTRAST_DELTA)
            .count();
        active[y] = ink as f32 / width as f32 >= LINE_ACTIVITY_THRESHOLD;
    }

    // Bridge short inactive gaps so accents and descenders stay attached.
    let mut last_active: Option<usize> = None;
    for y in 0..height {
        if !active[y] {
            continue;
        }
        if let Some(prev) = last_active {
            if y - prev <= LINE_GAP_BRIDGE + 1 {
                for row in active.iter_mut().take(y).skip(prev + 1) {
                    *row = true;
                }
            }
        }
        last_active = Some(y);
    }

    let mut bands = Vec::new();
    let mut y = 0;
    while y < height {
        if !active[y] {
            y += 1;
            continue;
        }
        let start = y;
        while y < height && active[y] {
            y += 1;
        }
        if y - start < MIN_LINE_HEIGHT {
            continue;
        }
        let padded_start = start.saturating_sub(LINE_MARGIN);
        let padded_end = (y + LINE_MARGIN).min(height);
        bands.push(padded_start..padded_end);
    }
    bands
}

fn median_luma(gray: &[u8]) -> i16 {
    let mut histogram = [0usize; 256];
    for &value in gray {
        histogram[value as usize] += 1;
    }
    let midpoint = gray.len() / 2;
    let mut seen = 0usize;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > midpoint {
            return value as i16;
        }
    }
    0
}

/// Scales a line band to the model height, preserving aspect ratio, and
/// right-pads to the model width. Output values are in 0..1.
fn resize_line(
    src: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<f32> {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return vec![0.0; dst_width * dst_height];
    }
    let mut scaled_width =
        ((dst_height as f32 / src_height as f32) * src_width as f32).round() as usize;
    scaled_width = scaled_width.clamp(1, dst_width);

    let mut canvas = vec![0.0f32; dst_width * dst_height];
    let scale_x = if scaled_width > 1 {
        (src_width - 1) as f32 / (scaled_width - 1) as f32
    } else {
        0.0
    };
    let scale_y = if dst_height > 1 {
        (src_height - 1) as f32 / (dst_height - 1) as f32
    } else {
        0.0
    };

    for dy in 0..dst_height {
        let fy = scale_y * dy as f32;
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src_height - 1);
        let wy = fy - y0 as f32;
        let row = &mut canvas[dy * dst_width..dy * dst_width + scaled_width];
        for (dx, out) in row.iter_mut().enumerate() {
            let fx = scale_x * dx as f32;
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src_width - 1);
            let wx = fx - x0 as f32;

            let top = src[y0 * src_width + x0] as f32
                + (src[y0 * src_width + x1] as f32 - src[y0 * src_width + x0] as f32) * wx;
            let bottom = src[y1 * src_width + x0] as f32
                + (src[y1 * src_width + x1] as f32 - src[y1 * src_width + x0] as f32) * wx;
            let value = top + (bottom - top) * wy;
            *out = (value / 255.0).clamp(0.0, 1.0);
        }
    }
    canvas
}

/// NCHW f32 tensor with the luma replicated across three channels and
/// rescaled to the -1..1 range the recognition model expects.
fn rec_input_tensor(
    normalized: &[f32],
    width: usize,
    height: usize,
) -> Result<Array4<f32>, OcrError> {
    if normalized.len() != width * height {
        return Err(OcrError::backend(
            "paddle",
            "resized line has unexpected length for the model input",
        ));
    }
    let area = width * height;
    let mut data = vec![0.0f32; area * 3];
    for (i, &value) in normalized.iter().enumerate() {
        let rescaled = value * 2.0 - 1.0;
        data[i] = rescaled;
        data[i + area] = rescaled;
        data[i + 2 * area] = rescaled;
    }
    Array4::from_shape_vec((1, 3, height, width), data)
        .map_err(|err| OcrError::backend("paddle", format!("failed to build input tensor: {err}")))
}

/// Greedy CTC decode: collapse repeats, drop the blank class at index 0.
fn decode_ctc(data: &[f32], shape: &[usize], alphabet: &[char]) -> Result<String, OcrError> {
    let mut dims: Vec<usize> = shape.to_vec();
    while dims.len() > 2 && dims.first() == Some(&1) {
        dims.remove(0);
    }
    while dims.len() > 2 && dims.last() == Some(&1) {
        dims.pop();
    }

    let classes = alphabet.len() + 1;
    let (sequence_len, class_major) = match dims.as_slice() {
        [seq, class] if *class == classes => (*seq, false),
        [class, seq] if *class == classes => (*seq, true),
        other => {
            return Err(OcrError::backend(
                "paddle",
                format!(
                    "unexpected model output shape {other:?} for a dictionary of {} entries",
                    alphabet.len()
                ),
            ));
        }
    };
    if data.len() < sequence_len * classes {
        return Err(OcrError::backend(
            "paddle",
            "model output shorter than its declared shape",
        ));
    }

    let logit = |step: usize, class: usize| {
        if class_major {
            data[class * sequence_len + step]
        } else {
            data[step * classes + class]
        }
    };

    let mut text = String::new();
    let mut previous = 0usize;
    for step in 0..sequence_len {
        let mut best = 0usize;
        let mut best_logit = f32::NEG_INFINITY;
        for class in 0..classes {
            let value = logit(step, class);
            if value > best_logit {
                best_logit = value;
                best = class;
            }
        }
        if best != 0 && best != previous {
            if let Some(character) = alphabet.get(best - 1) {
                text.push(*character);
            }
        }
        previous = best;
    }
    Ok(text)
}

fn load_dictionary(path: &std::path::Path) -> Result<Vec<char>, OcrError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        OcrError::configuration(format!(
            "failed to read dictionary '{}': {err}",
            path.display()
        ))
    })?;
    let alphabet: Vec<char> = contents
        .lines()
        .filter_map(|line| line.chars().next())
        .collect();
    if alphabet.is_empty() {
        return Err(OcrError::configuration(format!(
            "dictionary '{}' contains no characters",
            path.display()
        )));
    }
    Ok(alphabet)
}

fn default_alphabet() -> Vec<char> {
    // ASCII subset matching the bundled English recognition models.
    "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[]^_`{|}~ "
        .chars()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctc_decode_collapses_repeats_and_blanks() {
        let alphabet: Vec<char> = "ab".chars().collect();
        // classes: [blank, 'a', 'b']; steps: a a blank a b
        #[rustfmt::skip]
        let data = vec![
            0.0, 1.0, 0.0,
            0.0, 1.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ];
        let text = decode_ctc(&data, &[1, 5, 3], &alphabet).unwrap();
        assert_eq!(text, "aab");
    }

    #[test]
    fn ctc_decode_rejects_mismatched_shape() {
        let alphabet: Vec<char> = "ab".chars().collect();
        let err = decode_ctc(&[0.0; 8], &[2, 4], &alphabet).unwrap_err();
        assert!(matches!(err, OcrError::Backend { .. }));
    }

    #[test]
    fn ctc_decode_handles_class_major_layout() {
        let alphabet: Vec<char> = "a".chars().collect();
        // classes: [blank, 'a']; 3 steps laid out class-major: blank a a
        let data = vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let text = decode_ctc(&data, &[2, 3], &alphabet).unwrap();
        assert_eq!(text, "a");
    }

    #[test]
    fn split_lines_finds_separated_bands() {
        let width = 20;
        let height = 24;
        let mut gray = vec![255u8; width * height];
        for y in (2..8).chain(14..20) {
            for x in 2..18 {
                gray[y * width + x] = 0;
            }
        }
        let bands = split_lines(&gray, width, height);
        assert_eq!(bands.len(), 2);
        assert!(bands[0].start <= 2 && bands[0].end >= 8);
        assert!(bands[1].start <= 14 && bands[1].end >= 20);
    }

    #[test]
    fn split_lines_returns_nothing_for_flat_input() {
        let gray = vec![128u8; 16 * 16];
        assert!(split_lines(&gray, 16, 16).is_empty());
    }

    #[test]
    fn resize_line_pads_to_the_right() {
        // A square source scaled to height 4 occupies 4 columns of an
        // 8-column canvas; the rest stays at the padding value.
        let src = vec![255u8; 4 * 4];
        let out = resize_line(&src, 4, 4, 8, 4);
        assert_eq!(out.len(), 8 * 4);
        for row in out.chunks_exact(8) {
            assert!(row[..4].iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
            assert!(row[4..].iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn rec_input_tensor_replicates_channels_and_rescales() {
        let tensor = rec_input_tensor(&[0.0, 1.0], 2, 1).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        for channel in 0..3 {
            assert_eq!(tensor[[0, channel, 0, 0]], -1.0);
            assert_eq!(tensor[[0, channel, 0, 1]], 1.0);
        }
    }

    #[test]
    fn config_requires_a_model_path() {
        let err = PaddleConfig::from_shared(&OcrConfig::default()).unwrap_err();
        assert!(matches!(err, OcrError::Configuration { .. }));
    }

    #[test]
    fn orientation_flags_fail_construction() {
        let mut config = PaddleConfig::new(PathBuf::from("model.onnx"));
        config.classify_orientation = true;
        assert!(matches!(
            PaddleEngine::new(config),
            Err(OcrError::Configuration { .. })
        ));
    }
}
