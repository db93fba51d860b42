use screentext_types::{ImageBuffer, PixelFormat};

use crate::error::OcrError;

/// Global binarization threshold on the 0-255 scale.
///
/// A fixed global threshold, not an adaptive one; accuracy degrades under
/// uneven lighting. Known limitation carried over from the tuning of the
/// classical engine.
pub const BINARY_THRESHOLD: u8 = 128;

const MEDIAN_WINDOW: usize = 3;

/// Conditions a captured image for the classical engine.
///
/// Fixed pipeline: grayscale conversion, global binarization at
/// [`BINARY_THRESHOLD`], then a 3x3 median denoise that removes the
/// salt-and-pepper artifacts binarization introduces. Pure and
/// deterministic; the input buffer is never mutated and the output keeps
/// the input geometry.
pub fn condition(image: &ImageBuffer) -> Result<ImageBuffer, OcrError> {
    if image.is_empty() {
        return Err(OcrError::invalid_image(
            "image has zero width or zero height",
        ));
    }

    let width = image.width() as usize;
    let height = image.height() as usize;

    let mut gray = to_grayscale(image);
    binarize(&mut gray);
    let denoised = median_denoise(&gray, width, height);

    Ok(ImageBuffer::from_owned(
        image.width(),
        image.height(),
        PixelFormat::Gray8,
        denoised,
    )?)
}

/// Collapses the buffer to a single tightly packed luminance channel.
///
/// BT.601 weights, matching the conversion the original capture pipeline
/// applied. Identity (minus stride padding) for `Gray8` input.
pub(crate) fn to_grayscale(image: &ImageBuffer) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let channels = image.format().channels();
    let mut out = Vec::with_capacity(width * height);

    for y in 0..image.height() {
        let row = image.row(y);
        match image.format() {
            PixelFormat::Gray8 => out.extend_from_slice(row),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                for pixel in row.chunks_exact(channels) {
                    out.push(luma(pixel[0], pixel[1], pixel[2]));
                }
            }
            PixelFormat::Bgra8 => {
                for pixel in row.chunks_exact(channels) {
                    out.push(luma(pixel[2], pixel[1], pixel[0]));
                }
            }
        }
    }

    out
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    ((weighted + 500) / 1000) as u8
}

fn binarize(pixels: &mut [u8]) {
    for value in pixels.iter_mut() {
        *value = if *value >= BINARY_THRESHOLD { 255 } else { 0 };
    }
}

/// 3x3 median filter with replicated borders.
fn median_denoise(pixels: &[u8], width: usize, height: usize) -> Vec<u8> {
    let radius = MEDIAN_WINDOW / 2;
    let mut out = Vec::with_capacity(width * height);
    let mut window = [0u8; MEDIAN_WINDOW * MEDIAN_WINDOW];

    for y in 0..height {
        for x in 0..width {
            let mut len = 0;
            for dy in 0..MEDIAN_WINDOW {
                let sy = clamp_index(y + dy, radius, height);
                for dx in 0..MEDIAN_WINDOW {
                    let sx = clamp_index(x + dx, radius, width);
                    window[len] = pixels[sy * width + sx];
                    len += 1;
                }
            }
            window.sort_unstable();
            out.push(window[window.len() / 2]);
        }
    }

    out
}

fn clamp_index(value: usize, radius: usize, limit: usize) -> usize {
    value.saturating_sub(radius).min(limit - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(width: u32, height: u32, data: &[u8]) -> ImageBuffer {
        ImageBuffer::from_owned(width, height, PixelFormat::Gray8, data.to_vec()).unwrap()
    }

    #[test]
    fn zero_dimension_input_is_rejected() {
        let empty = ImageBuffer::from_owned(0, 4, PixelFormat::Gray8, Vec::new()).unwrap();
        assert!(matches!(
            condition(&empty),
            Err(OcrError::InvalidImage { .. })
        ));
    }

    #[test]
    fn output_keeps_geometry_and_is_binary() {
        let data: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();
        let image = gray_image(8, 8, &data);
        let conditioned = condition(&image).unwrap();
        assert_eq!(conditioned.width(), 8);
        assert_eq!(conditioned.height(), 8);
        assert_eq!(conditioned.format(), PixelFormat::Gray8);
        assert!(conditioned.data().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn conditioning_is_geometry_idempotent() {
        let data = vec![200u8; 6 * 4];
        let image = gray_image(6, 4, &data);
        let once = condition(&image).unwrap();
        let twice = condition(&once).unwrap();
        assert_eq!(twice.width(), once.width());
        assert_eq!(twice.height(), once.height());
        assert!(twice.data().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn input_buffer_is_not_mutated() {
        let data = vec![90u8, 200, 90, 200, 90, 200, 90, 200, 90];
        let image = gray_image(3, 3, &data);
        let _ = condition(&image).unwrap();
        assert_eq!(image.data(), data.as_slice());
    }

    #[test]
    fn threshold_boundary_maps_127_down_and_128_up() {
        let image = gray_image(2, 1, &[127, 128]);
        let mut gray = to_grayscale(&image);
        binarize(&mut gray);
        assert_eq!(gray, vec![0, 255]);
    }

    #[test]
    fn median_removes_isolated_speck() {
        let mut data = vec![0u8; 5 * 5];
        data[2 * 5 + 2] = 255;
        let image = gray_image(5, 5, &data);
        let conditioned = condition(&image).unwrap();
        assert!(conditioned.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn bgra_channel_order_is_honored() {
        // Pure blue in BGRA carries its high byte first; a swapped channel
        // order would read it as red and land on the wrong luma.
        let blue = [255u8, 0, 0, 255];
        let image = ImageBuffer::from_owned(1, 1, PixelFormat::Bgra8, blue.to_vec()).unwrap();
        let blue_luma = ((114u32 * 255 + 500) / 1000) as u8;
        assert_eq!(to_grayscale(&image), vec![blue_luma]);

        let red_rgb = ImageBuffer::from_owned(1, 1, PixelFormat::Rgb8, vec![255, 0, 0]).unwrap();
        let red_luma = ((299u32 * 255 + 500) / 1000) as u8;
        assert_eq!(to_grayscale(&red_rgb), vec![red_luma]);
    }

    #[test]
    fn grayscale_respects_stride_padding() {
        let mut data = vec![0u8; 8 * 2];
        data[0] = 10;
        data[8] = 20;
        let image = ImageBuffer::with_stride(2, 2, 8, PixelFormat::Gray8, data).unwrap();
        assert_eq!(to_grayscale(&image), vec![10, 0, 20, 0]);
    }
}
