//! Shared domain models for the screentext workspace.
//!
//! This crate centralizes the pixel-buffer model exchanged between the
//! capture side, the preprocessor, and the recognition engines. Keep it
//! backend-agnostic and free of native SDK dependencies so every crate can
//! depend on it without pulling heavy features.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub type ImageResult<T> = Result<T, ImageError>;

/// Memory layout of a captured pixel buffer.
///
/// Screen grabs arrive as `Bgra8` on Windows and `Rgba8` on most other
/// capture paths; decoded image files are usually `Rgb8` or `Gray8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    pub fn is_color(&self) -> bool {
        !matches!(self, PixelFormat::Gray8)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable 2D pixel buffer.
///
/// Created by the capture side, borrowed read-only by the preprocessor and
/// the recognition engines for the duration of one call. Clones share the
/// underlying allocation.
#[derive(Clone)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ImageBuffer {
    /// Builds a buffer with tightly packed rows (`stride == width * channels`).
    pub fn from_owned(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> ImageResult<Self> {
        let stride = (width as usize)
            .checked_mul(format.channels())
            .ok_or(ImageError::DimensionOverflow {
                stride: width as usize,
                height,
            })?;
        Self::with_stride(width, height, stride, format, data)
    }

    /// Builds a buffer whose rows carry padding bytes beyond the visible width.
    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> ImageResult<Self> {
        let row_bytes = (width as usize)
            .checked_mul(format.channels())
            .ok_or(ImageError::DimensionOverflow {
                stride,
                height,
            })?;
        if stride < row_bytes {
            return Err(ImageError::StrideTooSmall {
                stride,
                required: row_bytes,
            });
        }
        let required = stride
            .checked_mul(height as usize)
            .ok_or(ImageError::DimensionOverflow { stride, height })?;
        if data.len() < required {
            return Err(ImageError::InsufficientData {
                provided: data.len(),
                required,
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The pixel bytes of row `y`, without the stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let row_bytes = self.width as usize * self.format.channels();
        &self.data[start..start + row_bytes]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(
        "image dimensions overflowed while validating stride * height (stride={stride}, height={height})"
    )]
    DimensionOverflow { stride: usize, height: u32 },

    #[error("pixel data length {provided} is smaller than stride * height ({required})")]
    InsufficientData { provided: usize, required: usize },

    #[error("stride {stride} is smaller than width * channels ({required})")]
    StrideTooSmall { stride: usize, required: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_owned_accepts_exact_buffer() {
        let image = ImageBuffer::from_owned(4, 2, PixelFormat::Rgb8, vec![0; 24]).unwrap();
        assert_eq!(image.stride(), 12);
        assert_eq!(image.row(1).len(), 12);
    }

    #[test]
    fn with_stride_rejects_truncated_buffer() {
        let err = ImageBuffer::with_stride(4, 2, 16, PixelFormat::Rgba8, vec![0; 24]).unwrap_err();
        assert!(matches!(
            err,
            ImageError::InsufficientData {
                provided: 24,
                required: 32
            }
        ));
    }

    #[test]
    fn with_stride_rejects_stride_below_row_width() {
        let err = ImageBuffer::with_stride(8, 1, 4, PixelFormat::Gray8, vec![0; 8]).unwrap_err();
        assert!(matches!(err, ImageError::StrideTooSmall { .. }));
    }

    #[test]
    fn clones_share_the_allocation() {
        let image = ImageBuffer::from_owned(2, 2, PixelFormat::Gray8, vec![7; 4]).unwrap();
        let copy = image.clone();
        assert!(std::ptr::eq(image.data().as_ptr(), copy.data().as_ptr()));
    }
}
