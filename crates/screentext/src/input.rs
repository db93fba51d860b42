use std::fmt;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use screentext_types::{ImageBuffer, ImageError, PixelFormat};

#[derive(Debug)]
pub enum InputError {
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    Invalid {
        path: PathBuf,
        source: ImageError,
    },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Decode { path, source } => {
                write!(f, "failed to decode {}: {}", path.display(), source)
            }
            InputError::Invalid { path, source } => {
                write!(f, "invalid image {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::Decode { source, .. } => Some(source),
            InputError::Invalid { source, .. } => Some(source),
        }
    }
}

/// Decodes an image file into the capture-buffer model the service accepts.
pub fn load_image(path: &Path) -> Result<ImageBuffer, InputError> {
    let decoded = image::open(path).map_err(|source| InputError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let buffer = match decoded {
        DynamicImage::ImageLuma8(img) => {
            let (width, height) = img.dimensions();
            ImageBuffer::from_owned(width, height, PixelFormat::Gray8, img.into_raw())
        }
        DynamicImage::ImageRgb8(img) => {
            let (width, height) = img.dimensions();
            ImageBuffer::from_owned(width, height, PixelFormat::Rgb8, img.into_raw())
        }
        other => {
            let img = other.to_rgba8();
            let (width, height) = img.dimensions();
            ImageBuffer::from_owned(width, height, PixelFormat::Rgba8, img.into_raw())
        }
    };

    buffer.map_err(|source| InputError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}
