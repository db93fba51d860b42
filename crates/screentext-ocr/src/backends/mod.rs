#[cfg(feature = "engine-paddle")]
pub mod paddle;

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;
