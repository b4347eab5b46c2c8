//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the boundary between the pipeline and the
//! pixel work: decode raw bytes into a [`PixelBuffer`], resample it according
//! to a [`SizePlan`], and encode it into a [`Format`].
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` in this module.

use super::calculations::SizePlan;
use super::params::Format;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::{self, Read};
use thiserror::Error;

/// Decoded raster image.
pub type PixelBuffer = DynamicImage;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt image: {0}")]
    CorruptImage(String),
    #[error("failed to read image: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot encode {format}: {reason}")]
    UnsupportedFormat { format: Format, reason: String },
}

/// Output of a decode: pixels plus the detected source format label
/// (`"jpg"`, `"png"`, ...).
#[derive(Debug, Clone)]
pub struct Decoded {
    pub image: PixelBuffer,
    pub format: String,
}

/// Trait for codec backends.
///
/// `decode` may stop reading before end-of-stream; callers that need the
/// whole stream (for hashing) must drain it themselves.
pub trait ImageBackend: Sync {
    /// Decode an image from a byte stream.
    fn decode(&self, input: &mut dyn Read) -> Result<Decoded, DecodeError>;

    /// Apply a size plan. Identity plans borrow the input.
    fn resample<'a>(&self, image: &'a PixelBuffer, plan: &SizePlan) -> Cow<'a, PixelBuffer>;

    /// Encode into the target format with its fixed settings.
    fn encode(&self, image: &PixelBuffer, format: Format) -> Result<Vec<u8>, EncodeError>;
}
