//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take a constraint or format, compute parameters, and call the backend.

use super::backend::{EncodeError, ImageBackend, PixelBuffer};
use super::calculations::{SizeError, SizePlan, plan_size};
use super::params::{Format, SizeConstraint};
use std::borrow::Cow;

/// A sized image and the plan that produced it.
#[derive(Debug)]
pub struct SizedImage<'a> {
    pub image: Cow<'a, PixelBuffer>,
    pub plan: SizePlan,
}

/// Dimensions of a decoded buffer as `(width, height)`.
pub fn get_dimensions(image: &PixelBuffer) -> (u32, u32) {
    (image.width(), image.height())
}

/// Plan and apply a size constraint.
///
/// Identity plans borrow `image`, so sizing a shared buffer that already
/// fits costs nothing.
pub fn size_image<'a, B: ImageBackend>(
    backend: &B,
    image: &'a PixelBuffer,
    constraint: SizeConstraint,
) -> Result<SizedImage<'a>, SizeError> {
    let plan = plan_size(get_dimensions(image), constraint)?;
    let image = backend.resample(image, &plan);
    Ok(SizedImage { image, plan })
}

/// Encode a buffer into `format` with its fixed settings.
pub fn encode_image<B: ImageBackend>(
    backend: &B,
    image: &PixelBuffer,
    format: Format,
) -> Result<Vec<u8>, EncodeError> {
    backend.encode(image, format)
}
