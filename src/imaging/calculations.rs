//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! [`plan_size`] turns source dimensions and a [`SizeConstraint`] into a
//! [`SizePlan`]: the optional crop rectangle and the final output size.

use super::params::{SizeConstraint, SizeKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("invalid size constraint kind: {0}")]
    InvalidConstraintKind(String),
    #[error("size constraint value must be positive, got {0}")]
    NonPositiveValue(i64),
}

/// Region of the source image to keep, in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of applying a size constraint to source dimensions.
///
/// The crop (if any) is applied first; the cropped region is then resampled
/// to `width × height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePlan {
    pub source: (u32, u32),
    pub crop: Option<CropRect>,
    pub width: u32,
    pub height: u32,
}

impl SizePlan {
    fn identity(source: (u32, u32)) -> Self {
        Self {
            source,
            crop: None,
            width: source.0,
            height: source.1,
        }
    }

    fn scaled(source: (u32, u32), width: u32, height: u32) -> Self {
        Self {
            source,
            crop: None,
            width,
            height,
        }
    }

    /// True when the source passes through untouched.
    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && (self.width, self.height) == self.source
    }

    /// True when a resampling pass is needed after the crop.
    pub fn needs_resample(&self) -> bool {
        let (w, h) = match self.crop {
            Some(c) => (c.width, c.height),
            None => self.source,
        };
        (w, h) != (self.width, self.height)
    }
}

/// Compute output dimensions for `source` under `constraint`.
///
/// | Kind | Untouched when | Otherwise |
/// |---|---|---|
/// | `square` | both edges ≤ value | centered square crop, then value × value |
/// | `max` | both edges ≤ value | longer edge = value |
/// | `max_width` | width ≤ value | width = value |
/// | `max_height` | height ≤ value | height = value |
///
/// The proportional edge is rounded to the nearest pixel and never drops
/// below 1.
pub fn plan_size(source: (u32, u32), constraint: SizeConstraint) -> Result<SizePlan, SizeError> {
    let dim = constraint.value;
    if dim == 0 {
        return Err(SizeError::NonPositiveValue(0));
    }
    let (w, h) = source;

    let plan = match constraint.kind {
        SizeKind::Square => plan_square(source, dim),
        SizeKind::Max => {
            if w <= dim && h <= dim {
                SizePlan::identity(source)
            } else if w >= h {
                SizePlan::scaled(source, dim, scale_edge(h, dim, w))
            } else {
                SizePlan::scaled(source, scale_edge(w, dim, h), dim)
            }
        }
        SizeKind::MaxWidth => {
            if w <= dim {
                SizePlan::identity(source)
            } else {
                SizePlan::scaled(source, dim, scale_edge(h, dim, w))
            }
        }
        SizeKind::MaxHeight => {
            if h <= dim {
                SizePlan::identity(source)
            } else {
                SizePlan::scaled(source, scale_edge(w, dim, h), dim)
            }
        }
    };
    Ok(plan)
}

/// Square policy.
///
/// The crop side is `max(dim, shorter edge)`. When the shorter edge is
/// already below `dim` the crop is clamped to the image along that axis and
/// the result keeps the clamped size: a 20×80 source under `square 40` comes
/// out 20×40, not upscaled.
fn plan_square(source: (u32, u32), dim: u32) -> SizePlan {
    let (w, h) = source;
    if w <= dim && h <= dim {
        return SizePlan::identity(source);
    }

    let side = dim.max(w.min(h));
    let crop_w = side.min(w);
    let crop_h = side.min(h);
    let crop = CropRect {
        x: (w - crop_w) / 2,
        y: (h - crop_h) / 2,
        width: crop_w,
        height: crop_h,
    };

    let (width, height) = if crop_w == crop_h {
        (dim, dim)
    } else {
        (crop_w, crop_h)
    };

    SizePlan {
        source,
        crop: Some(crop),
        width,
        height,
    }
}

/// `edge * target / reference`, rounded, at least 1.
fn scale_edge(edge: u32, target: u32, reference: u32) -> u32 {
    let scaled = (edge as f64 * target as f64 / reference as f64).round() as u32;
    scaled.max(1)
}
