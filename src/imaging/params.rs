//! Parameter types for image operations.
//!
//! These types describe *what* to produce, not *how*. The token sets are
//! closed: every size kind and output format the pipeline knows is a variant
//! here, and string tokens are converted exactly once, at the config
//! boundary.
//!
//! ## Types
//!
//! - [`SizeKind`] / [`SizeConstraint`]: resize policy plus its pixel value.
//! - [`Format`]: output container (JPEG, PNG, WebP) and its file extension.
//! - [`Quality`]: encoder quality, fixed at the maximum.
//! - [`EncodeSettings`]: the fixed per-format encoder parameters.

use super::calculations::SizeError;
use std::fmt;

/// Resize policy applied to a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeKind {
    /// Center-crop to a square, then shrink to `value × value`.
    Square,
    /// Shrink so the longer edge is `value`.
    Max,
    /// Shrink so the width is `value`.
    MaxWidth,
    /// Shrink so the height is `value`.
    MaxHeight,
}

impl SizeKind {
    pub const ALL: [SizeKind; 4] = [
        SizeKind::Square,
        SizeKind::Max,
        SizeKind::MaxWidth,
        SizeKind::MaxHeight,
    ];

    pub fn token(self) -> &'static str {
        match self {
            SizeKind::Square => "square",
            SizeKind::Max => "max",
            SizeKind::MaxWidth => "max_width",
            SizeKind::MaxHeight => "max_height",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }
}

impl fmt::Display for SizeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A size policy and its parameter in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeConstraint {
    pub kind: SizeKind,
    pub value: u32,
}

impl SizeConstraint {
    pub fn new(kind: SizeKind, value: u32) -> Self {
        Self { kind, value }
    }

    pub fn square(value: u32) -> Self {
        Self::new(SizeKind::Square, value)
    }

    pub fn max(value: u32) -> Self {
        Self::new(SizeKind::Max, value)
    }

    pub fn max_width(value: u32) -> Self {
        Self::new(SizeKind::MaxWidth, value)
    }

    pub fn max_height(value: u32) -> Self {
        Self::new(SizeKind::MaxHeight, value)
    }

    /// Build a constraint from untyped tokens.
    ///
    /// Values that do not fit in `u32` are rejected the same way as
    /// non-positive ones.
    pub fn parse(kind: &str, value: i64) -> Result<Self, SizeError> {
        let kind = SizeKind::from_token(kind)
            .ok_or_else(|| SizeError::InvalidConstraintKind(kind.to_string()))?;
        match u32::try_from(value) {
            Ok(v) if v > 0 => Ok(Self::new(kind, v)),
            _ => Err(SizeError::NonPositiveValue(value)),
        }
    }
}

impl fmt::Display for SizeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.value)
    }
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Jpeg,
    Png,
    WebP,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Jpeg, Format::Png, Format::WebP];

    /// File extension used in output keys.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Png => "png",
            Format::WebP => "webp",
        }
    }

    /// Accepts `jpg`/`jpeg`, `png` and `webp`. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "jpg" | "jpeg" => Some(Format::Jpeg),
            "png" => Some(Format::Png),
            "webp" => Some(Format::WebP),
            _ => None,
        }
    }

    pub fn settings(self) -> EncodeSettings {
        EncodeSettings::for_format(self)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality setting for encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: Quality = Quality(100);

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Encoder parameters. Fixed per format; callers cannot tune them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub quality: Quality,
    pub lossless: bool,
}

impl EncodeSettings {
    pub fn for_format(format: Format) -> Self {
        match format {
            Format::Jpeg => Self {
                quality: Quality::MAX,
                lossless: false,
            },
            Format::Png | Format::WebP => Self {
                quality: Quality::MAX,
                lossless: true,
            },
        }
    }
}
