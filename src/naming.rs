//! Output key convention.
//!
//! Every stored artifact is named `{kind}-{value}-{digest}.{ext}`:
//!
//! ```text
//! square-80-54c2…a7c2.webp
//! max_width-500-0f3e…11d9.jpg
//! ```
//!
//! The key is a pure function of (source bytes, constraint, format), so
//! re-processing the same upload overwrites the same key instead of
//! producing a duplicate.

use crate::digest::ContentDigest;
use crate::imaging::{Format, SizeConstraint};
use std::fmt;

/// Deterministic storage key for one rendered variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub constraint: SizeConstraint,
    pub digest_hex: String,
    pub format: Format,
}

impl OutputKey {
    pub fn new(constraint: SizeConstraint, digest: &ContentDigest, format: Format) -> Self {
        Self {
            constraint,
            digest_hex: digest.to_hex(),
            format,
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}.{}",
            self.constraint,
            self.digest_hex,
            self.format.extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> ContentDigest {
        ContentDigest::of_bytes(b"source image bytes")
    }

    #[test]
    fn key_layout() {
        let key = OutputKey::new(SizeConstraint::square(80), &digest(), Format::WebP);
        assert_eq!(key.to_string(), format!("square-80-{}.webp", digest()));
    }

    #[test]
    fn jpeg_uses_jpg_extension() {
        let key = OutputKey::new(SizeConstraint::max_width(500), &digest(), Format::Jpeg);
        assert!(key.to_string().starts_with("max_width-500-"));
        assert!(key.to_string().ends_with(".jpg"));
    }

    #[test]
    fn same_inputs_same_key() {
        let a = OutputKey::new(SizeConstraint::max(40), &digest(), Format::Png);
        let b = OutputKey::new(SizeConstraint::max(40), &digest(), Format::Png);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn different_constraint_or_format_changes_key() {
        let base = OutputKey::new(SizeConstraint::max(40), &digest(), Format::Png).to_string();
        let other_size = OutputKey::new(SizeConstraint::max(41), &digest(), Format::Png);
        let other_kind = OutputKey::new(SizeConstraint::max_height(40), &digest(), Format::Png);
        let other_format = OutputKey::new(SizeConstraint::max(40), &digest(), Format::WebP);
        assert_ne!(base, other_size.to_string());
        assert_ne!(base, other_kind.to_string());
        assert_ne!(base, other_format.to_string());
    }
}
