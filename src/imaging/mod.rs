//! Image processing: decode, size, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory_with_format` |
//! | **Size** | [`plan_size`] + crop / Lanczos3 resample |
//! | **Encode** | JPEG q100, PNG, lossless WebP |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Size constraints, formats, fixed encoder settings
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{DecodeError, Decoded, EncodeError, ImageBackend, PixelBuffer};
pub use calculations::{CropRect, SizeError, SizePlan, plan_size};
pub use operations::{SizedImage, encode_image, get_dimensions, size_image};
pub use params::{EncodeSettings, Format, Quality, SizeConstraint, SizeKind};
pub use rust_backend::{RustBackend, supported_input_extensions};
