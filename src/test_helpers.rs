//! Shared test utilities: synthetic images and their encoded bytes.
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let bytes = png_bytes(80, 160);
//! let image = image::load_from_memory(&bytes).unwrap();
//! assert_eq!((image.width(), image.height()), (80, 160));
//! ```

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// RGB gradient, so resampling and crops produce non-uniform output.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Jpeg)
}
