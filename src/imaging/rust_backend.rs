//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Resample | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder`, quality 100 |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder::new_lossless` |

use super::backend::{Decoded, DecodeError, EncodeError, ImageBackend, PixelBuffer};
use super::calculations::SizePlan;
use super::params::Format;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageError, ImageFormat};
use std::borrow::Cow;
use std::io::Read;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

/// The `image` decoders need `Seek`, so the stream is buffered in full.
/// Everything after the read happens in memory: any I/O error the decoder
/// reports is a truncated or malformed file, not a transport failure.
fn decode_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
        other => DecodeError::CorruptImage(other.to_string()),
    }
}

fn format_label(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .copied()
        .unwrap_or("unknown")
        .to_string()
}

fn encode_error(format: Format, err: ImageError) -> EncodeError {
    EncodeError::UnsupportedFormat {
        format,
        reason: err.to_string(),
    }
}

/// Convert to a color type the target encoder accepts, borrowing when the
/// buffer already fits.
fn encodable(image: &PixelBuffer, format: Format) -> Cow<'_, PixelBuffer> {
    let color = image.color();
    match format {
        Format::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        Format::WebP => match color {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {
                Cow::Borrowed(image)
            }
            _ if color.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        Format::Png => match color {
            ColorType::Rgb32F | ColorType::Rgba32F => {
                Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16()))
            }
            _ => Cow::Borrowed(image),
        },
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, input: &mut dyn Read) -> Result<Decoded, DecodeError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;

        let format = image::guess_format(&bytes)
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        if !format.reading_enabled() {
            return Err(DecodeError::UnsupportedFormat(format!(
                "no decoder compiled in for {}",
                format_label(format)
            )));
        }

        let image = image::load_from_memory_with_format(&bytes, format).map_err(decode_error)?;
        Ok(Decoded {
            image,
            format: format_label(format),
        })
    }

    fn resample<'a>(&self, image: &'a PixelBuffer, plan: &SizePlan) -> Cow<'a, PixelBuffer> {
        if plan.is_identity() {
            return Cow::Borrowed(image);
        }
        let cropped = match plan.crop {
            Some(c) => Cow::Owned(image.crop_imm(c.x, c.y, c.width, c.height)),
            None => Cow::Borrowed(image),
        };
        if !plan.needs_resample() {
            return cropped;
        }
        Cow::Owned(cropped.resize_exact(plan.width, plan.height, FilterType::Lanczos3))
    }

    fn encode(&self, image: &PixelBuffer, format: Format) -> Result<Vec<u8>, EncodeError> {
        let settings = format.settings();
        let pixels = encodable(image, format);
        let mut out = Vec::new();
        match format {
            Format::Jpeg => pixels.write_with_encoder(JpegEncoder::new_with_quality(
                &mut out,
                settings.quality.value(),
            )),
            Format::Png => pixels.write_with_encoder(PngEncoder::new(&mut out)),
            Format::WebP => pixels.write_with_encoder(WebPEncoder::new_lossless(&mut out)),
        }
        .map_err(|e| encode_error(format, e))?;
        Ok(out)
    }
}
