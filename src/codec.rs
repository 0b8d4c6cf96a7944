//! Per-image decode and re-encode.
//!
//! WebP goes through libwebp (lossy, quality driven), AVIF through rav1e via
//! `ravif`. Anything else is handed back in the format it arrived in.

use std::{fmt, io::Cursor};

use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, ImageOutputFormat};
use log::debug;
use rgb::{RGB8, RGBA8};

use crate::{error::ConvertError, models::UploadedImage};

const DEFAULT_QUALITY: u8 = 80;

/// Target format named by the `format` form field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    WebP,
    Avif,
    /// Unrecognised (or empty) `format` text: images are passed through in
    /// their own format, but the text still becomes the entry suffix.
    Passthrough(String),
}

impl OutputFormat {
    /// Exact, case-sensitive match; anything else is passed through.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "webp" => OutputFormat::WebP,
            "avif" => OutputFormat::Avif,
            other => OutputFormat::Passthrough(other.to_string()),
        }
    }

    /// Suffix appended to archive entry names, verbatim.
    pub fn extension(&self) -> &str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Passthrough(raw) => raw,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Passthrough(String::new())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoder quality, always within 1..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    /// Clamps into range.
    pub fn new(value: i64) -> Self {
        Quality(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// Parses the `quality` form field as a base-10 integer. A missing field
    /// means the default; out-of-range integers are clamped.
    pub fn parse(raw: Option<&str>) -> Result<Self, ConvertError> {
        match raw {
            None => Ok(Self::default()),
            Some(text) => text
                .trim()
                .parse::<i64>()
                .map(Self::new)
                .map_err(|_| ConvertError::InvalidQuality(text.to_string())),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(DEFAULT_QUALITY)
    }
}

/// Image codec with the encoder settings that are fixed per process.
#[derive(Clone, Copy, Debug)]
pub struct Codec {
    avif_speed: u8,
}

impl Codec {
    pub fn new(avif_speed: u8) -> Self {
        Self { avif_speed }
    }

    /// Decodes one upload and re-encodes it into `format`.
    pub fn convert(
        &self,
        upload: &UploadedImage,
        format: &OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ConvertError> {
        let source_format = image::guess_format(&upload.data).ok();
        let decoded =
            image::load_from_memory(&upload.data).map_err(|source| ConvertError::Decode {
                name: upload.file_name.clone(),
                source,
            })?;

        let (width, height) = decoded.dimensions();
        debug!(
            "Decoded {} ({}x{}, {:?}), encoding as {:?} at quality {}",
            upload.file_name,
            width,
            height,
            source_format,
            format,
            quality.get()
        );

        match format {
            OutputFormat::WebP => encode_webp(&decoded, quality).map_err(|reason| {
                ConvertError::Encode {
                    name: upload.file_name.clone(),
                    reason,
                }
            }),
            OutputFormat::Avif => self.encode_avif(&decoded, quality).map_err(|reason| {
                ConvertError::Encode {
                    name: upload.file_name.clone(),
                    reason,
                }
            }),
            OutputFormat::Passthrough(_) => reserialize(upload, &decoded, source_format),
        }
    }

    fn encode_avif(&self, img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, String> {
        let (width, height) = img.dimensions();
        let (width, height) = (width as usize, height as usize);

        let encoder = ravif::Encoder::new()
            .with_quality(quality.get() as f32)
            .with_alpha_quality(quality.get() as f32)
            .with_speed(self.avif_speed);

        let encoded = if img.color().has_alpha() {
            let pixels: Vec<RGBA8> = img
                .to_rgba8()
                .pixels()
                .map(|p| RGBA8::new(p[0], p[1], p[2], p[3]))
                .collect();
            encoder.encode_rgba(ravif::Img::new(pixels.as_slice(), width, height))
        } else {
            let pixels: Vec<RGB8> = img
                .to_rgb8()
                .pixels()
                .map(|p| RGB8::new(p[0], p[1], p[2]))
                .collect();
            encoder.encode_rgb(ravif::Img::new(pixels.as_slice(), width, height))
        };

        encoded
            .map(|avif| avif.avif_file)
            .map_err(|err| err.to_string())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(6)
    }
}

/// Lossy WebP. libwebp rejects sides above 16383 px, which surfaces as an error.
fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, String> {
    let (width, height) = img.dimensions();
    let quality = quality.get() as f32;

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode_simple(false, quality)
            .map(|webp| webp.to_vec())
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, quality)
            .map(|webp| webp.to_vec())
    };

    encoded.map_err(|err| format!("{:?}", err))
}

/// Writes the decoded image back out in the format it came in. Formats the
/// codec can read but not write keep their original bytes.
fn reserialize(
    upload: &UploadedImage,
    img: &DynamicImage,
    source_format: Option<ImageFormat>,
) -> Result<Vec<u8>, ConvertError> {
    let Some(source_format) = source_format else {
        return Ok(upload.data.to_vec());
    };

    let mut buffer = Vec::new();
    match img.write_to(
        &mut Cursor::new(&mut buffer),
        ImageOutputFormat::from(source_format),
    ) {
        Ok(()) => Ok(buffer),
        Err(ImageError::Unsupported(_)) => Ok(upload.data.to_vec()),
        Err(err) => Err(ConvertError::Encode {
            name: upload.file_name.clone(),
            reason: err.to_string(),
        }),
    }
}
