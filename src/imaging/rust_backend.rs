//! In-process fallback renderer.
//!
//! Used when the external tool is missing, disabled, or fails. Everything
//! runs inside the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode NITF segments | [`crate::nitf`] (uncompressed, `C3` via `image`, `C8` via OpenJPEG) |
//! | Decode other inputs (JPEG, PNG, TIFF) | `image::load_from_memory` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (default quality) |
//! | Encode → JPEG 2000 | [`super::jp2`] (`openjpeg-sys`) |
//!
//! A [`session`](ImageGenerator::session) decodes the source once and keeps
//! the raster for every variant of that item. A decode failure is kept too,
//! so later variants fail without reading the file again.

use super::backend::{ImageGenerator, RenderError, RenderResult, RenderSession};
use super::jp2::{self, Container};
use super::params::{Jpeg2000Params, OutputFormat, RenderMode, RenderRequest};
use super::source::SourceImage;
use crate::nitf;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use std::io::Cursor;

pub const DEFAULT_MAX_SOURCE_SIZE_MB: u64 = 120;

/// Pure Rust renderer. Holds only immutable settings.
#[derive(Debug, Clone)]
pub struct RustBackend {
    max_source_size_mb: u64,
    render_mode: RenderMode,
    jpeg2000: Jpeg2000Params,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            max_source_size_mb: DEFAULT_MAX_SOURCE_SIZE_MB,
            render_mode: RenderMode::default(),
            jpeg2000: Jpeg2000Params::default(),
        }
    }

    pub fn with_max_source_size_mb(mut self, limit: u64) -> Self {
        self.max_source_size_mb = limit;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_jpeg2000(mut self, params: Jpeg2000Params) -> Self {
        self.jpeg2000 = params;
        self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the first image segment that decodes, or the whole file when it
/// is not a NITF container.
fn decode_source(bytes: &[u8]) -> Result<DynamicImage, RenderError> {
    if !nitf::is_nitf(bytes) {
        if bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51]) || bytes.get(4..8) == Some(b"jP  ") {
            return jp2::decode(bytes).map_err(RenderError::Decode);
        }
        return image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()));
    }

    let header = nitf::parse_header(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
    let mut last_error = String::from("no image segments");
    for (index, image) in header.images.iter().enumerate() {
        let decoded = nitf::segment_data(bytes, image)
            .and_then(|data| nitf::decode_segment(image, data));
        match decoded {
            Ok(img) => {
                log::debug!(
                    "decoded segment {} ({}x{}, {})",
                    index + 1,
                    img.width(),
                    img.height(),
                    image.compression
                );
                return Ok(img);
            }
            Err(e) => {
                log::debug!("segment {} not decodable: {e}", index + 1);
                last_error = format!("segment {}: {e}", index + 1);
            }
        }
    }
    Err(RenderError::Decode(last_error))
}

fn apply_render_mode(img: DynamicImage, mode: RenderMode) -> DynamicImage {
    match mode {
        RenderMode::Closest => img,
        RenderMode::Rgb => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Resize to exactly the requested size. Resized output is always Rgb8.
fn resample(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    DynamicImage::ImageRgb8(resized.to_rgb8())
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, RenderError> {
    // The JPEG encoder takes 8-bit grey or RGB only.
    let eight_bit = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img.clone(),
        ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new(&mut buf);
    eight_bit
        .write_with_encoder(encoder)
        .map_err(|e| RenderError::Encode(format!("JPEG: {e}")))?;
    Ok(buf.into_inner())
}

fn encode_jpeg2000(img: &DynamicImage, params: &Jpeg2000Params) -> Result<Vec<u8>, RenderError> {
    let flattened = match img.color() {
        ColorType::Rgba8 => DynamicImage::ImageRgb8(img.to_rgb8()),
        ColorType::Rgba16 => DynamicImage::ImageRgb16(img.to_rgb16()),
        _ => img.clone(),
    };
    jp2::encode(&flattened, params, Container::Jp2)
        .map_err(|e| RenderError::Encode(format!("JPEG 2000: {e}")))
}

impl RustBackend {
    fn check_size(&self, source: &SourceImage) -> Result<(), RenderError> {
        let size_mb = source.size_mb();
        if size_mb > self.max_source_size_mb {
            return Err(RenderError::TooLarge {
                size_mb,
                limit_mb: self.max_source_size_mb,
            });
        }
        Ok(())
    }

    fn decode(&self, source: &SourceImage) -> Result<DynamicImage, RenderError> {
        let bytes = std::fs::read(&source.path)?;
        Ok(apply_render_mode(decode_source(&bytes)?, self.render_mode))
    }

    fn encode(
        &self,
        decoded: &DynamicImage,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let resized;
        let img = if decoded.width() == request.width() && decoded.height() == request.height() {
            decoded
        } else {
            resized = resample(decoded, request.width(), request.height());
            &resized
        };
        let encoded = match request.format() {
            OutputFormat::Jpeg => encode_jpeg(img)?,
            OutputFormat::Jpeg2000 => encode_jpeg2000(img, &self.jpeg2000)?,
        };
        Ok(RenderResult::from_bytes(encoded))
    }
}

impl ImageGenerator for RustBackend {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn create_image(
        &self,
        source: &SourceImage,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        self.check_size(source)?;
        let decoded = self.decode(source)?;
        self.encode(&decoded, request)
    }

    fn session<'a>(&'a self, source: &'a SourceImage) -> Box<dyn RenderSession + 'a> {
        Box::new(DecodeOnce {
            backend: self,
            source,
            decoded: None,
        })
    }
}

/// Decodes on the first request and reuses the raster afterwards.
struct DecodeOnce<'a> {
    backend: &'a RustBackend,
    source: &'a SourceImage,
    /// Decoded raster, or the message of the first decode failure.
    decoded: Option<Result<DynamicImage, String>>,
}

impl RenderSession for DecodeOnce<'_> {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        self.backend.check_size(self.source)?;
        if let Some(cached) = &self.decoded {
            return match cached {
                Ok(img) => self.backend.encode(img, request),
                Err(message) => Err(RenderError::Decode(message.clone())),
            };
        }
        match self.backend.decode(self.source) {
            Ok(img) => {
                let result = self.backend.encode(&img, request);
                self.decoded = Some(Ok(img));
                result
            }
            Err(e) => {
                let message = match &e {
                    RenderError::Decode(m) => m.clone(),
                    other => other.to_string(),
                };
                self.decoded = Some(Err(message));
                Err(e)
            }
        }
    }
}
