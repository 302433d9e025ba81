//! Parameter types for rendition operations.
//!
//! These types describe *what* to render, not *how*. They are the interface
//! between the [`operations`](super::operations) module (which decides which
//! renditions to create) and the [`backend`](super::backend) implementations
//! (which do the pixel work). A mock generator can stand in for a real one
//! without changing operation logic.
//!
//! ## Types
//!
//! - [`OutputFormat`]: JPEG or JPEG 2000, with extension, MIME type and translate driver.
//! - [`ImageVariant`]: thumbnail, overview or original, with its qualifier.
//! - [`RenderRequest`]: target dimensions + format. Validated on construction.
//! - [`RenderMode`]: pixel model the in-process decoder produces.
//! - [`Jpeg2000Params`]: wavelet/rate settings for the JPEG 2000 encoder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded output format of a rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Jpeg2000,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Jpeg2000 => "jp2",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Jpeg2000 => "image/jp2",
        }
    }

    /// Output driver name understood by `gdal_translate -of`.
    pub fn gdal_driver(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Jpeg2000 => "JP2OpenJPEG",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("JPEG"),
            OutputFormat::Jpeg2000 => f.write_str("JPEG 2000"),
        }
    }
}

/// The renditions produced for every source, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageVariant {
    Thumbnail,
    Overview,
    Original,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 3] = [
        ImageVariant::Thumbnail,
        ImageVariant::Overview,
        ImageVariant::Original,
    ];

    /// Qualifier used in derived filenames and manifests.
    pub fn qualifier(self) -> &'static str {
        match self {
            ImageVariant::Thumbnail => "thumbnail",
            ImageVariant::Overview => "overview",
            ImageVariant::Original => "original",
        }
    }
}

impl fmt::Display for ImageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualifier())
    }
}

/// Target size and format for a single render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    width: u32,
    height: u32,
    format: OutputFormat,
}

impl RenderRequest {
    /// Returns `None` when either dimension is zero.
    pub fn new(width: u32, height: u32, format: OutputFormat) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Pixel model produced by the in-process decoder.
///
/// - `Closest`: keep the decoder's natural model (grey stays grey, 16-bit stays 16-bit)
/// - `Rgb`: always convert to 8-bit RGB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Closest,
    Rgb,
}

/// JPEG 2000 encoder settings.
///
/// `quality` runs from 0.0 (maximum compression) to 1.0 (minimum compression).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jpeg2000Params {
    pub lossless: bool,
    pub quality: f32,
}

impl Jpeg2000Params {
    pub fn new(quality: f32) -> Self {
        Self {
            lossless: false,
            quality: quality.clamp(0.0, 1.0),
        }
    }

    /// Lossy, single layer, smallest output.
    pub fn maximum_compression() -> Self {
        Self::new(0.0)
    }
}

impl Default for Jpeg2000Params {
    fn default() -> Self {
        Self::maximum_compression()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_table() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::Jpeg.gdal_driver(), "JPEG");
        assert_eq!(OutputFormat::Jpeg2000.extension(), "jp2");
        assert_eq!(OutputFormat::Jpeg2000.mime_type(), "image/jp2");
        assert_eq!(OutputFormat::Jpeg2000.gdal_driver(), "JP2OpenJPEG");
    }

    #[test]
    fn format_serde_names() {
        assert_eq!(
            serde_json::to_string(&OutputFormat::Jpeg2000).unwrap(),
            "\"jpeg2000\""
        );
        let f: OutputFormat = serde_json::from_str("\"jpeg\"").unwrap();
        assert_eq!(f, OutputFormat::Jpeg);
    }

    #[test]
    fn variant_qualifiers() {
        let q: Vec<_> = ImageVariant::ALL.iter().map(|v| v.qualifier()).collect();
        assert_eq!(q, vec!["thumbnail", "overview", "original"]);
    }

    #[test]
    fn render_request_rejects_zero_dimensions() {
        assert!(RenderRequest::new(0, 10, OutputFormat::Jpeg).is_none());
        assert!(RenderRequest::new(10, 0, OutputFormat::Jpeg).is_none());
        let r = RenderRequest::new(10, 20, OutputFormat::Jpeg2000).unwrap();
        assert_eq!((r.width(), r.height()), (10, 20));
        assert_eq!(r.format(), OutputFormat::Jpeg2000);
    }

    #[test]
    fn jpeg2000_quality_clamps() {
        assert_eq!(Jpeg2000Params::new(-1.0).quality, 0.0);
        assert_eq!(Jpeg2000Params::new(2.0).quality, 1.0);
        let max = Jpeg2000Params::maximum_compression();
        assert!(!max.lossless);
        assert_eq!(max.quality, 0.0);
    }

    #[test]
    fn render_mode_default_is_closest() {
        assert_eq!(RenderMode::default(), RenderMode::Closest);
    }
}
