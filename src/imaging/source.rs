//! Source image description handed to the renderers.
//!
//! A [`SourceImage`] is the caller's view of one ingested file: where the
//! bytes live, how big they are, the native raster size, and the band
//! metadata used for band selection and contrast stretching. Renderers only
//! borrow it for the duration of a call.

use crate::nitf::{self, NitfError, NitfHeader};
use std::fmt;
use std::path::{Path, PathBuf};

/// RGB channel a band is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
}

/// One band of the source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// Band representation code (`R`, `G`, `B`, `M`, `LU`, ...), trimmed.
    pub representation: String,
    /// Band subcategory (wavelength or similar), trimmed. Often empty.
    pub subcategory: String,
}

impl Band {
    pub fn new(representation: impl Into<String>) -> Self {
        Self {
            representation: representation.into(),
            subcategory: String::new(),
        }
    }

    pub fn color_channel(&self) -> Option<ColorChannel> {
        match self.representation.as_str() {
            "R" => Some(ColorChannel::Red),
            "G" => Some(ColorChannel::Green),
            "B" => Some(ColorChannel::Blue),
            _ => None,
        }
    }
}

/// Image-level pixel representation (NITF `IREP`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelRepresentation {
    Monochrome,
    Rgb,
    RgbLut,
    Multispectral,
    YCbCr601,
    Other(String),
}

impl PixelRepresentation {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "MONO" => PixelRepresentation::Monochrome,
            "RGB" => PixelRepresentation::Rgb,
            "RGB/LUT" => PixelRepresentation::RgbLut,
            "MULTI" => PixelRepresentation::Multispectral,
            "YCbCr601" => PixelRepresentation::YCbCr601,
            other => PixelRepresentation::Other(other.to_string()),
        }
    }

    pub fn is_monochrome(&self) -> bool {
        matches!(self, PixelRepresentation::Monochrome)
    }
}

impl fmt::Display for PixelRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelRepresentation::Monochrome => f.write_str("MONO"),
            PixelRepresentation::Rgb => f.write_str("RGB"),
            PixelRepresentation::RgbLut => f.write_str("RGB/LUT"),
            PixelRepresentation::Multispectral => f.write_str("MULTI"),
            PixelRepresentation::YCbCr601 => f.write_str("YCbCr601"),
            PixelRepresentation::Other(code) => f.write_str(code),
        }
    }
}

/// Everything the renderers need to know about one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub path: PathBuf,
    /// Declared byte size, used by the oversize guard.
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub bands: Vec<Band>,
    pub representation: PixelRepresentation,
}

impl SourceImage {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            width,
            height,
            bands: Vec::new(),
            representation: PixelRepresentation::Other(String::new()),
        }
    }

    pub fn with_bands(mut self, bands: Vec<Band>) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_representation(mut self, representation: PixelRepresentation) -> Self {
        self.representation = representation;
        self
    }

    /// Describe a NITF/NSIF file from its headers.
    ///
    /// Native size and band metadata come from the first image segment.
    pub fn from_nitf(path: &Path) -> Result<Self, NitfError> {
        let size_bytes = std::fs::metadata(path)?.len();
        let header = nitf::read_header(path)?;
        Self::from_nitf_header(path, size_bytes, &header)
    }

    /// Same as [`SourceImage::from_nitf`] for a header that is already parsed.
    pub fn from_nitf_header(
        path: &Path,
        size_bytes: u64,
        header: &NitfHeader,
    ) -> Result<Self, NitfError> {
        let first = header
            .images
            .first()
            .ok_or_else(|| NitfError::NoImageSegments(path.to_path_buf()))?;
        let bands = first
            .bands
            .iter()
            .map(|b| Band {
                representation: b.representation.clone(),
                subcategory: b.subcategory.clone(),
            })
            .collect();
        Ok(Self::new(path, size_bytes, first.cols, first.rows)
            .with_bands(bands)
            .with_representation(PixelRepresentation::from_code(&first.irep)))
    }

    pub fn is_monochrome(&self) -> bool {
        self.representation.is_monochrome()
    }

    /// Declared size in whole mebibytes (truncated).
    pub fn size_mb(&self) -> u64 {
        self.size_bytes / (1024 * 1024)
    }
}
