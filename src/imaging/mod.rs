//! Rendition generation: external tool first, in-process decoder as fallback.
//!
//! | Operation | Crate / tool |
//! |---|---|
//! | **Dimensions** | pure functions in `calculations` |
//! | **Statistics** | `gdalinfo -stats` + `regex` |
//! | **External render** | `gdal_translate` subprocess |
//! | **Fallback render** | NITF reader + `image` (Lanczos3, JPEG) + OpenJPEG (JPEG 2000) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing what to render
//! - **Backend**: [`ImageGenerator`] trait + [`GdalBackend`] and [`RustBackend`]
//! - **Operations**: Variant orchestration with per-variant fallback

pub mod backend;
mod calculations;
pub mod gdal_backend;
pub mod jp2;
pub mod operations;
mod params;
pub mod runner;
pub mod rust_backend;
mod source;
pub mod statistics;

pub use backend::{ImageGenerator, RenderError, RenderResult, RenderSession};
pub use calculations::{DEFAULT_MAX_SIDE_LENGTH, calculate_output_dimensions, effective_max_side};
pub use gdal_backend::GdalBackend;
pub use operations::{
    DerivedArtifact, DerivedImages, GenerationError, GenerationSettings, Rendition,
    VariantFailure, generate_derived_images, render_with_fallback,
};
pub use params::{ImageVariant, Jpeg2000Params, OutputFormat, RenderMode, RenderRequest};
pub use runner::{CommandRunner, SystemRunner};
pub use rust_backend::RustBackend;
pub use source::{Band, ColorChannel, PixelRepresentation, SourceImage};
pub use statistics::{PixelStatistics, ScaleRange, collect_statistics};
