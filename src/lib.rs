//! # NITF Renditions
//!
//! Thumbnails, overviews and full-size re-encodes for NITF 2.1 / NSIF 1.0
//! (and NITF 2.0) imagery.
//!
//! # Architecture: Two Renderers, One Orchestrator
//!
//! Every rendition is produced by the first generator in an ordered list
//! that succeeds:
//!
//! ```text
//! 1. gdal      gdal_translate subprocess, contrast-stretched for MONO sources
//! 2. rust      in-process NITF decode → Lanczos3 resize → JPEG / JPEG 2000
//! ```
//!
//! A variant that no generator can produce is recorded as a failure and
//! skipped. Only an item that yields nothing at all is reported as an error,
//! and even then the batch carries on with the next item.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Dimension policy, statistics, both generators, variant orchestration |
//! | [`nitf`] | NITF header parsing and image segment decoding |
//! | [`process`] | Batch driver: inputs → renditions + `manifest.json`, in parallel |
//! | [`config`] | Layered `renditions.toml` loading, validation and stock template |
//! | [`naming`] | Derived-artifact filenames and unique temp paths |
//! | [`output`] | CLI output formatting for every subcommand |
//!
//! # Design Decisions
//!
//! ## External Tool First
//!
//! GDAL handles every NITF compression and is the reference reader for the
//! format, so it renders whenever it is installed. The in-process path
//! covers uncompressed segments plus JPEG (`C3`) and JPEG 2000 (`C8`), which
//! is most of what turns up in practice, and keeps the binary useful on a
//! machine without GDAL.
//!
//! ## Oversize Guard
//!
//! The in-process path decodes the full raster into memory. Sources above
//! `fallback.max_source_size_mb` (120 by default) are refused before any
//! byte is read.
//!
//! ## Contrast Stretch for Single-Band Imagery
//!
//! Sensor data is often 11 or 12 bits in a 16-bit container and renders
//! almost black when mapped linearly to 8 bits. For `MONO` sources the
//! external renderer asks `gdalinfo -stats` for the band statistics and
//! scales `mean ± kσ` onto 0..255, where `k` is the distance from the mean to
//! the nearer extreme rounded up to whole deviations, clamped to the
//! observed range.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod nitf;
pub mod output;
pub mod process;

#[cfg(test)]
pub(crate) mod test_helpers;
