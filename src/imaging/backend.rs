//! Rendition generator trait and shared types.
//!
//! The [`ImageGenerator`] trait has a single operation: turn a borrowed
//! [`SourceImage`] plus a [`RenderRequest`] into encoded bytes. Two
//! implementations exist and are tried in order by the orchestrator:
//!
//! | Generator | Strategy |
//! |---|---|
//! | [`GdalBackend`](super::gdal_backend::GdalBackend) | `gdal_translate` subprocess, statistics-based stretch |
//! | [`RustBackend`](super::rust_backend::RustBackend) | in-process NITF decode, Lanczos3 resize, JPEG / JPEG 2000 encode |

use super::params::RenderRequest;
use super::source::SourceImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{command} exited with status {status}: {output}")]
    ToolFailed {
        command: String,
        status: String,
        output: String,
    },
    #[error("{command} timed out: {output}")]
    ToolTimedOut { command: String, output: String },
    #[error("no output file at {path}: {output}")]
    MissingOutput { path: PathBuf, output: String },
    #[error("source is {size_mb} MB, limit is {limit_mb} MB")]
    TooLarge { size_mb: u64, limit_mb: u64 },
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Generator panicked: {0}")]
    Panicked(String),
}

/// Encoded rendition bytes.
///
/// `len()` is always the payload length. When the bytes were read back from a
/// temporary file, `temp_file` names it and the holder is responsible for
/// calling [`RenderResult::cleanup`] once the bytes are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    bytes: Vec<u8>,
    temp_file: Option<PathBuf>,
}

impl RenderResult {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            temp_file: None,
        }
    }

    pub fn from_temp_file(bytes: Vec<u8>, path: PathBuf) -> Self {
        Self {
            bytes,
            temp_file: Some(path),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn temp_file(&self) -> Option<&Path> {
        self.temp_file.as_deref()
    }

    /// Delete the backing temp file, if any. Missing files are not an error.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        if let Some(path) = self.temp_file.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A strategy that produces one encoded rendition.
///
/// Implementations hold only immutable configuration, so one instance can be
/// shared across rayon workers.
pub trait ImageGenerator: Sync {
    /// Short name used in logs and manifests.
    fn name(&self) -> &'static str;

    /// Render `source` at the requested size and format.
    fn create_image(
        &self,
        source: &SourceImage,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError>;

    /// Start rendering the variants of one source.
    ///
    /// The default session calls [`ImageGenerator::create_image`] for every
    /// request. Generators with expensive per-source work (decoding,
    /// statistics) override this to do that work once.
    fn session<'a>(&'a self, source: &'a SourceImage) -> Box<dyn RenderSession + 'a> {
        Box::new(Independent {
            generator: self,
            source,
        })
    }
}

/// Renders successive requests for a single source.
///
/// A session lives for one content item and is dropped with it.
pub trait RenderSession {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderResult, RenderError>;
}

struct Independent<'a, G: ?Sized> {
    generator: &'a G,
    source: &'a SourceImage,
}

impl<G: ImageGenerator + ?Sized> RenderSession for Independent<'_, G> {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        self.generator.create_image(self.source, request)
    }
}
