//! Batch rendition generation.
//!
//! Takes NITF files (or directories containing them), renders the thumbnail
//! and derived images for each one, and writes them next to a manifest.
//!
//! ## Generators
//!
//! With `external.enabled`, every variant is first rendered by
//! `gdal_translate`; the in-process decoder is the fallback. Without it only
//! the in-process decoder runs.
//!
//! ## Output Structure
//!
//! ```text
//! renditions/
//! ├── manifest.json                  # Per-item results, sizes and SHA-256
//! ├── i_3001a/
//! │   ├── thumbnail.jpg
//! │   ├── overview-checksfortest.jpg
//! │   └── original-checksfortest.jp2
//! └── ...
//! ```
//!
//! An item that cannot be read, whose variants all fail, or whose renditions
//! cannot be written is listed in the manifest with a skip reason; it never
//! aborts the batch.
//!
//! ## Parallel Processing
//!
//! Items are processed in parallel using [rayon](https://docs.rs/rayon). The
//! generators hold only immutable settings and are shared by every worker.

use crate::config::RenditionConfig;
use crate::imaging::{
    DerivedImages, GdalBackend, GenerationSettings, ImageGenerator, Rendition, RustBackend,
    SourceImage, SystemRunner, generate_derived_images,
};
use crate::nitf::{self, NitfError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions picked up when walking input directories.
pub const NITF_EXTENSIONS: &[&str] = &["ntf", "nitf", "nsf"];

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("No NITF inputs found")]
    NoInputs,
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    BatchStarted {
        item_count: usize,
    },
    ItemProcessed {
        index: usize,
        title: Option<String>,
        source_path: String,
        variants: Vec<VariantInfo>,
    },
    ItemSkipped {
        index: usize,
        source_path: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantInfo {
    pub label: String,
    pub status: VariantStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariantStatus {
    Rendered {
        generator: String,
        width: u32,
        height: u32,
    },
    Failed(String),
}

/// Manifest written to `<output>/manifest.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub items: Vec<ItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub source_path: String,
    pub title: String,
    /// Native (width, height).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<StoredFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StoredArtifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// A rendition written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Path relative to the output directory.
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub width: u32,
    pub height: u32,
    pub generator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub qualifier: String,
    pub filename: String,
    pub mime_type: String,
    #[serde(flatten)]
    pub file: StoredFile,
}

/// Expand files and directories into the list of inputs, in order.
///
/// Directories are walked recursively for NITF extensions; files named
/// explicitly are taken as-is. Duplicates are dropped.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ProcessError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(std::io::Error::from)?;
                if entry.file_type().is_file() && has_nitf_extension(entry.path()) {
                    let p = entry.into_path();
                    if seen.insert(p.clone()) {
                        inputs.push(p);
                    }
                }
            }
        } else if path.is_file() {
            if seen.insert(path.clone()) {
                inputs.push(path.clone());
            }
        } else {
            return Err(ProcessError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input not found: {}", path.display()),
            )));
        }
    }
    Ok(inputs)
}

fn has_nitf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| NITF_EXTENSIONS.iter().any(|n| e.eq_ignore_ascii_case(n)))
}

/// Per-item output directory names: file stems, suffixed on collision.
fn item_dir_names(inputs: &[PathBuf]) -> Vec<String> {
    let mut used = HashSet::new();
    inputs
        .iter()
        .map(|p| {
            let stem = p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "item".to_string());
            let mut name = stem.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{stem}-{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// Describe an input and pick its title.
///
/// NITF files use the first image segment and `FTITLE`. Anything else is
/// handed to the in-process decoder as a single image.
fn load_source(path: &Path) -> Result<(SourceImage, String), String> {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    match nitf::read_header(path) {
        Ok(header) => {
            let source = SourceImage::from_nitf_header(path, size, &header)
                .map_err(|e| e.to_string())?;
            let title = if header.title.trim().is_empty() {
                file_name
            } else {
                header.title
            };
            Ok((source, title))
        }
        Err(NitfError::NotNitf) => {
            let (width, height) = image::image_dimensions(path).map_err(|e| e.to_string())?;
            Ok((SourceImage::new(path, size, width, height), file_name))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn store(
    output_dir: &Path,
    relative: String,
    rendition: &Rendition,
) -> Result<StoredFile, ProcessError> {
    let bytes = rendition.result.bytes();
    std::fs::write(output_dir.join(&relative), bytes)?;
    Ok(StoredFile {
        path: relative,
        size: bytes.len() as u64,
        sha256: format!("{:x}", Sha256::digest(bytes)),
        width: rendition.width,
        height: rendition.height,
        generator: rendition.generator.to_string(),
    })
}

fn write_renditions(
    images: &DerivedImages,
    output_dir: &Path,
    dir_name: &str,
    entry: &mut ItemEntry,
) -> Result<(), ProcessError> {
    std::fs::create_dir_all(output_dir.join(dir_name))?;
    if let Some(thumb) = &images.thumbnail {
        let relative = format!("{dir_name}/thumbnail.{}", thumb.format.extension());
        entry.thumbnail = Some(store(output_dir, relative, thumb)?);
    }
    for artifact in &images.artifacts {
        let relative = format!("{dir_name}/{}", artifact.filename);
        entry.artifacts.push(StoredArtifact {
            qualifier: artifact.qualifier.to_string(),
            filename: artifact.filename.clone(),
            mime_type: artifact.mime_type.to_string(),
            file: store(output_dir, relative, &artifact.rendition)?,
        });
    }
    Ok(())
}

fn variant_infos(images: &DerivedImages) -> Vec<VariantInfo> {
    let rendered = images
        .thumbnail
        .iter()
        .chain(images.artifacts.iter().map(|a| &a.rendition))
        .map(|r| VariantInfo {
            label: r.variant.qualifier().to_string(),
            status: VariantStatus::Rendered {
                generator: r.generator.to_string(),
                width: r.width,
                height: r.height,
            },
        });
    let failed = images.failures.iter().map(|f| VariantInfo {
        label: f.variant.qualifier().to_string(),
        status: VariantStatus::Failed(f.to_string()),
    });
    rendered.chain(failed).collect()
}

fn process_item(
    generators: &[&dyn ImageGenerator],
    settings: &GenerationSettings,
    output_dir: &Path,
    index: usize,
    path: &Path,
    dir_name: &str,
) -> (ItemEntry, ProcessEvent) {
    let source_path = path.display().to_string();
    let skip = |title: String, reason: String| {
        log::warn!("{source_path}: skipped: {reason}");
        (
            ItemEntry {
                source_path: source_path.clone(),
                title,
                dimensions: None,
                thumbnail: None,
                artifacts: Vec::new(),
                warnings: Vec::new(),
                skipped: Some(reason.clone()),
            },
            ProcessEvent::ItemSkipped {
                index,
                source_path: source_path.clone(),
                reason,
            },
        )
    };

    let (source, title) = match load_source(path) {
        Ok(loaded) => loaded,
        Err(reason) => return skip(String::new(), reason),
    };
    log::info!(
        "{source_path}: rendering {}x{} \"{title}\"",
        source.width,
        source.height
    );

    let mut images = match generate_derived_images(generators, &source, &title, settings) {
        Ok(images) => images,
        Err(e) => return skip(title, e.to_string()),
    };

    let mut entry = ItemEntry {
        source_path: source_path.clone(),
        title: title.clone(),
        dimensions: Some((source.width, source.height)),
        thumbnail: None,
        artifacts: Vec::new(),
        warnings: images.failures.iter().map(|f| f.to_string()).collect(),
        skipped: None,
    };
    let written = write_renditions(&images, output_dir, dir_name, &mut entry);
    // Temp files go whether or not the write succeeded.
    if let Err(e) = images.cleanup() {
        log::warn!("{source_path}: could not remove temp output: {e}");
    }
    if let Err(e) = written {
        return skip(title, format!("could not store renditions: {e}"));
    }
    log::info!("{source_path}: done");

    let event = ProcessEvent::ItemProcessed {
        index,
        title: Some(title),
        source_path,
        variants: variant_infos(&images),
    };
    (entry, event)
}

/// Render every input with the generators configured in `config`.
pub fn process(
    inputs: &[PathBuf],
    output_dir: &Path,
    config: &RenditionConfig,
    events: Option<Sender<ProcessEvent>>,
) -> Result<Manifest, ProcessError> {
    let external = GdalBackend::new(SystemRunner::new(config.external.timeout())).with_commands(
        &config.external.translate_command,
        &config.external.info_command,
    );
    let fallback = RustBackend::new()
        .with_max_source_size_mb(config.fallback.max_source_size_mb)
        .with_render_mode(config.fallback.render_mode)
        .with_jpeg2000(config.fallback.jpeg2000_params());

    let mut generators: Vec<&dyn ImageGenerator> = Vec::new();
    if config.external.enabled {
        generators.push(&external);
    }
    generators.push(&fallback);

    process_with_generators(
        &generators,
        inputs,
        output_dir,
        &config.generation_settings(),
        events,
    )
}

/// Render every input with an explicit generator list (allows testing with mocks).
pub fn process_with_generators(
    generators: &[&dyn ImageGenerator],
    inputs: &[PathBuf],
    output_dir: &Path,
    settings: &GenerationSettings,
    events: Option<Sender<ProcessEvent>>,
) -> Result<Manifest, ProcessError> {
    let inputs = collect_inputs(inputs)?;
    if inputs.is_empty() {
        return Err(ProcessError::NoInputs);
    }
    std::fs::create_dir_all(output_dir)?;
    let dir_names = item_dir_names(&inputs);

    if let Some(tx) = &events {
        tx.send(ProcessEvent::BatchStarted {
            item_count: inputs.len(),
        })
        .ok();
    }

    let items = inputs
        .par_iter()
        .zip(dir_names.par_iter())
        .enumerate()
        .map(|(i, (path, dir_name))| {
            let (entry, event) =
                process_item(generators, settings, output_dir, i + 1, path, dir_name);
            if let Some(tx) = &events {
                tx.send(event).ok();
            }
            entry
        })
        .collect::<Vec<_>>();

    let manifest = Manifest { items };
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(output_dir.join(MANIFEST_FILE_NAME), json)?;
    Ok(manifest)
}
