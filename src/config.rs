//! Rendition configuration module.
//!
//! Handles loading, validating, and layering `renditions.toml` files.
//! Configuration is hierarchical: stock defaults are overridden by each
//! config file in the order given (`--config a.toml --config b.toml`), and
//! when no file is given, by `renditions.toml` in the working directory if
//! present.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [thumbnail]
//! width = 200               # Bounding box; the larger side is the limit
//! height = 200
//! format = "jpeg"           # "jpeg" or "jpeg2000"
//!
//! [overview]
//! enabled = true
//! max_side_length = 1024    # 0 means the default (1024)
//! format = "jpeg"
//!
//! [original]
//! enabled = true
//! format = "jpeg2000"
//!
//! [external]
//! enabled = true            # Try gdal_translate before the in-process decoder
//! translate_command = "gdal_translate"
//! info_command = "gdalinfo"
//! timeout_secs = 300        # 0 disables the timeout
//!
//! [fallback]
//! max_source_size_mb = 120  # Larger sources are not decoded in-process
//! render_mode = "closest"   # "closest" or "rgb"
//! jpeg2000_quality = 0.0    # 0.0 = maximum compression, 1.0 = minimum
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! # Only disable the external tool
//! [external]
//! enabled = false
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{
    DEFAULT_MAX_SIDE_LENGTH, GenerationSettings, Jpeg2000Params, OutputFormat, RenderMode,
};
use crate::imaging::gdal_backend::{DEFAULT_INFO_COMMAND, DEFAULT_TRANSLATE_COMMAND};
use crate::imaging::rust_backend::DEFAULT_MAX_SOURCE_SIZE_MB;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file picked up from a directory.
pub const CONFIG_FILE_NAME: &str = "renditions.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Rendition configuration loaded from `renditions.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenditionConfig {
    /// Thumbnail bounding box and format.
    pub thumbnail: ThumbnailConfig,
    /// Downscaled overview image.
    pub overview: OverviewConfig,
    /// Full-resolution copy.
    pub original: OriginalConfig,
    /// External translate/info tools.
    pub external: ExternalConfig,
    /// In-process decoder used when the external tool fails.
    pub fallback: FallbackConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl RenditionConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            return Err(ConfigError::Validation(
                "thumbnail.width and thumbnail.height must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback.jpeg2000_quality) {
            return Err(ConfigError::Validation(
                "fallback.jpeg2000_quality must be 0.0-1.0".into(),
            ));
        }
        if self.external.translate_command.trim().is_empty()
            || self.external.info_command.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "external commands must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Variant settings for the orchestrator.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            thumbnail_width: self.thumbnail.width,
            thumbnail_height: self.thumbnail.height,
            thumbnail_format: self.thumbnail.format,
            overview_enabled: self.overview.enabled,
            overview_max_side: self.overview.max_side_length,
            overview_format: self.overview.format,
            original_enabled: self.original.enabled,
            original_format: self.original.format,
        }
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Overview generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverviewConfig {
    pub enabled: bool,
    /// Bound on the longer side. 0 means the default.
    pub max_side_length: u32,
    pub format: OutputFormat,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_side_length: DEFAULT_MAX_SIDE_LENGTH,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Full-resolution copy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OriginalConfig {
    pub enabled: bool,
    pub format: OutputFormat,
}

impl Default for OriginalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: OutputFormat::Jpeg2000,
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExternalConfig {
    pub enabled: bool,
    pub translate_command: String,
    pub info_command: String,
    /// Seconds before a tool is killed. 0 disables the timeout.
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            translate_command: DEFAULT_TRANSLATE_COMMAND.to_string(),
            info_command: DEFAULT_INFO_COMMAND.to_string(),
            timeout_secs: 300,
        }
    }
}

impl ExternalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// In-process decoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    pub max_source_size_mb: u64,
    pub render_mode: RenderMode,
    pub jpeg2000_quality: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_source_size_mb: DEFAULT_MAX_SOURCE_SIZE_MB,
            render_mode: RenderMode::Closest,
            jpeg2000_quality: 0.0,
        }
    }
}

impl FallbackConfig {
    pub fn jpeg2000_params(&self) -> Jpeg2000Params {
        Jpeg2000Params::new(self.jpeg2000_quality)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Loading and layering
// =============================================================================

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(RenditionConfig::default()).expect("default config must serialize")
}

/// Deep-merge `overlay` onto `base`. Tables merge key by key; any other
/// value in the overlay replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse one config file without validating it.
pub fn read_config_file(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Read `renditions.toml` from `dir`, or `None` when there is none.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    read_config_file(&config_path).map(Some)
}

/// Merge overlays onto `base` in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<RenditionConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: RenditionConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load stock defaults layered with `files`, in order.
pub fn load_config(files: &[PathBuf]) -> Result<RenditionConfig, ConfigError> {
    let overlays = files
        .iter()
        .map(|f| read_config_file(f))
        .collect::<Result<Vec<_>, _>>()?;
    resolve_config(stock_defaults_value(), overlays)
}

/// Load stock defaults layered with `dir/renditions.toml` if present.
pub fn load_config_from_dir(dir: &Path) -> Result<RenditionConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(dir)?)
}

/// Documented stock config, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# NITF Renditions Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Config files are layered in the order given on the command line:
#   nitf-renditions --config site.toml --config run.toml render ...
# Without --config, ./renditions.toml is used when present.
#
# Each layer only needs the keys it wants to override.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Thumbnail
# ---------------------------------------------------------------------------
[thumbnail]
# Bounding box; the larger of the two is the limit for the longer side.
width = 200
height = 200
# "jpeg" or "jpeg2000"
format = "jpeg"

# ---------------------------------------------------------------------------
# Overview (downscaled derived image)
# ---------------------------------------------------------------------------
[overview]
enabled = true
# Longer side in pixels. Smaller sources are never upscaled.
# 0 falls back to the default (1024).
max_side_length = 1024
format = "jpeg"

# ---------------------------------------------------------------------------
# Original (full-resolution derived image)
# ---------------------------------------------------------------------------
[original]
enabled = true
format = "jpeg2000"

# ---------------------------------------------------------------------------
# External tools (tried first)
# ---------------------------------------------------------------------------
[external]
# Set to false to always use the in-process decoder.
enabled = true
translate_command = "gdal_translate"
# Used to compute a contrast stretch for monochrome sources.
info_command = "gdalinfo"
# Seconds before a tool run is killed. 0 disables the timeout.
timeout_secs = 300

# ---------------------------------------------------------------------------
# In-process fallback decoder
# ---------------------------------------------------------------------------
[fallback]
# Sources larger than this (whole MiB) are not decoded in-process.
max_source_size_mb = 120
# "closest" keeps grey/16-bit data as decoded; "rgb" converts to 8-bit RGB.
render_mode = "closest"
# JPEG 2000 quality: 0.0 = maximum compression, 1.0 = minimum compression.
jpeg2000_quality = 0.0

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
