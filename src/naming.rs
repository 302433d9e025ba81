//! Filenames for derived renditions and temporary translate outputs.
//!
//! ## Derived filenames
//!
//! A derived artifact is named after the content title and its qualifier:
//! the title's base name (directory and extension removed) keeps only
//! `[A-Za-z0-9_]`, and the result is lower-cased.
//!
//! - `"My Tank $$ Image.tif"` + `overview` → `overview-mytankimage.jpg`
//! - `"###"` + `overview` → `overview.jpg` (no alphanumerics left)
//!
//! ## Temporary outputs
//!
//! `gdal_translate` writes next to the source as
//! `<uuid>_<source stem>.<ext>`, so concurrent renders never collide.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Base name of a title: text after the last `/` or `\`, extension removed.
///
/// Everything from the last dot is the extension, so `".scene"` has an
/// empty base name.
pub fn base_name(title: &str) -> &str {
    let file = title
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(title);
    match file.rfind('.') {
        Some(dot) => &file[..dot],
        None => file,
    }
}

/// Build `<qualifier>-<sanitized base name>.<ext>`, lower-cased.
///
/// Falls back to `<qualifier>.<ext>` when the base name has no ASCII
/// letter or digit.
pub fn derived_image_filename(title: &str, qualifier: &str, extension: &str) -> String {
    let base = base_name(title);
    if !base.chars().any(|c| c.is_ascii_alphanumeric()) {
        return format!("{}.{}", qualifier, extension).to_lowercase();
    }
    let stripped: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("{}-{}.{}", qualifier, stripped, extension).to_lowercase()
}

/// Fresh temp output path next to `source`: `<uuid>_<stem>.<ext>`.
pub fn temp_output_path(source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = source.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}_{}.{}", Uuid::new_v4(), stem, extension))
}
