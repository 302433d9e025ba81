//! CLI output formatting for every subcommand.
//!
//! # Information-First Display
//!
//! Each item is shown by its positional index and title first, with the
//! file path as an indented `Source:` line. Untitled items fall back to
//! the file name in parentheses so every line still identifies something.
//!
//! # Output Format
//!
//! ## Render
//!
//! ```text
//! Rendering 2 items
//!     001 Checks for test
//!         Source: data/i_3001a.ntf
//!         thumbnail: 200x100 (gdal)
//!         overview: 1024x512 (rust)
//!         original: failed: original: gdal (timed out); rust (source is 300 MB, limit is 120 MB)
//!     002 (broken.ntf)
//!         Source: data/broken.ntf
//!         skipped: not a NITF/NSIF file
//!
//! Rendered 1 item, 1 skipped, 1 warning → renditions/manifest.json
//! ```
//!
//! ## Inspect
//!
//! ```text
//! NITF 2.1 Checks for test
//!     Source: data/i_3001a.ntf
//!     Originator: JITC
//!     Length: 1049479 bytes (header 404)
//!     001 Image 1024x1024
//!         Pixels: INT 8 bit, MONO, 1 band
//!         Compression: NC
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes to stdout. Format functions do no I/O.

use crate::imaging::PixelStatistics;
use crate::nitf::NitfHeader;
use crate::process::{Manifest, ProcessEvent, VariantStatus};
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Titled items show the title, untitled ones the filename in parens.
///
/// ```text
/// 001 Checks for test
/// 001 (i_3001a.ntf)
/// ```
fn item_line(index: usize, title: Option<&str>, filename: &str) -> String {
    match title {
        Some(t) if !t.trim().is_empty() => format!("{} {}", format_index(index), t.trim()),
        _ => format!("{} ({})", format_index(index), filename),
    }
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

// ============================================================================
// Render
// ============================================================================

/// Longest failure reason shown per variant line; the manifest has the rest.
const MAX_REASON_CHARS: usize = 160;

/// Format a single progress event from the render pipeline.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::BatchStarted { item_count } => {
            vec![format!("Rendering {}", plural(*item_count, "item"))]
        }
        ProcessEvent::ItemProcessed {
            index,
            title,
            source_path,
            variants,
        } => {
            let mut lines = vec![
                format!(
                    "{}{}",
                    indent(1),
                    item_line(*index, title.as_deref(), &file_name(source_path))
                ),
                format!("{}Source: {}", indent(2), source_path),
            ];
            for variant in variants {
                let status = match &variant.status {
                    VariantStatus::Rendered {
                        generator,
                        width,
                        height,
                    } => format!("{width}x{height} ({generator})"),
                    VariantStatus::Failed(reason) => {
                        format!("failed: {}", truncate(reason, MAX_REASON_CHARS))
                    }
                };
                lines.push(format!("{}{}: {}", indent(2), variant.label, status));
            }
            lines
        }
        ProcessEvent::ItemSkipped {
            index,
            source_path,
            reason,
        } => vec![
            format!(
                "{}{}",
                indent(1),
                item_line(*index, None, &file_name(source_path))
            ),
            format!("{}Source: {}", indent(2), source_path),
            format!(
                "{}skipped: {}",
                indent(2),
                truncate(reason, MAX_REASON_CHARS)
            ),
        ],
    }
}

pub fn print_process_event(event: &ProcessEvent) {
    for line in format_process_event(event) {
        println!("{}", line);
    }
}

/// One-line batch summary printed after the last item.
pub fn format_render_summary(manifest: &Manifest, manifest_path: &Path) -> Vec<String> {
    let skipped = manifest
        .items
        .iter()
        .filter(|i| i.skipped.is_some())
        .count();
    let rendered = manifest.items.len() - skipped;
    let warnings: usize = manifest.items.iter().map(|i| i.warnings.len()).sum();

    let mut summary = format!("Rendered {}", plural(rendered, "item"));
    if skipped > 0 {
        summary.push_str(&format!(", {skipped} skipped"));
    }
    if warnings > 0 {
        summary.push_str(&format!(", {}", plural(warnings, "warning")));
    }
    vec![
        String::new(),
        format!("{} \u{2192} {}", summary, manifest_path.display()),
    ]
}

pub fn print_render_summary(manifest: &Manifest, manifest_path: &Path) {
    for line in format_render_summary(manifest, manifest_path) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

/// Format the file header and every image subheader.
pub fn format_inspect(header: &NitfHeader, path: &Path) -> Vec<String> {
    let title = if header.title.trim().is_empty() {
        format!("({})", file_name(&path.display().to_string()))
    } else {
        header.title.trim().to_string()
    };
    let mut lines = vec![
        format!("{} {}", header.version, title),
        format!("{}Source: {}", indent(1), path.display()),
    ];
    if !header.originator.trim().is_empty() {
        lines.push(format!("{}Originator: {}", indent(1), header.originator.trim()));
    }
    lines.push(format!(
        "{}Length: {} bytes (header {})",
        indent(1),
        header.file_length,
        header.header_length
    ));

    if header.images.is_empty() {
        lines.push(format!("{}No image segments", indent(1)));
    }
    for (i, image) in header.images.iter().enumerate() {
        let label = if image.title.trim().is_empty() {
            "Image".to_string()
        } else {
            image.title.trim().to_string()
        };
        lines.push(format!(
            "{}{} {} {}x{}",
            indent(1),
            format_index(i + 1),
            label,
            image.cols,
            image.rows
        ));
        lines.push(format!(
            "{}Pixels: {} {} bit, {}, {}",
            indent(2),
            image.pixel_value_type.trim(),
            image.abpp,
            image.irep.trim(),
            plural(image.bands.len(), "band")
        ));
        let compression = match &image.compression_rate {
            Some(rate) => format!("{} ({})", image.compression.trim(), rate.trim()),
            None => image.compression.trim().to_string(),
        };
        lines.push(format!("{}Compression: {}", indent(2), compression));
        for comment in image.comments.iter().filter(|c| !c.trim().is_empty()) {
            lines.push(format!("{}Comment: {}", indent(2), comment.trim()));
        }
    }
    lines
}

pub fn print_inspect(header: &NitfHeader, path: &Path) {
    for line in format_inspect(header, path) {
        println!("{}", line);
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Format pixel statistics and the derived scale range.
pub fn format_stats(path: &Path, stats: Option<&PixelStatistics>) -> Vec<String> {
    let mut lines = vec![path.display().to_string()];
    match stats {
        None => lines.push(format!("{}No statistics available", indent(1))),
        Some(s) => {
            lines.push(format!("{}Minimum: {}", indent(1), s.min));
            lines.push(format!("{}Maximum: {}", indent(1), s.max));
            lines.push(format!("{}Mean: {}", indent(1), s.mean));
            lines.push(format!("{}StdDev: {}", indent(1), s.std_dev));
            match s.scale_range() {
                Some(range) => {
                    lines.push(format!("{}Scale: {} {}", indent(1), range.lo, range.hi))
                }
                None => lines.push(format!("{}Scale: none", indent(1))),
            }
        }
    }
    lines
}

pub fn print_stats(path: &Path, stats: Option<&PixelStatistics>) {
    for line in format_stats(path, stats) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nitf::parse_header;
    use crate::process::{ItemEntry, VariantInfo};
    use crate::test_helpers::{NitfBuilder, SegmentSpec};

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn item_line_prefers_title() {
        assert_eq!(item_line(2, Some("Scene"), "a.ntf"), "002 Scene");
        assert_eq!(item_line(2, Some("   "), "a.ntf"), "002 (a.ntf)");
        assert_eq!(item_line(2, None, "a.ntf"), "002 (a.ntf)");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "item"), "1 item");
        assert_eq!(plural(0, "item"), "0 items");
    }

    // =========================================================================
    // Render tests
    // =========================================================================

    #[test]
    fn batch_started_line() {
        let lines = format_process_event(&ProcessEvent::BatchStarted { item_count: 1 });
        assert_eq!(lines, vec!["Rendering 1 item"]);
    }

    #[test]
    fn item_processed_lists_variants() {
        let event = ProcessEvent::ItemProcessed {
            index: 1,
            title: Some("Checks for test".into()),
            source_path: "data/i_3001a.ntf".into(),
            variants: vec![
                VariantInfo {
                    label: "thumbnail".into(),
                    status: VariantStatus::Rendered {
                        generator: "gdal".into(),
                        width: 200,
                        height: 100,
                    },
                },
                VariantInfo {
                    label: "original".into(),
                    status: VariantStatus::Failed("original: rust (too big)".into()),
                },
            ],
        };
        assert_eq!(
            format_process_event(&event),
            vec![
                "    001 Checks for test",
                "        Source: data/i_3001a.ntf",
                "        thumbnail: 200x100 (gdal)",
                "        original: failed: original: rust (too big)",
            ]
        );
    }

    #[test]
    fn item_skipped_shows_filename_and_reason() {
        let event = ProcessEvent::ItemSkipped {
            index: 3,
            source_path: "data/broken.ntf".into(),
            reason: "not a NITF/NSIF file".into(),
        };
        let lines = format_process_event(&event);
        assert_eq!(lines[0], "    003 (broken.ntf)");
        assert_eq!(lines[2], "        skipped: not a NITF/NSIF file");
    }

    #[test]
    fn render_summary_counts() {
        let entry = |skipped: Option<&str>, warnings: usize| ItemEntry {
            source_path: "a.ntf".into(),
            title: "a".into(),
            dimensions: None,
            thumbnail: None,
            artifacts: Vec::new(),
            warnings: vec!["w".into(); warnings],
            skipped: skipped.map(String::from),
        };
        let manifest = Manifest {
            items: vec![entry(None, 2), entry(Some("bad"), 0), entry(None, 0)],
        };
        let lines = format_render_summary(&manifest, Path::new("out/manifest.json"));
        assert_eq!(
            lines[1],
            "Rendered 2 items, 1 skipped, 2 warnings \u{2192} out/manifest.json"
        );
    }

    // =========================================================================
    // Inspect tests
    // =========================================================================

    #[test]
    fn inspect_lists_segments() {
        let bytes = NitfBuilder::new()
            .title("Checks for test")
            .segment(SegmentSpec::mono8(16, 8).comment("calibrated"))
            .segment(SegmentSpec::rgb8(4, 4))
            .build();
        let header = parse_header(&bytes).unwrap();
        let lines = format_inspect(&header, Path::new("data/scene.ntf"));

        assert_eq!(lines[0], "NITF 2.1 Checks for test");
        assert_eq!(lines[1], "    Source: data/scene.ntf");
        assert!(lines.iter().any(|l| l.ends_with("16x8")));
        assert!(lines.iter().any(|l| l == "        Pixels: INT 8 bit, MONO, 1 band"));
        assert!(lines.iter().any(|l| l == "        Comment: calibrated"));
        assert!(lines.iter().any(|l| l.contains("3 bands")));
    }

    #[test]
    fn inspect_untitled_uses_filename() {
        let bytes = NitfBuilder::new().build();
        let header = parse_header(&bytes).unwrap();
        let lines = format_inspect(&header, Path::new("data/scene.ntf"));
        assert_eq!(lines[0], "NITF 2.1 (scene.ntf)");
        assert!(lines.iter().any(|l| l.trim() == "No image segments"));
    }

    // =========================================================================
    // Stats tests
    // =========================================================================

    #[test]
    fn stats_with_range() {
        let stats = PixelStatistics {
            min: 0.0,
            max: 255.0,
            mean: 100.0,
            std_dev: 20.0,
        };
        let lines = format_stats(Path::new("a.ntf"), Some(&stats));
        assert_eq!(lines[0], "a.ntf");
        assert!(lines.iter().any(|l| l.trim() == "StdDev: 20"));
        assert!(lines.iter().any(|l| l.trim().starts_with("Scale: ")));
    }

    #[test]
    fn stats_missing() {
        let lines = format_stats(Path::new("a.ntf"), None);
        assert_eq!(lines[1], "    No statistics available");
    }
}
