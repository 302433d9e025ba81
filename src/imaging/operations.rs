//! High-level rendition generation.
//!
//! Combines the dimension policy with an ordered list of generators. Each
//! variant is tried against every generator in turn; the first success wins.
//! A failing or panicking generator only costs that attempt, and a variant
//! that no generator can produce is recorded and skipped.
//!
//! Each generator opens at most one [`RenderSession`] per source, so work such
//! as decoding or statistics is shared by all variants of that source.

use super::backend::{ImageGenerator, RenderError, RenderResult, RenderSession};
use super::calculations::{
    DEFAULT_MAX_SIDE_LENGTH, calculate_output_dimensions, effective_max_side,
};
use super::params::{ImageVariant, OutputFormat, RenderRequest};
use super::source::SourceImage;
use crate::naming::derived_image_filename;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;

/// What to generate. Built from the `[thumbnail]`, `[overview]` and
/// `[original]` config sections.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_format: OutputFormat,
    pub overview_enabled: bool,
    /// 0 falls back to the default max side.
    pub overview_max_side: u32,
    pub overview_format: OutputFormat,
    pub original_enabled: bool,
    pub original_format: OutputFormat,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            thumbnail_width: 200,
            thumbnail_height: 200,
            thumbnail_format: OutputFormat::Jpeg,
            overview_enabled: true,
            overview_max_side: DEFAULT_MAX_SIDE_LENGTH,
            overview_format: OutputFormat::Jpeg,
            original_enabled: true,
            original_format: OutputFormat::Jpeg2000,
        }
    }
}

impl GenerationSettings {
    /// Variants to attempt, in order.
    pub fn variants(&self) -> Vec<ImageVariant> {
        ImageVariant::ALL
            .into_iter()
            .filter(|v| match v {
                ImageVariant::Thumbnail => true,
                ImageVariant::Overview => self.overview_enabled,
                ImageVariant::Original => self.original_enabled,
            })
            .collect()
    }

    pub fn format_for(&self, variant: ImageVariant) -> OutputFormat {
        match variant {
            ImageVariant::Thumbnail => self.thumbnail_format,
            ImageVariant::Overview => self.overview_format,
            ImageVariant::Original => self.original_format,
        }
    }

    /// Target size for `variant` of a `width` x `height` source.
    pub fn dimensions_for(&self, variant: ImageVariant, width: u32, height: u32) -> (u32, u32) {
        match variant {
            ImageVariant::Thumbnail => calculate_output_dimensions(
                width,
                height,
                self.thumbnail_width.max(self.thumbnail_height),
            ),
            ImageVariant::Overview => {
                calculate_output_dimensions(width, height, effective_max_side(self.overview_max_side))
            }
            ImageVariant::Original => (width, height),
        }
    }
}

/// One successfully rendered variant.
#[derive(Debug)]
pub struct Rendition {
    pub variant: ImageVariant,
    /// Name of the generator that produced it.
    pub generator: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub result: RenderResult,
}

/// A derived (non-thumbnail) image ready to be stored next to the item.
#[derive(Debug)]
pub struct DerivedArtifact {
    pub qualifier: &'static str,
    pub filename: String,
    pub mime_type: &'static str,
    pub rendition: Rendition,
}

/// One failed generator attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub generator: &'static str,
    pub error: String,
}

/// A variant every generator failed to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFailure {
    pub variant: ImageVariant,
    pub attempts: Vec<Attempt>,
}

impl fmt::Display for VariantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.variant)?;
        if self.attempts.is_empty() {
            return f.write_str("no generator available");
        }
        let parts: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{} ({})", a.generator, a.error))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Everything produced for one source.
#[derive(Debug, Default)]
pub struct DerivedImages {
    pub thumbnail: Option<Rendition>,
    pub artifacts: Vec<DerivedArtifact>,
    pub failures: Vec<VariantFailure>,
}

impl DerivedImages {
    pub fn is_empty(&self) -> bool {
        self.thumbnail.is_none() && self.artifacts.is_empty()
    }

    /// Remove temp files backing any rendition.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        if let Some(thumb) = &mut self.thumbnail {
            thumb.result.cleanup()?;
        }
        for artifact in &mut self.artifacts {
            artifact.rendition.result.cleanup()?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("no renditions generated ({})", summarize(.failures))]
    NothingGenerated { failures: Vec<VariantFailure> },
}

fn summarize(failures: &[VariantFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Try each generator in order until one succeeds.
///
/// Returns the winning generator's name and result, or every attempt's error.
pub fn render_with_fallback(
    generators: &[&dyn ImageGenerator],
    source: &SourceImage,
    request: &RenderRequest,
) -> Result<(&'static str, RenderResult), Vec<Attempt>> {
    Sessions::new(generators, source).render(request)
}

/// One lazily opened session per generator, shared by the variants of a source.
struct Sessions<'a> {
    generators: &'a [&'a dyn ImageGenerator],
    source: &'a SourceImage,
    open: Vec<Option<Box<dyn RenderSession + 'a>>>,
}

impl<'a> Sessions<'a> {
    fn new(generators: &'a [&'a dyn ImageGenerator], source: &'a SourceImage) -> Self {
        Self {
            generators,
            source,
            open: generators.iter().map(|_| None).collect(),
        }
    }

    fn render(
        &mut self,
        request: &RenderRequest,
    ) -> Result<(&'static str, RenderResult), Vec<Attempt>> {
        let (generators, source) = (self.generators, self.source);
        let mut attempts = Vec::new();
        for (generator, slot) in generators.iter().zip(self.open.iter_mut()) {
            let name = generator.name();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                slot.get_or_insert_with(|| generator.session(source)).render(request)
            }))
            .unwrap_or_else(|payload| {
                // A session that panicked may hold half-built state.
                *slot = None;
                Err(RenderError::Panicked(panic_message(payload)))
            });
            match outcome {
                Ok(result) => {
                    if !attempts.is_empty() {
                        log::debug!(
                            "{}: {}x{} rendered by fallback {name}",
                            source.path.display(),
                            request.width(),
                            request.height()
                        );
                    }
                    return Ok((name, result));
                }
                Err(e) => {
                    log::debug!("{}: {name} failed: {e}", source.path.display());
                    attempts.push(Attempt {
                        generator: name,
                        error: e.to_string(),
                    });
                }
            }
        }
        Err(attempts)
    }
}

fn render_variant(
    sessions: &mut Sessions<'_>,
    variant: ImageVariant,
    settings: &GenerationSettings,
) -> Result<Rendition, VariantFailure> {
    let source = sessions.source;
    let format = settings.format_for(variant);
    let request = if source.width == 0 || source.height == 0 {
        None
    } else {
        let (width, height) = settings.dimensions_for(variant, source.width, source.height);
        RenderRequest::new(width, height, format)
    };
    let Some(request) = request else {
        return Err(VariantFailure {
            variant,
            attempts: vec![Attempt {
                generator: "policy",
                error: RenderError::InvalidRequest(format!(
                    "source size {}x{}",
                    source.width, source.height
                ))
                .to_string(),
            }],
        });
    };

    sessions
        .render(&request)
        .map(|(generator, result)| Rendition {
            variant,
            generator,
            width: request.width(),
            height: request.height(),
            format,
            result,
        })
        .map_err(|attempts| VariantFailure { variant, attempts })
}

/// Generate the thumbnail and every enabled derived image for `source`.
///
/// `title` names the derived files. Fails only when nothing at all could be
/// produced; partial failures are reported in [`DerivedImages::failures`].
pub fn generate_derived_images(
    generators: &[&dyn ImageGenerator],
    source: &SourceImage,
    title: &str,
    settings: &GenerationSettings,
) -> Result<DerivedImages, GenerationError> {
    let mut images = DerivedImages::default();
    let mut sessions = Sessions::new(generators, source);

    for variant in settings.variants() {
        match render_variant(&mut sessions, variant, settings) {
            Ok(rendition) if variant == ImageVariant::Thumbnail => {
                images.thumbnail = Some(rendition);
            }
            Ok(rendition) => {
                let format = rendition.format;
                images.artifacts.push(DerivedArtifact {
                    qualifier: variant.qualifier(),
                    filename: derived_image_filename(title, variant.qualifier(), format.extension()),
                    mime_type: format.mime_type(),
                    rendition,
                });
            }
            Err(failure) => {
                log::warn!("{}: skipping {failure}", source.path.display());
                images.failures.push(failure);
            }
        }
    }

    if images.is_empty() {
        return Err(GenerationError::NothingGenerated {
            failures: images.failures,
        });
    }
    Ok(images)
}
