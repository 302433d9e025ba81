//! External renderer backed by `gdal_translate`.
//!
//! Invocation shape:
//!
//! ```text
//! gdal_translate -of <driver> [-b R] [-b G] [-b B] [-ot Byte] [-scale lo hi] \
//!     -outsize <w> <h> <input> <uuid>_<stem>.<ext>
//! ```
//!
//! - Band selection only applies to multi-band sources, red then green then blue.
//! - `-ot Byte` is emitted for JPEG output and whenever a stretch is applied.
//! - `-scale` is emitted for monochrome sources when statistics are available.
//!
//! The output lands next to the source. On success the bytes are read back
//! and the file is handed to the caller through
//! [`RenderResult::temp_file`](super::backend::RenderResult::temp_file); on
//! failure any partial output is removed here.
//!
//! A [`session`](ImageGenerator::session) runs `gdalinfo` once per source and
//! reuses the range for every variant.

use super::backend::{ImageGenerator, RenderError, RenderResult, RenderSession};
use super::params::{OutputFormat, RenderRequest};
use super::runner::{CommandRunner, CommandSpec, RunnerError, SystemRunner};
use super::source::{ColorChannel, SourceImage};
use super::statistics::{ScaleRange, collect_statistics};
use crate::naming::temp_output_path;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRANSLATE_COMMAND: &str = "gdal_translate";
pub const DEFAULT_INFO_COMMAND: &str = "gdalinfo";

/// Renders through `gdal_translate`, consulting `gdalinfo` for statistics.
pub struct GdalBackend<R: CommandRunner = SystemRunner> {
    runner: R,
    translate_command: String,
    info_command: String,
}

impl GdalBackend<SystemRunner> {
    pub fn new(runner: SystemRunner) -> Self {
        Self::with_runner(runner)
    }
}

impl<R: CommandRunner> GdalBackend<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            translate_command: DEFAULT_TRANSLATE_COMMAND.to_string(),
            info_command: DEFAULT_INFO_COMMAND.to_string(),
        }
    }

    pub fn with_commands(mut self, translate: impl Into<String>, info: impl Into<String>) -> Self {
        self.translate_command = translate.into();
        self.info_command = info.into();
        self
    }

    fn scale_range(&self, source: &SourceImage, input: &Path) -> Option<ScaleRange> {
        if !source.is_monochrome() {
            return None;
        }
        collect_statistics(&self.runner, &self.info_command, input)?.scale_range()
    }

    fn translate(
        &self,
        source: &SourceImage,
        input: &Path,
        scale: Option<ScaleRange>,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let output = temp_output_path(input, request.format().extension());

        let args = build_translate_args(
            source,
            request,
            scale,
            path_arg(input)?,
            path_arg(&output)?,
        );
        let spec = CommandSpec::new(&self.translate_command).args(args);
        log::debug!("{}", spec);

        let out = match self.runner.run(&spec) {
            Ok(out) => out,
            Err(RunnerError::TimedOut {
                command, output: o, ..
            }) => {
                remove_partial(&output);
                return Err(RenderError::ToolTimedOut { command, output: o });
            }
            Err(RunnerError::Spawn { program, source }) => {
                remove_partial(&output);
                return Err(RenderError::Io(std::io::Error::new(
                    source.kind(),
                    format!("{}: {}", program, source),
                )));
            }
            Err(RunnerError::Io(e)) => {
                remove_partial(&output);
                return Err(RenderError::Io(e));
            }
        };
        log::debug!("{} output: {}", self.translate_command, out.output.trim());

        if !out.success() {
            remove_partial(&output);
            return Err(RenderError::ToolFailed {
                command: spec.to_string(),
                status: out.status_string(),
                output: out.output,
            });
        }
        if !output.exists() {
            return Err(RenderError::MissingOutput {
                path: output,
                output: out.output,
            });
        }
        match std::fs::read(&output) {
            Ok(bytes) => Ok(RenderResult::from_temp_file(bytes, output)),
            Err(e) => {
                remove_partial(&output);
                Err(RenderError::Io(e))
            }
        }
    }
}

/// Build the `gdal_translate` argument vector (program name excluded).
pub fn build_translate_args(
    source: &SourceImage,
    request: &RenderRequest,
    scale: Option<ScaleRange>,
    input: &str,
    output: &str,
) -> Vec<String> {
    let mut args = vec!["-of".to_string(), request.format().gdal_driver().to_string()];

    if source.bands.len() > 1 {
        let (mut red, mut green, mut blue) = (None, None, None);
        for (i, band) in source.bands.iter().enumerate() {
            match band.color_channel() {
                Some(ColorChannel::Red) if red.is_none() => red = Some(i + 1),
                Some(ColorChannel::Green) if green.is_none() => green = Some(i + 1),
                Some(ColorChannel::Blue) if blue.is_none() => blue = Some(i + 1),
                _ => {}
            }
        }
        for index in [red, green, blue].into_iter().flatten() {
            args.push("-b".to_string());
            args.push(index.to_string());
        }
    }

    let scale = scale.filter(|_| source.is_monochrome());
    if request.format() == OutputFormat::Jpeg || scale.is_some() {
        args.push("-ot".to_string());
        args.push("Byte".to_string());
    }
    if let Some(ScaleRange { lo, hi }) = scale {
        args.push("-scale".to_string());
        args.push(lo.to_string());
        args.push(hi.to_string());
    }

    args.push("-outsize".to_string());
    args.push(request.width().to_string());
    args.push(request.height().to_string());
    args.push(input.to_string());
    args.push(output.to_string());
    args
}

fn path_arg(path: &Path) -> Result<&str, RenderError> {
    path.to_str()
        .ok_or_else(|| RenderError::InvalidRequest(format!("non UTF-8 path: {}", path.display())))
}

fn remove_partial(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("removed partial output {}", path.display()),
            Err(e) => log::warn!("could not remove {}: {}", path.display(), e),
        }
    }
}

impl<R: CommandRunner> ImageGenerator for GdalBackend<R> {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn create_image(
        &self,
        source: &SourceImage,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let input = std::path::absolute(&source.path)?;
        let scale = self.scale_range(source, &input);
        self.translate(source, &input, scale, request)
    }

    fn session<'a>(&'a self, source: &'a SourceImage) -> Box<dyn RenderSession + 'a> {
        Box::new(StatsOnce {
            backend: self,
            source,
            prepared: None,
        })
    }
}

/// Resolves the input path and collects statistics on the first request.
struct StatsOnce<'a, R: CommandRunner> {
    backend: &'a GdalBackend<R>,
    source: &'a SourceImage,
    prepared: Option<(PathBuf, Option<ScaleRange>)>,
}

impl<R: CommandRunner> RenderSession for StatsOnce<'_, R> {
    fn render(&mut self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let (input, scale) = match &self.prepared {
            Some(prepared) => prepared,
            None => {
                let input = std::path::absolute(&self.source.path)?;
                let scale = self.backend.scale_range(self.source, &input);
                &*self.prepared.insert((input, scale))
            }
        };
        self.backend.translate(self.source, input, *scale, request)
    }
}
