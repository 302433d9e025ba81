//! Pixel statistics and contrast-stretch range for single-band sources.
//!
//! Statistics come from `gdalinfo -stats`. The report is matched against a
//! fixed pattern; the last band's `Minimum`, `Maximum`, `Mean` and `StdDev`
//! win. Any failure along the way (tool missing, non-zero exit, unexpected
//! output, zero deviation) yields `None` so the caller simply renders
//! without a stretch.

use super::runner::{CommandRunner, CommandSpec};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static STATS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s).*Minimum=(\d+).+Maximum=(\d+).+Mean=(\d+(\.\d+)?).+StdDev=(\d+(\.\d+)?).*",
    )
    .expect("statistics pattern must compile")
});

/// Summary statistics of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Integer input range for `gdal_translate -scale`. Always `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRange {
    pub lo: i64,
    pub hi: i64,
}

/// Parse a `gdalinfo -stats` report.
///
/// Returns `None` if the report does not match or the deviation is zero.
pub fn parse_statistics(report: &str) -> Option<PixelStatistics> {
    let caps = STATS_PATTERN.captures(report)?;
    let field = |i: usize| caps.get(i)?.as_str().parse::<f64>().ok();
    let stats = PixelStatistics {
        min: field(1)?,
        max: field(2)?,
        mean: field(3)?,
        std_dev: field(5)?,
    };
    if stats.std_dev == 0.0 {
        log::debug!("zero standard deviation, no stretch");
        return None;
    }
    Some(stats)
}

impl PixelStatistics {
    /// Clamp the range to a whole number of deviations around the mean.
    ///
    /// The number of deviations is the smaller of the distances from the mean
    /// to either extreme, rounded up, so one side always lands exactly on its
    /// extreme. Returns `None` for inconsistent statistics.
    pub fn scale_range(&self) -> Option<ScaleRange> {
        if self.std_dev <= 0.0 || self.mean < self.min || self.mean > self.max {
            return None;
        }
        let min_dev = (self.mean - self.min) / self.std_dev;
        let max_dev = (self.max - self.mean) / self.std_dev;
        let deviations = min_dev.min(max_dev).ceil();
        let lo = self.min.max(self.mean - deviations * self.std_dev);
        let hi = self.max.min(self.mean + deviations * self.std_dev);
        Some(ScaleRange {
            lo: lo.floor() as i64,
            hi: hi.ceil() as i64,
        })
    }
}

/// Run `<program> -stats <path>` and parse its report.
pub fn collect_statistics(
    runner: &impl CommandRunner,
    program: &str,
    path: &Path,
) -> Option<PixelStatistics> {
    let spec = CommandSpec::new(program)
        .arg("-stats")
        .arg(path.to_string_lossy());
    match runner.run(&spec) {
        Ok(out) if out.success() => {
            let stats = parse_statistics(&out.output);
            if stats.is_none() {
                log::debug!("no usable statistics in output of {}", spec);
            }
            stats
        }
        Ok(out) => {
            log::debug!(
                "{} exited with status {}: {}",
                spec,
                out.status_string(),
                out.output.trim()
            );
            None
        }
        Err(e) => {
            log::debug!("statistics unavailable: {}", e);
            None
        }
    }
}
