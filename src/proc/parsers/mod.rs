mod cr1000;
mod sbe37_ctd;
pub mod seawater;

use crate::proc::batch::RecordBatch;
use crate::proc::registry::{PlatformConfigRevision, SensorPackageConfig};
use anyhow::Result;
use chrono::Duration;
use std::path::Path;

/// One sensor type's raw-format reader.
///
/// Individually malformed lines are skipped inside the parser; only
/// file-level format violations surface as errors. The raw file's own path
/// is passed in because some formats keep the profile start time only in
/// the filename.
pub trait RecordParser: Sync {
    fn id(&self) -> &'static str;

    fn parse(
        &self,
        revision: &PlatformConfigRevision,
        package: &SensorPackageConfig,
        raw_path: &Path,
        lines: &[String],
    ) -> Result<RecordBatch>;
}

pub fn parser_for(id: &str) -> Option<&'static dyn RecordParser> {
    match id {
        "sbe37_ctd" => Some(&sbe37_ctd::Sbe37Ctd),
        "cr1000" => Some(&cr1000::Cr1000),
        _ => None,
    }
}

/// Parse one numeric token, treating any `NAN` spelling (quoted or not) as
/// a missing value.
pub(crate) fn parse_float(token: &str) -> Option<f64> {
    let cleaned = token.trim().trim_matches('"').trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cleaned.parse::<f64>().ok()
}

/// Sampling clocks may run on local time; shift by the configured offset
/// to get UTC.
pub(crate) fn utc_offset(package: &SensorPackageConfig) -> Duration {
    Duration::seconds((package.utc_offset_hours * 3600.0) as i64)
}

/// Deployment constants shared by every parser's output.
pub(crate) fn base_scalars(
    revision: &PlatformConfigRevision,
    package: &SensorPackageConfig,
    batch: &mut RecordBatch,
) {
    if let Some(lat) = revision.lat {
        batch.scalars.insert("lat".into(), lat);
    }
    if let Some(lon) = revision.lon {
        batch.scalars.insert("lon".into(), lon);
    }
    if let Some(z) = package
        .metadata
        .get("nominal_depth")
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
    {
        batch.scalars.insert("z".into(), z);
    }
}
