use crate::proc::registry::{PlatformConfigRevision, SensorPackageConfig};
use crate::proc::timeutil::{self, MonthToken, Precision};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

/// A discovered raw instrument file with the timestamp (and its precision)
/// extracted from the filename.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub path: PathBuf,
    pub stamp: NaiveDateTime,
    pub precision: Precision,
}

/// A directory whose last segment is `YYYY_MM` is already month-scoped:
/// the directory itself is the filter.
fn month_scoped_dir(dir: &Path) -> bool {
    let Some(last) = dir.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    let bytes = last.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'_'
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

fn glob_into(pattern: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in glob::glob(pattern).with_context(|| format!("bad raw file glob {pattern}"))? {
        if let Ok(path) = entry {
            out.push(path);
        }
    }
    Ok(())
}

/// Enumerate candidate raw files for the month and keep those whose
/// embedded timestamp falls inside `[proc_start - 1 day, proc_end + 1 day]`.
///
/// Month-precision filenames (a whole batch named by its month) widen the
/// lower bound to `proc_start - 31 days` for their own test only, since the
/// content may span back into the prior month. Files whose name yields no
/// parseable timestamp are dropped.
pub fn select_raw_files(
    package: &SensorPackageConfig,
    month: MonthToken,
    proc_start: NaiveDateTime,
    proc_end: NaiveDateTime,
) -> Result<Vec<RawFile>> {
    let scoped = month_scoped_dir(&package.raw_dir);
    let mut candidates = Vec::new();

    if scoped {
        let pattern = package
            .raw_dir
            .join(&package.raw_file_glob)
            .display()
            .to_string();
        glob_into(&pattern, &mut candidates)?;
    } else {
        let (prev, this, next) = timeutil::month_window(month);
        for start in [prev, this, next] {
            let pattern = package
                .raw_dir
                .join(start.format("%Y_%m").to_string())
                .join(&package.raw_file_glob)
                .display()
                .to_string();
            glob_into(&pattern, &mut candidates)?;
        }
    }
    // naming convention makes lexicographic order chronological
    candidates.sort();

    let window_start = proc_start - Duration::days(1);
    let window_end = proc_end + Duration::days(1);
    let coarse_start = proc_start - Duration::days(31);

    let mut out = Vec::new();
    for path in candidates {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((stamp, precision)) = timeutil::parse_embedded_timestamp(name) else {
            continue;
        };
        let lower = if precision == Precision::Month {
            coarse_start
        } else {
            window_start
        };
        if scoped || (lower <= stamp && stamp <= window_end) {
            out.push(RawFile { path, stamp, precision });
        }
    }
    Ok(out)
}

/// Limit selected files to those attributable to one configuration
/// revision's validity interval.
///
/// A filename stamp marks when the file started, not the span of its
/// content, so it is clamped to the interval edges before the test: a file
/// straddling a config change still belongs to both revisions, and the
/// record-level inclusion mask downstream decides which samples each
/// revision actually takes. Only a revision whose interval is empty (a
/// validity start still in the future) keeps nothing.
pub fn restrict_to_revision(
    files: Vec<RawFile>,
    revision: &PlatformConfigRevision,
) -> Vec<RawFile> {
    let now = Utc::now().naive_utc();
    let start = revision.validity_start;
    let end = revision.effective_end(now);

    files
        .into_iter()
        .filter(|f| {
            let stamp = f.stamp.clamp(start, end.max(start));
            start <= stamp && stamp <= end
        })
        .collect()
}
