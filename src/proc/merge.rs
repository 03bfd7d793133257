use crate::error::ProcError;
use crate::proc::batch::{RecordBatch, included_indices};
use crate::proc::parsers;
use crate::proc::registry::{PlatformConfigRevision, SensorPackageConfig};
use crate::proc::report::{self, SkipEvent};
use crate::proc::select::{RawFile, restrict_to_revision, select_raw_files};
use crate::proc::store::{ArchiveDocument, ArchiveStore};
use crate::proc::timeutil::MonthToken;
use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const DATE_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// What one revision contributed to one monthly archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    pub files_seen: usize,
    pub files_skipped: usize,
    pub records_merged: usize,
}

impl MergeStats {
    pub fn absorb(&mut self, other: MergeStats) {
        self.files_seen += other.files_seen;
        self.files_skipped += other.files_skipped;
        self.records_merged += other.records_merged;
    }
}

/// `<proc_dir>/<platform>_<package>_<YYYY_MM>.json`
pub fn archive_path(
    package: &SensorPackageConfig,
    platform: &str,
    package_id: &str,
    month: MonthToken,
) -> PathBuf {
    package
        .proc_dir
        .join(format!("{platform}_{package_id}_{month}.json"))
}

fn read_raw_lines(path: &Path) -> Result<Vec<String>, ProcError> {
    let raw = fs::read_to_string(path).map_err(|err| ProcError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let lines: Vec<String> = raw.lines().map(String::from).collect();
    if lines.is_empty() {
        return Err(ProcError::RawFileEmpty(path.to_path_buf()));
    }
    Ok(lines)
}

fn metadata_string(value: &toml::Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn initial_header(
    revision: &PlatformConfigRevision,
    package: &SensorPackageConfig,
    package_id: &str,
    batch: &RecordBatch,
    now: NaiveDateTime,
) -> BTreeMap<String, String> {
    let mut header = BTreeMap::new();
    for (key, value) in &revision.metadata {
        header.insert(key.clone(), metadata_string(value));
    }

    let description = package.description.as_deref().unwrap_or(package_id);
    let title = match &revision.location {
        Some(location) => format!("{description} at {location}"),
        None => description.to_string(),
    };
    header.insert("title".into(), title);
    header.insert("platform".into(), revision.platform_id.clone());
    header.insert("package".into(), package_id.to_string());
    header.insert("parser".into(), package.parser.clone());
    if let Some(first) = batch.timestamps.first() {
        header.insert("start_date".into(), first.format(DATE_FMT).to_string());
    }
    if let Some(last) = batch.timestamps.last() {
        header.insert("end_date".into(), last.format(DATE_FMT).to_string());
    }
    header.insert("created_at".into(), now.format(DATE_FMT).to_string());
    header.insert("modified_at".into(), now.format(DATE_FMT).to_string());
    header
}

fn update_header(batch: &RecordBatch, now: NaiveDateTime) -> BTreeMap<String, String> {
    let mut patch = BTreeMap::new();
    if let Some(last) = batch.timestamps.last() {
        patch.insert("end_date".into(), last.format(DATE_FMT).to_string());
    }
    patch.insert("modified_at".into(), now.format(DATE_FMT).to_string());
    patch
}

fn skip(revision: &PlatformConfigRevision, package_id: &str, month: MonthToken, err: &ProcError) {
    let file = match err {
        ProcError::RawFileEmpty(path) | ProcError::Parse { path, .. } => {
            path.display().to_string()
        }
        _ => "na".to_string(),
    };
    report::emit(SkipEvent {
        code: err.code(),
        platform: &revision.platform_id,
        package: package_id,
        month: &month.to_string(),
        file: &file,
        reason: &err.to_string(),
    });
}

/// Merge one revision's share of one month into the monthly archive.
///
/// The processing window `[proc_start, proc_end]` is decided by the caller:
/// automatic runs raise `proc_start` past already-archived records, manual
/// rebuilds pass the whole month. Unreadable, empty, or unparseable raw
/// files are reported and skipped; only archive I/O aborts the merge, so
/// one bad instrument dump cannot block the rest of the month.
pub fn merge_revision(
    store: &dyn ArchiveStore,
    revision: &PlatformConfigRevision,
    package_id: &str,
    month: MonthToken,
    proc_start: NaiveDateTime,
    proc_end: NaiveDateTime,
) -> Result<MergeStats> {
    let package = revision.package(package_id)?;
    let parser = parsers::parser_for(&package.parser).ok_or_else(|| {
        anyhow!(
            "revision {} names unknown parser `{}` for package `{package_id}`",
            revision.name,
            package.parser
        )
    })?;

    let mut files = restrict_to_revision(
        select_raw_files(package, month, proc_start, proc_end)?,
        revision,
    );
    files.sort_by(|a, b| (a.stamp, &a.path).cmp(&(b.stamp, &b.path)));

    let now = Utc::now().naive_utc();
    let validity_start = revision.validity_start;
    let validity_end = revision.effective_end(now);
    let target = archive_path(package, &revision.platform_id, package_id, month);

    let mut stats = MergeStats {
        files_seen: files.len(),
        ..Default::default()
    };

    for RawFile { path, .. } in &files {
        let lines = match read_raw_lines(path) {
            Ok(lines) => lines,
            Err(err) => {
                skip(revision, package_id, month, &err);
                stats.files_skipped += 1;
                continue;
            }
        };

        let batch = match parser.parse(revision, package, path, &lines) {
            Ok(batch) => batch,
            Err(err) => {
                let err = ProcError::Parse {
                    path: path.clone(),
                    reason: err.to_string(),
                };
                skip(revision, package_id, month, &err);
                stats.files_skipped += 1;
                continue;
            }
        };

        // a file of nothing but malformed rows parses to an empty batch
        if batch.is_empty() {
            continue;
        }

        let indices = included_indices(&batch, validity_start, validity_end, proc_start, proc_end);
        if indices.is_empty() {
            continue;
        }
        let subset = batch.subset(&indices);
        let time = subset.epoch_seconds();

        if target.exists() {
            store.append(&target, &update_header(&subset, now), &time, &subset.fields)?;
        } else {
            let doc = ArchiveDocument {
                header: initial_header(revision, package, package_id, &subset, now),
                scalars: subset.scalars.clone(),
                time,
                columns: subset.fields.clone(),
            };
            store.create(&target, &doc)?;
        }
        stats.records_merged += subset.len();
    }

    Ok(stats)
}
