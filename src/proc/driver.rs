use crate::error::ProcError;
use crate::proc::merge::{self, MergeStats};
use crate::proc::registry::ConfigRegistry;
use crate::proc::report::{self, SkipEvent};
use crate::proc::store::ArchiveStore;
use crate::proc::timeutil::{self, MonthToken, from_epoch_seconds, this_month};
use anyhow::Result;
use chrono::Duration;
use std::collections::BTreeSet;
use std::fs;

/// One (platform, package, month) unit of work and how it went.
///
/// A failed triple never fails the run; callers fold these into their
/// report and the process still exits cleanly.
#[derive(Debug)]
pub struct TripleRun {
    pub platform: String,
    pub package: String,
    pub month: MonthToken,
    pub result: Result<MergeStats>,
}

/// Append the current month's new records for every open-ended revision.
pub fn auto(registry: &ConfigRegistry, store: &dyn ArchiveStore) -> Result<Vec<TripleRun>> {
    auto_for_month(registry, store, this_month())
}

/// Processing-window start that resumes one second past the archive's
/// newest record, so repeated passes over the same raw files never append
/// a record twice.
fn resume_start(
    store: &dyn ArchiveStore,
    target: &std::path::Path,
    month: MonthToken,
) -> Result<chrono::NaiveDateTime> {
    let mut proc_start = month.start();
    if target.exists() {
        if let Some(&last) = store.read_time_axis(target)?.last() {
            if let Some(dt) = from_epoch_seconds(last) {
                if month.contains(dt) {
                    proc_start = dt + Duration::seconds(1);
                }
            }
        }
    }
    Ok(proc_start)
}

pub fn auto_for_month(
    registry: &ConfigRegistry,
    store: &dyn ArchiveStore,
    month: MonthToken,
) -> Result<Vec<TripleRun>> {
    let mut runs = Vec::new();
    for revision in registry.active_revisions()? {
        for package_id in revision.package_ids.clone() {
            let result = (|| {
                let package = revision.package(&package_id)?;
                let target =
                    merge::archive_path(package, &revision.platform_id, &package_id, month);
                let proc_start = resume_start(store, &target, month)?;
                merge::merge_revision(
                    store,
                    &revision,
                    &package_id,
                    month,
                    proc_start,
                    month.end(),
                )
            })();
            runs.push(TripleRun {
                platform: revision.platform_id.clone(),
                package: package_id,
                month,
                result,
            });
        }
    }
    Ok(runs)
}

/// Rebuild one monthly archive from scratch.
///
/// Every revision overlapping the month contributes in validity order, so a
/// mid-month configuration change produces one archive with both segments.
/// Existing archives are deleted first; a rebuild is authoritative.
pub fn manual(
    registry: &ConfigRegistry,
    store: &dyn ArchiveStore,
    platform: &str,
    package_id: &str,
    month: MonthToken,
) -> Result<MergeStats> {
    let revisions = registry.revisions_overlapping(platform, month)?;

    let configured: Vec<_> = revisions
        .iter()
        .filter(|rev| rev.package_ids.iter().any(|p| p == package_id))
        .collect();
    if configured.is_empty() {
        return Err(ProcError::PackageNotConfigured {
            platform: platform.to_string(),
            package: package_id.to_string(),
            revision: revisions
                .last()
                .map(|rev| rev.name.clone())
                .unwrap_or_default(),
        }
        .into());
    }

    let mut targets = BTreeSet::new();
    for rev in &configured {
        let package = rev.package(package_id)?;
        targets.insert(merge::archive_path(package, platform, package_id, month));
    }
    for target in targets {
        if target.exists() {
            fs::remove_file(&target).map_err(|err| ProcError::ArchiveIo {
                path: target.clone(),
                reason: err.to_string(),
            })?;
        }
    }

    let mut stats = MergeStats::default();
    for revision in &revisions {
        if !revision.package_ids.iter().any(|p| p == package_id) {
            report::emit(SkipEvent {
                code: "PACKAGE_NOT_CONFIGURED",
                platform,
                package: package_id,
                month: &month.to_string(),
                file: "na",
                reason: &format!("not configured under revision {}", revision.name),
            });
            continue;
        }
        // adjacent revisions may overlap by a little and re-scan the same
        // raw files; resuming past what the previous revision archived
        // keeps each record merged exactly once
        let package = revision.package(package_id)?;
        let target = merge::archive_path(package, platform, package_id, month);
        let proc_start = resume_start(store, &target, month)?;
        stats.absorb(merge::merge_revision(
            store,
            revision,
            package_id,
            month,
            proc_start,
            month.end(),
        )?);
    }
    Ok(stats)
}

/// Replay a list of (platform, package, month) triples through `manual`,
/// isolating failures per triple.
pub fn spin(
    registry: &ConfigRegistry,
    store: &dyn ArchiveStore,
    triples: Vec<(String, String, MonthToken)>,
) -> Vec<TripleRun> {
    triples
        .into_iter()
        .map(|(platform, package, month)| {
            let result = manual(registry, store, &platform, &package, month);
            TripleRun {
                platform,
                package,
                month,
                result,
            }
        })
        .collect()
}

/// Months a platform's configuration history covers; drives introspection
/// output and `ALL`-month replays.
pub fn configured_months(
    registry: &ConfigRegistry,
    platform: &str,
) -> Result<Vec<MonthToken>> {
    let now = chrono::Utc::now().naive_utc();
    let mut months = Vec::new();
    for rev in registry.revisions_for(platform)? {
        months.extend(timeutil::months_between(
            rev.validity_start,
            rev.effective_end(now),
        ));
    }
    months.sort();
    months.dedup();
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::merge::archive_path;
    use crate::proc::store::{JsonArchiveStore, read_document};
    use std::path::Path;
    use tempfile::tempdir;

    const ROWS_NOV: &str = "\
17.5120,  4.36012,    3.601, 12 Nov 2024, 16:04:44
17.5233,  4.36125,    3.610, 12 Nov 2024, 16:10:44
17.5310,  4.36200,    3.615, 12 Nov 2024, 16:16:44
";

    fn write_config(root: &Path, end: Option<&str>) {
        let end_line = match end {
            Some(e) => format!("config_end = \"{e}\"\n"),
            None => String::new(),
        };
        let src = format!(
            r#"
[platform]
id = "b1"
lat = 35.7885
lon = -75.1053
config_start = "2024-11-12 16:00:00"
{end_line}packages = ["ctd1"]

[packages.ctd1]
raw_dir = "{}"
raw_file_glob = "*.asc"
proc_dir = "{}"
parser = "sbe37_ctd"
nominal_depth = -2.0
"#,
            root.join("raw").display(),
            root.join("proc").display()
        );
        fs::write(root.join("b1_config_20241112.toml"), src).expect("write config");
    }

    fn setup(root: &Path) -> ConfigRegistry {
        fs::create_dir_all(root.join("raw/2024_11")).expect("mkdir");
        fs::create_dir_all(root.join("proc")).expect("mkdir");
        write_config(root, None);
        ConfigRegistry::new(root)
    }

    fn month() -> MonthToken {
        "2024_11".parse().unwrap()
    }

    fn archive(registry: &ConfigRegistry) -> std::path::PathBuf {
        let rev = registry.revisions_for("b1").unwrap().remove(0);
        archive_path(rev.package("ctd1").unwrap(), "b1", "ctd1", month())
    }

    #[test]
    fn manual_rebuild_is_idempotent() {
        let tmp = tempdir().expect("tempdir");
        let registry = setup(tmp.path());
        fs::write(tmp.path().join("raw/2024_11/b1_ctd1_2024_11_12.asc"), ROWS_NOV).unwrap();

        let store = JsonArchiveStore;
        let first = manual(&registry, &store, "b1", "ctd1", month()).expect("first");
        let second = manual(&registry, &store, "b1", "ctd1", month()).expect("second");
        assert_eq!(first.records_merged, 3);
        assert_eq!(second.records_merged, 3);

        let doc = read_document(&archive(&registry)).expect("read");
        assert_eq!(doc.record_count(), 3);
    }

    #[test]
    fn manual_unknown_package_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let registry = setup(tmp.path());
        let err = manual(&registry, &JsonArchiveStore, "b1", "adcp", month()).unwrap_err();
        let proc_err = err.downcast_ref::<ProcError>().expect("ProcError");
        assert_eq!(proc_err.code(), "PACKAGE_NOT_CONFIGURED");
    }

    #[test]
    fn auto_appends_only_new_records() {
        let tmp = tempdir().expect("tempdir");
        let registry = setup(tmp.path());
        fs::write(tmp.path().join("raw/2024_11/b1_ctd1_2024_11_12.asc"), ROWS_NOV).unwrap();

        let store = JsonArchiveStore;
        let runs = auto_for_month(&registry, &store, month()).expect("auto");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].result.as_ref().unwrap().records_merged, 3);

        // later raw dump arrives with one genuinely new record
        fs::write(
            tmp.path().join("raw/2024_11/b1_ctd1_2024_11_13.asc"),
            "17.5310,  4.36200,    3.615, 12 Nov 2024, 16:16:44\n\
             17.6000,  4.37000,    3.620, 13 Nov 2024, 08:00:00\n",
        )
        .unwrap();
        let runs = auto_for_month(&registry, &store, month()).expect("auto again");
        assert_eq!(runs[0].result.as_ref().unwrap().records_merged, 1);

        let doc = read_document(&archive(&registry)).expect("read");
        assert_eq!(doc.record_count(), 4);
        assert!(doc.time.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn overlapping_revisions_merge_each_record_once() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("raw/2024_11")).expect("mkdir");
        fs::create_dir_all(tmp.path().join("proc")).expect("mkdir");
        let package_table = format!(
            r#"
[packages.ctd1]
raw_dir = "{}"
raw_file_glob = "*.asc"
proc_dir = "{}"
parser = "sbe37_ctd"
"#,
            tmp.path().join("raw").display(),
            tmp.path().join("proc").display()
        );
        // validity windows overlap between 12:00 and 18:00 on Nov 20
        let first = format!(
            r#"
[platform]
id = "b1"
config_start = "2024-11-12 16:00:00"
config_end = "2024-11-20 18:00:00"
packages = ["ctd1"]
{package_table}"#
        );
        let second = format!(
            r#"
[platform]
id = "b1"
config_start = "2024-11-20 12:00:00"
packages = ["ctd1"]
{package_table}"#
        );
        fs::write(tmp.path().join("b1_config_20241112.toml"), first).unwrap();
        fs::write(tmp.path().join("b1_config_20241120.toml"), second).unwrap();
        // the overlap-window records sit in a dump both revisions can see
        fs::write(
            tmp.path().join("raw/2024_11/b1_ctd1_2024_11_12.asc"),
            "17.5120,  4.36012,    3.601, 12 Nov 2024, 16:04:44\n\
             17.5233,  4.36125,    3.610, 20 Nov 2024, 13:00:00\n\
             17.5310,  4.36200,    3.615, 20 Nov 2024, 17:00:00\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("raw/2024_11/b1_ctd1_2024_11_20.asc"),
            "17.6000,  4.37000,    3.620, 21 Nov 2024, 08:00:00\n",
        )
        .unwrap();

        let registry = ConfigRegistry::new(tmp.path());
        let stats =
            manual(&registry, &JsonArchiveStore, "b1", "ctd1", month()).expect("manual");
        assert_eq!(stats.records_merged, 4);

        let doc = read_document(&archive(&registry)).expect("read");
        // the two records inside the overlap appear once each
        assert_eq!(doc.record_count(), 4);
        assert!(doc.time.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn spin_isolates_failing_triples() {
        let tmp = tempdir().expect("tempdir");
        let registry = setup(tmp.path());
        fs::write(tmp.path().join("raw/2024_11/b1_ctd1_2024_11_12.asc"), ROWS_NOV).unwrap();

        let runs = spin(
            &registry,
            &JsonArchiveStore,
            vec![
                ("b1".into(), "adcp".into(), month()),
                ("b1".into(), "ctd1".into(), month()),
            ],
        );
        assert_eq!(runs.len(), 2);
        assert!(runs[0].result.is_err());
        assert_eq!(runs[1].result.as_ref().unwrap().records_merged, 3);
    }

    #[test]
    fn configured_months_spans_validity() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("raw")).unwrap();
        fs::create_dir_all(tmp.path().join("proc")).unwrap();
        write_config(tmp.path(), Some("2025-01-15 00:00:00"));
        let registry = ConfigRegistry::new(tmp.path());

        let months = configured_months(&registry, "b1").expect("months");
        let names: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, ["2024_11", "2024_12", "2025_01"]);
    }
}
