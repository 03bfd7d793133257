use crate::error::ProcError;
use crate::proc::timeutil::{self, MonthToken, months_between};
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One sensor package as configured under a platform revision.
///
/// The typed fields are the ones the core interprets; everything else
/// (instrument heights, depths, `plot_*`, `csv_*`, `ndbc_*`, source
/// strings) rides along in `metadata` untouched and is passed through to
/// archive provenance.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorPackageConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub raw_dir: PathBuf,
    pub raw_file_glob: String,
    pub proc_dir: PathBuf,
    pub parser: String,
    #[serde(default)]
    pub utc_offset_hours: f64,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlatformSection {
    id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    config_start: String,
    #[serde(default)]
    config_end: Option<String>,
    packages: Vec<String>,
    #[serde(flatten)]
    metadata: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RevisionFile {
    platform: PlatformSection,
    #[serde(default)]
    packages: BTreeMap<String, SensorPackageConfig>,
}

/// An immutable, time-bounded snapshot of a platform's configuration.
///
/// Revisions are authored out of band as `<platform>_config_<YYYYMMDD>.toml`
/// files; the registry only ever selects among them.
#[derive(Debug, Clone)]
pub struct PlatformConfigRevision {
    /// File stem, e.g. `b1_config_20111112`.
    pub name: String,
    pub platform_id: String,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub validity_start: NaiveDateTime,
    /// `None` means open-ended: the revision currently in effect.
    pub validity_end: Option<NaiveDateTime>,
    pub package_ids: Vec<String>,
    pub packages: BTreeMap<String, SensorPackageConfig>,
    pub metadata: BTreeMap<String, toml::Value>,
}

impl PlatformConfigRevision {
    /// Open-ended revisions are treated as valid up to "now".
    pub fn effective_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.validity_end.unwrap_or(now)
    }

    pub fn is_open(&self) -> bool {
        self.validity_end.is_none()
    }

    /// Interval intersection against `[window_start, window_end]`, both
    /// ends inclusive: a boundary month touching two revisions selects both.
    pub fn overlaps(
        &self,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        now: NaiveDateTime,
    ) -> bool {
        self.validity_start <= window_end && self.effective_end(now) >= window_start
    }

    pub fn package(&self, package_id: &str) -> Result<&SensorPackageConfig, ProcError> {
        if !self.package_ids.iter().any(|p| p == package_id) {
            return Err(ProcError::PackageNotConfigured {
                platform: self.platform_id.clone(),
                package: package_id.to_string(),
                revision: self.name.clone(),
            });
        }
        self.packages
            .get(package_id)
            .ok_or_else(|| ProcError::PackageNotConfigured {
                platform: self.platform_id.clone(),
                package: package_id.to_string(),
                revision: self.name.clone(),
            })
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` (the config convention) and falls back to
/// the filename-style embedded stamp rules for terser values.
fn parse_config_datetime(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    if let Some((dt, _)) = timeutil::parse_embedded_timestamp(trimmed) {
        return Ok(dt);
    }
    Err(anyhow!("unrecognized config datetime `{trimmed}`"))
}

fn revision_from_file(path: &Path) -> Result<PlatformConfigRevision> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: RevisionFile = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse {}: {err}", path.display()))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config")
        .to_string();

    let validity_start = parse_config_datetime(&parsed.platform.config_start)
        .with_context(|| format!("bad config_start in {}", path.display()))?;
    let validity_end = parsed
        .platform
        .config_end
        .as_deref()
        .map(parse_config_datetime)
        .transpose()
        .with_context(|| format!("bad config_end in {}", path.display()))?;

    if let Some(end) = validity_end {
        if validity_start > end {
            return Err(anyhow!(
                "{}: config_start {} is after config_end {}",
                path.display(),
                validity_start,
                end
            ));
        }
    }
    for pid in &parsed.platform.packages {
        if !parsed.packages.contains_key(pid) {
            return Err(anyhow!(
                "{}: package `{pid}` is listed but has no [packages.{pid}] table",
                path.display()
            ));
        }
    }

    Ok(PlatformConfigRevision {
        name,
        platform_id: parsed.platform.id,
        location: parsed.platform.location,
        lat: parsed.platform.lat,
        lon: parsed.platform.lon,
        validity_start,
        validity_end,
        package_ids: parsed.platform.packages,
        packages: parsed.packages,
        metadata: parsed.platform.metadata,
    })
}

/// Discovers and resolves configuration revisions under one root directory.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    config_dir: PathBuf,
}

impl ConfigRegistry {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self { config_dir: config_dir.into() }
    }

    /// Root comes from `OBSPROC_CONFIG_DIR`, defaulting to
    /// `~/.obsproc/configs`. An unreadable root is a setup-level failure.
    pub fn from_env() -> Result<Self> {
        let dir = match env::var("OBSPROC_CONFIG_DIR") {
            Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
            _ => dirs::home_dir()
                .ok_or_else(|| ProcError::Setup("HOME directory could not be resolved".into()))?
                .join(".obsproc/configs"),
        };
        if !dir.is_dir() {
            return Err(ProcError::Setup(format!(
                "config directory {} is missing or unreadable",
                dir.display()
            ))
            .into());
        }
        Ok(Self::new(dir))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn revision_paths(&self, platform: &str) -> Result<Vec<PathBuf>> {
        let pattern = self
            .config_dir
            .join(format!("{platform}_config_*.toml"))
            .display()
            .to_string();
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("bad config glob {pattern}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        // filename dates make lexicographic order chronological
        paths.sort();
        Ok(paths)
    }

    /// All revisions for one platform, oldest first.
    pub fn revisions_for(&self, platform: &str) -> Result<Vec<PlatformConfigRevision>> {
        self.revision_paths(platform)?
            .iter()
            .map(|p| revision_from_file(p))
            .collect()
    }

    /// Revisions whose validity interval intersects the month, oldest first.
    pub fn revisions_overlapping(
        &self,
        platform: &str,
        month: MonthToken,
    ) -> Result<Vec<PlatformConfigRevision>> {
        let now = Utc::now().naive_utc();
        let month_start = month.start();
        let month_end = month.end();
        let hits: Vec<_> = self
            .revisions_for(platform)?
            .into_iter()
            .filter(|rev| rev.overlaps(month_start, month_end, now))
            .collect();
        if hits.is_empty() {
            return Err(ProcError::ConfigNotFound {
                platform: platform.to_string(),
                month: month.to_string(),
            }
            .into());
        }
        Ok(hits)
    }

    /// Every open-ended revision across all platforms: the "currently live"
    /// set that automatic mode operates on.
    pub fn active_revisions(&self) -> Result<Vec<PlatformConfigRevision>> {
        let mut out = Vec::new();
        for platform in self.all_platforms()? {
            for rev in self.revisions_for(&platform)? {
                if rev.is_open() {
                    out.push(rev);
                }
            }
        }
        Ok(out)
    }

    pub fn all_platforms(&self) -> Result<Vec<String>> {
        let pattern = self.config_dir.join("*_config_*.toml").display().to_string();
        let mut seen = BTreeSet::new();
        for entry in glob::glob(&pattern).with_context(|| format!("bad config glob {pattern}"))? {
            let Ok(path) = entry else { continue };
            let rev = revision_from_file(&path)?;
            seen.insert(rev.platform_id);
        }
        Ok(seen.into_iter().collect())
    }

    /// Every package id defined by any revision of the platform.
    pub fn all_packages(&self, platform: &str) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        for rev in self.revisions_for(platform)? {
            seen.extend(rev.package_ids);
        }
        Ok(seen.into_iter().collect())
    }
}

/// Platform/package/month selector for batch replay, where each leg may be
/// an explicit list or `ALL`.
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    Named(Vec<String>),
}

impl Selector {
    pub fn parse(values: &[String]) -> Selector {
        if values.len() == 1 && values[0].eq_ignore_ascii_case("all") {
            Selector::All
        } else {
            Selector::Named(values.to_vec())
        }
    }
}

/// Month leg of a spin selector: `ALL`, an explicit token list, or an
/// inclusive `YYYY_MM..YYYY_MM` range.
#[derive(Debug, Clone)]
pub enum MonthSelector {
    All,
    Named(Vec<MonthToken>),
    Range(MonthToken, MonthToken),
}

impl MonthSelector {
    pub fn parse(values: &[String]) -> Result<MonthSelector> {
        if values.len() == 1 && values[0].eq_ignore_ascii_case("all") {
            return Ok(MonthSelector::All);
        }
        if values.len() == 1 {
            if let Some((a, b)) = values[0].split_once("..") {
                return Ok(MonthSelector::Range(
                    MonthToken::from_str(a)?,
                    MonthToken::from_str(b)?,
                ));
            }
        }
        let mut months = Vec::with_capacity(values.len());
        for v in values {
            months.push(MonthToken::from_str(v)?);
        }
        Ok(MonthSelector::Named(months))
    }
}

/// Expand a spin request into ordered (platform, package, month) triples.
///
/// `ALL` months means every month any revision defining the package was
/// valid for; a range is additionally clipped to those config intervals.
pub fn expand_spin_list(
    registry: &ConfigRegistry,
    platforms: &Selector,
    packages: &Selector,
    months: &MonthSelector,
) -> Result<Vec<(String, String, MonthToken)>> {
    let now = Utc::now().naive_utc();
    let platform_ids = match platforms {
        Selector::All => registry.all_platforms()?,
        Selector::Named(list) => list.clone(),
    };

    let mut triples = Vec::new();
    for platform in &platform_ids {
        let package_ids = match packages {
            Selector::All => registry.all_packages(platform)?,
            Selector::Named(list) => list.clone(),
        };
        for package in &package_ids {
            let month_list: Vec<MonthToken> = match months {
                MonthSelector::Named(list) => list.clone(),
                MonthSelector::All => {
                    let mut out = Vec::new();
                    for rev in registry.revisions_for(platform)? {
                        if rev.package_ids.iter().any(|p| p == package) {
                            out.extend(months_between(rev.validity_start, rev.effective_end(now)));
                        }
                    }
                    out.sort();
                    out.dedup();
                    out
                }
                MonthSelector::Range(a, b) => {
                    let range_start = a.start();
                    let range_end = b.end();
                    let mut out = Vec::new();
                    for rev in registry.revisions_for(platform)? {
                        let start = rev.validity_start.max(range_start);
                        let end = rev.effective_end(now).min(range_end);
                        if rev.package_ids.iter().any(|p| p == package) {
                            out.extend(months_between(start, end));
                        }
                    }
                    out.sort();
                    out.dedup();
                    out
                }
            };
            for month in month_list {
                triples.push((platform.clone(), package.clone(), month));
            }
        }
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const B1_2011: &str = r#"
[platform]
id = "b1"
location = "Hatteras Bay, 20 nm East of Oregon Inlet, NC"
lat = 35.7885
lon = -75.1053
config_start = "2011-11-12 16:00:00"
config_end = "2012-04-08 19:00:00"
packages = ["ctd1"]
institution = "nccoos"
project = "North Carolina Coastal Ocean Observing System"

[packages.ctd1]
description = "Near-surface CTD"
raw_dir = "/level0/b1/ctd1/store"
raw_file_glob = "*"
proc_dir = "/level1/b1/ctd1"
parser = "sbe37_ctd"
utc_offset_hours = 0.0
nominal_depth = -2.0
"#;

    const B1_2012: &str = r#"
[platform]
id = "b1"
config_start = "2012-04-08 19:00:00"
packages = ["ctd1", "met"]

[packages.ctd1]
raw_dir = "/level0/b1/ctd1/store"
raw_file_glob = "*"
proc_dir = "/level1/b1/ctd1"
parser = "sbe37_ctd"

[packages.met]
raw_dir = "/level0/b1/met"
raw_file_glob = "*.dat"
proc_dir = "/level1/b1/met"
parser = "cr1000"
"#;

    fn registry_with_b1() -> (tempfile::TempDir, ConfigRegistry) {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("b1_config_20111112.toml"), B1_2011).expect("write");
        fs::write(tmp.path().join("b1_config_20120408.toml"), B1_2012).expect("write");
        let registry = ConfigRegistry::new(tmp.path());
        (tmp, registry)
    }

    #[test]
    fn revisions_load_sorted_and_typed() {
        let (_tmp, registry) = registry_with_b1();
        let revs = registry.revisions_for("b1").expect("revisions");
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].name, "b1_config_20111112");
        assert!(revs[0].validity_end.is_some());
        assert!(revs[1].is_open());
        assert_eq!(
            revs[0].metadata.get("institution").and_then(|v| v.as_str()),
            Some("nccoos")
        );
    }

    #[test]
    fn overlap_selects_both_revisions_for_swap_month() {
        let (_tmp, registry) = registry_with_b1();
        let month: MonthToken = "2012_04".parse().unwrap();
        let revs = registry.revisions_overlapping("b1", month).expect("overlap");
        assert_eq!(revs.len(), 2);

        let nov: MonthToken = "2011_11".parse().unwrap();
        let revs = registry.revisions_overlapping("b1", nov).expect("overlap");
        assert_eq!(revs.len(), 1);
    }

    #[test]
    fn missing_month_is_config_not_found() {
        let (_tmp, registry) = registry_with_b1();
        let month: MonthToken = "2005_01".parse().unwrap();
        let err = registry.revisions_overlapping("b1", month).unwrap_err();
        let proc_err = err.downcast_ref::<ProcError>().expect("ProcError");
        assert_eq!(proc_err.code(), "CONFIG_NOT_FOUND");
    }

    #[test]
    fn absent_package_is_reported_per_revision() {
        let (_tmp, registry) = registry_with_b1();
        let revs = registry.revisions_for("b1").unwrap();
        let err = revs[0].package("met").unwrap_err();
        assert_eq!(err.code(), "PACKAGE_NOT_CONFIGURED");
        assert!(revs[1].package("met").is_ok());
    }

    #[test]
    fn listed_package_without_table_fails_validation() {
        let tmp = tempdir().expect("tempdir");
        let bad = r#"
[platform]
id = "b9"
config_start = "2011-01-01 00:00:00"
packages = ["ctd1"]
"#;
        fs::write(tmp.path().join("b9_config_20110101.toml"), bad).expect("write");
        let registry = ConfigRegistry::new(tmp.path());
        assert!(registry.revisions_for("b9").is_err());
    }

    #[test]
    fn spin_expansion_covers_config_months() {
        let (_tmp, registry) = registry_with_b1();
        let triples = expand_spin_list(
            &registry,
            &Selector::Named(vec!["b1".into()]),
            &Selector::Named(vec!["ctd1".into()]),
            &MonthSelector::Range("2011_11".parse().unwrap(), "2012_01".parse().unwrap()),
        )
        .expect("expand");
        let months: Vec<String> = triples.iter().map(|(_, _, m)| m.to_string()).collect();
        assert_eq!(months, ["2011_11", "2011_12", "2012_01"]);
    }

    #[test]
    fn spin_all_packages_expands_per_platform() {
        let (_tmp, registry) = registry_with_b1();
        let triples = expand_spin_list(
            &registry,
            &Selector::All,
            &Selector::All,
            &MonthSelector::Named(vec!["2012_05".parse().unwrap()]),
        )
        .expect("expand");
        let packages: BTreeSet<String> =
            triples.iter().map(|(_, p, _)| p.clone()).collect();
        assert_eq!(packages.len(), 2);
        assert!(packages.contains("met"));
    }
}
