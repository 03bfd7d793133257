use anyhow::Result;

use crate::commands::CommandReport;
use crate::proc::driver;
use crate::proc::registry::ConfigRegistry;
use crate::proc::store::JsonArchiveStore;
use crate::proc::timeutil::MonthToken;

/// Rebuild one (platform, package, month) archive from its raw files.
pub fn run(platform: &str, package: &str, month: MonthToken) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("manual");
    report.detail(format!("config_dir={}", registry.config_dir().display()));

    match driver::manual(&registry, &JsonArchiveStore, platform, package, month) {
        Ok(stats) => report.detail(format!(
            "{platform}/{package}/{month}: merged {} records from {} files ({} skipped)",
            stats.records_merged, stats.files_seen, stats.files_skipped
        )),
        Err(err) => report.issue(format!("{platform}/{package}/{month}: {err:#}")),
    }
    Ok(report)
}
