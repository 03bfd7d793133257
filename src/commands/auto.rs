use anyhow::Result;

use crate::commands::{CommandReport, fold_runs};
use crate::proc::driver;
use crate::proc::registry::ConfigRegistry;
use crate::proc::store::JsonArchiveStore;
use crate::proc::timeutil::MonthToken;

/// Nightly mode: append new records to the current month's archives for
/// every live platform configuration. `month` is an override for replaying
/// a specific month with auto's resume semantics.
pub fn run(month: Option<MonthToken>) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("auto");
    report.detail(format!("config_dir={}", registry.config_dir().display()));

    let store = JsonArchiveStore;
    let runs = match month {
        Some(month) => driver::auto_for_month(&registry, &store, month)?,
        None => driver::auto(&registry, &store)?,
    };
    if runs.is_empty() {
        report.detail("no open-ended configuration revisions found");
    }
    fold_runs(&mut report, &runs);
    Ok(report)
}
