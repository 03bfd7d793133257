use anyhow::Result;

use crate::commands::{CommandReport, fold_runs};
use crate::proc::driver;
use crate::proc::registry::{ConfigRegistry, MonthSelector, Selector, expand_spin_list};
use crate::proc::store::JsonArchiveStore;

/// Batch replay: expand the platform/package/month selectors into triples
/// and rebuild each one, continuing past failures.
pub fn run(platforms: &[String], packages: &[String], months: &[String]) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("spin");
    report.detail(format!("config_dir={}", registry.config_dir().display()));

    let triples = expand_spin_list(
        &registry,
        &Selector::parse(platforms),
        &Selector::parse(packages),
        &MonthSelector::parse(months)?,
    )?;
    report.detail(format!("expanded to {} triples", triples.len()));
    if triples.is_empty() {
        report.issue("selectors expanded to nothing");
        return Ok(report);
    }

    let runs = driver::spin(&registry, &JsonArchiveStore, triples);
    fold_runs(&mut report, &runs);
    Ok(report)
}
