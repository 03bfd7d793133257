use anyhow::Result;

use crate::commands::CommandReport;
use crate::proc::driver::configured_months;
use crate::proc::registry::ConfigRegistry;

pub fn platforms() -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("list-platforms");
    let ids = registry.all_platforms()?;
    if ids.is_empty() {
        report.detail(format!(
            "no configuration files under {}",
            registry.config_dir().display()
        ));
    }
    for id in ids {
        report.detail(id);
    }
    Ok(report)
}

pub fn packages(platform: &str) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("list-packages");
    for id in registry.all_packages(platform)? {
        report.detail(id);
    }
    Ok(report)
}

pub fn revisions(platform: &str) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("list-revisions");
    for rev in registry.revisions_for(platform)? {
        let end = match rev.validity_end {
            Some(end) => end.to_string(),
            None => "open".to_string(),
        };
        report.detail(format!("{} [{} .. {end}]", rev.name, rev.validity_start));
    }
    Ok(report)
}

pub fn months(platform: &str) -> Result<CommandReport> {
    let registry = ConfigRegistry::from_env()?;
    let mut report = CommandReport::new("list-months");
    for month in configured_months(&registry, platform)? {
        report.detail(month.to_string());
    }
    Ok(report)
}
