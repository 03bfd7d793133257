use anyhow::Result;
use clap::{Parser, Subcommand};
use std::str::FromStr;

use crate::commands::{self, CommandReport};
use crate::proc::timeutil::MonthToken;

#[derive(Debug, Parser)]
#[command(
    name = "obsproc",
    version,
    about = "Monthly archive builder for observing-platform raw data"
)]
struct Cli {
    /// Emit the command report as JSON instead of plain lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Append new records to the current month's archives for every live
    /// configuration (the scheduled mode).
    Auto {
        /// Replay a specific month (YYYY_MM) with auto's resume semantics.
        #[arg(long)]
        month: Option<String>,
    },
    /// Rebuild one platform/package/month archive from its raw files.
    Manual {
        platform: String,
        package: String,
        /// Month token, YYYY_MM.
        month: String,
    },
    /// Rebuild every archive matched by the selectors.
    Spin {
        /// Platform ids, or ALL.
        #[arg(long, num_args = 1.., default_values_t = vec!["all".to_string()])]
        platforms: Vec<String>,
        /// Package ids, or ALL.
        #[arg(long, num_args = 1.., default_values_t = vec!["all".to_string()])]
        packages: Vec<String>,
        /// Month tokens, a YYYY_MM..YYYY_MM range, or ALL.
        #[arg(long, num_args = 1.., default_values_t = vec!["all".to_string()])]
        months: Vec<String>,
    },
    /// List every platform with at least one configuration revision.
    ListPlatforms,
    /// List every package any revision of the platform defines.
    ListPackages { platform: String },
    /// List the platform's configuration revisions and validity intervals.
    ListRevisions { platform: String },
    /// List the months the platform's configuration history covers.
    ListMonths { platform: String },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for line in &report.details {
        println!("{line}");
    }
    for line in &report.issues {
        eprintln!("issue: {line}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.command {
        Command::Auto { month } => {
            let month = month.as_deref().map(MonthToken::from_str).transpose()?;
            commands::auto::run(month)?
        }
        Command::Manual {
            platform,
            package,
            month,
        } => commands::manual::run(platform, package, MonthToken::from_str(month)?)?,
        Command::Spin {
            platforms,
            packages,
            months,
        } => commands::spin::run(platforms, packages, months)?,
        Command::ListPlatforms => commands::list::platforms()?,
        Command::ListPackages { platform } => commands::list::packages(platform)?,
        Command::ListRevisions { platform } => commands::list::revisions(platform)?,
        Command::ListMonths { platform } => commands::list::months(platform)?,
    };

    print_report(&report, cli.json)
}
