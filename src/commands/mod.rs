pub mod auto;
pub mod list;
pub mod manual;
pub mod spin;

use crate::proc::driver::TripleRun;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Fold per-triple outcomes into a report: successes become detail lines,
/// failures become issues but never abort the run.
pub fn fold_runs(report: &mut CommandReport, runs: &[TripleRun]) {
    for run in runs {
        let subject = format!("{}/{}/{}", run.platform, run.package, run.month);
        match &run.result {
            Ok(stats) => report.detail(format!(
                "{subject}: merged {} records from {} files ({} skipped)",
                stats.records_merged, stats.files_seen, stats.files_skipped
            )),
            Err(err) => report.issue(format!("{subject}: {err:#}")),
        }
    }
}
