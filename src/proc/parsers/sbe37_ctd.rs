use super::{RecordParser, base_scalars, parse_float, seawater, utc_offset};
use crate::proc::batch::RecordBatch;
use crate::proc::registry::{PlatformConfigRevision, SensorPackageConfig};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;

/// Sea-Bird SBE37 MicroCAT ASCII dump.
///
/// `*`-prefixed header lines end with `*END*`, followed by a few metadata
/// lines, then rows of the form
/// `17.4036,  4.35264,    3.521, 12 Nov 2011, 15:28:43`
/// (temperature °C, conductivity S/m, pressure db, sample date, time).
/// Derives depth, salinity, and density per record.
pub struct Sbe37Ctd;

fn parse_row(line: &str) -> Option<(NaiveDateTime, f64, f64, f64)> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 5 {
        return None;
    }
    let wtemp = parse_float(parts[0])?;
    let cond = parse_float(parts[1])?;
    let press = parse_float(parts[2])?;
    let dstr = format!("{} {}", parts[3].trim(), parts[4].trim());
    let dt = NaiveDateTime::parse_from_str(&dstr, "%d %b %Y %H:%M:%S").ok()?;
    Some((dt, wtemp, cond, press))
}

/// Range QC from the deployment experience with this instrument family:
/// out-of-band readings become missing values, the record itself stays.
fn qc(value: f64, lo: f64, hi: f64) -> f64 {
    if value > lo && value < hi { value } else { f64::NAN }
}

impl RecordParser for Sbe37Ctd {
    fn id(&self) -> &'static str {
        "sbe37_ctd"
    }

    fn parse(
        &self,
        revision: &PlatformConfigRevision,
        package: &SensorPackageConfig,
        _raw_path: &Path,
        lines: &[String],
    ) -> Result<RecordBatch> {
        // data begins after *END* when the instrument header is present
        let data_start = lines
            .iter()
            .take(100)
            .position(|l| l.starts_with("*END*"))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        let offset = utc_offset(package);
        let lat = revision.lat.unwrap_or(0.0);

        let mut batch = RecordBatch::default();
        let mut wtemp = Vec::new();
        let mut cond = Vec::new();
        let mut press = Vec::new();
        let mut depth = Vec::new();
        let mut salin = Vec::new();
        let mut density = Vec::new();

        for line in &lines[data_start..] {
            let Some((dt, t, c, p)) = parse_row(line) else {
                // metadata lines after *END* and garbled rows land here
                continue;
            };
            let t = qc(t, -5.0, 30.0);
            let c = qc(c, 0.0, 7.0);

            batch.timestamps.push(dt + offset);
            wtemp.push(t);
            cond.push(c);
            press.push(p);
            depth.push(-seawater::depth(p, lat));
            let s = seawater::salt(10.0 * c / seawater::C35150_MS_CM, t, p);
            salin.push(s);
            density.push(seawater::dens(s, t, p));
        }

        batch.fields.insert("wtemp".into(), wtemp);
        batch.fields.insert("cond".into(), cond);
        batch.fields.insert("press".into(), press);
        batch.fields.insert("depth".into(), depth);
        batch.fields.insert("salin".into(), salin);
        batch.fields.insert("density".into(), density);
        base_scalars(revision, package, &mut batch);
        batch.validate()?;
        Ok(batch)
    }
}
