use super::{RecordParser, base_scalars, parse_float, seawater, utc_offset};
use crate::proc::batch::RecordBatch;
use crate::proc::registry::{PlatformConfigRevision, SensorPackageConfig};
use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use std::path::Path;

/// Campbell Scientific CR1000 datalogger table (TOA5).
///
/// Four header lines (environment, field names, units, aggregation), then
/// comma-separated rows beginning with a quoted `"YYYY-MM-DD HH:MM:SS"`
/// timestamp and a record number. For the CTD table the data columns are
/// instrument serial, temperature, conductivity, and pressure.
pub struct Cr1000;

const HEADER_LINES: usize = 4;

struct Row {
    dt: NaiveDateTime,
    wtemp: f64,
    cond: f64,
    press: f64,
}

fn parse_row(line: &str) -> Option<Row> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 6 {
        return None;
    }
    let dstr = parts[0].trim().trim_matches('"');
    let dt = NaiveDateTime::parse_from_str(dstr, "%Y-%m-%d %H:%M:%S").ok()?;
    // parts[1] record number, parts[2] instrument serial
    let wtemp = parse_float(parts[3])?;
    let cond = parse_float(parts[4])?;
    let press = parse_float(parts[5])?;
    Some(Row {
        dt,
        wtemp,
        cond,
        press,
    })
}

fn qc(value: f64, lo: f64, hi: f64) -> f64 {
    if value > lo && value < hi { value } else { f64::NAN }
}

impl RecordParser for Cr1000 {
    fn id(&self) -> &'static str {
        "cr1000"
    }

    fn parse(
        &self,
        revision: &PlatformConfigRevision,
        package: &SensorPackageConfig,
        raw_path: &Path,
        lines: &[String],
    ) -> Result<RecordBatch> {
        if lines.len() < HEADER_LINES {
            bail!(
                "{}: truncated TOA5 header ({} of {HEADER_LINES} lines)",
                raw_path.display(),
                lines.len()
            );
        }
        if !lines[0].trim_start().starts_with("\"TOA5\"") {
            bail!("{}: not a TOA5 table", raw_path.display());
        }

        let offset = utc_offset(package);
        let lat = revision.lat.unwrap_or(0.0);

        let mut batch = RecordBatch::default();
        let mut wtemp = Vec::new();
        let mut cond = Vec::new();
        let mut press = Vec::new();
        let mut depth = Vec::new();
        let mut salin = Vec::new();
        let mut density = Vec::new();

        for line in &lines[HEADER_LINES..] {
            let Some(row) = parse_row(line) else {
                continue;
            };
            let t = qc(row.wtemp, 5.0, 30.0);
            let c = qc(row.cond, 2.0, 7.0);

            batch.timestamps.push(row.dt + offset);
            wtemp.push(t);
            cond.push(c);
            press.push(row.press);
            depth.push(-seawater::depth(row.press, lat));
            let s = seawater::salt(10.0 * c / seawater::C35150_MS_CM, t, row.press);
            salin.push(s);
            density.push(seawater::dens(s, t, row.press));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::registry::ConfigRegistry;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
\"TOA5\",\"CR1000_B1\",\"CR1000\",\"37541\",\"CR1000.Std.21\",\"CPU:NCWIND_12_Buoy_All.CR1\",\"58723\",\"CTD1_6Min\"
\"TIMESTAMP\",\"RECORD\",\"ID\",\"Temp\",\"Cond\",\"Depth\",\"SampleDate\",\"SampleTime\",\"SampleNum\"
\"TS\",\"RN\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"
\"\",\"\",\"Smp\",\"Smp\",\"Smp\",\"Smp\",\"Smp\",\"Smp\",\"Smp\"
\"2011-10-05 21:08:06\",43,4085,24.5027,5.18209,3.347
\"2011-10-05 21:14:06\",44,4085,24.5078,5.18305,3.454
\"2011-10-05 21:56:07\",45,4085,NAN,5.19257,3.423
short,row
\"2011-10-05 22:02:06\",46,4085,24.5105,5.18714,3.526
";

    fn fixture() -> (tempfile::TempDir, PlatformConfigRevision) {
        let tmp = tempdir().expect("tempdir");
        let src = r#"
[platform]
id = "b1"
lat = 35.7885
lon = -75.1053
config_start = "2011-10-01 00:00:00"
packages = ["ctd1"]

[packages.ctd1]
raw_dir = "/level0/b1/ctd1"
raw_file_glob = "*"
proc_dir = "/level1/b1/ctd1"
parser = "cr1000"
nominal_depth = -2.0
"#;
        fs::write(tmp.path().join("b1_config_20111001.toml"), src).expect("write");
        let rev = ConfigRegistry::new(tmp.path())
            .revisions_for("b1")
            .expect("revisions")
            .remove(0);
        (tmp, rev)
    }

    #[test]
    fn parses_toa5_rows() {
        let (_tmp, rev) = fixture();
        let pkg = rev.package("ctd1").unwrap().clone();
        let lines: Vec<String> = SAMPLE.lines().map(String::from).collect();
        let batch = Cr1000
            .parse(&rev, &pkg, Path::new("ctd1_2011_10_05.dat"), &lines)
            .expect("parse");

        assert_eq!(batch.len(), 4);
        assert_eq!(
            batch.timestamps[0],
            NaiveDate::from_ymd_opt(2011, 10, 5)
                .unwrap()
                .and_hms_opt(21, 8, 6)
                .unwrap()
        );
        assert_eq!(batch.fields["wtemp"][0], 24.5027);
        // NAN temperature keeps the record with a missing value
        assert!(batch.fields["wtemp"][2].is_nan());
        assert!(batch.fields["salin"][2].is_nan());
        assert_eq!(batch.scalars.get("z"), Some(&-2.0));
    }

    #[test]
    fn rejects_non_toa5_input() {
        let (_tmp, rev) = fixture();
        let pkg = rev.package("ctd1").unwrap().clone();
        let lines: Vec<String> = ["bogus", "header", "lines", "here", "1,2,3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(
            Cr1000
                .parse(&rev, &pkg, Path::new("x.dat"), &lines)
                .is_err()
        );
    }

    #[test]
    fn rejects_truncated_header() {
        let (_tmp, rev) = fixture();
        let pkg = rev.package("ctd1").unwrap().clone();
        let lines = vec!["\"TOA5\",\"CR1000_B1\"".to_string()];
        assert!(
            Cr1000
                .parse(&rev, &pkg, Path::new("x.dat"), &lines)
                .is_err()
        );
    }
}
