use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Precision of a timestamp embedded in a raw filename.
///
/// Selector logic depends on which rule matched, not just the value: a
/// month-precision name may cover content spanning into the prior month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Second,
    Minute,
    Hour,
    Day,
    Month,
}

/// One ranked matching rule: year digit width (2 or 4) plus the number of
/// two-digit fields that follow (month, day, hour, minute, second).
struct StampRule {
    year_width: usize,
    fields: usize,
    precision: Precision,
}

/// Ordered most-precise-first; 4-digit-year forms before 2-digit-year
/// forms, mirroring how ambiguous names should resolve.
const STAMP_RULES: [StampRule; 9] = [
    StampRule { year_width: 4, fields: 5, precision: Precision::Second },
    StampRule { year_width: 4, fields: 4, precision: Precision::Minute },
    StampRule { year_width: 4, fields: 3, precision: Precision::Hour },
    StampRule { year_width: 4, fields: 2, precision: Precision::Day },
    StampRule { year_width: 4, fields: 1, precision: Precision::Month },
    StampRule { year_width: 2, fields: 5, precision: Precision::Second },
    StampRule { year_width: 2, fields: 4, precision: Precision::Minute },
    StampRule { year_width: 2, fields: 3, precision: Precision::Hour },
    StampRule { year_width: 2, fields: 2, precision: Precision::Day },
];

/// Dates further than this from "now" are treated as accidental digit
/// matches and rejected.
const PLAUSIBLE_WINDOW_DAYS: i64 = 3600;

fn digits_at(bytes: &[u8], start: usize, width: usize) -> Option<u32> {
    if start + width > bytes.len() {
        return None;
    }
    let mut value = 0u32;
    for &b in &bytes[start..start + width] {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
    }
    Some(value)
}

/// Try one rule anchored at `start`: the year, then up to five two-digit
/// fields, each pair optionally separated by a single non-digit character.
fn match_rule_at(bytes: &[u8], start: usize, rule: &StampRule) -> Option<Vec<u32>> {
    let mut values = Vec::with_capacity(1 + rule.fields);
    let year = digits_at(bytes, start, rule.year_width)?;
    values.push(year);
    let mut pos = start + rule.year_width;

    for _ in 0..rule.fields {
        // optional single non-digit separator
        if pos < bytes.len() && !bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        let v = digits_at(bytes, pos, 2)?;
        values.push(v);
        pos += 2;
    }
    Some(values)
}

fn build_datetime(values: &[u32], year_width: usize) -> Option<NaiveDateTime> {
    let mut year = values[0] as i32;
    if year_width == 2 {
        // 2-digit years: <50 maps to the 2000s, 50-99 to the 1900s
        year += if year < 50 { 2000 } else { 1900 };
    }
    let month = *values.get(1).unwrap_or(&1);
    let day = *values.get(2).unwrap_or(&1);
    let hour = *values.get(3).unwrap_or(&0);
    let minute = *values.get(4).unwrap_or(&0);
    let second = *values.get(5).unwrap_or(&0);

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

fn plausible(dt: NaiveDateTime, now: NaiveDateTime) -> bool {
    (dt - now).num_days().abs() <= PLAUSIBLE_WINDOW_DAYS
}

fn strip_extension(fragment: &str) -> &str {
    match fragment.rfind('.') {
        Some(idx) if idx > 0 => &fragment[..idx],
        _ => fragment,
    }
}

/// Extract the most precise plausible timestamp embedded in a filename
/// fragment.
///
/// Rules are tried precise-to-coarse; within a rule every start offset is
/// tried left to right. A syntactic match only wins if it builds a real
/// calendar date within ±10 years of now, so stray digit runs fall through
/// to coarser rules instead of poisoning the result.
pub fn parse_embedded_timestamp(fragment: &str) -> Option<(NaiveDateTime, Precision)> {
    parse_embedded_timestamp_at(fragment, Utc::now().naive_utc())
}

fn parse_embedded_timestamp_at(
    fragment: &str,
    now: NaiveDateTime,
) -> Option<(NaiveDateTime, Precision)> {
    let stem = strip_extension(fragment);
    let bytes = stem.as_bytes();

    for rule in &STAMP_RULES {
        for start in 0..bytes.len() {
            let Some(values) = match_rule_at(bytes, start, rule) else {
                continue;
            };
            let Some(dt) = build_datetime(&values, rule.year_width) else {
                continue;
            };
            if plausible(dt, now) {
                return Some((dt, rule.precision));
            }
        }
    }
    None
}

/// Whole seconds since 1970-01-01T00:00:00 UTC, sub-second part truncated.
pub fn to_epoch_seconds(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

pub fn from_epoch_seconds(es: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp(es, 0).map(|dt| dt.naive_utc())
}

/// A `YYYY_MM` month token, the unit of processing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthToken {
    pub year: i32,
    pub month: u32,
}

impl MonthToken {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(anyhow!("invalid month {month}: must be 1-12"));
        }
        Ok(Self { year, month })
    }

    pub fn start(self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_default()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
    }

    pub fn next(self) -> MonthToken {
        if self.month == 12 {
            MonthToken { year: self.year + 1, month: 1 }
        } else {
            MonthToken { year: self.year, month: self.month + 1 }
        }
    }

    pub fn prev(self) -> MonthToken {
        if self.month == 1 {
            MonthToken { year: self.year - 1, month: 12 }
        } else {
            MonthToken { year: self.year, month: self.month - 1 }
        }
    }

    /// Last instant attributed to this month (next month start − 1 s).
    pub fn end(self) -> NaiveDateTime {
        self.next().start() - chrono::Duration::seconds(1)
    }

    pub fn contains(self, dt: NaiveDateTime) -> bool {
        self.start() <= dt && dt < self.next().start()
    }
}

impl fmt::Display for MonthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:02}", self.year, self.month)
    }
}

impl FromStr for MonthToken {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (y, m) = s
            .split_once('_')
            .ok_or_else(|| anyhow!("invalid month token `{s}`: expected YYYY_MM"))?;
        let year: i32 = y
            .parse()
            .map_err(|_| anyhow!("invalid year in month token `{s}`"))?;
        let month: u32 = m
            .parse()
            .map_err(|_| anyhow!("invalid month in month token `{s}`"))?;
        MonthToken::new(year, month)
    }
}

/// First-of-month datetimes bracketing the target month: raw storage is laid
/// out in month subdirectories, so the previous and next month's directories
/// are scanned too.
pub fn month_window(token: MonthToken) -> (NaiveDateTime, NaiveDateTime, NaiveDateTime) {
    (token.prev().start(), token.start(), token.next().start())
}

/// Current month (UTC).
pub fn this_month() -> MonthToken {
    let now = Utc::now().naive_utc();
    MonthToken { year: now.year(), month: now.month() }
}

/// Inclusive list of month tokens covering `[start, end]`.
pub fn months_between(start: NaiveDateTime, end: NaiveDateTime) -> Vec<MonthToken> {
    let mut out = Vec::new();
    if start > end {
        return out;
    }
    let mut cursor = MonthToken { year: start.year(), month: start.month() };
    let last = MonthToken { year: end.year(), month: end.month() };
    while cursor <= last {
        out.push(cursor);
        cursor = cursor.next();
    }
    out
}
