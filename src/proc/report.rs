//! Structured one-line stderr events for skipped files and triples.
//!
//! A nightly run is grepped, not watched, so every skip names its subject
//! and reason in `field=value` form.

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct SkipEvent<'a> {
    pub code: &'a str,
    pub platform: &'a str,
    pub package: &'a str,
    pub month: &'a str,
    pub file: &'a str,
    pub reason: &'a str,
}

pub fn emit(event: SkipEvent<'_>) {
    eprintln!(
        "OBSPROC_WARN code={} platform={} package={} month={} file={} reason={}",
        sanitize_value(event.code),
        sanitize_value(event.platform),
        sanitize_value(event.package),
        sanitize_value(event.month),
        sanitize_value(event.file),
        sanitize_value(event.reason),
    );
}
