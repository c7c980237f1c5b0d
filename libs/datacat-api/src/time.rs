use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive layouts tried by the default parse, in order. Naive values are
/// taken as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Current wall-clock time (UTC).
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a textual instant.
///
/// - `format = Some(f)`: strftime layout. Tried with an offset first, then
///   as a naive date-time, then as a bare date (midnight UTC).
/// - `format = None`: default unambiguous parse: RFC 3339, ISO 8601
///   date-time without offset, `YYYY-MM-DD`.
///
/// Bare numbers are never guessed as epoch values; use `format = "%s"`.
pub fn parse_instant(raw: &str, format: Option<&str>) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match format {
        Some(fmt) => parse_with_format(raw, fmt),
        None => parse_default(raw),
    }
}

fn parse_with_format(raw: &str, fmt: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
        return Ok(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, fmt) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(e) => match NaiveDate::parse_from_str(raw, fmt) {
            Ok(date) => Ok(date.and_time(chrono::NaiveTime::MIN).and_utc()),
            Err(_) => Err(e),
        },
    }
}

fn parse_default(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let rfc_err = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(e) => e,
    };
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(rfc_err)
}

/// Cheap pre-check before attempting a date-time parse on arbitrary text:
/// `DDDD-DD-DD...` or `DDDD/DD/DD...`.
pub fn looks_like_instant(raw: &str) -> bool {
    let b = raw.as_bytes();
    b.len() >= 10
        && b[..4].iter().all(u8::is_ascii_digit)
        && (b[4] == b'-' || b[4] == b'/')
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b[4]
        && b[8..10].iter().all(u8::is_ascii_digit)
}
