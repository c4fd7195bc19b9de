use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const DATE_ONLY_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Single date-coercion helper shared by the predicate evaluator and the
/// comparator so both see identical date semantics. Returns `None` for
/// anything that does not look like a date.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_date_str(raw),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    for format in DATE_ONLY_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&parsed.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// Calendar date of a field value as the user would read it. Date-only
/// strings are taken verbatim; timestamped values are shifted into the
/// local zone first.
pub fn local_calendar_date(value: &Value) -> Option<NaiveDate> {
    if let Value::String(raw) = value {
        let trimmed = raw.trim();
        for format in DATE_ONLY_FORMATS {
            if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
                return Some(parsed);
            }
        }
    }
    parse_date(value).map(|parsed| parsed.with_timezone(&Local).date_naive())
}
