use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::types::RawValue;

/// Day-first formats are tried before anything month-first
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Excel serial day numbers count from 1899-12-30
fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    text.parse::<f64>().ok().and_then(from_excel_serial)
}

/// Resolve a raw cell into a date; never fails, only returns `None`
pub fn parse_date(raw: &RawValue) -> Option<NaiveDate> {
    match raw {
        RawValue::Empty => None,
        RawValue::Text(text) => parse_date_text(text),
        RawValue::Number {
            original: Some(text),
            value,
        } => parse_date_text(text).or_else(|| from_excel_serial(*value)),
        RawValue::Number { value, .. } => from_excel_serial(*value),
    }
}
