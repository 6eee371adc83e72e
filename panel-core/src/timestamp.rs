//! Timestamp text as stored in the feedback table and as shown to people.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// `mm/dd/yy HH:MM`, used wherever a last-modified time is displayed.
pub const DISPLAY_FORMAT: &str = "%m/%d/%y %H:%M";

const STORED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Current local time in the stored ISO-8601 form, e.g.
/// `2025-07-01T14:03:09.512331`.
pub fn now_iso() -> String {
    Local::now().naive_local().format(STORED_FORMAT).to_string()
}

/// Parse stored timestamp text. Accepts the stored form, a space instead of
/// `T`, minute precision, a bare date, and RFC 3339 with an offset.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Display form of a stored timestamp. Empty stays empty; text that does not
/// parse is returned unchanged.
pub fn format_timestamp(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    match parse_timestamp(text) {
        Some(parsed) => parsed.format(DISPLAY_FORMAT).to_string(),
        None => text.to_string(),
    }
}

/// `interview_feedback_YYYYMMDD_HHMMSS.xlsx`
pub fn export_file_name(at: NaiveDateTime) -> String {
    format!("interview_feedback_{}.xlsx", at.format("%Y%m%d_%H%M%S"))
}
