use std::sync::LazyLock;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use regex::Regex;

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(minute|hour|day|week|month)").expect("valid relative date regex")
});

/// Parses listing ages such as `"3 days ago"` or `"1 week ago"` relative to `now`.
///
/// Returns `None` when the text carries no recognisable age.
#[must_use]
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_DATE.captures(text)?;
    let amount: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();

    match unit.as_str() {
        "minute" => now.checked_sub_signed(Duration::minutes(i64::from(amount))),
        "hour" => now.checked_sub_signed(Duration::hours(i64::from(amount))),
        "day" => now.checked_sub_signed(Duration::days(i64::from(amount))),
        "week" => now.checked_sub_signed(Duration::weeks(i64::from(amount))),
        "month" => now.checked_sub_months(Months::new(amount)),
        _ => None,
    }
}

/// Parses an absolute date (RFC 3339 or `YYYY-MM-DD`), falling back to a
/// relative age.
#[must_use]
pub fn parse_posted_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    parse_relative_date(text, now)
}
