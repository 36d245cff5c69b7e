//! Date parsing, interval arithmetic and PHP-style `date()` formatting.
//!
//! Template authors write formats such as `jS F Y` (`1st March 2024`), so
//! formats use the PHP letter set rather than `strftime` directives.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// Parse a date or date-time in one of the accepted layouts.
///
/// Returns `None` for anything else; callers pass such values through
/// unchanged.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(dt);
        }
    }

    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Reformat `raw` with `format`, or return it untouched when it is not a
/// recognisable date.
pub fn reformat(raw: &str, format: &str) -> String {
    match parse_date(raw) {
        Some(dt) => format_php(&dt, format),
        None => raw.to_owned(),
    }
}

/// Add an interval such as `30 days`, `+1 year` or `-2 months`.
pub fn add_interval(dt: NaiveDateTime, interval: &str) -> Option<NaiveDateTime> {
    let mut parts = interval.split_whitespace();
    let amount: i64 = parts.next()?.trim_start_matches('+').parse().ok()?;
    let unit = parts.next().unwrap_or("day").to_ascii_lowercase();

    match unit.trim_end_matches('s') {
        "day" => dt.checked_add_signed(TimeDelta::try_days(amount)?),
        "week" => dt.checked_add_signed(TimeDelta::try_weeks(amount)?),
        "month" => shift_months(dt, amount),
        "year" => shift_months(dt, amount.checked_mul(12)?),
        _ => None,
    }
}

fn shift_months(dt: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(magnitude)
    } else {
        dt.checked_sub_months(magnitude)
    }
}

/// Render `dt` using PHP `date()` format letters. Unknown letters are
/// literal; a backslash escapes the next character.
pub fn format_php(dt: &NaiveDateTime, format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            'd' => out.push_str(&format!("{:02}", dt.day())),
            'D' => out.push_str(&dt.format("%a").to_string()),
            'j' => out.push_str(&dt.day().to_string()),
            'l' => out.push_str(&dt.format("%A").to_string()),
            'N' => out.push_str(&dt.weekday().number_from_monday().to_string()),
            'S' => out.push_str(ordinal_suffix(dt.day())),
            'w' => out.push_str(&dt.weekday().num_days_from_sunday().to_string()),
            'z' => out.push_str(&dt.ordinal0().to_string()),
            'W' => out.push_str(&format!("{:02}", dt.iso_week().week())),
            'F' => out.push_str(&dt.format("%B").to_string()),
            'm' => out.push_str(&format!("{:02}", dt.month())),
            'M' => out.push_str(&dt.format("%b").to_string()),
            'n' => out.push_str(&dt.month().to_string()),
            't' => out.push_str(&days_in_month(dt.year(), dt.month()).to_string()),
            'L' => out.push(if is_leap_year(dt.year()) { '1' } else { '0' }),
            'Y' => out.push_str(&dt.year().to_string()),
            'y' => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
            'a' => out.push_str(if dt.hour12().0 { "pm" } else { "am" }),
            'A' => out.push_str(if dt.hour12().0 { "PM" } else { "AM" }),
            'g' => out.push_str(&dt.hour12().1.to_string()),
            'G' => out.push_str(&dt.hour().to_string()),
            'h' => out.push_str(&format!("{:02}", dt.hour12().1)),
            'H' => out.push_str(&format!("{:02}", dt.hour())),
            'i' => out.push_str(&format!("{:02}", dt.minute())),
            's' => out.push_str(&format!("{:02}", dt.second())),
            'U' => out.push_str(&dt.and_utc().timestamp().to_string()),
            other => out.push(other),
        }
    }

    out
}

fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        parse_date(raw).expect("test date parses")
    }

    #[test]
    fn default_format_uses_ordinal_suffixes() {
        assert_eq!(format_php(&at("2024-03-01"), "jS F Y"), "1st March 2024");
        assert_eq!(format_php(&at("2024-03-22"), "jS F Y"), "22nd March 2024");
        assert_eq!(format_php(&at("2024-03-13"), "jS F Y"), "13th March 2024");
        assert_eq!(format_php(&at("2024-03-23"), "jS F Y"), "23rd March 2024");
    }

    #[test]
    fn numeric_and_time_letters() {
        let dt = at("2023-07-04 15:05:09");
        assert_eq!(format_php(&dt, "Y-m-d H:i:s"), "2023-07-04 15:05:09");
        assert_eq!(format_php(&dt, "d/m/y g:i A"), "04/07/23 3:05 PM");
        assert_eq!(format_php(&dt, "D, M j"), "Tue, Jul 4");
        assert_eq!(format_php(&dt, "t L"), "31 0");
    }

    #[test]
    fn backslash_escapes_letters() {
        assert_eq!(format_php(&at("2024-01-05"), "\\Y\\e\\a\\r: Y"), "Year: 2024");
    }

    #[test]
    fn accepts_several_layouts() {
        assert!(parse_date("2024-02-29T10:00:00Z").is_some());
        assert!(parse_date("29/02/2024").is_some());
        assert!(parse_date("2024/02/29").is_some());
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn reformat_passes_malformed_values_through() {
        assert_eq!(reformat("yesterday-ish", "Y"), "yesterday-ish");
        assert_eq!(reformat("2024-13-45", "Y"), "2024-13-45");
    }

    #[test]
    fn intervals_clamp_month_ends() {
        let base = at("2024-01-31");
        assert_eq!(add_interval(base, "1 month"), Some(at("2024-02-29")));
        assert_eq!(add_interval(base, "+1 year"), Some(at("2025-01-31")));
        assert_eq!(add_interval(base, "-2 days"), Some(at("2024-01-29")));
        assert_eq!(add_interval(base, "2 weeks"), Some(at("2024-02-14")));
        assert_eq!(add_interval(base, "1 fortnight"), None);
        assert_eq!(add_interval(base, "soon"), None);
    }
}
