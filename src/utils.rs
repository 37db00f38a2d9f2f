use chrono::{Month, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

const PERIOD_PATTERN: &str = r"(?i)-\s*([a-z]+)\s+(\d{4})\.(?:xlsx|xlsm|xlsb|xls|ods)$";

fn period_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PERIOD_PATTERN).ok()).as_ref()
}

/// Parses "March 2024" / "mar 2024" into the first day of that month.
pub fn parse_month_year(text: &str) -> Option<NaiveDate> {
    let mut parts = text.split_whitespace();
    let month_part = parts.next()?;
    let year_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let month: Month = month_part.parse().ok()?;
    let year: i32 = year_part.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month.number_from_month(), 1)
}

/// Extracts the reporting month from a file name such as
/// `"Residuals - March 2024.xls"`. The month/year token must sit right before
/// a spreadsheet extension.
pub fn extract_period_from_filename(filename: &str) -> Option<NaiveDate> {
    let captures = period_pattern()?.captures(filename.trim())?;
    let token = format!("{} {}", captures.get(1)?.as_str(), captures.get(2)?.as_str());
    parse_month_year(&token)
}

/// Human label for a month, e.g. "March 2024".
pub fn month_label(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

/// Coerces a monetary cell like `"$1,234.50"` to a number.
/// Returns `None` when the text is not a finite number once currency symbols
/// and thousands separators are removed.
pub fn parse_currency(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// `1234.5` -> `"$1,234.50"`, `-20.0` -> `"-$20.00"`
pub fn format_currency(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

pub fn format_count(value: i64) -> String {
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_signed_currency(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_currency(value))
    } else {
        format_currency(value)
    }
}

pub fn format_signed_count(value: i64) -> String {
    if value > 0 {
        format!("+{}", format_count(value))
    } else {
        format_count(value)
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Percentage-point change, e.g. `"+1.25pp"`.
pub fn format_points(value: f64) -> String {
    format!("{:+.2}pp", value)
}
