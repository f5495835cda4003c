//! Normalization helpers for text, amounts, and timestamps
//!
//! Baseline frames carry everything as strings; these helpers are the single
//! place where cell text becomes comparable values.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{NaiveDate, NaiveDateTime};

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace/punctuation-insensitive, lowercased remark form.
///
/// This is the cached comparison key on [`crate::StandardRecord`]; only
/// alphanumeric characters survive, so "Taxi ride!" and "taxi-ride" collapse
/// to the same string.
pub fn normalize_remark(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Strip a trailing parenthesized suffix from an account name.
///
/// Card accounts carry tail digits ("招商银行信用卡(1129)") that baseline
/// corrections omit; lock lookups compare on the root.
pub fn account_root(account: &str) -> &str {
    let trimmed = account.trim();
    match trimmed.find(['(', '（']) {
        Some(pos) if pos > 0 => trimmed[..pos].trim_end(),
        _ => trimmed,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse the timestamp formats seen in baseline cells.
///
/// Date-only cells resolve to midnight. Returns `None` rather than erroring;
/// callers decide whether an unparsable cell is skippable or fatal.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Quantize an amount to 2 decimal places, rounding half-up.
pub fn quantize(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

/// Parse an amount cell, tolerating currency symbols and thousands separators.
pub fn parse_amount(value: &str) -> Option<BigDecimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(amount) = trimmed.parse::<BigDecimal>() {
        return Some(quantize(&amount));
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<BigDecimal>().ok().map(|a| quantize(&a))
}
