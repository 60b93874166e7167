// Utility helpers for parsing and formatting.
//
// All the "dirty" cell handling lives here so the rest of the code can work
// with typed values. Parsers return `Option` and never fail loudly: a value
// that does not fit becomes a missing value.
use num_format::{Locale, ToFormattedString};
use rust_decimal::{Decimal, RoundingStrategy};

/// Turn a European-formatted amount such as `1.234,500 €` into the plain
/// decimal notation `1234.500`.
///
/// - Removes every occurrence of the currency marker.
/// - Drops `.` thousands separators.
/// - Swaps the `,` decimal separator for `.`.
pub fn normalize_european_number(s: &str, currency_marker: &str) -> String {
    let without_marker = if currency_marker.is_empty() {
        s.to_string()
    } else {
        s.replace(currency_marker, "")
    };
    without_marker.replace('.', "").replace(',', ".")
}

/// Parse a plain decimal string into a fixed-point value with `precision`
/// total digits and `scale` fractional digits.
///
/// Accepts an optional sign, digits and at most one decimal point. Extra
/// fractional digits are rounded half away from zero; values whose integer
/// part does not fit `precision - scale` digits are rejected.
pub fn parse_fixed_decimal(s: &str, precision: u32, scale: u32) -> Option<Decimal> {
    let s = s.trim();
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    if body.is_empty() || !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !body.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if body.matches('.').count() > 1 {
        return None;
    }

    let parsed: Decimal = s.parse().ok()?;
    let mut value = parsed.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(scale);

    let limit = Decimal::from_i128_with_scale(10i128.pow(precision - scale), 0);
    if value.abs() >= limit {
        return None;
    }
    Some(value)
}

/// Full cleaning of a currency cell: locale normalization then fixed-point
/// parsing.
pub fn parse_currency_safe(
    s: Option<&str>,
    currency_marker: &str,
    precision: u32,
    scale: u32,
) -> Option<Decimal> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    parse_fixed_decimal(&normalize_european_number(s, currency_marker), precision, scale)
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

/// Format a decimal with a fixed number of places and `,` thousands
/// separators (e.g. `1,234,567.89`).
pub fn format_decimal(n: Decimal, decimals: u32) -> String {
    let neg = n.is_sign_negative() && !n.is_zero();
    let mut rounded = n.abs().round_dp(decimals);
    rounded.rescale(decimals);
    let s = rounded.to_string();
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: u128 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Console rendering of a possibly missing measure.
pub fn format_optional(n: Option<Decimal>, decimals: u32) -> String {
    match n {
        Some(v) => format_decimal(v, decimals),
        None => "null".to_string(),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
