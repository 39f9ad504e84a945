use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::ParseError;

/// 1) Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// 2) True for cells that carry no value: empty, or a `NaN`/`None` artifact left by
/// spreadsheet round-trips.
pub fn is_blank(raw: &str) -> bool {
    let cleaned = clean_str(raw);
    cleaned.is_empty()
        || cleaned.eq_ignore_ascii_case("nan")
        || cleaned.eq_ignore_ascii_case("none")
        || cleaned.eq_ignore_ascii_case("nat")
}

/// 3) Parse a balance cell: drop whitespace (including NBSP and thin spaces) and
/// thousands separators, then read a decimal. Scale is preserved, so `"1 000.50"`
/// becomes `1000.50`.
pub fn clean_number(raw: &str) -> Result<Decimal, ParseError> {
    let digits: String = clean_str(raw)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '\'')
        .collect();

    Decimal::from_str(&digits)
        .or_else(|_| Decimal::from_scientific(&digits))
        .map_err(|_| ParseError::Number {
            literal: raw.to_string(),
        })
}
