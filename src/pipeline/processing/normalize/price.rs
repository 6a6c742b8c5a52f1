use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::constants::{CURRENCY_SYMBOLS, KNOWN_CURRENCY_CODES};
use crate::types::RawValue;

static CURRENCY_CODE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", KNOWN_CURRENCY_CODES.join("|"))).ok()
});

/// Largest difference between a pre-parsed number and its text that is not a misparse
const MISPARSE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}' || c == '\''
}

fn strip_currency(raw: &str) -> String {
    let without_codes = match CURRENCY_CODE_RE.as_ref() {
        Some(re) => re.replace_all(raw, "").to_string(),
        None => raw.to_string(),
    };
    without_codes
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse a price written in any of the supported locale conventions.
///
/// Returns `None` for anything that does not reduce to a finite number.
pub fn parse_price_text(raw: &str) -> Option<Decimal> {
    let cleaned = strip_currency(raw);
    if cleaned.is_empty() {
        return None;
    }

    let has_space = cleaned.trim().chars().any(is_space);
    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let canonical: String = if has_space && commas > 0 && dots == 0 {
        // "23 234,00"
        cleaned
            .chars()
            .filter(|c| !is_space(*c))
            .map(|c| if c == ',' { '.' } else { c })
            .collect()
    } else if commas > 0 && dots > 0 {
        let last_comma = cleaned.rfind(',').unwrap_or(0);
        let last_dot = cleaned.rfind('.').unwrap_or(0);
        if last_comma > last_dot {
            // "23.234,00"
            cleaned
                .chars()
                .filter(|c| *c != '.' && !is_space(*c))
                .map(|c| if c == ',' { '.' } else { c })
                .collect()
        } else {
            // "23,234.00"
            cleaned.chars().filter(|c| *c != ',' && !is_space(*c)).collect()
        }
    } else if commas > 0 {
        let trailing = cleaned
            .rsplit(',')
            .next()
            .map(|tail| tail.trim().chars().filter(|c| c.is_ascii_digit()).count())
            .unwrap_or(0);
        let tail_is_digits = cleaned
            .rsplit(',')
            .next()
            .map(|tail| tail.trim().chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);
        if commas == 1 && trailing == 2 && tail_is_digits {
            // "1234,56"
            cleaned
                .chars()
                .filter(|c| !is_space(*c))
                .map(|c| if c == ',' { '.' } else { c })
                .collect()
        } else {
            // "1,234"
            cleaned.chars().filter(|c| *c != ',' && !is_space(*c)).collect()
        }
    } else if dots > 1 {
        // "1.234.567"
        cleaned.chars().filter(|c| *c != '.' && !is_space(*c)).collect()
    } else {
        // single dot, spaces only, or no separators at all
        cleaned.chars().filter(|c| !is_space(*c)).collect()
    };

    let negative = canonical.trim_start().starts_with('-');
    let digits: String = canonical
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !digits.chars().any(|c| c.is_ascii_digit()) || digits.matches('.').count() > 1 {
        return None;
    }

    let value = Decimal::from_str(&digits).ok()?;
    Some(if negative { -value } else { value })
}

/// Convert a pre-parsed workbook number
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(6).normalize())
}

/// Parsed price plus a description of any disagreement with the source text
#[derive(Debug, Clone, PartialEq)]
pub struct PriceParse {
    pub value: Option<Decimal>,
    pub misparse: Option<String>,
    /// Non-empty input that did not parse
    pub unparseable: bool,
}

/// Resolve a raw cell into a price; original text wins over a pre-parsed number
pub fn normalize_price(raw: &RawValue) -> PriceParse {
    match raw {
        RawValue::Empty => PriceParse {
            value: None,
            misparse: None,
            unparseable: false,
        },
        RawValue::Text(text) => {
            let value = parse_price_text(text);
            PriceParse {
                value,
                misparse: None,
                unparseable: value.is_none() && !text.trim().is_empty(),
            }
        }
        RawValue::Number {
            value,
            original: None,
        } => {
            let parsed = decimal_from_f64(*value);
            PriceParse {
                value: parsed,
                misparse: None,
                unparseable: parsed.is_none(),
            }
        }
        RawValue::Number {
            value,
            original: Some(text),
        } => {
            let numeric = decimal_from_f64(*value);
            match parse_price_text(text) {
                Some(from_text) => {
                    let diverges = match numeric {
                        Some(n) => n
                            .checked_sub(from_text)
                            .map_or(true, |d| d.abs() > MISPARSE_EPSILON),
                        None => true,
                    };
                    let misparse = diverges.then(|| {
                        format!(
                            "Cell value {} disagrees with its text '{}'; using {}",
                            value, text, from_text
                        )
                    });
                    PriceParse {
                        value: Some(from_text),
                        misparse,
                        unparseable: false,
                    }
                }
                None => {
                    let small_with_comma =
                        text.contains(',') && numeric.map(|n| n < Decimal::ONE_THOUSAND).unwrap_or(false);
                    let misparse = small_with_comma.then(|| {
                        format!(
                            "Cell value {} looks misparsed from text '{}'",
                            value, text
                        )
                    });
                    PriceParse {
                        value: numeric,
                        misparse,
                        unparseable: numeric.is_none(),
                    }
                }
            }
        }
    }
}
