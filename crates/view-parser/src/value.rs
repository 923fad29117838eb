//! Normalisation of scraped count values.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// A numeral followed by a magnitude suffix, e.g. `1692.14w` or `3.2亿`.
static SUFFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([wW万亿])$").expect("suffix regex is valid")
});

const TEN_THOUSAND: f64 = 10_000.0;
const HUNDRED_MILLION: f64 = 100_000_000.0;

/// Parse a JSON value holding a count.
///
/// Numbers are taken as-is (fractions are rounded), strings go through
/// [`parse_count_str`]. Everything else yields `None`.
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Some(v)
            } else {
                n.as_f64().and_then(round_count)
            }
        }
        Value::String(s) => parse_count_str(s),
        _ => None,
    }
}

/// Parse a scraped count string.
///
/// Thousands separators are stripped first. `w`/`W`/`万` multiply by ten
/// thousand and `亿` by a hundred million; the result is rounded to the
/// nearest integer. Negative, empty and non-numeric input yields `None`.
pub fn parse_count_str(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(caps) = SUFFIX_REGEX.captures(&cleaned) {
        let numeral: f64 = caps.get(1)?.as_str().parse().ok()?;
        let multiplier = match caps.get(2)?.as_str() {
            "亿" => HUNDRED_MILLION,
            _ => TEN_THOUSAND,
        };
        return round_count(numeral * multiplier);
    }

    cleaned.parse::<f64>().ok().and_then(round_count)
}

fn round_count(value: f64) -> Option<u64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.round() as u64)
}
