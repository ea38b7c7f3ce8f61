use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

static QUARTER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([1-4])T(\d{4})").expect("quarter token regex is valid"));

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Keep ASCII digits only (tax ids arrive as `12.345.678/0001-90`).
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Parse a pt-BR formatted amount: `.` is the thousands separator, `,` the decimal mark.
/// Returns None for empty or unparseable input.
pub fn parse_monetary(raw: &str) -> Option<Decimal> {
    let cleaned = clean_str(raw);
    if cleaned.is_empty() {
        return None;
    }
    let canonical = cleaned.replace('.', "").replace(',', ".");
    Decimal::from_str(&canonical).ok()
}

/// Round half away from zero, always rendering two decimal places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Reporting period encoded in a source file name, e.g. `1T2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: u16,
    pub quarter: Quarter,
}

/// Calendar quarter 1..=4, rendered as `1T`..`4T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quarter(u8);

impl Quarter {
    pub fn new(n: u8) -> Result<Self> {
        if (1..=4).contains(&n) {
            Ok(Quarter(n))
        } else {
            Err(anyhow!("quarter must be 1..=4, got {}", n))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T", self.0)
    }
}

impl TryFrom<String> for Quarter {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        let t = s.trim().to_uppercase();
        let digits = t.strip_suffix('T').unwrap_or(&t);
        let n: u8 = digits
            .parse()
            .map_err(|_| anyhow!("invalid quarter `{}`", s))?;
        Quarter::new(n)
    }
}

impl From<Quarter> for String {
    fn from(q: Quarter) -> Self {
        q.to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.quarter, self.year)
    }
}

/// Finds the first `[1-4]T\d{4}` token anywhere in the file name.
pub fn extract_period_from_filename(filename: &str) -> Option<Period> {
    let caps = QUARTER_TOKEN.captures(filename)?;
    let quarter: u8 = caps[1].parse().ok()?;
    let year: u16 = caps[2].parse().ok()?;
    Some(Period {
        year,
        quarter: Quarter(quarter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn monetary_uses_locale_separators() {
        assert_eq!(parse_monetary("1.500,00"), Some(dec("1500.00")));
        assert_eq!(parse_monetary(" \"900,5\" "), Some(dec("900.5")));
        assert_eq!(parse_monetary("-50,00"), Some(dec("-50.00")));
        assert_eq!(parse_monetary("1.234.567,89"), Some(dec("1234567.89")));
        assert_eq!(parse_monetary(""), None);
        assert_eq!(parse_monetary("n/a"), None);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec("2.345")).to_string(), "2.35");
        assert_eq!(round_money(dec("2.344")).to_string(), "2.34");
        assert_eq!(round_money(dec("1500")).to_string(), "1500.00");
    }

    #[test]
    fn period_found_anywhere_in_name() {
        let p = extract_period_from_filename("dados/3T2024_despesas.csv").unwrap();
        assert_eq!(p.year, 2024);
        assert_eq!(p.quarter.number(), 3);
        assert_eq!(p.to_string(), "3T2024");

        assert!(extract_period_from_filename("5T2024.csv").is_none());
        assert!(extract_period_from_filename("relatorio.csv").is_none());
    }

    #[test]
    fn quarter_round_trips_through_string() {
        let q = Quarter::try_from("2t".to_string()).unwrap();
        assert_eq!(String::from(q), "2T");
        assert!(Quarter::try_from("7T".to_string()).is_err());
    }

    #[test]
    fn digits_only_strips_punctuation() {
        assert_eq!(digits_only("12.345.678/0001-90"), "12345678000190");
        assert_eq!(digits_only("n/a"), "");
    }
}
