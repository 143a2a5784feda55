//! Text and money normalization for scraped page fragments.
//!
//! Listings render prices in several conventions (`19.99`, `$19.99`,
//! `EUR 1.999,00`, `1,234.56 incl. VAT`), so [`parse_money`] tries a fixed
//! sequence of strategies and only fails once every one of them has.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::Money;

const CURRENCY_MARKERS: &[char] = &['$', '€', '£', '¥'];

const MINUS_SIGNS: &[char] = &['-', '\u{2212}'];

static NUMERIC_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,.0-9]+").unwrap());

/// Collapses every run of whitespace into one space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses a scraped price string.
///
/// Strategies, in order:
/// 1. the trimmed string as a decimal
/// 2. whatever follows the first currency marker
/// 3. the first run of digits and separators
/// 4. that run with every `,` and `.` removed, read as minor units
///
/// # Errors
///
/// Returns [`Error::NotMoney`] when no strategy yields a non-negative amount,
/// including any text that starts with a minus sign.
pub fn parse_money(text: &str) -> Result<Money> {
    let trimmed = text.trim();
    let not_money = || Error::NotMoney {
        input: trimmed.to_owned(),
    };
    if trimmed.starts_with(MINUS_SIGNS) {
        return Err(not_money());
    }

    direct(trimmed)
        .or_else(|| after_currency_marker(trimmed))
        .or_else(|| numeric_run(trimmed).and_then(direct))
        .or_else(|| numeric_run(trimmed).and_then(minor_units))
        .ok_or_else(not_money)
}

fn direct(s: &str) -> Option<Money> {
    Decimal::from_str(s).ok().and_then(Money::new)
}

fn after_currency_marker(s: &str) -> Option<Money> {
    let (_, rest) = s.split_once(CURRENCY_MARKERS)?;
    direct(rest.trim())
}

/// First run of digits and separators, unless a minus sign precedes it.
fn numeric_run(s: &str) -> Option<&str> {
    let run = NUMERIC_RUN.find(s)?;
    if s[..run.start()].trim_end().ends_with(MINUS_SIGNS) {
        return None;
    }
    Some(run.as_str())
}

fn minor_units(run: &str) -> Option<Money> {
    let digits: String = run.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let cents = Decimal::from_str(&digits).ok()?;
    Money::new(cents / Decimal::ONE_HUNDRED)
}
