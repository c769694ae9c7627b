//! Fixed-multiplier ADR / dual-listing correction.
//!
//! Some listings report statements in one currency while their market cap is
//! quoted in another (US ADRs of mainland issuers report CNY, Hong Kong
//! lines of mainland groups report CNY against an HKD quote). The factors
//! below convert the reported cash-flow figure into the quote currency.
//!
//! These are point approximations of exchange rates, not a live FX feed.
//! They go stale and must be refreshed by hand.

use crate::Ticker;

/// CNY to USD, approximate.
pub const CNY_TO_USD: f64 = 0.14;
/// CNY to HKD, approximate.
pub const CNY_TO_HKD: f64 = 1.08;
/// TWD to USD, approximate.
pub const TWD_TO_USD: f64 = 0.031;

const ADR_FACTORS: &[(&str, f64)] = &[
    ("BABA", CNY_TO_USD),
    ("PDD", CNY_TO_USD),
    ("JD", CNY_TO_USD),
    ("BIDU", CNY_TO_USD),
    ("NIO", CNY_TO_USD),
    ("TSM", TWD_TO_USD),
    ("0700.HK", CNY_TO_HKD),
    ("9988.HK", CNY_TO_HKD),
    ("3690.HK", CNY_TO_HKD),
    ("9618.HK", CNY_TO_HKD),
    ("1810.HK", CNY_TO_HKD),
    ("9999.HK", CNY_TO_HKD),
];

/// Multiplier that converts `ticker`'s reported cash flows into its quote
/// currency. `1.0` for anything not in the table.
pub fn correction_factor(ticker: &Ticker) -> f64 {
    ADR_FACTORS
        .iter()
        .find(|(symbol, _)| *symbol == ticker.as_str())
        .map_or(1.0, |(_, factor)| *factor)
}

/// Applies [`correction_factor`] to a reported figure.
pub fn correct(ticker: &Ticker, value: f64) -> f64 {
    value * correction_factor(ticker)
}
