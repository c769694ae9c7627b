//! Schema reconciliation shared by every provider adapter.
//!
//! Providers name the same line item differently ("Receivables",
//! "NetReceivables", "currentNetReceivables", ...). Each adapter declares one
//! static alias table of [`FieldRule`]s, and this module walks it against a
//! provider record: the first alias holding a usable number wins.

use serde_json::{Map, Value};

use crate::{AnnualRecord, SnapshotDraft};

/// Canonical line items a provider record can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineItem {
    Price,
    MarketCap,
    ReturnOnEquity,
    GrossMargin,
    NetMargin,
    DividendYield,
    FreeCashFlow,
    OperatingCashFlow,
    CapitalExpenditure,
    GrowthEstimate,
    EarningsPerShare,
    TrailingPe,
    Revenue,
    Receivables,
    NetIncome,
}

/// One canonical field, the provider keys that may carry it (in priority
/// order) and the multiplier into canonical units.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub item: LineItem,
    pub aliases: &'static [&'static str],
    pub scale: f64,
}

impl FieldRule {
    pub const fn new(item: LineItem, aliases: &'static [&'static str]) -> Self {
        Self {
            item,
            aliases,
            scale: 1.0,
        }
    }

    /// Provider reports this field in percent points (`25.3` for 25.3%).
    pub const fn percent(item: LineItem, aliases: &'static [&'static str]) -> Self {
        Self {
            item,
            aliases,
            scale: 0.01,
        }
    }
}

/// Reads a numeric cell: JSON numbers, `{"raw": n}` wrappers and numeric
/// strings. `"None"`, `"-"`, empty strings and non-finite values are absent.
pub fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_numeric_text(text),
        Value::Object(object) => object.get("raw").and_then(numeric),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%').replace(',', "");
    match trimmed.as_str() {
        "" | "-" | "--" | "None" | "null" | "N/A" => None,
        other => other.parse::<f64>().ok(),
    }
}

/// First alias in `aliases` that holds a usable number.
pub fn pick(record: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .find_map(|alias| record.get(*alias).and_then(numeric))
}

/// Resolves `item` through `table`. `None` when the table has no rule for the
/// item or no alias matched.
pub fn lookup(table: &[FieldRule], record: &Map<String, Value>, item: LineItem) -> Option<f64> {
    table
        .iter()
        .filter(|rule| rule.item == item)
        .find_map(|rule| pick(record, rule.aliases).map(|value| value * rule.scale))
}

/// Fills every still-empty draft field the table knows how to read.
///
/// Earlier records win, so adapters merge their most authoritative endpoint
/// first.
pub fn merge_into_draft(table: &[FieldRule], record: &Map<String, Value>, draft: &mut SnapshotDraft) {
    let slots: [(LineItem, &mut Option<f64>); 12] = [
        (LineItem::Price, &mut draft.price),
        (LineItem::MarketCap, &mut draft.market_cap),
        (LineItem::ReturnOnEquity, &mut draft.return_on_equity),
        (LineItem::GrossMargin, &mut draft.gross_margin),
        (LineItem::NetMargin, &mut draft.net_margin),
        (LineItem::DividendYield, &mut draft.dividend_yield),
        (LineItem::FreeCashFlow, &mut draft.free_cash_flow),
        (LineItem::OperatingCashFlow, &mut draft.operating_cash_flow),
        (LineItem::CapitalExpenditure, &mut draft.capital_expenditure),
        (LineItem::GrowthEstimate, &mut draft.growth_estimate),
        (LineItem::EarningsPerShare, &mut draft.earnings_per_share),
        (LineItem::TrailingPe, &mut draft.trailing_pe),
    ];
    for (item, slot) in slots {
        if slot.is_none() {
            *slot = lookup(table, record, item);
        }
    }
}

/// Fills every still-empty field of one annual record.
pub fn merge_into_annual(table: &[FieldRule], record: &Map<String, Value>, annual: &mut AnnualRecord) {
    let slots: [(LineItem, &mut Option<f64>); 4] = [
        (LineItem::Revenue, &mut annual.revenue),
        (LineItem::Receivables, &mut annual.receivables),
        (LineItem::NetIncome, &mut annual.net_income),
        (LineItem::OperatingCashFlow, &mut annual.operating_cash_flow),
    ];
    for (item, slot) in slots {
        if slot.is_none() {
            *slot = lookup(table, record, item);
        }
    }
}

/// Fiscal year from a `YYYY-MM-DD...` date string.
pub fn fiscal_year(text: &str) -> Option<i32> {
    text.trim().get(..4).and_then(|year| year.parse().ok())
}
