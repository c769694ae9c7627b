use serde::{Deserialize, Serialize};

use crate::{ProviderId, Ticker, UtcDateTime, ValidationError};

/// Most annual records a snapshot keeps.
pub const MAX_HISTORY_YEARS: usize = 5;

/// One fiscal year of reported figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRecord {
    pub fiscal_year: i32,
    pub revenue: Option<f64>,
    pub receivables: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_cash_flow: Option<f64>,
}

impl AnnualRecord {
    pub fn new(fiscal_year: i32) -> Self {
        Self {
            fiscal_year,
            revenue: None,
            receivables: None,
            net_income: None,
            operating_cash_flow: None,
        }
    }
}

/// Canonical, provider-agnostic fundamentals record for one ticker.
///
/// `price` and `market_cap` are always present and positive. Every other
/// figure stays `None` when the provider did not report it; consumers decide
/// whether to coerce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub ticker: Ticker,
    pub name: String,
    pub source: ProviderId,
    pub as_of: UtcDateTime,
    pub currency: Option<String>,
    pub price: f64,
    pub market_cap: f64,
    pub return_on_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    /// Oldest to newest, at most [`MAX_HISTORY_YEARS`] entries.
    pub history: Vec<AnnualRecord>,
    /// Analyst consensus earnings growth, as a fraction.
    pub growth_estimate: Option<f64>,
    /// Trailing twelve-month earnings per share, in `currency`.
    #[serde(default)]
    pub earnings_per_share: Option<f64>,
    /// Price over trailing EPS; absent when earnings are not positive.
    #[serde(default)]
    pub trailing_pe: Option<f64>,
    /// Recent daily closes, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_history: Vec<f64>,
}

impl FinancialSnapshot {
    /// Re-checks the price invariant. Adapters already enforce it through
    /// [`SnapshotDraft::finish`], but the fields are public.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ticker.validate()?;
        validate_positive("price", self.price)?;
        validate_positive("market_cap", self.market_cap)?;
        Ok(())
    }

    /// Shares implied by market cap and last price.
    pub fn implied_shares(&self) -> f64 {
        self.market_cap / self.price
    }

    /// Compound annual revenue growth between the oldest and newest years
    /// that report a positive revenue.
    pub fn revenue_cagr(&self) -> Option<f64> {
        let mut reported = self
            .history
            .iter()
            .filter_map(|record| record.revenue.filter(|v| *v > 0.0).map(|v| (record.fiscal_year, v)));
        let (first_year, first) = reported.next()?;
        let (last_year, last) = reported.last()?;
        let span = last_year - first_year;
        if span <= 0 {
            return None;
        }
        Some((last / first).powf(1.0 / f64::from(span)) - 1.0)
    }

    /// Change between the last two closes, as a fraction.
    pub fn daily_change(&self) -> Option<f64> {
        let [.., previous, last] = self.price_history.as_slice() else {
            return None;
        };
        if *previous <= 0.0 {
            return None;
        }
        Some((last - previous) / previous)
    }
}

/// Mutable staging area adapters fill before producing a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDraft {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub history: Vec<AnnualRecord>,
    pub growth_estimate: Option<f64>,
    pub earnings_per_share: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub price_history: Vec<f64>,
}

impl SnapshotDraft {
    /// Validates identity/price fields and normalizes the rest.
    ///
    /// Fails when price or market cap is absent or not positive, so a caller
    /// can tell "no data" apart from a real zero.
    pub fn finish(
        self,
        ticker: Ticker,
        source: ProviderId,
        as_of: UtcDateTime,
    ) -> Result<FinancialSnapshot, ValidationError> {
        ticker.validate()?;
        let price = self.price.ok_or(ValidationError::NonPositiveValue { field: "price" })?;
        validate_positive("price", price)?;
        let market_cap = self
            .market_cap
            .ok_or(ValidationError::NonPositiveValue { field: "market_cap" })?;
        validate_positive("market_cap", market_cap)?;

        let operating_cash_flow = finite(self.operating_cash_flow);
        let capital_expenditure = finite(self.capital_expenditure);
        let free_cash_flow = finite(self.free_cash_flow).or_else(|| {
            derive_free_cash_flow(operating_cash_flow, capital_expenditure)
        });

        let earnings_per_share = finite(self.earnings_per_share);
        let trailing_pe = finite(self.trailing_pe)
            .filter(|pe| *pe > 0.0)
            .or_else(|| earnings_per_share.filter(|eps| *eps > 0.0).map(|eps| price / eps));

        let name = self
            .name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ticker.as_str().to_owned());

        Ok(FinancialSnapshot {
            ticker,
            name,
            source,
            as_of,
            currency: self.currency.map(|c| c.trim().to_ascii_uppercase()).filter(|c| !c.is_empty()),
            price,
            market_cap,
            return_on_equity: finite(self.return_on_equity),
            gross_margin: finite(self.gross_margin),
            net_margin: finite(self.net_margin),
            dividend_yield: finite(self.dividend_yield),
            free_cash_flow,
            operating_cash_flow,
            capital_expenditure,
            history: normalize_history(self.history),
            growth_estimate: finite(self.growth_estimate),
            earnings_per_share,
            trailing_pe,
            price_history: self
                .price_history
                .into_iter()
                .filter(|close| close.is_finite() && *close > 0.0)
                .collect(),
        })
    }
}

/// Operating cash flow minus capital expenditure. Providers disagree on the
/// sign of capex, so its magnitude is used.
pub fn derive_free_cash_flow(
    operating_cash_flow: Option<f64>,
    capital_expenditure: Option<f64>,
) -> Option<f64> {
    match (operating_cash_flow, capital_expenditure) {
        (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
        _ => None,
    }
}

/// Sorts oldest to newest, keeps the last record per fiscal year and the
/// newest [`MAX_HISTORY_YEARS`] years.
pub fn normalize_history(records: Vec<AnnualRecord>) -> Vec<AnnualRecord> {
    let mut records = records
        .into_iter()
        .map(|record| AnnualRecord {
            fiscal_year: record.fiscal_year,
            revenue: finite(record.revenue),
            receivables: finite(record.receivables),
            net_income: finite(record.net_income),
            operating_cash_flow: finite(record.operating_cash_flow),
        })
        .collect::<Vec<_>>();
    // stable sort keeps provider order within a year, so the later duplicate wins below
    records.sort_by_key(|record| record.fiscal_year);

    let mut deduped: Vec<AnnualRecord> = Vec::with_capacity(records.len());
    for record in records {
        match deduped.last_mut() {
            Some(last) if last.fiscal_year == record.fiscal_year => *last = record,
            _ => deduped.push(record),
        }
    }

    let excess = deduped.len().saturating_sub(MAX_HISTORY_YEARS);
    deduped.drain(..excess);
    deduped
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> SnapshotDraft {
        SnapshotDraft {
            name: Some(String::from("Kweichow Moutai")),
            price: Some(1_700.0),
            market_cap: Some(2.1e12),
            ..SnapshotDraft::default()
        }
    }

    fn finish(draft: SnapshotDraft) -> Result<FinancialSnapshot, ValidationError> {
        draft.finish(Ticker::from("600519.SS"), ProviderId::Yahoo, UtcDateTime::now())
    }

    #[test]
    fn rejects_missing_or_zero_price() {
        let missing = SnapshotDraft {
            price: None,
            ..draft()
        };
        assert_eq!(
            finish(missing).expect_err("must fail"),
            ValidationError::NonPositiveValue { field: "price" }
        );

        let zero_cap = SnapshotDraft {
            market_cap: Some(0.0),
            ..draft()
        };
        assert_eq!(
            finish(zero_cap).expect_err("must fail"),
            ValidationError::NonPositiveValue { field: "market_cap" }
        );
    }

    #[test]
    fn derives_free_cash_flow_when_not_reported() {
        let snapshot = finish(SnapshotDraft {
            operating_cash_flow: Some(100.0),
            capital_expenditure: Some(-30.0),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(snapshot.free_cash_flow, Some(70.0));

        let reported = finish(SnapshotDraft {
            free_cash_flow: Some(55.0),
            operating_cash_flow: Some(100.0),
            capital_expenditure: Some(30.0),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(reported.free_cash_flow, Some(55.0));
    }

    #[test]
    fn absent_ratios_stay_absent() {
        let snapshot = finish(SnapshotDraft {
            return_on_equity: Some(f64::NAN),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(snapshot.return_on_equity, None);
        assert_eq!(snapshot.gross_margin, None);
        assert_eq!(snapshot.free_cash_flow, None);
    }

    #[test]
    fn trailing_pe_falls_back_to_price_over_eps() {
        let derived = finish(SnapshotDraft {
            earnings_per_share: Some(50.0),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(derived.trailing_pe, Some(34.0));

        let reported = finish(SnapshotDraft {
            earnings_per_share: Some(50.0),
            trailing_pe: Some(33.5),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(reported.trailing_pe, Some(33.5));

        let loss = finish(SnapshotDraft {
            earnings_per_share: Some(-2.0),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(loss.earnings_per_share, Some(-2.0));
        assert_eq!(loss.trailing_pe, None);
    }

    #[test]
    fn history_is_sorted_deduplicated_and_truncated() {
        let mut records = (2016..=2023).rev().map(AnnualRecord::new).collect::<Vec<_>>();
        records.push(AnnualRecord {
            revenue: Some(9.0),
            ..AnnualRecord::new(2023)
        });

        let history = normalize_history(records);
        let years = history.iter().map(|r| r.fiscal_year).collect::<Vec<_>>();
        assert_eq!(years, vec![2019, 2020, 2021, 2022, 2023]);
        assert_eq!(history[4].revenue, Some(9.0));
    }

    #[test]
    fn revenue_cagr_spans_reported_years() {
        let snapshot = finish(SnapshotDraft {
            history: vec![
                AnnualRecord {
                    revenue: Some(100.0),
                    ..AnnualRecord::new(2021)
                },
                AnnualRecord::new(2022),
                AnnualRecord {
                    revenue: Some(121.0),
                    ..AnnualRecord::new(2023)
                },
            ],
            ..draft()
        })
        .expect("valid snapshot");

        let cagr = snapshot.revenue_cagr().expect("two reported years");
        assert!((cagr - 0.10).abs() < 1e-9);
    }

    #[test]
    fn blank_name_falls_back_to_ticker() {
        let snapshot = finish(SnapshotDraft {
            name: Some(String::from("  ")),
            ..draft()
        })
        .expect("valid snapshot");
        assert_eq!(snapshot.name, "600519.SS");
    }
}
