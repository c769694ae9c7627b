//! Two-stage discounted-cash-flow valuation and the metrics derived from it.
//!
//! Everything here is a pure function of a [`FinancialSnapshot`] and
//! [`ValuationParameters`]. Malformed parameters are rejected with a
//! [`ValuationError`] instead of being coerced to zero, so "could not compute"
//! never looks like "fairly valued".

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{currency, FinancialSnapshot, Ticker, ValidationError, ValuationError};

/// Long-run growth applied after the projection horizon.
pub const TERMINAL_GROWTH_RATE: f64 = 0.03;
/// Years of explicit projection before the terminal value.
pub const PROJECTION_YEARS: u32 = 10;
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.10;

/// Provider growth hints are clamped to this range.
pub const HINT_GROWTH_FLOOR: f64 = 0.02;
pub const HINT_GROWTH_CAP: f64 = 0.25;

/// Half-width of the band around the fair price classed as [`ValuationStatus::Fair`].
pub const FAIR_BAND: f64 = 0.15;

/// Two-stage DCF of a free cash flow.
///
/// Stage one discounts `years` of cash flow growing at `growth_rate`; stage
/// two adds a Gordon terminal value growing at `terminal_rate`. A
/// non-positive `fcf` is not valued and returns `Ok(0.0)`.
///
/// # Errors
///
/// - [`ValuationError::NonFiniteInput`] for NaN or infinite inputs.
/// - [`ValuationError::DiscountNotAboveTerminal`] when
///   `discount_rate <= terminal_rate`, where the terminal value is undefined.
/// - [`ValuationError::RateOutOfRange`] when a rate is at or below -100%.
pub fn compute_dcf(
    fcf: f64,
    growth_rate: f64,
    discount_rate: f64,
    terminal_rate: f64,
    years: u32,
) -> Result<f64, ValuationError> {
    finite("free_cash_flow", fcf)?;
    finite("growth_rate", growth_rate)?;
    finite("discount_rate", discount_rate)?;
    finite("terminal_rate", terminal_rate)?;
    above_total_loss("growth_rate", growth_rate)?;
    above_total_loss("terminal_rate", terminal_rate)?;
    if discount_rate <= terminal_rate {
        return Err(ValuationError::DiscountNotAboveTerminal {
            discount_rate,
            terminal_rate,
        });
    }

    if fcf <= 0.0 {
        return Ok(0.0);
    }

    let growth = 1.0 + growth_rate;
    let discount = 1.0 + discount_rate;
    let stage_one = (1..=years)
        .map(|year| {
            let exponent = i32::try_from(year).unwrap_or(i32::MAX);
            fcf * growth.powi(exponent) / discount.powi(exponent)
        })
        .sum::<f64>();

    let horizon = i32::try_from(years).unwrap_or(i32::MAX);
    let terminal = fcf * growth.powi(horizon) * (1.0 + terminal_rate)
        / (discount_rate - terminal_rate);
    Ok(stage_one + terminal / discount.powi(horizon))
}

/// `(intrinsic - market_cap) / market_cap`, or 0 without a positive market cap.
pub fn upside(intrinsic_value: f64, market_cap: f64) -> f64 {
    if market_cap > 0.0 {
        (intrinsic_value - market_cap) / market_cap
    } else {
        0.0
    }
}

/// `fcf / market_cap`, or 0 without a positive market cap.
pub fn fcf_yield(fcf: f64, market_cap: f64) -> f64 {
    if market_cap > 0.0 {
        fcf / market_cap
    } else {
        0.0
    }
}

/// Years of current free cash flow needed to earn back the market cap.
/// `None` unless both are positive.
pub fn payback_years(market_cap: f64, fcf: f64) -> Option<f64> {
    (fcf > 0.0 && market_cap > 0.0).then(|| market_cap / fcf)
}

/// Segment prior for growth when no override or provider hint exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSegment {
    Technology,
    ValueDividend,
    ForeignCore,
    #[default]
    General,
}

impl MarketSegment {
    pub const ALL: [Self; 4] = [
        Self::Technology,
        Self::ValueDividend,
        Self::ForeignCore,
        Self::General,
    ];

    pub const fn default_growth(self) -> f64 {
        match self {
            Self::Technology => 0.12,
            Self::ValueDividend => 0.06,
            Self::ForeignCore => 0.07,
            Self::General => 0.08,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::ValueDividend => "value_dividend",
            Self::ForeignCore => "foreign_core",
            Self::General => "general",
        }
    }
}

impl Display for MarketSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketSegment {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "technology" | "tech" => Ok(Self::Technology),
            "value_dividend" | "value" | "dividend" => Ok(Self::ValueDividend),
            "foreign_core" | "foreign" => Ok(Self::ForeignCore),
            "general" => Ok(Self::General),
            _ => Err(ValidationError::InvalidSegment {
                value: value.to_owned(),
            }),
        }
    }
}

/// Where the growth rate of a valuation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthSource {
    Override,
    ProviderHint,
    SegmentDefault,
}

/// Inputs of one valuation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationParameters {
    pub discount_rate: f64,
    /// Wins over the provider hint; only range-checked.
    pub growth_override: Option<f64>,
    pub segment: MarketSegment,
    pub terminal_rate: f64,
    pub years: u32,
    /// Reject non-positive free cash flow instead of valuing it at zero.
    pub require_positive_cash_flow: bool,
}

impl Default for ValuationParameters {
    fn default() -> Self {
        Self {
            discount_rate: DEFAULT_DISCOUNT_RATE,
            growth_override: None,
            segment: MarketSegment::default(),
            terminal_rate: TERMINAL_GROWTH_RATE,
            years: PROJECTION_YEARS,
            require_positive_cash_flow: false,
        }
    }
}

impl ValuationParameters {
    pub fn with_discount_rate(mut self, discount_rate: f64) -> Self {
        self.discount_rate = discount_rate;
        self
    }

    pub fn with_growth_override(mut self, growth: Option<f64>) -> Self {
        self.growth_override = growth;
        self
    }

    pub fn with_segment(mut self, segment: MarketSegment) -> Self {
        self.segment = segment;
        self
    }

    pub fn with_terminal_rate(mut self, terminal_rate: f64) -> Self {
        self.terminal_rate = terminal_rate;
        self
    }

    pub fn with_years(mut self, years: u32) -> Self {
        self.years = years;
        self
    }

    pub fn requiring_positive_cash_flow(mut self, required: bool) -> Self {
        self.require_positive_cash_flow = required;
        self
    }

    /// Checks the parameters without a snapshot.
    pub fn validate(&self) -> Result<(), ValuationError> {
        if let Some(growth) = self.growth_override {
            finite("growth_override", growth)?;
            above_total_loss("growth_override", growth)?;
        }
        compute_dcf(0.0, 0.0, self.discount_rate, self.terminal_rate, self.years).map(|_| ())
    }

    /// Growth for `snapshot`: override, then the clamped provider hint, then
    /// the segment default.
    pub fn select_growth(
        &self,
        snapshot: &FinancialSnapshot,
    ) -> Result<(f64, GrowthSource), ValuationError> {
        if let Some(growth) = self.growth_override {
            finite("growth_override", growth)?;
            above_total_loss("growth_override", growth)?;
            return Ok((growth, GrowthSource::Override));
        }
        match snapshot.growth_estimate.filter(|hint| hint.is_finite()) {
            Some(hint) => Ok((
                hint.clamp(HINT_GROWTH_FLOOR, HINT_GROWTH_CAP),
                GrowthSource::ProviderHint,
            )),
            None => Ok((self.segment.default_growth(), GrowthSource::SegmentDefault)),
        }
    }
}

/// Weights of the composite quality score, applied to percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub fcf_yield: f64,
    pub return_on_equity: f64,
    pub dividend_yield: f64,
}

impl Default for ScoreWeights {
    /// Heuristic weighting, not fitted to anything.
    fn default() -> Self {
        Self {
            fcf_yield: 0.5,
            return_on_equity: 0.3,
            dividend_yield: 0.2,
        }
    }
}

impl ScoreWeights {
    /// Inputs are fractions; the score is computed on percentages.
    pub fn score(&self, fcf_yield: f64, return_on_equity: f64, dividend_yield: f64) -> f64 {
        100.0
            * (self.fcf_yield * fcf_yield
                + self.return_on_equity * return_on_equity
                + self.dividend_yield * dividend_yield)
    }
}

/// Current price relative to the fair price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationStatus {
    Undervalued,
    Fair,
    Overvalued,
}

impl ValuationStatus {
    /// Undervalued below `fair * (1 - FAIR_BAND)`, overvalued above
    /// `fair * (1 + FAIR_BAND)`.
    pub fn classify(price: f64, fair_price: f64) -> Self {
        if price < fair_price * (1.0 - FAIR_BAND) {
            Self::Undervalued
        } else if price > fair_price * (1.0 + FAIR_BAND) {
            Self::Overvalued
        } else {
            Self::Fair
        }
    }
}

/// Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub ticker: Ticker,
    pub intrinsic_value: f64,
    /// Intrinsic value per implied share; `None` when nothing was valued.
    pub fair_price: Option<f64>,
    pub upside: f64,
    pub fcf_yield: f64,
    pub payback_years: Option<f64>,
    pub score: f64,
    pub growth_rate: f64,
    pub growth_source: GrowthSource,
    pub discount_rate: f64,
    /// ADR factor applied to the reported free cash flow.
    pub correction_factor: f64,
    pub free_cash_flow: f64,
    pub status: Option<ValuationStatus>,
}

/// Values one snapshot.
///
/// # Errors
///
/// Returns [`ValuationError::MissingInput`] when the snapshot has no free
/// cash flow, [`ValuationError::NonPositiveCashFlow`] when it is not positive
/// and `require_positive_cash_flow` is set, and the errors of
/// [`compute_dcf`] for malformed parameters.
pub fn value_snapshot(
    snapshot: &FinancialSnapshot,
    params: &ValuationParameters,
    weights: &ScoreWeights,
) -> Result<ValuationResult, ValuationError> {
    let reported = snapshot
        .free_cash_flow
        .ok_or_else(|| ValuationError::MissingInput {
            ticker: snapshot.ticker.to_string(),
            field: "free_cash_flow",
        })?;

    let correction_factor = currency::correction_factor(&snapshot.ticker);
    let fcf = reported * correction_factor;
    if params.require_positive_cash_flow && fcf <= 0.0 {
        return Err(ValuationError::NonPositiveCashFlow { value: fcf });
    }

    let (growth_rate, growth_source) = params.select_growth(snapshot)?;
    let intrinsic_value = compute_dcf(
        fcf,
        growth_rate,
        params.discount_rate,
        params.terminal_rate,
        params.years,
    )?;

    let market_cap = snapshot.market_cap;
    let shares = if snapshot.price > 0.0 && market_cap > 0.0 {
        snapshot.implied_shares()
    } else {
        0.0
    };
    let fair_price = (intrinsic_value > 0.0 && shares > 0.0).then(|| intrinsic_value / shares);
    let yield_ = fcf_yield(fcf, market_cap);

    Ok(ValuationResult {
        ticker: snapshot.ticker.clone(),
        intrinsic_value,
        fair_price,
        upside: upside(intrinsic_value, market_cap),
        fcf_yield: yield_,
        payback_years: payback_years(market_cap, fcf),
        score: weights.score(
            yield_,
            snapshot.return_on_equity.unwrap_or(0.0),
            snapshot.dividend_yield.unwrap_or(0.0),
        ),
        growth_rate,
        growth_source,
        discount_rate: params.discount_rate,
        correction_factor,
        free_cash_flow: fcf,
        status: fair_price.map(|fair| ValuationStatus::classify(snapshot.price, fair)),
    })
}

fn finite(field: &'static str, value: f64) -> Result<(), ValuationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValuationError::NonFiniteInput { field })
    }
}

fn above_total_loss(field: &'static str, value: f64) -> Result<(), ValuationError> {
    if value > -1.0 {
        Ok(())
    } else {
        Err(ValuationError::RateOutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderId, SnapshotDraft, UtcDateTime};

    fn snapshot(ticker: &str, price: f64, market_cap: f64, fcf: Option<f64>) -> FinancialSnapshot {
        SnapshotDraft {
            price: Some(price),
            market_cap: Some(market_cap),
            free_cash_flow: fcf,
            return_on_equity: Some(0.2),
            dividend_yield: Some(0.01),
            ..SnapshotDraft::default()
        }
        .finish(Ticker::from(ticker), ProviderId::Yahoo, UtcDateTime::now())
        .expect("valid snapshot")
    }

    #[test]
    fn dcf_matches_hand_computation() {
        let value = compute_dcf(100.0, 0.05, 0.10, 0.03, 2).expect("valid inputs");

        let stage_one = 105.0 / 1.1 + 110.25 / 1.21;
        let terminal = 110.25 * 1.03 / 0.07 / 1.21;
        assert!((value - (stage_one + terminal)).abs() < 1e-9);
    }

    #[test]
    fn non_positive_cash_flow_is_worth_zero() {
        assert_eq!(compute_dcf(0.0, 0.25, 0.12, 0.03, 10), Ok(0.0));
        assert_eq!(compute_dcf(-50.0, 0.02, 0.08, 0.03, 10), Ok(0.0));
    }

    #[test]
    fn discount_at_or_below_terminal_is_rejected() {
        assert!(matches!(
            compute_dcf(100.0, 0.05, 0.03, 0.03, 10),
            Err(ValuationError::DiscountNotAboveTerminal { .. })
        ));
        assert!(matches!(
            compute_dcf(100.0, 0.05, f64::NAN, 0.03, 10),
            Err(ValuationError::NonFiniteInput { field: "discount_rate" })
        ));
    }

    #[test]
    fn growth_above_discount_stays_finite() {
        let value = compute_dcf(100.0, 0.10, 0.09, 0.03, 10).expect("allowed");
        assert!(value.is_finite() && value > 0.0);
    }

    #[test]
    fn zero_market_cap_yields_zero_ratios() {
        assert_eq!(upside(1_000.0, 0.0), 0.0);
        assert_eq!(fcf_yield(50.0, 0.0), 0.0);
        assert_eq!(payback_years(0.0, 50.0), None);
        assert_eq!(payback_years(1_000.0, -5.0), None);
        assert_eq!(payback_years(1_000.0, 50.0), Some(20.0));
    }

    #[test]
    fn growth_selection_prefers_override_then_clamped_hint() {
        let mut snap = snapshot("AAPL", 10.0, 1_000.0, Some(50.0));
        let params = ValuationParameters::default().with_segment(MarketSegment::Technology);

        assert_eq!(
            params.select_growth(&snap),
            Ok((0.12, GrowthSource::SegmentDefault))
        );

        snap.growth_estimate = Some(0.60);
        assert_eq!(
            params.select_growth(&snap),
            Ok((HINT_GROWTH_CAP, GrowthSource::ProviderHint))
        );
        snap.growth_estimate = Some(-0.30);
        assert_eq!(
            params.select_growth(&snap),
            Ok((HINT_GROWTH_FLOOR, GrowthSource::ProviderHint))
        );

        let overridden = params.clone().with_growth_override(Some(-0.10));
        assert_eq!(
            overridden.select_growth(&snap),
            Ok((-0.10, GrowthSource::Override))
        );
        let broken = params.with_growth_override(Some(-1.5));
        assert!(matches!(
            broken.select_growth(&snap),
            Err(ValuationError::RateOutOfRange { .. })
        ));
    }

    #[test]
    fn values_snapshot_with_adr_correction() {
        let params = ValuationParameters::default().with_growth_override(Some(0.05));
        let plain = value_snapshot(
            &snapshot("AAPL", 10.0, 1_000.0, Some(50.0)),
            &params,
            &ScoreWeights::default(),
        )
        .expect("valued");
        let adr = value_snapshot(
            &snapshot("BABA", 10.0, 1_000.0, Some(50.0)),
            &params,
            &ScoreWeights::default(),
        )
        .expect("valued");

        assert_eq!(plain.correction_factor, 1.0);
        assert_eq!(plain.fcf_yield, 0.05);
        assert_eq!(plain.payback_years, Some(20.0));
        assert!((adr.free_cash_flow - 50.0 * currency::CNY_TO_USD).abs() < 1e-12);
        assert!(adr.intrinsic_value < plain.intrinsic_value);

        let fair = plain.fair_price.expect("positive intrinsic value");
        assert!((fair - plain.intrinsic_value / 100.0).abs() < 1e-9);
        assert_eq!(
            plain.status,
            Some(ValuationStatus::classify(10.0, fair))
        );
        let expected_score = 0.5 * 5.0 + 0.3 * 20.0 + 0.2 * 1.0;
        assert!((plain.score - expected_score).abs() < 1e-9);
    }

    #[test]
    fn missing_and_negative_cash_flow() {
        let weights = ScoreWeights::default();
        let params = ValuationParameters::default();

        let missing = value_snapshot(&snapshot("AAPL", 10.0, 1_000.0, None), &params, &weights);
        assert!(matches!(missing, Err(ValuationError::MissingInput { .. })));

        let negative = snapshot("AAPL", 10.0, 1_000.0, Some(-20.0));
        let lenient = value_snapshot(&negative, &params, &weights).expect("valued at zero");
        assert_eq!(lenient.intrinsic_value, 0.0);
        assert_eq!(lenient.fair_price, None);
        assert_eq!(lenient.status, None);
        assert_eq!(lenient.payback_years, None);

        let strict = params.requiring_positive_cash_flow(true);
        assert!(matches!(
            value_snapshot(&negative, &strict, &weights),
            Err(ValuationError::NonPositiveCashFlow { .. })
        ));
    }

    #[test]
    fn status_band_is_fifteen_percent() {
        assert_eq!(ValuationStatus::classify(84.0, 100.0), ValuationStatus::Undervalued);
        assert_eq!(ValuationStatus::classify(90.0, 100.0), ValuationStatus::Fair);
        assert_eq!(ValuationStatus::classify(114.0, 100.0), ValuationStatus::Fair);
        assert_eq!(ValuationStatus::classify(116.0, 100.0), ValuationStatus::Overvalued);
    }

    #[test]
    fn parses_segments() {
        assert_eq!("tech".parse::<MarketSegment>(), Ok(MarketSegment::Technology));
        assert_eq!(
            "value-dividend".parse::<MarketSegment>(),
            Ok(MarketSegment::ValueDividend)
        );
        assert!("crypto".parse::<MarketSegment>().is_err());
    }
}
