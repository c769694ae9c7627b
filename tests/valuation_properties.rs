//! Properties of the DCF model, the derived ratios and the ADR correction.

use fundex_core::valuation::{fcf_yield, payback_years, upside, FAIR_BAND};
use fundex_core::{
    compute_dcf, currency, value_snapshot, FinancialSnapshot, GrowthSource, MarketSegment,
    ProviderId, ScoreWeights, SnapshotDraft, Ticker, UtcDateTime, ValuationError,
    ValuationParameters, ValuationStatus,
};

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

// =============================================================================
// compute_dcf
// =============================================================================

#[test]
fn when_cash_flow_is_not_positive_then_intrinsic_value_is_zero() {
    for fcf in [0.0, -1.0, -1.0e9] {
        assert_eq!(compute_dcf(fcf, 0.08, 0.10, 0.03, 10), Ok(0.0), "fcf {fcf}");
    }
}

#[test]
fn when_cash_flow_grows_then_intrinsic_value_grows_proportionally() {
    let base = compute_dcf(100.0, 0.08, 0.10, 0.03, 10).expect("valid");
    let double = compute_dcf(200.0, 0.08, 0.10, 0.03, 10).expect("valid");
    assert!(base > 0.0);
    assert!((double - 2.0 * base).abs() < 1e-6 * base);
}

#[test]
fn when_growth_rises_then_intrinsic_value_does_not_fall() {
    let mut previous = 0.0;
    for step in 0..=20 {
        let growth = -0.05 + f64::from(step) * 0.01;
        let value = compute_dcf(100.0, growth, 0.10, 0.03, 10).expect("valid");
        assert!(value >= previous, "growth {growth}: {value} < {previous}");
        previous = value;
    }
}

#[test]
fn when_discount_rises_then_intrinsic_value_does_not_rise() {
    let mut previous = f64::INFINITY;
    for step in 0..=20 {
        let discount = 0.04 + f64::from(step) * 0.01;
        let value = compute_dcf(100.0, 0.08, discount, 0.03, 10).expect("valid");
        assert!(value <= previous, "discount {discount}: {value} > {previous}");
        previous = value;
    }
}

#[test]
fn when_growth_exceeds_discount_then_the_result_is_still_finite_and_positive() {
    let value = compute_dcf(100.0, 0.10, 0.09, 0.03, 10).expect("valid");
    assert!(value.is_finite());
    assert!(value > 0.0);
}

#[test]
fn when_discount_does_not_exceed_terminal_then_the_inputs_are_rejected() {
    for discount in [0.03, 0.02, -0.1] {
        assert!(
            matches!(
                compute_dcf(100.0, 0.05, discount, 0.03, 10),
                Err(ValuationError::DiscountNotAboveTerminal { .. })
            ),
            "discount {discount}"
        );
    }
}

#[test]
fn when_an_input_is_not_finite_then_the_inputs_are_rejected() {
    assert!(matches!(
        compute_dcf(f64::NAN, 0.05, 0.10, 0.03, 10),
        Err(ValuationError::NonFiniteInput { .. })
    ));
    assert!(matches!(
        compute_dcf(100.0, f64::INFINITY, 0.10, 0.03, 10),
        Err(ValuationError::NonFiniteInput { .. })
    ));
}

#[test]
fn when_horizon_is_zero_then_only_the_terminal_value_remains() {
    let value = compute_dcf(100.0, 0.05, 0.10, 0.03, 0).expect("valid");
    let expected = 100.0 * 1.03 / (0.10 - 0.03);
    assert!((value - expected).abs() < 1e-6);
}

// =============================================================================
// Ratios
// =============================================================================

#[test]
fn when_market_cap_is_zero_then_every_ratio_is_zero_or_absent() {
    assert_eq!(upside(1.0e9, 0.0), 0.0);
    assert_eq!(fcf_yield(1.0e8, 0.0), 0.0);
    assert_eq!(payback_years(0.0, 1.0e8), None);
}

#[test]
fn when_cash_flow_is_negative_then_payback_is_absent_not_negative() {
    assert_eq!(payback_years(1.0e9, -1.0e8), None);
    assert_eq!(payback_years(1.0e9, 0.0), None);
    assert_eq!(payback_years(1.0e9, 1.0e8), Some(10.0));
}

#[test]
fn when_intrinsic_value_doubles_market_cap_then_upside_is_one() {
    assert!((upside(2.0e9, 1.0e9) - 1.0).abs() < 1e-12);
    assert!((fcf_yield(5.0e7, 1.0e9) - 0.05).abs() < 1e-12);
}

// =============================================================================
// value_snapshot
// =============================================================================

#[test]
fn when_ticker_is_an_adr_then_cash_flow_is_corrected_before_valuation() {
    let plain = snapshot("AAPL", 100.0, 1.0e10, Some(1.0e9));
    let adr = snapshot("BABA", 100.0, 1.0e10, Some(1.0e9));
    let params = ValuationParameters::default();
    let weights = ScoreWeights::default();

    let plain = value_snapshot(&plain, &params, &weights).expect("valued");
    let adr = value_snapshot(&adr, &params, &weights).expect("valued");

    assert_eq!(adr.correction_factor, currency::CNY_TO_USD);
    assert!((adr.free_cash_flow - 1.0e9 * currency::CNY_TO_USD).abs() < 1e-3);
    assert!((adr.fcf_yield - plain.fcf_yield * currency::CNY_TO_USD).abs() < 1e-12);
    assert!(
        (adr.intrinsic_value - plain.intrinsic_value * currency::CNY_TO_USD).abs()
            < 1e-6 * plain.intrinsic_value
    );
}

#[test]
fn when_free_cash_flow_is_missing_then_valuation_reports_it() {
    let missing = snapshot("AAPL", 100.0, 1.0e10, None);
    let error = value_snapshot(&missing, &ValuationParameters::default(), &ScoreWeights::default())
        .expect_err("nothing to value");
    assert!(matches!(
        error,
        ValuationError::MissingInput {
            field: "free_cash_flow",
            ..
        }
    ));
}

#[test]
fn when_cash_flow_is_negative_then_strict_mode_rejects_and_lenient_mode_values_at_zero() {
    let burning = snapshot("AAPL", 100.0, 1.0e10, Some(-5.0e8));

    let lenient = value_snapshot(&burning, &ValuationParameters::default(), &ScoreWeights::default())
        .expect("lenient mode values");
    assert_eq!(lenient.intrinsic_value, 0.0);
    assert_eq!(lenient.fair_price, None);
    assert_eq!(lenient.status, None);
    assert_eq!(lenient.payback_years, None);

    let strict = ValuationParameters::default().requiring_positive_cash_flow(true);
    assert!(matches!(
        value_snapshot(&burning, &strict, &ScoreWeights::default()),
        Err(ValuationError::NonPositiveCashFlow { .. })
    ));
}

#[test]
fn when_growth_is_overridden_then_the_override_wins_over_hint_and_segment() {
    let mut hinted = snapshot("MSFT", 100.0, 1.0e10, Some(5.0e8));
    hinted.growth_estimate = Some(0.5);

    let from_hint = value_snapshot(&hinted, &ValuationParameters::default(), &ScoreWeights::default())
        .expect("valued");
    assert_eq!(from_hint.growth_source, GrowthSource::ProviderHint);
    assert_eq!(from_hint.growth_rate, 0.25);

    let overridden = ValuationParameters::default().with_growth_override(Some(0.4));
    let result = value_snapshot(&hinted, &overridden, &ScoreWeights::default()).expect("valued");
    assert_eq!(result.growth_source, GrowthSource::Override);
    assert_eq!(result.growth_rate, 0.4);

    hinted.growth_estimate = None;
    let by_segment = ValuationParameters::default().with_segment(MarketSegment::Technology);
    let result = value_snapshot(&hinted, &by_segment, &ScoreWeights::default()).expect("valued");
    assert_eq!(result.growth_source, GrowthSource::SegmentDefault);
    assert_eq!(result.growth_rate, 0.12);
}

#[test]
fn when_price_sits_inside_the_band_then_status_is_fair() {
    assert_eq!(ValuationStatus::classify(100.0, 100.0), ValuationStatus::Fair);
    assert_eq!(
        ValuationStatus::classify(100.0 * (1.0 - FAIR_BAND) - 0.01, 100.0),
        ValuationStatus::Undervalued
    );
    assert_eq!(
        ValuationStatus::classify(100.0 * (1.0 + FAIR_BAND) + 0.01, 100.0),
        ValuationStatus::Overvalued
    );
}

#[test]
fn when_fair_price_is_derived_then_it_is_value_per_implied_share() {
    let company = snapshot("AAPL", 50.0, 1.0e10, Some(1.0e9));
    let result = value_snapshot(&company, &ValuationParameters::default(), &ScoreWeights::default())
        .expect("valued");
    let shares = 1.0e10 / 50.0;
    let fair = result.fair_price.expect("positive intrinsic value");
    assert!((fair - result.intrinsic_value / shares).abs() < 1e-9 * fair);
}

#[test]
fn when_scoring_then_the_weights_apply_to_percentages() {
    let weights = ScoreWeights::default();
    let score = weights.score(0.05, 0.20, 0.02);
    assert!((score - (0.5 * 5.0 + 0.3 * 20.0 + 0.2 * 2.0)).abs() < 1e-9);
}
