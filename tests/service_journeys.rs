//! End-to-end journeys through the service facade: deep dive, screening,
//! caching and peer groups.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fundex_core::table::PEER_COLUMNS;
use fundex_core::{
    CacheMode, Column, CoreError, EngineConfig, EnvelopeError, FinancialSnapshot, FundamentalsProvider,
    HealthStatus, LocalizedTable, Locale, MarketClass, PeerGroupCache, ProviderError, ProviderId,
    ResolutionCascade, ScreenFilters, ScreenTable, SnapshotDraft, Ticker, UtcDateTime,
    ValuationParameters, ValuationService,
};

/// Serves synthetic snapshots and counts calls. Tickers starting with
/// `NOFCF` come back without free cash flow; tickers starting with `GONE`
/// are unknown. The first `stalls` calls hang for two seconds.
#[derive(Default)]
struct Counting {
    calls: AtomicU32,
    stalls: AtomicU32,
}

impl Counting {
    fn stalling(stalls: u32) -> Self {
        Self {
            stalls: AtomicU32::new(stalls),
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FundamentalsProvider for Counting {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn supports(&self, _market: MarketClass) -> bool {
        true
    }

    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
    ) -> Pin<Box<dyn Future<Output = Result<FinancialSnapshot, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stalled = self
                .stalls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if stalled {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            if ticker.as_str().starts_with("GONE") {
                return Err(ProviderError::missing_data("unknown symbol"));
            }
            let weight = ticker.as_str().len() as f64;
            let free_cash_flow =
                (!ticker.as_str().starts_with("NOFCF")).then_some(1.0e8 * weight);
            SnapshotDraft {
                name: Some(format!("{ticker} Corp")),
                price: Some(10.0),
                market_cap: Some(1.0e10),
                free_cash_flow,
                return_on_equity: Some(0.02 * weight),
                net_margin: Some(0.1),
                ..SnapshotDraft::default()
            }
            .finish(ticker.clone(), ProviderId::Yahoo, UtcDateTime::now())
            .map_err(ProviderError::from)
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async { HealthStatus::healthy() })
    }
}

fn counting_service() -> (ValuationService, Arc<Counting>) {
    service_over(Counting::default())
}

fn service_over(provider: Counting) -> (ValuationService, Arc<Counting>) {
    let provider = Arc::new(provider);
    let cascade = ResolutionCascade::new(vec![provider.clone() as Arc<dyn FundamentalsProvider>]);
    let service = ValuationService::new(Arc::new(cascade), PeerGroupCache::new());
    (service, provider)
}

fn mock_service() -> ValuationService {
    ValuationService::from_config(&EngineConfig::mock(), PeerGroupCache::new())
}

// =============================================================================
// Deep dive
// =============================================================================

#[tokio::test]
async fn when_a_known_name_is_entered_then_the_deep_dive_covers_valuation_and_trend() {
    let dive = mock_service()
        .deep_dive("腾讯控股", &ValuationParameters::default())
        .await
        .expect("mock resolves");

    let snapshot = &dive.resolved.snapshot;
    assert_eq!(snapshot.ticker.as_str(), "0700.HK");
    let valuation = dive.valuation.as_ref().expect("mock snapshots carry fcf");
    assert_eq!(valuation.correction_factor, fundex_core::currency::CNY_TO_HKD);
    assert_eq!(dive.status, valuation.status);
    assert!(dive.trend.is_some_and(|trend| trend.score <= 100));
    assert!(dive.daily_change.is_some());
    assert_eq!(dive.trailing_pe, snapshot.trailing_pe);
    assert!(dive.trailing_pe.is_some_and(|pe| pe > 0.0));
    assert_eq!(dive.history().len(), 5);
    assert!(dive.grid.support < dive.grid.base && dive.grid.base < dive.grid.resistance);
}

#[tokio::test]
async fn when_a_snapshot_cannot_be_valued_then_the_deep_dive_still_returns_it() {
    let (service, _) = counting_service();
    let dive = service
        .deep_dive("NOFCF1", &ValuationParameters::default())
        .await
        .expect("resolves without valuation");

    assert!(dive.valuation.is_none());
    assert!(dive
        .valuation_error
        .as_deref()
        .is_some_and(|reason| reason.contains("free_cash_flow")));
    assert_eq!(dive.status, None);
}

#[tokio::test]
async fn when_nothing_resolves_then_the_deep_dive_fails_with_every_attempt() {
    let (service, _) = counting_service();
    let error = service
        .deep_dive("GONE", &ValuationParameters::default())
        .await
        .expect_err("unknown symbol");

    let CoreError::Unresolved(unresolved) = error else {
        panic!("expected an unresolved symbol error");
    };
    let errors = EnvelopeError::from_unresolved(&unresolved);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].code, "provider.missing_data");
    assert_eq!(errors[0].source, Some(ProviderId::Yahoo));
    // only yahoo is registered
    assert_eq!(errors[1].code, "provider.adapter_not_registered");
}

// =============================================================================
// Screening and caching
// =============================================================================

#[tokio::test]
async fn when_the_same_screen_runs_twice_within_ttl_then_providers_are_called_once() {
    let (service, provider) = counting_service();
    let params = ValuationParameters::default();
    let filters = ScreenFilters::default();

    let first = service
        .screen(&["AAPL", "MSFT", "NVDA"], &params, &filters)
        .await
        .expect("valid params");
    let second = service
        .screen(&["nvda", "AAPL", "MSFT", "MSFT"], &params, &filters)
        .await
        .expect("valid params");

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(provider.calls(), 3);
    assert_eq!(first.value, second.value);
}

#[tokio::test]
async fn when_caching_is_disabled_then_every_screen_fetches() {
    let (service, provider) = counting_service();
    let service = service.with_ttls(Duration::ZERO, Duration::ZERO);
    let params = ValuationParameters::default();

    for _ in 0..2 {
        let table = service
            .screen(&["AAPL"], &params, &ScreenFilters::default())
            .await
            .expect("valid params");
        assert!(!table.cache_hit);
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn when_a_screen_hits_the_batch_deadline_then_the_partial_batch_is_not_cached() {
    let (service, provider) = service_over(Counting::stalling(2));
    let service = service.with_batch_deadline(Some(Duration::from_millis(50)));
    let params = ValuationParameters::default();
    let filters = ScreenFilters::default();

    let first = service
        .screen(&["AAPL", "MSFT"], &params, &filters)
        .await
        .expect("valid params");
    assert!(!first.cache_hit);
    assert!(first.value.rows.is_empty());
    assert_eq!(first.value.omitted.len(), 2);
    let calls_after_first = provider.calls();

    let second = service
        .screen(&["AAPL", "MSFT"], &params, &filters)
        .await
        .expect("valid params");
    assert!(!second.cache_hit);
    assert_eq!(second.value.rows.len(), 2);
    assert!(second.value.omitted.is_empty());
    assert!(provider.calls() > calls_after_first);

    let third = service
        .screen(&["MSFT", "AAPL"], &params, &filters)
        .await
        .expect("valid params");
    assert!(third.cache_hit);
}

#[tokio::test]
async fn when_every_symbol_is_omitted_then_the_screen_is_fetched_again() {
    let (service, provider) = counting_service();
    let params = ValuationParameters::default();

    for _ in 0..2 {
        let table = service
            .screen(&["GONE1", "GONE2"], &params, &ScreenFilters::default())
            .await
            .expect("valid params");
        assert!(!table.cache_hit);
        assert_eq!(table.value.omitted.len(), 2);
    }
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn when_the_cache_is_refreshed_then_every_screen_fetches() {
    let (service, provider) = counting_service();
    let refreshing = service.with_cache_mode(CacheMode::Refresh);
    let params = ValuationParameters::default();
    let filters = ScreenFilters::default();

    for _ in 0..2 {
        let table = refreshing
            .screen(&["AAPL"], &params, &filters)
            .await
            .expect("valid params");
        assert!(!table.cache_hit);
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn when_screening_then_rows_are_ranked_and_failures_are_classified() {
    let (service, _) = counting_service();
    let table = service
        .screen(
            &["Q1", "Q1234", "Q12", "NOFCF1", "GONE1"],
            &ValuationParameters::default(),
            &ScreenFilters::default(),
        )
        .await
        .expect("valid params")
        .value;

    let ranked = table
        .rows
        .iter()
        .map(|row| row.ticker.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ranked, vec!["Q1234", "Q12", "Q1"]);
    assert!(table
        .rows
        .windows(2)
        .all(|pair| pair[0].valuation.score >= pair[1].valuation.score));

    assert_eq!(table.skipped.len(), 1);
    assert_eq!(table.skipped[0].ticker.as_str(), "NOFCF1");
    assert_eq!(table.omitted, vec![Ticker::from("GONE1")]);
}

#[tokio::test]
async fn when_thresholds_are_set_then_rows_below_them_are_filtered_out() {
    let (service, _) = counting_service();
    let filters = ScreenFilters {
        min_roe: Some(0.07),
        ..ScreenFilters::default()
    };
    let table = service
        .screen(&["Q1", "Q123", "Q1234"], &ValuationParameters::default(), &filters)
        .await
        .expect("valid params")
        .value;

    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.filtered_out, 1);
    assert!(table
        .rows
        .iter()
        .all(|row| row.return_on_equity.is_some_and(|roe| roe >= 0.07)));
}

#[tokio::test]
async fn when_screen_parameters_are_malformed_then_nothing_is_fetched() {
    let (service, provider) = counting_service();
    let params = ValuationParameters::default()
        .with_discount_rate(0.03)
        .with_terminal_rate(0.03);

    let result = service
        .screen(&["AAPL"], &params, &ScreenFilters::default())
        .await;

    assert!(result.is_err());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn when_the_screen_is_localized_then_headers_change_but_keys_do_not() {
    let table = mock_service()
        .screen(
            &["AAPL", "MSFT"],
            &ValuationParameters::default(),
            &ScreenFilters::default(),
        )
        .await
        .expect("valid params")
        .value;

    let en = table.localized(Locale::En);
    let zh = table.localized(Locale::Zh);
    assert_eq!(en.columns, zh.columns);
    let status = ScreenTable::COLUMNS
        .iter()
        .position(|column| *column == Column::Status)
        .expect("status column");
    for (en_row, zh_row) in en.rows.iter().zip(&zh.rows) {
        for (index, (en_cell, zh_cell)) in en_row.iter().zip(zh_row).enumerate() {
            if index != status {
                assert_eq!(en_cell, zh_cell);
            }
        }
    }
    let fcf = ScreenTable::COLUMNS
        .iter()
        .position(|column| *column == Column::FcfYieldPct)
        .expect("fcf column");
    assert_eq!(en.headers[fcf], "FCF Yield%");
    assert_eq!(zh.headers[fcf], "FCF收益率%");

    let json = serde_json::to_value(&zh).expect("serializable");
    assert_eq!(json["columns"][fcf], "fcf_yield_pct");
}

// =============================================================================
// Peer groups
// =============================================================================

#[tokio::test]
async fn when_a_peer_group_is_refreshed_then_reads_are_served_without_fetching() {
    let (service, provider) = counting_service();

    assert_eq!(service.peer_group("us-dividend").await, Ok(None));
    assert_eq!(provider.calls(), 0);

    let refreshed = service
        .refresh_peer_group("us-dividend")
        .await
        .expect("known group");
    let members = refreshed.rows.len() as u32;
    assert_eq!(provider.calls(), members);

    for _ in 0..3 {
        let cached = service
            .peer_group("US-DIVIDEND")
            .await
            .expect("known group")
            .expect("refreshed before");
        assert!(Arc::ptr_eq(&cached, &refreshed));
    }
    assert_eq!(provider.calls(), members);

    let table = LocalizedTable::build(&PEER_COLUMNS, &refreshed.rows, Locale::Zh);
    assert_eq!(table.rows.len(), refreshed.rows.len());
}

#[tokio::test]
async fn when_the_peer_cache_is_shared_then_both_services_see_the_refresh() {
    let peers = PeerGroupCache::new();
    let first = ValuationService::new(Arc::new(ResolutionCascade::default()), peers.clone());
    let second = ValuationService::new(Arc::new(ResolutionCascade::default()), peers);

    first
        .refresh_peer_group("hk-internet")
        .await
        .expect("known group");
    let seen = second
        .peer_group("hk-internet")
        .await
        .expect("known group")
        .expect("shared cache");
    assert_eq!(seen.group, "hk-internet");
    assert!(seen.omitted.is_empty());
}

#[tokio::test]
async fn when_an_unknown_group_is_refreshed_then_it_is_a_validation_error() {
    let (service, provider) = counting_service();
    assert!(service.refresh_peer_group("no-such-group").await.is_err());
    assert_eq!(provider.calls(), 0);
    assert!(!service.groups().is_empty());
}
