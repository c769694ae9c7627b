use std::sync::Arc;

use fundex_core::{
    AlphaVantageAdapter, EastmoneyAdapter, EnvelopeError, FetchContext, FundamentalsProvider,
    HealthState, HttpClient, HttpResponse, MarketClass, ProviderId, ReqwestHttpClient,
    ResolutionCascade, StaticHttpClient, Ticker, YahooAdapter,
};

struct ProviderCase {
    id: ProviderId,
    source: Arc<dyn FundamentalsProvider>,
    supports_foreign: bool,
}

fn mock_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::Yahoo,
            source: Arc::new(YahooAdapter::default()),
            supports_foreign: true,
        },
        ProviderCase {
            id: ProviderId::Eastmoney,
            source: Arc::new(EastmoneyAdapter::default()),
            supports_foreign: false,
        },
        ProviderCase {
            id: ProviderId::Alphavantage,
            source: Arc::new(AlphaVantageAdapter::default()),
            supports_foreign: true,
        },
    ]
}

fn live_cases(http_client: Arc<dyn HttpClient>) -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::Yahoo,
            source: Arc::new(YahooAdapter::with_http_client(http_client.clone())),
            supports_foreign: true,
        },
        ProviderCase {
            id: ProviderId::Eastmoney,
            source: Arc::new(EastmoneyAdapter::with_http_client(http_client.clone())),
            supports_foreign: false,
        },
        ProviderCase {
            id: ProviderId::Alphavantage,
            source: Arc::new(AlphaVantageAdapter::with_http_client(http_client, "test-key")),
            supports_foreign: true,
        },
    ]
}

#[tokio::test]
async fn every_provider_reports_its_identity_and_market_support() {
    for case in mock_cases() {
        assert_eq!(case.source.id(), case.id, "provider '{}': id", case.id);
        assert!(
            case.source.supports(MarketClass::Domestic),
            "provider '{}': domestic support",
            case.id
        );
        assert_eq!(
            case.source.supports(MarketClass::Foreign),
            case.supports_foreign,
            "provider '{}': foreign support",
            case.id
        );
        assert_eq!(
            case.source.health().await.state,
            HealthState::Healthy,
            "provider '{}': fresh adapter is healthy",
            case.id
        );
    }
}

#[tokio::test]
async fn mock_snapshots_satisfy_the_snapshot_invariants() {
    let ticker = Ticker::from("600519.SS");

    for case in mock_cases() {
        let snapshot = case
            .source
            .fetch(&ticker)
            .await
            .unwrap_or_else(|error| panic!("provider '{}' fetch failed: {error}", case.id));

        assert_eq!(snapshot.ticker, ticker, "provider '{}': ticker", case.id);
        assert_eq!(snapshot.source, case.id, "provider '{}': source", case.id);
        assert!(snapshot.price > 0.0, "provider '{}': price", case.id);
        assert!(snapshot.market_cap > 0.0, "provider '{}': market cap", case.id);
        assert!(snapshot.validate().is_ok(), "provider '{}': validate", case.id);
        assert!(
            snapshot.history.len() <= 5,
            "provider '{}': history bounded",
            case.id
        );
        assert!(
            snapshot
                .history
                .windows(2)
                .all(|pair| pair[0].fiscal_year < pair[1].fiscal_year),
            "provider '{}': history sorted and unique",
            case.id
        );
    }
}

#[tokio::test]
async fn mock_snapshots_are_deterministic() {
    let ticker = Ticker::from("AAPL");
    let adapter = YahooAdapter::default();

    let first = adapter.fetch(&ticker).await.expect("mock fetch");
    let second = adapter.fetch(&ticker).await.expect("mock fetch");
    assert_eq!(first.price, second.price);
    assert_eq!(first.free_cash_flow, second.free_cash_flow);
    assert_eq!(first.history, second.history);
}

#[tokio::test]
async fn upstream_server_errors_surface_as_provider_errors() {
    let http_client: Arc<dyn HttpClient> = Arc::new(
        StaticHttpClient::new().with_route("", HttpResponse::with_status(503, "unavailable")),
    );
    let ticker = Ticker::from("600519.SS");

    for case in live_cases(http_client) {
        let error = case
            .source
            .fetch(&ticker)
            .await
            .expect_err("server errors must not produce a snapshot");
        assert!(
            error.code().starts_with("provider."),
            "provider '{}': code '{}'",
            case.id,
            error.code()
        );
    }
}

#[tokio::test]
async fn malformed_bodies_never_produce_a_snapshot() {
    let http_client: Arc<dyn HttpClient> =
        Arc::new(StaticHttpClient::new().with_json("", "<html>not json</html>"));
    let ticker = Ticker::from("000001.SZ");

    for case in live_cases(http_client) {
        let result = case.source.fetch(&ticker).await;
        assert!(result.is_err(), "provider '{}': malformed body", case.id);
    }
}

#[tokio::test]
async fn transport_failures_keep_the_api_key_out_of_envelope_errors() {
    let http_client = Arc::new(ReqwestHttpClient::new());
    let adapter = AlphaVantageAdapter::with_http_client(http_client, "SECRETKEY123")
        .with_query_url("http://127.0.0.1:9/query")
        .with_timeout_ms(2_000);
    let cascade = ResolutionCascade::new(vec![Arc::new(adapter) as Arc<dyn FundamentalsProvider>]);

    let unresolved = cascade
        .resolve_in_order(
            &Ticker::from("IBM"),
            &[ProviderId::Alphavantage],
            &FetchContext::new(),
        )
        .await
        .expect_err("nothing listens on the discard port");

    assert!(!unresolved.to_string().contains("SECRETKEY123"));
    let errors = EnvelopeError::from_unresolved(&unresolved);
    assert_eq!(errors.len(), 1);
    for error in errors {
        assert!(!error.message.contains("SECRETKEY123"), "{}", error.message);
        assert!(!error.message.contains("apikey"), "{}", error.message);
    }
}
