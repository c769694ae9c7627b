use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{seeded_snapshot, text_field, Upstream};
use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{FundamentalsProvider, HealthStatus, ProviderError};
use crate::provider_policy::ProviderPolicy;
use crate::reconcile::{self, FieldRule, LineItem};
use crate::throttling::ThrottlingQueue;
use crate::{
    AnnualRecord, FinancialSnapshot, MarketClass, ProviderId, SnapshotDraft, Ticker, UtcDateTime,
    SHANGHAI_SUFFIX, SHENZHEN_SUFFIX,
};

pub const QUERY_URL: &str = "https://www.alphavantage.co/query";

/// Statement functions fetched after the required quote and overview.
const STATEMENT_FUNCTIONS: [&str; 3] = ["INCOME_STATEMENT", "BALANCE_SHEET", "CASH_FLOW"];

/// No growth estimate: `QuarterlyEarningsGrowthYOY` is reported growth, not a
/// consensus forecast.
const ALPHAVANTAGE_FIELDS: &[FieldRule] = &[
    FieldRule::new(LineItem::Price, &["05. price", "price"]),
    FieldRule::new(LineItem::MarketCap, &["MarketCapitalization"]),
    FieldRule::new(LineItem::ReturnOnEquity, &["ReturnOnEquityTTM"]),
    FieldRule::new(LineItem::NetMargin, &["ProfitMargin"]),
    FieldRule::new(LineItem::DividendYield, &["DividendYield"]),
    FieldRule::new(LineItem::EarningsPerShare, &["EPS"]),
    FieldRule::new(LineItem::TrailingPe, &["PERatio", "TrailingPE"]),
    FieldRule::new(LineItem::Revenue, &["totalRevenue"]),
    FieldRule::new(LineItem::NetIncome, &["netIncome"]),
    FieldRule::new(
        LineItem::Receivables,
        &["currentNetReceivables", "netReceivables"],
    ),
    FieldRule::new(LineItem::OperatingCashFlow, &["operatingCashflow"]),
    FieldRule::new(LineItem::CapitalExpenditure, &["capitalExpenditures"]),
];

/// General-market provider, throttled to the free-tier quota.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    upstream: Upstream,
    query_url: String,
    api_key: String,
    throttling: ThrottlingQueue,
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient), "demo")
    }
}

impl AlphaVantageAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Alphavantage, http_client),
            query_url: QUERY_URL.to_owned(),
            api_key: api_key.into(),
            throttling: ThrottlingQueue::from_policy(&ProviderPolicy::alphavantage_default()),
        }
    }

    /// Points the adapter at another endpoint, e.g. a regional mirror.
    pub fn with_query_url(mut self, query_url: impl Into<String>) -> Self {
        self.query_url = query_url.into();
        self
    }

    pub fn with_policy(mut self, policy: &ProviderPolicy) -> Self {
        self.throttling = ThrottlingQueue::from_policy(policy);
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.upstream.set_circuit_breaker(circuit_breaker);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.upstream.set_timeout_ms(timeout_ms);
        self
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value, ProviderError> {
        if let Err(wait) = self.throttling.acquire() {
            return Err(ProviderError::rate_limited(format!(
                "alphavantage quota exhausted; next slot in {} ms",
                wait.as_millis()
            )));
        }

        let body = self
            .upstream
            .get_json(
                HttpRequest::get(self.query_url.as_str())
                    .with_query("function", function)
                    .with_query("symbol", symbol)
                    .with_query("apikey", self.api_key.as_str()),
            )
            .await?;
        check_service_message(&body)?;
        Ok(body)
    }

    async fn fetch_real(&self, ticker: &Ticker) -> Result<FinancialSnapshot, ProviderError> {
        let symbol = provider_symbol(ticker);

        let quote = self.query("GLOBAL_QUOTE", &symbol).await?;
        let overview = self.query("OVERVIEW", &symbol).await?;
        let mut draft = parse_core(&quote, &overview)?;

        let mut statements = Vec::with_capacity(STATEMENT_FUNCTIONS.len());
        for function in STATEMENT_FUNCTIONS {
            match self.query(function, &symbol).await {
                Ok(body) => statements.push(body),
                Err(error) => {
                    debug!(ticker = %ticker, function, error = %error, "alphavantage statement skipped");
                }
            }
        }
        merge_statements(&mut draft, &statements);

        Ok(draft.finish(ticker.clone(), ProviderId::Alphavantage, UtcDateTime::now())?)
    }
}

impl FundamentalsProvider for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn supports(&self, _market: MarketClass) -> bool {
        true
    }

    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
    ) -> Pin<Box<dyn Future<Output = Result<FinancialSnapshot, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            if self.upstream.is_real() {
                self.fetch_real(ticker).await
            } else {
                seeded_snapshot(ticker, ProviderId::Alphavantage)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Alpha Vantage spells the mainland exchanges `.SHH` and `.SHZ`.
fn provider_symbol(ticker: &Ticker) -> String {
    match ticker.suffix() {
        Some(SHANGHAI_SUFFIX) => format!("{}.SHH", ticker.code()),
        Some(SHENZHEN_SUFFIX) => format!("{}.SHZ", ticker.code()),
        _ => ticker.as_str().to_owned(),
    }
}

/// The API answers 200 for quota and key problems; the body says why.
fn check_service_message(body: &Value) -> Result<(), ProviderError> {
    let Some(object) = body.as_object() else {
        return Err(ProviderError::internal("alphavantage returned a non-object body"));
    };
    if let Some(note) = text_field(object, &["Note", "Information"]) {
        return Err(ProviderError::rate_limited(format!("alphavantage: {note}")));
    }
    if let Some(message) = text_field(object, &["Error Message"]) {
        return Err(ProviderError::invalid_request(format!(
            "alphavantage: {message}"
        )));
    }
    Ok(())
}

fn parse_core(quote: &Value, overview: &Value) -> Result<SnapshotDraft, ProviderError> {
    let quote = quote
        .get("Global Quote")
        .and_then(Value::as_object)
        .filter(|fields| !fields.is_empty())
        .ok_or_else(|| ProviderError::missing_data("alphavantage returned an empty quote"))?;
    let overview = overview
        .as_object()
        .filter(|fields| !fields.is_empty())
        .ok_or_else(|| ProviderError::missing_data("alphavantage returned an empty overview"))?;

    let mut draft = SnapshotDraft {
        name: text_field(overview, &["Name"]),
        currency: text_field(overview, &["Currency"]),
        ..SnapshotDraft::default()
    };
    reconcile::merge_into_draft(ALPHAVANTAGE_FIELDS, quote, &mut draft);
    reconcile::merge_into_draft(ALPHAVANTAGE_FIELDS, overview, &mut draft);
    draft.gross_margin = gross_margin(overview);
    Ok(draft)
}

fn gross_margin(overview: &Map<String, Value>) -> Option<f64> {
    let gross_profit = reconcile::pick(overview, &["GrossProfitTTM"])?;
    let revenue = reconcile::pick(overview, &["RevenueTTM"]).filter(|r| *r > 0.0)?;
    Some(gross_profit / revenue)
}

/// Annual reports keyed by fiscal year; the newest cash-flow report also
/// fills the snapshot's cash figures.
fn merge_statements(draft: &mut SnapshotDraft, statements: &[Value]) {
    let mut years: BTreeMap<i32, AnnualRecord> = BTreeMap::new();
    let mut latest: Option<(i32, &Map<String, Value>)> = None;

    for statement in statements {
        let reports = statement
            .get("annualReports")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for report in reports.iter().filter_map(Value::as_object) {
            let Some(year) = text_field(report, &["fiscalDateEnding"])
                .as_deref()
                .and_then(reconcile::fiscal_year)
            else {
                continue;
            };
            let annual = years.entry(year).or_insert_with(|| AnnualRecord::new(year));
            reconcile::merge_into_annual(ALPHAVANTAGE_FIELDS, report, annual);
            if report.contains_key("capitalExpenditures")
                && latest.map_or(true, |(newest, _)| year > newest)
            {
                latest = Some((year, report));
            }
        }
    }

    if let Some((_, report)) = latest {
        reconcile::merge_into_draft(ALPHAVANTAGE_FIELDS, report, draft);
    }
    draft.history = years.into_values().collect();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::http_client::StaticHttpClient;
    use crate::provider::ProviderErrorKind;

    const QUOTE: &str = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "168.2000", "07. latest trading day": "2024-03-01"}}"#;
    const OVERVIEW: &str = r#"{
        "Symbol": "IBM", "Name": "International Business Machines", "Currency": "USD",
        "MarketCapitalization": "154000000000", "ReturnOnEquityTTM": "0.338",
        "ProfitMargin": "0.121", "DividendYield": "0.0395", "QuarterlyEarningsGrowthYOY": "0.045",
        "EPS": "8.14", "PERatio": "20.66",
        "GrossProfitTTM": "32688000000", "RevenueTTM": "61860000000"
    }"#;
    const CASH_FLOW: &str = r#"{"symbol": "IBM", "annualReports": [
        {"fiscalDateEnding": "2023-12-31", "operatingCashflow": "13931000000", "capitalExpenditures": "1246000000"},
        {"fiscalDateEnding": "2022-12-31", "operatingCashflow": "10435000000", "capitalExpenditures": "1346000000"}
    ]}"#;
    const INCOME: &str = r#"{"symbol": "IBM", "annualReports": [
        {"fiscalDateEnding": "2023-12-31", "totalRevenue": "61860000000", "netIncome": "7502000000"}
    ]}"#;

    fn client() -> StaticHttpClient {
        StaticHttpClient::new()
            .with_json("function=GLOBAL_QUOTE", QUOTE)
            .with_json("function=OVERVIEW", OVERVIEW)
            .with_json("function=CASH_FLOW", CASH_FLOW)
            .with_json("function=INCOME_STATEMENT", INCOME)
            .with_json("function=BALANCE_SHEET", r#"{"symbol": "IBM", "annualReports": []}"#)
    }

    fn unthrottled(client: Arc<StaticHttpClient>) -> AlphaVantageAdapter {
        AlphaVantageAdapter::with_http_client(client, "test-key").with_policy(&ProviderPolicy {
            provider_id: ProviderId::Alphavantage,
            quota_window: Duration::from_secs(1),
            quota_limit: 100,
        })
    }

    #[test]
    fn maps_mainland_suffixes() {
        assert_eq!(provider_symbol(&Ticker::from("600519.SS")), "600519.SHH");
        assert_eq!(provider_symbol(&Ticker::from("000001.SZ")), "000001.SHZ");
        assert_eq!(provider_symbol(&Ticker::from("IBM")), "IBM");
    }

    #[tokio::test]
    async fn maps_overview_quote_and_statements() {
        let client = Arc::new(client());
        let adapter = unthrottled(client.clone());

        let snapshot = adapter
            .fetch(&Ticker::from("IBM"))
            .await
            .expect("snapshot should resolve");

        assert_eq!(snapshot.name, "International Business Machines");
        assert_eq!(snapshot.price, 168.2);
        assert_eq!(snapshot.market_cap, 1.54e11);
        assert_eq!(snapshot.dividend_yield, Some(0.0395));
        // reported quarterly growth is not a forecast
        assert_eq!(snapshot.growth_estimate, None);
        assert_eq!(snapshot.earnings_per_share, Some(8.14));
        assert_eq!(snapshot.trailing_pe, Some(20.66));
        let gross = snapshot.gross_margin.expect("derived gross margin");
        assert!((gross - 32_688.0 / 61_860.0).abs() < 1e-12);
        assert_eq!(snapshot.free_cash_flow, Some(13_931_000_000.0 - 1_246_000_000.0));
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.history[1].net_income, Some(7.502e9));

        assert!(client
            .requests()
            .iter()
            .all(|url| url.contains("apikey=test-key")));
    }

    #[tokio::test]
    async fn quota_note_is_rate_limited() {
        let client = Arc::new(StaticHttpClient::new().with_json(
            "alphavantage.co",
            r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
        ));
        let adapter = unthrottled(client);

        let error = adapter
            .fetch(&Ticker::from("IBM"))
            .await
            .expect_err("quota note");
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
        assert!(error.retryable());
    }

    #[tokio::test]
    async fn client_side_quota_fails_fast_without_calling_upstream() {
        let client = Arc::new(client());
        let adapter = AlphaVantageAdapter::with_http_client(client.clone(), "test-key")
            .with_policy(&ProviderPolicy {
                provider_id: ProviderId::Alphavantage,
                quota_window: Duration::from_secs(60),
                quota_limit: 1,
            });

        let error = adapter
            .fetch(&Ticker::from("IBM"))
            .await
            .expect_err("second required call is over budget");
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_quote_is_missing_data() {
        let client = Arc::new(
            StaticHttpClient::new()
                .with_json("function=GLOBAL_QUOTE", r#"{"Global Quote": {}}"#)
                .with_json("function=OVERVIEW", "{}"),
        );
        let adapter = unthrottled(client);

        let error = adapter
            .fetch(&Ticker::from("NOPE"))
            .await
            .expect_err("unknown symbol");
        assert_eq!(error.kind(), ProviderErrorKind::MissingData);
    }
}
