use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{seeded_snapshot, text_field, Upstream};
use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{FundamentalsProvider, HealthStatus, ProviderError};
use crate::reconcile::{self, FieldRule, LineItem};
use crate::{
    AnnualRecord, FinancialSnapshot, MarketClass, ProviderId, SnapshotDraft, Ticker, UtcDateTime,
    SHANGHAI_SUFFIX, SHENZHEN_SUFFIX,
};

const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const REPORT_URL: &str = "https://datacenter.eastmoney.com/securities/api/data/v1/get";
/// f43 price, f57 code, f58 name, f116 total market cap, f173 ROE, f186 gross
/// margin, f187 net margin.
const QUOTE_FIELDS: &str = "f43,f57,f58,f116,f173,f186,f187";

const EASTMONEY_FIELDS: &[FieldRule] = &[
    FieldRule::new(LineItem::Price, &["f43"]),
    FieldRule::new(LineItem::MarketCap, &["f116"]),
    FieldRule::percent(LineItem::ReturnOnEquity, &["f173", "ROEJQ", "ROEKCJQ"]),
    FieldRule::percent(LineItem::GrossMargin, &["f186", "XSMLL"]),
    FieldRule::percent(LineItem::NetMargin, &["f187", "XSJLL"]),
    FieldRule::new(
        LineItem::Revenue,
        &["TOTALOPERATEREVE", "TOTAL_OPERATE_INCOME"],
    ),
    FieldRule::new(LineItem::NetIncome, &["PARENTNETPROFIT", "NETPROFIT"]),
    FieldRule::new(
        LineItem::Receivables,
        &["ACCOUNTS_RECE", "NOTE_ACCOUNTS_RECE"],
    ),
    FieldRule::new(LineItem::OperatingCashFlow, &["NETCASH_OPERATE"]),
];

/// Domestic-specialized provider for Shanghai and Shenzhen listings.
#[derive(Clone)]
pub struct EastmoneyAdapter {
    upstream: Upstream,
}

impl Default for EastmoneyAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient))
    }
}

impl EastmoneyAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Eastmoney, http_client),
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.upstream.set_circuit_breaker(circuit_breaker);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.upstream.set_timeout_ms(timeout_ms);
        self
    }

    async fn fetch_real(&self, ticker: &Ticker) -> Result<FinancialSnapshot, ProviderError> {
        let secid = secid(ticker)?;
        let quote = self
            .upstream
            .get_json(
                HttpRequest::get(QUOTE_URL)
                    .with_query("secid", secid)
                    .with_query("fltt", "2")
                    .with_query("invt", "2")
                    .with_query("fields", QUOTE_FIELDS),
            )
            .await?;
        let mut draft = parse_quote(&quote)?;

        match self.fetch_reports(ticker).await {
            Ok(reports) => merge_reports(&mut draft, &reports),
            Err(error) => debug!(ticker = %ticker, error = %error, "eastmoney reports unavailable"),
        }

        Ok(draft.finish(ticker.clone(), ProviderId::Eastmoney, UtcDateTime::now())?)
    }

    async fn fetch_reports(&self, ticker: &Ticker) -> Result<Vec<Map<String, Value>>, ProviderError> {
        let body = self
            .upstream
            .get_json(
                HttpRequest::get(REPORT_URL)
                    .with_query("reportName", "RPT_F10_FINANCE_MAINFINADATA")
                    .with_query("columns", "ALL")
                    .with_query(
                        "filter",
                        format!(
                            "(SECUCODE=\"{}\")(REPORT_TYPE=\"年报\")",
                            secucode(ticker)
                        ),
                    )
                    .with_query("sortColumns", "REPORT_DATE")
                    .with_query("sortTypes", "-1")
                    .with_query("pageNumber", "1")
                    .with_query("pageSize", "5"),
            )
            .await?;
        parse_reports(body)
    }
}

impl FundamentalsProvider for EastmoneyAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Eastmoney
    }

    fn supports(&self, market: MarketClass) -> bool {
        market == MarketClass::Domestic
    }

    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
    ) -> Pin<Box<dyn Future<Output = Result<FinancialSnapshot, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let market = ticker.market_class();
            if !self.supports(market) {
                return Err(ProviderError::unsupported(ProviderId::Eastmoney, market));
            }

            if self.upstream.is_real() {
                self.fetch_real(ticker).await
            } else {
                seeded_snapshot(ticker, ProviderId::Eastmoney)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Quote API market prefix: `1.` Shanghai, `0.` Shenzhen.
fn secid(ticker: &Ticker) -> Result<String, ProviderError> {
    match ticker.suffix() {
        Some(SHANGHAI_SUFFIX) => Ok(format!("1.{}", ticker.code())),
        Some(SHENZHEN_SUFFIX) => Ok(format!("0.{}", ticker.code())),
        _ => Err(ProviderError::invalid_request(format!(
            "eastmoney has no market prefix for '{ticker}'"
        ))),
    }
}

/// Datacenter security code: `600519.SH`, `000001.SZ`.
fn secucode(ticker: &Ticker) -> String {
    match ticker.suffix() {
        Some(SHANGHAI_SUFFIX) => format!("{}.SH", ticker.code()),
        _ => ticker.as_str().to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ReportEnvelope {
    #[serde(default)]
    result: Option<ReportResult>,
}

#[derive(Debug, Deserialize)]
struct ReportResult {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

fn parse_quote(body: &Value) -> Result<SnapshotDraft, ProviderError> {
    let envelope = QuoteEnvelope::deserialize(body).map_err(|error| {
        ProviderError::internal(format!("unexpected eastmoney quote shape: {error}"))
    })?;
    let data = envelope
        .data
        .ok_or_else(|| ProviderError::missing_data("eastmoney quote returned no data"))?;

    let mut draft = SnapshotDraft {
        name: text_field(&data, &["f58"]),
        currency: Some(String::from("CNY")),
        ..SnapshotDraft::default()
    };
    reconcile::merge_into_draft(EASTMONEY_FIELDS, &data, &mut draft);
    Ok(draft)
}

fn parse_reports(body: Value) -> Result<Vec<Map<String, Value>>, ProviderError> {
    let envelope: ReportEnvelope = serde_json::from_value(body).map_err(|error| {
        ProviderError::internal(format!("unexpected eastmoney report shape: {error}"))
    })?;
    Ok(envelope.result.map(|result| result.data).unwrap_or_default())
}

/// Reports arrive newest first; the newest also backfills ratios the quote
/// left empty.
fn merge_reports(draft: &mut SnapshotDraft, reports: &[Map<String, Value>]) {
    if let Some(latest) = reports.first() {
        reconcile::merge_into_draft(EASTMONEY_FIELDS, latest, draft);
    }
    for report in reports {
        let Some(year) = text_field(report, &["REPORT_DATE", "REPORTDATE"])
            .as_deref()
            .and_then(reconcile::fiscal_year)
        else {
            continue;
        };
        let mut annual = AnnualRecord::new(year);
        reconcile::merge_into_annual(EASTMONEY_FIELDS, report, &mut annual);
        draft.history.push(annual);
    }
}
