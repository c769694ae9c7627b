use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{seeded_snapshot, text_field, Upstream};
use crate::circuit_breaker::CircuitBreaker;
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{FundamentalsProvider, HealthStatus, ProviderError, ProviderErrorKind};
use crate::reconcile::{self, FieldRule, LineItem};
use crate::{
    AnnualRecord, FinancialSnapshot, MarketClass, ProviderId, SnapshotDraft, Ticker, UtcDateTime,
};

const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const REFERER: &str = "https://finance.yahoo.com/";

const MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics,earningsTrend,\
incomeStatementHistory,balanceSheetHistory,cashflowStatementHistory";

/// Snapshot-level modules, most authoritative first.
const SNAPSHOT_MODULES: [&str; 4] = [
    "price",
    "financialData",
    "summaryDetail",
    "defaultKeyStatistics",
];

/// (module, statement array) pairs holding annual line items.
const STATEMENTS: [(&str, &str); 3] = [
    ("incomeStatementHistory", "incomeStatementHistory"),
    ("balanceSheetHistory", "balanceSheetStatements"),
    ("cashflowStatementHistory", "cashflowStatements"),
];

const YAHOO_FIELDS: &[FieldRule] = &[
    FieldRule::new(
        LineItem::Price,
        &["regularMarketPrice", "currentPrice", "previousClose"],
    ),
    FieldRule::new(LineItem::MarketCap, &["marketCap"]),
    FieldRule::new(LineItem::ReturnOnEquity, &["returnOnEquity"]),
    FieldRule::new(LineItem::GrossMargin, &["grossMargins"]),
    FieldRule::new(LineItem::NetMargin, &["profitMargins"]),
    FieldRule::new(
        LineItem::DividendYield,
        &["dividendYield", "trailingAnnualDividendYield"],
    ),
    FieldRule::new(LineItem::FreeCashFlow, &["freeCashflow"]),
    FieldRule::new(
        LineItem::OperatingCashFlow,
        &["operatingCashflow", "totalCashFromOperatingActivities"],
    ),
    FieldRule::new(LineItem::CapitalExpenditure, &["capitalExpenditures"]),
    FieldRule::new(LineItem::GrowthEstimate, &["earningsGrowth"]),
    FieldRule::new(LineItem::EarningsPerShare, &["trailingEps"]),
    FieldRule::new(LineItem::TrailingPe, &["trailingPE"]),
    FieldRule::new(LineItem::Revenue, &["totalRevenue"]),
    FieldRule::new(
        LineItem::NetIncome,
        &["netIncome", "netIncomeApplicableToCommonShares"],
    ),
    FieldRule::new(
        LineItem::Receivables,
        &["netReceivables", "receivables", "accountsReceivable"],
    ),
];

/// Cookie + crumb session required by Yahoo's unofficial API.
///
/// The cookie lives in the reqwest jar; only the crumb is cached here.
#[derive(Debug)]
struct YahooSession {
    crumb: Mutex<Option<(String, Instant)>>,
    ttl: Duration,
}

impl Default for YahooSession {
    fn default() -> Self {
        Self {
            crumb: Mutex::new(None),
            ttl: Duration::from_secs(3_600),
        }
    }
}

impl YahooSession {
    fn cached(&self) -> Option<String> {
        let crumb = self.crumb.lock().expect("yahoo crumb lock is not poisoned");
        crumb
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    fn invalidate(&self) {
        *self.crumb.lock().expect("yahoo crumb lock is not poisoned") = None;
    }

    async fn crumb(&self, upstream: &Upstream) -> Result<String, ProviderError> {
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        // fc.yahoo.com answers 404 but still sets the session cookie
        let cookie = upstream
            .get_text(HttpRequest::get(COOKIE_URL).with_header("referer", REFERER))
            .await;
        if let Err(error) = cookie {
            if error.kind() != ProviderErrorKind::Unavailable || error.retryable() {
                return Err(error);
            }
        }

        let body = upstream
            .get_text(HttpRequest::get(CRUMB_URL).with_header("referer", REFERER))
            .await?;
        let crumb = body.trim();
        if crumb.is_empty() || crumb.len() > 64 || crumb.contains(char::is_whitespace) || crumb.contains('<') {
            return Err(ProviderError::unavailable("yahoo returned an unusable crumb"));
        }

        *self.crumb.lock().expect("yahoo crumb lock is not poisoned") =
            Some((crumb.to_owned(), Instant::now()));
        Ok(crumb.to_owned())
    }
}

/// Primary fundamentals provider; serves every market class.
#[derive(Clone)]
pub struct YahooAdapter {
    upstream: Upstream,
    session: Arc<YahooSession>,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient))
    }
}

impl YahooAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            upstream: Upstream::new(ProviderId::Yahoo, http_client),
            session: Arc::new(YahooSession::default()),
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
        let crumb = self.session.crumb(&self.upstream).await?;

        let summary_request = HttpRequest::get(format!(
            "{QUOTE_SUMMARY_URL}/{}",
            urlencoding::encode(ticker.as_str())
        ))
        .with_header("referer", REFERER)
        .with_query("modules", MODULES)
        .with_query("crumb", crumb);
        let summary = match self.upstream.get_json(summary_request).await {
            Ok(summary) => summary,
            Err(error) => {
                // a rejected crumb looks like any other refusal; drop it so the next call renews it
                if error.kind() == ProviderErrorKind::Unavailable {
                    self.session.invalidate();
                }
                return Err(error);
            }
        };

        let mut draft = parse_quote_summary(&summary)?;
        draft.price_history = self.fetch_closes(ticker).await;
        Ok(draft.finish(ticker.clone(), ProviderId::Yahoo, UtcDateTime::now())?)
    }

    /// Daily closes for the trend signal. Optional: a chart failure never
    /// fails the snapshot.
    async fn fetch_closes(&self, ticker: &Ticker) -> Vec<f64> {
        let request = HttpRequest::get(format!(
            "{CHART_URL}/{}",
            urlencoding::encode(ticker.as_str())
        ))
        .with_header("referer", REFERER)
        .with_query("range", "1y")
        .with_query("interval", "1d");

        match self.upstream.get_json(request).await {
            Ok(body) => parse_chart_closes(body),
            Err(error) => {
                debug!(ticker = %ticker, error = %error, "yahoo chart unavailable");
                Vec::new()
            }
        }
    }
}

impl FundamentalsProvider for YahooAdapter {
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
            if self.upstream.is_real() {
                self.fetch_real(ticker).await
            } else {
                seeded_snapshot(ticker, ProviderId::Yahoo)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn parse_quote_summary(body: &Value) -> Result<SnapshotDraft, ProviderError> {
    let envelope = QuoteSummaryEnvelope::deserialize(body).map_err(|error| {
        ProviderError::internal(format!("unexpected yahoo quoteSummary shape: {error}"))
    })?;

    if let Some(error) = envelope.quote_summary.error.filter(|e| !e.is_null()) {
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ProviderError::missing_data(format!(
            "yahoo quoteSummary error: {description}"
        )));
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ProviderError::missing_data("yahoo quoteSummary returned no result"))?;

    let module = |name: &str| result.get(name).and_then(Value::as_object);

    let mut draft = SnapshotDraft::default();
    if let Some(price) = module("price") {
        draft.name = text_field(price, &["longName", "shortName"]);
        draft.currency = text_field(price, &["currency"]);
    }
    draft.growth_estimate = module("earningsTrend").and_then(next_year_growth);
    for name in SNAPSHOT_MODULES {
        if let Some(record) = module(name) {
            reconcile::merge_into_draft(YAHOO_FIELDS, record, &mut draft);
        }
    }

    let mut years: BTreeMap<i32, AnnualRecord> = BTreeMap::new();
    let mut latest_cash_flow: Option<(i32, &Map<String, Value>)> = None;
    for (module_name, array_name) in STATEMENTS {
        let statements = module(module_name)
            .and_then(|m| m.get(array_name))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for statement in statements.iter().filter_map(Value::as_object) {
            let Some(year) = statement_year(statement) else {
                continue;
            };
            let annual = years.entry(year).or_insert_with(|| AnnualRecord::new(year));
            reconcile::merge_into_annual(YAHOO_FIELDS, statement, annual);
            if array_name == "cashflowStatements"
                && latest_cash_flow.map_or(true, |(latest, _)| year > latest)
            {
                latest_cash_flow = Some((year, statement));
            }
        }
    }
    if let Some((_, statement)) = latest_cash_flow {
        reconcile::merge_into_draft(YAHOO_FIELDS, statement, &mut draft);
    }
    draft.history = years.into_values().collect();

    Ok(draft)
}

fn statement_year(statement: &Map<String, Value>) -> Option<i32> {
    let end_date = statement.get("endDate")?;
    if let Some(seconds) = reconcile::numeric(end_date) {
        return UtcDateTime::from_unix_seconds(seconds as i64).map(UtcDateTime::year);
    }
    end_date
        .get("fmt")
        .and_then(Value::as_str)
        .and_then(reconcile::fiscal_year)
}

/// Consensus growth for the next fiscal year, falling back to the current one.
fn next_year_growth(trend: &Map<String, Value>) -> Option<f64> {
    let periods = trend.get("trend")?.as_array()?;
    ["+1y", "0y"].iter().find_map(|period| {
        periods
            .iter()
            .find(|entry| entry.get("period").and_then(Value::as_str) == Some(*period))
            .and_then(|entry| entry.get("growth"))
            .and_then(reconcile::numeric)
    })
}

fn parse_chart_closes(body: Value) -> Vec<f64> {
    let Ok(envelope) = serde_json::from_value::<ChartEnvelope>(body) else {
        return Vec::new();
    };
    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .and_then(|result| result.indicators.quote.into_iter().next())
        .map(|quote| quote.close.into_iter().flatten().collect())
        .unwrap_or_default()
}
