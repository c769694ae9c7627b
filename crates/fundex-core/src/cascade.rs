//! Ordered provider fallback for one ticker.
//!
//! The cascade walks the provider order for the ticker's market class and
//! accepts the first structurally valid snapshot. Adapters are tried strictly
//! one after another; there is no racing and no cross-provider voting.
//!
//! Per call the state moves `Trying(i)` → `Resolved`, or `Trying(i)` →
//! `Trying(i + 1)` on a provider error or an invalid snapshot, and ends in
//! [`UnresolvedSymbolError`] once the order is exhausted.

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::adapters::{AlphaVantageAdapter, EastmoneyAdapter, YahooAdapter};
use crate::http_client::{HttpClient, ReqwestHttpClient, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::provider::{
    FetchContext, FundamentalsProvider, HealthState, ProviderError, ProviderErrorKind,
};
use crate::retry::RetryConfig;
use crate::{FinancialSnapshot, MarketClass, ProviderId, Ticker};

/// Provider priority per market class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOrder {
    domestic: Vec<ProviderId>,
    foreign: Vec<ProviderId>,
}

impl Default for CascadeOrder {
    /// Domestic tickers try the domestic specialist before the general-market
    /// provider; foreign tickers never visit the domestic specialist.
    fn default() -> Self {
        Self {
            domestic: vec![
                ProviderId::Yahoo,
                ProviderId::Eastmoney,
                ProviderId::Alphavantage,
            ],
            foreign: vec![ProviderId::Yahoo, ProviderId::Alphavantage],
        }
    }
}

impl CascadeOrder {
    pub fn with_domestic(mut self, order: &[ProviderId]) -> Self {
        self.domestic = dedupe_chain(order);
        self
    }

    pub fn with_foreign(mut self, order: &[ProviderId]) -> Self {
        self.foreign = dedupe_chain(order);
        self
    }

    pub fn for_market(&self, market: MarketClass) -> &[ProviderId] {
        match market {
            MarketClass::Domestic => &self.domestic,
            MarketClass::Foreign => &self.foreign,
        }
    }
}

/// One failed step of a cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptError {
    pub provider: ProviderId,
    pub kind: ProviderErrorKind,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    /// Calls made against this provider, retries included; 0 when skipped.
    pub calls: u32,
}

impl AttemptError {
    fn new(provider: ProviderId, error: &ProviderError, calls: u32) -> Self {
        Self {
            provider,
            kind: error.kind(),
            code: error.code(),
            message: error.message().to_owned(),
            retryable: error.retryable(),
            calls,
        }
    }
}

/// Every provider in the order failed for `ticker`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("no provider resolved '{ticker}' ({} failed attempt(s))", .attempts.len())]
pub struct UnresolvedSymbolError {
    pub ticker: Ticker,
    pub chain: Vec<ProviderId>,
    pub attempts: Vec<AttemptError>,
}

/// Successful cascade run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSnapshot {
    pub snapshot: FinancialSnapshot,
    pub provider: ProviderId,
    /// Providers visited in order, the winning one last.
    pub chain: Vec<ProviderId>,
    /// Failures that preceded the winning provider.
    pub attempts: Vec<AttemptError>,
    pub latency_ms: u64,
}

impl ResolvedSnapshot {
    pub fn fell_back(&self) -> bool {
        !self.attempts.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        if self.attempts.is_empty() {
            return Vec::new();
        }
        vec![format!(
            "resolved by '{}' after {} failed attempt(s)",
            self.provider,
            self.attempts.len()
        )]
    }
}

/// Adapter registry plus the per-market fallback order.
pub struct ResolutionCascade {
    adapters: HashMap<ProviderId, Arc<dyn FundamentalsProvider>>,
    order: CascadeOrder,
    retry: RetryConfig,
}

impl Default for ResolutionCascade {
    /// All three providers in deterministic mock mode.
    fn default() -> Self {
        Self::new(vec![
            Arc::new(YahooAdapter::default()),
            Arc::new(EastmoneyAdapter::default()),
            Arc::new(AlphaVantageAdapter::default()),
        ])
    }
}

impl std::fmt::Debug for ResolutionCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCascade")
            .field("providers", &self.providers())
            .field("order", &self.order)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ResolutionCascade {
    /// Registers `adapters` by id; a later adapter with the same id replaces
    /// an earlier one.
    pub fn new(adapters: Vec<Arc<dyn FundamentalsProvider>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();
        Self {
            adapters,
            order: CascadeOrder::default(),
            retry: RetryConfig::no_retry(),
        }
    }

    pub fn with_order(mut self, order: CascadeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn order(&self) -> &CascadeOrder {
        &self.order
    }

    /// Registered providers, sorted by name.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers = self.adapters.keys().copied().collect::<Vec<_>>();
        providers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        providers
    }

    /// Resolves `ticker` with the order configured for its market class.
    pub async fn resolve(
        &self,
        ticker: &Ticker,
        ctx: &FetchContext,
    ) -> Result<ResolvedSnapshot, UnresolvedSymbolError> {
        let order = self.order.for_market(ticker.market_class());
        self.resolve_in_order(ticker, order, ctx).await
    }

    /// Resolves `ticker` with an explicit provider order.
    ///
    /// # Errors
    ///
    /// Returns [`UnresolvedSymbolError`] when the ticker is empty or invalid
    /// (no provider is called), or when every provider in `order` failed.
    pub async fn resolve_in_order(
        &self,
        ticker: &Ticker,
        order: &[ProviderId],
        ctx: &FetchContext,
    ) -> Result<ResolvedSnapshot, UnresolvedSymbolError> {
        let started = Instant::now();
        let mut chain = Vec::with_capacity(order.len());
        let mut attempts = Vec::new();

        if let Err(error) = ticker.validate() {
            debug!(ticker = %ticker, error = %error, "rejecting ticker before any provider call");
            return Err(UnresolvedSymbolError {
                ticker: ticker.clone(),
                chain,
                attempts,
            });
        }

        let market = ticker.market_class();
        for provider in dedupe_chain(order) {
            if ctx.cancel.is_cancelled() || ctx.is_expired() {
                debug!(ticker = %ticker, "cascade stopped by cancellation or deadline");
                break;
            }
            chain.push(provider);

            let Some(adapter) = self.adapters.get(&provider) else {
                attempts.push(AttemptError::new(
                    provider,
                    &ProviderError::adapter_not_registered(provider),
                    0,
                ));
                continue;
            };

            if !adapter.supports(market) {
                attempts.push(AttemptError::new(
                    provider,
                    &ProviderError::unsupported(provider, market),
                    0,
                ));
                continue;
            }

            if adapter.health().await.state == HealthState::Unhealthy {
                debug!(ticker = %ticker, provider = %provider, "skipping unhealthy provider");
                attempts.push(AttemptError::new(
                    provider,
                    &ProviderError::unavailable("provider health check reported unhealthy"),
                    0,
                ));
                continue;
            }

            match self.attempt(adapter.as_ref(), ticker, ctx).await {
                Ok(snapshot) => {
                    let resolved = ResolvedSnapshot {
                        snapshot,
                        provider,
                        chain,
                        attempts,
                        latency_ms: elapsed_ms(started),
                    };
                    if resolved.fell_back() {
                        info!(
                            ticker = %ticker,
                            provider = %provider,
                            failed = resolved.attempts.len(),
                            "resolved after fallback"
                        );
                    } else {
                        debug!(ticker = %ticker, provider = %provider, "resolved");
                    }
                    return Ok(resolved);
                }
                Err(failure) => attempts.push(failure),
            }
        }

        debug!(ticker = %ticker, chain = ?chain, "unresolved");
        Err(UnresolvedSymbolError {
            ticker: ticker.clone(),
            chain,
            attempts,
        })
    }

    /// Calls one adapter, retrying per the [`RetryConfig`], and checks the
    /// snapshot it returns.
    async fn attempt(
        &self,
        adapter: &dyn FundamentalsProvider,
        ticker: &Ticker,
        ctx: &FetchContext,
    ) -> Result<FinancialSnapshot, AttemptError> {
        let provider = adapter.id();
        let mut retry = 0;
        loop {
            let calls = retry + 1;
            debug!(ticker = %ticker, provider = %provider, call = calls, "provider attempt");

            let error = match call_with_context(adapter, ticker, ctx).await {
                Ok(snapshot) => match accept(&snapshot, ticker) {
                    Ok(()) => return Ok(snapshot),
                    Err(error) => error,
                },
                Err(error) => error,
            };
            debug!(ticker = %ticker, provider = %provider, error = %error, "provider attempt failed");

            if !self.retry.should_retry(&error, retry) {
                return Err(AttemptError::new(provider, &error, calls));
            }

            let delay = self.retry.delay_for_attempt(retry);
            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    return Err(AttemptError::new(provider, &ProviderError::cancelled(), calls));
                }
                () = tokio::time::sleep(delay) => {}
            }
            retry += 1;
        }
    }
}

/// One adapter call bounded by the context's deadline and cancel token.
async fn call_with_context(
    adapter: &dyn FundamentalsProvider,
    ticker: &Ticker,
    ctx: &FetchContext,
) -> Result<FinancialSnapshot, ProviderError> {
    let fetch = adapter.fetch(ticker);
    let bounded = async {
        match ctx.call_deadline() {
            Some(deadline) => {
                let budget = deadline.saturating_duration_since(tokio::time::Instant::now());
                tokio::time::timeout_at(deadline, fetch)
                    .await
                    .unwrap_or_else(|_| Err(ProviderError::timeout(budget)))
            }
            None => fetch.await,
        }
    };

    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(ProviderError::cancelled()),
        result = bounded => result,
    }
}

/// A snapshot for another ticker or with a broken invariant counts as no data.
fn accept(snapshot: &FinancialSnapshot, ticker: &Ticker) -> Result<(), ProviderError> {
    if snapshot.ticker != *ticker {
        return Err(ProviderError::missing_data(format!(
            "provider answered for '{}' instead of '{ticker}'",
            snapshot.ticker
        )));
    }
    snapshot.validate().map_err(ProviderError::from)
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    chain
        .iter()
        .copied()
        .filter(|provider| seen.insert(*provider))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Builds a [`ResolutionCascade`] over real HTTP clients or in mock mode.
///
/// # Environment Variables
///
/// | Provider | Primary Env Var | Fallback Env Var |
/// |----------|----------------|------------------|
/// | Alpha Vantage | `FUNDEX_ALPHAVANTAGE_API_KEY` | `ALPHAVANTAGE_API_KEY` |
/// | Yahoo | (no key required) | - |
/// | Eastmoney | (no key required) | - |
///
/// In real mode without an Alpha Vantage key the provider is left
/// unregistered, so the cascade records it as an attempt error instead of
/// serving seeded data next to live data.
#[derive(Debug)]
pub struct CascadeBuilder {
    use_mock: bool,
    alphavantage_api_key: Option<String>,
    timeout_ms: u64,
    order: CascadeOrder,
    retry: RetryConfig,
}

impl Default for CascadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeBuilder {
    pub fn new() -> Self {
        Self {
            use_mock: false,
            alphavantage_api_key: None,
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            order: CascadeOrder::default(),
            retry: RetryConfig::no_retry(),
        }
    }

    /// Every adapter serves deterministic seeded snapshots; nothing touches
    /// the network.
    pub fn with_mock_mode(mut self) -> Self {
        self.use_mock = true;
        self
    }

    /// Real HTTP clients, with the Alpha Vantage key read from the
    /// environment.
    pub fn with_real_clients(mut self) -> Self {
        self.use_mock = false;
        self.alphavantage_api_key = env::var("FUNDEX_ALPHAVANTAGE_API_KEY")
            .or_else(|_| env::var("ALPHAVANTAGE_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_alphavantage_key(mut self, key: impl Into<String>) -> Self {
        self.alphavantage_api_key = Some(key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_order(mut self, order: CascadeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> ResolutionCascade {
        let adapters: Vec<Arc<dyn FundamentalsProvider>> = if self.use_mock {
            vec![
                Arc::new(YahooAdapter::default()),
                Arc::new(EastmoneyAdapter::default()),
                Arc::new(AlphaVantageAdapter::default()),
            ]
        } else {
            let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
            let mut adapters: Vec<Arc<dyn FundamentalsProvider>> = vec![
                Arc::new(
                    YahooAdapter::with_http_client(http_client.clone())
                        .with_timeout_ms(self.timeout_ms),
                ),
                Arc::new(
                    EastmoneyAdapter::with_http_client(http_client.clone())
                        .with_timeout_ms(self.timeout_ms),
                ),
            ];
            match &self.alphavantage_api_key {
                Some(key) => adapters.push(Arc::new(
                    AlphaVantageAdapter::with_http_client(http_client, key.clone())
                        .with_timeout_ms(self.timeout_ms),
                )),
                None => debug!("no alphavantage api key; provider not registered"),
            }
            adapters
        };

        ResolutionCascade::new(adapters)
            .with_order(self.order)
            .with_retry(self.retry)
    }
}
