//! Provider adapter contract and the per-call fetch context.
//!
//! Every external data source implements [`FundamentalsProvider`]. An adapter
//! maps one provider's native schema into a [`FinancialSnapshot`] and fails
//! with a [`ProviderError`] when the identity or price fields are missing, so
//! the cascade can tell "no data" from a zero value.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`id`](FundamentalsProvider::id) | Provider identifier |
//! | [`supports`](FundamentalsProvider::supports) | Market classes the provider serves |
//! | [`fetch`](FundamentalsProvider::fetch) | One snapshot for one ticker |
//! | [`health`](FundamentalsProvider::health) | Breaker-derived health |
//!
//! Adapters must not retry internally.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::circuit_breaker::CircuitState;
use crate::http_client::HttpError;
use crate::{FinancialSnapshot, MarketClass, ProviderId, Ticker, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    /// Open breaker means unhealthy, half-open means a trial call is pending.
    pub const fn from_circuit(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => Self::healthy(),
            CircuitState::HalfOpen => Self::new(HealthState::Degraded, true),
            CircuitState::Open => Self::new(HealthState::Unhealthy, false),
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Unsupported,
    Unavailable,
    RateLimited,
    InvalidRequest,
    MissingData,
    AdapterNotRegistered,
    Timeout,
    Cancelled,
    Internal,
}

/// One adapter could not produce a valid snapshot. Recovered by the cascade,
/// never surfaced to callers on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn unsupported(provider: ProviderId, market: MarketClass) -> Self {
        Self::new(
            ProviderErrorKind::Unsupported,
            format!("provider '{provider}' does not serve {market} tickers"),
            false,
        )
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message, true)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message, false)
    }

    pub fn missing_data(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MissingData, message, false)
    }

    pub fn adapter_not_registered(provider: ProviderId) -> Self {
        Self::new(
            ProviderErrorKind::AdapterNotRegistered,
            format!("provider adapter '{provider}' is not registered"),
            false,
        )
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("provider call timed out after {} ms", after.as_millis()),
            true,
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ProviderErrorKind::Cancelled, "fetch was cancelled", false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Internal, message, false)
    }

    /// Maps a transport failure, keeping its retryable flag.
    pub fn from_http(provider: ProviderId, error: &HttpError) -> Self {
        let message = format!("{provider} request failed: {}", error.message());
        if error.is_timeout() {
            return Self::new(ProviderErrorKind::Timeout, message, true);
        }
        Self::new(ProviderErrorKind::Unavailable, message, error.retryable())
    }

    /// Maps a non-2xx status. 429 is a rate limit, 5xx is transient, the rest
    /// is treated as a rejected request.
    pub fn from_status(provider: ProviderId, status: u16) -> Self {
        let message = format!("{provider} returned HTTP {status}");
        match status {
            429 => Self::rate_limited(message),
            500..=599 => Self::unavailable(message),
            _ => Self::new(ProviderErrorKind::Unavailable, message, false),
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Unsupported => "provider.unsupported",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::InvalidRequest => "provider.invalid_request",
            ProviderErrorKind::MissingData => "provider.missing_data",
            ProviderErrorKind::AdapterNotRegistered => "provider.adapter_not_registered",
            ProviderErrorKind::Timeout => "provider.timeout",
            ProviderErrorKind::Cancelled => "provider.cancelled",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

impl From<ValidationError> for ProviderError {
    fn from(value: ValidationError) -> Self {
        Self::missing_data(value.to_string())
    }
}

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; the batch fetcher shares one
/// instance across concurrent tasks.
pub trait FundamentalsProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn supports(&self, market: MarketClass) -> bool;

    /// Fetches and validates one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the provider is unreachable, rate limited,
    /// does not serve the ticker, or did not report a positive price and
    /// market cap.
    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
    ) -> Pin<Box<dyn Future<Output = Result<FinancialSnapshot, ProviderError>> + Send + 'a>>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;
}

/// Cooperative cancellation shared by every task of one request.
///
/// Clones observe the same flag; cancelling any clone cancels all of them.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let observed = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if observed.is_err() {
            // sender lives as long as self, so this never resolves
            std::future::pending::<()>().await;
        }
    }
}

/// Deadline and cancellation threaded through the cascade and batch fetcher.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Wall-clock bound for the whole request.
    pub deadline: Option<Instant>,
    /// Bound for each individual adapter call.
    pub call_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline_in(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Earliest of the request deadline and `now + call_timeout`.
    pub fn call_deadline(&self) -> Option<Instant> {
        let per_call = self.call_timeout.map(|timeout| Instant::now() + timeout);
        match (self.deadline, per_call) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
