//! # Fundex Core
//!
//! Multi-source fundamentals resolution and valuation engine.
//!
//! ## Overview
//!
//! This crate turns free-form symbol input into a validated fundamentals
//! snapshot and values it:
//!
//! - **Symbol normalization** from names, bare exchange codes or tickers
//! - **Resolution cascade** over an ordered, per-market provider list
//! - **Batch fetching** with bounded concurrency and partial results
//! - **TTL caching** of single-symbol and batch resolutions
//! - **Valuation** by two-stage DCF with ADR currency correction
//! - **Peer groups** with explicitly refreshed comparison sets
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo, Eastmoney, Alpha Vantage) |
//! | [`batch`] | Concurrent multi-ticker resolution |
//! | [`cache`] | TTL memoization |
//! | [`cascade`] | Ordered provider fallback |
//! | [`circuit_breaker`] | Circuit breaker for resilient calls |
//! | [`config`] | Environment configuration |
//! | [`currency`] | ADR currency correction |
//! | [`domain`] | Ticker, snapshot and timestamp types |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`normalizer`] | Free-form input to canonical ticker |
//! | [`peer_group`] | Peer catalog and comparison cache |
//! | [`provider`] | Provider trait, errors and fetch context |
//! | [`reconcile`] | Provider schema alias tables |
//! | [`service`] | Facade used by presentation layers |
//! | [`signals`] | MACD, RSI and trend decision |
//! | [`table`] | Localized outbound tables |
//! | [`valuation`] | DCF, yields and composite score |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fundex_core::{PeerGroupCache, ResolutionCascade, ValuationParameters, ValuationService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Mock adapters: seeded data, no network
//!     let service = ValuationService::new(
//!         Arc::new(ResolutionCascade::default()),
//!         PeerGroupCache::new(),
//!     );
//!
//!     let dive = service.deep_dive("贵州茅台", &ValuationParameters::default()).await?;
//!     if let Some(valuation) = &dive.valuation {
//!         println!("{} fair price: {:?}", dive.resolved.snapshot.ticker, valuation.fair_price);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / UI       │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ValuationService│────▶│ TtlCache         │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ BatchFetcher /  │────▶│ Circuit Breaker  │
//! │ Cascade         │     └──────────────────┘
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider        │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ (reqwest/none)   │
//! └─────────────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ FinancialSnapshot│
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapter failures never escape the cascade on their own; they are folded
//! into an [`UnresolvedSymbolError`] once every provider failed:
//!
//! ```rust
//! use fundex_core::{ProviderError, ProviderErrorKind};
//!
//! fn handle_error(error: &ProviderError) {
//!     match error.kind() {
//!         ProviderErrorKind::RateLimited => {
//!             // Next provider in the order
//!         }
//!         ProviderErrorKind::Unavailable => {
//!             // Circuit open or upstream down
//!         }
//!         ProviderErrorKind::InvalidRequest => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only (never logged)
//! - All HTTP requests use TLS via reqwest

pub mod adapters;
pub mod batch;
pub mod cache;
pub mod cascade;
pub mod circuit_breaker;
pub mod config;
pub mod currency;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod normalizer;
pub mod peer_group;
pub mod provider;
pub mod provider_policy;
pub mod reconcile;
pub mod retry;
pub mod service;
pub mod signals;
pub mod source;
pub mod table;
pub mod throttling;
pub mod valuation;

// Adapter implementations
pub use adapters::{AlphaVantageAdapter, EastmoneyAdapter, YahooAdapter};

// Batch and cascade
pub use batch::{BatchFetcher, BatchResult, DEFAULT_MAX_CONCURRENCY};
pub use cascade::{
    AttemptError, CascadeBuilder, CascadeOrder, ResolutionCascade, ResolvedSnapshot,
    UnresolvedSymbolError,
};

// Caching
pub use cache::{CacheMode, Cached, TtlCache};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::EngineConfig;

// Domain models
pub use domain::{
    AnnualRecord, FinancialSnapshot, MarketClass, SnapshotDraft, Ticker, UtcDateTime,
    HONG_KONG_SUFFIX, SHANGHAI_SUFFIX, SHENZHEN_SUFFIX,
};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::{ConfigError, CoreError, ValidationError, ValuationError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient,
    StaticHttpClient,
};

// Normalization
pub use normalizer::{normalize, SymbolNormalizer};

// Peer groups
pub use peer_group::{PeerComparison, PeerGroup, PeerGroupCache, PeerRow, Positioning};

// Provider contract
pub use provider::{
    CancelToken, FetchContext, FundamentalsProvider, HealthState, HealthStatus, ProviderError,
    ProviderErrorKind,
};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Service facade
pub use service::{DeepDive, ScreenFilters, ValuationService};

// Signals
pub use signals::{Decision, GridLevels, TrendSignal};

// Source identifiers
pub use source::ProviderId;

// Tables
pub use table::{Cell, Column, Locale, LocalizedTable, ScreenRow, ScreenTable, SkippedSymbol};

// Throttling
pub use throttling::ThrottlingQueue;

// Valuation
pub use valuation::{
    compute_dcf, value_snapshot, GrowthSource, MarketSegment, ScoreWeights, ValuationParameters,
    ValuationResult, ValuationStatus,
};
