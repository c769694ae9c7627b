//! Runtime configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FUNDEX_ALPHAVANTAGE_API_KEY` (or `ALPHAVANTAGE_API_KEY`) | unset |
//! | `FUNDEX_MAX_CONCURRENCY` | 10 |
//! | `FUNDEX_SNAPSHOT_TTL_SECS` | 300 |
//! | `FUNDEX_SCREEN_TTL_SECS` | 3600 |
//! | `FUNDEX_REQUEST_TIMEOUT_MS` | 10000 |
//! | `FUNDEX_BATCH_DEADLINE_SECS` | unset |
//!
//! Malformed values fail with [`ConfigError`] instead of falling back to the
//! default.

use std::env;
use std::time::Duration;

use crate::batch::DEFAULT_MAX_CONCURRENCY;
use crate::cascade::CascadeBuilder;
use crate::error::ConfigError;
use crate::http_client::DEFAULT_REQUEST_TIMEOUT_MS;

pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SCREEN_TTL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub alphavantage_api_key: Option<String>,
    pub max_concurrency: usize,
    /// Lifetime of single-symbol resolutions.
    pub snapshot_ttl: Duration,
    /// Lifetime of batch resolutions behind a screen.
    pub screen_ttl: Duration,
    pub request_timeout_ms: u64,
    /// Budget for a whole batch; `None` means each call only has its own
    /// timeout.
    pub batch_deadline: Option<Duration>,
    pub use_mock: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alphavantage_api_key: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            screen_ttl: DEFAULT_SCREEN_TTL,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            batch_deadline: None,
            use_mock: false,
        }
    }
}

impl EngineConfig {
    /// Offline configuration: seeded providers, default limits.
    pub fn mock() -> Self {
        Self {
            use_mock: true,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable
    /// lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let alphavantage_api_key = read("FUNDEX_ALPHAVANTAGE_API_KEY")
            .or_else(|| read("ALPHAVANTAGE_API_KEY"))
            .map(|key| key.trim().to_owned());

        let max_concurrency = parse_number("FUNDEX_MAX_CONCURRENCY", read("FUNDEX_MAX_CONCURRENCY"))?
            .map_or(Ok(defaults.max_concurrency), |value| {
                usize::try_from(value).map_err(|_| ConfigError::InvalidEnv {
                    name: "FUNDEX_MAX_CONCURRENCY",
                    value: value.to_string(),
                    reason: "out of range",
                })
            })?;
        if max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let snapshot_ttl = parse_number("FUNDEX_SNAPSHOT_TTL_SECS", read("FUNDEX_SNAPSHOT_TTL_SECS"))?
            .map_or(defaults.snapshot_ttl, Duration::from_secs);
        let screen_ttl = parse_number("FUNDEX_SCREEN_TTL_SECS", read("FUNDEX_SCREEN_TTL_SECS"))?
            .map_or(defaults.screen_ttl, Duration::from_secs);
        let request_timeout_ms =
            parse_number("FUNDEX_REQUEST_TIMEOUT_MS", read("FUNDEX_REQUEST_TIMEOUT_MS"))?
                .unwrap_or(defaults.request_timeout_ms);
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "FUNDEX_REQUEST_TIMEOUT_MS",
                value: String::from("0"),
                reason: "must be at least 1",
            });
        }
        let batch_deadline =
            parse_number("FUNDEX_BATCH_DEADLINE_SECS", read("FUNDEX_BATCH_DEADLINE_SECS"))?
                .map(Duration::from_secs);

        Ok(Self {
            alphavantage_api_key,
            max_concurrency,
            snapshot_ttl,
            screen_ttl,
            request_timeout_ms,
            batch_deadline,
            use_mock: false,
        })
    }

    pub fn with_mock(mut self, use_mock: bool) -> Self {
        self.use_mock = use_mock;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Result<Self, ConfigError> {
        if max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        self.max_concurrency = max_concurrency;
        Ok(self)
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Adapter set matching this configuration.
    pub fn cascade_builder(&self) -> CascadeBuilder {
        let builder = CascadeBuilder::new().with_timeout_ms(self.request_timeout_ms);
        let builder = match &self.alphavantage_api_key {
            Some(key) => builder.with_alphavantage_key(key.clone()),
            None => builder,
        };
        if self.use_mock {
            builder.with_mock_mode()
        } else {
            builder
        }
    }
}

fn parse_number(name: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidEnv {
                name,
                value,
                reason: "expected a non-negative integer",
            })
    })
    .transpose()
}
