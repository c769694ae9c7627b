use thiserror::Error;

/// Validation and contract errors exposed by `fundex-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker contains whitespace: '{value}'")]
    TickerWhitespace { value: String },

    #[error("invalid provider '{value}', expected one of yahoo, eastmoney, alphavantage")]
    InvalidProvider { value: String },
    #[error("invalid segment '{value}', expected one of technology, value_dividend, foreign_core, general")]
    InvalidSegment { value: String },

    #[error("invalid locale '{value}', expected en or zh")]
    InvalidLocale { value: String },
    #[error("unknown peer group '{value}'")]
    UnknownPeerGroup { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Rejected valuation inputs. Raised eagerly instead of coercing to zero so a
/// misconfigured call never looks like a fairly valued company.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValuationError {
    #[error("discount rate {discount_rate} must exceed terminal growth rate {terminal_rate}")]
    DiscountNotAboveTerminal {
        discount_rate: f64,
        terminal_rate: f64,
    },
    #[error("valuation input '{field}' must be finite")]
    NonFiniteInput { field: &'static str },
    #[error("valuation input '{field}' = {value} is outside the accepted range")]
    RateOutOfRange { field: &'static str, value: f64 },
    #[error("free cash flow {value} is not positive; no intrinsic value can be derived")]
    NonPositiveCashFlow { value: f64 },
    #[error("snapshot for '{ticker}' is missing '{field}'")]
    MissingInput { ticker: String, field: &'static str },
}

/// Invalid runtime configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("max concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Valuation(#[from] ValuationError),

    #[error(transparent)]
    Unresolved(#[from] crate::cascade::UnresolvedSymbolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
