//! # Domain Models
//!
//! Canonical domain types shared by every provider adapter and by the
//! valuation engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Exchange-qualified security identifier |
//! | [`MarketClass`] | Domestic vs. foreign listing, drives provider order |
//! | [`FinancialSnapshot`] | Validated fundamentals record for one ticker |
//! | [`SnapshotDraft`] | Staging area adapters fill before validation |
//! | [`AnnualRecord`] | One fiscal year of reported figures |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Validation
//!
//! A snapshot only exists once price and market capitalization are known to
//! be positive:
//!
//! ```rust,ignore
//! use fundex_core::{ProviderId, SnapshotDraft, Ticker, UtcDateTime, ValidationError};
//!
//! let draft = SnapshotDraft { price: Some(10.0), market_cap: None, ..Default::default() };
//! let err = draft.finish(Ticker::from("AAPL"), ProviderId::Yahoo, UtcDateTime::now());
//! assert!(matches!(err, Err(ValidationError::NonPositiveValue { field: "market_cap" })));
//! ```

mod snapshot;
mod ticker;
mod timestamp;

pub use snapshot::{
    derive_free_cash_flow, normalize_history, AnnualRecord, FinancialSnapshot, SnapshotDraft,
    MAX_HISTORY_YEARS,
};
pub use ticker::{MarketClass, Ticker, HONG_KONG_SUFFIX, SHANGHAI_SUFFIX, SHENZHEN_SUFFIX};
pub use timestamp::UtcDateTime;
