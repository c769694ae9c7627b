use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Shanghai listings (codes starting with '6').
pub const SHANGHAI_SUFFIX: &str = ".SS";
/// Shenzhen listings (codes starting with '0' or '3').
pub const SHENZHEN_SUFFIX: &str = ".SZ";
/// Hong Kong listings (4-digit codes).
pub const HONG_KONG_SUFFIX: &str = ".HK";

/// Exchange-qualified security identifier.
///
/// Construction through [`Ticker::new`] never fails: the normalizer is total
/// and validity is only checked once the cascade tries to resolve the ticker
/// (see [`Ticker::validate`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural check performed before any provider is contacted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.trim().is_empty() {
            return Err(ValidationError::EmptyTicker);
        }
        if self.0.chars().any(char::is_whitespace) {
            return Err(ValidationError::TickerWhitespace {
                value: self.0.clone(),
            });
        }
        Ok(())
    }

    pub fn market_class(&self) -> MarketClass {
        if self.0.ends_with(SHANGHAI_SUFFIX) || self.0.ends_with(SHENZHEN_SUFFIX) {
            MarketClass::Domestic
        } else {
            MarketClass::Foreign
        }
    }

    /// Ticker without its exchange suffix (`600519.SS` -> `600519`).
    pub fn code(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(code, _)| code)
            .unwrap_or(&self.0)
    }

    pub fn suffix(&self) -> Option<&str> {
        self.0.rfind('.').map(|index| &self.0[index..])
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Ticker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Ticker {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

/// Symbol class used to pick the provider order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketClass {
    /// Mainland listings served by the domestic-specialized provider.
    Domestic,
    Foreign,
}

impl MarketClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Domestic => "domestic",
            Self::Foreign => "foreign",
        }
    }
}

impl Display for MarketClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
