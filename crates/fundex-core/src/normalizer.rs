use std::sync::LazyLock;

use crate::{Ticker, HONG_KONG_SUFFIX, SHANGHAI_SUFFIX, SHENZHEN_SUFFIX};

/// Built-in display-name index, in lookup order.
///
/// Substring matching walks this table top to bottom and stops at the first
/// hit, so more specific names must come before names they are a prefix of.
const BUILTIN_NAMES: &[(&str, &str)] = &[
    // A-share consumer
    ("贵州茅台", "600519.SS"),
    ("Kweichow Moutai", "600519.SS"),
    ("五粮液", "000858.SZ"),
    ("Wuliangye Yibin", "000858.SZ"),
    ("泸州老窖", "000568.SZ"),
    ("山西汾酒", "600809.SS"),
    ("伊利股份", "600887.SS"),
    ("美的集团", "000333.SZ"),
    ("Midea Group", "000333.SZ"),
    ("盐湖股份", "000792.SZ"),
    // A-share technology
    ("宁德时代", "300750.SZ"),
    ("Contemporary Amperex Technology", "300750.SZ"),
    ("海康威视", "002415.SZ"),
    ("Hikvision", "002415.SZ"),
    ("立讯精密", "002475.SZ"),
    ("中芯国际", "688981.SS"),
    ("中兴通讯", "000063.SZ"),
    ("招商银行", "600036.SS"),
    ("平安银行", "000001.SZ"),
    // Hong Kong
    ("腾讯控股", "0700.HK"),
    ("Tencent Holdings", "0700.HK"),
    ("阿里巴巴-W", "9988.HK"),
    ("美团-W", "3690.HK"),
    ("Meituan", "3690.HK"),
    ("京东集团-SW", "9618.HK"),
    ("小米集团-W", "1810.HK"),
    ("Xiaomi", "1810.HK"),
    ("网易-S", "9999.HK"),
    // US listings and ADRs
    ("Apple Inc.", "AAPL"),
    ("Microsoft", "MSFT"),
    ("Alphabet", "GOOGL"),
    ("Amazon.com", "AMZN"),
    ("NVIDIA", "NVDA"),
    ("Meta Platforms", "META"),
    ("Tesla", "TSLA"),
    ("Alibaba Group", "BABA"),
    ("PDD Holdings", "PDD"),
    ("JD.com", "JD"),
    ("Baidu", "BIDU"),
    ("NIO Inc.", "NIO"),
    ("Taiwan Semiconductor", "TSM"),
    ("Coca-Cola", "KO"),
    ("Procter & Gamble", "PG"),
    ("Johnson & Johnson", "JNJ"),
    ("PepsiCo", "PEP"),
    ("Exxon Mobil", "XOM"),
];

static BUILTIN: LazyLock<SymbolNormalizer> = LazyLock::new(SymbolNormalizer::builtin);

/// Maps free-form input to a canonical [`Ticker`] with the built-in index.
///
/// Total: unrecognized input comes back trimmed and upper-cased, and empty
/// input yields an empty ticker that the cascade later rejects.
pub fn normalize(raw: &str) -> Ticker {
    BUILTIN.normalize(raw)
}

/// Display name the built-in index registers for `ticker`.
pub fn known_name(ticker: &Ticker) -> Option<&'static str> {
    BUILTIN.display_name(ticker)
}

/// Name to ticker reverse index plus the numeric exchange-code rules.
#[derive(Debug, Clone)]
pub struct SymbolNormalizer {
    entries: Vec<NameEntry>,
}

#[derive(Debug, Clone)]
struct NameEntry {
    name: String,
    folded: String,
    ticker: String,
}

impl Default for SymbolNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SymbolNormalizer {
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_NAMES.iter().copied())
    }

    /// Builds an index from `(display name, ticker)` pairs; iteration order is
    /// the substring match order.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, ticker)| NameEntry {
                name: name.to_owned(),
                folded: name.to_lowercase(),
                ticker: ticker.trim().to_ascii_uppercase(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display name registered for `ticker`, if any.
    pub fn display_name(&self, ticker: &Ticker) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.ticker == ticker.as_str())
            .map(|entry| entry.name.as_str())
    }

    pub fn normalize(&self, raw: &str) -> Ticker {
        let input = raw.trim();
        if input.is_empty() {
            return Ticker::new(String::new());
        }
        let folded = input.to_lowercase();

        if let Some(entry) = self.entries.iter().find(|entry| entry.folded == folded) {
            return Ticker::new(entry.ticker.clone());
        }

        // already canonical
        let upper = input.to_uppercase();
        if self.entries.iter().any(|entry| entry.ticker == upper) {
            return Ticker::new(upper);
        }

        // first hit in index order, not the best one
        if let Some(entry) = self.entries.iter().find(|entry| entry.folded.contains(&folded)) {
            return Ticker::new(entry.ticker.clone());
        }

        if let Some(ticker) = from_exchange_code(input) {
            return ticker;
        }

        Ticker::new(upper)
    }
}

/// Applies the numeric exchange-code conventions to a bare code.
fn from_exchange_code(code: &str) -> Option<Ticker> {
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let suffix = match (code.len(), code.as_bytes()[0]) {
        (6, b'6') => SHANGHAI_SUFFIX,
        (6, b'0' | b'3') => SHENZHEN_SUFFIX,
        (4, _) => HONG_KONG_SUFFIX,
        (5, b'0') => return Some(Ticker::new(format!("{}{HONG_KONG_SUFFIX}", &code[1..]))),
        _ => return None,
    };
    Some(Ticker::new(format!("{code}{suffix}")))
}
