//! Static peer groups and their explicitly refreshed comparison cache.
//!
//! A comparison is computed only when [`PeerGroupCache::refresh`] is called
//! and stays until the next refresh of the same group. There is no expiry:
//! revisiting a group never triggers a fetch.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::batch::{BatchFetcher, BatchResult};
use crate::provider::FetchContext;
use crate::valuation::{fcf_yield, MarketSegment};
use crate::{currency, FinancialSnapshot, Ticker, UtcDateTime, ValidationError};

/// Named, read-only set of comparable tickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerGroup {
    pub name: &'static str,
    pub title: &'static str,
    pub segment: MarketSegment,
    pub tickers: &'static [&'static str],
}

impl PeerGroup {
    pub fn tickers(&self) -> Vec<Ticker> {
        self.tickers.iter().copied().map(Ticker::from).collect()
    }
}

pub const PEER_GROUPS: &[PeerGroup] = &[
    PeerGroup {
        name: "a-share-consumer",
        title: "A-share consumer staples",
        segment: MarketSegment::ValueDividend,
        tickers: &[
            "600519.SS",
            "000858.SZ",
            "000568.SZ",
            "600809.SS",
            "600887.SS",
            "000333.SZ",
        ],
    },
    PeerGroup {
        name: "a-share-tech",
        title: "A-share technology",
        segment: MarketSegment::Technology,
        tickers: &[
            "300750.SZ",
            "002415.SZ",
            "002475.SZ",
            "688981.SS",
            "000063.SZ",
        ],
    },
    PeerGroup {
        name: "hk-internet",
        title: "Hong Kong internet platforms",
        segment: MarketSegment::ForeignCore,
        tickers: &[
            "0700.HK", "9988.HK", "3690.HK", "9618.HK", "1810.HK", "9999.HK",
        ],
    },
    PeerGroup {
        name: "us-megacap-tech",
        title: "US mega-cap technology",
        segment: MarketSegment::Technology,
        tickers: &["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META"],
    },
    PeerGroup {
        name: "us-dividend",
        title: "US dividend staples",
        segment: MarketSegment::ValueDividend,
        tickers: &["KO", "PG", "JNJ", "PEP", "XOM"],
    },
];

/// Looks a group up by name, case-insensitively.
pub fn find(name: &str) -> Result<&'static PeerGroup, ValidationError> {
    let wanted = name.trim();
    PEER_GROUPS
        .iter()
        .find(|group| group.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ValidationError::UnknownPeerGroup {
            value: name.to_owned(),
        })
}

/// Position of one member relative to the group medians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Positioning {
    /// Growth and margin at or above the median.
    Leader,
    /// Growth at or above the median, margin below.
    Grower,
    /// Margin at or above the median, growth below.
    Harvester,
    Laggard,
}

impl Positioning {
    /// A missing figure or median counts as below.
    pub fn place(
        growth: Option<f64>,
        margin: Option<f64>,
        growth_median: Option<f64>,
        margin_median: Option<f64>,
    ) -> Self {
        let at_or_above = |value: Option<f64>, median: Option<f64>| {
            matches!((value, median), (Some(value), Some(median)) if value >= median)
        };
        match (
            at_or_above(growth, growth_median),
            at_or_above(margin, margin_median),
        ) {
            (true, true) => Self::Leader,
            (true, false) => Self::Grower,
            (false, true) => Self::Harvester,
            (false, false) => Self::Laggard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRow {
    pub ticker: Ticker,
    pub name: String,
    pub revenue_cagr: Option<f64>,
    pub net_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub fcf_yield: Option<f64>,
    pub positioning: Positioning,
}

/// Comparison set of one group at one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerComparison {
    pub group: &'static str,
    pub segment: MarketSegment,
    pub refreshed_at: UtcDateTime,
    pub growth_median: Option<f64>,
    pub margin_median: Option<f64>,
    pub rows: Vec<PeerRow>,
    /// Members that could not be resolved at refresh time.
    pub omitted: Vec<Ticker>,
}

impl PeerComparison {
    /// Builds rows from already-fetched snapshots.
    pub fn from_batch(group: &PeerGroup, batch: &BatchResult) -> Self {
        let snapshots = batch
            .entries
            .iter()
            .map(|entry| &entry.snapshot)
            .collect::<Vec<_>>();

        let growth_median = median(snapshots.iter().filter_map(|s| s.revenue_cagr()));
        let margin_median = median(snapshots.iter().filter_map(|s| s.net_margin));

        let rows = snapshots
            .iter()
            .map(|snapshot| peer_row(snapshot, growth_median, margin_median))
            .collect();

        Self {
            group: group.name,
            segment: group.segment,
            refreshed_at: UtcDateTime::now(),
            growth_median,
            margin_median,
            rows,
            omitted: batch.omitted.clone(),
        }
    }
}

fn peer_row(
    snapshot: &FinancialSnapshot,
    growth_median: Option<f64>,
    margin_median: Option<f64>,
) -> PeerRow {
    let revenue_cagr = snapshot.revenue_cagr();
    let yield_ = snapshot.free_cash_flow.map(|fcf| {
        fcf_yield(
            currency::correct(&snapshot.ticker, fcf),
            snapshot.market_cap,
        )
    });
    PeerRow {
        ticker: snapshot.ticker.clone(),
        name: snapshot.name.clone(),
        revenue_cagr,
        net_margin: snapshot.net_margin,
        return_on_equity: snapshot.return_on_equity,
        fcf_yield: yield_,
        positioning: Positioning::place(
            revenue_cagr,
            snapshot.net_margin,
            growth_median,
            margin_median,
        ),
    }
}

/// Median of the finite values, `None` when there are none.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut values = values
        .into_iter()
        .filter(|value| value.is_finite())
        .collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    })
}

/// Session-scoped store of peer comparisons.
///
/// Owned by whoever needs it and passed in explicitly; clones share the same
/// entries.
#[derive(Debug, Clone, Default)]
pub struct PeerGroupCache {
    entries: Arc<RwLock<HashMap<&'static str, Arc<PeerComparison>>>>,
}

impl PeerGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every member of `group` and replaces its cached comparison.
    pub async fn refresh(
        &self,
        group: &PeerGroup,
        fetcher: &BatchFetcher,
        ctx: &FetchContext,
    ) -> Arc<PeerComparison> {
        let batch = fetcher.fetch_many(&group.tickers(), ctx).await;
        let comparison = Arc::new(PeerComparison::from_batch(group, &batch));
        info!(
            group = group.name,
            rows = comparison.rows.len(),
            omitted = comparison.omitted.len(),
            "peer group refreshed"
        );
        self.insert(Arc::clone(&comparison)).await;
        comparison
    }

    pub async fn insert(&self, comparison: Arc<PeerComparison>) {
        self.entries
            .write()
            .await
            .insert(comparison.group, comparison);
    }

    /// The last refreshed comparison; never fetches.
    pub async fn get(&self, group: &str) -> Option<Arc<PeerComparison>> {
        let group = find(group).ok()?;
        self.entries.read().await.get(group.name).cloned()
    }
}
