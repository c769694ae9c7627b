//! Best-effort concurrent resolution of many tickers.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cascade::{ResolutionCascade, ResolvedSnapshot};
use crate::provider::FetchContext;
use crate::Ticker;

/// Concurrent cascade runs per batch unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Outcome of one batch. Partial results are the normal case.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Resolved tickers, in input order.
    pub entries: Vec<ResolvedSnapshot>,
    /// Tickers that produced no snapshot, in input order.
    pub omitted: Vec<Ticker>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs the cascade for many tickers on a bounded pool of tasks.
///
/// A failing ticker is logged and omitted; it never aborts the batch and its
/// error never reaches the caller.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    cascade: Arc<ResolutionCascade>,
    max_concurrency: usize,
}

impl BatchFetcher {
    pub fn new(cascade: Arc<ResolutionCascade>) -> Self {
        Self {
            cascade,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Zero is raised to one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn cascade(&self) -> &Arc<ResolutionCascade> {
        &self.cascade
    }

    /// Resolves every ticker and waits for all of them.
    ///
    /// The deadline and cancel token in `ctx` bound each cascade run, so a
    /// cancelled or expired batch still returns, with the unfinished tickers
    /// omitted.
    pub async fn fetch_many(&self, tickers: &[Ticker], ctx: &FetchContext) -> BatchResult {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, ticker) in tickers.iter().cloned().enumerate() {
            let cascade = Arc::clone(&self.cascade);
            let permits = Arc::clone(&permits);
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = cascade.resolve(&ticker, &ctx).await;
                (index, outcome)
            });
        }

        let mut resolved = Vec::with_capacity(tickers.len());
        // indices still here at the end failed or their task panicked
        let mut pending = (0..tickers.len()).collect::<BTreeSet<_>>();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(snapshot))) => {
                    pending.remove(&index);
                    resolved.push((index, snapshot));
                }
                Ok((_, Err(error))) => {
                    warn!(
                        ticker = %error.ticker,
                        chain = ?error.chain,
                        attempts = error.attempts.len(),
                        "omitting unresolved ticker from batch"
                    );
                }
                Err(error) => warn!(error = %error, "batch task failed"),
            }
        }

        resolved.sort_by_key(|(index, _)| *index);
        let entries = resolved
            .into_iter()
            .map(|(_, snapshot)| snapshot)
            .collect::<Vec<_>>();
        let omitted = pending
            .into_iter()
            .filter_map(|index| tickers.get(index).cloned())
            .collect::<Vec<_>>();
        debug!(
            requested = tickers.len(),
            resolved = entries.len(),
            omitted = omitted.len(),
            "batch finished"
        );
        BatchResult { entries, omitted }
    }
}
