//! Facade the presentation layer talks to.
//!
//! [`ValuationService`] owns the normalizer, the cascade, the batch fetcher
//! and both TTL caches. The peer-group cache is injected so its lifetime is
//! the caller's session, not the service's.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::batch::{BatchFetcher, BatchResult};
use crate::cache::{CacheMode, Cached, TtlCache};
use crate::cascade::{ResolutionCascade, ResolvedSnapshot, UnresolvedSymbolError};
use crate::config::{EngineConfig, DEFAULT_SCREEN_TTL, DEFAULT_SNAPSHOT_TTL};
use crate::error::{CoreError, ValidationError, ValuationError};
use crate::http_client::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::normalizer::SymbolNormalizer;
use crate::peer_group::{self, PeerComparison, PeerGroup, PeerGroupCache, PEER_GROUPS};
use crate::provider::{CancelToken, FetchContext};
use crate::signals::{trend_signal, Decision, GridLevels, TrendSignal};
use crate::table::{ScreenRow, ScreenTable, SkippedSymbol};
use crate::valuation::{
    value_snapshot, ScoreWeights, ValuationParameters, ValuationResult, ValuationStatus,
};
use crate::{AnnualRecord, ProviderId, Ticker};

/// Minimum thresholds applied to valued screen rows, as fractions.
///
/// A row missing a filtered figure does not pass that filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScreenFilters {
    pub min_roe: Option<f64>,
    pub min_fcf_yield: Option<f64>,
    pub min_upside: Option<f64>,
}

impl ScreenFilters {
    pub fn accepts(&self, row: &ScreenRow) -> bool {
        let passes = |min: Option<f64>, value: Option<f64>| match min {
            Some(min) => value.is_some_and(|value| value >= min),
            None => true,
        };
        passes(self.min_roe, row.return_on_equity)
            && passes(self.min_fcf_yield, Some(row.valuation.fcf_yield))
            && passes(self.min_upside, Some(row.valuation.upside))
    }
}

/// Everything the single-symbol view shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepDive {
    pub resolved: ResolvedSnapshot,
    pub cache_hit: bool,
    pub valuation: Option<ValuationResult>,
    /// Why `valuation` is absent.
    pub valuation_error: Option<String>,
    pub status: Option<ValuationStatus>,
    pub trend: Option<TrendSignal>,
    pub decision: Decision,
    pub grid: GridLevels,
    pub daily_change: Option<f64>,
    pub revenue_cagr: Option<f64>,
    pub trailing_pe: Option<f64>,
}

impl DeepDive {
    /// Annual figures, oldest first.
    pub fn history(&self) -> &[AnnualRecord] {
        &self.resolved.snapshot.history
    }

    pub fn price_history(&self) -> &[f64] {
        &self.resolved.snapshot.price_history
    }
}

pub struct ValuationService {
    normalizer: SymbolNormalizer,
    cascade: Arc<ResolutionCascade>,
    fetcher: BatchFetcher,
    snapshot_cache: TtlCache<Ticker, ResolvedSnapshot>,
    screen_cache: TtlCache<Vec<Ticker>, BatchResult>,
    peer_groups: PeerGroupCache,
    weights: ScoreWeights,
    cache_mode: CacheMode,
    request_timeout: Duration,
    batch_deadline: Option<Duration>,
    cancel: CancelToken,
}

impl std::fmt::Debug for ValuationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValuationService")
            .field("cascade", &self.cascade)
            .field("max_concurrency", &self.fetcher.max_concurrency())
            .field("weights", &self.weights)
            .field("cache_mode", &self.cache_mode)
            .field("request_timeout", &self.request_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .finish_non_exhaustive()
    }
}

impl ValuationService {
    pub fn new(cascade: Arc<ResolutionCascade>, peer_groups: PeerGroupCache) -> Self {
        Self {
            normalizer: SymbolNormalizer::builtin(),
            fetcher: BatchFetcher::new(Arc::clone(&cascade)),
            cascade,
            snapshot_cache: TtlCache::new(DEFAULT_SNAPSHOT_TTL),
            screen_cache: TtlCache::new(DEFAULT_SCREEN_TTL),
            peer_groups,
            weights: ScoreWeights::default(),
            cache_mode: CacheMode::Use,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            batch_deadline: None,
            cancel: CancelToken::new(),
        }
    }

    /// Builds the cascade and caches described by `config`.
    pub fn from_config(config: &EngineConfig, peer_groups: PeerGroupCache) -> Self {
        let cascade = Arc::new(config.cascade_builder().build());
        let mut service = Self::new(cascade, peer_groups)
            .with_max_concurrency(config.max_concurrency)
            .with_ttls(config.snapshot_ttl, config.screen_ttl);
        service.request_timeout = config.request_timeout();
        service.batch_deadline = config.batch_deadline;
        service
    }

    pub fn with_normalizer(mut self, normalizer: SymbolNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.fetcher = self.fetcher.with_max_concurrency(max_concurrency);
        self
    }

    /// Replaces both caches; a zero TTL disables that cache.
    pub fn with_ttls(mut self, snapshot_ttl: Duration, screen_ttl: Duration) -> Self {
        self.snapshot_cache = TtlCache::new(snapshot_ttl);
        self.screen_cache = TtlCache::new(screen_ttl);
        self
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_batch_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.batch_deadline = deadline;
        self
    }

    /// Token that aborts every in-flight and future request of this service.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cascade(&self) -> &Arc<ResolutionCascade> {
        &self.cascade
    }

    pub fn peer_groups(&self) -> &PeerGroupCache {
        &self.peer_groups
    }

    pub fn normalize(&self, raw: &str) -> Ticker {
        self.normalizer.normalize(raw)
    }

    /// Resolves one symbol through the snapshot cache.
    pub async fn resolve(
        &self,
        raw: &str,
    ) -> Result<Cached<ResolvedSnapshot>, UnresolvedSymbolError> {
        let ticker = self.normalize(raw);
        let ctx = self.call_context();
        let cascade = Arc::clone(&self.cascade);
        self.snapshot_cache
            .try_cached(ticker.clone(), self.cache_mode, || async move {
                cascade.resolve(&ticker, &ctx).await
            })
            .await
    }

    /// Resolves one symbol with an explicit provider order. Never cached,
    /// since the result depends on the order.
    pub async fn resolve_with(
        &self,
        raw: &str,
        providers: &[ProviderId],
    ) -> Result<ResolvedSnapshot, UnresolvedSymbolError> {
        let ticker = self.normalize(raw);
        self.cascade
            .resolve_in_order(&ticker, providers, &self.call_context())
            .await
    }

    /// Snapshot, valuation and trend read for one symbol.
    ///
    /// # Errors
    ///
    /// Fails eagerly on malformed `params` and when the symbol cannot be
    /// resolved. A snapshot that resolves but cannot be valued is not an
    /// error: the reason lands in [`DeepDive::valuation_error`].
    pub async fn deep_dive(
        &self,
        raw: &str,
        params: &ValuationParameters,
    ) -> Result<DeepDive, CoreError> {
        params.validate()?;
        let Cached { value: resolved, cache_hit } = self.resolve(raw).await?;
        let snapshot = &resolved.snapshot;

        let (valuation, valuation_error) = match value_snapshot(snapshot, params, &self.weights) {
            Ok(result) => (Some(result), None),
            Err(error) => {
                debug!(ticker = %snapshot.ticker, error = %error, "deep dive without valuation");
                (None, Some(error.to_string()))
            }
        };
        let status = valuation.as_ref().and_then(|result| result.status);
        let trend = trend_signal(&snapshot.price_history);

        Ok(DeepDive {
            cache_hit,
            valuation,
            valuation_error,
            status,
            decision: Decision::decide(status, trend.map(|signal| signal.score)),
            trend,
            grid: GridLevels::around(snapshot.price),
            daily_change: snapshot.daily_change(),
            revenue_cagr: snapshot.revenue_cagr(),
            trailing_pe: snapshot.trailing_pe,
            resolved,
        })
    }

    /// Values a set of symbols and ranks them by composite score.
    ///
    /// The batch resolution is cached under the sorted, de-duplicated ticker
    /// set, so the same symbols in another order share one entry. A batch cut
    /// short by the deadline or cancellation, or one where no symbol resolved,
    /// is returned but not cached.
    ///
    /// # Errors
    ///
    /// Only malformed `params`; per-symbol failures end up in
    /// [`ScreenTable::skipped`] or [`ScreenTable::omitted`].
    pub async fn screen<S: AsRef<str>>(
        &self,
        raws: &[S],
        params: &ValuationParameters,
        filters: &ScreenFilters,
    ) -> Result<Cached<ScreenTable>, ValuationError> {
        params.validate()?;

        let mut tickers = raws
            .iter()
            .map(|raw| self.normalize(raw.as_ref()))
            .collect::<Vec<_>>();
        tickers.sort();
        tickers.dedup();

        let ctx = self.batch_context();
        let fetcher = self.fetcher.clone();
        let key = tickers.clone();
        // Err carries a batch that is served once but never stored.
        let outcome = self
            .screen_cache
            .try_cached(key, self.cache_mode, || async move {
                let batch = fetcher.fetch_many(&tickers, &ctx).await;
                if ctx.is_expired() || ctx.cancel.is_cancelled() || batch.entries.is_empty() {
                    Err(batch)
                } else {
                    Ok(batch)
                }
            })
            .await;
        let Cached { value: batch, cache_hit } = outcome.unwrap_or_else(|batch: BatchResult| {
            debug!(omitted = batch.omitted.len(), "incomplete screen batch not cached");
            Cached {
                value: batch,
                cache_hit: false,
            }
        });

        let mut rows = Vec::with_capacity(batch.entries.len());
        let mut skipped = Vec::new();
        for entry in &batch.entries {
            let snapshot = &entry.snapshot;
            match value_snapshot(snapshot, params, &self.weights) {
                Ok(valuation) => rows.push(ScreenRow::new(snapshot, valuation)),
                Err(error) => skipped.push(SkippedSymbol {
                    ticker: snapshot.ticker.clone(),
                    reason: error.to_string(),
                }),
            }
        }

        let valued = rows.len();
        rows.retain(|row| filters.accepts(row));
        rows.sort_by(|a, b| b.valuation.score.total_cmp(&a.valuation.score));

        info!(
            requested = raws.len(),
            rows = rows.len(),
            skipped = skipped.len(),
            omitted = batch.omitted.len(),
            cache_hit,
            "screen finished"
        );
        Ok(Cached {
            value: ScreenTable {
                filtered_out: valued - rows.len(),
                rows,
                skipped,
                omitted: batch.omitted,
            },
            cache_hit,
        })
    }

    /// Fetches every member of the named group and replaces its comparison.
    pub async fn refresh_peer_group(
        &self,
        name: &str,
    ) -> Result<Arc<PeerComparison>, ValidationError> {
        let group = peer_group::find(name)?;
        Ok(self
            .peer_groups
            .refresh(group, &self.fetcher, &self.batch_context())
            .await)
    }

    /// Last refreshed comparison of the named group; never fetches.
    pub async fn peer_group(
        &self,
        name: &str,
    ) -> Result<Option<Arc<PeerComparison>>, ValidationError> {
        let group = peer_group::find(name)?;
        Ok(self.peer_groups.get(group.name).await)
    }

    pub fn groups(&self) -> &'static [PeerGroup] {
        PEER_GROUPS
    }

    fn call_context(&self) -> FetchContext {
        FetchContext::new()
            .with_call_timeout(self.request_timeout)
            .with_cancel(self.cancel.clone())
    }

    fn batch_context(&self) -> FetchContext {
        let ctx = self.call_context();
        match self.batch_deadline {
            Some(budget) => ctx.with_deadline_in(budget),
            None => ctx,
        }
    }
}
