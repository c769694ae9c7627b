mod groups;
mod normalize;
mod peers;
mod screen;
mod snapshot;
mod value;

use std::time::Instant;

use fundex_core::{
    CacheMode, EngineConfig, Envelope, EnvelopeError, PeerGroupCache, ProviderId, UnresolvedSymbolError,
    ValuationParameters, ValuationService,
};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command, ValuationArgs};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            cache_hit: false,
            source_chain,
        }
    }

    /// Null data plus one envelope error per failed provider attempt.
    pub fn unresolved(error: &UnresolvedSymbolError) -> Self {
        Self::ok(Value::Null, error.chain.clone()).with_errors(EnvelopeError::from_unresolved(error))
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let service = build_service(cli)?;
    let started = Instant::now();

    let command_result = match &cli.command {
        Command::Normalize(args) => normalize::run(args, &service)?,
        Command::Snapshot(args) => snapshot::run(args, &service).await?,
        Command::Value(args) => value::run(args, &service, cli.lang).await?,
        Command::Screen(args) => screen::run(args, &service, cli.lang).await?,
        Command::Peers(args) => peers::run(args, &service, cli.lang).await?,
        Command::Groups => groups::run(&service)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        cache_hit,
        source_chain,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut metadata = Metadata::new(source_chain, latency_ms, cache_hit);
    for warning in warnings {
        metadata.push_warning(warning);
    }
    debug!(request_id = %metadata.request_id, latency_ms, "command finished");

    let meta = metadata.into_envelope_meta()?;
    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

/// Environment configuration first, then command-line overrides.
fn build_service(cli: &Cli) -> Result<ValuationService, CliError> {
    let mut config = EngineConfig::from_env()?;
    if cli.mock {
        config = config.with_mock(true);
    }
    if let Some(max_concurrency) = cli.max_concurrency {
        config = config.with_max_concurrency(max_concurrency)?;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_request_timeout_ms(timeout_ms);
    }

    let service = ValuationService::from_config(&config, PeerGroupCache::new());
    Ok(if cli.refresh_cache {
        service.with_cache_mode(CacheMode::Refresh)
    } else {
        service
    })
}

fn valuation_parameters(args: &ValuationArgs) -> ValuationParameters {
    let mut params = ValuationParameters::default()
        .with_growth_override(args.growth)
        .requiring_positive_cash_flow(args.strict_fcf);
    if let Some(discount) = args.discount {
        params = params.with_discount_rate(discount);
    }
    if let Some(segment) = args.segment {
        params = params.with_segment(segment);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundex_core::MarketSegment;

    #[test]
    fn valuation_flags_override_the_defaults() {
        let args = ValuationArgs {
            discount: Some(0.12),
            growth: None,
            segment: Some(MarketSegment::Technology),
            strict_fcf: true,
        };
        let params = valuation_parameters(&args);

        assert_eq!(params.discount_rate, 0.12);
        assert_eq!(params.growth_override, None);
        assert_eq!(params.segment, MarketSegment::Technology);
        assert!(params.require_positive_cash_flow);
    }

    #[test]
    fn unresolved_results_carry_one_error_per_attempt() {
        let error = UnresolvedSymbolError {
            ticker: fundex_core::Ticker::from(""),
            chain: Vec::new(),
            attempts: Vec::new(),
        };
        let result = CommandResult::unresolved(&error);

        assert_eq!(result.data, Value::Null);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "symbol.unresolved");
    }
}
