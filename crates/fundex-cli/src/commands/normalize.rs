use fundex_core::normalizer::known_name;
use fundex_core::{MarketClass, Ticker, ValuationService};
use serde::Serialize;

use crate::cli::NormalizeArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct NormalizeResponseData<'a> {
    input: &'a str,
    ticker: Ticker,
    market_class: MarketClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
}

/// Pure lookup: no provider is consulted, so the source chain stays empty.
pub fn run(args: &NormalizeArgs, service: &ValuationService) -> Result<CommandResult, CliError> {
    let ticker = service.normalize(&args.input);
    ticker.validate()?;

    let data = serde_json::to_value(NormalizeResponseData {
        input: args.input.as_str(),
        market_class: ticker.market_class(),
        name: known_name(&ticker),
        ticker,
    })?;
    Ok(CommandResult::ok(data, Vec::new()))
}
