use fundex_core::{
    Locale, LocalizedTable, ProviderId, ScreenFilters, SkippedSymbol, Ticker, ValuationService,
};
use serde::Serialize;

use crate::cli::ScreenArgs;
use crate::error::CliError;

use super::{valuation_parameters, CommandResult};

#[derive(Debug, Serialize)]
struct ScreenResponseData<'a> {
    table: LocalizedTable,
    filters: ScreenFilters,
    filtered_out: usize,
    skipped: &'a [SkippedSymbol],
    omitted: &'a [Ticker],
}

pub async fn run(
    args: &ScreenArgs,
    service: &ValuationService,
    locale: Locale,
) -> Result<CommandResult, CliError> {
    let params = valuation_parameters(&args.valuation);
    let filters = ScreenFilters {
        min_roe: args.min_roe,
        min_fcf_yield: args.min_fcf_yield,
        min_upside: args.min_upside,
    };

    let screened = service.screen(&args.inputs, &params, &filters).await?;
    let table = &screened.value;

    let mut source_chain = Vec::<ProviderId>::new();
    for row in &table.rows {
        if !source_chain.contains(&row.source) {
            source_chain.push(row.source);
        }
    }

    let mut warnings = Vec::new();
    for skipped in &table.skipped {
        warnings.push(format!("{} skipped: {}", skipped.ticker, skipped.reason));
    }
    for ticker in &table.omitted {
        warnings.push(format!("{ticker} omitted: no provider returned a snapshot"));
    }

    let data = serde_json::to_value(ScreenResponseData {
        table: table.localized(locale),
        filters,
        filtered_out: table.filtered_out,
        skipped: &table.skipped,
        omitted: &table.omitted,
    })?;

    Ok(CommandResult::ok(data, source_chain)
        .with_warnings(warnings)
        .with_cache_hit(screened.cache_hit))
}
