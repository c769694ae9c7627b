use fundex_core::table::PEER_COLUMNS;
use fundex_core::{
    peer_group, Locale, LocalizedTable, MarketSegment, PeerComparison, Ticker, UtcDateTime,
    ValuationService,
};
use serde::Serialize;

use crate::cli::PeersArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct PeersResponseData<'a> {
    group: &'static str,
    title: &'static str,
    segment: MarketSegment,
    refreshed_at: UtcDateTime,
    growth_median: Option<f64>,
    margin_median: Option<f64>,
    table: LocalizedTable,
    omitted: &'a [Ticker],
}

#[derive(Debug, Serialize)]
struct NotCachedData {
    group: &'static str,
    title: &'static str,
    cached: bool,
}

/// One invocation is one session: without `--refresh` there is never a
/// comparison to show, and the response says so instead of fetching.
pub async fn run(
    args: &PeersArgs,
    service: &ValuationService,
    locale: Locale,
) -> Result<CommandResult, CliError> {
    let group = peer_group::find(&args.group)?;

    let comparison = if args.refresh {
        Some(service.refresh_peer_group(group.name).await?)
    } else {
        service.peer_group(group.name).await?
    };

    let Some(comparison) = comparison else {
        let data = serde_json::to_value(NotCachedData {
            group: group.name,
            title: group.title,
            cached: false,
        })?;
        return Ok(CommandResult::ok(data, Vec::new()).with_warning(format!(
            "peer group '{}' has not been refreshed; pass --refresh to fetch it",
            group.name
        )));
    };

    let warnings = omitted_warnings(&comparison);
    let data = serde_json::to_value(PeersResponseData {
        group: comparison.group,
        title: group.title,
        segment: comparison.segment,
        refreshed_at: comparison.refreshed_at,
        growth_median: comparison.growth_median,
        margin_median: comparison.margin_median,
        table: LocalizedTable::build(&PEER_COLUMNS, &comparison.rows, locale),
        omitted: &comparison.omitted,
    })?;

    Ok(CommandResult::ok(data, service.cascade().providers())
        .with_warnings(warnings)
        .with_cache_hit(!args.refresh))
}

fn omitted_warnings(comparison: &PeerComparison) -> Vec<String> {
    comparison
        .omitted
        .iter()
        .map(|ticker| format!("{ticker} omitted from '{}': no snapshot", comparison.group))
        .collect()
}
