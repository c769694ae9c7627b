use fundex_core::table::{decision_label, status_label};
use fundex_core::{CoreError, DeepDive, Locale, ValuationService};
use serde::Serialize;

use crate::cli::ValueArgs;
use crate::error::CliError;

use super::{valuation_parameters, CommandResult};

#[derive(Debug, Serialize)]
struct Labels {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    decision: &'static str,
}

#[derive(Debug, Serialize)]
struct ValueResponseData<'a> {
    #[serde(flatten)]
    dive: &'a DeepDive,
    labels: Labels,
}

pub async fn run(
    args: &ValueArgs,
    service: &ValuationService,
    locale: Locale,
) -> Result<CommandResult, CliError> {
    let params = valuation_parameters(&args.valuation);

    let dive = match service.deep_dive(&args.input, &params).await {
        Ok(dive) => dive,
        Err(CoreError::Unresolved(unresolved)) => return Ok(CommandResult::unresolved(&unresolved)),
        Err(error) => return Err(error.into()),
    };

    let mut warnings = dive.resolved.warnings();
    if let Some(reason) = &dive.valuation_error {
        warnings.push(format!("valuation unavailable: {reason}"));
    }
    let labels = Labels {
        status: dive.status.map(|status| status_label(status, locale)),
        decision: decision_label(dive.decision, locale),
    };
    let data = serde_json::to_value(ValueResponseData {
        dive: &dive,
        labels,
    })?;

    Ok(CommandResult::ok(data, dive.resolved.chain.clone())
        .with_warnings(warnings)
        .with_cache_hit(dive.cache_hit))
}
