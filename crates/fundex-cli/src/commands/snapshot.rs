use fundex_core::{Cached, ValuationService};

use crate::cli::SnapshotArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SnapshotArgs, service: &ValuationService) -> Result<CommandResult, CliError> {
    let outcome = if args.providers.is_empty() {
        service.resolve(&args.input).await
    } else {
        service
            .resolve_with(&args.input, &args.providers)
            .await
            .map(|value| Cached {
                value,
                cache_hit: false,
            })
    };

    match outcome {
        Ok(Cached {
            value: resolved,
            cache_hit,
        }) => {
            let warnings = resolved.warnings();
            let source_chain = resolved.chain.clone();
            let data = serde_json::to_value(&resolved)?;
            Ok(CommandResult::ok(data, source_chain)
                .with_warnings(warnings)
                .with_cache_hit(cache_hit))
        }
        Err(unresolved) => Ok(CommandResult::unresolved(&unresolved)),
    }
}
