use fundex_core::ValuationService;

use crate::error::CliError;

use super::CommandResult;

pub fn run(service: &ValuationService) -> Result<CommandResult, CliError> {
    let data = serde_json::to_value(service.groups())?;
    Ok(CommandResult::ok(data, Vec::new()))
}
