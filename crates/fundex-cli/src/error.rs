use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] fundex_core::ValidationError),

    #[error(transparent)]
    Valuation(#[from] fundex_core::ValuationError),

    #[error(transparent)]
    Config(#[from] fundex_core::ConfigError),

    #[error(transparent)]
    Unresolved(#[from] fundex_core::UnresolvedSymbolError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<fundex_core::CoreError> for CliError {
    fn from(error: fundex_core::CoreError) -> Self {
        use fundex_core::CoreError;

        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Valuation(error) => Self::Valuation(error),
            CoreError::Unresolved(error) => Self::Unresolved(error),
            CoreError::Config(error) => Self::Config(error),
            CoreError::Serialization(error) => Self::Serialization(error),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Valuation(_) => 2,
            Self::Config(_) => 2,
            Self::Unresolved(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
