//! Domain error types.

/// Top-level error type for quantlab.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol} on {market}")]
    NoData { symbol: String, market: String },

    #[error("factor not registered: {0}")]
    UnknownFactor(String),

    #[error("factor already registered: {0}")]
    DuplicateFactor(String),

    #[error("unsupported strategy: {key} (available: {available})")]
    UnknownStrategy { key: String, available: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        QuantError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Process exit status: 2 for an unknown strategy key, 1 for any runtime error.
    pub fn exit_status(&self) -> u8 {
        match self {
            QuantError::UnknownStrategy { .. } => 2,
            _ => 1,
        }
    }
}

impl From<&QuantError> for std::process::ExitCode {
    fn from(err: &QuantError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
