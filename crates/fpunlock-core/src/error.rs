use thiserror::Error;

/// Result alias for core operations.
pub type FpUnlockResult<T> = Result<T, FpUnlockError>;

#[derive(Error, Debug)]
pub enum FpUnlockError {
    #[error("[FU1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[FU1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[FU1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[FU1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[FU2000] bus service unavailable: {0}")]
    BusUnavailable(String),

    #[error("[FU2001] no session matches {0}")]
    SessionNotFound(String),

    #[error("[FU2100] {operation} failed: {reason}")]
    CallFailed { operation: String, reason: String },
}

impl FpUnlockError {
    pub fn code(&self) -> &'static str {
        match self {
            FpUnlockError::Io(_) => "FU1000",
            FpUnlockError::Toml(_) => "FU1001",
            FpUnlockError::Yaml(_) => "FU1002",
            FpUnlockError::InvalidConfig(_) => "FU1100",
            FpUnlockError::BusUnavailable(_) => "FU2000",
            FpUnlockError::SessionNotFound(_) => "FU2001",
            FpUnlockError::CallFailed { .. } => "FU2100",
        }
    }

    /// Shorthand for wrapping a failed remote call with the operation name.
    pub fn call_failed(operation: &str, reason: impl ToString) -> Self {
        FpUnlockError::CallFailed {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that mean "the bus is not ready yet" and warrant a deferred retry
    /// rather than a hard failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FpUnlockError::BusUnavailable(_)
                | FpUnlockError::SessionNotFound(_)
                | FpUnlockError::CallFailed { .. }
        )
    }
}
