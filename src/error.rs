//! Application-wide error types.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("pipeline environment error: {0}")]
    Environment(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("docs error: {0}")]
    Docs(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Category reported in step telemetry.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Config(_) | AppError::Validation(_) => ErrorCategory::Configuration,
            AppError::Exec(_) => ErrorCategory::Build,
            AppError::Environment(_) | AppError::Io(_) => ErrorCategory::Infrastructure,
            AppError::Docs(_) | AppError::Logger(_) => ErrorCategory::Undefined,
        }
    }
}

/// Coarse failure classes used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCategory {
    #[default]
    Undefined,
    Build,
    Compliance,
    Configuration,
    Custom,
    Infrastructure,
    Service,
    Test,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Undefined => "undefined",
            ErrorCategory::Build => "build",
            ErrorCategory::Compliance => "compliance",
            ErrorCategory::Configuration => "config",
            ErrorCategory::Custom => "custom",
            ErrorCategory::Infrastructure => "infrastructure",
            ErrorCategory::Service => "service",
            ErrorCategory::Test => "test",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
