use crate::accounts::AccountError;
use crate::config::ConfigError;
use crate::email::EmailError;
use crate::requests::RequestServiceError;
use crate::telemetry::TelemetryError;
use std::fmt;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

/// Process-level failures surfaced by the binary and the health endpoints.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Email(EmailError),
    Repository(RepositoryError),
    Account(AccountError),
    Request(RequestServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Email(err) => write!(f, "email error: {}", err),
            AppError::Repository(err) => write!(f, "storage error: {}", err),
            AppError::Account(err) => write!(f, "account error: {}", err),
            AppError::Request(err) => write!(f, "request error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Email(err) => Some(err),
            AppError::Repository(err) => Some(err),
            AppError::Account(err) => Some(err),
            AppError::Request(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EmailError> for AppError {
    fn from(value: EmailError) -> Self {
        Self::Email(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

impl From<AccountError> for AppError {
    fn from(value: AccountError) -> Self {
        Self::Account(value)
    }
}

impl From<RequestServiceError> for AppError {
    fn from(value: RequestServiceError) -> Self {
        Self::Request(value)
    }
}
