use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::Response;
use thiserror::Error;

use crate::application::store::StoreError;
use crate::infra::error::InfraError;

/// Internal error detail carried through response extensions so the
/// request middleware can log the full cause chain. Clients only ever
/// see the public envelope message.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub chain: Vec<String>,
}

/// Every message in an error's cause chain, outermost first.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut cause = error.source();
    while let Some(err) = cause {
        chain.push(err.to_string());
        cause = err.source();
    }
    chain
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        Self {
            source,
            status,
            chain: error_chain(error),
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            chain: vec![message.into()],
        }
    }

    pub fn install(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Errors surfaced by resource operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("No document found with that ID")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(StoreError),
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound => StatusCode::NOT_FOUND,
            ResourceError::Validation(_) => StatusCode::BAD_REQUEST,
            ResourceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to place in the response envelope. Store failures
    /// keep their detail out of client responses.
    pub fn public_message(&self) -> String {
        match self {
            ResourceError::NotFound | ResourceError::Validation(_) => self.to_string(),
            ResourceError::Store(_) => "Internal server error".to_string(),
        }
    }
}

impl From<StoreError> for ResourceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { message } | StoreError::InvalidInput { message } => {
                ResourceError::Validation(message)
            }
            StoreError::UniqueViolation { field } => {
                ResourceError::Validation(format!("duplicate value for unique field `{field}`"))
            }
            err @ (StoreError::Timeout | StoreError::Unavailable(_)) => ResourceError::Store(err),
        }
    }
}

/// Errors that abort process startup or a CLI command. Config and
/// usage messages already name their subject, so both print bare.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{0}")]
    Usage(String),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
