use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown entity kind `{kind}`")]
    UnknownKind { kind: String },
    #[error("validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
