//! Generation failures. Every variant is terminal for one request; nothing is retried here.

use crate::completion::ProviderError;
use crate::store::StoreError;

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("message generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("the model returned no usable messages")]
    EmptyResult,

    /// Generation succeeded but the rows were not saved. The content travels with the error.
    #[error("generated messages could not be saved: {source}")]
    Storage {
        messages: Vec<String>,
        #[source]
        source: StoreError,
    },

    #[error("misconfiguration: {0}")]
    Config(String),

    /// Store failure while loading records, before anything was generated.
    #[error("record lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

impl GenerationError {
    /// Stable machine-readable tag for callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Provider(_) => "provider",
            Self::EmptyResult => "empty_result",
            Self::Storage { .. } => "storage",
            Self::Config(_) => "config",
            Self::Lookup(_) => "lookup",
        }
    }

    /// Worth offering "try again" without changing the input.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(ProviderError::NotConfigured) => false,
            Self::Provider(_) | Self::EmptyResult | Self::Storage { .. } | Self::Lookup(_) => true,
            _ => false,
        }
    }

    /// Messages produced before a storage failure, if any.
    pub fn unsaved_messages(&self) -> Option<&[String]> {
        match self {
            Self::Storage { messages, .. } => Some(messages),
            _ => None,
        }
    }
}
