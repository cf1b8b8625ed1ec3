//! Store error types

use crate::slashing::SlashingKind;
use thiserror::Error;

/// Errors returned by the slashing-protection store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Signing the checked message would be a slashable offense
    #[error("slashable offense: {0}")]
    Slashable(SlashingKind),

    /// Malformed input rejected at the store boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller's context was cancelled before its batch was flushed
    #[error("operation cancelled")]
    Cancelled,

    /// Failure in the underlying key-value engine
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation attempted after the store was closed
    #[error("store is not open")]
    NotOpen,
}

impl StoreError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// The slashing verdict carried by this error, if any.
    pub fn slashing_kind(&self) -> Option<SlashingKind> {
        match self {
            Self::Slashable(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<crate::api::EngineError> for StoreError {
    fn from(err: crate::api::EngineError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
