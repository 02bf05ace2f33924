//! # AppError
//!
//! Centralized error handling for the Petamini engines.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

use crate::models::Post;

/// The primary error type for all pm-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced entity is absent (e.g., Item, Purchase, Post, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Malformed or out-of-range request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invoice asked for more units than are currently available
    #[error("not enough units available: requested {requested}, available {available}")]
    InsufficientInventory { requested: i64, available: i64 },

    /// A link in the content was already posted
    #[error("link already posted: {link}")]
    DuplicateLink { link: String, existing: Box<Post> },

    /// No pending purchase matches the invoice token any more
    #[error("purchase not found or already processed: {0}")]
    AlreadyProcessed(String),

    /// Ownership violation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store timeout or unavailability; safe to retry
    #[error("store temporarily unavailable: {0}")]
    Transient(String),

    /// Oversold inventory detected at settlement; needs manual reconciliation
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The bot gateway could not deliver an invoice
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Store failure wrapped with operation context
    #[error("store error: {0:#}")]
    Store(anyhow::Error),

    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable category exposed to API callers.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::NotFound(..) => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InsufficientInventory { .. } => "conflict",
            AppError::DuplicateLink { .. } => "duplicate_link",
            AppError::AlreadyProcessed(_) => "conflict",
            AppError::Forbidden(_) => "forbidden",
            AppError::Transient(_) => "transient_store_error",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::Gateway(_) => "settlement_error",
            AppError::Store(_) | AppError::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        AppError::NotFound(entity.to_string(), id.to_string())
    }
}

/// A specialized Result type for Petamini logic.
pub type Result<T> = std::result::Result<T, AppError>;
