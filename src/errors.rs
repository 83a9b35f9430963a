use thiserror::Error;

use crate::crypto::CryptoError;

/// Service-level error taxonomy surfaced by the ledger, the fulfillment
/// engine and the credential store.
///
/// `NotFound` covers both absent rows and cross-tenant access attempts —
/// callers cannot tell the two apart. `InsufficientStock` means a decrement
/// would have driven a product quantity below zero.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}
