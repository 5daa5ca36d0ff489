//! Ledger Error Types
//!
//! One taxonomy for every command the core exposes. The presentation layer
//! maps `code()` to user-facing text; the core never formats messages for
//! display.

use thiserror::Error;

use crate::core_types::Chips;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    // === Input Errors ===
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    // === Access Errors ===
    #[error("Invalid username or password")]
    Authentication,

    #[error("Operation requires an administrator session")]
    Forbidden,

    // === State Errors ===
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Request already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Chips, available: Chips },

    #[error("Balance would become negative: subtracting {requested} from {available}")]
    NegativeBalance { requested: Chips, available: Chips },

    // === System Errors ===
    #[error("Credential processing failed: {0}")]
    Credential(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Stable code for API/UI mapping
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION",
            LedgerError::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            LedgerError::Authentication => "AUTHENTICATION",
            LedgerError::Forbidden => "FORBIDDEN",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::NegativeBalance { .. } => "NEGATIVE_BALANCE",
            LedgerError::Credential(_) => "CREDENTIAL",
            LedgerError::Store(e) => e.code(),
        }
    }

    /// Whether a retry of the same command can succeed without the caller
    /// changing anything (only transient storage failures qualify).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::Io(_)))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
