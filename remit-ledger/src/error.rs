use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use remit_core::{RequestId, WithdrawalStatus};

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("insufficient withdrawable balance: {available} available")]
    InsufficientBalance { available: Decimal },
    #[error("pending balance underflow: {pending} pending, {requested} requested")]
    InsufficientPending { pending: Decimal, requested: Decimal },
    #[error("credit event for purchase {0} already recorded")]
    DuplicateCreditEvent(String),
    #[error("withdrawal request {0} not found")]
    RequestNotFound(RequestId),
    #[error("withdrawal request {id} is {status}, not pending")]
    RequestNotPending {
        id: RequestId,
        status: WithdrawalStatus,
    },
    #[error("duplicate withdrawal request, first submitted at {first_requested_at}")]
    DuplicateRequest {
        first_requested_at: DateTime<Utc>,
    },
    #[error("too many pending withdrawal requests: {pending_count} of {max_allowed}")]
    TooManyRequests { pending_count: u32, max_allowed: u32 },
    #[error("ledger storage is busy")]
    Busy,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &value {
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Self::Busy;
            }
        }
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
