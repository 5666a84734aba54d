use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use remit_accrual::AccrualError;
use remit_core::WithdrawalStatus;
use remit_ledger::LedgerError;

/// Result alias for withdrawal service operations.
pub type WithdrawalResult<T> = Result<T, WithdrawalError>;

/// Broad error categories driving the propagation policy at the boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Bad input; fix the field and resubmit, never retried automatically.
    Validation,
    /// The request is well-formed but a business rule refuses it now.
    BusinessRule,
    /// The actor may not perform this operation.
    Authorization,
    /// Stale client view of the request lifecycle; benign.
    StateMachine,
    /// Storage or internal failure; safe to retry with backoff.
    Infrastructure,
}

/// Closed error taxonomy of the withdrawal core.
///
/// The user-facing message and remediation mappings are exhaustive
/// matches, so adding a variant without its copy fails to compile.
#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("required field is missing or empty: {0}")]
    MissingRequiredFields(&'static str),
    #[error("mobile banking details are incomplete")]
    MissingMobileBankingDetails,
    #[error("bank transfer details are incomplete")]
    MissingBankTransferDetails,
    #[error("invalid withdrawal amount: {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("invalid mobile number")]
    InvalidMobileNumber,
    #[error("unsupported mobile banking provider: {0}")]
    InvalidProvider(String),
    #[error("invalid account holder name")]
    InvalidAccountHolderName,
    #[error("invalid bank name")]
    InvalidBankName,
    #[error("invalid account name")]
    InvalidAccountName,
    #[error("invalid account number")]
    InvalidAccountNumber,
    #[error("insufficient balance: {available} available")]
    InsufficientBalance { available: Decimal },
    #[error("duplicate withdrawal request, first submitted at {first_requested_at}")]
    DuplicateRequest { first_requested_at: DateTime<Utc> },
    #[error("too many pending withdrawal requests: {pending_count} of {max_allowed}")]
    TooManyRequests { pending_count: u32, max_allowed: u32 },
    #[error("unauthorized access")]
    UnauthorizedAccess,
    #[error("withdrawals are not permitted for this account")]
    InvalidUserPermissions,
    #[error("account is suspended")]
    AccountSuspended,
    #[error("request already processed, currently {current}")]
    InvalidStateTransition { current: WithdrawalStatus },
    #[error("withdrawal request not found")]
    RequestNotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl WithdrawalError {
    pub fn kind(&self) -> ErrorKind {
        use WithdrawalError::*;
        match self {
            MissingRequiredFields(_)
            | MissingMobileBankingDetails
            | MissingBankTransferDetails
            | InvalidAmount { .. }
            | InvalidMobileNumber
            | InvalidProvider(_)
            | InvalidAccountHolderName
            | InvalidBankName
            | InvalidAccountName
            | InvalidAccountNumber => ErrorKind::Validation,
            InsufficientBalance { .. } | DuplicateRequest { .. } | TooManyRequests { .. } => {
                ErrorKind::BusinessRule
            }
            UnauthorizedAccess | InvalidUserPermissions | AccountSuspended => {
                ErrorKind::Authorization
            }
            InvalidStateTransition { .. } | RequestNotFound => ErrorKind::StateMachine,
            Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the caller may retry the operation unchanged, with backoff.
    pub fn retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    /// User-facing message for this error.
    pub fn user_message(&self) -> String {
        use WithdrawalError::*;
        match self {
            MissingRequiredFields(field) => format!("The {field} field is required."),
            MissingMobileBankingDetails => {
                "Provider, mobile number and account holder name are required for mobile banking \
                 withdrawals."
                    .to_string()
            }
            MissingBankTransferDetails => {
                "Bank name, account number and account name are required for bank transfer \
                 withdrawals."
                    .to_string()
            }
            InvalidAmount { amount } => {
                format!("{amount} is not a valid withdrawal amount. Enter a whole amount of at least the minimum.")
            }
            InvalidMobileNumber => "Enter a valid 11-digit mobile number.".to_string(),
            InvalidProvider(provider) => {
                format!("{provider} is not a supported mobile banking provider.")
            }
            InvalidAccountHolderName => "Enter the account holder's full name.".to_string(),
            InvalidBankName => "Enter the full bank name.".to_string(),
            InvalidAccountName => "Enter the account name as registered with the bank.".to_string(),
            InvalidAccountNumber => "Enter a valid account number.".to_string(),
            InsufficientBalance { available } => {
                format!("Your withdrawable balance is {available}.")
            }
            DuplicateRequest { first_requested_at } => format!(
                "An identical request has been pending since {first_requested_at}. Wait for it to \
                 be processed."
            ),
            TooManyRequests {
                pending_count,
                max_allowed,
            } => format!(
                "You already have {pending_count} pending requests; at most {max_allowed} are \
                 allowed."
            ),
            UnauthorizedAccess => "You are not allowed to perform this action.".to_string(),
            InvalidUserPermissions => {
                "Your account is not yet enabled for withdrawals.".to_string()
            }
            AccountSuspended => "Your account is suspended.".to_string(),
            InvalidStateTransition { .. } => {
                "This request has already been processed.".to_string()
            }
            RequestNotFound => "The withdrawal request could not be found.".to_string(),
            Internal(_) => "Something went wrong on our side. Please try again.".to_string(),
        }
    }

    /// Suggested remediation, where one exists.
    pub fn remediation(&self) -> Option<&'static str> {
        use WithdrawalError::*;
        match self {
            UnauthorizedAccess => Some("Sign in again and retry."),
            InvalidUserPermissions => {
                Some("Complete identity verification to enable withdrawals.")
            }
            AccountSuspended => Some("Contact support to review your account."),
            InvalidStateTransition { .. } | RequestNotFound => {
                Some("Refresh the list to see the latest state.")
            }
            Internal(_) => Some("Retry after a short wait."),
            _ => None,
        }
    }
}

impl From<LedgerError> for WithdrawalError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InvalidAmount(amount) => Self::InvalidAmount { amount },
            LedgerError::InsufficientBalance { available } => {
                Self::InsufficientBalance { available }
            }
            LedgerError::DuplicateRequest { first_requested_at } => {
                Self::DuplicateRequest { first_requested_at }
            }
            LedgerError::TooManyRequests {
                pending_count,
                max_allowed,
            } => Self::TooManyRequests {
                pending_count,
                max_allowed,
            },
            LedgerError::RequestNotFound(_) => Self::RequestNotFound,
            LedgerError::RequestNotPending { status, .. } => {
                Self::InvalidStateTransition { current: status }
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AccrualError> for WithdrawalError {
    fn from(value: AccrualError) -> Self {
        match value {
            AccrualError::InvalidAmount(amount) => Self::InvalidAmount { amount },
            AccrualError::Ledger(err) => err.into(),
        }
    }
}
