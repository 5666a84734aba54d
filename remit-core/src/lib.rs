//! Core domain types shared across the Remit workspace.

mod balance;
mod ids;
mod money;
mod withdrawal;

pub use balance::{BalanceAccount, CreditEvent};
pub use ids::{OperatorId, RequestId, UserId};
pub use money::{is_whole_units, Amount};
pub use withdrawal::{
    BankTransferDetails, MobileBankingDetails, PaymentDetails, WithdrawalMethod, WithdrawalRequest,
    WithdrawalStatus,
};
