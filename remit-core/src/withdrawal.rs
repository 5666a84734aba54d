use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, OperatorId, RequestId, UserId};

/// Lifecycle state of a withdrawal request.
///
/// `Pending` is the only non-terminal state; once a request reaches
/// `Approved` or `Rejected` no further transition is permitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "approved" => Ok(WithdrawalStatus::Approved),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(format!("unknown withdrawal status: {other}")),
        }
    }
}

/// Payout channel of a withdrawal request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMethod {
    MobileBanking,
    BankTransfer,
}

impl WithdrawalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalMethod::MobileBanking => "mobile_banking",
            WithdrawalMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile_banking" => Ok(WithdrawalMethod::MobileBanking),
            "bank_transfer" => Ok(WithdrawalMethod::BankTransfer),
            other => Err(format!("unknown withdrawal method: {other}")),
        }
    }
}

/// Destination account for a mobile banking payout.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MobileBankingDetails {
    pub provider: String,
    pub mobile_number: String,
    pub account_holder: String,
}

/// Destination account for a bank transfer payout.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BankTransferDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// Payment destination, discriminated by withdrawal method.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    MobileBanking(MobileBankingDetails),
    BankTransfer(BankTransferDetails),
}

impl PaymentDetails {
    pub fn method(&self) -> WithdrawalMethod {
        match self {
            PaymentDetails::MobileBanking(_) => WithdrawalMethod::MobileBanking,
            PaymentDetails::BankTransfer(_) => WithdrawalMethod::BankTransfer,
        }
    }
}

/// A single withdrawal request and its processing outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub amount: Amount,
    pub details: PaymentDetails,
    pub status: WithdrawalStatus,
    pub transaction_reference: Option<String>,
    pub rejection_reason: Option<String>,
    pub processed_by: Option<OperatorId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    /// Creates a new request in the `Pending` state.
    pub fn new(user_id: UserId, amount: Amount, details: PaymentDetails) -> Self {
        Self {
            id: RequestId::generate(),
            user_id,
            amount,
            details,
            status: WithdrawalStatus::Pending,
            transaction_reference: None,
            rejection_reason: None,
            processed_by: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn method(&self) -> WithdrawalMethod {
        self.details.method()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_details_tag_roundtrip() {
        let details = PaymentDetails::MobileBanking(MobileBankingDetails {
            provider: "bkash".into(),
            mobile_number: "01712345678".into(),
            account_holder: "Rahim Uddin".into(),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["method"], "mobile_banking");
        let back: PaymentDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back, details);
        assert_eq!(back.method(), WithdrawalMethod::MobileBanking);
    }

    #[test]
    fn new_request_starts_pending() {
        let request = WithdrawalRequest::new(
            UserId::from("u-1"),
            dec!(500),
            PaymentDetails::BankTransfer(BankTransferDetails {
                bank_name: "City Bank".into(),
                account_number: "0012345678".into(),
                account_name: "Rahim Uddin".into(),
            }),
        );
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert!(!request.status.is_terminal());
        assert!(request.processed_by.is_none());
        assert_eq!(request.method(), WithdrawalMethod::BankTransfer);
    }
}
