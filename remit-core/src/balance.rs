use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, UserId};

/// Authoritative balance record for one user.
///
/// Mutated only by the ledger. `pending` always equals the sum of the
/// user's pending withdrawal request amounts; `lifetime_earnings` always
/// equals the sum of the user's credit events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub user_id: UserId,
    pub withdrawable: Amount,
    pub pending: Amount,
    pub total_withdrawn: Amount,
    pub lifetime_earnings: Amount,
    pub updated_at: DateTime<Utc>,
}

impl BalanceAccount {
    /// Zeroed account for a user with no ledger activity yet.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            withdrawable: Decimal::ZERO,
            pending: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            lifetime_earnings: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}

/// Immutable fact recording a commission credit from a confirmed purchase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Amount,
    pub source_purchase_id: String,
    pub created_at: DateTime<Utc>,
}

impl CreditEvent {
    pub fn new(user_id: UserId, amount: Amount, source_purchase_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            source_purchase_id: source_purchase_id.into(),
            created_at: Utc::now(),
        }
    }
}
