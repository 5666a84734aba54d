use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use remit_core::{
    Amount, BalanceAccount, CreditEvent, OperatorId, PaymentDetails, RequestId, UserId,
    WithdrawalRequest, WithdrawalStatus,
};

use crate::{LedgerResult, RequestFilter};

/// Terminal decision applied to a pending withdrawal request.
#[derive(Clone, Debug)]
pub enum Decision {
    Approve {
        operator: OperatorId,
        transaction_reference: String,
        decided_at: DateTime<Utc>,
    },
    Reject {
        operator: OperatorId,
        reason: String,
        decided_at: DateTime<Utc>,
    },
}

impl Decision {
    pub fn operator(&self) -> &OperatorId {
        match self {
            Decision::Approve { operator, .. } | Decision::Reject { operator, .. } => operator,
        }
    }

    pub fn decided_at(&self) -> DateTime<Utc> {
        match self {
            Decision::Approve { decided_at, .. } | Decision::Reject { decided_at, .. } => {
                *decided_at
            }
        }
    }

    pub fn status(&self) -> WithdrawalStatus {
        match self {
            Decision::Approve { .. } => WithdrawalStatus::Approved,
            Decision::Reject { .. } => WithdrawalStatus::Rejected,
        }
    }
}

/// Admission guards re-checked inside the request-creation transaction.
///
/// Two concurrent submissions must not both pass; whichever transaction
/// runs second observes the first one's row and fails cleanly.
#[derive(Clone, Debug)]
pub struct CreationGuards {
    pub max_pending_requests: u32,
    pub duplicate_window: Duration,
}

/// Aggregate counters over the whole withdrawal request table.
#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalStats {
    pub pending_count: u64,
    pub pending_amount: Decimal,
    pub approved_count: u64,
    pub approved_amount: Decimal,
    pub rejected_count: u64,
    pub rejected_amount: Decimal,
}

impl Default for WithdrawalStats {
    fn default() -> Self {
        Self {
            pending_count: 0,
            pending_amount: Decimal::ZERO,
            approved_count: 0,
            approved_amount: Decimal::ZERO,
            rejected_count: 0,
            rejected_amount: Decimal::ZERO,
        }
    }
}

impl WithdrawalStats {
    pub fn absorb(&mut self, status: WithdrawalStatus, amount: Amount) {
        match status {
            WithdrawalStatus::Pending => {
                self.pending_count += 1;
                self.pending_amount += amount;
            }
            WithdrawalStatus::Approved => {
                self.approved_count += 1;
                self.approved_amount += amount;
            }
            WithdrawalStatus::Rejected => {
                self.rejected_count += 1;
                self.rejected_amount += amount;
            }
        }
    }
}

/// Abstraction over the transactional ledger storage engines.
///
/// Every mutating operation is a single atomic unit per user: balance
/// arithmetic, guard checks, and request rows change together or not at
/// all. Different users' accounts are independent.
pub trait LedgerStore: Send + Sync {
    /// Record a commission credit event and increase the withdrawable
    /// balance and lifetime earnings accordingly. Idempotent per
    /// `source_purchase_id`: a replay fails with `DuplicateCreditEvent`
    /// without touching the account.
    fn credit(&self, event: &CreditEvent) -> LedgerResult<BalanceAccount>;

    /// Move `amount` from the withdrawable balance into the pending bucket.
    fn lock(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount>;

    /// Return `amount` from the pending bucket to the withdrawable balance.
    fn release(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount>;

    /// Move `amount` from the pending bucket into the withdrawn total.
    fn commit(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount>;

    /// Read the account row, zeroed if the user has no ledger activity yet.
    fn balance(&self, user: &UserId) -> LedgerResult<BalanceAccount>;

    /// Admit a new pending request in one transaction: re-check the rate
    /// and duplicate guards, lock the amount, persist the row.
    fn create_request(
        &self,
        request: &WithdrawalRequest,
        guards: &CreationGuards,
    ) -> LedgerResult<WithdrawalRequest>;

    /// Apply a terminal decision in one transaction: verify the request is
    /// still pending, commit or release the locked amount, persist the
    /// terminal row. Concurrent decisions resolve to exactly one winner;
    /// the loser sees `RequestNotPending`.
    fn decide_request(&self, id: RequestId, decision: &Decision) -> LedgerResult<WithdrawalRequest>;

    /// Replace the payment details of a still-pending request. The amount is
    /// immutable after creation, so the ledger is untouched.
    fn update_details(
        &self,
        id: RequestId,
        details: &PaymentDetails,
    ) -> LedgerResult<WithdrawalRequest>;

    fn find_request(&self, id: RequestId) -> LedgerResult<Option<WithdrawalRequest>>;

    /// Load requests matching the filter, sorted and paged.
    fn query_requests(&self, filter: &RequestFilter) -> LedgerResult<Vec<WithdrawalRequest>>;

    /// Count requests matching the filter, ignoring its pagination.
    fn count_requests(&self, filter: &RequestFilter) -> LedgerResult<u64>;

    fn withdrawal_stats(&self) -> LedgerResult<WithdrawalStats>;

    /// Credit events for a user, oldest first, optionally bounded below.
    fn credit_events(
        &self,
        user: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<CreditEvent>>;
}
