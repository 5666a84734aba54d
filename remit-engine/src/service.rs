use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use remit_accrual::{AccrualEngine, EarningsReport};
use remit_config::WithdrawalPolicy;
use remit_core::{
    Amount, BalanceAccount, OperatorId, PaymentDetails, RequestId, UserId, WithdrawalMethod,
    WithdrawalRequest, WithdrawalStatus,
};
use remit_ledger::{
    CreationGuards, Decision, LedgerStore, RequestFilter, RequestSort, WithdrawalStats,
};

use crate::{
    AccessProfile, IdentityProvider, OperatorRole, Page, PageRequest, PendingListing,
    RequestValidator, WithdrawalError, WithdrawalResult,
};

/// Request-scoped facade over the withdrawal core.
///
/// Owns no mutable state of its own: every call reads and writes through
/// the transactional store, so concurrent handlers across processes stay
/// consistent and callers re-fetch instead of polling.
pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    identity: Arc<dyn IdentityProvider>,
    accrual: AccrualEngine,
    policy: WithdrawalPolicy,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityProvider>,
        policy: WithdrawalPolicy,
    ) -> Self {
        let accrual = AccrualEngine::new(store.clone());
        Self {
            store,
            identity,
            accrual,
            policy,
        }
    }

    /// The accrual engine sharing this service's store, for the
    /// purchase-confirmation event source to feed.
    pub fn accrual(&self) -> &AccrualEngine {
        &self.accrual
    }

    /// Submit a new withdrawal request for the user.
    ///
    /// Validation order: field presence and shape, user eligibility, then
    /// the duplicate/rate guards and balance check, re-checked atomically
    /// with creation inside the store transaction.
    pub fn create_withdrawal(
        &self,
        user: &UserId,
        amount: Amount,
        details: PaymentDetails,
    ) -> WithdrawalResult<WithdrawalRequest> {
        RequestValidator::new(&self.policy).validate(amount, &details)?;
        let profile = self.require_user(user)?;
        if profile.suspended {
            return Err(WithdrawalError::AccountSuspended);
        }
        if !profile.withdrawal_permitted {
            return Err(WithdrawalError::InvalidUserPermissions);
        }

        let request = WithdrawalRequest::new(user.clone(), amount, details);
        match self.store.create_request(&request, &self.guards()) {
            Ok(created) => {
                info!(
                    user = %user,
                    request = %created.id,
                    amount = %created.amount,
                    method = %created.method(),
                    "withdrawal request created"
                );
                Ok(created)
            }
            Err(err) => {
                warn!(user = %user, error = %err, "withdrawal request refused");
                Err(err.into())
            }
        }
    }

    /// Approve a pending request, recording the payout reference.
    pub fn approve(
        &self,
        operator: &OperatorId,
        id: RequestId,
        transaction_reference: &str,
    ) -> WithdrawalResult<WithdrawalRequest> {
        self.require_operator(operator)?;
        let reference = transaction_reference.trim();
        if reference.is_empty() {
            return Err(WithdrawalError::MissingRequiredFields("transaction_reference"));
        }
        let decision = Decision::Approve {
            operator: operator.clone(),
            transaction_reference: reference.to_string(),
            decided_at: Utc::now(),
        };
        let updated = self.store.decide_request(id, &decision)?;
        info!(request = %id, operator = %operator, "withdrawal approved");
        Ok(updated)
    }

    /// Reject a pending request, returning the locked amount to the user.
    pub fn reject(
        &self,
        operator: &OperatorId,
        id: RequestId,
        rejection_reason: &str,
    ) -> WithdrawalResult<WithdrawalRequest> {
        self.require_operator(operator)?;
        let reason = rejection_reason.trim();
        if reason.is_empty() {
            return Err(WithdrawalError::MissingRequiredFields("rejection_reason"));
        }
        let decision = Decision::Reject {
            operator: operator.clone(),
            reason: reason.to_string(),
            decided_at: Utc::now(),
        };
        let updated = self.store.decide_request(id, &decision)?;
        info!(request = %id, operator = %operator, "withdrawal rejected");
        Ok(updated)
    }

    /// Correct the payment destination of a still-pending request. The
    /// amount is immutable once the lock is taken.
    pub fn edit_details(
        &self,
        operator: &OperatorId,
        id: RequestId,
        details: PaymentDetails,
    ) -> WithdrawalResult<WithdrawalRequest> {
        self.require_operator(operator)?;
        RequestValidator::new(&self.policy).validate_details(&details)?;
        let updated = self.store.update_details(id, &details)?;
        info!(request = %id, operator = %operator, "withdrawal details updated");
        Ok(updated)
    }

    /// A user's own withdrawal history, paginated and optionally filtered.
    pub fn history(
        &self,
        user: &UserId,
        page: PageRequest,
        status: Option<WithdrawalStatus>,
        sort: RequestSort,
        ascending: bool,
    ) -> WithdrawalResult<Page<WithdrawalRequest>> {
        self.require_user(user)?;
        let mut filter = RequestFilter::default()
            .for_user(user.clone())
            .sorted_by(sort);
        if ascending {
            filter = filter.ascending();
        }
        if let Some(status) = status {
            filter = filter.with_status(status);
        }
        self.list(filter, page)
    }

    /// Operator queue of undecided requests, oldest first, with totals.
    pub fn list_pending(
        &self,
        operator: &OperatorId,
        page: PageRequest,
    ) -> WithdrawalResult<PendingListing> {
        self.require_operator(operator)?;
        let filter = RequestFilter::default()
            .with_status(WithdrawalStatus::Pending)
            .ascending();
        let requests = self.list(filter, page)?;
        let stats = self.store.withdrawal_stats()?;
        Ok(PendingListing {
            requests,
            pending_count: stats.pending_count,
            pending_amount: stats.pending_amount,
        })
    }

    /// Operator listing across all users, newest first.
    pub fn list_all(
        &self,
        operator: &OperatorId,
        page: PageRequest,
        status: Option<WithdrawalStatus>,
        method: Option<WithdrawalMethod>,
    ) -> WithdrawalResult<Page<WithdrawalRequest>> {
        self.require_operator(operator)?;
        let mut filter = RequestFilter::default();
        if let Some(status) = status {
            filter = filter.with_status(status);
        }
        if let Some(method) = method {
            filter = filter.with_method(method);
        }
        self.list(filter, page)
    }

    /// Current ledger snapshot for the user's dashboard.
    pub fn balance(&self, user: &UserId) -> WithdrawalResult<BalanceAccount> {
        self.require_user(user)?;
        Ok(self.store.balance(user)?)
    }

    /// Commission earnings aggregates for the user.
    pub fn earnings(&self, user: &UserId) -> WithdrawalResult<EarningsReport> {
        self.require_user(user)?;
        Ok(self.accrual.earnings(user, Utc::now())?)
    }

    /// Platform-wide withdrawal counters; full administrators only.
    pub fn stats(&self, operator: &OperatorId) -> WithdrawalResult<WithdrawalStats> {
        if self.require_operator(operator)? != OperatorRole::Full {
            return Err(WithdrawalError::UnauthorizedAccess);
        }
        Ok(self.store.withdrawal_stats()?)
    }

    fn list(
        &self,
        filter: RequestFilter,
        page: PageRequest,
    ) -> WithdrawalResult<Page<WithdrawalRequest>> {
        let total = self.store.count_requests(&filter)?;
        let items = self
            .store
            .query_requests(&filter.with_page(page.limit() as usize, page.offset()))?;
        Ok(Page::assemble(items, page, total))
    }

    fn guards(&self) -> CreationGuards {
        CreationGuards {
            max_pending_requests: self.policy.max_pending_requests,
            duplicate_window: self.policy.duplicate_window(),
        }
    }

    fn require_user(&self, user: &UserId) -> WithdrawalResult<AccessProfile> {
        self.identity
            .profile(user)
            .ok_or(WithdrawalError::UnauthorizedAccess)
    }

    fn require_operator(&self, operator: &OperatorId) -> WithdrawalResult<OperatorRole> {
        self.identity
            .operator_role(operator)
            .ok_or(WithdrawalError::UnauthorizedAccess)
    }
}
