use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

use remit_core::{
    Amount, BalanceAccount, CreditEvent, PaymentDetails, RequestId, UserId, WithdrawalRequest,
    WithdrawalStatus,
};

use crate::{
    CreationGuards, Decision, LedgerError, LedgerResult, LedgerStore, RequestFilter, RequestSort,
    WithdrawalStats,
};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<UserId, BalanceAccount>,
    requests: Vec<WithdrawalRequest>,
    events: Vec<CreditEvent>,
}

/// In-memory ledger store serialized by a single mutex.
///
/// Useful for tests and short-lived embedded deployments; semantics match
/// the SQLite store exactly.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn account_entry<'a>(state: &'a mut MemoryState, user: &UserId) -> &'a mut BalanceAccount {
    state
        .accounts
        .entry(user.clone())
        .or_insert_with(|| BalanceAccount::empty(user.clone()))
}

fn apply_lock(state: &mut MemoryState, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let account = account_entry(state, user);
    if account.withdrawable < amount {
        return Err(LedgerError::InsufficientBalance {
            available: account.withdrawable,
        });
    }
    account.withdrawable -= amount;
    account.pending += amount;
    account.updated_at = Utc::now();
    Ok(account.clone())
}

fn apply_release(
    state: &mut MemoryState,
    user: &UserId,
    amount: Amount,
) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let account = account_entry(state, user);
    if account.pending < amount {
        return Err(LedgerError::InsufficientPending {
            pending: account.pending,
            requested: amount,
        });
    }
    account.pending -= amount;
    account.withdrawable += amount;
    account.updated_at = Utc::now();
    Ok(account.clone())
}

fn apply_commit(
    state: &mut MemoryState,
    user: &UserId,
    amount: Amount,
) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let account = account_entry(state, user);
    if account.pending < amount {
        return Err(LedgerError::InsufficientPending {
            pending: account.pending,
            requested: amount,
        });
    }
    account.pending -= amount;
    account.total_withdrawn += amount;
    account.updated_at = Utc::now();
    Ok(account.clone())
}

fn matches(filter: &RequestFilter, request: &WithdrawalRequest) -> bool {
    filter.user.as_ref().map_or(true, |u| u == &request.user_id)
        && filter.status.map_or(true, |s| s == request.status)
        && filter.method.map_or(true, |m| m == request.method())
        && filter
            .created_after
            .map_or(true, |ts| request.created_at >= ts)
        && filter
            .created_before
            .map_or(true, |ts| request.created_at <= ts)
}

impl LedgerStore for MemoryLedgerStore {
    fn credit(&self, event: &CreditEvent) -> LedgerResult<BalanceAccount> {
        if event.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(event.amount));
        }
        let mut state = self.state.lock();
        if state
            .events
            .iter()
            .any(|known| known.source_purchase_id == event.source_purchase_id)
        {
            return Err(LedgerError::DuplicateCreditEvent(
                event.source_purchase_id.clone(),
            ));
        }
        state.events.push(event.clone());
        let account = account_entry(&mut state, &event.user_id);
        account.withdrawable += event.amount;
        account.lifetime_earnings += event.amount;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    fn lock(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        apply_lock(&mut self.state.lock(), user, amount)
    }

    fn release(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        apply_release(&mut self.state.lock(), user, amount)
    }

    fn commit(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        apply_commit(&mut self.state.lock(), user, amount)
    }

    fn balance(&self, user: &UserId) -> LedgerResult<BalanceAccount> {
        let state = self.state.lock();
        Ok(state
            .accounts
            .get(user)
            .cloned()
            .unwrap_or_else(|| BalanceAccount::empty(user.clone())))
    }

    fn create_request(
        &self,
        request: &WithdrawalRequest,
        guards: &CreationGuards,
    ) -> LedgerResult<WithdrawalRequest> {
        let mut state = self.state.lock();

        let pending_count = state
            .requests
            .iter()
            .filter(|known| {
                known.user_id == request.user_id && known.status == WithdrawalStatus::Pending
            })
            .count() as u32;
        if pending_count >= guards.max_pending_requests {
            return Err(LedgerError::TooManyRequests {
                pending_count,
                max_allowed: guards.max_pending_requests,
            });
        }

        let window_start = request.created_at - guards.duplicate_window;
        let first_requested_at = state
            .requests
            .iter()
            .filter(|known| {
                known.user_id == request.user_id
                    && known.status == WithdrawalStatus::Pending
                    && known.method() == request.method()
                    && known.amount == request.amount
                    && known.created_at >= window_start
            })
            .map(|known| known.created_at)
            .min();
        if let Some(first_requested_at) = first_requested_at {
            return Err(LedgerError::DuplicateRequest { first_requested_at });
        }

        apply_lock(&mut state, &request.user_id, request.amount)?;
        state.requests.push(request.clone());
        Ok(request.clone())
    }

    fn decide_request(&self, id: RequestId, decision: &Decision) -> LedgerResult<WithdrawalRequest> {
        let mut state = self.state.lock();
        let index = state
            .requests
            .iter()
            .position(|known| known.id == id)
            .ok_or(LedgerError::RequestNotFound(id))?;
        let (user_id, amount, status) = {
            let request = &state.requests[index];
            (request.user_id.clone(), request.amount, request.status)
        };
        if status != WithdrawalStatus::Pending {
            return Err(LedgerError::RequestNotPending { id, status });
        }

        match decision {
            Decision::Approve {
                transaction_reference,
                ..
            } => {
                apply_commit(&mut state, &user_id, amount)?;
                let request = &mut state.requests[index];
                request.transaction_reference = Some(transaction_reference.clone());
            }
            Decision::Reject { reason, .. } => {
                apply_release(&mut state, &user_id, amount)?;
                let request = &mut state.requests[index];
                request.rejection_reason = Some(reason.clone());
            }
        }
        let request = &mut state.requests[index];
        request.status = decision.status();
        request.processed_by = Some(decision.operator().clone());
        request.processed_at = Some(decision.decided_at());
        Ok(request.clone())
    }

    fn update_details(
        &self,
        id: RequestId,
        details: &PaymentDetails,
    ) -> LedgerResult<WithdrawalRequest> {
        let mut state = self.state.lock();
        let request = state
            .requests
            .iter_mut()
            .find(|known| known.id == id)
            .ok_or(LedgerError::RequestNotFound(id))?;
        if request.status != WithdrawalStatus::Pending {
            return Err(LedgerError::RequestNotPending {
                id,
                status: request.status,
            });
        }
        request.details = details.clone();
        Ok(request.clone())
    }

    fn find_request(&self, id: RequestId) -> LedgerResult<Option<WithdrawalRequest>> {
        let state = self.state.lock();
        Ok(state.requests.iter().find(|known| known.id == id).cloned())
    }

    fn query_requests(&self, filter: &RequestFilter) -> LedgerResult<Vec<WithdrawalRequest>> {
        let state = self.state.lock();
        let mut items: Vec<WithdrawalRequest> = state
            .requests
            .iter()
            .filter(|request| matches(filter, request))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            let ordering = match filter.sort {
                RequestSort::CreatedAt => a.created_at.cmp(&b.created_at),
                RequestSort::Amount => a.amount.cmp(&b.amount),
            };
            if filter.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    fn count_requests(&self, filter: &RequestFilter) -> LedgerResult<u64> {
        let state = self.state.lock();
        Ok(state
            .requests
            .iter()
            .filter(|request| matches(filter, request))
            .count() as u64)
    }

    fn withdrawal_stats(&self) -> LedgerResult<WithdrawalStats> {
        let state = self.state.lock();
        let mut stats = WithdrawalStats::default();
        for request in &state.requests {
            stats.absorb(request.status, request.amount);
        }
        Ok(stats)
    }

    fn credit_events(
        &self,
        user: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<CreditEvent>> {
        let state = self.state.lock();
        let mut events: Vec<CreditEvent> = state
            .events
            .iter()
            .filter(|event| {
                &event.user_id == user && since.map_or(true, |ts| event.created_at >= ts)
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| event.created_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use remit_core::{BankTransferDetails, OperatorId};
    use rust_decimal_macros::dec;

    fn details() -> PaymentDetails {
        PaymentDetails::BankTransfer(BankTransferDetails {
            bank_name: "City Bank".into(),
            account_number: "0012345678".into(),
            account_name: "Rahim Uddin".into(),
        })
    }

    #[test]
    fn lock_refuses_to_overdraw() {
        let store = MemoryLedgerStore::new();
        let user = UserId::from("u-1");
        store
            .credit(&CreditEvent::new(user.clone(), dec!(500), "p-1"))
            .unwrap();
        let outcome = store.lock(&user, dec!(1000));
        assert!(matches!(
            outcome,
            Err(LedgerError::InsufficientBalance { available }) if available == dec!(500)
        ));
        assert_eq!(store.balance(&user).unwrap().withdrawable, dec!(500));
    }

    #[test]
    fn rate_limit_counts_only_pending_requests() {
        let store = MemoryLedgerStore::new();
        let user = UserId::from("u-1");
        store
            .credit(&CreditEvent::new(user.clone(), dec!(10000), "p-1"))
            .unwrap();
        let guards = CreationGuards {
            max_pending_requests: 2,
            duplicate_window: Duration::minutes(5),
        };

        let first = WithdrawalRequest::new(user.clone(), dec!(100), details());
        let second = WithdrawalRequest::new(user.clone(), dec!(200), details());
        store.create_request(&first, &guards).unwrap();
        store.create_request(&second, &guards).unwrap();

        let third = WithdrawalRequest::new(user.clone(), dec!(300), details());
        assert!(matches!(
            store.create_request(&third, &guards),
            Err(LedgerError::TooManyRequests {
                pending_count: 2,
                max_allowed: 2,
            })
        ));

        // rejecting one frees a slot
        store
            .decide_request(
                first.id,
                &Decision::Reject {
                    operator: OperatorId::from("op-1"),
                    reason: "invalid account".into(),
                    decided_at: Utc::now(),
                },
            )
            .unwrap();
        store.create_request(&third, &guards).unwrap();
    }
}
