//! Commission accrual over the Remit balance ledger.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use remit_core::{Amount, CreditEvent, UserId};
use remit_ledger::{LedgerError, LedgerStore};

/// Result alias for accrual operations.
pub type AccrualResult<T> = Result<T, AccrualError>;

/// Error type surfaced by the accrual engine.
#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("commission amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of an accrual attempt.
#[derive(Clone, Debug)]
pub enum AccrualOutcome {
    /// The purchase was credited; this event records the fact.
    Credited(CreditEvent),
    /// The purchase had already been credited; nothing changed.
    AlreadyCredited,
}

/// Earnings aggregates reported to the user.
///
/// The periodic buckets are recomputed from the credit event log on every
/// read; lifetime is maintained eagerly on the account row and always
/// equals the unbounded event sum.
#[derive(Clone, Debug, Serialize)]
pub struct EarningsReport {
    pub daily: Amount,
    pub weekly: Amount,
    pub monthly: Amount,
    pub lifetime: Amount,
}

/// Credits the ledger when referred purchases are confirmed.
///
/// Only ever increases balances; withdrawals never flow through here.
pub struct AccrualEngine {
    store: Arc<dyn LedgerStore>,
}

impl AccrualEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Credit a confirmed referred purchase.
    ///
    /// Replaying the same `source_purchase_id` is absorbed without
    /// double-crediting the account.
    pub fn accrue(
        &self,
        user: &UserId,
        amount: Amount,
        source_purchase_id: &str,
    ) -> AccrualResult<AccrualOutcome> {
        if amount <= Decimal::ZERO {
            return Err(AccrualError::InvalidAmount(amount));
        }
        let event = CreditEvent::new(user.clone(), amount, source_purchase_id);
        match self.store.credit(&event) {
            Ok(account) => {
                info!(
                    user = %user,
                    amount = %amount,
                    purchase = source_purchase_id,
                    withdrawable = %account.withdrawable,
                    "commission credited"
                );
                Ok(AccrualOutcome::Credited(event))
            }
            Err(LedgerError::DuplicateCreditEvent(_)) => {
                debug!(user = %user, purchase = source_purchase_id, "replayed purchase, already credited");
                Ok(AccrualOutcome::AlreadyCredited)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Earnings aggregates at `now`: trailing 24h/7d/30d windows plus the
    /// lifetime total.
    pub fn earnings(&self, user: &UserId, now: DateTime<Utc>) -> AccrualResult<EarningsReport> {
        let monthly_start = now - Duration::days(30);
        let weekly_start = now - Duration::days(7);
        let daily_start = now - Duration::days(1);

        let mut report = EarningsReport {
            daily: Decimal::ZERO,
            weekly: Decimal::ZERO,
            monthly: Decimal::ZERO,
            lifetime: Decimal::ZERO,
        };
        for event in self.store.credit_events(user, Some(monthly_start))? {
            report.monthly += event.amount;
            if event.created_at >= weekly_start {
                report.weekly += event.amount;
            }
            if event.created_at >= daily_start {
                report.daily += event.amount;
            }
        }
        report.lifetime = self.store.balance(user)?.lifetime_earnings;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remit_ledger::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn engine() -> (AccrualEngine, Arc<dyn LedgerStore>) {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        (AccrualEngine::new(store.clone()), store)
    }

    #[test]
    fn replayed_purchase_does_not_double_credit() {
        let (engine, store) = engine();
        let user = UserId::from("u-1");

        let first = engine.accrue(&user, dec!(150), "purchase-9").unwrap();
        assert!(matches!(first, AccrualOutcome::Credited(_)));

        let replay = engine.accrue(&user, dec!(150), "purchase-9").unwrap();
        assert!(matches!(replay, AccrualOutcome::AlreadyCredited));

        let account = store.balance(&user).unwrap();
        assert_eq!(account.withdrawable, dec!(150));
        assert_eq!(account.lifetime_earnings, dec!(150));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let (engine, _) = engine();
        let user = UserId::from("u-1");
        assert!(matches!(
            engine.accrue(&user, dec!(0), "purchase-1"),
            Err(AccrualError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.accrue(&user, dec!(-5), "purchase-2"),
            Err(AccrualError::InvalidAmount(_))
        ));
    }

    #[test]
    fn buckets_respect_their_windows() {
        let (engine, store) = engine();
        let user = UserId::from("u-1");
        let now = Utc::now();

        let mut stale = CreditEvent::new(user.clone(), dec!(40), "purchase-old");
        stale.created_at = now - Duration::days(20);
        store.credit(&stale).unwrap();

        let mut recent = CreditEvent::new(user.clone(), dec!(25), "purchase-recent");
        recent.created_at = now - Duration::days(3);
        store.credit(&recent).unwrap();

        let mut fresh = CreditEvent::new(user.clone(), dec!(10), "purchase-fresh");
        fresh.created_at = now - Duration::hours(2);
        store.credit(&fresh).unwrap();

        let report = engine.earnings(&user, now).unwrap();
        assert_eq!(report.daily, dec!(10));
        assert_eq!(report.weekly, dec!(35));
        assert_eq!(report.monthly, dec!(75));
        assert_eq!(report.lifetime, dec!(75));
    }

    #[test]
    fn lifetime_matches_event_sum() {
        let (engine, store) = engine();
        let user = UserId::from("u-1");
        for (index, amount) in [dec!(10), dec!(20), dec!(30)].into_iter().enumerate() {
            engine
                .accrue(&user, amount, &format!("purchase-{index}"))
                .unwrap();
        }
        let events = store.credit_events(&user, None).unwrap();
        let sum: Decimal = events.iter().map(|event| event.amount).sum();
        let report = engine.earnings(&user, Utc::now()).unwrap();
        assert_eq!(report.lifetime, sum);
    }
}
