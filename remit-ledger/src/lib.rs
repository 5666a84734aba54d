//! Balance ledger primitives and transactional storage backends for Remit.

mod error;
mod memory;
mod query;
mod sqlite;
mod store;

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedgerStore;
pub use query::{RequestFilter, RequestSort};
pub use sqlite::SqliteLedgerStore;
pub use store::{CreationGuards, Decision, LedgerStore, WithdrawalStats};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use remit_core::{
        BankTransferDetails, CreditEvent, OperatorId, PaymentDetails, UserId, WithdrawalRequest,
        WithdrawalStatus,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn details(account_number: &str) -> PaymentDetails {
        PaymentDetails::BankTransfer(BankTransferDetails {
            bank_name: "City Bank".into(),
            account_number: account_number.into(),
            account_name: "Rahim Uddin".into(),
        })
    }

    /// After any interleaving of create/approve/reject, the pending bucket
    /// must equal the sum of pending request amounts and the withdrawable
    /// balance must stay non-negative.
    #[test]
    fn pending_bucket_tracks_pending_requests() {
        let store = MemoryLedgerStore::new();
        let user = UserId::from("u-1");
        store
            .credit(&CreditEvent::new(user.clone(), dec!(1000), "p-1"))
            .unwrap();
        let guards = CreationGuards {
            max_pending_requests: 5,
            duplicate_window: Duration::minutes(5),
        };

        let first = WithdrawalRequest::new(user.clone(), dec!(400), details("0011112222"));
        let second = WithdrawalRequest::new(user.clone(), dec!(250), details("0033334444"));
        let third = WithdrawalRequest::new(user.clone(), dec!(350), details("0055556666"));
        for request in [&first, &second, &third] {
            store.create_request(request, &guards).unwrap();
        }

        store
            .decide_request(
                first.id,
                &Decision::Approve {
                    operator: OperatorId::from("op-1"),
                    transaction_reference: "TXN-1".into(),
                    decided_at: Utc::now(),
                },
            )
            .unwrap();
        store
            .decide_request(
                second.id,
                &Decision::Reject {
                    operator: OperatorId::from("op-1"),
                    reason: "invalid account".into(),
                    decided_at: Utc::now(),
                },
            )
            .unwrap();

        let account = store.balance(&user).unwrap();
        let pending_sum: Decimal = store
            .query_requests(&RequestFilter::default().for_user(user.clone()))
            .unwrap()
            .iter()
            .filter(|request| request.status == WithdrawalStatus::Pending)
            .map(|request| request.amount)
            .sum();
        assert_eq!(account.pending, pending_sum);
        assert_eq!(account.pending, dec!(350));
        assert_eq!(account.withdrawable, dec!(250));
        assert_eq!(account.total_withdrawn, dec!(400));
        assert!(account.withdrawable >= Decimal::ZERO);
    }
}
