use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use remit_config::WithdrawalPolicy;
use remit_core::{
    BankTransferDetails, MobileBankingDetails, OperatorId, PaymentDetails, UserId,
    WithdrawalMethod, WithdrawalStatus,
};
use remit_engine::{
    AccessProfile, OperatorRole, PageRequest, StaticDirectory, WithdrawalError, WithdrawalService,
};
use remit_ledger::{LedgerStore, MemoryLedgerStore, RequestSort, SqliteLedgerStore};

const ALICE: &str = "alice";
const ADMIN: &str = "op-admin";
const SUPPORT: &str = "op-support";

fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user(UserId::from(ALICE), AccessProfile::active())
        .with_user(UserId::from("mallory"), AccessProfile::suspended())
        .with_user(UserId::from("newbie"), AccessProfile::unverified())
        .with_operator(OperatorId::from(ADMIN), OperatorRole::Full)
        .with_operator(OperatorId::from(SUPPORT), OperatorRole::Limited)
}

fn service_over(store: Arc<dyn LedgerStore>) -> WithdrawalService {
    WithdrawalService::new(store, Arc::new(directory()), WithdrawalPolicy::default())
}

fn memory_service() -> (WithdrawalService, Arc<dyn LedgerStore>) {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
    (service_over(store.clone()), store)
}

fn bank_details() -> PaymentDetails {
    PaymentDetails::BankTransfer(BankTransferDetails {
        bank_name: "City Bank".into(),
        account_number: "0012345678".into(),
        account_name: "Alice Rahman".into(),
    })
}

fn mobile_details() -> PaymentDetails {
    PaymentDetails::MobileBanking(MobileBankingDetails {
        provider: "bkash".into(),
        mobile_number: "01712345678".into(),
        account_holder: "Alice Rahman".into(),
    })
}

fn seed(service: &WithdrawalService, user: &UserId, amount: Decimal) {
    service
        .accrual()
        .accrue(user, amount, &format!("seed-{user}-{amount}"))
        .unwrap();
}

#[test]
fn reject_restores_withdrawable_balance() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let request = service.create_withdrawal(&alice, dec!(1000), bank_details())?;
    let account = service.balance(&alice)?;
    assert_eq!(account.withdrawable, dec!(0));
    assert_eq!(account.pending, dec!(1000));

    let rejected = service.reject(&OperatorId::from(SUPPORT), request.id, "invalid account")?;
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("invalid account"));
    assert_eq!(
        rejected.processed_by,
        Some(OperatorId::from(SUPPORT))
    );
    assert!(rejected.processed_at.is_some());

    let account = service.balance(&alice)?;
    assert_eq!(account.withdrawable, dec!(1000));
    assert_eq!(account.pending, dec!(0));
    assert_eq!(account.total_withdrawn, dec!(0));
    Ok(())
}

#[test]
fn approve_moves_funds_to_total_withdrawn() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let first = service.create_withdrawal(&alice, dec!(1000), bank_details())?;
    service.reject(&OperatorId::from(ADMIN), first.id, "invalid account")?;

    // a rejected request does not block an identical resubmission
    let second = service.create_withdrawal(&alice, dec!(1000), bank_details())?;
    let approved = service.approve(&OperatorId::from(ADMIN), second.id, "TXN1")?;
    assert_eq!(approved.status, WithdrawalStatus::Approved);
    assert_eq!(approved.transaction_reference.as_deref(), Some("TXN1"));

    let account = service.balance(&alice)?;
    assert_eq!(account.pending, dec!(0));
    assert_eq!(account.withdrawable, dec!(0));
    assert_eq!(account.total_withdrawn, dec!(1000));
    Ok(())
}

#[test]
fn insufficient_balance_reports_available_funds() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(500));

    let outcome = service.create_withdrawal(&alice, dec!(1000), bank_details());
    match outcome {
        Err(WithdrawalError::InsufficientBalance { available }) => {
            assert_eq!(available, dec!(500));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    // nothing was persisted
    let history = service.history(
        &alice,
        PageRequest::default(),
        None,
        RequestSort::CreatedAt,
        false,
    )?;
    assert_eq!(history.total, 0);
    let account = service.balance(&alice)?;
    assert_eq!(account.withdrawable, dec!(500));
    Ok(())
}

#[test]
fn double_approve_fails_without_touching_the_ledger() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let request = service.create_withdrawal(&alice, dec!(400), bank_details())?;
    service.approve(&OperatorId::from(ADMIN), request.id, "TXN-7")?;

    let again = service.approve(&OperatorId::from(ADMIN), request.id, "TXN-7");
    assert!(matches!(
        again,
        Err(WithdrawalError::InvalidStateTransition {
            current: WithdrawalStatus::Approved,
        })
    ));

    // approve-then-reject resolves the same way
    let conflict = service.reject(&OperatorId::from(ADMIN), request.id, "changed my mind");
    assert!(matches!(
        conflict,
        Err(WithdrawalError::InvalidStateTransition { .. })
    ));

    let account = service.balance(&alice)?;
    assert_eq!(account.total_withdrawn, dec!(400));
    assert_eq!(account.pending, dec!(0));
    assert_eq!(account.withdrawable, dec!(600));
    Ok(())
}

#[test]
fn duplicate_request_within_window_is_rejected() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let first = service.create_withdrawal(&alice, dec!(300), mobile_details())?;
    let duplicate = service.create_withdrawal(&alice, dec!(300), mobile_details());
    match duplicate {
        Err(WithdrawalError::DuplicateRequest { first_requested_at }) => {
            assert_eq!(first_requested_at, first.created_at);
        }
        other => panic!("expected DuplicateRequest, got {other:?}"),
    }

    // a different method with the same amount is not a duplicate
    service.create_withdrawal(&alice, dec!(300), bank_details())?;
    Ok(())
}

#[test]
fn rate_limit_blocks_request_beyond_cap() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(10000));

    for amount in [dec!(100), dec!(200), dec!(300), dec!(400), dec!(500)] {
        service.create_withdrawal(&alice, amount, bank_details())?;
    }
    let outcome = service.create_withdrawal(&alice, dec!(600), bank_details());
    match outcome {
        Err(WithdrawalError::TooManyRequests {
            pending_count,
            max_allowed,
        }) => {
            assert_eq!(pending_count, 5);
            assert_eq!(max_allowed, 5);
        }
        other => panic!("expected TooManyRequests, got {other:?}"),
    }

    let history = service.history(
        &alice,
        PageRequest::default(),
        None,
        RequestSort::CreatedAt,
        false,
    )?;
    assert_eq!(history.total, 5);
    Ok(())
}

#[test]
fn eligibility_gates_are_enforced() {
    let (service, _) = memory_service();
    seed(&service, &UserId::from("mallory"), dec!(1000));
    seed(&service, &UserId::from("newbie"), dec!(1000));

    assert!(matches!(
        service.create_withdrawal(&UserId::from("mallory"), dec!(100), bank_details()),
        Err(WithdrawalError::AccountSuspended)
    ));
    assert!(matches!(
        service.create_withdrawal(&UserId::from("newbie"), dec!(100), bank_details()),
        Err(WithdrawalError::InvalidUserPermissions)
    ));
    assert!(matches!(
        service.create_withdrawal(&UserId::from("stranger"), dec!(100), bank_details()),
        Err(WithdrawalError::UnauthorizedAccess)
    ));
    // a user id is not an operator id
    assert!(matches!(
        service.approve(
            &OperatorId::from(ALICE),
            remit_core::RequestId::generate(),
            "TXN"
        ),
        Err(WithdrawalError::UnauthorizedAccess)
    ));
}

#[test]
fn field_validation_short_circuits_before_persistence() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let bad_number = PaymentDetails::MobileBanking(MobileBankingDetails {
        provider: "bkash".into(),
        mobile_number: "9912345678".into(),
        account_holder: "Alice Rahman".into(),
    });
    assert!(matches!(
        service.create_withdrawal(&alice, dec!(100), bad_number),
        Err(WithdrawalError::InvalidMobileNumber)
    ));

    assert!(matches!(
        service.create_withdrawal(&alice, dec!(50), bank_details()),
        Err(WithdrawalError::InvalidAmount { .. })
    ));

    let history = service.history(
        &alice,
        PageRequest::default(),
        None,
        RequestSort::CreatedAt,
        false,
    )?;
    assert_eq!(history.total, 0);
    Ok(())
}

#[test]
fn edit_is_limited_to_pending_requests() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let request = service.create_withdrawal(&alice, dec!(300), bank_details())?;
    let corrected = PaymentDetails::BankTransfer(BankTransferDetails {
        bank_name: "Eastern Bank".into(),
        account_number: "9987654321".into(),
        account_name: "Alice Rahman".into(),
    });
    let updated = service.edit_details(&OperatorId::from(SUPPORT), request.id, corrected.clone())?;
    assert_eq!(updated.details, corrected);
    assert_eq!(updated.amount, dec!(300));

    service.approve(&OperatorId::from(ADMIN), request.id, "TXN-9")?;
    assert!(matches!(
        service.edit_details(&OperatorId::from(SUPPORT), request.id, bank_details()),
        Err(WithdrawalError::InvalidStateTransition { .. })
    ));
    Ok(())
}

#[test]
fn history_paginates_and_filters() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(10000));

    let amounts = [dec!(100), dec!(200), dec!(300), dec!(400), dec!(500)];
    let mut ids = Vec::new();
    for amount in amounts {
        ids.push(service.create_withdrawal(&alice, amount, bank_details())?.id);
    }
    service.approve(&OperatorId::from(ADMIN), ids[0], "TXN-A")?;
    service.reject(&OperatorId::from(ADMIN), ids[1], "wrong account")?;

    let page = service.history(
        &alice,
        PageRequest::new(1, 2),
        None,
        RequestSort::Amount,
        true,
    )?;
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].amount, dec!(100));
    assert_eq!(page.items[1].amount, dec!(200));

    let pending_only = service.history(
        &alice,
        PageRequest::default(),
        Some(WithdrawalStatus::Pending),
        RequestSort::CreatedAt,
        false,
    )?;
    assert_eq!(pending_only.total, 3);
    assert!(pending_only
        .items
        .iter()
        .all(|request| request.status == WithdrawalStatus::Pending));
    Ok(())
}

#[test]
fn operator_listings_expose_queue_totals() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(10000));

    service.create_withdrawal(&alice, dec!(100), bank_details())?;
    service.create_withdrawal(&alice, dec!(200), mobile_details())?;

    let listing = service.list_pending(&OperatorId::from(SUPPORT), PageRequest::default())?;
    assert_eq!(listing.pending_count, 2);
    assert_eq!(listing.pending_amount, dec!(300));
    assert_eq!(listing.requests.items.len(), 2);

    let mobile_only = service.list_all(
        &OperatorId::from(SUPPORT),
        PageRequest::default(),
        None,
        Some(WithdrawalMethod::MobileBanking),
    )?;
    assert_eq!(mobile_only.total, 1);
    assert_eq!(
        mobile_only.items[0].method(),
        WithdrawalMethod::MobileBanking
    );
    Ok(())
}

#[test]
fn stats_require_a_full_administrator() -> Result<()> {
    let (service, _) = memory_service();
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));
    let request = service.create_withdrawal(&alice, dec!(400), bank_details())?;
    service.approve(&OperatorId::from(ADMIN), request.id, "TXN-S")?;

    assert!(matches!(
        service.stats(&OperatorId::from(SUPPORT)),
        Err(WithdrawalError::UnauthorizedAccess)
    ));

    let stats = service.stats(&OperatorId::from(ADMIN))?;
    assert_eq!(stats.approved_count, 1);
    assert_eq!(stats.approved_amount, dec!(400));
    assert_eq!(stats.pending_count, 0);
    Ok(())
}

#[test]
fn concurrent_creates_resolve_to_one_winner() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store: Arc<dyn LedgerStore> =
        Arc::new(SqliteLedgerStore::new(dir.path().join("remit.db"))?);
    let service = Arc::new(service_over(store.clone()));
    let alice = UserId::from(ALICE);
    seed(&service, &alice, dec!(1000));

    let mut handles = Vec::new();
    for amount in [dec!(600), dec!(700)] {
        let service = service.clone();
        let alice = alice.clone();
        handles.push(std::thread::spawn(move || {
            service.create_withdrawal(&alice, amount, bank_details())
        }));
    }
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent request may win");
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(WithdrawalError::InsufficientBalance { .. })
    )));

    let account = store.balance(&alice)?;
    assert!(account.withdrawable >= Decimal::ZERO);
    assert_eq!(account.withdrawable + account.pending, dec!(1000));
    Ok(())
}
