use chrono::NaiveDate;
use lend_ledger_core::store::loans::{CreateDailyLoan, CreateMonthlyLoan};
use lend_ledger_core::store::transactions::RecordTransaction;
use lend_ledger_core::{
    Actor, ApprovalStatus, Ledger, LedgerError, Money, TransactionType,
};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

const TENANT: i64 = 1;

fn admin() -> Actor {
    Actor { id: 10, privileged: true }
}

fn collector() -> Actor {
    Actor { id: 20, privileged: false }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn txn(loan_id: i64, txn_type: TransactionType, amount: Money, date: NaiveDate) -> RecordTransaction {
    RecordTransaction {
        loan_id,
        txn_type,
        amount,
        transaction_date: date,
        effective_date: None,
        penalty_id: None,
        corrects: None,
        notes: None,
    }
}

fn interest(loan_id: i64, amount: Money, date: NaiveDate, effective: NaiveDate) -> RecordTransaction {
    RecordTransaction {
        effective_date: Some(effective),
        ..txn(loan_id, TransactionType::InterestPayment, amount, date)
    }
}

/// Monthly loan: 100000 at 2%/month disbursed 2025-10-15.
fn monthly_loan(ledger: &mut Ledger) -> i64 {
    let borrower = ledger.create_customer(TENANT, "Asha Patel", None).unwrap().id;
    ledger
        .create_monthly_loan(
            TENANT,
            &admin(),
            &CreateMonthlyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(100000),
                interest_rate: dec!(2),
                disbursement_date: d(2025, 10, 15),
                expected_months: None,
                notes: None,
            },
        )
        .unwrap()
        .id
}

/// Daily loan: 100000 at 5% for 120 days disbursed 2025-06-01.
fn daily_loan(ledger: &mut Ledger) -> i64 {
    let borrower = ledger.create_customer(TENANT, "Binod Rai", None).unwrap().id;
    ledger
        .create_daily_loan(
            TENANT,
            &admin(),
            &CreateDailyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(100000),
                interest_rate: dec!(5),
                disbursement_date: d(2025, 6, 1),
                term_days: 120,
                grace_days: None,
                notes: None,
            },
        )
        .unwrap()
        .id
}

// ===========================================================================
// Interest payments and the overpayment split
// ===========================================================================

#[test]
fn interest_payment_at_or_below_due_stays_whole() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);

    let rows = ledger
        .record_transaction(TENANT, &admin(), &interest(loan_id, dec!(2000), d(2025, 11, 20), d(2025, 11, 20)))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].txn_type, TransactionType::InterestPayment);
    assert_eq!(rows[0].amount, dec!(2000));
    assert_eq!(rows[0].effective_date, Some(d(2025, 11, 20)));
}

#[test]
fn overpayment_splits_exactly() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);

    // Due is 2000.00; 5000.01 splits into 2000.00 + 3000.01.
    let rows = ledger
        .record_transaction(TENANT, &admin(), &interest(loan_id, dec!(5000.01), d(2025, 11, 20), d(2025, 11, 20)))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].txn_type, TransactionType::InterestPayment);
    assert_eq!(rows[0].amount, dec!(2000.00));
    assert_eq!(rows[1].txn_type, TransactionType::PrincipalReturn);
    assert_eq!(rows[1].amount, dec!(3000.01));
    assert_eq!(rows[0].amount + rows[1].amount, dec!(5000.01));

    let loan = ledger.get_loan(TENANT, loan_id).unwrap();
    assert_eq!(loan.remaining_principal, Some(dec!(96999.99)));
}

#[test]
fn interest_payment_requires_effective_date() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::InterestPayment, dec!(2000), d(2025, 11, 20)),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::MissingEffectiveDate));
}

#[test]
fn overpayment_beyond_principal_writes_nothing() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Asha Patel", None).unwrap().id;
    let loan = ledger
        .create_monthly_loan(
            TENANT,
            &admin(),
            &CreateMonthlyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(1000),
                interest_rate: dec!(2),
                disbursement_date: d(2025, 10, 15),
                expected_months: None,
                notes: None,
            },
        )
        .unwrap();

    // Due 20; principal portion would be 1480 > 1000 remaining.
    let err = ledger
        .record_transaction(TENANT, &admin(), &interest(loan.id, dec!(1500), d(2025, 11, 20), d(2025, 11, 20)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::OverpaymentExceedsPrincipal { .. }));

    // The whole operation rolled back: only the origination rows exist.
    let txns = ledger.loan_transactions(TENANT, loan.id).unwrap();
    assert_eq!(txns.len(), 2);
    let after = ledger.get_loan(TENANT, loan.id).unwrap();
    assert_eq!(after.remaining_principal, Some(dec!(1000)));
    assert_eq!(after.version, loan.version);
}

#[test]
fn billing_principal_cache_resyncs_on_interest_payment() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);

    // Pay November in full, then return 40000 principal in November.
    ledger
        .record_transaction(TENANT, &admin(), &interest(loan_id, dec!(2000), d(2025, 11, 20), d(2025, 11, 20)))
        .unwrap();
    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::PrincipalReturn, dec!(40000), d(2025, 11, 25)),
        )
        .unwrap();
    let cached = ledger.get_loan(TENANT, loan_id).unwrap();
    assert_eq!(cached.billing_principal, Some(dec!(100000)));

    // December bills against 60000; recording the payment syncs the cache
    // first, so due is 1200 and 1200 does not split.
    let rows = ledger
        .record_transaction(TENANT, &admin(), &interest(loan_id, dec!(1200), d(2025, 12, 10), d(2025, 12, 10)))
        .unwrap();
    assert_eq!(rows.len(), 1);
    let synced = ledger.get_loan(TENANT, loan_id).unwrap();
    assert_eq!(synced.billing_principal, Some(dec!(60000)));
}

#[test]
fn principal_return_may_not_exceed_remaining() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::PrincipalReturn, dec!(100001), d(2025, 11, 1)),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));
}

// ===========================================================================
// Approval workflow
// ===========================================================================

#[test]
fn collector_entries_stay_pending_without_side_effects() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);

    let rows = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(1000), d(2025, 6, 2)),
        )
        .unwrap();
    assert_eq!(rows[0].approval_status, ApprovalStatus::Pending);
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(0)));

    let approved = ledger.approve_transaction(TENANT, &admin(), rows[0].id, d(2025, 6, 3)).unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.approved_by, Some(10));
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(1000)));
}

#[test]
fn double_approval_is_rejected_and_applies_once() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);
    let rows = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(1000), d(2025, 6, 2)),
        )
        .unwrap();
    ledger.approve_transaction(TENANT, &admin(), rows[0].id, d(2025, 6, 3)).unwrap();

    let err = ledger.approve_transaction(TENANT, &admin(), rows[0].id, d(2025, 6, 4)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyDecided(_)));
    let err = ledger
        .reject_transaction(TENANT, &admin(), rows[0].id, "late", d(2025, 6, 4))
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyDecided(_)));

    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(1000)));
}

#[test]
fn rejection_requires_reason_and_is_terminal() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);
    let rows = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(1000), d(2025, 6, 2)),
        )
        .unwrap();

    let err = ledger
        .reject_transaction(TENANT, &admin(), rows[0].id, "  ", d(2025, 6, 3))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput { .. }));

    let rejected = ledger
        .reject_transaction(TENANT, &admin(), rows[0].id, "wrong amount", d(2025, 6, 3))
        .unwrap();
    assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong amount"));

    let err = ledger.approve_transaction(TENANT, &admin(), rows[0].id, d(2025, 6, 4)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyDecided(_)));
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(0)));
}

#[test]
fn pending_split_applies_only_approved_parts() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);

    let rows = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &interest(loan_id, dec!(5000), d(2025, 11, 20), d(2025, 11, 20)),
        )
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.approval_status == ApprovalStatus::Pending));
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().remaining_principal, Some(dec!(100000)));

    // Approve only the principal part.
    ledger.approve_transaction(TENANT, &admin(), rows[1].id, d(2025, 11, 21)).unwrap();
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().remaining_principal, Some(dec!(97000)));
}

// ===========================================================================
// Corrective entries
// ===========================================================================

#[test]
fn correction_round_trip_nets_to_zero() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);
    let original = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(1100), d(2025, 6, 2)),
        )
        .unwrap();
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(1100)));

    let correction = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &RecordTransaction {
                corrects: Some(original[0].id),
                ..txn(loan_id, TransactionType::DailyCollection, dec!(-1100), d(2025, 6, 3))
            },
        )
        .unwrap();
    // Corrections are approved on the spot, even from a collector.
    assert_eq!(correction[0].approval_status, ApprovalStatus::Approved);
    assert_eq!(correction[0].amount, dec!(-1100));
    assert_eq!(correction[0].corrected_transaction_id, Some(original[0].id));

    // Both entries stay visible; aggregates net to zero.
    let txns = ledger.loan_transactions(TENANT, loan_id).unwrap();
    let collections: Vec<_> = txns
        .iter()
        .filter(|t| t.txn_type == TransactionType::DailyCollection)
        .collect();
    assert_eq!(collections.len(), 2);
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().total_collected, Some(dec!(0)));
}

#[test]
fn a_transaction_may_be_corrected_only_once() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);
    let original = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(500), d(2025, 6, 2)),
        )
        .unwrap();
    let correct = |ledger: &mut Ledger| {
        ledger.record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                corrects: Some(original[0].id),
                ..txn(loan_id, TransactionType::DailyCollection, dec!(-500), d(2025, 6, 3))
            },
        )
    };
    correct(&mut ledger).unwrap();
    let err = correct(&mut ledger).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyCorrected(_)));
}

#[test]
fn correction_must_match_type_amount_and_approval() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = daily_loan(&mut ledger);
    let approved = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(700), d(2025, 6, 2)),
        )
        .unwrap();
    let pending = ledger
        .record_transaction(
            TENANT,
            &collector(),
            &txn(loan_id, TransactionType::DailyCollection, dec!(800), d(2025, 6, 2)),
        )
        .unwrap();

    // Pending target.
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                corrects: Some(pending[0].id),
                ..txn(loan_id, TransactionType::DailyCollection, dec!(-800), d(2025, 6, 3))
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::CorrectionMismatch { .. }));

    // Wrong type.
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                corrects: Some(approved[0].id),
                ..txn(loan_id, TransactionType::GuarantorPayment, dec!(-700), d(2025, 6, 3))
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::CorrectionMismatch { .. }));

    // Wrong amount.
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                corrects: Some(approved[0].id),
                ..txn(loan_id, TransactionType::DailyCollection, dec!(-600), d(2025, 6, 3))
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::CorrectionMismatch { .. }));
}

#[test]
fn principal_return_correction_restores_remaining_and_journals() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let loan_id = monthly_loan(&mut ledger);
    let original = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &txn(loan_id, TransactionType::PrincipalReturn, dec!(30000), d(2025, 11, 5)),
        )
        .unwrap();
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().remaining_principal, Some(dec!(70000)));

    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                corrects: Some(original[0].id),
                ..txn(loan_id, TransactionType::PrincipalReturn, dec!(-30000), d(2025, 11, 6))
            },
        )
        .unwrap();
    let after = ledger.get_loan(TENANT, loan_id).unwrap();
    assert_eq!(after.remaining_principal, Some(dec!(100000)));

    // December still bills against the original principal: the corrective
    // journal row restores the snapshot the cycle reads.
    let rows = ledger
        .record_transaction(TENANT, &admin(), &interest(loan_id, dec!(2000), d(2025, 12, 10), d(2025, 12, 10)))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(ledger.get_loan(TENANT, loan_id).unwrap().billing_principal, Some(dec!(100000)));
}
