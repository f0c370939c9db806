use chrono::NaiveDate;
use lend_ledger_core::store::loans::{CreateDailyLoan, CreateMonthlyLoan, LoanFilter};
use lend_ledger_core::store::transactions::RecordTransaction;
use lend_ledger_core::{Actor, Ledger, LedgerError, LoanStatus, LoanType, TransactionType};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

const TENANT: i64 = 1;

fn admin() -> Actor {
    Actor { id: 10, privileged: true }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn ledger_with_borrower() -> (Ledger, i64) {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Asha Patel", None).unwrap().id;
    (ledger, borrower)
}

fn monthly_input(borrower: i64) -> CreateMonthlyLoan {
    CreateMonthlyLoan {
        borrower_id: borrower,
        guarantor_id: None,
        principal_amount: dec!(100000),
        interest_rate: dec!(2),
        disbursement_date: d(2025, 10, 15),
        expected_months: Some(12),
        notes: None,
    }
}

fn daily_input(borrower: i64) -> CreateDailyLoan {
    CreateDailyLoan {
        borrower_id: borrower,
        guarantor_id: None,
        principal_amount: dec!(100000),
        interest_rate: dec!(5),
        disbursement_date: d(2025, 6, 1),
        term_days: 120,
        grace_days: None,
        notes: None,
    }
}

// ===========================================================================
// Origination
// ===========================================================================

#[test]
fn monthly_creation_writes_disbursement_and_advance_interest() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_monthly_loan(TENANT, &admin(), &monthly_input(borrower)).unwrap();

    assert_eq!(loan.loan_type, LoanType::Monthly);
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.loan_number, "ML-2025-0001");
    assert_eq!(loan.remaining_principal, Some(dec!(100000)));
    assert_eq!(loan.advance_interest_amount, Some(dec!(2000.00)));
    assert_eq!(loan.monthly_due_day, Some(15));

    let txns = ledger.loan_transactions(TENANT, loan.id).unwrap();
    assert_eq!(txns.len(), 2);
    assert_eq!(txns[0].txn_type, TransactionType::Disbursement);
    assert_eq!(txns[0].amount, dec!(100000));
    assert_eq!(txns[1].txn_type, TransactionType::AdvanceInterest);
    assert_eq!(txns[1].amount, dec!(2000.00));
}

#[test]
fn advance_interest_rounds_half_up() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let mut input = monthly_input(borrower);
    input.principal_amount = dec!(33333);
    input.interest_rate = dec!(3);
    let loan = ledger.create_monthly_loan(TENANT, &admin(), &input).unwrap();
    assert_eq!(loan.advance_interest_amount, Some(dec!(999.99)));
}

#[test]
fn daily_creation_derives_exact_repayment_terms() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();

    assert_eq!(loan.loan_number, "DL-2025-0001");
    assert_eq!(loan.total_repayment_amount, Some(dec!(120000.00)));
    assert_eq!(loan.daily_payment_amount, Some(dec!(1000.00)));
    assert_eq!(loan.term_end_date, Some(d(2025, 9, 29)));
    assert_eq!(loan.grace_days, Some(7));
    assert_eq!(loan.total_collected, Some(dec!(0)));

    let txns = ledger.loan_transactions(TENANT, loan.id).unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].txn_type, TransactionType::Disbursement);
}

#[test]
fn loan_numbers_are_sequential_per_type_and_year() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let a = ledger.create_monthly_loan(TENANT, &admin(), &monthly_input(borrower)).unwrap();
    let b = ledger.create_monthly_loan(TENANT, &admin(), &monthly_input(borrower)).unwrap();
    let c = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    assert_eq!(a.loan_number, "ML-2025-0001");
    assert_eq!(b.loan_number, "ML-2025-0002");
    assert_eq!(c.loan_number, "DL-2025-0001");
}

#[test]
fn guarantor_must_differ_from_borrower() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let mut input = monthly_input(borrower);
    input.guarantor_id = Some(borrower);
    let err = ledger.create_monthly_loan(TENANT, &admin(), &input).unwrap_err();
    assert!(matches!(err, LedgerError::GuarantorSameAsBorrower));
}

#[test]
fn cross_tenant_reads_are_not_found() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_monthly_loan(TENANT, &admin(), &monthly_input(borrower)).unwrap();
    let err = ledger.get_loan(99, loan.id).unwrap_err();
    assert!(matches!(err, LedgerError::LoanNotFound(_)));
}

// ===========================================================================
// State machine
// ===========================================================================

#[test]
fn default_then_write_off_and_borrower_is_flagged() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();

    let defaulted = ledger.default_loan(TENANT, &admin(), loan.id, d(2025, 11, 1)).unwrap();
    assert_eq!(defaulted.status, LoanStatus::Defaulted);
    assert_eq!(defaulted.defaulted_at, Some(d(2025, 11, 1)));
    assert!(ledger.get_customer(TENANT, borrower).unwrap().is_defaulter);

    let written_off = ledger.write_off_loan(TENANT, &admin(), loan.id, d(2025, 12, 1)).unwrap();
    assert_eq!(written_off.status, LoanStatus::WrittenOff);
}

#[test]
fn write_off_requires_defaulted() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    let err = ledger.write_off_loan(TENANT, &admin(), loan.id, d(2025, 11, 1)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
}

#[test]
fn default_twice_is_invalid() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    ledger.default_loan(TENANT, &admin(), loan.id, d(2025, 11, 1)).unwrap();
    let err = ledger.default_loan(TENANT, &admin(), loan.id, d(2025, 11, 2)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
}

#[test]
fn cancel_only_without_activity() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let clean = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    let cancelled = ledger.cancel_loan(TENANT, &admin(), clean.id, d(2025, 6, 2)).unwrap();
    assert_eq!(cancelled.status, LoanStatus::Cancelled);

    let busy = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: busy.id,
                txn_type: TransactionType::DailyCollection,
                amount: dec!(1000),
                transaction_date: d(2025, 6, 2),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    let err = ledger.cancel_loan(TENANT, &admin(), busy.id, d(2025, 6, 3)).unwrap_err();
    assert!(matches!(err, LedgerError::LoanHasActivity(_)));
}

#[test]
fn pending_activity_also_blocks_cancel() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let collector = Actor { id: 20, privileged: false };
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    ledger
        .record_transaction(
            TENANT,
            &collector,
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::DailyCollection,
                amount: dec!(1000),
                transaction_date: d(2025, 6, 2),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    let err = ledger.cancel_loan(TENANT, &admin(), loan.id, d(2025, 6, 3)).unwrap_err();
    assert!(matches!(err, LedgerError::LoanHasActivity(_)));
}

#[test]
fn rejected_activity_does_not_block_cancel() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let collector = Actor { id: 20, privileged: false };
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    let recorded = ledger
        .record_transaction(
            TENANT,
            &collector,
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::DailyCollection,
                amount: dec!(1000),
                transaction_date: d(2025, 6, 2),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    ledger
        .reject_transaction(TENANT, &admin(), recorded[0].id, "entry error", d(2025, 6, 3))
        .unwrap();
    let cancelled = ledger.cancel_loan(TENANT, &admin(), loan.id, d(2025, 6, 4)).unwrap();
    assert_eq!(cancelled.status, LoanStatus::Cancelled);
}

// ===========================================================================
// Close preconditions
// ===========================================================================

#[test]
fn monthly_close_requires_zero_principal_and_settled_cycles() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let mut input = monthly_input(borrower);
    input.principal_amount = dec!(10000);
    input.disbursement_date = d(2025, 1, 10);
    let loan = ledger.create_monthly_loan(TENANT, &admin(), &input).unwrap();

    // Principal still out: refused.
    let err = ledger.close_loan(TENANT, &admin(), loan.id, d(2025, 3, 20)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput { .. }));

    // Settle February and March interest (10000 @ 2% = 200 each).
    for month in [2, 3] {
        ledger
            .record_transaction(
                TENANT,
                &admin(),
                &RecordTransaction {
                    loan_id: loan.id,
                    txn_type: TransactionType::InterestPayment,
                    amount: dec!(200),
                    transaction_date: d(2025, month, 12),
                    effective_date: Some(d(2025, month, 12)),
                    penalty_id: None,
                    corrects: None,
                    notes: None,
                },
            )
            .unwrap();
    }
    // Return the full principal.
    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::PrincipalReturn,
                amount: dec!(10000),
                transaction_date: d(2025, 3, 15),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();

    let closed = ledger.close_loan(TENANT, &admin(), loan.id, d(2025, 3, 20)).unwrap();
    assert_eq!(closed.status, LoanStatus::Closed);
    assert_eq!(closed.remaining_principal, Some(dec!(0)));
}

#[test]
fn daily_close_requires_full_collection() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let mut input = daily_input(borrower);
    input.principal_amount = dec!(3000);
    input.interest_rate = dec!(10);
    input.term_days = 30;
    let loan = ledger.create_daily_loan(TENANT, &admin(), &input).unwrap();

    let err = ledger.close_loan(TENANT, &admin(), loan.id, d(2025, 7, 10)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput { .. }));

    // 3300 total; collect in two entries.
    for (date, amount) in [(d(2025, 6, 10), dec!(2000)), (d(2025, 6, 25), dec!(1300))] {
        ledger
            .record_transaction(
                TENANT,
                &admin(),
                &RecordTransaction {
                    loan_id: loan.id,
                    txn_type: TransactionType::DailyCollection,
                    amount,
                    transaction_date: date,
                    effective_date: None,
                    penalty_id: None,
                    corrects: None,
                    notes: None,
                },
            )
            .unwrap();
    }
    let closed = ledger.close_loan(TENANT, &admin(), loan.id, d(2025, 7, 10)).unwrap();
    assert_eq!(closed.status, LoanStatus::Closed);
    assert_eq!(closed.total_collected, Some(dec!(3300)));
}

#[test]
fn closed_loans_reject_transactions() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    let cancelled = ledger.cancel_loan(TENANT, &admin(), loan.id, d(2025, 6, 2)).unwrap();
    assert_eq!(cancelled.status, LoanStatus::Cancelled);

    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::DailyCollection,
                amount: dec!(500),
                transaction_date: d(2025, 6, 3),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::LoanNotActive { .. }));
}

#[test]
fn defaulted_loans_still_accept_recoveries() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    ledger.default_loan(TENANT, &admin(), loan.id, d(2025, 11, 1)).unwrap();

    let txns = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::GuarantorPayment,
                amount: dec!(5000),
                transaction_date: d(2025, 11, 10),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    assert_eq!(txns.len(), 1);
    let after = ledger.get_loan(TENANT, loan.id).unwrap();
    assert_eq!(after.total_collected, Some(dec!(5000)));
}

#[test]
fn guarantor_payment_rejected_on_active_loans() {
    let (mut ledger, borrower) = ledger_with_borrower();
    let loan = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    let err = ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::GuarantorPayment,
                amount: dec!(5000),
                transaction_date: d(2025, 6, 10),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput { .. }));
}

#[test]
fn list_loans_filters_by_status_and_type() {
    let (mut ledger, borrower) = ledger_with_borrower();
    ledger.create_monthly_loan(TENANT, &admin(), &monthly_input(borrower)).unwrap();
    let daily = ledger.create_daily_loan(TENANT, &admin(), &daily_input(borrower)).unwrap();
    ledger.default_loan(TENANT, &admin(), daily.id, d(2025, 11, 1)).unwrap();

    let active = ledger
        .list_loans(TENANT, &LoanFilter { status: Some(LoanStatus::Active), ..Default::default() })
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].loan_type, LoanType::Monthly);

    let daily_loans = ledger
        .list_loans(TENANT, &LoanFilter { loan_type: Some(LoanType::Daily), ..Default::default() })
        .unwrap();
    assert_eq!(daily_loans.len(), 1);
    assert_eq!(daily_loans[0].status, LoanStatus::Defaulted);
}
