use chrono::NaiveDate;
use lend_ledger_core::store::migration::{MigrateDailyLoan, MigrateMonthlyLoan, MigratePenalty};
use lend_ledger_core::store::penalties::ImposePenalty;
use lend_ledger_core::store::transactions::RecordTransaction;
use lend_ledger_core::{Actor, Ledger, PenaltyStatus, TransactionType};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

const TENANT: i64 = 1;

fn admin() -> Actor {
    Actor { id: 10, privileged: true }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn migrated_monthly_loan_starts_mid_life_without_synthetic_history() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Asha Patel", None).unwrap().id;
    let loan = ledger
        .migrate_monthly_loan(
            TENANT,
            &admin(),
            &MigrateMonthlyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(200000),
                remaining_principal: dec!(120000),
                interest_rate: dec!(3),
                disbursement_date: d(2024, 6, 20),
                interest_paid_through: Some(d(2025, 9, 20)),
                expected_months: None,
                migration_date: d(2025, 10, 5),
            },
        )
        .unwrap();

    assert!(loan.is_migrated);
    assert_eq!(loan.loan_number, "ML-2024-0001");
    assert_eq!(loan.remaining_principal, Some(dec!(120000)));
    assert_eq!(loan.principal_amount, dec!(200000));

    // No disbursement (or any other) transaction was synthesized.
    assert!(ledger.loan_transactions(TENANT, loan.id).unwrap().is_empty());
    assert_eq!(ledger.cash_in_hand(TENANT).unwrap(), dec!(0));
    assert_eq!(ledger.cash_in_hand_bottom_up(TENANT).unwrap(), dec!(0));

    // Billing starts the month after the watermark and bills the migrated
    // remaining principal, not the original 200000.
    let detail = ledger.loan_detail(TENANT, loan.id, d(2025, 11, 15)).unwrap();
    let monthly = detail.monthly.unwrap();
    assert_eq!(monthly.cycles.len(), 2);
    assert_eq!(monthly.cycles[0].year, 2025);
    assert_eq!(monthly.cycles[0].month, 10);
    assert_eq!(monthly.cycles[0].billing_principal, dec!(120000));
    assert_eq!(monthly.cycles[0].interest_due, dec!(3600.00));
    assert_eq!(monthly.cycles[0].due_date, d(2025, 10, 20));
    assert_eq!(monthly.next_due_date, Some(d(2025, 10, 20)));
}

#[test]
fn migrated_monthly_loan_amortizes_from_the_migrated_base() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Asha Patel", None).unwrap().id;
    let loan = ledger
        .migrate_monthly_loan(
            TENANT,
            &admin(),
            &MigrateMonthlyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(200000),
                remaining_principal: dec!(120000),
                interest_rate: dec!(3),
                disbursement_date: d(2024, 6, 20),
                interest_paid_through: Some(d(2025, 9, 20)),
                expected_months: None,
                migration_date: d(2025, 10, 5),
            },
        )
        .unwrap();

    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::PrincipalReturn,
                amount: dec!(20000),
                transaction_date: d(2025, 10, 25),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    assert_eq!(ledger.get_loan(TENANT, loan.id).unwrap().remaining_principal, Some(dec!(100000)));

    // October still billed 120000 (the return came mid-cycle); November
    // bills the reduced base.
    let detail = ledger.loan_detail(TENANT, loan.id, d(2025, 11, 15)).unwrap();
    let monthly = detail.monthly.unwrap();
    assert_eq!(monthly.cycles[0].billing_principal, dec!(120000));
    assert_eq!(monthly.cycles[1].billing_principal, dec!(100000));
    assert_eq!(monthly.cycles[1].interest_due, dec!(3000.00));
}

#[test]
fn migrated_daily_loan_carries_an_opening_balance() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Binod Rai", None).unwrap().id;
    let loan = ledger
        .migrate_daily_loan(
            TENANT,
            &admin(),
            &MigrateDailyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(80000),
                interest_rate: dec!(5),
                disbursement_date: d(2025, 5, 1),
                term_days: 100,
                grace_days: None,
                collected_to_date: dec!(30000),
                migration_date: d(2025, 8, 1),
            },
        )
        .unwrap();

    assert!(loan.is_migrated);
    assert_eq!(loan.total_collected, Some(dec!(30000)));

    let txns = ledger.loan_transactions(TENANT, loan.id).unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].txn_type, TransactionType::OpeningBalance);
    assert_eq!(txns[0].amount, dec!(30000));

    // Opening balances are pre-ledger history: both cash derivations
    // exclude them, and they still agree.
    assert_eq!(ledger.cash_in_hand(TENANT).unwrap(), dec!(0));
    assert_eq!(ledger.cash_in_hand_bottom_up(TENANT).unwrap(), dec!(0));

    // Ledger-era collections stack on top of the migrated total.
    ledger
        .record_transaction(
            TENANT,
            &admin(),
            &RecordTransaction {
                loan_id: loan.id,
                txn_type: TransactionType::DailyCollection,
                amount: dec!(1000),
                transaction_date: d(2025, 8, 2),
                effective_date: None,
                penalty_id: None,
                corrects: None,
                notes: None,
            },
        )
        .unwrap();
    assert_eq!(ledger.get_loan(TENANT, loan.id).unwrap().total_collected, Some(dec!(31000)));
    assert_eq!(ledger.cash_in_hand(TENANT).unwrap(), dec!(1000));
    assert_eq!(ledger.cash_in_hand_bottom_up(TENANT).unwrap(), dec!(1000));
}

#[test]
fn migrated_penalties_count_toward_months_already_penalised() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let borrower = ledger.create_customer(TENANT, "Binod Rai", None).unwrap().id;
    // Term ended 2025-02-28 + 7 grace: overdue since 2025-03-07.
    let loan = ledger
        .migrate_daily_loan(
            TENANT,
            &admin(),
            &MigrateDailyLoan {
                borrower_id: borrower,
                guarantor_id: None,
                principal_amount: dec!(60000),
                interest_rate: dec!(4),
                disbursement_date: d(2024, 11, 20),
                term_days: 100,
                grace_days: None,
                collected_to_date: dec!(10000),
                migration_date: d(2025, 5, 1),
            },
        )
        .unwrap();

    // Two months were already penalised before migration, one of them waived.
    let carried = ledger
        .migrate_penalty(
            TENANT,
            &admin(),
            &MigratePenalty {
                loan_id: loan.id,
                days_overdue: 40,
                months_charged: 2,
                amount: dec!(4800),
                waived_amount: dec!(4800),
                amount_collected: dec!(0),
                imposed_date: d(2025, 4, 16),
            },
        )
        .unwrap();
    assert_eq!(carried.status, PenaltyStatus::Waived);

    // 2025-06-10 is 95 days past the threshold: 4 months owed, 2 carried,
    // so the native imposition charges exactly 2.
    let p = ledger
        .impose_penalty(
            TENANT,
            &admin(),
            &ImposePenalty { loan_id: loan.id, override_amount: None },
            d(2025, 6, 10),
        )
        .unwrap();
    assert_eq!(p.months_charged, 2);
    assert_eq!(p.amount, dec!(4800.00));
}
