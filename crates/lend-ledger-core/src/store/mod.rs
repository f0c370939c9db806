//! SQLite-backed store. One `Ledger` per connection; every mutating
//! operation runs inside a single SQLite transaction and conditions its
//! loan-row writes on the version read at the start.

use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::LedgerError;
use crate::types::*;
use crate::LedgerResult;

pub mod loans;
pub mod migration;
pub mod penalties;
pub mod reports;
pub mod schema;
pub mod transactions;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (creating if needed) a ledger database file.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        // journal_mode is the one pragma that answers with a row.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
        Self::init(conn)
    }

    /// In-memory ledger, used throughout the test suites.
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> LedgerResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Ledger { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Entities (one struct per row shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub phone: Option<String>,
    pub is_defaulter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub tenant_id: TenantId,
    pub loan_number: String,
    pub loan_type: LoanType,
    pub borrower_id: CustomerId,
    pub guarantor_id: Option<CustomerId>,
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    pub status: LoanStatus,
    pub version: i64,
    pub is_migrated: bool,

    // monthly variant
    pub remaining_principal: Option<Money>,
    pub migrated_remaining_principal: Option<Money>,
    pub billing_principal: Option<Money>,
    pub advance_interest_amount: Option<Money>,
    pub monthly_due_day: Option<u32>,
    pub interest_paid_through: Option<NaiveDate>,
    pub expected_months: Option<u32>,

    // daily variant
    pub term_days: Option<i64>,
    pub total_repayment_amount: Option<Money>,
    pub daily_payment_amount: Option<Money>,
    pub term_end_date: Option<NaiveDate>,
    pub grace_days: Option<i64>,
    pub total_collected: Option<Money>,

    pub created_by: UserId,
    pub closed_at: Option<NaiveDate>,
    pub closed_by: Option<UserId>,
    pub defaulted_at: Option<NaiveDate>,
    pub defaulted_by: Option<UserId>,
    pub written_off_at: Option<NaiveDate>,
    pub written_off_by: Option<UserId>,
    pub cancelled_at: Option<NaiveDate>,
    pub cancelled_by: Option<UserId>,
}

impl Loan {
    pub fn require_type(&self, expected: LoanType) -> LedgerResult<()> {
        if self.loan_type == expected {
            Ok(())
        } else {
            Err(LedgerError::WrongLoanType {
                loan_id: self.id,
                expected,
                actual: self.loan_type,
            })
        }
    }

    pub(crate) fn require_field<T: Copy>(&self, field: Option<T>, column: &str) -> LedgerResult<T> {
        field.ok_or_else(|| LedgerError::CorruptValue {
            column: column.into(),
            value: format!("NULL on a {} loan", self.loan_type),
        })
    }

    pub fn monthly_terms(&self) -> LedgerResult<crate::billing::MonthlyTerms> {
        self.require_type(LoanType::Monthly)?;
        Ok(crate::billing::MonthlyTerms {
            // Migrated loans bill against their remaining principal as of
            // migration, not the original principal.
            base_principal: self
                .migrated_remaining_principal
                .unwrap_or(self.principal_amount),
            interest_rate: self.interest_rate,
            disbursement_date: self.disbursement_date,
            due_day: self.require_field(self.monthly_due_day, "monthly_due_day")?,
            interest_paid_through: self.interest_paid_through,
        })
    }

    pub fn repayment_terms(&self) -> LedgerResult<crate::schedule::RepaymentTerms> {
        self.require_type(LoanType::Daily)?;
        Ok(crate::schedule::RepaymentTerms {
            total_repayment: self.require_field(self.total_repayment_amount, "total_repayment_amount")?,
            daily_payment: self.require_field(self.daily_payment_amount, "daily_payment_amount")?,
            term_end: self.require_field(self.term_end_date, "term_end_date")?,
        })
    }

    /// Collected so far on a daily loan (zero when the column is unset).
    pub fn collected(&self) -> Money {
        self.total_collected.unwrap_or(Decimal::ZERO)
    }

    /// Remaining principal on a monthly loan (principal when unset).
    pub fn remaining(&self) -> Money {
        self.remaining_principal.unwrap_or(self.principal_amount)
    }

    /// Principal still out in the world. Monthly loans amortize explicitly;
    /// daily collections pay principal down first.
    pub fn outstanding_principal(&self) -> Money {
        match self.loan_type {
            LoanType::Monthly => self.remaining(),
            LoanType::Daily => (self.principal_amount - self.collected()).max(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub penalty_id: Option<PenaltyId>,
    pub txn_type: TransactionType,
    pub amount: Money,
    pub transaction_date: NaiveDate,
    pub effective_date: Option<NaiveDate>,
    pub approval_status: ApprovalStatus,
    pub corrected_transaction_id: Option<TransactionId>,
    pub collected_by: UserId,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<NaiveDate>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalReturn {
    pub id: i64,
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub remaining_principal_after: Money,
    pub return_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub id: PenaltyId,
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub days_overdue: i64,
    pub months_charged: i64,
    pub amount: Money,
    pub waived_amount: Money,
    pub amount_collected: Money,
    pub status: PenaltyStatus,
    pub was_overridden: bool,
    pub imposed_date: NaiveDate,
    pub imposed_by: UserId,
}

impl Penalty {
    pub fn net_payable(&self) -> Money {
        self.amount - self.waived_amount
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, PenaltyStatus::Pending | PenaltyStatus::PartiallyPaid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundEntry {
    pub id: i64,
    pub tenant_id: TenantId,
    pub entry_type: FundEntryType,
    pub amount: Money,
    pub entry_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub tenant_id: TenantId,
    pub amount: Money,
    pub expense_date: NaiveDate,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub is_deleted: bool,
}

// ---------------------------------------------------------------------------
// Column decoding
// ---------------------------------------------------------------------------

fn decode_err(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("{column}: {value}").into(),
    )
}

pub(crate) fn col_money(row: &Row<'_>, column: &str) -> rusqlite::Result<Money> {
    let raw: String = row.get(column)?;
    Decimal::from_str(&raw).map_err(|_| decode_err(column, &raw))
}

pub(crate) fn col_money_opt(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Money>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|_| decode_err(column, &s)))
        .transpose()
}

pub(crate) fn col_date(row: &Row<'_>, column: &str) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| decode_err(column, &raw))
}

pub(crate) fn col_date_opt(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| decode_err(column, &s)))
        .transpose()
}

fn col_enum<T>(row: &Row<'_>, column: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    parse(&raw).ok_or_else(|| decode_err(column, &raw))
}

impl Loan {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
        Ok(Loan {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            loan_number: row.get("loan_number")?,
            loan_type: col_enum(row, "loan_type", LoanType::parse)?,
            borrower_id: row.get("borrower_id")?,
            guarantor_id: row.get("guarantor_id")?,
            principal_amount: col_money(row, "principal_amount")?,
            interest_rate: col_money(row, "interest_rate")?,
            disbursement_date: col_date(row, "disbursement_date")?,
            status: col_enum(row, "status", LoanStatus::parse)?,
            version: row.get("version")?,
            is_migrated: row.get("is_migrated")?,
            remaining_principal: col_money_opt(row, "remaining_principal")?,
            migrated_remaining_principal: col_money_opt(row, "migrated_remaining_principal")?,
            billing_principal: col_money_opt(row, "billing_principal")?,
            advance_interest_amount: col_money_opt(row, "advance_interest_amount")?,
            monthly_due_day: row.get("monthly_due_day")?,
            interest_paid_through: col_date_opt(row, "interest_paid_through")?,
            expected_months: row.get("expected_months")?,
            term_days: row.get("term_days")?,
            total_repayment_amount: col_money_opt(row, "total_repayment_amount")?,
            daily_payment_amount: col_money_opt(row, "daily_payment_amount")?,
            term_end_date: col_date_opt(row, "term_end_date")?,
            grace_days: row.get("grace_days")?,
            total_collected: col_money_opt(row, "total_collected")?,
            created_by: row.get("created_by")?,
            closed_at: col_date_opt(row, "closed_at")?,
            closed_by: row.get("closed_by")?,
            defaulted_at: col_date_opt(row, "defaulted_at")?,
            defaulted_by: row.get("defaulted_by")?,
            written_off_at: col_date_opt(row, "written_off_at")?,
            written_off_by: row.get("written_off_by")?,
            cancelled_at: col_date_opt(row, "cancelled_at")?,
            cancelled_by: row.get("cancelled_by")?,
        })
    }
}

impl Transaction {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
        Ok(Transaction {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            loan_id: row.get("loan_id")?,
            penalty_id: row.get("penalty_id")?,
            txn_type: col_enum(row, "txn_type", TransactionType::parse)?,
            amount: col_money(row, "amount")?,
            transaction_date: col_date(row, "transaction_date")?,
            effective_date: col_date_opt(row, "effective_date")?,
            approval_status: col_enum(row, "approval_status", ApprovalStatus::parse)?,
            corrected_transaction_id: row.get("corrected_transaction_id")?,
            collected_by: row.get("collected_by")?,
            approved_by: row.get("approved_by")?,
            approved_at: col_date_opt(row, "approved_at")?,
            rejected_by: row.get("rejected_by")?,
            rejected_at: col_date_opt(row, "rejected_at")?,
            rejection_reason: row.get("rejection_reason")?,
            notes: row.get("notes")?,
        })
    }
}

impl Penalty {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Penalty> {
        Ok(Penalty {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            loan_id: row.get("loan_id")?,
            days_overdue: row.get("days_overdue")?,
            months_charged: row.get("months_charged")?,
            amount: col_money(row, "amount")?,
            waived_amount: col_money(row, "waived_amount")?,
            amount_collected: col_money(row, "amount_collected")?,
            status: col_enum(row, "status", PenaltyStatus::parse)?,
            was_overridden: row.get("was_overridden")?,
            imposed_date: col_date(row, "imposed_date")?,
            imposed_by: row.get("imposed_by")?,
        })
    }
}

impl PrincipalReturn {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<PrincipalReturn> {
        Ok(PrincipalReturn {
            id: row.get("id")?,
            tenant_id: row.get("tenant_id")?,
            loan_id: row.get("loan_id")?,
            transaction_id: row.get("transaction_id")?,
            amount: col_money(row, "amount")?,
            remaining_principal_after: col_money(row, "remaining_principal_after")?,
            return_date: col_date(row, "return_date")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Shared fetch / guard helpers
// ---------------------------------------------------------------------------

/// Fetch a loan scoped to its tenant; cross-tenant ids read as NotFound.
pub(crate) fn fetch_loan(
    conn: &Connection,
    tenant: TenantId,
    loan_id: LoanId,
) -> LedgerResult<Loan> {
    conn.query_row(
        "SELECT * FROM loans WHERE id = ?1 AND tenant_id = ?2",
        rusqlite::params![loan_id, tenant],
        |row| Loan::from_row(row),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::LoanNotFound(loan_id),
        other => other.into(),
    })
}

pub(crate) fn fetch_customer(
    conn: &Connection,
    tenant: TenantId,
    customer_id: CustomerId,
) -> LedgerResult<Customer> {
    conn.query_row(
        "SELECT id, tenant_id, name, phone, is_defaulter FROM customers
         WHERE id = ?1 AND tenant_id = ?2",
        rusqlite::params![customer_id, tenant],
        |row| {
            Ok(Customer {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                name: row.get(2)?,
                phone: row.get(3)?,
                is_defaulter: row.get(4)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::CustomerNotFound(customer_id),
        other => other.into(),
    })
}

/// Map a UNIQUE-constraint failure on an insert to the Duplicate conflict;
/// everything else passes through as a storage error.
pub(crate) fn map_duplicate(e: rusqlite::Error, what: &str) -> LedgerError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LedgerError::Duplicate(what.into())
        }
        _ => LedgerError::Storage(e),
    }
}

/// A loan-row UPDATE carried `WHERE version = ?`; zero rows affected means
/// the optimistic lock was lost.
pub(crate) fn guard_version(affected: usize, loan_id: LoanId) -> LedgerResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(LedgerError::ConcurrentModification(loan_id))
    }
}

// ---------------------------------------------------------------------------
// Customers (collaborator rows: just enough for borrower/guarantor checks
// and the defaulter flag)
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn create_customer(
        &mut self,
        tenant: TenantId,
        name: &str,
        phone: Option<&str>,
    ) -> LedgerResult<Customer> {
        self.conn.execute(
            "INSERT INTO customers (tenant_id, name, phone) VALUES (?1, ?2, ?3)",
            rusqlite::params![tenant, name, phone],
        )?;
        let id = self.conn.last_insert_rowid();
        fetch_customer(&self.conn, tenant, id)
    }

    pub fn get_customer(&self, tenant: TenantId, id: CustomerId) -> LedgerResult<Customer> {
        fetch_customer(&self.conn, tenant, id)
    }
}

pub(crate) fn set_customer_defaulter(
    conn: &Connection,
    tenant: TenantId,
    customer_id: CustomerId,
    flag: bool,
) -> LedgerResult<()> {
    let affected = conn.execute(
        "UPDATE customers SET is_defaulter = ?3 WHERE id = ?1 AND tenant_id = ?2",
        rusqlite::params![customer_id, tenant, flag],
    )?;
    if affected == 0 {
        return Err(LedgerError::CustomerNotFound(customer_id));
    }
    Ok(())
}
