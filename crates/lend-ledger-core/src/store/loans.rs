//! Loan origination, lifecycle transitions, and derived views.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing::{self, BillingCycle, CycleCredit, ReturnSnapshot};
use crate::error::LedgerError;
use crate::schedule::{self, DayStatus, DEFAULT_GRACE_DAYS};
use crate::types::*;
use crate::LedgerResult;

use super::{
    fetch_customer, fetch_loan, guard_version, map_duplicate, set_customer_defaulter, Customer,
    Ledger, Loan,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMonthlyLoan {
    pub borrower_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantor_id: Option<CustomerId>,
    pub principal_amount: Money,
    /// Percent per month.
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDailyLoan {
    pub borrower_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantor_id: Option<CustomerId>,
    pub principal_amount: Money,
    /// Percent per 30 days.
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    pub term_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub loan_type: Option<LoanType>,
    pub borrower_id: Option<CustomerId>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyDetail {
    pub cycles: Vec<BillingCycle>,
    pub next_due_date: Option<NaiveDate>,
    pub is_overdue: bool,
    pub total_interest_paid: Money,
    pub total_interest_waived: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyDetail {
    pub overdue_threshold: NaiveDate,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub outstanding_penalties: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub borrower: Customer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantor: Option<Customer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<MonthlyDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyDetail>,
}

/// Day-by-day repayment view for daily loans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub loan_id: LoanId,
    pub loan_number: String,
    pub daily_payment_amount: Money,
    pub total_repayment_amount: Money,
    pub total_collected: Money,
    pub days: Vec<DayStatus>,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

// ---------------------------------------------------------------------------
// Origination
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn create_monthly_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &CreateMonthlyLoan,
    ) -> LedgerResult<Loan> {
        validate_positive(input.principal_amount, "principal_amount")?;
        validate_rate(input.interest_rate)?;
        let tx = self.conn.transaction()?;
        check_parties(&tx, tenant, input.borrower_id, input.guarantor_id)?;

        let number = allocate_loan_number(
            &tx,
            tenant,
            LoanType::Monthly,
            input.disbursement_date.year(),
        )?;
        let advance = billing::advance_interest(input.principal_amount, input.interest_rate);
        let due_day = input.disbursement_date.day();

        tx.execute(
            "INSERT INTO loans (tenant_id, loan_number, loan_type, borrower_id, guarantor_id,
                                principal_amount, interest_rate, disbursement_date, status,
                                remaining_principal, billing_principal, advance_interest_amount,
                                monthly_due_day, expected_months, created_by)
             VALUES (?1, ?2, 'MONTHLY', ?3, ?4, ?5, ?6, ?7, 'ACTIVE', ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                tenant,
                number,
                input.borrower_id,
                input.guarantor_id,
                input.principal_amount.to_string(),
                input.interest_rate.to_string(),
                input.disbursement_date.to_string(),
                input.principal_amount.to_string(),
                input.principal_amount.to_string(),
                advance.to_string(),
                due_day,
                input.expected_months,
                actor.id,
            ],
        )
        .map_err(|e| map_duplicate(e, "loan_number"))?;
        let loan_id = tx.last_insert_rowid();

        insert_origination_txn(
            &tx,
            tenant,
            loan_id,
            TransactionType::Disbursement,
            input.principal_amount,
            input.disbursement_date,
            actor,
            input.notes.as_deref(),
        )?;
        insert_origination_txn(
            &tx,
            tenant,
            loan_id,
            TransactionType::AdvanceInterest,
            advance,
            input.disbursement_date,
            actor,
            None,
        )?;

        tx.commit()?;
        info!(loan_id, %number, "created monthly loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    pub fn create_daily_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &CreateDailyLoan,
    ) -> LedgerResult<Loan> {
        validate_positive(input.principal_amount, "principal_amount")?;
        validate_rate(input.interest_rate)?;
        if input.term_days <= 0 {
            return Err(LedgerError::InvalidInput {
                field: "term_days".into(),
                reason: "must be positive".into(),
            });
        }
        let grace = input.grace_days.unwrap_or(DEFAULT_GRACE_DAYS);
        if grace < 0 {
            return Err(LedgerError::InvalidInput {
                field: "grace_days".into(),
                reason: "must not be negative".into(),
            });
        }

        let tx = self.conn.transaction()?;
        check_parties(&tx, tenant, input.borrower_id, input.guarantor_id)?;

        let number =
            allocate_loan_number(&tx, tenant, LoanType::Daily, input.disbursement_date.year())?;
        let terms = schedule::derive_repayment(
            input.principal_amount,
            input.interest_rate,
            input.term_days,
            input.disbursement_date,
        );

        tx.execute(
            "INSERT INTO loans (tenant_id, loan_number, loan_type, borrower_id, guarantor_id,
                                principal_amount, interest_rate, disbursement_date, status,
                                term_days, total_repayment_amount, daily_payment_amount,
                                term_end_date, grace_days, total_collected, created_by)
             VALUES (?1, ?2, 'DAILY', ?3, ?4, ?5, ?6, ?7, 'ACTIVE', ?8, ?9, ?10, ?11, ?12, '0', ?13)",
            params![
                tenant,
                number,
                input.borrower_id,
                input.guarantor_id,
                input.principal_amount.to_string(),
                input.interest_rate.to_string(),
                input.disbursement_date.to_string(),
                input.term_days,
                terms.total_repayment.to_string(),
                terms.daily_payment.to_string(),
                terms.term_end.to_string(),
                grace,
                actor.id,
            ],
        )
        .map_err(|e| map_duplicate(e, "loan_number"))?;
        let loan_id = tx.last_insert_rowid();

        insert_origination_txn(
            &tx,
            tenant,
            loan_id,
            TransactionType::Disbursement,
            input.principal_amount,
            input.disbursement_date,
            actor,
            input.notes.as_deref(),
        )?;

        tx.commit()?;
        info!(loan_id, %number, "created daily loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    pub fn get_loan(&self, tenant: TenantId, loan_id: LoanId) -> LedgerResult<Loan> {
        fetch_loan(&self.conn, tenant, loan_id)
    }

    pub fn list_loans(&self, tenant: TenantId, filter: &LoanFilter) -> LedgerResult<Vec<Loan>> {
        let mut sql = String::from("SELECT * FROM loans WHERE tenant_id = ?1");
        let mut values: Vec<Value> = vec![Value::Integer(tenant)];
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().into()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(loan_type) = filter.loan_type {
            values.push(Value::Text(loan_type.as_str().into()));
            sql.push_str(&format!(" AND loan_type = ?{}", values.len()));
        }
        if let Some(borrower) = filter.borrower_id {
            values.push(Value::Integer(borrower));
            sql.push_str(&format!(" AND borrower_id = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| Loan::from_row(row))?;
        let mut loans = Vec::new();
        for loan in rows {
            loans.push(loan?);
        }
        Ok(loans)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

fn assert_transition(loan: &Loan, to: LoanStatus) -> LedgerResult<()> {
    use LoanStatus::*;
    let ok = matches!(
        (loan.status, to),
        (Active, Closed) | (Active, Defaulted) | (Active, Cancelled)
            | (Defaulted, Closed)
            | (Defaulted, WrittenOff)
    );
    if ok {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            from: loan.status,
            to,
        })
    }
}

impl Ledger {
    /// Close a loan. Monthly loans must be fully amortized with every cycle
    /// through the closing month settled; daily loans must be collected in
    /// full with no outstanding penalties.
    pub fn close_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        loan_id: LoanId,
        on: NaiveDate,
    ) -> LedgerResult<Loan> {
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, loan_id)?;
        assert_transition(&loan, LoanStatus::Closed)?;

        match loan.loan_type {
            LoanType::Monthly => {
                if loan.remaining() != Decimal::ZERO {
                    return Err(LedgerError::InvalidInput {
                        field: "remaining_principal".into(),
                        reason: format!("{} outstanding; loan not fully amortized", loan.remaining()),
                    });
                }
                let cycles = monthly_cycles(&tx, &loan, on)?;
                if !billing::all_settled(&cycles) {
                    return Err(LedgerError::InvalidInput {
                        field: "billing_cycles".into(),
                        reason: "unsettled interest cycles remain".into(),
                    });
                }
            }
            LoanType::Daily => {
                let total = loan.total_repayment_amount.unwrap_or(Decimal::ZERO);
                if loan.collected() < total {
                    return Err(LedgerError::InvalidInput {
                        field: "total_collected".into(),
                        reason: format!("{} of {} collected", loan.collected(), total),
                    });
                }
                if outstanding_penalties(&tx, loan_id)? > 0 {
                    return Err(LedgerError::InvalidInput {
                        field: "penalties".into(),
                        reason: "outstanding penalties must be paid or waived".into(),
                    });
                }
            }
        }

        let affected = tx.execute(
            "UPDATE loans SET status = 'CLOSED', closed_at = ?1, closed_by = ?2,
                              version = version + 1
             WHERE id = ?3 AND version = ?4",
            params![on.to_string(), actor.id, loan_id, loan.version],
        )?;
        guard_version(affected, loan_id)?;
        tx.commit()?;
        info!(loan_id, "closed loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    /// Default a loan and flag the borrower so future guarantor lookups
    /// surface the warning.
    pub fn default_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        loan_id: LoanId,
        on: NaiveDate,
    ) -> LedgerResult<Loan> {
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, loan_id)?;
        assert_transition(&loan, LoanStatus::Defaulted)?;

        let affected = tx.execute(
            "UPDATE loans SET status = 'DEFAULTED', defaulted_at = ?1, defaulted_by = ?2,
                              version = version + 1
             WHERE id = ?3 AND version = ?4",
            params![on.to_string(), actor.id, loan_id, loan.version],
        )?;
        guard_version(affected, loan_id)?;
        set_customer_defaulter(&tx, tenant, loan.borrower_id, true)?;
        tx.commit()?;
        info!(loan_id, borrower = loan.borrower_id, "defaulted loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    pub fn write_off_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        loan_id: LoanId,
        on: NaiveDate,
    ) -> LedgerResult<Loan> {
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, loan_id)?;
        assert_transition(&loan, LoanStatus::WrittenOff)?;

        let affected = tx.execute(
            "UPDATE loans SET status = 'WRITTEN_OFF', written_off_at = ?1, written_off_by = ?2,
                              version = version + 1
             WHERE id = ?3 AND version = ?4",
            params![on.to_string(), actor.id, loan_id, loan.version],
        )?;
        guard_version(affected, loan_id)?;
        tx.commit()?;
        info!(loan_id, "wrote off loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    /// Cancel a loan that never saw real activity. Only the origination
    /// entries may exist; any other PENDING or APPROVED transaction blocks
    /// cancellation (rejected ones do not).
    pub fn cancel_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        loan_id: LoanId,
        on: NaiveDate,
    ) -> LedgerResult<Loan> {
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, loan_id)?;
        assert_transition(&loan, LoanStatus::Cancelled)?;

        let activity: i64 = tx.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE loan_id = ?1
               AND approval_status IN ('PENDING', 'APPROVED')
               AND txn_type NOT IN ('DISBURSEMENT', 'ADVANCE_INTEREST', 'OPENING_BALANCE')",
            params![loan_id],
            |row| row.get(0),
        )?;
        if activity > 0 {
            return Err(LedgerError::LoanHasActivity(loan_id));
        }

        let affected = tx.execute(
            "UPDATE loans SET status = 'CANCELLED', cancelled_at = ?1, cancelled_by = ?2,
                              version = version + 1
             WHERE id = ?3 AND version = ?4",
            params![on.to_string(), actor.id, loan_id, loan.version],
        )?;
        guard_version(affected, loan_id)?;
        tx.commit()?;
        info!(loan_id, "cancelled loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn loan_detail(
        &self,
        tenant: TenantId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> LedgerResult<LoanDetail> {
        let loan = fetch_loan(&self.conn, tenant, loan_id)?;
        let borrower = fetch_customer(&self.conn, tenant, loan.borrower_id)?;
        let guarantor = loan
            .guarantor_id
            .map(|id| fetch_customer(&self.conn, tenant, id))
            .transpose()?;

        let (monthly, daily) = match loan.loan_type {
            LoanType::Monthly => {
                let horizon = loan.closed_at.unwrap_or(as_of);
                let cycles = monthly_cycles(&self.conn, &loan, horizon)?;
                let state = billing::due_state(&cycles, as_of);
                let paid: Money = cycles.iter().map(|c| c.interest_paid).sum();
                let waived: Money = cycles.iter().map(|c| c.interest_waived).sum();
                (
                    Some(MonthlyDetail {
                        cycles,
                        next_due_date: state.next_due_date,
                        is_overdue: state.is_overdue,
                        total_interest_paid: paid,
                        total_interest_waived: waived,
                    }),
                    None,
                )
            }
            LoanType::Daily => {
                let terms = loan.repayment_terms()?;
                let grace = loan.grace_days.unwrap_or(DEFAULT_GRACE_DAYS);
                let threshold = schedule::overdue_threshold(terms.term_end, grace);
                let overdue = schedule::is_overdue(
                    loan.status,
                    threshold,
                    loan.collected(),
                    terms.total_repayment,
                    as_of,
                );
                (
                    None,
                    Some(DailyDetail {
                        overdue_threshold: threshold,
                        is_overdue: overdue,
                        days_overdue: if overdue {
                            schedule::days_overdue(threshold, as_of)
                        } else {
                            0
                        },
                        outstanding_penalties: outstanding_penalties(&self.conn, loan_id)?,
                    }),
                )
            }
        };

        Ok(LoanDetail {
            loan,
            borrower,
            guarantor,
            monthly,
            daily,
        })
    }

    /// Day-by-day repayment view. Daily loans only.
    pub fn payment_status(
        &self,
        tenant: TenantId,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> LedgerResult<PaymentStatus> {
        let loan = fetch_loan(&self.conn, tenant, loan_id)?;
        let terms = loan.repayment_terms()?;
        let term_days = loan.require_field(loan.term_days, "term_days")?;
        let grace = loan.grace_days.unwrap_or(DEFAULT_GRACE_DAYS);
        let collections = fetch_daily_collections(&self.conn, loan_id)?;
        let days = schedule::day_by_day(
            &terms,
            loan.disbursement_date,
            term_days,
            &collections,
            as_of,
        );
        let threshold = schedule::overdue_threshold(terms.term_end, grace);
        let overdue = schedule::is_overdue(
            loan.status,
            threshold,
            loan.collected(),
            terms.total_repayment,
            as_of,
        );
        Ok(PaymentStatus {
            loan_id: loan.id,
            loan_number: loan.loan_number.clone(),
            daily_payment_amount: terms.daily_payment,
            total_repayment_amount: terms.total_repayment,
            total_collected: loan.collected(),
            days,
            is_overdue: overdue,
            days_overdue: if overdue {
                schedule::days_overdue(threshold, as_of)
            } else {
                0
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn validate_positive(amount: Money, field: &str) -> LedgerResult<()> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount {
            reason: format!("{field} must be positive, got {amount}"),
        })
    }
}

fn validate_rate(rate: Rate) -> LedgerResult<()> {
    if rate >= Decimal::ZERO {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput {
            field: "interest_rate".into(),
            reason: "must not be negative".into(),
        })
    }
}

pub(crate) fn check_parties(
    conn: &Connection,
    tenant: TenantId,
    borrower: CustomerId,
    guarantor: Option<CustomerId>,
) -> LedgerResult<()> {
    fetch_customer(conn, tenant, borrower)?;
    if let Some(g) = guarantor {
        if g == borrower {
            return Err(LedgerError::GuarantorSameAsBorrower);
        }
        fetch_customer(conn, tenant, g)?;
    }
    Ok(())
}

/// Next `{ML|DL}-{year}-{seq4}` for the tenant. The UNIQUE constraint on
/// (tenant_id, loan_number) backstops races between connections.
pub(crate) fn allocate_loan_number(
    conn: &Connection,
    tenant: TenantId,
    loan_type: LoanType,
    year: i32,
) -> LedgerResult<String> {
    let prefix = match loan_type {
        LoanType::Monthly => "ML",
        LoanType::Daily => "DL",
    };
    let pattern = format!("{prefix}-{year}-%");
    let last: Option<String> = conn
        .query_row(
            "SELECT loan_number FROM loans
             WHERE tenant_id = ?1 AND loan_type = ?2 AND loan_number LIKE ?3
             ORDER BY loan_number DESC LIMIT 1",
            params![tenant, loan_type.as_str(), pattern],
            |row| row.get(0),
        )
        .optional()?;
    let seq = last
        .as_deref()
        .and_then(|n| n.rsplit('-').next())
        .and_then(|s| s.parse::<u32>().ok())
        .map(|s| s + 1)
        .unwrap_or(1);
    Ok(format!("{prefix}-{year}-{seq:04}"))
}

fn insert_origination_txn(
    conn: &Connection,
    tenant: TenantId,
    loan_id: LoanId,
    txn_type: TransactionType,
    amount: Money,
    date: NaiveDate,
    actor: &Actor,
    notes: Option<&str>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO transactions (tenant_id, loan_id, txn_type, amount, transaction_date,
                                   approval_status, collected_by, approved_by, approved_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, 'APPROVED', ?6, ?6, ?5, ?7)",
        params![
            tenant,
            loan_id,
            txn_type.as_str(),
            amount.to_string(),
            date.to_string(),
            actor.id,
            notes,
        ],
    )?;
    Ok(())
}

/// Principal-return journal in chronological order.
pub(crate) fn fetch_return_journal(
    conn: &Connection,
    loan_id: LoanId,
) -> LedgerResult<Vec<ReturnSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT return_date, remaining_principal_after FROM principal_returns
         WHERE loan_id = ?1 ORDER BY return_date, id",
    )?;
    let rows = stmt.query_map(params![loan_id], |row| {
        Ok(ReturnSnapshot {
            return_date: super::col_date(row, "return_date")?,
            remaining_after: super::col_money(row, "remaining_principal_after")?,
        })
    })?;
    let mut journal = Vec::new();
    for row in rows {
        journal.push(row?);
    }
    Ok(journal)
}

/// Approved credits of one type, keyed by effective date. Corrections are
/// negative rows with the same effective date, so sums net out naturally.
pub(crate) fn fetch_cycle_credits(
    conn: &Connection,
    loan_id: LoanId,
    txn_type: TransactionType,
) -> LedgerResult<Vec<CycleCredit>> {
    let mut stmt = conn.prepare(
        "SELECT effective_date, amount FROM transactions
         WHERE loan_id = ?1 AND txn_type = ?2 AND approval_status = 'APPROVED'
           AND effective_date IS NOT NULL
         ORDER BY effective_date, id",
    )?;
    let rows = stmt.query_map(params![loan_id, txn_type.as_str()], |row| {
        Ok(CycleCredit {
            date: super::col_date(row, "effective_date")?,
            amount: super::col_money(row, "amount")?,
        })
    })?;
    let mut credits = Vec::new();
    for row in rows {
        credits.push(row?);
    }
    Ok(credits)
}

/// Approved daily collections (and their corrections) as (date, amount).
pub(crate) fn fetch_daily_collections(
    conn: &Connection,
    loan_id: LoanId,
) -> LedgerResult<Vec<(NaiveDate, Money)>> {
    let mut stmt = conn.prepare(
        "SELECT transaction_date, amount FROM transactions
         WHERE loan_id = ?1 AND txn_type = 'DAILY_COLLECTION' AND approval_status = 'APPROVED'
         ORDER BY transaction_date, id",
    )?;
    let rows = stmt.query_map(params![loan_id], |row| {
        Ok((
            super::col_date(row, "transaction_date")?,
            super::col_money(row, "amount")?,
        ))
    })?;
    let mut collections = Vec::new();
    for row in rows {
        collections.push(row?);
    }
    Ok(collections)
}

/// Full billing-cycle schedule for a monthly loan through the horizon.
pub(crate) fn monthly_cycles(
    conn: &Connection,
    loan: &Loan,
    horizon: NaiveDate,
) -> LedgerResult<Vec<BillingCycle>> {
    let terms = loan.monthly_terms()?;
    let returns = fetch_return_journal(conn, loan.id)?;
    let payments = fetch_cycle_credits(conn, loan.id, TransactionType::InterestPayment)?;
    let waivers = fetch_cycle_credits(conn, loan.id, TransactionType::InterestWaiver)?;
    Ok(billing::cycle_schedule(
        &terms, &returns, &payments, &waivers, horizon,
    ))
}

pub(crate) fn outstanding_penalties(conn: &Connection, loan_id: LoanId) -> LedgerResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM penalties
         WHERE loan_id = ?1 AND status IN ('PENDING', 'PARTIALLY_PAID')",
        params![loan_id],
        |row| row.get(0),
    )?)
}
