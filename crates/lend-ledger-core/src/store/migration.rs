//! Migration adapter: ingests loans that already lived part of their life
//! outside this ledger, at their current state, without synthesizing the
//! transactions that state came from.

use chrono::{Datelike, NaiveDate};
use rusqlite::params;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing;
use crate::error::LedgerError;
use crate::penalty;
use crate::schedule::{self, DEFAULT_GRACE_DAYS};
use crate::types::*;
use crate::LedgerResult;

use super::loans::{allocate_loan_number, check_parties, validate_positive};
use super::transactions::fetch_penalty;
use super::{fetch_loan, map_duplicate, Ledger, Loan, Penalty};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateMonthlyLoan {
    pub borrower_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantor_id: Option<CustomerId>,
    /// Original principal at disbursement.
    pub principal_amount: Money,
    /// Principal still outstanding at migration; the billing base from
    /// migration onward.
    pub remaining_principal: Money,
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    /// Last month interest was settled outside the ledger; cycles through
    /// this month are never billed here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_paid_through: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_months: Option<u32>,
    pub migration_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateDailyLoan {
    pub borrower_id: CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantor_id: Option<CustomerId>,
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    pub term_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_days: Option<i64>,
    /// Collected before the ledger took over; becomes the OPENING_BALANCE.
    pub collected_to_date: Money,
    pub migration_date: NaiveDate,
}

/// A penalty imposed before migration, carried over at its current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratePenalty {
    pub loan_id: LoanId,
    pub days_overdue: i64,
    pub months_charged: i64,
    pub amount: Money,
    pub waived_amount: Money,
    pub amount_collected: Money,
    pub imposed_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn migrate_monthly_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &MigrateMonthlyLoan,
    ) -> LedgerResult<Loan> {
        validate_positive(input.principal_amount, "principal_amount")?;
        if input.remaining_principal < Decimal::ZERO
            || input.remaining_principal > input.principal_amount
        {
            return Err(LedgerError::InvalidInput {
                field: "remaining_principal".into(),
                reason: format!(
                    "must be between 0 and the original principal {}",
                    input.principal_amount
                ),
            });
        }
        if let Some(w) = input.interest_paid_through {
            if w < input.disbursement_date {
                return Err(LedgerError::InvalidInput {
                    field: "interest_paid_through".into(),
                    reason: "precedes the disbursement date".into(),
                });
            }
        }

        let tx = self.conn.transaction()?;
        check_parties(&tx, tenant, input.borrower_id, input.guarantor_id)?;
        let number = allocate_loan_number(
            &tx,
            tenant,
            LoanType::Monthly,
            input.disbursement_date.year(),
        )?;
        let advance = billing::advance_interest(input.principal_amount, input.interest_rate);

        tx.execute(
            "INSERT INTO loans (tenant_id, loan_number, loan_type, borrower_id, guarantor_id,
                                principal_amount, interest_rate, disbursement_date, status,
                                is_migrated, remaining_principal, migrated_remaining_principal,
                                billing_principal, advance_interest_amount, monthly_due_day,
                                interest_paid_through, expected_months, created_by, created_at)
             VALUES (?1, ?2, 'MONTHLY', ?3, ?4, ?5, ?6, ?7, 'ACTIVE', 1, ?8, ?8, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14)",
            params![
                tenant,
                number,
                input.borrower_id,
                input.guarantor_id,
                input.principal_amount.to_string(),
                input.interest_rate.to_string(),
                input.disbursement_date.to_string(),
                input.remaining_principal.to_string(),
                advance.to_string(),
                input.disbursement_date.day(),
                input.interest_paid_through.map(|d| d.to_string()),
                input.expected_months,
                actor.id,
                input.migration_date.to_string(),
            ],
        )
        .map_err(|e| map_duplicate(e, "loan_number"))?;
        let loan_id = tx.last_insert_rowid();
        tx.commit()?;
        info!(loan_id, %number, "migrated monthly loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    pub fn migrate_daily_loan(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &MigrateDailyLoan,
    ) -> LedgerResult<Loan> {
        validate_positive(input.principal_amount, "principal_amount")?;
        if input.term_days <= 0 {
            return Err(LedgerError::InvalidInput {
                field: "term_days".into(),
                reason: "must be positive".into(),
            });
        }
        let terms = schedule::derive_repayment(
            input.principal_amount,
            input.interest_rate,
            input.term_days,
            input.disbursement_date,
        );
        if input.collected_to_date < Decimal::ZERO
            || input.collected_to_date > terms.total_repayment
        {
            return Err(LedgerError::InvalidInput {
                field: "collected_to_date".into(),
                reason: format!(
                    "must be between 0 and the total repayment {}",
                    terms.total_repayment
                ),
            });
        }

        let tx = self.conn.transaction()?;
        check_parties(&tx, tenant, input.borrower_id, input.guarantor_id)?;
        let number =
            allocate_loan_number(&tx, tenant, LoanType::Daily, input.disbursement_date.year())?;

        tx.execute(
            "INSERT INTO loans (tenant_id, loan_number, loan_type, borrower_id, guarantor_id,
                                principal_amount, interest_rate, disbursement_date, status,
                                is_migrated, term_days, total_repayment_amount,
                                daily_payment_amount, term_end_date, grace_days,
                                total_collected, created_by, created_at)
             VALUES (?1, ?2, 'DAILY', ?3, ?4, ?5, ?6, ?7, 'ACTIVE', 1, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15)",
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
                input.grace_days.unwrap_or(DEFAULT_GRACE_DAYS),
                input.collected_to_date.to_string(),
                actor.id,
                input.migration_date.to_string(),
            ],
        )
        .map_err(|e| map_duplicate(e, "loan_number"))?;
        let loan_id = tx.last_insert_rowid();

        // Pre-ledger collections enter as one OPENING_BALANCE entry: part of
        // the loan's history, invisible to cash reconciliation.
        if input.collected_to_date > Decimal::ZERO {
            tx.execute(
                "INSERT INTO transactions (tenant_id, loan_id, txn_type, amount,
                                           transaction_date, approval_status, collected_by,
                                           approved_by, approved_at)
                 VALUES (?1, ?2, 'OPENING_BALANCE', ?3, ?4, 'APPROVED', ?5, ?5, ?4)",
                params![
                    tenant,
                    loan_id,
                    input.collected_to_date.to_string(),
                    input.migration_date.to_string(),
                    actor.id,
                ],
            )?;
        }

        tx.commit()?;
        info!(loan_id, %number, "migrated daily loan");
        fetch_loan(&self.conn, tenant, loan_id)
    }

    /// Carry over a penalty imposed before migration. Its months count
    /// toward `monthsAlreadyPenalised` exactly like a native imposition.
    pub fn migrate_penalty(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &MigratePenalty,
    ) -> LedgerResult<Penalty> {
        if input.months_charged <= 0 {
            return Err(LedgerError::InvalidInput {
                field: "months_charged".into(),
                reason: "must be positive".into(),
            });
        }
        validate_positive(input.amount, "amount")?;
        if input.waived_amount < Decimal::ZERO || input.amount_collected < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                reason: "waived and collected amounts must not be negative".into(),
            });
        }

        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, input.loan_id)?;
        loan.require_type(LoanType::Daily)?;
        let status =
            penalty::recompute_status(input.amount, input.waived_amount, input.amount_collected);

        tx.execute(
            "INSERT INTO penalties (tenant_id, loan_id, days_overdue, months_charged, amount,
                                    waived_amount, amount_collected, status, was_overridden,
                                    imposed_date, imposed_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
            params![
                tenant,
                input.loan_id,
                input.days_overdue,
                input.months_charged,
                input.amount.to_string(),
                input.waived_amount.to_string(),
                input.amount_collected.to_string(),
                status.as_str(),
                input.imposed_date.to_string(),
                actor.id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        info!(loan_id = input.loan_id, penalty_id = id, "migrated penalty");
        fetch_penalty(&self.conn, tenant, id)
    }
}
