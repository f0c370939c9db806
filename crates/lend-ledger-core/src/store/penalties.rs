//! Penalty imposition, waivers, and the waiver audit trail.

use chrono::NaiveDate;
use rusqlite::{params, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LedgerError;
use crate::penalty;
use crate::schedule::{self, DEFAULT_GRACE_DAYS};
use crate::types::*;
use crate::LedgerResult;

use super::loans::validate_positive;
use super::transactions::{fetch_penalty, fetch_transaction};
use super::{fetch_loan, Ledger, Penalty, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImposePenalty {
    pub loan_id: LoanId,
    /// Override for the computed amount; recorded as such.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_amount: Option<Money>,
}

impl Ledger {
    /// Impose the incremental penalty a daily loan has accrued.
    ///
    /// Each imposition charges only the months not yet charged by earlier
    /// penalties, waived months included, since waiving forgives the money
    /// and not the month.
    pub fn impose_penalty(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &ImposePenalty,
        as_of: NaiveDate,
    ) -> LedgerResult<Penalty> {
        if let Some(amount) = input.override_amount {
            validate_positive(amount, "override_amount")?;
        }
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, input.loan_id)?;
        loan.require_type(LoanType::Daily)?;
        if matches!(
            loan.status,
            LoanStatus::Closed | LoanStatus::Cancelled | LoanStatus::WrittenOff
        ) {
            return Err(LedgerError::LoanNotActive {
                loan_id: loan.id,
                status: loan.status,
            });
        }

        let terms = loan.repayment_terms()?;
        let grace = loan.grace_days.unwrap_or(DEFAULT_GRACE_DAYS);
        let threshold = schedule::overdue_threshold(terms.term_end, grace);
        if as_of <= threshold || loan.collected() >= terms.total_repayment {
            return Err(LedgerError::LoanNotOverdue(loan.id));
        }
        let days_overdue = schedule::days_overdue(threshold, as_of);

        let months_owed = penalty::months_owed(days_overdue);
        let months_charged: i64 = tx.query_row(
            "SELECT COALESCE(SUM(months_charged), 0) FROM penalties WHERE loan_id = ?1",
            params![loan.id],
            |row| row.get(0),
        )?;
        let incremental = penalty::incremental_months(months_owed, months_charged);
        if incremental <= 0 {
            return Err(LedgerError::NoNewPenaltyDue {
                months_owed,
                months_charged,
            });
        }

        let (amount, overridden) = match input.override_amount {
            Some(a) => (a, true),
            None => (
                penalty::penalty_amount(loan.principal_amount, loan.interest_rate, incremental),
                false,
            ),
        };

        tx.execute(
            "INSERT INTO penalties (tenant_id, loan_id, days_overdue, months_charged, amount,
                                    waived_amount, amount_collected, status, was_overridden,
                                    imposed_date, imposed_by)
             VALUES (?1, ?2, ?3, ?4, ?5, '0', '0', 'PENDING', ?6, ?7, ?8)",
            params![
                tenant,
                loan.id,
                days_overdue,
                incremental,
                amount.to_string(),
                overridden,
                as_of.to_string(),
                actor.id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        info!(loan_id = loan.id, penalty_id = id, months = incremental, "imposed penalty");
        fetch_penalty(&self.conn, tenant, id)
    }

    /// Waive part or all of a penalty's remaining amount and write the
    /// PENALTY_WAIVER audit entry.
    ///
    /// Runs under an immediate (write-locking) transaction: the waivable
    /// balance is read, compared, and written as one unit, so concurrent
    /// waives cannot silently over-waive.
    pub fn waive_penalty(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        penalty_id: PenaltyId,
        amount: Money,
        on: NaiveDate,
    ) -> LedgerResult<Penalty> {
        validate_positive(amount, "waive_amount")?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let p = fetch_penalty(&tx, tenant, penalty_id)?;
        if matches!(p.status, PenaltyStatus::Paid | PenaltyStatus::Waived) {
            return Err(LedgerError::InvalidInput {
                field: "penalty_id".into(),
                reason: format!("penalty {} is already {}", penalty_id, p.status),
            });
        }
        let waivable = p.amount - p.waived_amount;
        if amount > waivable {
            return Err(LedgerError::WaiveExceedsBalance {
                requested: amount,
                waivable,
            });
        }

        let waived = p.waived_amount + amount;
        let status = penalty::recompute_status(p.amount, waived, p.amount_collected);
        tx.execute(
            "UPDATE penalties SET waived_amount = ?1, status = ?2 WHERE id = ?3",
            params![waived.to_string(), status.as_str(), penalty_id],
        )?;
        tx.execute(
            "INSERT INTO transactions (tenant_id, loan_id, penalty_id, txn_type, amount,
                                       transaction_date, approval_status, collected_by,
                                       approved_by, approved_at)
             VALUES (?1, ?2, ?3, 'PENALTY_WAIVER', ?4, ?5, 'APPROVED', ?6, ?6, ?5)",
            params![
                tenant,
                p.loan_id,
                penalty_id,
                amount.to_string(),
                on.to_string(),
                actor.id,
            ],
        )?;
        tx.commit()?;
        info!(penalty_id, %amount, "waived penalty");
        fetch_penalty(&self.conn, tenant, penalty_id)
    }

    /// Forgive interest for a monthly cycle; settles cycles exactly like an
    /// interest payment would, through the ledger alone.
    pub fn waive_interest(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        loan_id: LoanId,
        amount: Money,
        effective_date: NaiveDate,
        on: NaiveDate,
    ) -> LedgerResult<Transaction> {
        validate_positive(amount, "waive_amount")?;
        let tx = self.conn.transaction()?;
        let loan = fetch_loan(&tx, tenant, loan_id)?;
        loan.require_type(LoanType::Monthly)?;
        if loan.status.is_terminal_for_transactions() || loan.status == LoanStatus::WrittenOff {
            return Err(LedgerError::LoanNotActive {
                loan_id: loan.id,
                status: loan.status,
            });
        }
        tx.execute(
            "INSERT INTO transactions (tenant_id, loan_id, txn_type, amount, transaction_date,
                                       effective_date, approval_status, collected_by,
                                       approved_by, approved_at)
             VALUES (?1, ?2, 'INTEREST_WAIVER', ?3, ?4, ?5, 'APPROVED', ?6, ?6, ?4)",
            params![
                tenant,
                loan_id,
                amount.to_string(),
                on.to_string(),
                effective_date.to_string(),
                actor.id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        info!(loan_id, txn_id = id, %amount, "waived interest");
        fetch_transaction(&self.conn, tenant, id)
    }

    pub fn list_penalties(
        &self,
        tenant: TenantId,
        loan_id: Option<LoanId>,
    ) -> LedgerResult<Vec<Penalty>> {
        let mut sql = String::from("SELECT * FROM penalties WHERE tenant_id = ?1");
        let mut values: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Integer(tenant)];
        if let Some(id) = loan_id {
            values.push(rusqlite::types::Value::Integer(id));
            sql.push_str(" AND loan_id = ?2");
        }
        sql.push_str(" ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows =
            stmt.query_map(rusqlite::params_from_iter(values), |row| Penalty::from_row(row))?;
        let mut penalties = Vec::new();
        for p in rows {
            penalties.push(p?);
        }
        Ok(penalties)
    }

    /// Waiver audit trail: every PENALTY_WAIVER and INTEREST_WAIVER entry.
    pub fn list_waivers(
        &self,
        tenant: TenantId,
        loan_id: Option<LoanId>,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut sql = String::from(
            "SELECT * FROM transactions
             WHERE tenant_id = ?1 AND txn_type IN ('PENALTY_WAIVER', 'INTEREST_WAIVER')",
        );
        let mut values: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Integer(tenant)];
        if let Some(id) = loan_id {
            values.push(rusqlite::types::Value::Integer(id));
            sql.push_str(" AND loan_id = ?2");
        }
        sql.push_str(" ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
            Transaction::from_row(row)
        })?;
        let mut waivers = Vec::new();
        for w in rows {
            waivers.push(w?);
        }
        Ok(waivers)
    }
}
