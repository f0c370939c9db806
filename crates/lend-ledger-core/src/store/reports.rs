//! Reconciliation, fund summary, date-ranged P&L, and dashboard reads.
//!
//! All read-only queries here tolerate concurrent writers: they re-derive
//! from the ledger on every call and take no locks.
//!
//! Cash in hand is computed twice on purpose. `cash_in_hand` works top-down
//! from per-category queries; `cash_in_hand_bottom_up` restates the same
//! figure loan by loan through a separate code path. The two must always be
//! numerically equal; collapsing them into one implementation would destroy
//! the safety property, so don't.

use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::billing;
use crate::recon::{
    self, daily_interest_delta, daily_interest_earned, CashComponents, FundSummary, ProfitLoss,
};
use crate::schedule::{self, DEFAULT_GRACE_DAYS};
use crate::types::*;
use crate::LedgerResult;

use super::loans::monthly_cycles;
use super::{Expense, FundEntry, Ledger};

// ---------------------------------------------------------------------------
// Collaborator rows: fund entries and expenses
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn record_fund_entry(
        &mut self,
        tenant: TenantId,
        entry_type: FundEntryType,
        amount: Money,
        entry_date: NaiveDate,
        notes: Option<&str>,
    ) -> LedgerResult<FundEntry> {
        super::loans::validate_positive(amount, "amount")?;
        self.conn.execute(
            "INSERT INTO fund_entries (tenant_id, entry_type, amount, entry_date, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tenant,
                entry_type.as_str(),
                amount.to_string(),
                entry_date.to_string(),
                notes,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(id, %amount, entry = entry_type.as_str(), "recorded fund entry");
        Ok(FundEntry {
            id,
            tenant_id: tenant,
            entry_type,
            amount,
            entry_date,
            notes: notes.map(String::from),
        })
    }

    pub fn record_expense(
        &mut self,
        tenant: TenantId,
        amount: Money,
        expense_date: NaiveDate,
        category: Option<&str>,
        notes: Option<&str>,
    ) -> LedgerResult<Expense> {
        super::loans::validate_positive(amount, "amount")?;
        self.conn.execute(
            "INSERT INTO expenses (tenant_id, amount, expense_date, category, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tenant,
                amount.to_string(),
                expense_date.to_string(),
                category,
                notes,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Expense {
            id,
            tenant_id: tenant,
            amount,
            expense_date,
            category: category.map(String::from),
            notes: notes.map(String::from),
            is_deleted: false,
        })
    }

    /// Soft delete: the row stays for audit but drops out of every total.
    pub fn delete_expense(&mut self, tenant: TenantId, id: i64) -> LedgerResult<()> {
        let affected = self.conn.execute(
            "UPDATE expenses SET is_deleted = 1 WHERE id = ?1 AND tenant_id = ?2",
            params![id, tenant],
        )?;
        if affected == 0 {
            return Err(crate::LedgerError::InvalidInput {
                field: "expense_id".into(),
                reason: format!("expense {id} not found"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Amount folding (decimals never hit SQL SUM)
// ---------------------------------------------------------------------------

fn fold_amounts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> LedgerResult<Money> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut total = Decimal::ZERO;
    for raw in rows {
        let raw = raw?;
        total += Decimal::from_str(&raw).map_err(|_| crate::LedgerError::CorruptValue {
            column: "amount".into(),
            value: raw.clone(),
        })?;
    }
    Ok(total)
}

const MONEY_IN_TYPES: &str = "('ADVANCE_INTEREST', 'INTEREST_PAYMENT', 'PRINCIPAL_RETURN', \
     'DAILY_COLLECTION', 'PENALTY', 'GUARANTOR_PAYMENT')";

// ---------------------------------------------------------------------------
// Top-down cash in hand
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn cash_components(&self, tenant: TenantId) -> LedgerResult<CashComponents> {
        let injected = fold_amounts(
            &self.conn,
            "SELECT amount FROM fund_entries WHERE tenant_id = ?1 AND entry_type = 'INJECTION'",
            params![tenant],
        )?;
        let withdrawn = fold_amounts(
            &self.conn,
            "SELECT amount FROM fund_entries WHERE tenant_id = ?1 AND entry_type = 'WITHDRAWAL'",
            params![tenant],
        )?;
        let disbursed = fold_amounts(
            &self.conn,
            "SELECT t.amount FROM transactions t
             JOIN loans l ON l.id = t.loan_id
             WHERE t.tenant_id = ?1 AND t.txn_type = 'DISBURSEMENT'
               AND t.approval_status = 'APPROVED' AND l.status != 'CANCELLED'",
            params![tenant],
        )?;
        let money_in = fold_amounts(
            &self.conn,
            &format!(
                "SELECT amount FROM transactions
                 WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
                   AND txn_type IN {MONEY_IN_TYPES}"
            ),
            params![tenant],
        )?;
        let expenses = fold_amounts(
            &self.conn,
            "SELECT amount FROM expenses WHERE tenant_id = ?1 AND is_deleted = 0",
            params![tenant],
        )?;
        Ok(CashComponents {
            capital_invested: injected - withdrawn,
            total_disbursed: disbursed,
            total_money_in: money_in,
            total_expenses: expenses,
        })
    }

    pub fn cash_in_hand(&self, tenant: TenantId) -> LedgerResult<Money> {
        Ok(self.cash_components(tenant)?.cash_in_hand())
    }
}

// ---------------------------------------------------------------------------
// Bottom-up cash in hand (independent restatement)
// ---------------------------------------------------------------------------

impl Ledger {
    /// Walks every fund entry, loan, and expense row and rebuilds cash in
    /// hand from scratch. Shares no query with the top-down path.
    pub fn cash_in_hand_bottom_up(&self, tenant: TenantId) -> LedgerResult<Money> {
        let mut cash = Decimal::ZERO;

        let mut stmt = self
            .conn
            .prepare("SELECT entry_type, amount FROM fund_entries WHERE tenant_id = ?1")?;
        let entries = stmt.query_map(params![tenant], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for entry in entries {
            let (kind, raw) = entry?;
            let amount = Decimal::from_str(&raw).map_err(|_| crate::LedgerError::CorruptValue {
                column: "amount".into(),
                value: raw.clone(),
            })?;
            match FundEntryType::parse(&kind) {
                Some(FundEntryType::Injection) => cash += amount,
                Some(FundEntryType::Withdrawal) => cash -= amount,
                None => {
                    return Err(crate::LedgerError::CorruptValue {
                        column: "entry_type".into(),
                        value: kind,
                    })
                }
            }
        }
        drop(stmt);

        for loan in self.list_loans(tenant, &Default::default())? {
            let cancelled = loan.status == LoanStatus::Cancelled;
            for txn in self.loan_transactions(tenant, loan.id)? {
                if txn.approval_status != ApprovalStatus::Approved {
                    continue;
                }
                if txn.txn_type == TransactionType::Disbursement {
                    if !cancelled {
                        cash -= txn.amount;
                    }
                } else if txn.txn_type.is_money_in() {
                    cash += txn.amount;
                }
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM expenses WHERE tenant_id = ?1 AND is_deleted = 0")?;
        let rows = stmt.query_map(params![tenant], |row| row.get::<_, String>(0))?;
        for raw in rows {
            let raw = raw?;
            cash -= Decimal::from_str(&raw).map_err(|_| crate::LedgerError::CorruptValue {
                column: "amount".into(),
                value: raw.clone(),
            })?;
        }

        Ok(cash)
    }
}

// ---------------------------------------------------------------------------
// Fund summary
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn fund_summary(&self, tenant: TenantId) -> LedgerResult<FundSummary> {
        let components = self.cash_components(tenant)?;
        let loans = self.list_loans(tenant, &Default::default())?;

        let mut deployed = Decimal::ZERO;
        let mut lost = Decimal::ZERO;
        let mut daily_interest = Decimal::ZERO;
        for loan in &loans {
            match loan.status {
                LoanStatus::Active => deployed += loan.outstanding_principal(),
                LoanStatus::Defaulted | LoanStatus::WrittenOff => {
                    let recovered = fold_amounts(
                        &self.conn,
                        "SELECT amount FROM transactions
                         WHERE loan_id = ?1 AND txn_type = 'GUARANTOR_PAYMENT'
                           AND approval_status = 'APPROVED'",
                        params![loan.id],
                    )?;
                    lost += loan.outstanding_principal() - recovered;
                }
                _ => {}
            }
            if loan.loan_type == LoanType::Daily {
                daily_interest += daily_interest_earned(loan.principal_amount, loan.collected());
            }
        }

        let monthly_interest = fold_amounts(
            &self.conn,
            "SELECT amount FROM transactions
             WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
               AND txn_type IN ('INTEREST_PAYMENT', 'ADVANCE_INTEREST', 'PENALTY')",
            params![tenant],
        )?;
        let interest_earned = monthly_interest + daily_interest;

        let forgone = fold_amounts(
            &self.conn,
            "SELECT amount FROM transactions
             WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
               AND txn_type IN ('INTEREST_WAIVER', 'PENALTY_WAIVER')",
            params![tenant],
        )?;

        Ok(recon::rounded_summary(FundSummary {
            capital_invested: components.capital_invested,
            cash_in_hand: components.cash_in_hand(),
            money_deployed: deployed,
            total_interest_earned: interest_earned,
            money_lost_to_defaults: lost,
            total_expenses: components.total_expenses,
            revenue_forgone: forgone,
            net_profit: recon::net_profit(interest_earned, lost, components.total_expenses),
        }))
    }
}

// ---------------------------------------------------------------------------
// Date-ranged P&L
// ---------------------------------------------------------------------------

impl Ledger {
    /// P&L over [from, to]. Daily-loan interest uses the marginal technique:
    /// the delta of `max(collected − principal, 0)` across the boundary, so
    /// adjacent ranges never double-count.
    pub fn profit_loss(
        &self,
        tenant: TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<ProfitLoss> {
        if from > to {
            return Err(crate::LedgerError::InvalidInput {
                field: "from_date".into(),
                reason: "must not be after to_date".into(),
            });
        }

        let monthly_interest = fold_amounts(
            &self.conn,
            "SELECT amount FROM transactions
             WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
               AND txn_type IN ('INTEREST_PAYMENT', 'ADVANCE_INTEREST', 'PENALTY')
               AND transaction_date BETWEEN ?2 AND ?3",
            params![tenant, from.to_string(), to.to_string()],
        )?;

        let mut daily_interest = Decimal::ZERO;
        let mut lost = Decimal::ZERO;
        let boundary = from - Duration::days(1);
        for loan in self.list_loans(tenant, &Default::default())? {
            if loan.loan_type == LoanType::Daily {
                let through_start = self.collected_through(loan.id, boundary)?;
                let through_end = self.collected_through(loan.id, to)?;
                daily_interest +=
                    daily_interest_delta(loan.principal_amount, through_start, through_end);
            }
            let defaulted_in_range = loan
                .defaulted_at
                .map(|d| d >= from && d <= to)
                .unwrap_or(false);
            if defaulted_in_range {
                let recovered = fold_amounts(
                    &self.conn,
                    "SELECT amount FROM transactions
                     WHERE loan_id = ?1 AND txn_type = 'GUARANTOR_PAYMENT'
                       AND approval_status = 'APPROVED'",
                    params![loan.id],
                )?;
                lost += loan.outstanding_principal() - recovered;
            }
        }

        let expenses = fold_amounts(
            &self.conn,
            "SELECT amount FROM expenses
             WHERE tenant_id = ?1 AND is_deleted = 0
               AND expense_date BETWEEN ?2 AND ?3",
            params![tenant, from.to_string(), to.to_string()],
        )?;

        let interest_earned = round_currency(monthly_interest + daily_interest);
        let lost = round_currency(lost);
        let expenses = round_currency(expenses);
        Ok(ProfitLoss {
            from_date: from,
            to_date: to,
            interest_earned,
            money_lost_to_defaults: lost,
            total_expenses: expenses,
            net_profit: recon::net_profit(interest_earned, lost, expenses),
        })
    }

    /// Everything collected on a daily loan through the given date: opening
    /// balance, daily collections, and guarantor recoveries, corrections
    /// netted in.
    fn collected_through(&self, loan_id: LoanId, through: NaiveDate) -> LedgerResult<Money> {
        fold_amounts(
            &self.conn,
            "SELECT amount FROM transactions
             WHERE loan_id = ?1 AND approval_status = 'APPROVED'
               AND txn_type IN ('OPENING_BALANCE', 'DAILY_COLLECTION', 'GUARANTOR_PAYMENT')
               AND transaction_date <= ?2",
            params![loan_id, through.to_string()],
        )
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodaySummary {
    pub collections_today: Money,
    pub disbursed_today: Money,
    pub pending_approvals: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueLoanEntry {
    pub loan_id: LoanId,
    pub loan_number: String,
    pub loan_type: LoanType,
    pub borrower_id: CustomerId,
    pub borrower_name: String,
    pub days_overdue: i64,
    pub outstanding_principal: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaulterEntry {
    pub loan_id: LoanId,
    pub loan_number: String,
    pub status: LoanStatus,
    pub borrower_id: CustomerId,
    pub borrower_name: String,
    pub outstanding_principal: Money,
    pub recovered: Money,
}

impl Ledger {
    pub fn today_summary(&self, tenant: TenantId, today: NaiveDate) -> LedgerResult<TodaySummary> {
        let collections = fold_amounts(
            &self.conn,
            &format!(
                "SELECT amount FROM transactions
                 WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
                   AND txn_type IN {MONEY_IN_TYPES} AND transaction_date = ?2"
            ),
            params![tenant, today.to_string()],
        )?;
        let disbursed = fold_amounts(
            &self.conn,
            "SELECT amount FROM transactions
             WHERE tenant_id = ?1 AND approval_status = 'APPROVED'
               AND txn_type = 'DISBURSEMENT' AND transaction_date = ?2",
            params![tenant, today.to_string()],
        )?;
        let pending: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE tenant_id = ?1 AND approval_status = 'PENDING'",
            params![tenant],
            |row| row.get(0),
        )?;
        Ok(TodaySummary {
            collections_today: round_currency(collections),
            disbursed_today: round_currency(disbursed),
            pending_approvals: pending,
        })
    }

    /// Every ACTIVE loan currently overdue, with whole days overdue.
    pub fn overdue_loans(
        &self,
        tenant: TenantId,
        as_of: NaiveDate,
    ) -> LedgerResult<Vec<OverdueLoanEntry>> {
        let mut entries = Vec::new();
        let filter = super::loans::LoanFilter {
            status: Some(LoanStatus::Active),
            ..Default::default()
        };
        for loan in self.list_loans(tenant, &filter)? {
            let days = match loan.loan_type {
                LoanType::Monthly => {
                    let cycles = monthly_cycles(&self.conn, &loan, as_of)?;
                    let state = billing::due_state(&cycles, as_of);
                    if !state.is_overdue {
                        continue;
                    }
                    state
                        .next_due_date
                        .map(|due| crate::dates::days_between(due, as_of))
                        .unwrap_or(0)
                }
                LoanType::Daily => {
                    let terms = loan.repayment_terms()?;
                    let grace = loan.grace_days.unwrap_or(DEFAULT_GRACE_DAYS);
                    let threshold = schedule::overdue_threshold(terms.term_end, grace);
                    if !schedule::is_overdue(
                        loan.status,
                        threshold,
                        loan.collected(),
                        terms.total_repayment,
                        as_of,
                    ) {
                        continue;
                    }
                    schedule::days_overdue(threshold, as_of)
                }
            };
            let borrower = super::fetch_customer(&self.conn, tenant, loan.borrower_id)?;
            entries.push(OverdueLoanEntry {
                loan_id: loan.id,
                loan_number: loan.loan_number.clone(),
                loan_type: loan.loan_type,
                borrower_id: loan.borrower_id,
                borrower_name: borrower.name,
                days_overdue: days,
                outstanding_principal: loan.outstanding_principal(),
            });
        }
        Ok(entries)
    }

    /// Defaulted and written-off loans with what is still outstanding and
    /// what guarantors have recovered.
    pub fn defaulters(&self, tenant: TenantId) -> LedgerResult<Vec<DefaulterEntry>> {
        let mut entries = Vec::new();
        for loan in self.list_loans(tenant, &Default::default())? {
            if !matches!(loan.status, LoanStatus::Defaulted | LoanStatus::WrittenOff) {
                continue;
            }
            let recovered = fold_amounts(
                &self.conn,
                "SELECT amount FROM transactions
                 WHERE loan_id = ?1 AND txn_type = 'GUARANTOR_PAYMENT'
                   AND approval_status = 'APPROVED'",
                params![loan.id],
            )?;
            let borrower = super::fetch_customer(&self.conn, tenant, loan.borrower_id)?;
            entries.push(DefaulterEntry {
                loan_id: loan.id,
                loan_number: loan.loan_number.clone(),
                status: loan.status,
                borrower_id: loan.borrower_id,
                borrower_name: borrower.name,
                outstanding_principal: loan.outstanding_principal(),
                recovered,
            });
        }
        Ok(entries)
    }
}
