//! Transaction recording, the approval workflow, and corrective entries.
//!
//! Ledger rows are immutable once created. A mistake is undone by a new row
//! of the same type with the negated amount and a back-reference to the row
//! it corrects; aggregates are re-adjusted in reverse at that point.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing;
use crate::dates::month_start;
use crate::error::LedgerError;
use crate::penalty;
use crate::types::*;
use crate::LedgerResult;

use super::loans::{fetch_return_journal, validate_positive};
use super::{fetch_loan, guard_version, Ledger, Loan, Penalty, Transaction};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub loan_id: LoanId,
    pub txn_type: TransactionType,
    pub amount: Money,
    pub transaction_date: NaiveDate,
    /// Which monthly cycle an INTEREST_PAYMENT counts against; independent
    /// of the date the money was physically collected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    /// Target penalty for PENALTY collections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_id: Option<PenaltyId>,
    /// When set, this entry reverses the referenced transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrects: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub loan_id: Option<LoanId>,
    pub txn_type: Option<TransactionType>,
    pub approval_status: Option<ApprovalStatus>,
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

impl Ledger {
    /// Record a money movement against a loan.
    ///
    /// Privileged actors get an immediately APPROVED entry with side effects
    /// applied; others get a PENDING entry with no effects until approval.
    /// An overpaying INTEREST_PAYMENT splits into an interest part of exactly
    /// the cycle's due and a PRINCIPAL_RETURN of the rest, so up to two rows
    /// come back.
    pub fn record_transaction(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &RecordTransaction,
    ) -> LedgerResult<Vec<Transaction>> {
        if let Some(target) = input.corrects {
            return self.record_correction(tenant, actor, input, target);
        }
        validate_positive(input.amount, "amount")?;
        if input.txn_type.is_origination() {
            return Err(LedgerError::TypeNotRecordable {
                txn_type: input.txn_type,
            });
        }
        if input.txn_type.is_waiver() {
            return Err(LedgerError::TypeNotRecordable {
                txn_type: input.txn_type,
            });
        }

        let tx = self.conn.transaction()?;
        let mut loan = fetch_loan(&tx, tenant, input.loan_id)?;
        gate_transaction(&loan, input.txn_type)?;

        let ids = match input.txn_type {
            TransactionType::DailyCollection => {
                loan.require_type(LoanType::Daily)?;
                vec![insert_entry(&tx, tenant, actor, &loan, input.txn_type, input.amount, input, None)?]
            }
            TransactionType::GuarantorPayment => {
                vec![insert_entry(&tx, tenant, actor, &loan, input.txn_type, input.amount, input, None)?]
            }
            TransactionType::PrincipalReturn => {
                loan.require_type(LoanType::Monthly)?;
                if input.amount > loan.remaining() {
                    return Err(LedgerError::InvalidAmount {
                        reason: format!(
                            "principal return {} exceeds remaining principal {}",
                            input.amount,
                            loan.remaining()
                        ),
                    });
                }
                vec![insert_entry(&tx, tenant, actor, &loan, input.txn_type, input.amount, input, None)?]
            }
            TransactionType::InterestPayment => {
                loan.require_type(LoanType::Monthly)?;
                let effective = input.effective_date.ok_or(LedgerError::MissingEffectiveDate)?;
                record_interest_payment(&tx, tenant, actor, &mut loan, input, effective)?
            }
            TransactionType::Penalty => {
                loan.require_type(LoanType::Daily)?;
                let penalty_id = input.penalty_id.ok_or_else(|| LedgerError::InvalidInput {
                    field: "penalty_id".into(),
                    reason: "required for PENALTY collections".into(),
                })?;
                let penalty = fetch_penalty(&tx, tenant, penalty_id)?;
                if penalty.loan_id != loan.id {
                    return Err(LedgerError::InvalidInput {
                        field: "penalty_id".into(),
                        reason: format!("penalty {} belongs to another loan", penalty_id),
                    });
                }
                if !penalty.is_outstanding() {
                    return Err(LedgerError::InvalidInput {
                        field: "penalty_id".into(),
                        reason: format!("penalty {} is {}", penalty_id, penalty.status),
                    });
                }
                let open = penalty.net_payable() - penalty.amount_collected;
                if input.amount > open {
                    return Err(LedgerError::InvalidAmount {
                        reason: format!("payment {} exceeds open penalty balance {}", input.amount, open),
                    });
                }
                vec![insert_entry(&tx, tenant, actor, &loan, input.txn_type, input.amount, input, None)?]
            }
            other => {
                return Err(LedgerError::TypeNotRecordable { txn_type: other });
            }
        };

        if actor.privileged {
            for id in &ids {
                let txn = fetch_transaction(&tx, tenant, *id)?;
                apply_effects(&tx, &mut loan, &txn)?;
            }
        }

        tx.commit()?;
        info!(loan_id = input.loan_id, ?ids, txn_type = %input.txn_type, "recorded transaction");
        ids.into_iter()
            .map(|id| fetch_transaction(&self.conn, tenant, id))
            .collect()
    }

    fn record_correction(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        input: &RecordTransaction,
        target_id: TransactionId,
    ) -> LedgerResult<Vec<Transaction>> {
        let tx = self.conn.transaction()?;
        let target = fetch_transaction(&tx, tenant, target_id)?;

        if target.approval_status != ApprovalStatus::Approved {
            return Err(LedgerError::CorrectionMismatch {
                reason: format!("target {} is {}", target_id, target.approval_status),
            });
        }
        if input.txn_type != target.txn_type {
            return Err(LedgerError::CorrectionMismatch {
                reason: format!(
                    "type {} does not match target type {}",
                    input.txn_type, target.txn_type
                ),
            });
        }
        if input.loan_id != target.loan_id {
            return Err(LedgerError::CorrectionMismatch {
                reason: "loan does not match target loan".into(),
            });
        }
        if matches!(
            target.txn_type,
            TransactionType::Disbursement | TransactionType::OpeningBalance
        ) {
            return Err(LedgerError::CorrectionMismatch {
                reason: format!("{} entries cannot be corrected", target.txn_type),
            });
        }
        if input.amount != -target.amount {
            return Err(LedgerError::CorrectionMismatch {
                reason: format!(
                    "correction amount must be {}, got {}",
                    -target.amount,
                    input.amount
                ),
            });
        }
        let already: i64 = tx.query_row(
            "SELECT COUNT(*) FROM transactions WHERE corrected_transaction_id = ?1",
            params![target_id],
            |row| row.get(0),
        )?;
        if already > 0 {
            return Err(LedgerError::AlreadyCorrected(target_id));
        }

        let mut loan = fetch_loan(&tx, tenant, target.loan_id)?;
        gate_transaction(&loan, target.txn_type)?;

        // Corrections are approved on the spot regardless of actor privilege
        // and re-apply the target's side effects in reverse.
        tx.execute(
            "INSERT INTO transactions (tenant_id, loan_id, penalty_id, txn_type, amount,
                                       transaction_date, effective_date, approval_status,
                                       corrected_transaction_id, collected_by,
                                       approved_by, approved_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'APPROVED', ?8, ?9, ?9, ?6, ?10)",
            params![
                tenant,
                target.loan_id,
                target.penalty_id,
                target.txn_type.as_str(),
                input.amount.to_string(),
                input.transaction_date.to_string(),
                target.effective_date.map(|d| d.to_string()),
                target_id,
                actor.id,
                input.notes,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let correction = fetch_transaction(&tx, tenant, id)?;
        apply_effects(&tx, &mut loan, &correction)?;

        tx.commit()?;
        info!(target_id, correction_id = id, "recorded corrective entry");
        Ok(vec![fetch_transaction(&self.conn, tenant, id)?])
    }
}

/// Interest payment with lazy billing-principal cache sync and overpayment
/// split. Returns the inserted row ids.
fn record_interest_payment(
    conn: &Connection,
    tenant: TenantId,
    actor: &Actor,
    loan: &mut Loan,
    input: &RecordTransaction,
    effective: NaiveDate,
) -> LedgerResult<Vec<TransactionId>> {
    let terms = loan.monthly_terms()?;
    let returns = fetch_return_journal(conn, loan.id)?;
    let cycle_start = month_start(effective.year(), effective.month());
    let cycle_principal =
        billing::billing_principal_for(cycle_start, terms.base_principal, &returns);

    // The cached billing principal is corrected first, as its own
    // version-guarded update, whenever it has drifted from the journal.
    if loan.billing_principal != Some(cycle_principal) {
        let affected = conn.execute(
            "UPDATE loans SET billing_principal = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3",
            params![cycle_principal.to_string(), loan.id, loan.version],
        )?;
        guard_version(affected, loan.id)?;
        loan.version += 1;
        loan.billing_principal = Some(cycle_principal);
    }

    let interest_due = billing::interest_due_for(cycle_principal, terms.interest_rate);

    if input.amount <= interest_due {
        let id = insert_entry(
            conn,
            tenant,
            actor,
            loan,
            TransactionType::InterestPayment,
            input.amount,
            input,
            Some(effective),
        )?;
        return Ok(vec![id]);
    }

    // Overpayment: exactly the due as interest, the rest returns principal.
    // Exact decimal arithmetic: the two parts always sum to the original.
    let principal_part = input.amount - interest_due;
    if principal_part > loan.remaining() {
        return Err(LedgerError::OverpaymentExceedsPrincipal {
            portion: principal_part,
            remaining: loan.remaining(),
        });
    }
    let interest_id = insert_entry(
        conn,
        tenant,
        actor,
        loan,
        TransactionType::InterestPayment,
        interest_due,
        input,
        Some(effective),
    )?;
    let principal_id = insert_entry(
        conn,
        tenant,
        actor,
        loan,
        TransactionType::PrincipalReturn,
        principal_part,
        input,
        None,
    )?;
    Ok(vec![interest_id, principal_id])
}

// ---------------------------------------------------------------------------
// Approval workflow
// ---------------------------------------------------------------------------

impl Ledger {
    /// Approve a PENDING transaction, applying the side effects recording
    /// would have applied for a privileged actor.
    pub fn approve_transaction(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        txn_id: TransactionId,
        on: NaiveDate,
    ) -> LedgerResult<Transaction> {
        let tx = self.conn.transaction()?;
        let txn = fetch_transaction(&tx, tenant, txn_id)?;
        if txn.approval_status != ApprovalStatus::Pending {
            return Err(LedgerError::AlreadyDecided(txn_id));
        }
        let mut loan = fetch_loan(&tx, tenant, txn.loan_id)?;
        gate_transaction(&loan, txn.txn_type)?;

        let affected = tx.execute(
            "UPDATE transactions
             SET approval_status = 'APPROVED', approved_by = ?1, approved_at = ?2
             WHERE id = ?3 AND approval_status = 'PENDING'",
            params![actor.id, on.to_string(), txn_id],
        )?;
        if affected != 1 {
            return Err(LedgerError::AlreadyDecided(txn_id));
        }
        let approved = fetch_transaction(&tx, tenant, txn_id)?;
        apply_effects(&tx, &mut loan, &approved)?;

        tx.commit()?;
        info!(txn_id, "approved transaction");
        fetch_transaction(&self.conn, tenant, txn_id)
    }

    /// Reject a PENDING transaction. Terminal; requires a reason.
    pub fn reject_transaction(
        &mut self,
        tenant: TenantId,
        actor: &Actor,
        txn_id: TransactionId,
        reason: &str,
        on: NaiveDate,
    ) -> LedgerResult<Transaction> {
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidInput {
                field: "reason".into(),
                reason: "rejection requires a reason".into(),
            });
        }
        let tx = self.conn.transaction()?;
        let txn = fetch_transaction(&tx, tenant, txn_id)?;
        if txn.approval_status != ApprovalStatus::Pending {
            return Err(LedgerError::AlreadyDecided(txn_id));
        }
        let affected = tx.execute(
            "UPDATE transactions
             SET approval_status = 'REJECTED', rejected_by = ?1, rejected_at = ?2,
                 rejection_reason = ?3
             WHERE id = ?4 AND approval_status = 'PENDING'",
            params![actor.id, on.to_string(), reason, txn_id],
        )?;
        if affected != 1 {
            return Err(LedgerError::AlreadyDecided(txn_id));
        }
        tx.commit()?;
        info!(txn_id, "rejected transaction");
        fetch_transaction(&self.conn, tenant, txn_id)
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

impl Ledger {
    pub fn get_transaction(
        &self,
        tenant: TenantId,
        txn_id: TransactionId,
    ) -> LedgerResult<Transaction> {
        fetch_transaction(&self.conn, tenant, txn_id)
    }

    pub fn loan_transactions(
        &self,
        tenant: TenantId,
        loan_id: LoanId,
    ) -> LedgerResult<Vec<Transaction>> {
        fetch_loan(&self.conn, tenant, loan_id)?;
        self.list_transactions(
            tenant,
            &TransactionFilter {
                loan_id: Some(loan_id),
                ..Default::default()
            },
        )
    }

    pub fn list_pending_transactions(&self, tenant: TenantId) -> LedgerResult<Vec<Transaction>> {
        self.list_transactions(
            tenant,
            &TransactionFilter {
                approval_status: Some(ApprovalStatus::Pending),
                ..Default::default()
            },
        )
    }

    pub fn list_transactions(
        &self,
        tenant: TenantId,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut sql = String::from("SELECT * FROM transactions WHERE tenant_id = ?1");
        let mut values: Vec<Value> = vec![Value::Integer(tenant)];
        if let Some(loan_id) = filter.loan_id {
            values.push(Value::Integer(loan_id));
            sql.push_str(&format!(" AND loan_id = ?{}", values.len()));
        }
        if let Some(txn_type) = filter.txn_type {
            values.push(Value::Text(txn_type.as_str().into()));
            sql.push_str(&format!(" AND txn_type = ?{}", values.len()));
        }
        if let Some(status) = filter.approval_status {
            values.push(Value::Text(status.as_str().into()));
            sql.push_str(&format!(" AND approval_status = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
            Transaction::from_row(row)
        })?;
        let mut txns = Vec::new();
        for txn in rows {
            txns.push(txn?);
        }
        Ok(txns)
    }
}

// ---------------------------------------------------------------------------
// Gating, insertion, side effects
// ---------------------------------------------------------------------------

/// Which transaction types a loan in a given status accepts. DEFAULTED
/// loans keep accepting entries (recoveries); WRITTEN_OFF only guarantor
/// recoveries; CLOSED and CANCELLED nothing.
fn gate_transaction(loan: &Loan, txn_type: TransactionType) -> LedgerResult<()> {
    match loan.status {
        LoanStatus::Closed | LoanStatus::Cancelled => Err(LedgerError::LoanNotActive {
            loan_id: loan.id,
            status: loan.status,
        }),
        LoanStatus::WrittenOff if txn_type != TransactionType::GuarantorPayment => {
            Err(LedgerError::LoanNotActive {
                loan_id: loan.id,
                status: loan.status,
            })
        }
        LoanStatus::Active if txn_type == TransactionType::GuarantorPayment => {
            Err(LedgerError::InvalidInput {
                field: "txn_type".into(),
                reason: "guarantor payments apply only to defaulted loans".into(),
            })
        }
        _ => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_entry(
    conn: &Connection,
    tenant: TenantId,
    actor: &Actor,
    loan: &Loan,
    txn_type: TransactionType,
    amount: Money,
    input: &RecordTransaction,
    effective: Option<NaiveDate>,
) -> LedgerResult<TransactionId> {
    let (status, approved_by, approved_at) = if actor.privileged {
        ("APPROVED", Some(actor.id), Some(input.transaction_date.to_string()))
    } else {
        ("PENDING", None, None)
    };
    conn.execute(
        "INSERT INTO transactions (tenant_id, loan_id, penalty_id, txn_type, amount,
                                   transaction_date, effective_date, approval_status,
                                   collected_by, approved_by, approved_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            tenant,
            loan.id,
            input.penalty_id,
            txn_type.as_str(),
            amount.to_string(),
            input.transaction_date.to_string(),
            effective.map(|d| d.to_string()),
            status,
            actor.id,
            approved_by,
            approved_at,
            input.notes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn fetch_transaction(
    conn: &Connection,
    tenant: TenantId,
    txn_id: TransactionId,
) -> LedgerResult<Transaction> {
    conn.query_row(
        "SELECT * FROM transactions WHERE id = ?1 AND tenant_id = ?2",
        params![txn_id, tenant],
        |row| Transaction::from_row(row),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::TransactionNotFound(txn_id),
        other => other.into(),
    })
}

pub(crate) fn fetch_penalty(
    conn: &Connection,
    tenant: TenantId,
    penalty_id: PenaltyId,
) -> LedgerResult<Penalty> {
    conn.query_row(
        "SELECT * FROM penalties WHERE id = ?1 AND tenant_id = ?2",
        params![penalty_id, tenant],
        |row| Penalty::from_row(row),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::PenaltyNotFound(penalty_id),
        other => other.into(),
    })
}

/// Apply an APPROVED entry's numeric effects. Amounts are signed, so a
/// correction (negative amount) runs the same paths in reverse.
pub(crate) fn apply_effects(
    conn: &Connection,
    loan: &mut Loan,
    txn: &Transaction,
) -> LedgerResult<()> {
    match txn.txn_type {
        TransactionType::DailyCollection => {
            update_total_collected(conn, loan, loan.collected() + txn.amount)
        }
        TransactionType::GuarantorPayment => {
            if loan.loan_type == LoanType::Daily {
                update_total_collected(conn, loan, loan.collected() + txn.amount)
            } else {
                Ok(())
            }
        }
        TransactionType::PrincipalReturn => {
            let new_remaining = loan.remaining() - txn.amount;
            if new_remaining < Decimal::ZERO {
                return Err(LedgerError::InvalidAmount {
                    reason: format!(
                        "principal return {} exceeds remaining principal {}",
                        txn.amount,
                        loan.remaining()
                    ),
                });
            }
            update_remaining_principal(conn, loan, new_remaining)?;
            conn.execute(
                "INSERT INTO principal_returns (tenant_id, loan_id, transaction_id, amount,
                                                remaining_principal_after, return_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    txn.tenant_id,
                    loan.id,
                    txn.id,
                    txn.amount.to_string(),
                    new_remaining.to_string(),
                    txn.transaction_date.to_string(),
                ],
            )?;
            Ok(())
        }
        TransactionType::Penalty => {
            let penalty_id = txn.penalty_id.ok_or_else(|| LedgerError::CorruptValue {
                column: "penalty_id".into(),
                value: "NULL on a PENALTY entry".into(),
            })?;
            adjust_penalty(conn, txn.tenant_id, penalty_id, txn.amount, Decimal::ZERO)
        }
        TransactionType::PenaltyWaiver => {
            // Only reachable for corrections; the waive operation itself
            // adjusts the penalty before writing its audit entry.
            if txn.corrected_transaction_id.is_some() {
                let penalty_id = txn.penalty_id.ok_or_else(|| LedgerError::CorruptValue {
                    column: "penalty_id".into(),
                    value: "NULL on a PENALTY_WAIVER entry".into(),
                })?;
                adjust_penalty(conn, txn.tenant_id, penalty_id, Decimal::ZERO, txn.amount)
            } else {
                Ok(())
            }
        }
        // Interest payments and waivers settle cycles purely through the
        // ledger; advance interest is cash-in with no aggregate to touch.
        TransactionType::InterestPayment
        | TransactionType::InterestWaiver
        | TransactionType::AdvanceInterest => Ok(()),
        TransactionType::Disbursement | TransactionType::OpeningBalance => Ok(()),
    }
}

fn update_total_collected(conn: &Connection, loan: &mut Loan, new_total: Money) -> LedgerResult<()> {
    if new_total < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            reason: format!("total collected would become negative ({new_total})"),
        });
    }
    let affected = conn.execute(
        "UPDATE loans SET total_collected = ?1, version = version + 1
         WHERE id = ?2 AND version = ?3",
        params![new_total.to_string(), loan.id, loan.version],
    )?;
    guard_version(affected, loan.id)?;
    loan.version += 1;
    loan.total_collected = Some(new_total);
    Ok(())
}

fn update_remaining_principal(
    conn: &Connection,
    loan: &mut Loan,
    new_remaining: Money,
) -> LedgerResult<()> {
    let affected = conn.execute(
        "UPDATE loans SET remaining_principal = ?1, version = version + 1
         WHERE id = ?2 AND version = ?3",
        params![new_remaining.to_string(), loan.id, loan.version],
    )?;
    guard_version(affected, loan.id)?;
    loan.version += 1;
    loan.remaining_principal = Some(new_remaining);
    Ok(())
}

/// Re-read the penalty inside the enclosing write transaction, shift its
/// collected/waived figures, and recompute its status.
fn adjust_penalty(
    conn: &Connection,
    tenant: TenantId,
    penalty_id: PenaltyId,
    collected_delta: Money,
    waived_delta: Money,
) -> LedgerResult<()> {
    let p = fetch_penalty(conn, tenant, penalty_id)?;
    let collected = p.amount_collected + collected_delta;
    let waived = p.waived_amount + waived_delta;
    if collected < Decimal::ZERO || waived < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            reason: format!("penalty {penalty_id} adjustment would go negative"),
        });
    }
    if collected_delta > Decimal::ZERO && collected > p.amount - waived {
        return Err(LedgerError::InvalidAmount {
            reason: format!("payment would overfill penalty {penalty_id}"),
        });
    }
    let status = penalty::recompute_status(p.amount, waived, collected);
    conn.execute(
        "UPDATE penalties SET amount_collected = ?1, waived_amount = ?2, status = ?3
         WHERE id = ?4",
        params![
            collected.to_string(),
            waived.to_string(),
            status.as_str(),
            penalty_id,
        ],
    )?;
    Ok(())
}
