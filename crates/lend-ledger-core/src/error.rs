use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{LoanStatus, LoanType, TransactionType};

/// Coarse classification used by callers to map errors onto transport
/// semantics (404 / 400 / 409) and to tell retryable conflicts apart
/// from business-rule conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    /// Business-rule conflict. Retrying the same request will fail again.
    Conflict,
    /// Lost optimistic-lock race. The caller may re-read and retry.
    Retryable,
    Internal,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Loan {0} not found")]
    LoanNotFound(i64),

    #[error("Transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("Penalty {0} not found")]
    PenaltyNotFound(i64),

    #[error("Customer {0} not found")]
    CustomerNotFound(i64),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: LoanStatus, to: LoanStatus },

    #[error("Operation requires a {expected} loan but {loan_id} is {actual}")]
    WrongLoanType {
        loan_id: i64,
        expected: LoanType,
        actual: LoanType,
    },

    #[error("Loan {loan_id} is {status} and does not accept this transaction")]
    LoanNotActive { loan_id: i64, status: LoanStatus },

    #[error("{txn_type} may not be recorded directly")]
    TypeNotRecordable { txn_type: TransactionType },

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("INTEREST_PAYMENT requires an effective date")]
    MissingEffectiveDate,

    #[error("Overpayment principal portion {portion} exceeds remaining principal {remaining}")]
    OverpaymentExceedsPrincipal { portion: Decimal, remaining: Decimal },

    #[error("Guarantor must be a different customer than the borrower")]
    GuarantorSameAsBorrower,

    #[error("Loan {0} has recorded activity and cannot be cancelled")]
    LoanHasActivity(i64),

    #[error("No new penalty due: {months_owed} month(s) owed, {months_charged} already charged")]
    NoNewPenaltyDue { months_owed: i64, months_charged: i64 },

    #[error("Loan {0} is not overdue")]
    LoanNotOverdue(i64),

    #[error("Waive amount {requested} exceeds waivable balance {waivable}")]
    WaiveExceedsBalance { requested: Decimal, waivable: Decimal },

    #[error("Transaction {0} was already approved or rejected")]
    AlreadyDecided(i64),

    #[error("Transaction {0} has already been corrected")]
    AlreadyCorrected(i64),

    #[error("Correction does not match its target: {reason}")]
    CorrectionMismatch { reason: String },

    #[error("Loan {0} was modified concurrently")]
    ConcurrentModification(i64),

    #[error("Duplicate value for {0}")]
    Duplicate(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Corrupt stored value in {column}: {value}")]
    CorruptValue { column: String, value: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            LoanNotFound(_) | TransactionNotFound(_) | PenaltyNotFound(_)
            | CustomerNotFound(_) => ErrorKind::NotFound,
            InvalidTransition { .. }
            | WrongLoanType { .. }
            | LoanNotActive { .. }
            | TypeNotRecordable { .. }
            | InvalidAmount { .. }
            | InvalidInput { .. }
            | MissingEffectiveDate
            | OverpaymentExceedsPrincipal { .. }
            | GuarantorSameAsBorrower
            | LoanHasActivity(_)
            | NoNewPenaltyDue { .. }
            | LoanNotOverdue(_)
            | WaiveExceedsBalance { .. } => ErrorKind::BadRequest,
            AlreadyDecided(_) | AlreadyCorrected(_) | CorrectionMismatch { .. }
            | Duplicate(_) => ErrorKind::Conflict,
            ConcurrentModification(_) => ErrorKind::Retryable,
            Storage(_) | CorruptValue { .. } => ErrorKind::Internal,
        }
    }
}
