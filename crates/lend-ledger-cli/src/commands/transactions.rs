use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use lend_ledger_core::store::transactions::{RecordTransaction, TransactionFilter};
use lend_ledger_core::{ApprovalStatus, TransactionType};

use super::{to_value, CmdResult};
use crate::{input, Ctx};

#[derive(Args)]
pub struct RecordArgs {
    /// Path to JSON payload (overrides individual flags; '-' reads stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Target loan id
    #[arg(long)]
    pub loan: Option<i64>,

    /// Transaction type (e.g. DAILY_COLLECTION, INTEREST_PAYMENT)
    #[arg(long)]
    pub txn_type: Option<String>,

    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Collection date (defaults to --as-of)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Cycle an interest payment counts against (required for INTEREST_PAYMENT)
    #[arg(long)]
    pub effective: Option<NaiveDate>,

    /// Target penalty id for PENALTY collections
    #[arg(long)]
    pub penalty: Option<i64>,

    /// Id of an approved transaction this entry reverses
    #[arg(long)]
    pub corrects: Option<i64>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args)]
pub struct ApproveArgs {
    pub txn_id: i64,
}

#[derive(Args)]
pub struct RejectArgs {
    pub txn_id: i64,

    /// Reason shown back to the collector
    #[arg(long)]
    pub reason: String,
}

#[derive(Args)]
pub struct TransactionsArgs {
    /// Filter by loan id
    #[arg(long)]
    pub loan: Option<i64>,

    /// Filter by transaction type
    #[arg(long)]
    pub txn_type: Option<String>,

    /// Filter by approval status (PENDING, APPROVED, REJECTED)
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Args)]
pub struct PendingArgs {}

pub fn run_record(ctx: &Ctx, args: RecordArgs) -> CmdResult {
    let payload: RecordTransaction = if let Some(ref path) = args.input {
        input::read_json(path)?
    } else {
        let type_str = args
            .txn_type
            .as_deref()
            .ok_or("--txn-type is required (or provide --input)")?;
        RecordTransaction {
            loan_id: args.loan.ok_or("--loan is required (or provide --input)")?,
            txn_type: TransactionType::parse(type_str)
                .ok_or_else(|| format!("unknown transaction type '{type_str}'"))?,
            amount: args.amount.ok_or("--amount is required (or provide --input)")?,
            transaction_date: args.date.unwrap_or(ctx.as_of),
            effective_date: args.effective,
            penalty_id: args.penalty,
            corrects: args.corrects,
            notes: args.notes.clone(),
        }
    };
    let mut ledger = ctx.open()?;
    to_value(&ledger.record_transaction(ctx.tenant, &ctx.actor, &payload)?)
}

pub fn run_approve(ctx: &Ctx, args: ApproveArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.approve_transaction(ctx.tenant, &ctx.actor, args.txn_id, ctx.as_of)?)
}

pub fn run_reject(ctx: &Ctx, args: RejectArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.reject_transaction(ctx.tenant, &ctx.actor, args.txn_id, &args.reason, ctx.as_of)?)
}

pub fn run_transactions(ctx: &Ctx, args: TransactionsArgs) -> CmdResult {
    let ledger = ctx.open()?;
    let txn_type = match args.txn_type.as_deref() {
        Some(s) => Some(
            TransactionType::parse(s).ok_or_else(|| format!("unknown transaction type '{s}'"))?,
        ),
        None => None,
    };
    let approval_status = match args.status.as_deref() {
        Some(s) => {
            Some(ApprovalStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?)
        }
        None => None,
    };
    let filter = TransactionFilter {
        loan_id: args.loan,
        txn_type,
        approval_status,
    };
    to_value(&ledger.list_transactions(ctx.tenant, &filter)?)
}

pub fn run_pending(ctx: &Ctx, _args: PendingArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.list_pending_transactions(ctx.tenant)?)
}
