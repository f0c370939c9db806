use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::json;

use lend_ledger_core::FundEntryType;

use super::{to_value, CmdResult};
use crate::Ctx;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FundEntryKind {
    Injection,
    Withdrawal,
}

#[derive(Args)]
pub struct FundEntryArgs {
    #[arg(value_enum)]
    pub entry_type: FundEntryKind,
    pub amount: Decimal,

    /// Entry date (defaults to --as-of)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args)]
pub struct ExpenseArgs {
    pub amount: Decimal,

    /// Expense date (defaults to --as-of)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args)]
pub struct PnlArgs {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Args)]
pub struct DashboardArgs {}

pub fn run_fund_entry(ctx: &Ctx, args: FundEntryArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    let entry_type = match args.entry_type {
        FundEntryKind::Injection => FundEntryType::Injection,
        FundEntryKind::Withdrawal => FundEntryType::Withdrawal,
    };
    to_value(&ledger.record_fund_entry(
        ctx.tenant,
        entry_type,
        args.amount,
        args.date.unwrap_or(ctx.as_of),
        args.notes.as_deref(),
    )?)
}

pub fn run_expense(ctx: &Ctx, args: ExpenseArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.record_expense(
        ctx.tenant,
        args.amount,
        args.date.unwrap_or(ctx.as_of),
        args.category.as_deref(),
        args.notes.as_deref(),
    )?)
}

pub fn run_fund_summary(ctx: &Ctx) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.fund_summary(ctx.tenant)?)
}

/// Derive cash in hand both ways and report whether they agree. A mismatch
/// means a reconciliation bug, not a data problem.
pub fn run_recon_check(ctx: &Ctx) -> CmdResult {
    let ledger = ctx.open()?;
    let top_down = ledger.cash_in_hand(ctx.tenant)?;
    let bottom_up = ledger.cash_in_hand_bottom_up(ctx.tenant)?;
    Ok(json!({
        "top_down": top_down.to_string(),
        "bottom_up": bottom_up.to_string(),
        "matches": top_down == bottom_up,
    }))
}

pub fn run_pnl(ctx: &Ctx, args: PnlArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.profit_loss(ctx.tenant, args.from, args.to)?)
}

pub fn run_dashboard(ctx: &Ctx, _args: DashboardArgs) -> CmdResult {
    let ledger = ctx.open()?;
    Ok(json!({
        "today": ledger.today_summary(ctx.tenant, ctx.as_of)?,
        "overdue_loans": ledger.overdue_loans(ctx.tenant, ctx.as_of)?,
        "defaulters": ledger.defaulters(ctx.tenant)?,
    }))
}
