use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use lend_ledger_core::store::penalties::ImposePenalty;

use super::{to_value, CmdResult};
use crate::Ctx;

#[derive(Args)]
pub struct ImposePenaltyArgs {
    pub loan_id: i64,

    /// Override the computed amount (recorded as an override)
    #[arg(long)]
    pub override_amount: Option<Decimal>,
}

#[derive(Args)]
pub struct PenaltiesArgs {
    /// Restrict to one loan
    #[arg(long)]
    pub loan: Option<i64>,
}

#[derive(Args)]
pub struct WaivePenaltyArgs {
    pub penalty_id: i64,
    pub amount: Decimal,
}

#[derive(Args)]
pub struct WaiveInterestArgs {
    pub loan_id: i64,
    pub amount: Decimal,

    /// Cycle the waiver settles against
    #[arg(long)]
    pub effective: NaiveDate,
}

#[derive(Args)]
pub struct WaiversArgs {
    /// Restrict to one loan
    #[arg(long)]
    pub loan: Option<i64>,
}

pub fn run_impose(ctx: &Ctx, args: ImposePenaltyArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    let input = ImposePenalty {
        loan_id: args.loan_id,
        override_amount: args.override_amount,
    };
    to_value(&ledger.impose_penalty(ctx.tenant, &ctx.actor, &input, ctx.as_of)?)
}

pub fn run_penalties(ctx: &Ctx, args: PenaltiesArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.list_penalties(ctx.tenant, args.loan)?)
}

pub fn run_waive_penalty(ctx: &Ctx, args: WaivePenaltyArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.waive_penalty(ctx.tenant, &ctx.actor, args.penalty_id, args.amount, ctx.as_of)?)
}

pub fn run_waive_interest(ctx: &Ctx, args: WaiveInterestArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.waive_interest(
        ctx.tenant,
        &ctx.actor,
        args.loan_id,
        args.amount,
        args.effective,
        ctx.as_of,
    )?)
}

pub fn run_waivers(ctx: &Ctx, args: WaiversArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.list_waivers(ctx.tenant, args.loan)?)
}
