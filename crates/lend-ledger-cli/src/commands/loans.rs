use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;

use lend_ledger_core::store::loans::{CreateDailyLoan, CreateMonthlyLoan, LoanFilter};
use lend_ledger_core::store::migration::{MigrateDailyLoan, MigrateMonthlyLoan};
use lend_ledger_core::{LoanStatus, LoanType};

use super::{to_value, CmdResult};
use crate::{input, Ctx};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LoanKind {
    Monthly,
    Daily,
}

impl From<LoanKind> for LoanType {
    fn from(kind: LoanKind) -> LoanType {
        match kind {
            LoanKind::Monthly => LoanType::Monthly,
            LoanKind::Daily => LoanType::Daily,
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct CreateLoanArgs {
    /// Loan variant
    #[arg(long, value_enum)]
    pub loan_type: LoanKind,

    /// Path to JSON payload (overrides individual flags; '-' reads stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Borrower customer id
    #[arg(long)]
    pub borrower: Option<i64>,

    /// Guarantor customer id (must differ from the borrower)
    #[arg(long)]
    pub guarantor: Option<i64>,

    /// Principal amount
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Interest rate, percent per month (or per 30 days for daily loans)
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Disbursement date
    #[arg(long)]
    pub disbursed: Option<NaiveDate>,

    /// Expected term in months (monthly loans)
    #[arg(long)]
    pub expected_months: Option<u32>,

    /// Collection term in days (daily loans)
    #[arg(long)]
    pub term_days: Option<i64>,

    /// Grace days past the term end before the loan is overdue
    #[arg(long)]
    pub grace_days: Option<i64>,
}

#[derive(Args)]
pub struct MigrateLoanArgs {
    /// Loan variant
    #[arg(long, value_enum)]
    pub loan_type: LoanKind,

    /// Path to JSON payload ('-' reads stdin)
    #[arg(long)]
    pub input: String,
}

#[derive(Args)]
pub struct LoansArgs {
    /// Filter by status (ACTIVE, CLOSED, DEFAULTED, WRITTEN_OFF, CANCELLED)
    #[arg(long)]
    pub status: Option<String>,

    /// Filter by variant
    #[arg(long, value_enum)]
    pub loan_type: Option<LoanKind>,

    /// Filter by borrower customer id
    #[arg(long)]
    pub borrower: Option<i64>,
}

#[derive(Args)]
pub struct LoanArgs {
    pub loan_id: i64,
}

#[derive(Args)]
pub struct PaymentStatusArgs {
    pub loan_id: i64,
}

#[derive(Args)]
pub struct CloseArgs {
    pub loan_id: i64,
}

#[derive(Args)]
pub struct DefaultArgs {
    pub loan_id: i64,
}

#[derive(Args)]
pub struct WriteOffArgs {
    pub loan_id: i64,
}

#[derive(Args)]
pub struct CancelArgs {
    pub loan_id: i64,
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

pub fn run_create_customer(ctx: &Ctx, name: &str, phone: Option<&str>) -> CmdResult {
    let mut ledger = ctx.open()?;
    let customer = ledger.create_customer(ctx.tenant, name, phone)?;
    to_value(&customer)
}

pub fn run_create_loan(ctx: &Ctx, args: CreateLoanArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    let loan = match args.loan_type {
        LoanKind::Monthly => {
            let payload: CreateMonthlyLoan = if let Some(ref path) = args.input {
                input::read_json(path)?
            } else {
                CreateMonthlyLoan {
                    borrower_id: args.borrower.ok_or("--borrower is required (or provide --input)")?,
                    guarantor_id: args.guarantor,
                    principal_amount: args
                        .principal
                        .ok_or("--principal is required (or provide --input)")?,
                    interest_rate: args.rate.ok_or("--rate is required (or provide --input)")?,
                    disbursement_date: args
                        .disbursed
                        .ok_or("--disbursed is required (or provide --input)")?,
                    expected_months: args.expected_months,
                    notes: None,
                }
            };
            ledger.create_monthly_loan(ctx.tenant, &ctx.actor, &payload)?
        }
        LoanKind::Daily => {
            let payload: CreateDailyLoan = if let Some(ref path) = args.input {
                input::read_json(path)?
            } else {
                CreateDailyLoan {
                    borrower_id: args.borrower.ok_or("--borrower is required (or provide --input)")?,
                    guarantor_id: args.guarantor,
                    principal_amount: args
                        .principal
                        .ok_or("--principal is required (or provide --input)")?,
                    interest_rate: args.rate.ok_or("--rate is required (or provide --input)")?,
                    disbursement_date: args
                        .disbursed
                        .ok_or("--disbursed is required (or provide --input)")?,
                    term_days: args
                        .term_days
                        .ok_or("--term-days is required (or provide --input)")?,
                    grace_days: args.grace_days,
                    notes: None,
                }
            };
            ledger.create_daily_loan(ctx.tenant, &ctx.actor, &payload)?
        }
    };
    to_value(&loan)
}

pub fn run_migrate_loan(ctx: &Ctx, args: MigrateLoanArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    let loan = match args.loan_type {
        LoanKind::Monthly => {
            let payload: MigrateMonthlyLoan = input::read_json(&args.input)?;
            ledger.migrate_monthly_loan(ctx.tenant, &ctx.actor, &payload)?
        }
        LoanKind::Daily => {
            let payload: MigrateDailyLoan = input::read_json(&args.input)?;
            ledger.migrate_daily_loan(ctx.tenant, &ctx.actor, &payload)?
        }
    };
    to_value(&loan)
}

pub fn run_loans(ctx: &Ctx, args: LoansArgs) -> CmdResult {
    let ledger = ctx.open()?;
    let status = match args.status.as_deref() {
        Some(s) => Some(LoanStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?),
        None => None,
    };
    let filter = LoanFilter {
        status,
        loan_type: args.loan_type.map(LoanType::from),
        borrower_id: args.borrower,
    };
    to_value(&ledger.list_loans(ctx.tenant, &filter)?)
}

pub fn run_loan(ctx: &Ctx, args: LoanArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.loan_detail(ctx.tenant, args.loan_id, ctx.as_of)?)
}

pub fn run_payment_status(ctx: &Ctx, args: PaymentStatusArgs) -> CmdResult {
    let ledger = ctx.open()?;
    to_value(&ledger.payment_status(ctx.tenant, args.loan_id, ctx.as_of)?)
}

pub fn run_close(ctx: &Ctx, args: CloseArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.close_loan(ctx.tenant, &ctx.actor, args.loan_id, ctx.as_of)?)
}

pub fn run_default(ctx: &Ctx, args: DefaultArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.default_loan(ctx.tenant, &ctx.actor, args.loan_id, ctx.as_of)?)
}

pub fn run_write_off(ctx: &Ctx, args: WriteOffArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.write_off_loan(ctx.tenant, &ctx.actor, args.loan_id, ctx.as_of)?)
}

pub fn run_cancel(ctx: &Ctx, args: CancelArgs) -> CmdResult {
    let mut ledger = ctx.open()?;
    to_value(&ledger.cancel_loan(ctx.tenant, &ctx.actor, args.loan_id, ctx.as_of)?)
}
