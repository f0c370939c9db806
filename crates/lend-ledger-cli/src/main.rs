mod commands;
mod input;
mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use lend_ledger_core::{Actor, ErrorKind, Ledger, LedgerError, TenantId};

use commands::loans::{
    CancelArgs, CloseArgs, CreateLoanArgs, DefaultArgs, LoanArgs, LoansArgs, MigrateLoanArgs,
    PaymentStatusArgs, WriteOffArgs,
};
use commands::penalties::{
    ImposePenaltyArgs, PenaltiesArgs, WaiveInterestArgs, WaivePenaltyArgs, WaiversArgs,
};
use commands::reports::{DashboardArgs, ExpenseArgs, FundEntryArgs, PnlArgs};
use commands::transactions::{
    ApproveArgs, PendingArgs, RecordArgs, RejectArgs, TransactionsArgs,
};

/// Micro-lending ledger over a single SQLite database file.
#[derive(Parser)]
#[command(
    name = "llg",
    version,
    about = "Micro-lending loan billing and transaction ledger",
    long_about = "Tracks monthly-interest and daily-collection loans, records and \
                  approves money movements, imposes penalties, and derives billing, \
                  overdue, and reconciliation views from the transaction history."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ledger database file
    #[arg(long, env = "LLG_DB", default_value = "ledger.db", global = true)]
    db: String,

    /// Tenant scope for every operation
    #[arg(long, default_value_t = 1, global = true)]
    tenant: TenantId,

    /// Acting user id
    #[arg(long, default_value_t = 1, global = true)]
    actor: i64,

    /// Act as a non-privileged collector (recorded entries stay PENDING)
    #[arg(long, global = true)]
    collector: bool,

    /// Evaluation date for derived views (defaults to today)
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a customer record
    CreateCustomer {
        name: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Disburse a new monthly or daily loan
    CreateLoan(CreateLoanArgs),
    /// Ingest a pre-existing loan at its current state
    MigrateLoan(MigrateLoanArgs),
    /// List loans
    Loans(LoansArgs),
    /// Loan detail with derived billing / schedule state
    Loan(LoanArgs),
    /// Day-by-day repayment view for a daily loan
    PaymentStatus(PaymentStatusArgs),
    /// Close a fully settled loan
    Close(CloseArgs),
    /// Mark a loan defaulted
    Default(DefaultArgs),
    /// Write off a defaulted loan
    WriteOff(WriteOffArgs),
    /// Cancel a loan with no recorded activity
    Cancel(CancelArgs),
    /// Record a money movement against a loan
    Record(RecordArgs),
    /// Approve a pending transaction
    Approve(ApproveArgs),
    /// Reject a pending transaction
    Reject(RejectArgs),
    /// List transactions
    Transactions(TransactionsArgs),
    /// List pending transactions awaiting approval
    Pending(PendingArgs),
    /// Impose the incremental penalty an overdue daily loan has accrued
    ImposePenalty(ImposePenaltyArgs),
    /// List penalties
    Penalties(PenaltiesArgs),
    /// Waive part or all of a penalty
    WaivePenalty(WaivePenaltyArgs),
    /// Forgive interest for a monthly cycle
    WaiveInterest(WaiveInterestArgs),
    /// Waiver audit trail
    Waivers(WaiversArgs),
    /// Record a capital injection or withdrawal
    FundEntry(FundEntryArgs),
    /// Record an expense
    Expense(ExpenseArgs),
    /// Fund summary aggregates
    FundSummary,
    /// Verify the two cash-in-hand derivations agree
    ReconCheck,
    /// Profit and loss over a date range
    Pnl(PnlArgs),
    /// Today's collections, disbursements, overdue loans, and defaulters
    Dashboard(DashboardArgs),
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Everything a command needs besides its own arguments.
pub struct Ctx {
    pub db: String,
    pub tenant: TenantId,
    pub actor: Actor,
    pub as_of: NaiveDate,
}

impl Ctx {
    pub fn open(&self) -> Result<Ledger, LedgerError> {
        Ledger::open(&self.db)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Ctx {
        db: cli.db.clone(),
        tenant: cli.tenant,
        actor: Actor {
            id: cli.actor,
            privileged: !cli.collector,
        },
        as_of: cli.as_of.unwrap_or_else(|| chrono::Local::now().date_naive()),
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::CreateCustomer { name, phone } => {
            commands::loans::run_create_customer(&ctx, &name, phone.as_deref())
        }
        Commands::CreateLoan(args) => commands::loans::run_create_loan(&ctx, args),
        Commands::MigrateLoan(args) => commands::loans::run_migrate_loan(&ctx, args),
        Commands::Loans(args) => commands::loans::run_loans(&ctx, args),
        Commands::Loan(args) => commands::loans::run_loan(&ctx, args),
        Commands::PaymentStatus(args) => commands::loans::run_payment_status(&ctx, args),
        Commands::Close(args) => commands::loans::run_close(&ctx, args),
        Commands::Default(args) => commands::loans::run_default(&ctx, args),
        Commands::WriteOff(args) => commands::loans::run_write_off(&ctx, args),
        Commands::Cancel(args) => commands::loans::run_cancel(&ctx, args),
        Commands::Record(args) => commands::transactions::run_record(&ctx, args),
        Commands::Approve(args) => commands::transactions::run_approve(&ctx, args),
        Commands::Reject(args) => commands::transactions::run_reject(&ctx, args),
        Commands::Transactions(args) => commands::transactions::run_transactions(&ctx, args),
        Commands::Pending(args) => commands::transactions::run_pending(&ctx, args),
        Commands::ImposePenalty(args) => commands::penalties::run_impose(&ctx, args),
        Commands::Penalties(args) => commands::penalties::run_penalties(&ctx, args),
        Commands::WaivePenalty(args) => commands::penalties::run_waive_penalty(&ctx, args),
        Commands::WaiveInterest(args) => commands::penalties::run_waive_interest(&ctx, args),
        Commands::Waivers(args) => commands::penalties::run_waivers(&ctx, args),
        Commands::FundEntry(args) => commands::reports::run_fund_entry(&ctx, args),
        Commands::Expense(args) => commands::reports::run_expense(&ctx, args),
        Commands::FundSummary => commands::reports::run_fund_summary(&ctx),
        Commands::ReconCheck => commands::reports::run_recon_check(&ctx),
        Commands::Pnl(args) => commands::reports::run_pnl(&ctx, args),
        Commands::Dashboard(args) => commands::reports::run_dashboard(&ctx, args),
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            let code = match e.downcast_ref::<LedgerError>().map(LedgerError::kind) {
                Some(ErrorKind::NotFound) => 2,
                Some(ErrorKind::Conflict) => 3,
                Some(ErrorKind::Retryable) => 4,
                _ => 1,
            };
            process::exit(code);
        }
    }
}
