//! Billing cycle calculator for monthly loans.
//!
//! Everything here is a pure function of the loan's terms and the ledger
//! history handed in by the caller. The loan row's cached billing principal
//! never feeds these computations; it is only a cache that the recording
//! path reconciles against `billing_principal_for`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::{billing_cycles, due_date_in, month_start};
use crate::types::{round_currency, Money, Rate};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The immutable terms of a monthly loan as far as billing is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTerms {
    /// Original principal, or the migrated remaining principal for loans
    /// ingested mid-life.
    pub base_principal: Money,
    /// Percent per month (5 = 5%).
    pub interest_rate: Rate,
    pub disbursement_date: NaiveDate,
    /// Day-of-month anchor taken from the disbursement date.
    pub due_day: u32,
    /// Migration watermark: cycles through this month are already settled
    /// outside the ledger.
    pub interest_paid_through: Option<NaiveDate>,
}

/// One row of the append-only principal-return journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSnapshot {
    pub return_date: NaiveDate,
    pub remaining_after: Money,
}

/// An approved interest payment or interest waiver credited to a cycle.
/// For payments the date is the effective date, not the collection date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCredit {
    pub date: NaiveDate,
    pub amount: Money,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingCycle {
    pub year: i32,
    pub month: u32,
    pub due_date: NaiveDate,
    pub billing_principal: Money,
    pub interest_due: Money,
    pub interest_paid: Money,
    pub interest_waived: Money,
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueState {
    pub next_due_date: Option<NaiveDate>,
    pub is_overdue: bool,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Advance interest collected at disbursement: principal × rate / 100,
/// rounded half-up to currency precision.
pub fn advance_interest(principal: Money, rate: Rate) -> Money {
    round_currency(principal * rate / Money::from(100))
}

/// Interest due for one cycle. The single currency-rounding point of the
/// billing path.
pub fn interest_due_for(billing_principal: Money, rate: Rate) -> Money {
    round_currency(billing_principal * rate / Money::from(100))
}

/// Billing principal for the cycle starting on `cycle_start`: the
/// remaining-principal snapshot of the latest return strictly before that
/// day, or the base principal when no return precedes the cycle. A return
/// made after a cycle starts never reduces that cycle's interest.
///
/// `returns` must be ordered oldest first (journal order).
pub fn billing_principal_for(
    cycle_start: NaiveDate,
    base_principal: Money,
    returns: &[ReturnSnapshot],
) -> Money {
    returns
        .iter()
        .filter(|r| r.return_date < cycle_start)
        .next_back()
        .map(|r| r.remaining_after)
        .unwrap_or(base_principal)
}

fn credited_in(credits: &[CycleCredit], year: i32, month: u32) -> Money {
    use chrono::Datelike;
    credits
        .iter()
        .filter(|c| c.date.year() == year && c.date.month() == month)
        .map(|c| c.amount)
        .sum()
}

/// Enumerate every billing cycle from the month after disbursement (or the
/// migration watermark) through the horizon month, with per-cycle principal,
/// interest due, credits, and settlement.
pub fn cycle_schedule(
    terms: &MonthlyTerms,
    returns: &[ReturnSnapshot],
    payments: &[CycleCredit],
    waivers: &[CycleCredit],
    horizon: NaiveDate,
) -> Vec<BillingCycle> {
    billing_cycles(terms.disbursement_date, terms.interest_paid_through, horizon)
        .map(|(year, month)| {
            let principal =
                billing_principal_for(month_start(year, month), terms.base_principal, returns);
            let due = interest_due_for(principal, terms.interest_rate);
            let paid = credited_in(payments, year, month);
            let waived = credited_in(waivers, year, month);
            BillingCycle {
                year,
                month,
                due_date: due_date_in(year, month, terms.due_day),
                billing_principal: principal,
                interest_due: due,
                interest_paid: paid,
                interest_waived: waived,
                settled: paid + waived >= due,
            }
        })
        .collect()
}

/// Walk cycles oldest to newest and stop at the first unsettled one.
/// Overdue means that cycle's due date has already passed.
pub fn due_state(cycles: &[BillingCycle], as_of: NaiveDate) -> DueState {
    for cycle in cycles {
        if !cycle.settled {
            return DueState {
                next_due_date: Some(cycle.due_date),
                is_overdue: cycle.due_date <= as_of,
            };
        }
    }
    DueState {
        next_due_date: None,
        is_overdue: false,
    }
}

/// True when every enumerated cycle is settled (close precondition).
pub fn all_settled(cycles: &[BillingCycle]) -> bool {
    cycles.iter().all(|c| c.settled)
}
