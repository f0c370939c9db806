//! Daily-collection schedule calculator.
//!
//! Derives the repayment terms at disbursement and the day-by-day coverage
//! view from collection history. Pure; the caller supplies the history and
//! the as-of date.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::dates::days_between;
use crate::types::{round_currency, LoanStatus, Money, Rate};

/// Default grace window after the term ends before a daily loan is overdue.
pub const DEFAULT_GRACE_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Repayment terms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentTerms {
    pub total_repayment: Money,
    pub daily_payment: Money,
    pub term_end: NaiveDate,
}

/// Derive total repayment and the daily instalment.
///
/// Raw total = principal × (1 + rate/100 × termDays/30). The daily payment
/// is the rounded quotient and the stored total is re-derived as
/// daily × termDays, so the pair always satisfies the exactness invariant
/// even when the division is not exact in currency terms.
pub fn derive_repayment(
    principal: Money,
    rate: Rate,
    term_days: i64,
    disbursement: NaiveDate,
) -> RepaymentTerms {
    let hundred = Money::from(100);
    let days = Money::from(term_days);
    let raw_total =
        round_currency(principal * (Money::ONE + rate / hundred * days / Money::from(30)));
    let daily = round_currency(raw_total / days);
    RepaymentTerms {
        total_repayment: daily * days,
        daily_payment: daily,
        term_end: disbursement + Duration::days(term_days),
    }
}

// ---------------------------------------------------------------------------
// Day-by-day coverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayStatus {
    /// 1-based day number within the term.
    pub day: i64,
    pub date: NaiveDate,
    /// Collections dated exactly this day.
    pub collected: Money,
    pub cumulative_collected: Money,
    /// dailyPayment × day.
    pub required: Money,
    pub covered: bool,
}

/// Enumerate day 1..termDays from the day after disbursement through
/// min(asOf, termEnd). `collections` are (date, amount) pairs of approved
/// DAILY_COLLECTION entries, corrections included.
pub fn day_by_day(
    terms: &RepaymentTerms,
    disbursement: NaiveDate,
    term_days: i64,
    collections: &[(NaiveDate, Money)],
    as_of: NaiveDate,
) -> Vec<DayStatus> {
    let horizon = as_of.min(terms.term_end);
    let mut days = Vec::new();
    let mut cumulative = Money::ZERO;
    for day in 1..=term_days {
        let date = disbursement + Duration::days(day);
        if date > horizon {
            break;
        }
        let collected: Money = collections
            .iter()
            .filter(|(d, _)| *d == date)
            .map(|(_, amount)| *amount)
            .sum();
        cumulative += collected;
        let required = terms.daily_payment * Money::from(day);
        days.push(DayStatus {
            day,
            date,
            collected,
            cumulative_collected: cumulative,
            required,
            covered: cumulative >= required,
        });
    }
    days
}

// ---------------------------------------------------------------------------
// Overdue detection
// ---------------------------------------------------------------------------

pub fn overdue_threshold(term_end: NaiveDate, grace_days: i64) -> NaiveDate {
    term_end + Duration::days(grace_days)
}

/// Overdue only while ACTIVE, past the grace threshold, and short of the
/// total repayment.
pub fn is_overdue(
    status: LoanStatus,
    threshold: NaiveDate,
    total_collected: Money,
    total_repayment: Money,
    as_of: NaiveDate,
) -> bool {
    status == LoanStatus::Active && as_of > threshold && total_collected < total_repayment
}

/// Whole days past the grace threshold; zero when not yet past it.
pub fn days_overdue(threshold: NaiveDate, as_of: NaiveDate) -> i64 {
    days_between(threshold, as_of).max(0)
}
