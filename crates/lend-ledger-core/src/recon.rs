//! Reconciliation and aggregate P&L assembly.
//!
//! The store fetches raw ledger figures; everything here combines them.
//! Cash in hand is deliberately derived twice (top-down in
//! `store::reports::cash_in_hand`, bottom-up in
//! `store::reports::cash_in_hand_bottom_up`); the two must always agree and
//! this duplication is a standing correctness check, not an accident.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{round_currency, Money};

// ---------------------------------------------------------------------------
// Cash in hand
// ---------------------------------------------------------------------------

/// The four top-down components of cash in hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashComponents {
    /// Fund injections minus withdrawals.
    pub capital_invested: Money,
    /// Approved disbursements on non-cancelled loans.
    pub total_disbursed: Money,
    /// Approved money-in entries (advance interest, interest payments,
    /// principal returns, daily collections, penalty collections, guarantor
    /// payments). Opening balances are pre-ledger history and excluded.
    pub total_money_in: Money,
    /// Non-deleted expenses.
    pub total_expenses: Money,
}

impl CashComponents {
    pub fn cash_in_hand(&self) -> Money {
        self.capital_invested - self.total_disbursed + self.total_money_in - self.total_expenses
    }
}

// ---------------------------------------------------------------------------
// Fund summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundSummary {
    pub capital_invested: Money,
    pub cash_in_hand: Money,
    /// Outstanding principal across ACTIVE loans.
    pub money_deployed: Money,
    pub total_interest_earned: Money,
    /// Outstanding principal on DEFAULTED / WRITTEN_OFF loans net of
    /// guarantor recoveries against those loans.
    pub money_lost_to_defaults: Money,
    pub total_expenses: Money,
    /// Interest and penalty amounts forgiven by waivers.
    pub revenue_forgone: Money,
    pub net_profit: Money,
}

/// Interest earned so far by one daily loan: collections above principal.
pub fn daily_interest_earned(principal: Money, total_collected: Money) -> Money {
    (total_collected - principal).max(Money::ZERO)
}

/// Marginal interest a daily loan earned inside a date range: the delta of
/// `max(collected − principal, 0)` between the range boundaries. Summing
/// deltas over adjacent ranges never double-counts the crossing of the
/// principal threshold.
pub fn daily_interest_delta(
    principal: Money,
    collected_through_start: Money,
    collected_through_end: Money,
) -> Money {
    daily_interest_earned(principal, collected_through_end)
        - daily_interest_earned(principal, collected_through_start)
}

pub fn net_profit(interest_earned: Money, lost_to_defaults: Money, expenses: Money) -> Money {
    interest_earned - lost_to_defaults - expenses
}

/// Round every aggregate of a fund summary to currency precision for
/// reporting. Inputs keep full precision until this point.
pub fn rounded_summary(s: FundSummary) -> FundSummary {
    FundSummary {
        capital_invested: round_currency(s.capital_invested),
        cash_in_hand: round_currency(s.cash_in_hand),
        money_deployed: round_currency(s.money_deployed),
        total_interest_earned: round_currency(s.total_interest_earned),
        money_lost_to_defaults: round_currency(s.money_lost_to_defaults),
        total_expenses: round_currency(s.total_expenses),
        revenue_forgone: round_currency(s.revenue_forgone),
        net_profit: round_currency(s.net_profit),
    }
}

// ---------------------------------------------------------------------------
// Date-ranged P&L
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub interest_earned: Money,
    pub money_lost_to_defaults: Money,
    pub total_expenses: Money,
    pub net_profit: Money,
}
