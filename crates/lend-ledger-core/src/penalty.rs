//! Penalty arithmetic for daily loans.
//!
//! Penalties are imposed incrementally: each imposition charges only the
//! months not yet charged by any earlier penalty on the loan, waived ones
//! included. Waiving forgives the money, not the month.

use crate::types::{round_currency, Money, PenaltyStatus, Rate};

/// Months of penalty owed for a given overdue span: ceil(days / 30).
pub fn months_owed(days_overdue: i64) -> i64 {
    if days_overdue <= 0 {
        0
    } else {
        (days_overdue + 29) / 30
    }
}

/// Months this imposition may charge, net of everything already charged.
pub fn incremental_months(total_months_owed: i64, months_already_charged: i64) -> i64 {
    total_months_owed - months_already_charged
}

/// One month of penalty per month charged: principal × rate / 100 × months,
/// rounded half-up to currency precision.
pub fn penalty_amount(principal: Money, rate: Rate, months: i64) -> Money {
    round_currency(principal * rate / Money::from(100) * Money::from(months))
}

/// Status from the three running figures. Net payable is amount − waived.
pub fn recompute_status(amount: Money, waived: Money, collected: Money) -> PenaltyStatus {
    let net_payable = amount - waived;
    if net_payable <= Money::ZERO {
        PenaltyStatus::Waived
    } else if collected >= net_payable {
        PenaltyStatus::Paid
    } else if collected > Money::ZERO {
        PenaltyStatus::PartiallyPaid
    } else {
        PenaltyStatus::Pending
    }
}
