//! Calendar-day arithmetic for billing cycles and overdue detection.
//!
//! All dates are timezone-naive calendar dates. "Today" is always an
//! explicit parameter; nothing in here consults a clock.

use chrono::{Datelike, NaiveDate};

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = next_month(year, month);
    let first_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid month start");
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    (first_next - first).num_days() as u32
}

/// First calendar day of the given month.
pub fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start")
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Due date for a cycle: the anchor day clamped to the month's length.
/// The anchor itself never decays: a day-31 loan dues on Feb 28 and
/// bounces back to the 31st in March.
pub fn due_date_in(year: i32, month: u32, anchor_day: u32) -> NaiveDate {
    let day = anchor_day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid")
}

/// Whole calendar days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Iterator over `(year, month)` billing cycles, inclusive on both ends.
///
/// Pure function of its bounds; independent of any stored "current cycle"
/// field so historical recomputation always agrees with the ledger.
#[derive(Debug, Clone)]
pub struct Cycles {
    next: Option<(i32, u32)>,
    end: (i32, u32),
}

impl Iterator for Cycles {
    type Item = (i32, u32);

    fn next(&mut self) -> Option<(i32, u32)> {
        let current = self.next?;
        if (current.0, current.1) > self.end {
            self.next = None;
            return None;
        }
        self.next = Some(next_month(current.0, current.1));
        Some(current)
    }
}

/// Enumerate billing cycles for a monthly loan.
///
/// Cycles start the month after disbursement. For migrated loans the
/// watermark skips every cycle up to and including the month interest was
/// already paid through. The horizon (today or closure date) is inclusive.
pub fn billing_cycles(
    disbursement: NaiveDate,
    paid_through: Option<NaiveDate>,
    horizon: NaiveDate,
) -> Cycles {
    let anchor = match paid_through {
        Some(w) if w >= disbursement => w,
        _ => disbursement,
    };
    let start = next_month(anchor.year(), anchor.month());
    Cycles {
        next: Some(start),
        end: (horizon.year(), horizon.month()),
    }
}
