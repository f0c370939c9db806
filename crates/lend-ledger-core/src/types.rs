use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Interest rates expressed as percentages (5 = 5% per month).
pub type Rate = Decimal;

/// Tenant scope for every row; cross-tenant reads are NotFound.
pub type TenantId = i64;

pub type LoanId = i64;
pub type TransactionId = i64;
pub type PenaltyId = i64;
pub type CustomerId = i64;
pub type UserId = i64;

/// Currency precision: two fractional digits, half-up.
pub const CURRENCY_DP: u32 = 2;

/// Round to currency precision. This is the only rounding point in the
/// engine; everything upstream keeps full precision.
pub fn round_currency(amount: Money) -> Money {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// The already-authenticated identity performing an operation.
/// Privileged actors get immediate approval on recorded transactions;
/// non-privileged actors produce PENDING entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub privileged: bool,
}

// ---------------------------------------------------------------------------
// Storage enums
// ---------------------------------------------------------------------------

macro_rules! storage_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

storage_enum! {
    /// Discriminates the two facility variants.
    LoanType {
        Monthly => "MONTHLY",
        Daily => "DAILY",
    }
}

storage_enum! {
    /// Finite state machine: ACTIVE -> {CLOSED, DEFAULTED, CANCELLED};
    /// DEFAULTED -> {CLOSED, WRITTEN_OFF}. Everything else is invalid.
    LoanStatus {
        Active => "ACTIVE",
        Closed => "CLOSED",
        Defaulted => "DEFAULTED",
        WrittenOff => "WRITTEN_OFF",
        Cancelled => "CANCELLED",
    }
}

storage_enum! {
    TransactionType {
        Disbursement => "DISBURSEMENT",
        AdvanceInterest => "ADVANCE_INTEREST",
        OpeningBalance => "OPENING_BALANCE",
        InterestPayment => "INTEREST_PAYMENT",
        PrincipalReturn => "PRINCIPAL_RETURN",
        DailyCollection => "DAILY_COLLECTION",
        Penalty => "PENALTY",
        PenaltyWaiver => "PENALTY_WAIVER",
        InterestWaiver => "INTEREST_WAIVER",
        GuarantorPayment => "GUARANTOR_PAYMENT",
    }
}

storage_enum! {
    ApprovalStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

storage_enum! {
    PenaltyStatus {
        Pending => "PENDING",
        PartiallyPaid => "PARTIALLY_PAID",
        Paid => "PAID",
        Waived => "WAIVED",
    }
}

storage_enum! {
    FundEntryType {
        Injection => "INJECTION",
        Withdrawal => "WITHDRAWAL",
    }
}

impl LoanStatus {
    /// True for states that accept no further transactions at all.
    pub fn is_terminal_for_transactions(&self) -> bool {
        matches!(self, LoanStatus::Closed | LoanStatus::Cancelled)
    }
}

impl TransactionType {
    /// Cash flowing into the book. OPENING_BALANCE is pre-ledger history
    /// and deliberately excluded from reconciliation.
    pub fn is_money_in(&self) -> bool {
        matches!(
            self,
            TransactionType::AdvanceInterest
                | TransactionType::InterestPayment
                | TransactionType::PrincipalReturn
                | TransactionType::DailyCollection
                | TransactionType::Penalty
                | TransactionType::GuarantorPayment
        )
    }

    /// Types written only by loan creation or migration, never via
    /// record_transaction.
    pub fn is_origination(&self) -> bool {
        matches!(
            self,
            TransactionType::Disbursement
                | TransactionType::AdvanceInterest
                | TransactionType::OpeningBalance
        )
    }

    /// Types written only by the waiver operations (audit trail rows).
    pub fn is_waiver(&self) -> bool {
        matches!(
            self,
            TransactionType::PenaltyWaiver | TransactionType::InterestWaiver
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_currency_is_half_up() {
        assert_eq!(round_currency(dec!(999.985)), dec!(999.99));
        assert_eq!(round_currency(dec!(999.984)), dec!(999.98));
        assert_eq!(round_currency(dec!(2.005)), dec!(2.01));
    }

    #[test]
    fn enum_codecs_round_trip() {
        for s in [
            LoanStatus::Active,
            LoanStatus::Closed,
            LoanStatus::Defaulted,
            LoanStatus::WrittenOff,
            LoanStatus::Cancelled,
        ] {
            assert_eq!(LoanStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TransactionType::parse("DAILY_COLLECTION"), Some(TransactionType::DailyCollection));
        assert_eq!(LoanType::parse("WEEKLY"), None);
    }
}
