//! Multi-tenant micro-lending ledger engine.
//!
//! Tracks monthly-interest and daily-collection loans, the money movements
//! against them, and derives billing obligations, overdue status, penalties,
//! and cash reconciliation purely from the transaction history plus a few
//! mutable summary fields on the loan row. Callers arrive already
//! authenticated and tenant-scoped; everything here takes a tenant id and
//! validated input and returns plain data or a tagged error.

pub mod billing;
pub mod dates;
pub mod error;
pub mod penalty;
pub mod recon;
pub mod schedule;
pub mod store;
pub mod types;

pub use error::{ErrorKind, LedgerError};
pub use store::Ledger;
pub use types::*;

/// Standard result type for all ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
