pub mod loans;
pub mod penalties;
pub mod reports;
pub mod transactions;

use serde_json::Value;

pub type CmdResult = Result<Value, Box<dyn std::error::Error>>;

pub(crate) fn to_value<T: serde::Serialize>(v: &T) -> CmdResult {
    Ok(serde_json::to_value(v)?)
}
