//! Invariant verification over decoded event streams
//!
//! Each check is independent and non-fatal to the others: the verifiers
//! always finish, accumulate a bounded sample of violations per check, and
//! report pass/fail per category plus an overall verdict.

pub mod balance;
pub mod order;
pub mod report;

pub use balance::{verify_balance_events, CardinalityInputs};
pub use order::verify_order_events;
pub use report::{CheckReport, VerifyConfig, VerifyReport, ViolationList};
