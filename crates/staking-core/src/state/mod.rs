//! State machine rules for transaction lifecycles.
//!
//! This module defines which status changes the transaction store accepts,
//! keeping terminal states terminal and the happy path forward-only.

pub mod transaction;

pub use transaction::{validate_transition, TransactionStateError};
