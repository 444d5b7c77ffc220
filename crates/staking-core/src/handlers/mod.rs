//! Handlers for user staking actions.
//!
//! The stake handler sits between the presentation layer and the stores: it
//! records transactions, submits them through the wallet layer and settles
//! balances once the stake has crossed chains.

pub mod stake;
pub mod submission;

pub use stake::{StakeError, StakeHandler};
pub use submission::{SimulatedSubmitter, SubmissionError, SubmissionInterface, SubmissionRequest};
