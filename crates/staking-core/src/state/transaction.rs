//! Transaction lifecycle transition rules.
//!
//! Transactions move forward along `Pending -> Confirmed -> WaitingCompose ->
//! ComposeComplete -> Completed`. A status may skip ahead (an external
//! receipt driver can observe several stages at once) but never move back.
//! `Failed` is reachable from every non-terminal status. Re-entering the
//! current status is accepted so that repeated updates stay idempotent.
//! Leaving `Failed` is only possible through an explicit retry.

use once_cell::sync::Lazy;
use staking_types::TransactionStatus;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised when a status change is not allowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionStateError {
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition {
		from: TransactionStatus,
		to: TransactionStatus,
	},
	#[error("Transaction in {0} cannot be retried")]
	NotRetryable(TransactionStatus),
}

/// Static transition table - each status maps to the statuses it may move to.
static TRANSITIONS: Lazy<HashMap<TransactionStatus, HashSet<TransactionStatus>>> =
	Lazy::new(|| {
		use TransactionStatus::*;

		let mut m = HashMap::new();
		m.insert(
			Pending,
			HashSet::from([Confirmed, WaitingCompose, ComposeComplete, Completed, Failed]),
		);
		m.insert(
			Confirmed,
			HashSet::from([WaitingCompose, ComposeComplete, Completed, Failed]),
		);
		m.insert(
			WaitingCompose,
			HashSet::from([ComposeComplete, Completed, Failed]),
		);
		m.insert(ComposeComplete, HashSet::from([Completed, Failed]));
		m.insert(Completed, HashSet::new()); // terminal
		m.insert(Failed, HashSet::new()); // terminal
		m
	});

/// Checks whether a transaction may move from `from` to `to`.
pub fn validate_transition(
	from: TransactionStatus,
	to: TransactionStatus,
) -> Result<(), TransactionStateError> {
	if from == to {
		return Ok(());
	}

	if TRANSITIONS
		.get(&from)
		.is_some_and(|allowed| allowed.contains(&to))
	{
		Ok(())
	} else {
		Err(TransactionStateError::InvalidTransition { from, to })
	}
}
