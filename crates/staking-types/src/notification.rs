//! User-facing notification records.

use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
	Info,
	Success,
	Error,
}

/// An alert produced from a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
	/// Transaction the alert is about.
	pub transaction_id: String,
	pub level: NotificationLevel,
	pub title: String,
	pub body: String,
}
