//! Notification dispatch for lifecycle transitions.
//!
//! The dispatcher subscribes to the event bus, turns transaction events into
//! user-facing `Notification`s and hands them to every configured sink. It
//! keeps no state of its own and never calls back into the stores.

use crate::engine::event_bus::EventBus;
use async_trait::async_trait;
use staking_types::{
	format_remaining, Notification, NotificationLevel, StakingEvent, Transaction,
	TransactionEvent, TransactionStatus, TransactionType,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
	/// The receiving side of a sink is gone.
	#[error("Notification sink closed")]
	Closed,
}

/// Destination for user-facing notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
	async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
	async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
		match notification.level {
			NotificationLevel::Error => tracing::warn!(
				tx_id = %staking_types::truncate_id(&notification.transaction_id),
				"{}: {}",
				notification.title,
				notification.body
			),
			_ => tracing::info!(
				tx_id = %staking_types::truncate_id(&notification.transaction_id),
				"{}: {}",
				notification.title,
				notification.body
			),
		}
		Ok(())
	}
}

/// Sink forwarding notifications over a channel, e.g. to a presentation layer.
pub struct ChannelNotificationSink {
	sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationSink {
	/// Creates the sink together with the receiving end.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { sender }, receiver)
	}
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
	async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
		self.sender
			.send(notification)
			.map_err(|_| NotificationError::Closed)
	}
}

/// Display data notifications need beyond the transaction itself.
#[derive(Debug, Clone)]
pub struct NotificationContext {
	/// Token symbol, e.g. `ETH`.
	pub token_symbol: String,
	/// Name of the chain compose messages are delivered to.
	pub destination_name: String,
	/// Compose budget announced when composing starts.
	pub compose_duration: Duration,
}

/// Builds the notification for an event, if the event warrants one.
///
/// Only transaction events produce notifications; balance events are for
/// presentation layers to render directly.
pub fn notification_for(event: &StakingEvent, context: &NotificationContext) -> Option<Notification> {
	let StakingEvent::Transaction(event) = event else {
		return None;
	};

	match event {
		TransactionEvent::Created { transaction } => Some(notification(
			transaction,
			NotificationLevel::Info,
			"Transaction submitted",
			format!(
				"{} {} {} on {}",
				verb(transaction.tx_type),
				transaction.amount_formatted,
				context.token_symbol,
				transaction.chain_name
			),
		)),
		TransactionEvent::Retried { transaction } => Some(notification(
			transaction,
			NotificationLevel::Info,
			"Retrying transaction",
			format!(
				"{} {} {} on {} again",
				verb(transaction.tx_type),
				transaction.amount_formatted,
				context.token_symbol,
				transaction.chain_name
			),
		)),
		TransactionEvent::StatusChanged { transaction, .. } => {
			status_notification(transaction, context)
		},
		TransactionEvent::HashUpdated { .. } | TransactionEvent::Cleared { .. } => None,
	}
}

fn status_notification(transaction: &Transaction, context: &NotificationContext) -> Option<Notification> {
	let amount = format!("{} {}", transaction.amount_formatted, context.token_symbol);

	let (level, title, body) = match transaction.status {
		TransactionStatus::Pending => return None,
		TransactionStatus::Confirmed => (
			NotificationLevel::Info,
			"Transaction confirmed",
			format!("{} confirmed on {}", amount, transaction.chain_name),
		),
		TransactionStatus::WaitingCompose => (
			NotificationLevel::Info,
			"Cross-chain message sent",
			format!(
				"Delivering {} from {} to {}, about {}",
				amount,
				transaction.chain_name,
				context.destination_name,
				format_remaining(context.compose_duration.as_millis() as u64)
			),
		),
		TransactionStatus::ComposeComplete => (
			NotificationLevel::Info,
			"Cross-chain message delivered",
			format!("{} arrived on {}", amount, context.destination_name),
		),
		TransactionStatus::Completed => match transaction.tx_type {
			TransactionType::Deposit => (
				NotificationLevel::Success,
				"Deposit complete",
				format!("{} staked from {}", amount, transaction.chain_name),
			),
			TransactionType::Withdraw => (
				NotificationLevel::Success,
				"Withdrawal complete",
				format!("{} withdrawn to {}", amount, transaction.chain_name),
			),
		},
		TransactionStatus::Failed => (
			NotificationLevel::Error,
			"Transaction failed",
			transaction
				.error
				.clone()
				.unwrap_or_else(|| format!("{} on {} did not go through", amount, transaction.chain_name)),
		),
	};

	Some(notification(transaction, level, title, body))
}

fn notification(
	transaction: &Transaction,
	level: NotificationLevel,
	title: &str,
	body: String,
) -> Notification {
	Notification {
		transaction_id: transaction.id.clone(),
		level,
		title: title.to_string(),
		body,
	}
}

fn verb(tx_type: TransactionType) -> &'static str {
	match tx_type {
		TransactionType::Deposit => "Depositing",
		TransactionType::Withdraw => "Withdrawing",
	}
}

/// Subscriber that turns store events into notifications.
pub struct NotificationDispatcher {
	receiver: broadcast::Receiver<StakingEvent>,
	sinks: Vec<Arc<dyn NotificationSink>>,
	context: NotificationContext,
}

impl NotificationDispatcher {
	/// Subscribes to the bus immediately, so no event published after
	/// construction is missed.
	pub fn new(
		event_bus: &EventBus,
		sinks: Vec<Arc<dyn NotificationSink>>,
		context: NotificationContext,
	) -> Self {
		Self {
			receiver: event_bus.subscribe(),
			sinks,
			context,
		}
	}

	/// Dispatches notifications until the event bus closes.
	pub async fn run(mut self) {
		loop {
			match self.receiver.recv().await {
				Ok(event) => {
					let Some(notification) = notification_for(&event, &self.context) else {
						continue;
					};
					for sink in &self.sinks {
						if let Err(e) = sink.notify(notification.clone()).await {
							tracing::warn!(error = %e, "Failed to deliver notification");
						}
					}
				},
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Notification dispatcher lagged behind events");
				},
				Err(broadcast::error::RecvError::Closed) => {
					tracing::debug!("Event bus closed, stopping notification dispatcher");
					break;
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use staking_types::{BalanceEvent, PENDING_HASH};

	fn context() -> NotificationContext {
		NotificationContext {
			token_symbol: "ETH".to_string(),
			destination_name: "Ethereum Sepolia".to_string(),
			compose_duration: Duration::from_secs(145),
		}
	}

	fn transaction(tx_type: TransactionType, status: TransactionStatus) -> Transaction {
		Transaction {
			id: "tx-1-abcdef01".to_string(),
			hash: PENDING_HASH.to_string(),
			tx_type,
			chain_id: 545,
			chain_name: "Flow EVM Testnet".to_string(),
			amount: "5".to_string(),
			amount_formatted: "5.0000".to_string(),
			apy: None,
			status,
			timestamp: 0,
			confirmation_time: None,
			compose_completion_time: None,
			completion_time: None,
			error: None,
		}
	}

	fn status_changed(transaction: Transaction) -> StakingEvent {
		StakingEvent::Transaction(TransactionEvent::StatusChanged {
			transaction,
			previous: TransactionStatus::Pending,
		})
	}

	#[test]
	fn test_compose_notification_announces_budget() {
		let event = status_changed(transaction(
			TransactionType::Deposit,
			TransactionStatus::WaitingCompose,
		));
		let notification = notification_for(&event, &context()).unwrap();

		assert_eq!(notification.level, NotificationLevel::Info);
		assert_eq!(notification.title, "Cross-chain message sent");
		assert_eq!(
			notification.body,
			"Delivering 5.0000 ETH from Flow EVM Testnet to Ethereum Sepolia, about 2:25 remaining"
		);
	}

	#[test]
	fn test_completion_text_depends_on_type() {
		let deposit = notification_for(
			&status_changed(transaction(TransactionType::Deposit, TransactionStatus::Completed)),
			&context(),
		)
		.unwrap();
		assert_eq!(deposit.level, NotificationLevel::Success);
		assert_eq!(deposit.body, "5.0000 ETH staked from Flow EVM Testnet");

		let withdraw = notification_for(
			&status_changed(transaction(TransactionType::Withdraw, TransactionStatus::Completed)),
			&context(),
		)
		.unwrap();
		assert_eq!(withdraw.title, "Withdrawal complete");
	}

	#[test]
	fn test_failure_prefers_recorded_error() {
		let mut failed = transaction(TransactionType::Deposit, TransactionStatus::Failed);
		failed.error = Some("User rejected the request".to_string());
		let notification = notification_for(&status_changed(failed), &context()).unwrap();
		assert_eq!(notification.level, NotificationLevel::Error);
		assert_eq!(notification.body, "User rejected the request");

		let silent = transaction(TransactionType::Deposit, TransactionStatus::Failed);
		let notification = notification_for(&status_changed(silent), &context()).unwrap();
		assert_eq!(
			notification.body,
			"5.0000 ETH on Flow EVM Testnet did not go through"
		);
	}

	#[test]
	fn test_events_without_notifications() {
		let balance = StakingEvent::Balance(BalanceEvent::LoadingChanged { is_loading: true });
		assert!(notification_for(&balance, &context()).is_none());

		let cleared = StakingEvent::Transaction(TransactionEvent::Cleared { removed: 2 });
		assert!(notification_for(&cleared, &context()).is_none());
	}

	#[tokio::test]
	async fn test_dispatcher_forwards_to_sinks() {
		let bus = EventBus::new(16);
		let (sink, mut received) = ChannelNotificationSink::new();
		let dispatcher = NotificationDispatcher::new(&bus, vec![Arc::new(sink)], context());
		let handle = tokio::spawn(dispatcher.run());

		bus.publish(StakingEvent::Balance(BalanceEvent::LoadingChanged {
			is_loading: true,
		}))
		.unwrap();
		bus.publish(status_changed(transaction(
			TransactionType::Deposit,
			TransactionStatus::Confirmed,
		)))
		.unwrap();

		let notification = received.recv().await.unwrap();
		assert_eq!(notification.title, "Transaction confirmed");
		assert_eq!(notification.body, "5.0000 ETH confirmed on Flow EVM Testnet");

		drop(bus);
		handle.await.unwrap();
	}
}
