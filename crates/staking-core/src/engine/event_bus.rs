//! Event bus for broadcasting store events.
//!
//! Stores publish an event after every committed mutation; subscribers such as
//! the notification dispatcher receive their own copy through a broadcast
//! channel and never call back into the stores synchronously.

use staking_types::StakingEvent;
use tokio::sync::broadcast;

/// Broadcast channel shared by all stores and subscribers.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<StakingEvent>,
}

impl EventBus {
	/// Creates an event bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Returns a receiver for every event published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<StakingEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed, which callers may ignore.
	pub fn publish(
		&self,
		event: StakingEvent,
	) -> Result<usize, broadcast::error::SendError<StakingEvent>> {
		self.sender.send(event)
	}
}
