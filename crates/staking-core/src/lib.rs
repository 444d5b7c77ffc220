//! Core tracking engine for the cross-chain staking aggregator.
//!
//! This crate owns the two client-side stores: the transaction store, which
//! drives every stake through its lifecycle state machine, and the balance
//! store, which keeps per-chain balances and their cross-chain aggregates
//! consistent. Stores publish events on an event bus; the notification
//! dispatcher turns lifecycle events into user-facing alerts. The
//! `StakingEngine` is the application root that owns and wires them.

pub mod balances;
pub mod builder;
pub mod engine;
pub mod handlers;
pub mod lifecycle;
pub mod notifications;
pub mod state;
pub mod transactions;

pub use balances::{BalanceError, BalanceFetcher, BalanceStore, SimulatedBalanceFetcher};
pub use builder::{BuilderError, StakingBuilder};
pub use engine::{event_bus::EventBus, EngineError, StakingEngine};
pub use handlers::{
	SimulatedSubmitter, StakeError, StakeHandler, SubmissionError, SubmissionInterface,
	SubmissionRequest,
};
pub use lifecycle::{Clock, LifecycleDriver, ManualClock, TimedLifecycle, TokioClock};
pub use notifications::{
	notification_for, ChannelNotificationSink, LogNotificationSink, NotificationContext,
	NotificationDispatcher, NotificationError, NotificationSink,
};
pub use state::{validate_transition, TransactionStateError};
pub use transactions::TransactionStore;
