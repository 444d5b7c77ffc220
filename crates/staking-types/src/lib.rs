//! Common types module for the staking tracker.
//!
//! This module defines the core data types shared by the transaction store,
//! the balance store and the notification layer. It provides a centralized
//! location for shared types to ensure consistency across all components.

/// Balance records for pools, chains and cross-chain aggregates.
pub mod balance;
/// Supported source chains.
pub mod chain;
/// Event types for store-to-subscriber communication.
pub mod events;
/// User-facing notification records.
pub mod notification;
/// Transaction records and the lifecycle schedule.
pub mod transaction;
/// Utility functions for amount parsing and display formatting.
pub mod utils;

// Re-export all types for convenient access
pub use balance::*;
pub use chain::*;
pub use events::*;
pub use notification::*;
pub use transaction::*;
pub use utils::{format_eth_amount, format_remaining, parse_amount, sum_amounts, truncate_id};
