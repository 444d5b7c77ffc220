//! Utility functions for amount handling and display formatting.
//!
//! This module provides helper functions for parsing decimal ETH amounts,
//! summing them exactly, and rendering them for display.

pub mod amount;
pub mod formatting;

pub use amount::{amount_to_string, parse_amount, sum_amounts};
pub use formatting::{format_eth_amount, format_remaining, truncate_id};
