//! String formatting utilities.
//!
//! Provides functions for formatting amounts and durations for display,
//! and for truncating long identifiers to make logs more readable.

use super::amount::parse_amount;
use rust_decimal::{Decimal, RoundingStrategy};

/// Utility function to truncate an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Formats a raw ETH amount for display.
///
/// - zero (or unparseable input) renders as `"0.00"`
/// - positive amounts below 0.01 render as `"<0.01"`
/// - everything else renders with exactly 4 fractional digits, rounded
///   half away from zero
///
/// # Arguments
///
/// * `amount` - The raw amount as a decimal string
///
/// # Returns
///
/// A formatted string like "1.2346" or "<0.01"
pub fn format_eth_amount(amount: &str) -> String {
	let value = parse_amount(amount).unwrap_or(Decimal::ZERO);

	if value.is_zero() {
		return "0.00".to_string();
	}
	if value.is_sign_positive() && value < Decimal::new(1, 2) {
		return "<0.01".to_string();
	}

	let mut rounded = value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
	if rounded.is_zero() {
		rounded.set_sign_positive(true);
	}
	rounded.rescale(4);
	rounded.to_string()
}

/// Formats a remaining duration as `M:SS remaining`.
///
/// Seconds are the ceiling of the remaining milliseconds, so 1 ms left still
/// reads as one second.
pub fn format_remaining(remaining_ms: u64) -> String {
	let seconds = remaining_ms.div_ceil(1000);
	format!("{}:{:02} remaining", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x123456..");
	}

	#[test]
	fn test_format_eth_amount() {
		assert_eq!(format_eth_amount("0"), "0.00");
		assert_eq!(format_eth_amount("0.0000"), "0.00");
		assert_eq!(format_eth_amount("0.005"), "<0.01");
		assert_eq!(format_eth_amount("0.01"), "0.0100");
		assert_eq!(format_eth_amount("1.23456"), "1.2346");
		assert_eq!(format_eth_amount("1.23454"), "1.2345");
		assert_eq!(format_eth_amount("15"), "15.0000");
		assert_eq!(format_eth_amount("not a number"), "0.00");
	}

	#[test]
	fn test_format_eth_amount_is_pure() {
		for raw in ["3", "0.009", "2.00005", "1e-3"] {
			assert_eq!(format_eth_amount(raw), format_eth_amount(raw));
		}
		// Equal values with different spellings format identically
		assert_eq!(format_eth_amount("3"), format_eth_amount("3.000"));
	}

	#[test]
	fn test_format_remaining() {
		assert_eq!(format_remaining(145_000), "2:25 remaining");
		assert_eq!(format_remaining(60_000), "1:00 remaining");
		assert_eq!(format_remaining(59_001), "1:00 remaining");
		assert_eq!(format_remaining(1), "0:01 remaining");
		assert_eq!(format_remaining(9_500), "0:10 remaining");
	}
}
