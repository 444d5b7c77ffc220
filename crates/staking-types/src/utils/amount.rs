//! Decimal amount parsing and summation.
//!
//! Raw balances travel as decimal ETH strings ("10", "0.25"). Arithmetic is
//! done on `rust_decimal::Decimal` so aggregate totals are exact and do not
//! depend on the order in which chains report.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a decimal amount string.
///
/// Accepts plain decimals ("1.5") and scientific notation ("1e-7").
/// Returns `None` for empty or malformed input.
pub fn parse_amount(amount: &str) -> Option<Decimal> {
	let trimmed = amount.trim();
	if trimmed.is_empty() {
		return None;
	}

	Decimal::from_str(trimmed)
		.or_else(|_| Decimal::from_scientific(trimmed))
		.ok()
}

/// Sums decimal amount strings, treating malformed entries as zero.
pub fn sum_amounts<'a, I>(amounts: I) -> Decimal
where
	I: IntoIterator<Item = &'a str>,
{
	amounts
		.into_iter()
		.filter_map(parse_amount)
		.fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}

/// Renders a decimal as the canonical raw amount string.
///
/// Trailing fractional zeros are dropped, so `15.000` becomes `"15"`.
pub fn amount_to_string(value: Decimal) -> String {
	value.normalize().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_amount() {
		assert_eq!(parse_amount("1.5"), Some(Decimal::new(15, 1)));
		assert_eq!(parse_amount(" 10 "), Some(Decimal::new(10, 0)));
		assert_eq!(parse_amount("1e-7"), Some(Decimal::new(1, 7)));
		assert_eq!(parse_amount(""), None);
		assert_eq!(parse_amount("ten"), None);
	}

	#[test]
	fn test_sum_amounts_is_order_insensitive() {
		let forward = sum_amounts(["0.1", "0.2", "10", "bogus"]);
		let backward = sum_amounts(["bogus", "10", "0.2", "0.1"]);

		assert_eq!(forward, backward);
		assert_eq!(amount_to_string(forward), "10.3");
	}

	#[test]
	fn test_amount_to_string() {
		assert_eq!(amount_to_string(Decimal::new(15000, 3)), "15");
		assert_eq!(amount_to_string(Decimal::ZERO), "0");
		assert_eq!(amount_to_string(Decimal::new(25, 2)), "0.25");
	}
}
