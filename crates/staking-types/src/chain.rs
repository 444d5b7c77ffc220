//! Source chains the aggregator accepts stakes from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a chain key cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown chain: {0}")]
pub struct UnknownChain(pub String);

/// Identity of a supported source chain.
///
/// Keys are lowercase in configuration files and serialized records
/// (`"ethereum"`, `"flow"`, `"hedera"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKey {
	Ethereum,
	Flow,
	Hedera,
}

impl ChainKey {
	/// Returns the string representation of the chain key.
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainKey::Ethereum => "ethereum",
			ChainKey::Flow => "flow",
			ChainKey::Hedera => "hedera",
		}
	}

	/// Returns an iterator over all ChainKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Ethereum, Self::Flow, Self::Hedera].into_iter()
	}
}

impl fmt::Display for ChainKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChainKey {
	type Err = UnknownChain;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"ethereum" => Ok(Self::Ethereum),
			"flow" => Ok(Self::Flow),
			"hedera" => Ok(Self::Hedera),
			_ => Err(UnknownChain(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_chain_key_parsing() {
		assert_eq!("flow".parse::<ChainKey>(), Ok(ChainKey::Flow));
		assert_eq!("Hedera".parse::<ChainKey>(), Ok(ChainKey::Hedera));
		assert_eq!(
			"solana".parse::<ChainKey>(),
			Err(UnknownChain("solana".to_string()))
		);

		for key in ChainKey::all() {
			assert_eq!(key.as_str().parse::<ChainKey>(), Ok(key));
		}
	}
}
