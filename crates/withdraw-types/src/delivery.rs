//! Transaction delivery types.
//!
//! A ledger transaction is identified by its first (fee payer) signature,
//! displayed as base58.

use std::fmt;

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
	pub fn as_bytes(&self) -> &[u8; 64] {
		&self.0
	}
}

impl Default for Signature {
	fn default() -> Self {
		Self([0u8; 64])
	}
}

impl From<[u8; 64]> for Signature {
	fn from(bytes: [u8; 64]) -> Self {
		Self(bytes)
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", bs58::encode(self.0).into_string())
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Signature({})", self)
	}
}

/// Transaction id as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl From<Signature> for TransactionHash {
	fn from(signature: Signature) -> Self {
		Self(signature.0.to_vec())
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", bs58::encode(&self.0).into_string())
	}
}

/// Status of a processed transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionReceipt {
	/// The transaction id.
	pub hash: TransactionHash,
	/// Slot the transaction was processed in.
	pub slot: u64,
	/// Whether every instruction executed successfully.
	pub success: bool,
	/// Failure reason reported by the ledger, if any.
	pub error: Option<String>,
}
