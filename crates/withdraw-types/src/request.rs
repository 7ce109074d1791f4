//! Withdrawal request types.

use crate::address::Address;
use crate::utils::{parse_hex_array, EncodingError};
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte domain salt.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
	/// Draws a fresh salt from the OS-seeded thread RNG.
	pub fn random() -> Self {
		Self(rand::random())
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}

impl TryFrom<&[u8]> for Salt {
	type Error = EncodingError;

	fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
		let array: [u8; 32] = bytes.try_into().map_err(|_| EncodingError::InvalidField {
			field: "salt",
			reason: format!("expected 32 bytes, got {}", bytes.len()),
		})?;
		Ok(Self(array))
	}
}

impl FromStr for Salt {
	type Err = EncodingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_hex_array::<32>("salt", s).map(Self)
	}
}

impl fmt::Display for Salt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for Salt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Salt({})", self)
	}
}

/// One withdrawal attempt. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawRequest {
	asset_amount: u64,
	expires_at: u64,
	approval_salt: Salt,
}

impl WithdrawRequest {
	pub fn new(asset_amount: u64, expires_at: u64, approval_salt: Salt) -> Self {
		Self {
			asset_amount,
			expires_at,
			approval_salt,
		}
	}

	/// Amount in the asset's smallest unit.
	pub fn asset_amount(&self) -> u64 {
		self.asset_amount
	}

	/// Expiry as unix seconds.
	pub fn expires_at(&self) -> u64 {
		self.expires_at
	}

	/// Salt the coordinator's signature was produced under.
	pub fn approval_salt(&self) -> &Salt {
		&self.approval_salt
	}
}

/// Parameters supplied by the external signing service, already decoded.
#[derive(Debug, Clone)]
pub struct WithdrawParams {
	/// Collateral (proxy) account funds are withdrawn from.
	pub collateral_proxy: Address,
	/// Token mint being withdrawn.
	pub asset: Address,
	/// Amount in the asset's smallest unit.
	pub amount: u64,
	/// Owner of the destination token account.
	pub recipient: Address,
	/// Expiry as unix seconds.
	pub expires_at: u64,
	/// Coordinator domain salt.
	pub salt: Salt,
	/// Coordinator approver's signature over the coordinator digest.
	pub coordinator_signature: [u8; 64],
}

impl WithdrawParams {
	pub fn request(&self) -> WithdrawRequest {
		WithdrawRequest::new(self.amount, self.expires_at, self.salt)
	}
}
