//! Ledger addresses.
//!
//! Every account, program and signer on the ledger is identified by a 32-byte
//! public key rendered as base58. Program-derived addresses are computed the
//! same way the runtime does: SHA-256 over the seeds, a bump byte, the program
//! id and a fixed marker, retried with decreasing bumps until the result is
//! not a valid Ed25519 point.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of seeds accepted by program address derivation.
pub const MAX_SEEDS: usize = 16;
/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Address = Address([0u8; 32]);

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Address = Address([
	0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
	0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
]);

/// `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address = Address([
	0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d, 0x83,
	0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9, 0xf8, 0x59,
]);

/// `Ed25519SigVerify111111111111111111111111111`
pub const ED25519_PROGRAM_ID: Address = Address([
	0x03, 0x7d, 0x46, 0xd6, 0x7c, 0x93, 0xfb, 0xbe, 0x12, 0xf9, 0x42, 0x8f, 0x83, 0x8d, 0x40, 0xff,
	0x05, 0x70, 0x74, 0x49, 0x27, 0xf4, 0x8a, 0x64, 0xfc, 0xca, 0x70, 0x44, 0x80, 0x00, 0x00, 0x00,
]);

/// `Sysvar1nstructions1111111111111111111111111`
pub const SYSVAR_INSTRUCTIONS_ID: Address = Address([
	0x06, 0xa7, 0xd5, 0x17, 0x18, 0x7b, 0xd1, 0x66, 0x35, 0xda, 0xd4, 0x04, 0x55, 0xfd, 0xc2, 0xc0,
	0xc1, 0x24, 0xc6, 0x8f, 0x21, 0x56, 0x75, 0xa5, 0xdb, 0xba, 0xcb, 0x5f, 0x08, 0x00, 0x00, 0x00,
]);

/// Errors that can occur when parsing or deriving addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
	/// The input was not valid base58.
	#[error("Invalid base58 address: {0}")]
	InvalidBase58(String),
	/// The decoded input was not 32 bytes long.
	#[error("Invalid address length: expected 32 bytes, got {0}")]
	InvalidLength(usize),
	/// Too many seeds, or a seed longer than 32 bytes.
	#[error("Invalid seeds for program address derivation")]
	InvalidSeeds,
	/// The derived hash is a valid curve point and cannot be a program address.
	#[error("Derived address lies on the Ed25519 curve")]
	OnCurve,
}

/// A 32-byte ledger address (an Ed25519 public key or a program-derived address).
#[derive(
	Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; 32]);

impl Address {
	pub const fn new(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn to_bytes(self) -> [u8; 32] {
		self.0
	}

	/// Returns true if the bytes decompress to an Ed25519 point.
	pub fn is_on_curve(&self) -> bool {
		ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
	}

	/// Derives a program address from seeds and an explicit bump already
	/// appended to `seeds`.
	pub fn create_program_address(
		seeds: &[&[u8]],
		program_id: &Address,
	) -> Result<Address, AddressError> {
		if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
			return Err(AddressError::InvalidSeeds);
		}

		let mut hasher = Sha256::new();
		for seed in seeds {
			hasher.update(seed);
		}
		hasher.update(program_id.as_bytes());
		hasher.update(PDA_MARKER);
		let candidate = Address(hasher.finalize().into());

		if candidate.is_on_curve() {
			return Err(AddressError::OnCurve);
		}
		Ok(candidate)
	}

	/// Finds the canonical program address for `seeds`, searching bumps from
	/// 255 downwards. Returns the address and the bump that produced it.
	pub fn find_program_address(
		seeds: &[&[u8]],
		program_id: &Address,
	) -> Result<(Address, u8), AddressError> {
		// One slot is reserved for the bump seed.
		if seeds.len() >= MAX_SEEDS {
			return Err(AddressError::InvalidSeeds);
		}

		for bump in (0..=u8::MAX).rev() {
			let bump_seed = [bump];
			let mut with_bump: Vec<&[u8]> = seeds.to_vec();
			with_bump.push(&bump_seed);
			match Self::create_program_address(&with_bump, program_id) {
				Ok(address) => return Ok((address, bump)),
				Err(AddressError::OnCurve) => continue,
				Err(e) => return Err(e),
			}
		}
		Err(AddressError::OnCurve)
	}

	/// Associated token account of `owner` for `mint`.
	pub fn associated_token_address(
		owner: &Address,
		mint: &Address,
	) -> Result<Address, AddressError> {
		Self::find_program_address(
			&[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
			&ASSOCIATED_TOKEN_PROGRAM_ID,
		)
		.map(|(address, _)| address)
	}
}

impl From<[u8; 32]> for Address {
	fn from(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}
}

impl TryFrom<&[u8]> for Address {
	type Error = AddressError;

	fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
		let array: [u8; 32] = bytes
			.try_into()
			.map_err(|_| AddressError::InvalidLength(bytes.len()))?;
		Ok(Self(array))
	}
}

impl AsRef<[u8]> for Address {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = bs58::decode(s.trim())
			.into_vec()
			.map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
		Self::try_from(bytes.as_slice())
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", bs58::encode(self.0).into_string())
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Address({})", self)
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = <String as Deserialize>::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_well_known_ids_round_trip() {
		let cases = [
			("11111111111111111111111111111111", SYSTEM_PROGRAM_ID),
			("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", TOKEN_PROGRAM_ID),
			("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL", ASSOCIATED_TOKEN_PROGRAM_ID),
			("Ed25519SigVerify111111111111111111111111111", ED25519_PROGRAM_ID),
			("Sysvar1nstructions1111111111111111111111111", SYSVAR_INSTRUCTIONS_ID),
		];
		for (text, expected) in cases {
			let parsed: Address = text.parse().unwrap();
			assert_eq!(parsed, expected);
			assert_eq!(expected.to_string(), text);
		}
	}

	#[test]
	fn test_rejects_wrong_length() {
		let short = bs58::encode([1u8; 31]).into_string();
		assert_eq!(
			short.parse::<Address>(),
			Err(AddressError::InvalidLength(31))
		);
		assert!(Address::try_from(&[0u8; 33][..]).is_err());
		assert!("not-base58-0OIl".parse::<Address>().is_err());
	}

	#[test]
	fn test_program_address_is_deterministic_and_off_curve() {
		let program = Address([9u8; 32]);
		let seed = &b"withdraw_approval"[..];
		let (first, bump) = Address::find_program_address(&[seed, &[1u8; 32]], &program).unwrap();
		let (second, bump_again) =
			Address::find_program_address(&[seed, &[1u8; 32]], &program).unwrap();

		assert_eq!(first, second);
		assert_eq!(bump, bump_again);
		assert!(!first.is_on_curve());

		let recreated =
			Address::create_program_address(&[seed, &[1u8; 32], &[bump]], &program).unwrap();
		assert_eq!(recreated, first);

		let (other, _) = Address::find_program_address(&[seed, &[2u8; 32]], &program).unwrap();
		assert_ne!(other, first);
	}

	#[test]
	fn test_seed_limits() {
		let program = Address([9u8; 32]);
		let long_seed = [0u8; 33];
		assert_eq!(
			Address::find_program_address(&[&long_seed[..]], &program),
			Err(AddressError::InvalidSeeds)
		);
	}

	#[test]
	fn test_serde_uses_base58() {
		let json = serde_json::to_string(&TOKEN_PROGRAM_ID).unwrap();
		assert_eq!(json, "\"TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA\"");
		let back: Address = serde_json::from_str(&json).unwrap();
		assert_eq!(back, TOKEN_PROGRAM_ID);
	}
}
