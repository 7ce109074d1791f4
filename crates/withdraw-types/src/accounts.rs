//! On-ledger account shapes read by the authorizer.
//!
//! The custody program stores each account as an 8-byte discriminator
//! (`sha256("account:<Name>")[..8]`) followed by the borsh encoding of its
//! fields. Accounts may be over-allocated, so trailing bytes are ignored.

use crate::address::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use thiserror::Error;

/// Length of the account discriminator prefix.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Errors that can occur while decoding account data.
#[derive(Debug, Error)]
pub enum AccountDecodeError {
	/// The data is shorter than the discriminator.
	#[error("Account data too short: expected at least {expected} bytes, got {actual}")]
	TooShort { expected: usize, actual: usize },
	/// The data belongs to a different account type.
	#[error("Discriminator mismatch for {0} account")]
	DiscriminatorMismatch(&'static str),
	/// The body after the discriminator does not decode.
	#[error("Failed to decode {account} account: {reason}")]
	Layout {
		account: &'static str,
		reason: String,
	},
}

/// An account type owned by the custody program.
pub trait LedgerAccount: BorshSerialize + BorshDeserialize {
	/// Account type name used for the discriminator.
	const NAME: &'static str;

	fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
		let hash = Sha256::digest(format!("account:{}", Self::NAME).as_bytes());
		let mut out = [0u8; DISCRIMINATOR_LEN];
		out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
		out
	}

	/// Decodes raw account data, checking the discriminator first.
	fn decode(data: &[u8]) -> Result<Self, AccountDecodeError> {
		if data.len() < DISCRIMINATOR_LEN {
			return Err(AccountDecodeError::TooShort {
				expected: DISCRIMINATOR_LEN,
				actual: data.len(),
			});
		}
		let (prefix, mut body) = data.split_at(DISCRIMINATOR_LEN);
		if prefix != Self::discriminator().as_slice() {
			return Err(AccountDecodeError::DiscriminatorMismatch(Self::NAME));
		}
		Self::deserialize(&mut body).map_err(|e| AccountDecodeError::Layout {
			account: Self::NAME,
			reason: e.to_string(),
		})
	}

	/// Encodes the account as the program would store it.
	fn to_account_data(&self) -> std::io::Result<Vec<u8>> {
		let mut data = Self::discriminator().to_vec();
		self.serialize(&mut data)?;
		Ok(data)
	}
}

/// Collateral account a withdrawal draws from.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CollateralAccount {
	/// Custody administrator of the collateral.
	pub authority: Address,
	/// Coordinating authority whose approver co-signs withdrawals.
	pub coordinator: Address,
	/// Nonce bound into admin-approved withdrawals.
	pub admin_funds_nonce: u64,
}

impl LedgerAccount for CollateralAccount {
	const NAME: &'static str = "Collateral";
}

/// Coordinating authority with its ordered list of approvers.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CoordinatorAccount {
	pub approvers: Vec<Address>,
}

impl CoordinatorAccount {
	/// The approver used as the verification signer.
	pub fn first_approver(&self) -> Option<&Address> {
		self.approvers.first()
	}
}

impl LedgerAccount for CoordinatorAccount {
	const NAME: &'static str = "Coordinator";
}

/// Record of the authorities that already approved one withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ApprovalRecord {
	pub signers: BTreeSet<Address>,
}

impl ApprovalRecord {
	pub fn new(signers: impl IntoIterator<Item = Address>) -> Self {
		Self {
			signers: signers.into_iter().collect(),
		}
	}

	pub fn has_approved(&self, signer: &Address) -> bool {
		self.signers.contains(signer)
	}

	/// Adds a signer; returns false if it was already present.
	pub fn insert(&mut self, signer: Address) -> bool {
		self.signers.insert(signer)
	}
}

impl LedgerAccount for ApprovalRecord {
	const NAME: &'static str = "WithdrawApproval";
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collateral_layout() {
		let account = CollateralAccount {
			authority: Address([1; 32]),
			coordinator: Address([2; 32]),
			admin_funds_nonce: 42,
		};
		let data = account.to_account_data().unwrap();
		assert_eq!(data.len(), 8 + 32 + 32 + 8);
		assert_eq!(&data[..8], &CollateralAccount::discriminator());
		assert_eq!(&data[72..80], &42u64.to_le_bytes());

		let decoded = CollateralAccount::decode(&data).unwrap();
		assert_eq!(decoded, account);
	}

	#[test]
	fn test_trailing_bytes_are_ignored() {
		let account = CoordinatorAccount {
			approvers: vec![Address([7; 32]), Address([8; 32])],
		};
		let mut data = account.to_account_data().unwrap();
		data.extend_from_slice(&[0u8; 64]);
		let decoded = CoordinatorAccount::decode(&data).unwrap();
		assert_eq!(decoded.first_approver(), Some(&Address([7; 32])));
	}

	#[test]
	fn test_discriminator_mismatch() {
		let data = CoordinatorAccount { approvers: vec![] }.to_account_data().unwrap();
		assert!(matches!(
			CollateralAccount::decode(&data),
			Err(AccountDecodeError::DiscriminatorMismatch("Collateral"))
		));
		assert!(matches!(
			ApprovalRecord::decode(&[0u8; 4]),
			Err(AccountDecodeError::TooShort { .. })
		));
	}

	#[test]
	fn test_truncated_body() {
		let mut data = CollateralAccount::discriminator().to_vec();
		data.extend_from_slice(&[0u8; 10]);
		assert!(matches!(
			CollateralAccount::decode(&data),
			Err(AccountDecodeError::Layout { .. })
		));
	}

	#[test]
	fn test_approval_record_membership() {
		let mut record = ApprovalRecord::new([Address([1; 32])]);
		assert!(record.has_approved(&Address([1; 32])));
		assert!(!record.has_approved(&Address([2; 32])));
		assert!(record.insert(Address([2; 32])));
		assert!(!record.insert(Address([2; 32])));

		let decoded = ApprovalRecord::decode(&record.to_account_data().unwrap()).unwrap();
		assert_eq!(decoded, record);
	}

	#[test]
	fn test_empty_approver_list_decodes() {
		let data = CoordinatorAccount { approvers: vec![] }.to_account_data().unwrap();
		let decoded = CoordinatorAccount::decode(&data).unwrap();
		assert!(decoded.first_approver().is_none());
	}
}
