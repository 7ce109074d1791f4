//! Instructions of the custody program.
//!
//! Instruction data is an 8-byte discriminator, `sha256("global:<name>")[..8]`,
//! followed by the borsh encoding of the arguments.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use withdraw_types::{
	AccountMeta, Address, AddressError, Instruction, Salt, SYSTEM_PROGRAM_ID,
	SYSVAR_INSTRUCTIONS_ID, TOKEN_PROGRAM_ID,
};

/// Seed prefix of approval record addresses.
pub const APPROVAL_SEED: &[u8] = b"withdraw_approval";

/// Errors that can occur while building custody program instructions.
#[derive(Debug, Error)]
pub enum ProgramError {
	/// A token account address could not be derived.
	#[error("Address derivation failed: {0}")]
	Address(#[from] AddressError),
	/// Instruction arguments could not be serialized.
	#[error("Failed to serialize instruction data: {0}")]
	Serialization(#[from] std::io::Error),
}

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
	let hash = Sha256::digest(format!("global:{}", name).as_bytes());
	let mut out = [0u8; 8];
	out.copy_from_slice(&hash[..8]);
	out
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ApproveWithdrawArgs {
	pub asset: Address,
	pub amount: u64,
	pub recipient: Address,
	/// Custody domain salt the approval was signed under.
	pub salt: Salt,
	/// Custody struct hash; keys the approval record.
	pub withdraw_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WithdrawArgs {
	pub amount: u64,
	pub expires_at: u64,
	/// Coordinator domain salt.
	pub salt: Salt,
	pub withdraw_hash: [u8; 32],
}

/// A decoded custody program instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyInstruction {
	ApproveWithdraw(ApproveWithdrawArgs),
	Withdraw(WithdrawArgs),
}

impl CustodyInstruction {
	pub const APPROVE_WITHDRAW: &'static str = "approve_withdraw";
	pub const WITHDRAW: &'static str = "withdraw";

	pub fn pack(&self) -> std::io::Result<Vec<u8>> {
		let (name, body) = match self {
			Self::ApproveWithdraw(args) => (Self::APPROVE_WITHDRAW, borsh::to_vec(args)?),
			Self::Withdraw(args) => (Self::WITHDRAW, borsh::to_vec(args)?),
		};
		let mut data = instruction_discriminator(name).to_vec();
		data.extend_from_slice(&body);
		Ok(data)
	}

	pub fn unpack(data: &[u8]) -> Result<Self, String> {
		if data.len() < 8 {
			return Err("instruction data too short".into());
		}
		let (tag, mut body) = data.split_at(8);
		if tag == instruction_discriminator(Self::APPROVE_WITHDRAW).as_slice() {
			ApproveWithdrawArgs::deserialize(&mut body)
				.map(Self::ApproveWithdraw)
				.map_err(|e| e.to_string())
		} else if tag == instruction_discriminator(Self::WITHDRAW).as_slice() {
			WithdrawArgs::deserialize(&mut body)
				.map(Self::Withdraw)
				.map_err(|e| e.to_string())
		} else {
			Err("unknown instruction".into())
		}
	}
}

/// Accounts referenced by the withdraw instruction, before token accounts
/// are derived.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawAccounts {
	pub sender: Address,
	pub recipient: Address,
	pub asset: Address,
	pub coordinator: Address,
	pub collateral: Address,
	pub approval_record: Address,
}

/// Builds instructions for one deployment of the custody program.
#[derive(Debug, Clone, Copy)]
pub struct CustodyProgram {
	program_id: Address,
}

impl CustodyProgram {
	pub fn new(program_id: Address) -> Self {
		Self { program_id }
	}

	pub fn program_id(&self) -> &Address {
		&self.program_id
	}

	/// Address of the record tracking approvals of one withdrawal.
	pub fn approval_record_address(
		&self,
		collateral: &Address,
		withdraw_hash: &[u8; 32],
	) -> Result<Address, AddressError> {
		Address::find_program_address(
			&[APPROVAL_SEED, collateral.as_ref(), &withdraw_hash[..]],
			&self.program_id,
		)
		.map(|(address, _bump)| address)
	}

	pub fn approve_withdraw(
		&self,
		sender: Address,
		collateral: Address,
		approval_record: Address,
		args: ApproveWithdrawArgs,
	) -> Result<Instruction, ProgramError> {
		Ok(Instruction {
			program_id: self.program_id,
			accounts: vec![
				AccountMeta::new(sender, true),
				AccountMeta::new_readonly(collateral, false),
				AccountMeta::new(approval_record, false),
				AccountMeta::new_readonly(SYSVAR_INSTRUCTIONS_ID, false),
				AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
			],
			data: CustodyInstruction::ApproveWithdraw(args).pack()?,
		})
	}

	/// The transfer instruction; source and destination are the associated
	/// token accounts of the collateral and the recipient.
	pub fn withdraw(
		&self,
		accounts: &WithdrawAccounts,
		args: WithdrawArgs,
	) -> Result<Instruction, ProgramError> {
		let source = Address::associated_token_address(&accounts.collateral, &accounts.asset)?;
		let destination = Address::associated_token_address(&accounts.recipient, &accounts.asset)?;
		Ok(Instruction {
			program_id: self.program_id,
			accounts: vec![
				AccountMeta::new(accounts.sender, true),
				AccountMeta::new_readonly(accounts.recipient, false),
				AccountMeta::new_readonly(accounts.asset, false),
				AccountMeta::new(source, false),
				AccountMeta::new(destination, false),
				AccountMeta::new_readonly(accounts.coordinator, false),
				AccountMeta::new(accounts.collateral, false),
				AccountMeta::new(accounts.approval_record, false),
				AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
				AccountMeta::new_readonly(SYSVAR_INSTRUCTIONS_ID, false),
				AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
			],
			data: CustodyInstruction::Withdraw(args).pack()?,
		})
	}
}
