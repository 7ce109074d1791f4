//! Common types module for the withdrawal authorizer.
//!
//! This crate defines the data types shared by every other crate in the
//! workspace: ledger addresses, the account shapes the authorizer reads,
//! transaction wire types, and the low-level encoders that the message codec
//! and the signature-verification framing are built on.

/// On-ledger account shapes read by the authorizer.
pub mod accounts;
/// 32-byte ledger addresses and program-derived address derivation.
pub mod address;
/// Transaction delivery types (transaction ids and receipts).
pub mod delivery;
/// Ed25519 signature-verification instruction framing.
pub mod ed25519;
/// Instructions, messages and the transaction wire format.
pub mod instruction;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Withdrawal request and inbound parameter types.
pub mod request;
/// Zeroizing string wrapper for key material.
pub mod secret_string;
/// Hex encoding, hashing and formatting helpers.
pub mod utils;
/// Configuration validation types for backend-specific TOML tables.
pub mod validation;

pub use accounts::{
	AccountDecodeError, ApprovalRecord, CollateralAccount, CoordinatorAccount, LedgerAccount,
};
pub use address::{
	Address, AddressError, ASSOCIATED_TOKEN_PROGRAM_ID, ED25519_PROGRAM_ID, SYSTEM_PROGRAM_ID,
	SYSVAR_INSTRUCTIONS_ID, TOKEN_PROGRAM_ID,
};
pub use delivery::{Signature, TransactionHash, TransactionReceipt};
pub use ed25519::{
	new_ed25519_instruction, parse_ed25519_instruction, verify_ed25519_instruction,
	Ed25519InstructionBuilder, SignatureEntry, SignatureInstructionError,
};
pub use instruction::{
	AccountMeta, CompiledInstruction, Instruction, Message, MessageHeader, SignedTransaction,
	Transaction, TransactionError,
};
pub use registry::ImplementationRegistry;
pub use request::{Salt, WithdrawParams, WithdrawRequest};
pub use secret_string::SecretString;
pub use utils::{truncate_id, without_0x_prefix, EncodingError, HexEncoder};
pub use validation::*;
