//! Withdrawal authorization against the custody program.
//!
//! The [`AuthorizationOrchestrator`] drives one withdrawal end to end: it
//! records the custody administrator's approval on the ledger (once), resolves
//! the coordinating authority's approver and submits the withdraw instruction
//! with the coordinator's signature framed for ledger verification. Message
//! hashing lives in [`codec`], instruction layouts in [`program`].

use thiserror::Error;
use withdraw_account::AccountError;
use withdraw_delivery::DeliveryError;
use withdraw_types::{
	AccountDecodeError, Address, AddressError, EncodingError, SignatureInstructionError,
};

pub mod builder;
pub mod codec;
pub mod orchestrator;
pub mod program;

pub use builder::{BuilderError, OrchestratorBuilder, OrchestratorFactories};
pub use orchestrator::state::{AuthorizationStatus, InvalidTransition};
pub use orchestrator::{
	AuthorizationOrchestrator, AuthorizationSettings, CustodyApproval, WithdrawalOutcome,
};
pub use program::ProgramError;

/// Errors that can occur while authorizing a withdrawal.
#[derive(Debug, Error)]
pub enum AuthorizationError {
	/// A field could not be encoded for hashing.
	#[error(transparent)]
	Encoding(#[from] EncodingError),
	/// A signature-verification instruction could not be framed.
	#[error("Signature instruction error: {0}")]
	Instruction(#[from] SignatureInstructionError),
	/// A ledger account the flow reads does not exist.
	#[error("{role} account {address} not found")]
	AccountNotFound { role: &'static str, address: Address },
	/// A ledger account exists but its data does not decode.
	#[error("Invalid {role} account data: {source}")]
	InvalidAccountData {
		role: &'static str,
		source: AccountDecodeError,
	},
	/// The coordinator account lists no approvers.
	#[error("Coordinator {0} has no approvers configured")]
	NoApproverConfigured(Address),
	/// The supplied coordinator signature does not verify under the approver.
	#[error("Coordinator signature was not produced by approver {approver}")]
	CoordinatorSignatureMismatch { approver: Address },
	/// A program address could not be derived.
	#[error("Address derivation failed: {0}")]
	Address(#[from] AddressError),
	/// A custody program instruction could not be built.
	#[error("Program instruction error: {0}")]
	Program(#[from] ProgramError),
	/// The signing account failed.
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
	/// Network failures and ledger rejections, surfaced unchanged.
	#[error("Transport error: {0}")]
	Transport(#[from] DeliveryError),
	/// The authorization state machine was driven out of order.
	#[error(transparent)]
	InvalidTransition(#[from] InvalidTransition),
}
