//! Authorization flow for one withdrawal.
//!
//! A withdrawal needs two approvals. The custody administrator (the configured
//! account) approves first; that approval is persisted on the ledger in an
//! approval record and is submitted at most once per withdrawal. The
//! coordinating authority approves off-ledger: its signature arrives with the
//! request and is framed into the withdraw transaction so the ledger can verify
//! it.

use crate::codec::{digest_preimage_hex, CoordinatorCodec, CustodyCodec, WithdrawFields};
use crate::program::{ApproveWithdrawArgs, CustodyProgram, WithdrawAccounts, WithdrawArgs};
use crate::AuthorizationError;
use std::sync::Arc;
use tracing::instrument;
use withdraw_account::AccountService;
use withdraw_config::AuthorizationConfig;
use withdraw_delivery::{DeliveryError, DeliveryService};
use withdraw_types::{
	new_ed25519_instruction, truncate_id, Address, ApprovalRecord, CollateralAccount,
	CoordinatorAccount, LedgerAccount, Salt, SignatureEntry, Transaction,
	TransactionHash, TransactionReceipt, WithdrawParams,
};

pub mod state;

use state::{AuthorizationStateMachine, AuthorizationStatus};

/// Immutable settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct AuthorizationSettings {
	pub program_id: Address,
	pub max_signatures: usize,
	pub verify_coordinator_signer: bool,
	pub duplicate_approval_markers: Vec<String>,
}

impl From<&AuthorizationConfig> for AuthorizationSettings {
	fn from(config: &AuthorizationConfig) -> Self {
		Self {
			program_id: config.program_id,
			max_signatures: config.max_signatures,
			verify_coordinator_signer: config.verify_coordinator_signer,
			duplicate_approval_markers: config.duplicate_approval_markers.clone(),
		}
	}
}

/// How the custody approval step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyApproval {
	/// The approval record already listed the sender; nothing was submitted.
	AlreadyRecorded,
	/// The approval transaction was confirmed.
	Submitted(TransactionHash),
	/// The ledger rejected the approval as a duplicate of one recorded
	/// concurrently.
	DuplicateIgnored { reason: String },
}

/// Result of a successful authorization.
#[derive(Debug, Clone)]
pub struct WithdrawalOutcome {
	pub approval_record: Address,
	pub custody_approval: CustodyApproval,
	pub withdraw_signature: TransactionHash,
	pub receipt: TransactionReceipt,
	pub history: Vec<AuthorizationStatus>,
}

/// Everything derived from the request before the first submission.
struct PreparedWithdrawal {
	sender: Address,
	collateral: CollateralAccount,
	fields: WithdrawFields,
	withdraw_hash: [u8; 32],
	custody_salt: Salt,
	custody_digest: [u8; 32],
	coordinator_digest: [u8; 32],
}

/// Drives the two-approval withdrawal flow against the custody program.
pub struct AuthorizationOrchestrator {
	settings: AuthorizationSettings,
	program: CustodyProgram,
	account: Arc<AccountService>,
	delivery: Arc<DeliveryService>,
}

impl AuthorizationOrchestrator {
	pub fn new(
		settings: AuthorizationSettings,
		account: Arc<AccountService>,
		delivery: Arc<DeliveryService>,
	) -> Self {
		Self {
			program: CustodyProgram::new(settings.program_id),
			settings,
			account,
			delivery,
		}
	}

	pub fn settings(&self) -> &AuthorizationSettings {
		&self.settings
	}

	/// Authorizes and submits one withdrawal.
	///
	/// Safe to retry: a custody approval that is already recorded is not
	/// submitted again.
	#[instrument(skip_all, fields(
		collateral = %params.collateral_proxy,
		asset = %params.asset,
		amount = params.amount,
	))]
	pub async fn authorize_withdrawal(
		&self,
		params: &WithdrawParams,
	) -> Result<WithdrawalOutcome, AuthorizationError> {
		let mut machine = AuthorizationStateMachine::new();
		match self.run(params, &mut machine).await {
			Ok(outcome) => Ok(outcome),
			Err(e) => {
				machine.fail(e.to_string());
				Err(e)
			},
		}
	}

	async fn run(
		&self,
		params: &WithdrawParams,
		machine: &mut AuthorizationStateMachine,
	) -> Result<WithdrawalOutcome, AuthorizationError> {
		let prepared = self.prepare(params).await?;

		let approval_record = self
			.program
			.approval_record_address(&params.collateral_proxy, &prepared.withdraw_hash)?;
		let already_recorded = self
			.has_recorded_approval(&approval_record, &prepared.sender)
			.await?;
		machine.transition(AuthorizationStatus::CustodyApprovalChecked)?;

		let custody_approval = if already_recorded {
			tracing::info!(
				approval_record = %approval_record,
				"Custody approval already recorded, skipping submission"
			);
			CustodyApproval::AlreadyRecorded
		} else {
			let approval = self
				.submit_custody_approval(params, &prepared, approval_record)
				.await?;
			if let CustodyApproval::Submitted(_) = approval {
				machine.transition(AuthorizationStatus::CustodyApprovalSubmitted)?;
			}
			approval
		};

		let approver = self.resolve_approver(&prepared.collateral.coordinator).await?;
		machine.transition(AuthorizationStatus::CoordinatorResolved)?;

		let entry = SignatureEntry::new(
			approver,
			&params.coordinator_signature,
			&prepared.coordinator_digest,
		)?;
		if self.settings.verify_coordinator_signer && !entry.verify() {
			return Err(AuthorizationError::CoordinatorSignatureMismatch { approver });
		}

		let verify = new_ed25519_instruction(&[entry], self.settings.max_signatures)?;
		let withdraw = self.program.withdraw(
			&WithdrawAccounts {
				sender: prepared.sender,
				recipient: params.recipient,
				asset: params.asset,
				coordinator: prepared.collateral.coordinator,
				collateral: params.collateral_proxy,
				approval_record,
			},
			WithdrawArgs {
				amount: prepared.fields.amount,
				expires_at: prepared.fields.expires_at,
				salt: params.salt,
				withdraw_hash: prepared.withdraw_hash,
			},
		)?;

		let withdraw_signature = self
			.delivery
			.deliver(Transaction::new(prepared.sender, vec![verify, withdraw]))
			.await?;
		machine.transition(AuthorizationStatus::TransactionSubmitted)?;
		tracing::info!(
			tx_hash = %truncate_id(&withdraw_signature.to_string()),
			"Submitted withdraw transaction"
		);

		let receipt = self.delivery.confirm(&withdraw_signature).await?;
		machine.transition(AuthorizationStatus::Confirmed)?;
		tracing::info!(slot = receipt.slot, "Withdrawal confirmed");

		Ok(WithdrawalOutcome {
			approval_record,
			custody_approval,
			withdraw_signature,
			receipt,
			history: machine.history().to_vec(),
		})
	}

	/// Reads the collateral and hashes both messages.
	async fn prepare(
		&self,
		params: &WithdrawParams,
	) -> Result<PreparedWithdrawal, AuthorizationError> {
		let sender = self.account.get_address().await?;
		let request = params.request();
		let collateral: CollateralAccount = self
			.load_account("collateral", &params.collateral_proxy)
			.await?;

		let fields = WithdrawFields {
			sender,
			collateral: params.collateral_proxy,
			asset: params.asset,
			amount: request.asset_amount(),
			recipient: params.recipient,
			nonce: collateral.admin_funds_nonce,
			expires_at: request.expires_at(),
		};

		let custody_salt = Salt::random();
		let custody = CustodyCodec::new(params.collateral_proxy, custody_salt).digest(&fields)?;
		let coordinator = CoordinatorCodec::new(collateral.coordinator, *request.approval_salt())
			.digest(&fields)?;
		tracing::debug!(
			custody_preimage = %digest_preimage_hex(&custody),
			coordinator_digest = %coordinator.digest,
			"Computed withdrawal digests"
		);

		Ok(PreparedWithdrawal {
			sender,
			collateral,
			fields,
			withdraw_hash: custody.struct_hash.0,
			custody_salt,
			custody_digest: custody.digest.0,
			coordinator_digest: coordinator.digest.0,
		})
	}

	async fn load_account<A: LedgerAccount>(
		&self,
		role: &'static str,
		address: &Address,
	) -> Result<A, AuthorizationError> {
		let data = self
			.delivery
			.fetch_account(address)
			.await?
			.ok_or(AuthorizationError::AccountNotFound {
				role,
				address: *address,
			})?;
		A::decode(&data).map_err(|source| AuthorizationError::InvalidAccountData { role, source })
	}

	async fn has_recorded_approval(
		&self,
		approval_record: &Address,
		sender: &Address,
	) -> Result<bool, AuthorizationError> {
		match self.delivery.fetch_account(approval_record).await? {
			Some(data) => ApprovalRecord::decode(&data)
				.map(|record| record.has_approved(sender))
				.map_err(|source| AuthorizationError::InvalidAccountData {
					role: "approval record",
					source,
				}),
			None => Ok(false),
		}
	}

	async fn submit_custody_approval(
		&self,
		params: &WithdrawParams,
		prepared: &PreparedWithdrawal,
		approval_record: Address,
	) -> Result<CustodyApproval, AuthorizationError> {
		let signature = self.account.sign_message(&prepared.custody_digest).await?;
		let entry = SignatureEntry::new(
			prepared.sender,
			signature.as_bytes(),
			&prepared.custody_digest,
		)?;
		let verify = new_ed25519_instruction(&[entry], self.settings.max_signatures)?;
		let approve = self.program.approve_withdraw(
			prepared.sender,
			params.collateral_proxy,
			approval_record,
			ApproveWithdrawArgs {
				asset: params.asset,
				amount: prepared.fields.amount,
				recipient: params.recipient,
				salt: prepared.custody_salt,
				withdraw_hash: prepared.withdraw_hash,
			},
		)?;

		match self
			.delivery
			.deliver_and_confirm(Transaction::new(prepared.sender, vec![verify, approve]))
			.await
		{
			Ok(receipt) => {
				tracing::info!(
					tx_hash = %truncate_id(&receipt.hash.to_string()),
					"Custody approval recorded"
				);
				Ok(CustodyApproval::Submitted(receipt.hash))
			},
			Err(DeliveryError::TransactionFailed(reason))
				if self.is_duplicate_approval(&reason) =>
			{
				// The marker alone does not say whose approval is recorded.
				if self
					.has_recorded_approval(&approval_record, &prepared.sender)
					.await?
				{
					tracing::warn!(reason = %reason, "Custody approval already exists, continuing");
					Ok(CustodyApproval::DuplicateIgnored { reason })
				} else {
					tracing::error!(
						reason = %reason,
						approval_record = %approval_record,
						"Approval rejected as duplicate but record does not list the sender"
					);
					Err(DeliveryError::TransactionFailed(reason).into())
				}
			},
			Err(e) => Err(e.into()),
		}
	}

	fn is_duplicate_approval(&self, reason: &str) -> bool {
		self.settings
			.duplicate_approval_markers
			.iter()
			.any(|marker| !marker.is_empty() && reason.contains(marker.as_str()))
	}

	async fn resolve_approver(&self, coordinator: &Address) -> Result<Address, AuthorizationError> {
		let account: CoordinatorAccount = self.load_account("coordinator", coordinator).await?;
		account
			.first_approver()
			.copied()
			.ok_or(AuthorizationError::NoApproverConfigured(*coordinator))
	}
}
