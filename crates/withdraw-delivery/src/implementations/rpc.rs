//! JSON-RPC ledger transport.
//!
//! Talks to a ledger node over HTTP using `getAccountInfo`,
//! `getLatestBlockhash`, `sendTransaction` and `getSignatureStatuses`.
//! Account data and transactions travel base64 encoded; addresses, blockhashes
//! and signatures as base58.

use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use withdraw_types::{
	Address, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SignedTransaction,
	TransactionHash, TransactionReceipt, ValidationError,
};

const COMMITMENTS: [&str; 3] = ["processed", "confirmed", "finalized"];

/// JSON-RPC client for one ledger endpoint.
pub struct RpcDelivery {
	client: reqwest::Client,
	url: String,
	commitment: String,
	request_id: AtomicU64,
}

impl RpcDelivery {
	pub fn new(
		url: impl Into<String>,
		commitment: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, DeliveryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Network(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			url: url.into(),
			commitment: commitment.into(),
			request_id: AtomicU64::new(1),
		})
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, DeliveryError> {
		let id = self.request_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

		tracing::trace!(method, id, "Sending RPC request");
		let response: Value = self
			.client
			.post(&self.url)
			.json(&body)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(format!("{} request failed: {}", method, e)))?
			.json()
			.await
			.map_err(|e| DeliveryError::Network(format!("{} response unreadable: {}", method, e)))?;

		parse_response(method, response)
	}
}

/// Splits a JSON-RPC envelope into its result or a typed error.
fn parse_response(method: &str, mut response: Value) -> Result<Value, DeliveryError> {
	if let Some(error) = response.get("error") {
		let message = error
			.get("message")
			.and_then(Value::as_str)
			.unwrap_or("unknown RPC error");
		let logs: Vec<&str> = error
			.pointer("/data/logs")
			.and_then(Value::as_array)
			.map(|logs| logs.iter().filter_map(Value::as_str).collect())
			.unwrap_or_default();
		let reason = if logs.is_empty() {
			message.to_string()
		} else {
			format!("{}; logs: {}", message, logs.join(" | "))
		};
		return Err(DeliveryError::TransactionFailed(reason));
	}
	response
		.get_mut("result")
		.map(Value::take)
		.ok_or_else(|| DeliveryError::Network(format!("{} response has no result", method)))
}

fn parse_account_info(result: &Value) -> Result<Option<Vec<u8>>, DeliveryError> {
	let value = &result["value"];
	if value.is_null() {
		return Ok(None);
	}
	let encoded = value
		.pointer("/data/0")
		.and_then(Value::as_str)
		.ok_or_else(|| DeliveryError::Network("account data missing".into()))?;
	base64::engine::general_purpose::STANDARD
		.decode(encoded)
		.map(Some)
		.map_err(|e| DeliveryError::Network(format!("account data is not base64: {}", e)))
}

fn decode_base58<const N: usize>(what: &str, input: &str) -> Result<[u8; N], DeliveryError> {
	let bytes = bs58::decode(input)
		.into_vec()
		.map_err(|e| DeliveryError::Network(format!("invalid {}: {}", what, e)))?;
	let len = bytes.len();
	bytes
		.try_into()
		.map_err(|_| DeliveryError::Network(format!("invalid {}: {} bytes", what, len)))
}

fn parse_signature_status(
	hash: &TransactionHash,
	result: &Value,
	commitment: &str,
) -> Option<TransactionReceipt> {
	let status = result.pointer("/value/0").filter(|s| !s.is_null())?;
	let reached = status
		.get("confirmationStatus")
		.and_then(Value::as_str)
		.and_then(|s| COMMITMENTS.iter().position(|c| *c == s))
		.unwrap_or(0);
	let required = COMMITMENTS
		.iter()
		.position(|c| *c == commitment)
		.unwrap_or(1);

	let error = status.get("err").filter(|e| !e.is_null()).map(Value::to_string);
	// Failures are final at any commitment level.
	if error.is_none() && reached < required {
		return None;
	}
	Some(TransactionReceipt {
		hash: hash.clone(),
		slot: status.get("slot").and_then(Value::as_u64).unwrap_or_default(),
		success: error.is_none(),
		error,
	})
}

#[async_trait]
impl DeliveryInterface for RpcDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcDeliverySchema)
	}

	async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, DeliveryError> {
		let result = self
			.call(
				"getAccountInfo",
				json!([
					address.to_string(),
					{ "encoding": "base64", "commitment": self.commitment }
				]),
			)
			.await?;
		parse_account_info(&result)
	}

	async fn get_latest_blockhash(&self) -> Result<[u8; 32], DeliveryError> {
		let result = self
			.call(
				"getLatestBlockhash",
				json!([{ "commitment": self.commitment }]),
			)
			.await?;
		let blockhash = result
			.pointer("/value/blockhash")
			.and_then(Value::as_str)
			.ok_or_else(|| DeliveryError::Network("blockhash missing".into()))?;
		decode_base58::<32>("blockhash", blockhash)
	}

	async fn submit(&self, tx: SignedTransaction) -> Result<TransactionHash, DeliveryError> {
		let encoded = base64::engine::general_purpose::STANDARD.encode(tx.serialize());
		let result = self
			.call(
				"sendTransaction",
				json!([encoded, { "encoding": "base64", "preflightCommitment": self.commitment }]),
			)
			.await?;
		let signature = result
			.as_str()
			.ok_or_else(|| DeliveryError::Network("transaction signature missing".into()))?;
		let bytes = decode_base58::<64>("transaction signature", signature)?;
		Ok(TransactionHash(bytes.to_vec()))
	}

	async fn get_status(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let result = self
			.call(
				"getSignatureStatuses",
				json!([[hash.to_string()], { "searchTransactionHistory": true }]),
			)
			.await?;
		Ok(parse_signature_status(hash, &result, &self.commitment))
	}
}

pub struct RpcDeliverySchema;

impl ConfigSchema for RpcDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("rpc_url", FieldType::Url)],
			vec![
				Field::new("commitment", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(c) if COMMITMENTS.contains(&c) => Ok(()),
						_ => Err(format!("must be one of {:?}", COMMITMENTS)),
					}
				}),
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(300_000),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Builds an [`RpcDelivery`] from its configuration table.
///
/// Required: `rpc_url`. Optional: `commitment` (default `confirmed`),
/// `timeout_ms` (default 30000).
pub fn create_rpc_delivery(
	config: &toml::Value,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	RpcDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::Network(format!("Invalid RPC config: {}", e)))?;

	let url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Network("rpc_url is required".into()))?;
	let commitment = config
		.get("commitment")
		.and_then(|v| v.as_str())
		.unwrap_or("confirmed");
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(30_000) as u64;

	Ok(Box::new(RpcDelivery::new(
		url,
		commitment,
		Duration::from_millis(timeout_ms),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "rpc";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_rpc_delivery
	}
}

impl DeliveryRegistry for Registry {}
