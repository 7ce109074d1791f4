//! Schema checks for per-implementation configuration tables.
//!
//! Each account and delivery backend describes the TOML table it expects as a
//! [`Schema`]; the configuration loader and the builder run it before handing
//! the table to the backend's factory.

use crate::address::Address;
use crate::utils::without_0x_prefix;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while validating a configuration table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	/// A required field is absent.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has the right type but an unacceptable value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has a different TOML type than the schema expects.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	/// The configuration could not be deserialized after validation.
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	fn nested(self, parent: &str) -> Self {
		match self {
			Self::MissingField(f) => Self::MissingField(format!("{parent}.{f}")),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: format!("{parent}.{field}"),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: format!("{parent}.{field}"),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// Expected shape of a configuration value.
#[derive(Debug)]
pub enum FieldType {
	/// Any string.
	String,
	/// An integer, optionally bounded on either side (inclusive).
	Integer { min: Option<i64>, max: Option<i64> },
	/// A boolean.
	Boolean,
	/// A base58 ledger address.
	Address,
	/// A hex string (optional `0x`) decoding to one of the given byte lengths.
	HexBytes(&'static [usize]),
	/// An http(s) URL.
	Url,
	/// An array whose elements all have the given type.
	Array(Box<FieldType>),
	/// A nested table validated against its own schema.
	Table(Schema),
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a check that runs after the type check passes.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of one TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message: message.into(),
	}
}

fn check_type(
	field: &str,
	value: &toml::Value,
	expected: &FieldType,
) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(field, "string", value))?;
		},
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(field, "integer", value))?;
			if let Some(min) = min.filter(|min| n < *min) {
				return Err(invalid(field, format!("Value {n} is less than minimum {min}")));
			}
			if let Some(max) = max.filter(|max| n > *max) {
				return Err(invalid(field, format!("Value {n} is greater than maximum {max}")));
			}
		},
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(field, "boolean", value))?;
		},
		FieldType::Address => {
			let s = value.as_str().ok_or_else(|| mismatch(field, "string", value))?;
			Address::from_str(s).map_err(|e| invalid(field, e.to_string()))?;
		},
		FieldType::HexBytes(lengths) => {
			let s = value.as_str().ok_or_else(|| mismatch(field, "string", value))?;
			let bytes = hex::decode(without_0x_prefix(s.trim()))
				.map_err(|e| invalid(field, e.to_string()))?;
			if !lengths.contains(&bytes.len()) {
				return Err(invalid(
					field,
					format!("expected {lengths:?} bytes, got {}", bytes.len()),
				));
			}
		},
		FieldType::Url => {
			let s = value.as_str().ok_or_else(|| mismatch(field, "string", value))?;
			if !(s.starts_with("http://") || s.starts_with("https://")) {
				return Err(invalid(field, "must start with http:// or https://"));
			}
		},
		FieldType::Array(inner) => {
			let items = value
				.as_array()
				.ok_or_else(|| mismatch(field, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{field}[{i}]"), item, inner)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested(field))?;
		},
	}
	Ok(())
}

/// Validates the TOML table of one backend implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Schema {
		Schema::new(
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new("private_key", FieldType::HexBytes(&[32, 64])),
			],
			vec![
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(60_000),
					},
				),
				Field::new("program", FieldType::Address),
				Field::new(
					"commitment",
					FieldType::String,
				)
				.with_validator(|v| match v.as_str() {
					Some("processed" | "confirmed" | "finalized") => Ok(()),
					_ => Err("unknown commitment".to_string()),
				}),
				Field::new(
					"nested",
					FieldType::Table(Schema::new(
						vec![Field::new("flag", FieldType::Boolean)],
						vec![],
					)),
				),
			],
		)
	}

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_valid_table() {
		let config = parse(&format!(
			r#"
			rpc_url = "http://localhost:8899"
			private_key = "0x{}"
			timeout_ms = 500
			program = "11111111111111111111111111111111"
			commitment = "confirmed"
			nested = {{ flag = true }}
			"#,
			"ab".repeat(32)
		));
		schema().validate(&config).unwrap();
	}

	#[test]
	fn test_failures() {
		let key = "ab".repeat(32);

		let missing = parse(r#"rpc_url = "http://x""#);
		assert_eq!(
			schema().validate(&missing),
			Err(ValidationError::MissingField("private_key".into()))
		);

		let short_key = parse(r#"rpc_url = "http://x"
private_key = "abcd""#);
		assert!(matches!(
			schema().validate(&short_key),
			Err(ValidationError::InvalidValue { field, .. }) if field == "private_key"
		));

		let bad_url = parse(&format!("rpc_url = \"ws://x\"\nprivate_key = \"{key}\""));
		assert!(matches!(
			schema().validate(&bad_url),
			Err(ValidationError::InvalidValue { .. })
		));

		let out_of_range = parse(&format!(
			"rpc_url = \"http://x\"\nprivate_key = \"{key}\"\ntimeout_ms = 0"
		));
		assert!(schema().validate(&out_of_range).is_err());

		let bad_commitment = parse(&format!(
			"rpc_url = \"http://x\"\nprivate_key = \"{key}\"\ncommitment = \"fast\""
		));
		assert!(schema().validate(&bad_commitment).is_err());

		let nested = parse(&format!(
			"rpc_url = \"http://x\"\nprivate_key = \"{key}\"\nnested = {{ flag = 1 }}"
		));
		assert!(matches!(
			schema().validate(&nested),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "nested.flag"
		));

		let bad_address = parse(&format!(
			"rpc_url = \"http://x\"\nprivate_key = \"{key}\"\nprogram = \"0OIl\""
		));
		assert!(schema().validate(&bad_address).is_err());
	}
}
