//! Self-registration of pluggable backends.

/// Implemented by every account and delivery backend module so the binary can
/// map configuration names to factory functions.
pub trait ImplementationRegistry {
	/// Key of the backend under `[account.implementations]` or
	/// `[delivery.implementations]`, e.g. `"local"` or `"rpc"`.
	const NAME: &'static str;

	/// Factory signature of the backend family.
	type Factory;

	fn factory() -> Self::Factory;
}
