//! Progress tracking for one authorization attempt.
//!
//! Valid lifecycle: Start -> CustodyApprovalChecked -> [CustodyApprovalSubmitted]
//! -> CoordinatorResolved -> TransactionSubmitted -> Confirmed. Any non-terminal
//! state may move to Failed.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationStatus {
	Start,
	CustodyApprovalChecked,
	CustodyApprovalSubmitted,
	CoordinatorResolved,
	TransactionSubmitted,
	Confirmed,
	Failed(String),
}

impl AuthorizationStatus {
	fn kind(&self) -> StatusKind {
		match self {
			Self::Start => StatusKind::Start,
			Self::CustodyApprovalChecked => StatusKind::CustodyApprovalChecked,
			Self::CustodyApprovalSubmitted => StatusKind::CustodyApprovalSubmitted,
			Self::CoordinatorResolved => StatusKind::CoordinatorResolved,
			Self::TransactionSubmitted => StatusKind::TransactionSubmitted,
			Self::Confirmed => StatusKind::Confirmed,
			Self::Failed(_) => StatusKind::Failed,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Confirmed | Self::Failed(_))
	}
}

impl fmt::Display for AuthorizationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Failed(reason) => write!(f, "Failed({})", reason),
			other => write!(f, "{:?}", other.kind()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StatusKind {
	Start,
	CustodyApprovalChecked,
	CustodyApprovalSubmitted,
	CoordinatorResolved,
	TransactionSubmitted,
	Confirmed,
	Failed,
}

static TRANSITIONS: Lazy<HashMap<StatusKind, HashSet<StatusKind>>> = Lazy::new(|| {
	use StatusKind::*;

	let mut m = HashMap::new();
	m.insert(Start, HashSet::from([CustodyApprovalChecked, Failed]));
	m.insert(
		CustodyApprovalChecked,
		HashSet::from([CustodyApprovalSubmitted, CoordinatorResolved, Failed]),
	);
	m.insert(
		CustodyApprovalSubmitted,
		HashSet::from([CoordinatorResolved, Failed]),
	);
	m.insert(CoordinatorResolved, HashSet::from([TransactionSubmitted, Failed]));
	m.insert(TransactionSubmitted, HashSet::from([Confirmed, Failed]));
	m.insert(Confirmed, HashSet::new());
	m.insert(Failed, HashSet::new());
	m
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid state transition from {from} to {to}")]
pub struct InvalidTransition {
	pub from: AuthorizationStatus,
	pub to: AuthorizationStatus,
}

/// Current status plus every status visited, in order.
#[derive(Debug, Clone)]
pub struct AuthorizationStateMachine {
	history: Vec<AuthorizationStatus>,
}

impl Default for AuthorizationStateMachine {
	fn default() -> Self {
		Self::new()
	}
}

impl AuthorizationStateMachine {
	pub fn new() -> Self {
		Self {
			history: vec![AuthorizationStatus::Start],
		}
	}

	pub fn status(&self) -> &AuthorizationStatus {
		// history is never empty
		&self.history[self.history.len() - 1]
	}

	pub fn history(&self) -> &[AuthorizationStatus] {
		&self.history
	}

	fn is_valid_transition(from: &AuthorizationStatus, to: &AuthorizationStatus) -> bool {
		TRANSITIONS
			.get(&from.kind())
			.is_some_and(|allowed| allowed.contains(&to.kind()))
	}

	pub fn transition(&mut self, to: AuthorizationStatus) -> Result<(), InvalidTransition> {
		let from = self.status().clone();
		if !Self::is_valid_transition(&from, &to) {
			return Err(InvalidTransition { from, to });
		}
		tracing::info!(from = %from, to = %to, "Authorization state changed");
		self.history.push(to);
		Ok(())
	}

	/// Moves to `Failed` unless already terminal.
	pub fn fail(&mut self, reason: impl Into<String>) {
		if !self.status().is_terminal() {
			let reason = reason.into();
			tracing::warn!(from = %self.status(), reason = %reason, "Authorization failed");
			self.history.push(AuthorizationStatus::Failed(reason));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use AuthorizationStatus::*;

	#[test]
	fn test_happy_path_with_submission() {
		let mut machine = AuthorizationStateMachine::new();
		for next in [
			CustodyApprovalChecked,
			CustodyApprovalSubmitted,
			CoordinatorResolved,
			TransactionSubmitted,
			Confirmed,
		] {
			machine.transition(next).unwrap();
		}
		assert_eq!(machine.status(), &Confirmed);
		assert_eq!(machine.history().len(), 6);
	}

	#[test]
	fn test_submission_step_is_optional() {
		let mut machine = AuthorizationStateMachine::new();
		machine.transition(CustodyApprovalChecked).unwrap();
		machine.transition(CoordinatorResolved).unwrap();
		assert_eq!(machine.status(), &CoordinatorResolved);
	}

	#[test]
	fn test_invalid_transitions() {
		let mut machine = AuthorizationStateMachine::new();
		assert_eq!(
			machine.transition(TransactionSubmitted),
			Err(InvalidTransition {
				from: Start,
				to: TransactionSubmitted
			})
		);
		machine.transition(CustodyApprovalChecked).unwrap();
		assert!(machine.transition(Start).is_err());
		assert!(machine.transition(Confirmed).is_err());
	}

	#[test]
	fn test_failure_is_terminal() {
		let mut machine = AuthorizationStateMachine::new();
		machine.transition(CustodyApprovalChecked).unwrap();
		machine.fail("ledger unavailable");
		assert_eq!(machine.status(), &Failed("ledger unavailable".into()));

		machine.fail("again");
		assert_eq!(machine.history().len(), 3);
		assert!(machine.transition(CoordinatorResolved).is_err());
	}
}
