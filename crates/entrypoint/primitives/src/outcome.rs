use alloy_primitives::{Address, Bytes, B256, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selector::SkipReason;

/// Opaque handle to a ledger snapshot.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("snapshot#{_0}")]
pub struct SnapshotId(pub u64);

/// What phase 1 recorded for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Position of the operation in its bundle.
    pub index: usize,
    pub operation_hash: B256,
    /// Gas charged, including the fixed per-operation overhead.
    pub gas_used: u64,
    /// `gas_used * gas_price`.
    pub fee: U256,
    pub success: bool,
    /// Revert payload, if the operation's handler reverted explicitly.
    pub revert_reason: Option<Bytes>,
    pub snapshot_before: SnapshotId,
    pub snapshot_after: SnapshotId,
}

/// Position of an operation in the post-execution validation state machine.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Pending,
    SelectorChecked,
    Skipped,
    Invoked,
    Passed,
    Failed,
    Finalized,
}

impl ValidationState {
    /// Whether `next` directly follows `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::SelectorChecked)
                | (Self::SelectorChecked, Self::Skipped)
                | (Self::SelectorChecked, Self::Invoked)
                | (Self::Invoked, Self::Passed)
                | (Self::Invoked, Self::Failed)
                | (Self::Skipped, Self::Finalized)
                | (Self::Passed, Self::Finalized)
        )
    }
}

/// Why an invoked validation callback did not pass. All of these are fatal to the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("post-execution validation reverted: {reason}")]
    Failed { reason: Bytes },
    #[error("{account} does not expose a post-execution validation entry point")]
    Unreachable { account: Address },
    #[error("post-execution validation exceeded its gas limit of {limit}")]
    ResourceExceeded { limit: u64 },
}

/// What phase 2 recorded for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub index: usize,
    pub operation_hash: B256,
    pub state: ValidationState,
    pub selector_matched: bool,
    pub validation_invoked: bool,
    /// Only meaningful when `validation_invoked` is set.
    pub validation_passed: bool,
    /// Gas consumed by the callback.
    pub gas_used: u64,
    pub revert_reason: Option<Bytes>,
    pub skip_reason: Option<SkipReason>,
    pub failure: Option<ValidationError>,
}

impl ValidationOutcome {
    pub const fn pending(index: usize, operation_hash: B256) -> Self {
        Self {
            index,
            operation_hash,
            state: ValidationState::Pending,
            selector_matched: false,
            validation_invoked: false,
            validation_passed: false,
            gas_used: 0,
            revert_reason: None,
            skip_reason: None,
            failure: None,
        }
    }

    fn advance(&mut self, next: ValidationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid validation transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    pub fn selector_checked(&mut self) {
        self.advance(ValidationState::SelectorChecked);
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.advance(ValidationState::Skipped);
        self.skip_reason = Some(reason);
    }

    pub fn invoke(&mut self) {
        self.advance(ValidationState::Invoked);
        self.selector_matched = true;
        self.validation_invoked = true;
    }

    pub fn pass(&mut self, gas_used: u64) {
        self.advance(ValidationState::Passed);
        self.validation_passed = true;
        self.gas_used = gas_used;
    }

    pub fn fail(&mut self, error: ValidationError, gas_used: u64) {
        self.advance(ValidationState::Failed);
        self.gas_used = gas_used;
        if let ValidationError::Failed { reason } = &error {
            self.revert_reason = Some(reason.clone());
        }
        self.failure = Some(error);
    }

    pub fn finalize(&mut self) {
        self.advance(ValidationState::Finalized);
    }

    pub const fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}
