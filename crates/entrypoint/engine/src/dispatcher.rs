//! Phase 2: post-execution validation.
//!
//! Runs strictly after every operation of the bundle has executed. Operations opt in
//! through the selector at the head of their signature; for those, the sender's
//! `validatePostExecution` is called with a read-only, gas-bounded view of the final
//! bundle state.
use alloy_primitives::Address;
use entrypoint_primitives::{
    Bundle, ExecutionOutcome, SealedOperation, ValidationError, ValidationOutcome,
    ValidationRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    account::AccountRegistry,
    ledger::{LedgerError, LedgerRead},
    state::{CallError, GasMeter, StateView},
    throttle::ThrottleLedger,
};

/// Gas available to a single `validatePostExecution` call.
pub const DEFAULT_VALIDATION_GAS_LIMIT: u64 = 100_000;

/// What happens after the first failed validation.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DispatchMode {
    /// Stop at the first failure.
    #[default]
    ShortCircuit,
    /// Keep validating the remaining operations for diagnostics. The first failure is
    /// still the one that reverts the bundle.
    EvaluateAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub validation_gas_limit: u64,
    pub mode: DispatchMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            validation_gas_limit: DEFAULT_VALIDATION_GAS_LIMIT,
            mode: DispatchMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Execution outcomes do not line up with the bundle.
    #[error("execution outcomes out of order: expected index {expected}, found {found:?}")]
    OrderingMismatch {
        expected: usize,
        found: Option<usize>,
    },
    /// A validation failed. `outcomes` holds every outcome evaluated so far.
    #[error("operation {index} failed post-execution validation: {error}")]
    Rejected {
        index: usize,
        error: ValidationError,
        outcomes: Vec<ValidationOutcome>,
    },
    #[error("ledger failure validating operation {index}: {source}")]
    Ledger {
        index: usize,
        #[source]
        source: LedgerError,
    },
}

impl DispatchError {
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::OrderingMismatch { .. } => None,
            Self::Rejected { index, .. } | Self::Ledger { index, .. } => Some(*index),
        }
    }
}

/// Drives the per-operation validation state machine across a bundle.
#[derive(Debug, Clone, Default)]
pub struct PostExecutionDispatcher {
    config: DispatcherConfig,
    throttle: Option<ThrottleLedger>,
}

impl PostExecutionDispatcher {
    pub const fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            throttle: None,
        }
    }

    /// Reports validation results to `throttle`.
    pub fn with_throttle(mut self, throttle: ThrottleLedger) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Validates every operation of `bundle` in order against the final bundle state.
    ///
    /// `execution` must hold exactly one outcome per operation, in bundle order. `now` is
    /// the time reported to the throttle for failures.
    ///
    /// On success every outcome is [`Finalized`](entrypoint_primitives::ValidationState::Finalized).
    pub fn validate_all<L: LedgerRead>(
        &self,
        bundle: &Bundle,
        execution: &[ExecutionOutcome],
        registry: &AccountRegistry,
        ledger: &L,
        now: u64,
    ) -> Result<Vec<ValidationOutcome>, DispatchError> {
        check_ordering(bundle, execution)?;

        let mut outcomes = Vec::with_capacity(bundle.len());
        let mut first_failure: Option<(usize, ValidationError)> = None;
        let mut passed: Vec<Address> = Vec::new();

        for (index, operation) in bundle.iter().enumerate() {
            let outcome = self.validate_one(index, operation, registry, ledger)?;
            if outcome.validation_passed {
                passed.push(operation.sender);
            }

            if let Some(error) = &outcome.failure {
                if let Some(throttle) = &self.throttle {
                    throttle.record_failure(operation.sender, now);
                }
                warn!(
                    target: "entrypoint::dispatcher",
                    index,
                    sender = %operation.sender,
                    hash = ?operation.hash(),
                    %error,
                    "post-execution validation failed"
                );
                first_failure.get_or_insert_with(|| (index, error.clone()));
                outcomes.push(outcome);
                if self.config.mode == DispatchMode::ShortCircuit {
                    break;
                }
                continue;
            }
            outcomes.push(outcome);
        }

        if let Some((index, error)) = first_failure {
            return Err(DispatchError::Rejected {
                index,
                error,
                outcomes,
            });
        }

        // Successes only count for bundles that passed validation as a whole.
        if let Some(throttle) = &self.throttle {
            for sender in passed {
                throttle.record_success(sender);
            }
        }
        for outcome in &mut outcomes {
            outcome.finalize();
        }
        debug!(
            target: "entrypoint::dispatcher",
            operations = outcomes.len(),
            invoked = outcomes.iter().filter(|o| o.validation_invoked).count(),
            "post-execution validation passed"
        );
        Ok(outcomes)
    }

    fn validate_one<L: LedgerRead>(
        &self,
        index: usize,
        operation: &SealedOperation,
        registry: &AccountRegistry,
        ledger: &L,
    ) -> Result<ValidationOutcome, DispatchError> {
        let mut outcome = ValidationOutcome::pending(index, operation.hash());
        let request = operation.validation_request();
        outcome.selector_checked();

        if let ValidationRequest::Skipped(reason) = request {
            trace!(target: "entrypoint::dispatcher", index, ?reason, "validation not requested");
            outcome.skip(reason);
            return Ok(outcome);
        }

        outcome.invoke();
        let Some(validator) = registry.validator(&operation.sender) else {
            outcome.fail(
                ValidationError::Unreachable {
                    account: operation.sender,
                },
                0,
            );
            return Ok(outcome);
        };

        let limit = self.config.validation_gas_limit;
        let mut view = StateView::new(ledger, GasMeter::new(limit));
        let result = validator.validate_post_execution(operation, operation.hash(), &mut view);
        let meter = *view.meter();

        match result {
            // A callback that swallowed an out-of-gas error still ran out of gas.
            Ok(()) if meter.is_exhausted() => {
                outcome.fail(ValidationError::ResourceExceeded { limit }, meter.used())
            }
            Ok(()) => outcome.pass(meter.used()),
            Err(CallError::Revert(reason)) => {
                outcome.fail(ValidationError::Failed { reason }, meter.used())
            }
            Err(CallError::OutOfGas(_)) => {
                outcome.fail(ValidationError::ResourceExceeded { limit }, meter.used())
            }
            Err(CallError::Ledger(source)) => return Err(DispatchError::Ledger { index, source }),
        }

        trace!(
            target: "entrypoint::dispatcher",
            index,
            state = %outcome.state,
            gas_used = outcome.gas_used,
            "validation callback returned"
        );
        Ok(outcome)
    }
}

fn check_ordering(bundle: &Bundle, execution: &[ExecutionOutcome]) -> Result<(), DispatchError> {
    for (expected, operation) in bundle.iter().enumerate() {
        match execution.get(expected) {
            Some(outcome)
                if outcome.index == expected && outcome.operation_hash == operation.hash() => {}
            found => {
                return Err(DispatchError::OrderingMismatch {
                    expected,
                    found: found.map(|o| o.index),
                })
            }
        }
    }
    if execution.len() > bundle.len() {
        return Err(DispatchError::OrderingMismatch {
            expected: bundle.len(),
            found: Some(execution[bundle.len()].index),
        });
    }
    Ok(())
}
