//! Bundle lifecycle: admission, execution, post-execution validation and settlement.
use alloy_primitives::{Address, U256};
use entrypoint_primitives::{Bundle, ExecutionOutcome, Operation, ValidationError, ValidationOutcome};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    account::AccountRegistry,
    config::EntryPointConfig,
    dispatcher::{DispatchError, PostExecutionDispatcher},
    executor::{BundleExecutor, ExecutionFatal},
    ledger::{Ledger, LedgerError, StateKey},
    throttle::ThrottleLedger,
};

/// What happens to phase 1 state when post-execution validation rejects the bundle.
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
pub enum RollbackPolicy {
    /// Restore the state the bundle started from.
    #[default]
    FullRollback,
    /// Commit phase 1 effects. No compensation is paid either way.
    RetainExecution,
}

/// Per-bundle environment supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEnv {
    /// Current time, used for ban checks and reported to the throttle.
    pub timestamp: u64,
    /// Receives the bundle's compensation.
    pub beneficiary: Address,
}

/// Result of a bundle that settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub beneficiary: Address,
    /// Credited to the beneficiary: execution fees plus validation gas at each
    /// operation's gas price.
    pub compensation: U256,
    pub gas_used: u64,
    pub validation_gas_used: u64,
    pub execution: Vec<ExecutionOutcome>,
    pub validation: Vec<ValidationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevertKind {
    #[error("sender {sender} is banned until {until}")]
    SenderBanned { sender: Address, until: u64 },
    #[error(transparent)]
    Validation(ValidationError),
    #[error(transparent)]
    ExecutionFatal(ExecutionFatal),
    #[error(transparent)]
    Ledger(LedgerError),
    #[error("execution outcomes out of order at index {expected}")]
    OrderingMismatch { expected: usize, found: Option<usize> },
}

/// A bundle that did not settle. No compensation was paid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bundle reverted{}: {kind}", .index.map(|i| format!(" at operation {i}")).unwrap_or_default())]
pub struct BundleReverted {
    /// Operation that caused the revert, when one did.
    pub index: Option<usize>,
    pub kind: RevertKind,
    /// Phase 1 outcomes, empty if phase 1 did not complete.
    pub execution: Vec<ExecutionOutcome>,
    /// Phase 2 outcomes evaluated before the revert.
    pub validation: Vec<ValidationOutcome>,
}

impl BundleReverted {
    fn new(index: Option<usize>, kind: RevertKind) -> Self {
        Self {
            index,
            kind,
            execution: Vec::new(),
            validation: Vec::new(),
        }
    }

    fn with_outcomes(
        mut self,
        execution: Vec<ExecutionOutcome>,
        validation: Vec<ValidationOutcome>,
    ) -> Self {
        self.execution = execution;
        self.validation = validation;
        self
    }
}

/// Operations split by whether their sender may currently submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    pub admitted: Vec<Operation>,
    pub rejected: Vec<Operation>,
}

#[derive(Debug, Clone)]
pub struct BundleController {
    registry: AccountRegistry,
    throttle: ThrottleLedger,
    executor: BundleExecutor,
    dispatcher: PostExecutionDispatcher,
    config: EntryPointConfig,
}

impl BundleController {
    /// `throttle` is shared with whatever else needs to see sender reputation, and its
    /// own configuration wins over `config.throttle`.
    pub fn new(config: EntryPointConfig, registry: AccountRegistry, throttle: ThrottleLedger) -> Self {
        Self {
            registry,
            executor: BundleExecutor::new(config.executor),
            dispatcher: PostExecutionDispatcher::new(config.dispatcher).with_throttle(throttle.clone()),
            throttle,
            config,
        }
    }

    pub const fn throttle(&self) -> &ThrottleLedger {
        &self.throttle
    }

    pub const fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub const fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    /// Seals `operations` under this entrypoint's address and chain.
    pub fn seal_bundle(&self, operations: Vec<Operation>) -> Bundle {
        Bundle::seal(operations, self.config.entry_point, self.config.chain_id)
    }

    /// Drops operations from senders banned at `now`, preserving order.
    pub fn admit(&self, operations: Vec<Operation>, now: u64) -> Admission {
        let (admitted, rejected): (Vec<_>, Vec<_>) = operations
            .into_iter()
            .partition(|op| !self.throttle.is_banned(&op.sender, now));
        if !rejected.is_empty() {
            debug!(
                target: "entrypoint::controller",
                rejected = rejected.len(),
                "rejected operations from banned senders"
            );
        }
        Admission { admitted, rejected }
    }

    /// Executes, validates and settles `bundle`.
    ///
    /// Either the whole bundle settles and the beneficiary is credited, or it reverts
    /// and nothing is paid. See [`RollbackPolicy`] for what happens to state on a
    /// validation failure; every other failure restores the pre-bundle state.
    pub fn handle<L: Ledger>(
        &self,
        bundle: &Bundle,
        env: &BundleEnv,
        ledger: &mut L,
    ) -> Result<BundleReceipt, BundleReverted> {
        for (index, operation) in bundle.iter().enumerate() {
            if let Some(until) = self
                .throttle
                .record(&operation.sender)
                .filter(|record| record.is_banned(env.timestamp))
                .and_then(|record| record.banned_until)
            {
                warn!(
                    target: "entrypoint::controller",
                    index,
                    sender = %operation.sender,
                    until,
                    "bundle contains banned sender"
                );
                return Err(BundleReverted::new(
                    Some(index),
                    RevertKind::SenderBanned {
                        sender: operation.sender,
                        until,
                    },
                ));
            }
        }

        let checkpoint = ledger.snapshot();
        let rollback = |ledger: &mut L, reverted: BundleReverted| {
            match ledger.revert_to(checkpoint) {
                Ok(()) => reverted,
                Err(source) => BundleReverted::new(reverted.index, RevertKind::Ledger(source))
                    .with_outcomes(reverted.execution, reverted.validation),
            }
        };

        let report = match self.executor.execute_all(bundle, &self.registry, ledger) {
            Ok(report) => report,
            Err(fatal) => {
                warn!(target: "entrypoint::controller", %fatal, "bundle aborted during execution");
                let reverted = BundleReverted::new(Some(fatal.index()), RevertKind::ExecutionFatal(fatal));
                return Err(rollback(ledger, reverted));
            }
        };

        let validation = match self.dispatcher.validate_all(
            bundle,
            &report.outcomes,
            &self.registry,
            &*ledger,
            env.timestamp,
        ) {
            Ok(validation) => validation,
            Err(DispatchError::Rejected {
                index,
                error,
                outcomes,
            }) => {
                warn!(
                    target: "entrypoint::controller",
                    index,
                    %error,
                    policy = %self.config.rollback,
                    "bundle rejected by post-execution validation"
                );
                let reverted = BundleReverted::new(Some(index), RevertKind::Validation(error))
                    .with_outcomes(report.outcomes, outcomes);
                return Err(match self.config.rollback {
                    RollbackPolicy::FullRollback => rollback(ledger, reverted),
                    RollbackPolicy::RetainExecution => match ledger.commit() {
                        Ok(()) => reverted,
                        Err(source) => rollback(
                            ledger,
                            BundleReverted::new(reverted.index, RevertKind::Ledger(source))
                                .with_outcomes(reverted.execution, reverted.validation),
                        ),
                    },
                });
            }
            Err(DispatchError::Ledger { index, source }) => {
                let reverted = BundleReverted::new(Some(index), RevertKind::Ledger(source))
                    .with_outcomes(report.outcomes, Vec::new());
                return Err(rollback(ledger, reverted));
            }
            Err(DispatchError::OrderingMismatch { expected, found }) => {
                let reverted =
                    BundleReverted::new(None, RevertKind::OrderingMismatch { expected, found })
                        .with_outcomes(report.outcomes, Vec::new());
                return Err(rollback(ledger, reverted));
            }
        };

        let validation_gas_used = validation.iter().map(|o| o.gas_used).sum::<u64>();
        let validation_fees = bundle
            .iter()
            .zip(&validation)
            .map(|(op, outcome)| U256::from(outcome.gas_used) * U256::from(op.gas_price))
            .fold(U256::ZERO, |acc, fee| acc + fee);
        let compensation = report.fees_collected + validation_fees;

        if let Err(source) = settle(ledger, env.beneficiary, compensation) {
            let reverted = BundleReverted::new(None, RevertKind::Ledger(source))
                .with_outcomes(report.outcomes, validation);
            return Err(rollback(ledger, reverted));
        }

        info!(
            target: "entrypoint::controller",
            operations = bundle.len(),
            gas_used = report.gas_used,
            validation_gas_used,
            %compensation,
            beneficiary = %env.beneficiary,
            "bundle settled"
        );

        Ok(BundleReceipt {
            beneficiary: env.beneficiary,
            compensation,
            gas_used: report.gas_used,
            validation_gas_used,
            execution: report.outcomes,
            validation,
        })
    }
}

/// Credits `beneficiary` and commits the bundle.
fn settle<L: Ledger>(ledger: &mut L, beneficiary: Address, compensation: U256) -> Result<(), LedgerError> {
    let key = StateKey::balance(beneficiary);
    let balance = ledger.read(&key)?;
    ledger.write(key, balance.saturating_add(compensation))?;
    ledger.commit()
}
