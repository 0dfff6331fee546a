//! Phase 1: execute every operation of a bundle, in order, against the ledger.
use alloy_primitives::U256;
use entrypoint_primitives::{Bundle, ExecutionOutcome, SealedOperation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    account::AccountRegistry,
    ledger::{Ledger, LedgerError},
    state::{CallError, GasMeter, StateMut},
};

/// Fixed gas charged to every operation on top of what its handler consumes.
pub const OPERATION_OVERHEAD_GAS: u64 = 21_000;

/// Default gas available to a whole bundle.
pub const DEFAULT_BUNDLE_GAS_LIMIT: u64 = 30_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Gas available to the whole bundle. An operation is only started if its worst case
    /// still fits.
    pub bundle_gas_limit: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            bundle_gas_limit: DEFAULT_BUNDLE_GAS_LIMIT,
        }
    }
}

/// Errors that abort the whole bundle during phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFatal {
    #[error("bundle gas limit {limit} exhausted at operation {index}: {required} required, {remaining} left")]
    BundleGasExhausted {
        index: usize,
        limit: u64,
        required: u64,
        remaining: u64,
    },
    #[error("ledger failure at operation {index}: {source}")]
    Ledger {
        index: usize,
        #[source]
        source: LedgerError,
    },
}

impl ExecutionFatal {
    /// The operation being executed when the bundle aborted.
    pub const fn index(&self) -> usize {
        match self {
            Self::BundleGasExhausted { index, .. } | Self::Ledger { index, .. } => *index,
        }
    }
}

/// Result of executing a whole bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// One outcome per operation, in bundle order.
    pub outcomes: Vec<ExecutionOutcome>,
    /// Cumulative gas used by all operations.
    pub gas_used: u64,
    /// Cumulative fees owed by all operations.
    pub fees_collected: U256,
}

/// Executes bundles operation by operation.
#[derive(Debug, Clone, Default)]
pub struct BundleExecutor {
    config: ExecutorConfig,
}

impl BundleExecutor {
    pub const fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes every operation of `bundle` in submitted order.
    ///
    /// A reverting operation is rolled back to its own snapshot and the bundle carries on;
    /// effects of earlier operations are kept. Only ledger failures and bundle gas
    /// exhaustion abort the bundle.
    pub fn execute_all<L: Ledger>(
        &self,
        bundle: &Bundle,
        registry: &AccountRegistry,
        ledger: &mut L,
    ) -> Result<ExecutionReport, ExecutionFatal> {
        let mut report = ExecutionReport {
            outcomes: Vec::with_capacity(bundle.len()),
            ..Default::default()
        };

        for (index, operation) in bundle.iter().enumerate() {
            let required = OPERATION_OVERHEAD_GAS.saturating_add(operation.call_gas_limit);
            let remaining = self.config.bundle_gas_limit.saturating_sub(report.gas_used);
            if required > remaining {
                return Err(ExecutionFatal::BundleGasExhausted {
                    index,
                    limit: self.config.bundle_gas_limit,
                    required,
                    remaining,
                });
            }

            let outcome = execute_one(index, operation, registry, ledger)?;
            report.gas_used += outcome.gas_used;
            report.fees_collected += outcome.fee;
            report.outcomes.push(outcome);
        }

        debug!(
            target: "entrypoint::executor",
            operations = bundle.len(),
            gas_used = report.gas_used,
            fees = %report.fees_collected,
            "executed bundle"
        );

        Ok(report)
    }
}

fn execute_one<L: Ledger>(
    index: usize,
    operation: &SealedOperation,
    registry: &AccountRegistry,
    ledger: &mut L,
) -> Result<ExecutionOutcome, ExecutionFatal> {
    let fatal = |source| ExecutionFatal::Ledger { index, source };

    let snapshot_before = ledger.snapshot();
    let (result, meter) = match registry.handler(&operation.target) {
        Some(handler) => {
            let mut state = StateMut::new(ledger, GasMeter::new(operation.call_gas_limit));
            let result = handler.execute(operation, &mut state);
            (result, *state.meter())
        }
        // Calling an account without code succeeds and does nothing.
        None => (Ok(()), GasMeter::new(operation.call_gas_limit)),
    };
    let call_gas = meter.used();

    let (success, revert_reason) = match result {
        // A handler that swallowed an out-of-gas error still ran out of gas.
        Ok(()) if meter.is_exhausted() => {
            ledger.revert_to(snapshot_before).map_err(fatal)?;
            (false, None)
        }
        Ok(()) => (true, None),
        Err(CallError::Revert(reason)) => {
            ledger.revert_to(snapshot_before).map_err(fatal)?;
            (false, Some(reason))
        }
        Err(CallError::OutOfGas(_)) => {
            ledger.revert_to(snapshot_before).map_err(fatal)?;
            (false, None)
        }
        Err(CallError::Ledger(source)) => return Err(fatal(source)),
    };
    let snapshot_after = ledger.snapshot();

    let gas_used = OPERATION_OVERHEAD_GAS + call_gas;
    let fee = U256::from(gas_used) * U256::from(operation.gas_price);

    trace!(
        target: "entrypoint::executor",
        index,
        hash = ?operation.hash(),
        sender = %operation.sender,
        target_account = %operation.target,
        success,
        gas_used,
        "executed operation"
    );

    Ok(ExecutionOutcome {
        index,
        operation_hash: operation.hash(),
        gas_used,
        fee,
        success,
        revert_reason,
        snapshot_before,
        snapshot_after,
    })
}
