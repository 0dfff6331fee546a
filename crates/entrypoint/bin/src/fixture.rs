//! JSON bundle fixtures for `entrypoint simulate`.
use std::{collections::BTreeSet, path::Path};

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use entrypoint_engine::{
    AccountRegistry, BundleController, BundleEnv, BundleReceipt, BundleReverted,
    EntryPointConfig, InMemoryLedger, StateKey, StorageAccount, ThrottleLedger, ThrottleRecord,
};
use entrypoint_primitives::{
    bindings::IStorageAccount::{self, Expectation},
    ExecutionOutcome, Operation, ValidationOutcome, DEFAULT_CALL_GAS_LIMIT,
};
use eyre::eyre::WrapErr;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub beneficiary: Address,
    /// Initial ledger state.
    #[serde(default)]
    pub state: Vec<StateEntry>,
    /// Addresses running `StorageAccount` code. Defaults to every sender and target.
    #[serde(default)]
    pub accounts: Vec<Address>,
    /// Stake deposited with the throttle before the first bundle.
    #[serde(default)]
    pub stakes: Vec<Stake>,
    pub bundles: Vec<BundleFixture>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: StateKey,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub sender: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFixture {
    /// Seconds since the epoch. Defaults to the current time.
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub operations: Vec<OperationFixture>,
}

/// An operation, optionally with its call data and signature spelled out as
/// `StorageAccount` calls and expectations.
///
/// Lists the fields of [`Operation`] itself: serde cannot buffer the `u128` gas price
/// through `flatten`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationFixture {
    pub sender: Address,
    pub target: Address,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub call_data: Bytes,
    #[serde(default = "default_call_gas_limit")]
    pub call_gas_limit: u64,
    #[serde(default)]
    pub gas_price: u128,
    #[serde(default)]
    pub signature: Bytes,
    /// Replaces `callData`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<StorageCall>,
    /// Replaces `signature` with a post-execution validation request for these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Vec<ExpectedValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StorageCall {
    Store { slot: U256, value: U256 },
    Increment { slot: U256, amount: U256 },
    Fail { reason: Bytes },
}

impl StorageCall {
    pub fn abi_encode(&self) -> Bytes {
        let encoded = match self.clone() {
            Self::Store { slot, value } => IStorageAccount::storeCall { slot, value }.abi_encode(),
            Self::Increment { slot, amount } => {
                IStorageAccount::incrementCall { slot, amount }.abi_encode()
            }
            Self::Fail { reason } => IStorageAccount::failCall { reason }.abi_encode(),
        };
        encoded.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValue {
    pub account: Address,
    pub slot: U256,
    pub value: U256,
}

const fn default_call_gas_limit() -> u64 {
    DEFAULT_CALL_GAS_LIMIT
}

impl OperationFixture {
    pub fn into_operation(self) -> Operation {
        let mut operation = Operation {
            sender: self.sender,
            target: self.target,
            nonce: self.nonce,
            call_data: self.call_data,
            call_gas_limit: self.call_gas_limit,
            gas_price: self.gas_price,
            signature: self.signature,
        };
        if let Some(call) = self.call {
            operation.call_data = call.abi_encode();
        }
        if let Some(expect) = self.expect {
            let expectations = expect
                .into_iter()
                .map(|e| Expectation {
                    account: e.account,
                    slot: e.slot,
                    value: e.value,
                })
                .collect::<Vec<_>>();
            operation.signature = StorageAccount::signature_for(&expectations);
        }
        operation
    }
}

/// Outcome of one fixture bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleReport {
    Settled(BundleReceipt),
    #[serde(rename_all = "camelCase")]
    Reverted {
        index: Option<usize>,
        reason: String,
        execution: Vec<ExecutionOutcome>,
        validation: Vec<ValidationOutcome>,
    },
}

impl From<Result<BundleReceipt, BundleReverted>> for BundleReport {
    fn from(result: Result<BundleReceipt, BundleReverted>) -> Self {
        match result {
            Ok(receipt) => Self::Settled(receipt),
            Err(reverted) => Self::Reverted {
                index: reverted.index,
                reason: reverted.kind.to_string(),
                execution: reverted.execution,
                validation: reverted.validation,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleEntry {
    pub sender: Address,
    #[serde(flatten)]
    pub record: ThrottleRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub bundles: Vec<BundleReport>,
    pub final_state: Vec<StateEntry>,
    pub throttle: Vec<ThrottleEntry>,
    /// Stake taken from senders banned during the run.
    pub slashed: Vec<Stake>,
}

impl Fixture {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse fixture {}", path.display()))
    }

    fn registry(&self) -> AccountRegistry {
        let addresses = if self.accounts.is_empty() {
            self.bundles
                .iter()
                .flat_map(|bundle| &bundle.operations)
                .flat_map(|op| [op.sender, op.target])
                .collect::<BTreeSet<_>>()
        } else {
            self.accounts.iter().copied().collect()
        };
        addresses
            .into_iter()
            .fold(AccountRegistry::new(), |registry, address| {
                registry.with_account(address, StorageAccount)
            })
    }

    /// Runs every bundle in order against one ledger and one throttle.
    ///
    /// `beneficiary` overrides the fixture's; `now` supplies timestamps for bundles
    /// without one.
    pub fn run(
        self,
        config: EntryPointConfig,
        beneficiary: Option<Address>,
        now: impl Fn() -> u64,
    ) -> SimulationReport {
        let throttle = ThrottleLedger::new(config.throttle);
        for stake in &self.stakes {
            throttle.deposit_stake(stake.sender, stake.amount);
        }
        let controller = BundleController::new(config, self.registry(), throttle.clone());
        let mut ledger =
            InMemoryLedger::with_state(self.state.iter().map(|entry| (entry.key, entry.value)));
        let beneficiary = beneficiary.unwrap_or(self.beneficiary);

        let mut bundles = Vec::with_capacity(self.bundles.len());
        let mut slashed = Vec::new();
        for (number, fixture) in self.bundles.into_iter().enumerate() {
            let env = BundleEnv {
                timestamp: fixture.timestamp.unwrap_or_else(&now),
                beneficiary,
            };
            let bundle = controller.seal_bundle(
                fixture
                    .operations
                    .into_iter()
                    .map(OperationFixture::into_operation)
                    .collect(),
            );
            let report = BundleReport::from(controller.handle(&bundle, &env, &mut ledger));
            info!(
                target: "entrypoint::cli",
                bundle = number,
                settled = matches!(report, BundleReport::Settled(_)),
                "simulated bundle"
            );
            bundles.push(report);

            for (sender, record) in throttle.records() {
                if !record.slash_pending {
                    continue;
                }
                let amount = throttle.slash(&sender);
                if !amount.is_zero() {
                    slashed.push(Stake { sender, amount });
                }
            }
        }

        SimulationReport {
            bundles,
            final_state: ledger
                .entries()
                .map(|(key, value)| StateEntry { key, value })
                .collect(),
            throttle: throttle
                .records()
                .into_iter()
                .map(|(sender, record)| ThrottleEntry { sender, record })
                .collect(),
            slashed,
        }
    }
}
