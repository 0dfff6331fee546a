//! Fixtures for exercising the entrypoint end to end.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::sync::Arc;

use alloy_primitives::{address, Address, Bytes, ChainId, B256, U256};
use alloy_sol_types::SolCall;
use bon::builder;
use entrypoint_engine::{
    AccountRegistry, BundleController, BundleEnv, CallError, DispatchMode, DispatcherConfig,
    EntryPointConfig, ExecutorConfig, InMemoryLedger, Ledger, LedgerError, LedgerRead,
    PostExecutionValidator, RollbackPolicy, StateKey, StateView, StorageAccount, ThrottleConfig,
    ThrottleLedger, DEFAULT_BUNDLE_GAS_LIMIT, DEFAULT_VALIDATION_GAS_LIMIT,
};
use entrypoint_primitives::{
    bindings::IStorageAccount::{self, Expectation},
    Operation, SnapshotId, DEFAULT_CALL_GAS_LIMIT,
};
use parking_lot::Mutex;

/// Accounts running [`StorageAccount`] code in [`registry`].
pub const TEST_ACCOUNTS: [Address; 6] = [
    address!("cA070997F849985e99aF2Bab872009863cA94Ae1"),
    address!("835356Caa344aa7212F939CD3a951C6BB5e7bA05"),
    address!("53098E16a5b936021Aa320d364C823B24d7Fa00e"),
    address!("1435B7e344366a83AAaDD63523B085074C055643"),
    address!("93E9b3EF9BB350f1898Fe373b504129cE792830d"),
    address!("0995dd3e0dBAC55D2C3Fd360bAdC0b487fFAfA44"),
];

pub const TEST_ENTRY_POINT: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

pub const TEST_CHAIN_ID: ChainId = 2151908;

pub const TEST_BENEFICIARY: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

pub const TEST_TIMESTAMP: u64 = 1_700_000_000;

pub fn account(index: usize) -> Address {
    TEST_ACCOUNTS[index]
}

/// `StorageAccount` registered at every test account.
pub fn registry() -> AccountRegistry {
    TEST_ACCOUNTS
        .into_iter()
        .fold(AccountRegistry::new(), |registry, address| {
            registry.with_account(address, StorageAccount)
        })
}

#[builder]
pub fn operation(
    sender: Address,
    // Defaults to `sender`.
    target: Option<Address>,
    #[builder(default = 0)] nonce: u64,
    #[builder(into, default)] call_data: Bytes,
    #[builder(default = DEFAULT_CALL_GAS_LIMIT)] call_gas_limit: u64,
    #[builder(default = 1)] gas_price: u128,
    #[builder(into, default)] signature: Bytes,
) -> Operation {
    Operation {
        sender,
        target: target.unwrap_or(sender),
        nonce: U256::from(nonce),
        call_data,
        call_gas_limit,
        gas_price,
        signature,
    }
}

#[builder]
pub fn controller(
    #[builder(default = crate::registry())] registry: AccountRegistry,
    #[builder(default)] throttle: ThrottleLedger,
    #[builder(default)] rollback: RollbackPolicy,
    #[builder(default)] mode: DispatchMode,
    #[builder(default = DEFAULT_VALIDATION_GAS_LIMIT)] validation_gas_limit: u64,
    #[builder(default = DEFAULT_BUNDLE_GAS_LIMIT)] bundle_gas_limit: u64,
) -> BundleController {
    let config = EntryPointConfig {
        executor: ExecutorConfig { bundle_gas_limit },
        dispatcher: DispatcherConfig {
            validation_gas_limit,
            mode,
        },
        throttle: *throttle.config(),
        rollback,
        entry_point: TEST_ENTRY_POINT,
        chain_id: TEST_CHAIN_ID,
    };
    BundleController::new(config, registry, throttle)
}

pub fn throttle(ban_threshold: u32) -> ThrottleLedger {
    ThrottleLedger::new(ThrottleConfig {
        ban_threshold,
        ..Default::default()
    })
}

pub fn env(timestamp: u64) -> BundleEnv {
    BundleEnv {
        timestamp,
        beneficiary: TEST_BENEFICIARY,
    }
}

pub fn store_call(slot: u64, value: u64) -> Bytes {
    IStorageAccount::storeCall {
        slot: U256::from(slot),
        value: U256::from(value),
    }
    .abi_encode()
    .into()
}

pub fn increment_call(slot: u64, amount: u64) -> Bytes {
    IStorageAccount::incrementCall {
        slot: U256::from(slot),
        amount: U256::from(amount),
    }
    .abi_encode()
    .into()
}

pub fn fail_call(reason: &'static [u8]) -> Bytes {
    IStorageAccount::failCall {
        reason: Bytes::from_static(reason),
    }
    .abi_encode()
    .into()
}

pub fn expect_storage(account: Address, slot: u64, value: u64) -> Expectation {
    Expectation {
        account,
        slot: U256::from(slot),
        value: U256::from(value),
    }
}

/// Signature requesting post-execution validation of `expectations`.
pub fn validation_signature(expectations: &[Expectation]) -> Bytes {
    StorageAccount::signature_for(expectations)
}

/// A 65 byte ECDSA-shaped signature, which never requests post-execution validation.
pub fn plain_signature() -> Bytes {
    Bytes::from(vec![0x1b; 65])
}

pub fn storage(address: Address, slot: u64) -> StateKey {
    StateKey::storage(address, U256::from(slot))
}

/// [`InMemoryLedger`] that reports corruption whenever `poisoned` is read.
#[derive(Debug, Default)]
pub struct FaultyLedger {
    pub inner: InMemoryLedger,
    poisoned: Option<StateKey>,
}

impl FaultyLedger {
    pub fn poison(mut self, key: StateKey) -> Self {
        self.poisoned = Some(key);
        self
    }
}

impl LedgerRead for FaultyLedger {
    fn read(&self, key: &StateKey) -> Result<U256, LedgerError> {
        if self.poisoned.as_ref() == Some(key) {
            return Err(LedgerError::Corruption(format!("unreadable key {key:?}")));
        }
        self.inner.read(key)
    }
}

impl Ledger for FaultyLedger {
    fn write(&mut self, key: StateKey, value: U256) -> Result<(), LedgerError> {
        self.inner.write(key, value)
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.inner.snapshot()
    }

    fn revert_to(&mut self, snapshot: SnapshotId) -> Result<(), LedgerError> {
        self.inner.revert_to(snapshot)
    }

    fn commit(&mut self) -> Result<(), LedgerError> {
        self.inner.commit()
    }
}

/// A validation call seen by [`RecordingValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCall {
    pub sender: Address,
    pub operation_hash: B256,
    /// Value of the watched key at call time.
    pub observed: U256,
}

/// Passes every validation and records what it saw.
#[derive(Debug, Clone)]
pub struct RecordingValidator {
    watch: StateKey,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingValidator {
    pub fn new(watch: StateKey) -> Self {
        Self {
            watch,
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl PostExecutionValidator for RecordingValidator {
    fn validate_post_execution(
        &self,
        operation: &Operation,
        operation_hash: B256,
        state: &mut StateView<'_>,
    ) -> Result<(), CallError> {
        let observed = state.read(&self.watch)?;
        self.calls.lock().push(RecordedCall {
            sender: operation.sender,
            operation_hash,
            observed,
        });
        Ok(())
    }
}
