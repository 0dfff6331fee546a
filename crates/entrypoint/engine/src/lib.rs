//! Two-phase bundle processing for the post-execution validation entrypoint.
//!
//! A bundle is executed operation by operation ([`executor`]), after which every
//! operation that opted in has its sender's `validatePostExecution` called against the
//! final state ([`dispatcher`]). Any failed validation reverts the whole bundle and
//! counts against the sender in the [`throttle`]. [`controller`] ties the phases
//! together and settles compensation.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod account;
pub mod accounts;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod executor;
pub mod ledger;
pub mod state;
pub mod throttle;

pub use account::{AccountRegistry, OperationHandler, PostExecutionValidator};
pub use accounts::StorageAccount;
pub use config::{EntryPointConfig, DEFAULT_CHAIN_ID, DEFAULT_ENTRY_POINT};
pub use controller::{
    Admission, BundleController, BundleEnv, BundleReceipt, BundleReverted, RevertKind,
    RollbackPolicy,
};
pub use dispatcher::{
    DispatchError, DispatchMode, DispatcherConfig, PostExecutionDispatcher,
    DEFAULT_VALIDATION_GAS_LIMIT,
};
pub use executor::{
    BundleExecutor, ExecutionFatal, ExecutionReport, ExecutorConfig, DEFAULT_BUNDLE_GAS_LIMIT,
    OPERATION_OVERHEAD_GAS,
};
pub use ledger::{InMemoryLedger, Ledger, LedgerError, LedgerRead, StateKey};
pub use state::{CallError, GasMeter, OutOfGas, StateMut, StateView, READ_GAS, WRITE_GAS};
pub use throttle::{
    ReputationStatus, ThrottleConfig, ThrottleLedger, ThrottleRecord, DEFAULT_BAN_DURATION,
    DEFAULT_BAN_THRESHOLD,
};
