//! Types shared by the post-execution validation entrypoint: operations, bundles,
//! per-phase outcomes and the signature selector.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod bindings;
pub mod operation;
pub mod outcome;
pub mod selector;

pub use operation::{Bundle, Operation, SealedOperation, DEFAULT_CALL_GAS_LIMIT};
pub use outcome::{
    ExecutionOutcome, SnapshotId, ValidationError, ValidationOutcome, ValidationState,
};
pub use selector::{
    extract_selector, Selector, SelectorError, SkipReason, ValidationRequest,
    POST_EXECUTION_VALIDATION_SELECTOR,
};
