//! A reference account speaking [`IStorageAccount`].
//!
//! Execution applies `store`, `increment` and `fail` calls to the account's own storage.
//! Post-execution validation reads a list of [`Expectation`]s ABI-encoded after the
//! selector in the operation's signature and checks each against the final state.
use alloy_primitives::{Bytes, B256};
use alloy_sol_types::{SolCall, SolError, SolValue};
use entrypoint_primitives::{
    bindings::IStorageAccount::{self, Expectation},
    Operation, SealedOperation, POST_EXECUTION_VALIDATION_SELECTOR,
};

use crate::{
    account::{OperationHandler, PostExecutionValidator},
    state::{CallError, StateMut, StateView},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct StorageAccount;

impl StorageAccount {
    /// Signature blob that requests post-execution validation of `expectations`.
    pub fn signature_for(expectations: &[Expectation]) -> Bytes {
        let mut signature = POST_EXECUTION_VALIDATION_SELECTOR.to_vec();
        signature.extend(expectations.to_vec().abi_encode());
        signature.into()
    }
}

impl OperationHandler for StorageAccount {
    fn execute(&self, operation: &SealedOperation, state: &mut StateMut<'_>) -> Result<(), CallError> {
        let data: &[u8] = &operation.call_data;
        let Some(selector) = data.get(..4) else {
            // Plain transfers and empty calls do nothing.
            return Ok(());
        };

        match <[u8; 4]>::try_from(selector).unwrap_or_default() {
            IStorageAccount::storeCall::SELECTOR => {
                let call = IStorageAccount::storeCall::abi_decode(data).map_err(invalid_calldata)?;
                state.set_storage(operation.target, call.slot, call.value)
            }
            IStorageAccount::incrementCall::SELECTOR => {
                let call =
                    IStorageAccount::incrementCall::abi_decode(data).map_err(invalid_calldata)?;
                let current = state.storage(operation.target, call.slot)?;
                state.set_storage(
                    operation.target,
                    call.slot,
                    current.wrapping_add(call.amount),
                )
            }
            IStorageAccount::failCall::SELECTOR => {
                let call = IStorageAccount::failCall::abi_decode(data).map_err(invalid_calldata)?;
                Err(CallError::Revert(call.reason))
            }
            _ => Err(CallError::revert(Bytes::new())),
        }
    }
}

impl PostExecutionValidator for StorageAccount {
    fn validate_post_execution(
        &self,
        operation: &Operation,
        _operation_hash: B256,
        state: &mut StateView<'_>,
    ) -> Result<(), CallError> {
        let payload = operation.signature.get(4..).unwrap_or_default();
        let expectations = <Vec<Expectation>>::abi_decode(payload).map_err(invalid_calldata)?;

        for Expectation {
            account,
            slot,
            value,
        } in expectations
        {
            let actual = state.storage(account, slot)?;
            if actual != value {
                return Err(CallError::revert(
                    IStorageAccount::ExpectationFailed {
                        account,
                        slot,
                        expected: value,
                        actual,
                    }
                    .abi_encode(),
                ));
            }
        }
        Ok(())
    }
}

fn invalid_calldata(err: alloy_sol_types::Error) -> CallError {
    CallError::revert(err.to_string().into_bytes())
}
