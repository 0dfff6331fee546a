//! Account code the entrypoint calls into.
use std::{collections::HashMap, fmt, sync::Arc};

use alloy_primitives::{Address, B256};
use auto_impl::auto_impl;
use entrypoint_primitives::{Operation, SealedOperation};

use crate::state::{CallError, StateMut, StateView};

/// Applies an operation's effect. Registered under the operation's `target`.
#[auto_impl(&, Arc, Box)]
pub trait OperationHandler: Send + Sync {
    fn execute(&self, operation: &SealedOperation, state: &mut StateMut<'_>) -> Result<(), CallError>;
}

/// The `validatePostExecution` entry point of an account. Registered under the
/// operation's `sender`.
///
/// Implementations observe the ledger as it stands after the whole bundle executed and
/// must be deterministic: the same state and operation always give the same answer.
#[auto_impl(&, Arc, Box)]
pub trait PostExecutionValidator: Send + Sync {
    fn validate_post_execution(
        &self,
        operation: &Operation,
        operation_hash: B256,
        state: &mut StateView<'_>,
    ) -> Result<(), CallError>;
}

/// Lookup of account code by address.
#[derive(Clone, Default)]
pub struct AccountRegistry {
    handlers: HashMap<Address, Arc<dyn OperationHandler>>,
    validators: HashMap<Address, Arc<dyn PostExecutionValidator>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, address: Address, handler: impl OperationHandler + 'static) -> Self {
        self.register_handler(address, handler);
        self
    }

    pub fn with_validator(
        mut self,
        address: Address,
        validator: impl PostExecutionValidator + 'static,
    ) -> Self {
        self.register_validator(address, validator);
        self
    }

    /// Registers one implementation as both handler and validator of `address`.
    pub fn with_account<A>(mut self, address: Address, account: A) -> Self
    where
        A: OperationHandler + PostExecutionValidator + 'static,
    {
        let account = Arc::new(account);
        self.handlers.insert(address, account.clone());
        self.validators.insert(address, account);
        self
    }

    pub fn register_handler(&mut self, address: Address, handler: impl OperationHandler + 'static) {
        self.handlers.insert(address, Arc::new(handler));
    }

    pub fn register_validator(
        &mut self,
        address: Address,
        validator: impl PostExecutionValidator + 'static,
    ) {
        self.validators.insert(address, Arc::new(validator));
    }

    pub fn handler(&self, address: &Address) -> Option<&dyn OperationHandler> {
        self.handlers.get(address).map(|h| &**h)
    }

    pub fn validator(&self, address: &Address) -> Option<&dyn PostExecutionValidator> {
        self.validators.get(address).map(|v| &**v)
    }
}

impl fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}
