//! Metered access to ledger state for account code.
//!
//! Operation handlers get a [`StateMut`] during execution. Validation callbacks get a
//! [`StateView`], which only borrows the ledger immutably and therefore cannot write.
use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

use crate::ledger::{Ledger, LedgerError, LedgerRead, StateKey};

/// Gas charged for every state read made by account code.
pub const READ_GAS: u64 = 2_100;

/// Gas charged for every state write made by account code.
pub const WRITE_GAS: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of gas: limit {limit}, needed {needed}")]
pub struct OutOfGas {
    pub limit: u64,
    pub needed: u64,
}

/// How a call into account code can end other than by returning normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The account reverted, optionally with a diagnostic payload.
    #[error("execution reverted: {0}")]
    Revert(Bytes),
    #[error(transparent)]
    OutOfGas(#[from] OutOfGas),
    /// The ledger failed underneath the call. Never caused by account code itself.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CallError {
    pub fn revert(reason: impl Into<Bytes>) -> Self {
        Self::Revert(reason.into())
    }
}

/// A fixed gas budget. Running out consumes the whole budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
    exhausted: bool,
}

impl GasMeter {
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            used: 0,
            exhausted: false,
        }
    }

    pub fn charge(&mut self, amount: u64) -> Result<(), OutOfGas> {
        let needed = self.used.saturating_add(amount);
        if needed > self.limit {
            self.used = self.limit;
            self.exhausted = true;
            return Err(OutOfGas {
                limit: self.limit,
                needed,
            });
        }
        self.used = needed;
        Ok(())
    }

    pub const fn limit(&self) -> u64 {
        self.limit
    }

    pub const fn used(&self) -> u64 {
        self.used
    }

    pub const fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Whether a charge has ever been refused.
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Read-only, metered view of ledger state.
pub struct StateView<'a> {
    ledger: &'a dyn LedgerRead,
    meter: GasMeter,
}

impl<'a> StateView<'a> {
    pub fn new(ledger: &'a dyn LedgerRead, meter: GasMeter) -> Self {
        Self { ledger, meter }
    }

    pub fn read(&mut self, key: &StateKey) -> Result<U256, CallError> {
        self.meter.charge(READ_GAS)?;
        Ok(self.ledger.read(key)?)
    }

    pub fn storage(&mut self, address: Address, slot: U256) -> Result<U256, CallError> {
        self.read(&StateKey::storage(address, slot))
    }

    pub fn balance(&mut self, address: Address) -> Result<U256, CallError> {
        self.read(&StateKey::balance(address))
    }

    /// Charges gas for work that does not touch state.
    pub fn charge(&mut self, amount: u64) -> Result<(), CallError> {
        Ok(self.meter.charge(amount)?)
    }

    pub const fn meter(&self) -> &GasMeter {
        &self.meter
    }
}

impl std::fmt::Debug for StateView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateView")
            .field("meter", &self.meter)
            .finish_non_exhaustive()
    }
}

/// Metered read-write access to ledger state, without access to snapshots.
pub struct StateMut<'a> {
    ledger: &'a mut dyn Ledger,
    meter: GasMeter,
}

impl<'a> StateMut<'a> {
    pub fn new(ledger: &'a mut dyn Ledger, meter: GasMeter) -> Self {
        Self { ledger, meter }
    }

    pub fn read(&mut self, key: &StateKey) -> Result<U256, CallError> {
        self.meter.charge(READ_GAS)?;
        Ok(self.ledger.read(key)?)
    }

    pub fn write(&mut self, key: StateKey, value: U256) -> Result<(), CallError> {
        self.meter.charge(WRITE_GAS)?;
        Ok(self.ledger.write(key, value)?)
    }

    pub fn storage(&mut self, address: Address, slot: U256) -> Result<U256, CallError> {
        self.read(&StateKey::storage(address, slot))
    }

    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) -> Result<(), CallError> {
        self.write(StateKey::storage(address, slot), value)
    }

    pub fn charge(&mut self, amount: u64) -> Result<(), CallError> {
        Ok(self.meter.charge(amount)?)
    }

    pub const fn meter(&self) -> &GasMeter {
        &self.meter
    }
}

impl std::fmt::Debug for StateMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMut")
            .field("meter", &self.meter)
            .finish_non_exhaustive()
    }
}
