use alloy_primitives::{address, Address, ChainId};
use serde::{Deserialize, Serialize};

use crate::{
    controller::RollbackPolicy, dispatcher::DispatcherConfig, executor::ExecutorConfig,
    throttle::ThrottleConfig,
};

/// Canonical ERC-4337 v0.7 EntryPoint address, used as the hashing domain by default.
pub const DEFAULT_ENTRY_POINT: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

pub const DEFAULT_CHAIN_ID: ChainId = 480;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointConfig {
    pub executor: ExecutorConfig,
    pub dispatcher: DispatcherConfig,
    pub throttle: ThrottleConfig,
    pub rollback: RollbackPolicy,
    /// Address operation hashes are bound to.
    pub entry_point: Address,
    pub chain_id: ChainId,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            executor: Default::default(),
            dispatcher: Default::default(),
            throttle: Default::default(),
            rollback: Default::default(),
            entry_point: DEFAULT_ENTRY_POINT,
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}
