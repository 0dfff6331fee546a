use alloy_primitives::{keccak256, Address, Bytes, ChainId, B256, U256};
use alloy_sol_types::SolValue;
use bon::Builder;
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::{
    bindings::{OperationHashEncoded, OperationPackedForHash},
    selector::ValidationRequest,
};

/// Call gas given to operations that do not set their own limit.
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 200_000;

/// A single requested action submitted to the entrypoint.
///
/// Signature and nonce checks are assumed to have happened upstream; the
/// entrypoint only looks at the signature to find the post-execution selector.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The account submitting the operation, and the owner of its validation callback.
    pub sender: Address,
    /// The callee whose handler applies the operation's effect.
    pub target: Address,
    #[builder(into, default)]
    #[serde(default)]
    pub nonce: U256,
    #[builder(into, default)]
    #[serde(default)]
    pub call_data: Bytes,
    #[builder(default = DEFAULT_CALL_GAS_LIMIT)]
    #[serde(default = "default_call_gas_limit")]
    pub call_gas_limit: u64,
    #[builder(default)]
    #[serde(default)]
    pub gas_price: u128,
    #[builder(into, default)]
    #[serde(default)]
    pub signature: Bytes,
}

const fn default_call_gas_limit() -> u64 {
    DEFAULT_CALL_GAS_LIMIT
}

impl Operation {
    /// Computes the operation hash bound to an entrypoint and chain.
    ///
    /// The signature is excluded so that it can carry data that depends on the hash.
    pub fn hash_slow(&self, entry_point: Address, chain_id: ChainId) -> B256 {
        let packed = OperationPackedForHash::from(self);
        let encoded = OperationHashEncoded {
            encodedHash: keccak256(packed.abi_encode()),
            entryPoint: entry_point,
            chainId: U256::from(chain_id),
        };
        keccak256(encoded.abi_encode())
    }

    /// Seals the operation, computing its hash once.
    pub fn seal(self, entry_point: Address, chain_id: ChainId) -> SealedOperation {
        let hash = self.hash_slow(entry_point, chain_id);
        SealedOperation {
            operation: self,
            hash,
        }
    }

    /// Parses the post-execution opt-in out of the signature.
    pub fn validation_request(&self) -> ValidationRequest {
        ValidationRequest::from_signature(&self.signature)
    }
}

/// An [`Operation`] together with its hash.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Serialize)]
pub struct SealedOperation {
    #[deref]
    #[serde(flatten)]
    operation: Operation,
    hash: B256,
}

impl SealedOperation {
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    pub const fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn into_inner(self) -> Operation {
        self.operation
    }
}

/// An ordered batch of operations. Order is significant and never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bundle {
    operations: Vec<SealedOperation>,
}

impl Bundle {
    pub fn new(operations: Vec<SealedOperation>) -> Self {
        Self { operations }
    }

    /// Seals every operation against the given entrypoint and chain.
    pub fn seal(operations: Vec<Operation>, entry_point: Address, chain_id: ChainId) -> Self {
        Self::new(
            operations
                .into_iter()
                .map(|op| op.seal(entry_point, chain_id))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SealedOperation> {
        self.operations.get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &SealedOperation> {
        self.operations.iter()
    }

    pub fn operations(&self) -> &[SealedOperation] {
        &self.operations
    }
}

impl FromIterator<SealedOperation> for Bundle {
    fn from_iter<T: IntoIterator<Item = SealedOperation>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
