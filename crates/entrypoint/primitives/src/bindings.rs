use alloy_sol_types::sol;

use crate::operation::Operation;

sol! {
    #[derive(Default, Debug, PartialEq, Eq)]
    struct PackedOperation {
        address sender;
        address target;
        uint256 nonce;
        bytes callData;
        uint64 callGasLimit;
        uint128 gasPrice;
        bytes signature;
    }

    #[derive(Default, Debug, PartialEq, Eq)]
    struct OperationPackedForHash {
        address sender;
        address target;
        uint256 nonce;
        bytes32 hashCallData;
        uint64 callGasLimit;
        uint128 gasPrice;
    }

    #[derive(Default, Debug, PartialEq, Eq)]
    struct OperationHashEncoded {
        bytes32 encodedHash;
        address entryPoint;
        uint256 chainId;
    }

    contract IPostExecutionAccount {
        function validatePostExecution(
            PackedOperation calldata operation,
            bytes32 operationHash
        ) external view;
    }

    contract IStorageAccount {
        #[derive(Default, Debug, PartialEq, Eq)]
        struct Expectation {
            address account;
            uint256 slot;
            uint256 value;
        }

        error ExpectationFailed(address account, uint256 slot, uint256 expected, uint256 actual);

        function store(uint256 slot, uint256 value) external;
        function increment(uint256 slot, uint256 amount) external;
        function fail(bytes reason) external;
    }
}

impl From<&Operation> for OperationPackedForHash {
    fn from(op: &Operation) -> Self {
        Self {
            sender: op.sender,
            target: op.target,
            nonce: op.nonce,
            hashCallData: alloy_primitives::keccak256(&op.call_data),
            callGasLimit: op.call_gas_limit,
            gasPrice: op.gas_price,
        }
    }
}
