use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolError;
use entrypoint_engine::{InMemoryLedger, LedgerRead, RevertKind, StateKey};
use entrypoint_primitives::{
    bindings::IStorageAccount::ExpectationFailed, Operation, ValidationError, ValidationState,
};
use entrypoint_test_utils::{
    account, controller, env, expect_storage, operation, storage, store_call,
    validation_signature, TEST_BENEFICIARY, TEST_TIMESTAMP,
};

/// `account(1)` slot 0.
fn counter() -> StateKey {
    storage(account(1), 0)
}

fn validator_op() -> Operation {
    operation()
        .sender(account(2))
        .signature(validation_signature(&[expect_storage(account(1), 0, 5)]))
        .call()
}

#[test]
fn later_operation_validates_earlier_write() -> eyre::Result<()> {
    let controller = controller().call();
    let mut ledger = InMemoryLedger::new();
    let bundle = controller.seal_bundle(vec![
        operation()
            .sender(account(0))
            .call_data(store_call(1, 1))
            .call(),
        operation()
            .sender(account(1))
            .call_data(store_call(0, 5))
            .call(),
        validator_op(),
    ]);

    let receipt = controller.handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)?;

    assert_eq!(receipt.validation.len(), 3);
    assert!(receipt
        .validation
        .iter()
        .all(|o| o.state == ValidationState::Finalized));
    assert!(!receipt.validation[0].validation_invoked);
    assert!(!receipt.validation[1].validation_invoked);
    assert!(receipt.validation[2].validation_invoked && receipt.validation[2].validation_passed);

    assert_eq!(ledger.committed(&counter()), U256::from(5));
    assert!(receipt.compensation > U256::ZERO);
    assert_eq!(
        ledger.committed(&StateKey::balance(TEST_BENEFICIARY)),
        receipt.compensation
    );
    Ok(())
}

#[test]
fn mismatched_counter_reverts_bundle() -> eyre::Result<()> {
    let controller = controller().call();
    let mut ledger = InMemoryLedger::new();
    let bundle = controller.seal_bundle(vec![
        operation()
            .sender(account(1))
            .call_data(store_call(0, 4))
            .call(),
        operation().sender(account(1)).nonce(1).call(),
        validator_op(),
    ]);

    let err = controller
        .handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)
        .unwrap_err();

    assert_eq!(err.index, Some(2));
    let RevertKind::Validation(ValidationError::Failed { reason }) = &err.kind else {
        panic!("expected a failed validation, got {:?}", err.kind);
    };
    let failed = ExpectationFailed::abi_decode(reason)?;
    assert_eq!(failed.expected, U256::from(5));
    assert_eq!(failed.actual, U256::from(4));

    assert_eq!(err.execution.len(), 3);
    assert!(err.execution.iter().all(|o| o.success));
    assert_eq!(err.validation[2].state, ValidationState::Failed);
    assert_eq!(err.validation[2].revert_reason.as_ref(), Some(reason));

    assert_eq!(ledger.read(&counter())?, U256::ZERO);
    assert_eq!(ledger.read(&StateKey::balance(TEST_BENEFICIARY))?, U256::ZERO);
    assert!(!ledger.is_dirty());
    Ok(())
}

#[test]
fn reverted_operation_does_not_sink_bundle() -> eyre::Result<()> {
    let controller = controller().call();
    let mut ledger = InMemoryLedger::new();
    let bundle = controller.seal_bundle(vec![
        operation()
            .sender(account(1))
            .call_data(store_call(0, 5))
            .call(),
        operation()
            .sender(account(3))
            .call_data(entrypoint_test_utils::fail_call(b"boom"))
            .call(),
        validator_op(),
    ]);

    let receipt = controller.handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)?;
    assert!(!receipt.execution[1].success);
    assert_eq!(
        receipt.execution[1].revert_reason,
        Some(Bytes::from_static(b"boom"))
    );
    assert!(receipt.validation[2].validation_passed);
    Ok(())
}
