use alloy_primitives::U256;
use entrypoint_engine::{
    ExecutionFatal, InMemoryLedger, Ledger, LedgerError, LedgerRead, RevertKind, RollbackPolicy,
    StateKey, OPERATION_OVERHEAD_GAS,
};
use entrypoint_primitives::{Operation, DEFAULT_CALL_GAS_LIMIT};
use entrypoint_test_utils::{
    account, controller, env, expect_storage, increment_call, operation, storage, store_call,
    validation_signature, FaultyLedger, TEST_BENEFICIARY, TEST_TIMESTAMP,
};

/// Writes slot 0 of `account(0)`, then has `account(1)` expect a value it never gets.
fn failing_bundle() -> Vec<Operation> {
    vec![
        operation()
            .sender(account(0))
            .call_data(store_call(0, 9))
            .call(),
        operation()
            .sender(account(1))
            .signature(validation_signature(&[expect_storage(account(0), 0, 10)]))
            .call(),
    ]
}

fn seeded() -> InMemoryLedger {
    InMemoryLedger::with_state([
        (storage(account(0), 0), U256::from(1)),
        (StateKey::balance(TEST_BENEFICIARY), U256::from(100)),
    ])
}

#[test]
fn full_rollback_restores_pre_bundle_state() -> eyre::Result<()> {
    let controller = controller().rollback(RollbackPolicy::FullRollback).call();
    let mut ledger = seeded();
    let before = ledger.entries().collect::<Vec<_>>();

    let err = controller
        .handle(
            &controller.seal_bundle(failing_bundle()),
            &env(TEST_TIMESTAMP),
            &mut ledger,
        )
        .unwrap_err();

    assert_eq!(err.index, Some(1));
    assert_eq!(ledger.entries().collect::<Vec<_>>(), before);
    assert!(!ledger.is_dirty());
    Ok(())
}

#[test]
fn retain_execution_keeps_writes_without_compensation() -> eyre::Result<()> {
    let controller = controller()
        .rollback(RollbackPolicy::RetainExecution)
        .call();
    let mut ledger = seeded();

    controller
        .handle(
            &controller.seal_bundle(failing_bundle()),
            &env(TEST_TIMESTAMP),
            &mut ledger,
        )
        .unwrap_err();

    assert_eq!(ledger.committed(&storage(account(0), 0)), U256::from(9));
    assert_eq!(
        ledger.committed(&StateKey::balance(TEST_BENEFICIARY)),
        U256::from(100)
    );
    Ok(())
}

#[test]
fn compensation_accumulates_on_beneficiary() -> eyre::Result<()> {
    let controller = controller().call();
    let mut ledger = seeded();
    let bundle = controller.seal_bundle(vec![operation()
        .sender(account(0))
        .gas_price(3)
        .call()]);

    let receipt = controller.handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)?;
    assert_eq!(receipt.compensation, U256::from(OPERATION_OVERHEAD_GAS * 3));
    assert_eq!(
        ledger.read(&StateKey::balance(TEST_BENEFICIARY))?,
        U256::from(100 + OPERATION_OVERHEAD_GAS * 3)
    );
    Ok(())
}

#[test]
fn ledger_failure_during_execution_aborts() -> eyre::Result<()> {
    let controller = controller().call();
    let poisoned = storage(account(2), 0);
    let mut ledger = FaultyLedger::default().poison(poisoned);
    ledger.write(storage(account(0), 5), U256::from(5))?;
    ledger.commit()?;

    let bundle = controller.seal_bundle(vec![
        operation()
            .sender(account(0))
            .call_data(store_call(5, 6))
            .call(),
        operation()
            .sender(account(2))
            .call_data(increment_call(0, 1))
            .call(),
    ]);
    let err = controller
        .handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)
        .unwrap_err();

    assert_eq!(err.index, Some(1));
    assert!(matches!(
        err.kind,
        RevertKind::ExecutionFatal(ExecutionFatal::Ledger {
            index: 1,
            source: LedgerError::Corruption(_)
        })
    ));
    assert!(err.execution.is_empty());
    assert_eq!(ledger.read(&storage(account(0), 5))?, U256::from(5));
    Ok(())
}

#[test]
fn ledger_failure_during_validation_aborts() -> eyre::Result<()> {
    let controller = controller()
        .rollback(RollbackPolicy::RetainExecution)
        .call();
    let poisoned = storage(account(3), 1);
    let mut ledger = FaultyLedger::default().poison(poisoned);

    let bundle = controller.seal_bundle(vec![
        operation()
            .sender(account(0))
            .call_data(store_call(0, 1))
            .call(),
        operation()
            .sender(account(1))
            .signature(validation_signature(&[expect_storage(account(3), 1, 0)]))
            .call(),
    ]);
    let err = controller
        .handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)
        .unwrap_err();

    assert_eq!(err.index, Some(1));
    assert!(matches!(err.kind, RevertKind::Ledger(LedgerError::Corruption(_))));
    assert_eq!(err.execution.len(), 2);
    // Ledger failures always roll back, whatever the policy.
    assert_eq!(ledger.read(&storage(account(0), 0))?, U256::ZERO);
    Ok(())
}

#[test]
fn bundle_gas_exhaustion_aborts() -> eyre::Result<()> {
    let per_op = OPERATION_OVERHEAD_GAS + DEFAULT_CALL_GAS_LIMIT;
    // Room for the first operation's worst case, but not for a second one after it.
    let controller = controller().bundle_gas_limit(per_op + 1_000).call();
    let mut ledger = InMemoryLedger::new();
    let bundle = controller.seal_bundle(
        (0..3)
            .map(|i| {
                operation()
                    .sender(account(i))
                    .call_data(store_call(0, 1))
                    .call()
            })
            .collect(),
    );

    let err = controller
        .handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)
        .unwrap_err();
    assert!(matches!(
        err.kind,
        RevertKind::ExecutionFatal(ExecutionFatal::BundleGasExhausted { index: 1, .. })
    ));
    assert_eq!(ledger.read(&storage(account(0), 0))?, U256::ZERO);
    assert!(!ledger.is_dirty());
    Ok(())
}
