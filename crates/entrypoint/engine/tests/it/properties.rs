//! Randomized bundles, seeded so failures reproduce.
use alloy_primitives::{Bytes, U256};
use entrypoint_engine::{
    AccountRegistry, BundleExecutor, InMemoryLedger, LedgerRead, PostExecutionDispatcher,
    StorageAccount,
};
use entrypoint_primitives::{Operation, POST_EXECUTION_VALIDATION_SELECTOR};
use entrypoint_test_utils::{
    account, controller, env, expect_storage, increment_call, operation, plain_signature,
    storage, store_call, validation_signature, RecordingValidator, TEST_TIMESTAMP,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const SEED: u64 = 0x4337;
const ROUNDS: usize = 64;

fn random_op(rng: &mut SmallRng, nonce: u64) -> Operation {
    let sender = account(rng.random_range(0..4));
    let slot = rng.random_range(0..3);
    let call_data = match rng.random_range(0..3) {
        0 => store_call(slot, rng.random_range(0..100)),
        1 => increment_call(slot, rng.random_range(0..100)),
        _ => Bytes::new(),
    };
    let signature = match rng.random_range(0..3) {
        0 => Bytes::from(POST_EXECUTION_VALIDATION_SELECTOR.to_vec()),
        1 => plain_signature(),
        _ => Bytes::from(vec![0u8; rng.random_range(0..4)]),
    };
    operation()
        .sender(sender)
        .nonce(nonce)
        .call_data(call_data)
        .signature(signature)
        .call()
}

#[test]
fn validation_follows_submission_order_and_sees_final_state() -> eyre::Result<()> {
    let mut rng = SmallRng::seed_from_u64(SEED);

    for _ in 0..ROUNDS {
        let watched = storage(account(0), 0);
        let recorder = RecordingValidator::new(watched);
        let registry = (0..4).fold(AccountRegistry::new(), |registry, i| {
            registry
                .with_handler(account(i), StorageAccount)
                .with_validator(account(i), recorder.clone())
        });
        let controller = controller().registry(registry).call();
        let len = rng.random_range(1..12);
        let bundle = controller.seal_bundle((0..len).map(|n| random_op(&mut rng, n)).collect());
        let mut ledger = InMemoryLedger::new();

        let receipt = controller.handle(&bundle, &env(TEST_TIMESTAMP), &mut ledger)?;

        assert!(receipt.execution.iter().map(|o| o.index).eq(0..bundle.len()));
        assert!(receipt.validation.iter().map(|o| o.index).eq(0..bundle.len()));

        let requested = bundle
            .iter()
            .filter(|op| op.validation_request().is_requested())
            .map(|op| op.hash())
            .collect::<Vec<_>>();
        let calls = recorder.calls();
        assert_eq!(
            calls.iter().map(|c| c.operation_hash).collect::<Vec<_>>(),
            requested
        );
        let final_value = ledger.read(&watched)?;
        assert!(calls.iter().all(|c| c.observed == final_value));
    }
    Ok(())
}

#[test]
fn full_rollback_leaves_no_trace() -> eyre::Result<()> {
    let mut rng = SmallRng::seed_from_u64(SEED + 1);

    for _ in 0..ROUNDS {
        let controller = controller().call();
        let len = rng.random_range(1..8);
        let mut ops = (0..len)
            .map(|n| {
                let mut op = random_op(&mut rng, n);
                op.signature = plain_signature();
                op
            })
            .collect::<Vec<_>>();
        // Impossible expectation somewhere in the bundle.
        let position = rng.random_range(0..=ops.len());
        ops.insert(
            position,
            operation()
                .sender(account(3))
                .signature(validation_signature(&[expect_storage(
                    account(3),
                    9,
                    u64::MAX,
                )]))
                .call(),
        );

        let mut ledger = InMemoryLedger::with_state([(storage(account(1), 1), U256::from(11))]);
        let before = ledger.entries().collect::<Vec<_>>();
        let err = controller
            .handle(&controller.seal_bundle(ops), &env(TEST_TIMESTAMP), &mut ledger)
            .unwrap_err();

        assert_eq!(err.index, Some(position));
        assert_eq!(ledger.entries().collect::<Vec<_>>(), before);
    }
    Ok(())
}

#[test]
fn validation_is_deterministic() -> eyre::Result<()> {
    let mut rng = SmallRng::seed_from_u64(SEED + 2);
    let registry = entrypoint_test_utils::registry();
    let controller = controller().call();

    for _ in 0..ROUNDS {
        let len = rng.random_range(1..10);
        let bundle = controller.seal_bundle((0..len).map(|n| random_op(&mut rng, n)).collect());
        let mut ledger = InMemoryLedger::new();
        let report = BundleExecutor::default().execute_all(&bundle, &registry, &mut ledger)?;

        let dispatcher = PostExecutionDispatcher::default();
        let first = dispatcher.validate_all(&bundle, &report.outcomes, &registry, &ledger, 0);
        let second = dispatcher.validate_all(&bundle, &report.outcomes, &registry, &ledger, 0);
        assert_eq!(first, second);
    }
    Ok(())
}
