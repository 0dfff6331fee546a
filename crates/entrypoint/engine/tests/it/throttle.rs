use entrypoint_engine::{InMemoryLedger, ReputationStatus, RevertKind, DEFAULT_BAN_DURATION};
use entrypoint_primitives::Operation;
use entrypoint_test_utils::{
    account, controller, env, expect_storage, operation, throttle, validation_signature,
    TEST_TIMESTAMP,
};

/// Expects slot 0 of the sender to hold 1, which it never does.
fn failing(sender_index: usize, nonce: u64) -> Operation {
    let sender = account(sender_index);
    operation()
        .sender(sender)
        .nonce(nonce)
        .signature(validation_signature(&[expect_storage(sender, 0, 1)]))
        .call()
}

fn passing(sender_index: usize, nonce: u64) -> Operation {
    let sender = account(sender_index);
    operation()
        .sender(sender)
        .nonce(nonce)
        .signature(validation_signature(&[expect_storage(sender, 0, 0)]))
        .call()
}

#[test]
fn three_failed_bundles_ban_the_sender() {
    let throttle = throttle(3);
    let controller = controller().throttle(throttle.clone()).call();
    let mut ledger = InMemoryLedger::new();
    let sender = account(0);

    for (round, now) in (0..3).zip((TEST_TIMESTAMP..).step_by(12)) {
        assert!(!throttle.is_banned(&sender, now));
        let err = controller
            .handle(
                &controller.seal_bundle(vec![failing(0, round)]),
                &env(now),
                &mut ledger,
            )
            .unwrap_err();
        assert!(matches!(err.kind, RevertKind::Validation(_)));
    }

    let banned_at = TEST_TIMESTAMP + 24;
    assert_eq!(
        throttle.banned_until(&sender),
        Some(banned_at + DEFAULT_BAN_DURATION)
    );
    assert_eq!(throttle.status(&sender, banned_at), ReputationStatus::Banned);

    // The fourth bundle never executes.
    let err = controller
        .handle(
            &controller.seal_bundle(vec![passing(1, 0), passing(0, 3)]),
            &env(banned_at + 1),
            &mut ledger,
        )
        .unwrap_err();
    assert_eq!(err.index, Some(1));
    assert_eq!(
        err.kind,
        RevertKind::SenderBanned {
            sender,
            until: banned_at + DEFAULT_BAN_DURATION
        }
    );

    // Admission filters the banned sender out so the rest can proceed.
    let admission = controller.admit(vec![passing(1, 0), passing(0, 3)], banned_at + 1);
    assert_eq!(admission.rejected.len(), 1);
    assert_eq!(admission.rejected[0].sender, sender);
    let receipt = controller.handle(
        &controller.seal_bundle(admission.admitted),
        &env(banned_at + 1),
        &mut ledger,
    );
    assert!(receipt.is_ok());

    // Once the ban runs out the sender is admitted again.
    let after = banned_at + DEFAULT_BAN_DURATION;
    assert!(!throttle.is_banned(&sender, after));
    assert!(controller
        .handle(
            &controller.seal_bundle(vec![passing(0, 4)]),
            &env(after),
            &mut ledger,
        )
        .is_ok());
    assert_eq!(throttle.status(&sender, after), ReputationStatus::Ok);
}

#[test]
fn success_between_failures_resets_the_streak() {
    let throttle = throttle(3);
    let controller = controller().throttle(throttle.clone()).call();
    let mut ledger = InMemoryLedger::new();

    for round in 0..4 {
        let _ = controller.handle(
            &controller.seal_bundle(vec![failing(2, round * 3)]),
            &env(TEST_TIMESTAMP),
            &mut ledger,
        );
        let _ = controller.handle(
            &controller.seal_bundle(vec![failing(2, round * 3 + 1)]),
            &env(TEST_TIMESTAMP),
            &mut ledger,
        );
        assert!(controller
            .handle(
                &controller.seal_bundle(vec![passing(2, round * 3 + 2)]),
                &env(TEST_TIMESTAMP),
                &mut ledger,
            )
            .is_ok());
    }

    let record = throttle.record(&account(2)).unwrap();
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.total_failures, 8);
    assert!(!throttle.is_banned(&account(2), TEST_TIMESTAMP));
}

#[test]
fn only_the_failing_sender_is_penalised() {
    let throttle = throttle(1);
    let controller = controller().throttle(throttle.clone()).call();

    let _ = controller.handle(
        &controller.seal_bundle(vec![passing(3, 0), failing(4, 0)]),
        &env(TEST_TIMESTAMP),
        &mut InMemoryLedger::new(),
    );

    assert!(throttle.is_banned(&account(4), TEST_TIMESTAMP));
    assert!(!throttle.is_banned(&account(3), TEST_TIMESTAMP));
}

#[test]
fn passing_operation_does_not_clear_a_failure_in_the_same_bundle() {
    let throttle = throttle(3);
    let controller = controller().throttle(throttle.clone()).call();
    let mut ledger = InMemoryLedger::new();
    let sender = account(5);

    for round in 0..3 {
        let err = controller
            .handle(
                &controller.seal_bundle(vec![passing(5, round * 2), failing(5, round * 2 + 1)]),
                &env(TEST_TIMESTAMP),
                &mut ledger,
            )
            .unwrap_err();
        assert_eq!(err.index, Some(1));
    }

    let record = throttle.record(&sender).unwrap();
    assert_eq!(record.consecutive_failures, 3);
    assert!(throttle.is_banned(&sender, TEST_TIMESTAMP));
}
