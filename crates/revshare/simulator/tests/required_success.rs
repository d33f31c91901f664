//! A task with a success target runs exactly until it is reached.

use std::sync::Arc;

use revshare_simulator::{
    TransferTask,
    test_utils::{FakeContractClient, FakeLedger, fixture_env},
    transfer::{NativeTransfer, TaskState},
};

#[tokio::test(start_paused = true)]
async fn failed_attempts_do_not_count_towards_target() {
    revshare_cli_utils::init_test_tracing();
    let client = Arc::new(FakeContractClient::new().failing_attempts([1, 2]));
    let env = fixture_env(Arc::new(FakeLedger::new()), client.clone(), 2);

    let task = TransferTask::new("transfer_NATIVE_0", NativeTransfer::new(5), env);
    assert!(task.start());
    task.join().await;

    let stats = task.stats();
    assert_eq!(task.state(), TaskState::Idle);
    assert_eq!((stats.success, stats.failed), (5, 2));
    assert_eq!(stats.collisions(), 0);
    assert_eq!(client.attempts(), 7);
    assert_eq!(client.successful_calls().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn restart_continues_counting() {
    let client = Arc::new(FakeContractClient::new());
    let env = fixture_env(Arc::new(FakeLedger::new()), client.clone(), 3);

    let task = TransferTask::new("transfer_NATIVE_0", NativeTransfer::new(2), env);
    task.start();
    task.join().await;
    assert_eq!(task.stats().success, 2);

    // The target is cumulative, so a second run ends immediately.
    assert!(task.start());
    task.join().await;
    assert_eq!(task.stats().success, 2);
    assert_eq!(task.state(), TaskState::Idle);
}
