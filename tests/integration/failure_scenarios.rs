//! Failure isolation scenarios
//!
//! One host's misbehavior (hang, persistent error, late completion) must
//! never leak into another host's cycle or into the service as a whole.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gpustat_hub::HostStatus;
use gpustat_hub::actors::poller::PollerHandle;
use gpustat_hub::executor::ExecFailure;
use gpustat_hub::render::{Format, render};
use gpustat_hub::store::{AggregateStore, WriteOutcome};

use crate::helpers::*;

#[tokio::test]
async fn hung_host_does_not_delay_other_pollers() {
    let store = Arc::new(AggregateStore::new(["slow", "fast"]));

    // The slow host takes 400ms per call and its short interval keeps it
    // permanently busy.
    let slow = PollerHandle::spawn(
        "slow".to_string(),
        Arc::new(HangingExecutor {
            delay: Duration::from_millis(400),
            outcome: Err(ExecFailure::Timeout),
        }),
        store.clone(),
        Duration::from_millis(10),
    );

    let fast = PollerHandle::spawn(
        "fast".to_string(),
        ScriptedExecutor::constant(Ok("gpu0: 5%".to_string())),
        store.clone(),
        MANUAL,
    );

    // Let the slow poller get stuck mid-call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    assert_eq!(fast.poll_now().await.unwrap(), HostStatus::Ok);
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(200),
        "fast host delayed by slow host: {elapsed:?}"
    );

    slow.shutdown().await.unwrap();
    fast.shutdown().await.unwrap();
}

#[tokio::test]
async fn persistent_failure_stays_visible_as_data() {
    let store = Arc::new(AggregateStore::new(["down", "up"]));

    let down = PollerHandle::spawn(
        "down".to_string(),
        ScriptedExecutor::constant(Err(ExecFailure::Unreachable(
            "Connection refused".to_string(),
        ))),
        store.clone(),
        MANUAL,
    );
    let up = PollerHandle::spawn(
        "up".to_string(),
        ScriptedExecutor::constant(Ok("gpu0: 30%".to_string())),
        store.clone(),
        MANUAL,
    );

    for _ in 0..3 {
        assert_eq!(down.poll_now().await.unwrap(), HostStatus::Unreachable);
        assert_eq!(up.poll_now().await.unwrap(), HostStatus::Ok);
    }

    // The failing host keeps its slot in every rendering instead of
    // vanishing or aborting the render.
    let plain = render(&store.read(), None, Format::Plain);
    assert!(plain.body.contains("(down) [unreachable] Connection refused"));
    assert!(plain.body.contains("gpu0: 30%"));

    down.shutdown().await.unwrap();
    up.shutdown().await.unwrap();
}

#[tokio::test]
async fn recovery_after_failure_is_reflected() {
    let store = Arc::new(AggregateStore::new(["flappy"]));

    let poller = PollerHandle::spawn(
        "flappy".to_string(),
        ScriptedExecutor::new(
            vec![
                Err(ExecFailure::Timeout),
                Ok("gpu0: 12%".to_string()),
            ],
            Ok("gpu0: 12%".to_string()),
        ),
        store.clone(),
        MANUAL,
    );

    assert_eq!(poller.poll_now().await.unwrap(), HostStatus::Timeout);
    let generation_after_failure = store.generation();

    assert_eq!(poller.poll_now().await.unwrap(), HostStatus::Ok);
    assert!(store.generation() > generation_after_failure);

    let plain = render(&store.read(), None, Format::Plain);
    assert!(plain.body.contains("gpu0: 12%"));
    assert!(!plain.body.contains("[timeout]"));

    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn late_completion_cannot_overwrite_newer_result() {
    let store = AggregateStore::new(["a"]);

    // Cycle 2 finished first; cycle 1's call returns late.
    assert_eq!(
        store.write("a", host_result(2, HostStatus::Ok, "fresh")),
        WriteOutcome::Applied
    );
    assert_eq!(
        store.write("a", host_result(1, HostStatus::Timeout, "stale")),
        WriteOutcome::Stale
    );

    let aggregate = store.read();
    let current = aggregate.entries[0].result.as_ref().unwrap();
    assert_eq!(current.payload, "fresh");
    assert_eq!(current.status, HostStatus::Ok);
}
