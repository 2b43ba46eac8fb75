//! Concurrency tests: parallel pollers, viewer churn, backpressure

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use gpustat_hub::HostStatus;
use gpustat_hub::actors::{hub::HubHandle, poller::PollerHandle};
use gpustat_hub::render::RenderCache;
use gpustat_hub::store::AggregateStore;

use crate::helpers::*;

#[tokio::test]
async fn parallel_pollers_write_without_interference() {
    let hosts: Vec<String> = (0..8).map(|i| format!("gpu{i:02}")).collect();
    let store = Arc::new(AggregateStore::new(hosts.clone()));

    let pollers: Vec<PollerHandle> = hosts
        .iter()
        .map(|host| {
            PollerHandle::spawn(
                host.clone(),
                ScriptedExecutor::constant(Ok(format!("{host}: busy"))),
                store.clone(),
                MANUAL,
            )
        })
        .collect();

    let mut tasks = vec![];
    for poller in &pollers {
        let poller = poller.clone();
        tasks.push(tokio::spawn(async move { poller.poll_now().await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), HostStatus::Ok);
    }

    let aggregate = store.read();
    for (host, entry) in hosts.iter().zip(&aggregate.entries) {
        let result = entry.result.as_ref().expect("every host polled");
        assert_eq!(result.payload, format!("{host}: busy"));
    }
    assert_eq!(store.generation(), 8);

    for poller in &pollers {
        poller.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn viewers_join_and_leave_during_broadcasts() {
    let store = Arc::new(AggregateStore::new(["a"]));
    let cache = Arc::new(RenderCache::new());
    // Generous queue so undrained stayers survive all 50 updates.
    let hub = HubHandle::spawn(store.clone(), cache, 64);

    // Background writer churns the generation while viewers come and go.
    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for seq in 1..=50u64 {
                store.write("a", host_result(seq, HostStatus::Ok, &format!("load {seq}")));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let mut stayers = vec![];
    for i in 0..10 {
        let mut session = hub.connect(None).await.unwrap();
        // Every viewer gets its initial snapshot even mid-broadcast.
        let initial = timeout(Duration::from_millis(500), session.deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!initial.body.is_empty());

        if i % 2 == 0 {
            hub.disconnect(session.viewer_id).await.unwrap();
        } else {
            stayers.push(session);
        }
    }

    writer.await.unwrap();

    assert_eq!(hub.active_viewers().await.unwrap(), stayers.len());

    // Remaining viewers observe the final state eventually.
    let mut last_seen = None;
    let mut session = stayers.pop().unwrap();
    while let Ok(Some(snapshot)) =
        timeout(Duration::from_millis(300), session.deliveries.recv()).await
    {
        last_seen = Some(snapshot);
    }
    assert!(last_seen.unwrap().body.contains("load 50"));

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn overflow_drops_only_the_stalled_viewer() {
    let store = Arc::new(AggregateStore::new(["a"]));
    let cache = Arc::new(RenderCache::new());
    let hub = HubHandle::spawn(store.clone(), cache, 1);

    let stalled = hub.connect(None).await.unwrap();
    let mut healthy_a = hub.connect(None).await.unwrap();
    let mut healthy_b = hub.connect(None).await.unwrap();

    // Healthy viewers drain their initial snapshots; the stalled one does
    // not, leaving its single-slot queue full.
    for session in [&mut healthy_a, &mut healthy_b] {
        timeout(Duration::from_millis(500), session.deliveries.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(hub.active_viewers().await.unwrap(), 3);

    store.write("a", host_result(1, HostStatus::Ok, "gpu0: 77%"));

    for session in [&mut healthy_a, &mut healthy_b] {
        let update = timeout(Duration::from_millis(500), session.deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(update.body.contains("gpu0: 77%"));
    }

    assert_eq!(hub.active_viewers().await.unwrap(), 2);

    // The stalled viewer's stream ends after the buffered initial snapshot.
    let mut stalled = stalled;
    assert!(stalled.deliveries.recv().await.is_some());
    assert!(stalled.deliveries.recv().await.is_none());

    hub.shutdown().await.unwrap();
}
