// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{FailureKind, FakeStore, StoreCall};
use std::time::Duration;

fn config() -> HeartbeatConfig {
    HeartbeatConfig {
        interval: Duration::from_millis(100),
        grace_multiplier: 3,
        retry_attempts: 2,
        retry_delay: Duration::from_millis(5),
    }
}

fn refreshes_of(store: &FakeStore, owner: &str) -> usize {
    store
        .calls()
        .iter()
        .filter(|c| matches!(c, StoreCall::RegisterOrRefresh { owner: o } if o == owner))
        .count()
}

fn emitter(store: &FakeStore) -> HeartbeatEmitter {
    HeartbeatEmitter::new("fake", Arc::new(store.clone()), config())
}

#[tokio::test(start_paused = true)]
async fn refreshes_registered_owners_every_interval() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.start();
    assert_eq!(emitter.state(), EmitterState::Running);

    emitter.register("a").await.unwrap();
    assert_eq!(refreshes_of(&store, "a"), 1);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(refreshes_of(&store, "a") >= 4);

    emitter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_do_not_stop_the_loop() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.start();
    emitter.register("a").await.unwrap();

    store.fail_next(FailureKind::Heartbeat, 4);
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert_eq!(emitter.state(), EmitterState::Running);
    assert!(emitter.is_registered("a"));
    let before = refreshes_of(&store, "a");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(refreshes_of(&store, "a") > before);

    emitter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_removes_rows_and_halts_refreshes() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.start();
    emitter.register("a").await.unwrap();
    emitter.register("b").await.unwrap();

    emitter.stop().await;
    assert_eq!(emitter.state(), EmitterState::Stopped);
    assert!(emitter.owners().is_empty());
    assert!(store.heartbeats().unwrap().is_empty());

    let calls = store.calls().len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.calls().len(), calls);
}

#[tokio::test]
async fn stop_is_a_noop_when_never_started() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.stop().await;
    assert_eq!(emitter.state(), EmitterState::Stopped);
}

#[tokio::test]
async fn unregister_deletes_row_but_forget_keeps_it() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.register("a").await.unwrap();
    emitter.register("b").await.unwrap();

    assert!(emitter.unregister("a").await.unwrap());
    assert!(store.last_heartbeat("a").is_none());

    assert!(emitter.forget("b"));
    assert!(!emitter.is_registered("b"));
    assert!(store.last_heartbeat("b").is_some());
}

#[tokio::test(start_paused = true)]
async fn register_fails_after_bounded_retries() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    store.fail_next(FailureKind::Heartbeat, 2);

    let err = emitter.register("a").await.unwrap_err();
    assert!(err.is_transient());
    assert!(!emitter.is_registered("a"));
    assert_eq!(refreshes_of(&store, "a"), 2);
}

#[tokio::test]
async fn tick_reports_failed_refreshes() {
    let store = FakeStore::default();
    let emitter = emitter(&store);
    emitter.register("a").await.unwrap();
    assert_eq!(emitter.tick().await, 0);

    store.fail_next(FailureKind::Heartbeat, 2);
    assert_eq!(emitter.tick().await, 1);
}

#[tokio::test(start_paused = true)]
async fn registry_shares_one_emitter_per_data_source() {
    let registry = HeartbeatRegistry::new();
    let store = FakeStore::default();
    let shared: Arc<dyn HeartbeatStore> = Arc::new(store.clone());

    let first = registry
        .attach("db", Arc::clone(&shared), &config(), "a")
        .await
        .unwrap();
    let second = registry
        .attach("db", Arc::clone(&shared), &config(), "b")
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.owners(), vec!["a".to_string(), "b".to_string()]);

    let other = registry
        .attach("other", Arc::clone(&shared), &config(), "c")
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.data_sources(), vec!["db".to_string(), "other".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn registry_stops_emitter_after_last_detach() {
    let registry = HeartbeatRegistry::new();
    let store = FakeStore::default();
    let shared: Arc<dyn HeartbeatStore> = Arc::new(store.clone());

    let emitter = registry
        .attach("db", Arc::clone(&shared), &config(), "a")
        .await
        .unwrap();
    registry
        .attach("db", Arc::clone(&shared), &config(), "b")
        .await
        .unwrap();

    registry.detach("db", "a", true).await;
    assert_eq!(emitter.state(), EmitterState::Running);
    assert!(store.last_heartbeat("a").is_none());

    registry.detach("db", "b", false).await;
    assert_eq!(emitter.state(), EmitterState::Stopped);
    assert!(registry.emitter("db").is_none());
    // forgotten owner's row stays behind until reaped
    assert!(store.last_heartbeat("b").is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_attach_leaves_no_emitter_behind() {
    let registry = HeartbeatRegistry::new();
    let store = FakeStore::default();
    store.fail_next(FailureKind::Heartbeat, 10);

    let result = registry
        .attach("db", Arc::new(store.clone()), &config(), "a")
        .await;
    assert!(result.is_err());
    assert!(registry.emitter("db").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unregister_waits_for_refresh_in_flight() {
    let store = FakeStore::default();
    let emitter = Arc::new(emitter(&store));
    emitter.register("a").await.unwrap();

    let held = store.hold_next(FailureKind::Heartbeat);
    let ticking = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.tick().await }
    });
    assert!(held.wait_entered(Duration::from_secs(5)));

    let unregistering = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.unregister("a").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!unregistering.is_finished(), "unregister must wait for the tick");

    held.release();
    assert_eq!(ticking.await.unwrap(), 0);
    assert!(unregistering.await.unwrap().unwrap());

    // the refresh landed first, so the delete is the last word
    assert!(store.last_heartbeat("a").is_none());
    assert!(!emitter.is_registered("a"));
}

#[tokio::test(start_paused = true)]
async fn abandon_halts_idle_emitter_and_keeps_the_row() {
    let store = FakeStore::default();
    let registry = HeartbeatRegistry::new();
    let emitter = registry
        .attach("fake", Arc::new(store.clone()), &config(), "a")
        .await
        .unwrap();

    registry.abandon("fake", "a");

    assert!(registry.emitter("fake").is_none());
    assert_eq!(emitter.state(), EmitterState::Stopped);
    assert!(store.last_heartbeat("a").is_some());

    let calls = store.calls().len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.calls().len(), calls);
}
