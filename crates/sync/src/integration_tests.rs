// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! End-to-end scenarios against the assembled service.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use pulselink_core::{EventEnvelope, KvStore, MemoryStore, Priority};

use crate::channel::ChannelStatus;
use crate::service::SyncService;
use crate::test_helpers::{fast_config, tagged_command, ExecBehavior, ScriptedExecutor};
use crate::transport_tests::{MockHandle, MockTransport};

struct Fixture {
    service: SyncService<MockTransport>,
    handle: MockHandle,
    store: Arc<MemoryStore>,
}

async fn fixture(initial_online: bool) -> Fixture {
    fixture_with_store(initial_online, Arc::new(MemoryStore::new())).await
}

async fn fixture_with_store(initial_online: bool, store: Arc<MemoryStore>) -> Fixture {
    let (transport, handle) = MockTransport::new();
    let service = SyncService::new(fast_config(), store.clone(), transport, initial_online)
        .await
        .unwrap();
    Fixture {
        service,
        handle,
        store,
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn offline_mutations_drain_in_priority_order_when_online() {
    let fx = fixture(false).await;
    let executor = ScriptedExecutor::new(ExecBehavior::Succeed);
    fx.service.executors().register("op", executor.clone());

    // Low enqueued first, high second, while offline.
    fx.service
        .queue()
        .enqueue("m-1", tagged_command("op", "low"), Priority::Low)
        .await
        .unwrap();
    fx.service
        .queue()
        .enqueue("m-2", tagged_command("op", "high"), Priority::High)
        .await
        .unwrap();
    assert_eq!(executor.call_count(), 0);

    fx.service.connectivity().report(true);

    assert!(wait_for(|| executor.call_count() == 2).await);
    assert_eq!(executor.executed_tags(), vec!["high", "low"]);
    assert_eq!(fx.service.queue().pending_count().await, 0);
}

#[tokio::test]
async fn events_emitted_offline_arrive_in_order_after_connect() {
    let fx = fixture(false).await;

    fx.service.channel().emit("first", json!({"n": 1})).await;
    fx.service.channel().emit("second", json!({"n": 2})).await;
    fx.service.channel().emit("third", json!({"n": 3})).await;

    fx.service.channel().connect("token-1").await.unwrap();

    assert!(wait_for(|| fx.handle.sent().len() == 3).await);
    assert_eq!(fx.handle.sent_events(), vec!["first", "second", "third"]);
    assert_eq!(fx.service.channel().buffered_count().await, 0);
}

#[tokio::test]
async fn rapid_connectivity_flips_never_double_execute() {
    let fx = fixture(false).await;
    let executor = ScriptedExecutor::new(ExecBehavior::Delay(Duration::from_millis(50)));
    fx.service.executors().register("op", executor.clone());

    fx.service
        .queue()
        .enqueue("m-1", tagged_command("op", "only"), Priority::Normal)
        .await
        .unwrap();

    // Two rapid offline->online flips: each online transition fires exactly
    // one drain, and the single-flight guard keeps them from overlapping.
    fx.service.connectivity().report(true);
    fx.service.connectivity().report(false);
    fx.service.connectivity().report(true);

    assert!(wait_for(|| executor.executed_tags() == vec!["only"]).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(executor.call_count(), 1);
    assert_eq!(fx.service.queue().pending_count().await, 0);
}

#[tokio::test]
async fn service_restart_rehydrates_the_queue() {
    let store = Arc::new(MemoryStore::new());

    {
        let fx = fixture_with_store(false, store.clone()).await;
        fx.service
            .queue()
            .enqueue("m-1", tagged_command("op", "a"), Priority::Normal)
            .await
            .unwrap();
        fx.service
            .queue()
            .enqueue("m-2", tagged_command("op", "b"), Priority::High)
            .await
            .unwrap();
    }

    // A fresh process over the same durable store sees the identical
    // pending set before any drain begins.
    let fx = fixture_with_store(false, store).await;
    assert_eq!(fx.service.queue().pending_ids().await, vec!["m-2", "m-1"]);

    let executor = ScriptedExecutor::new(ExecBehavior::Succeed);
    fx.service.executors().register("op", executor.clone());
    fx.service.connectivity().report(true);

    assert!(wait_for(|| executor.call_count() == 2).await);
    assert_eq!(executor.executed_tags(), vec!["b", "a"]);
}

#[tokio::test]
async fn online_transition_resumes_a_disconnected_channel() {
    let fx = fixture(false).await;

    fx.service.channel().connect("token-1").await.unwrap();
    fx.service.channel().disconnect().await;
    assert_eq!(fx.service.channel().status(), ChannelStatus::Disconnected);

    fx.service.connectivity().report(true);

    assert!(wait_for(|| fx.service.channel().status() == ChannelStatus::Connected).await);
    assert_eq!(fx.handle.connect_attempts(), 2);
}

#[tokio::test]
async fn inbound_events_reach_registered_consumers() {
    let fx = fixture(true).await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    fx.service.handlers().register("record.updated", move |payload| {
        log.lock()
            .unwrap()
            .push(payload.get("entity").cloned().unwrap_or_default());
        Ok(())
    });

    fx.service.channel().connect("token-1").await.unwrap();
    fx.handle.push_incoming(EventEnvelope::new(
        "record.updated",
        json!({"entity": "patient-12"}),
    ));

    assert!(wait_for(|| !seen.lock().unwrap().is_empty()).await);
    assert_eq!(*seen.lock().unwrap(), vec![json!("patient-12")]);
}

#[tokio::test]
async fn clear_queue_wipes_the_persisted_snapshot() {
    let fx = fixture(false).await;

    fx.service
        .queue()
        .enqueue("m-1", tagged_command("op", "a"), Priority::Normal)
        .await
        .unwrap();
    assert!(fx.store.get(crate::queue::QUEUE_KEY).await.unwrap().is_some());

    fx.service.queue().clear().await.unwrap();

    assert_eq!(fx.service.queue().pending_count().await, 0);
    assert_eq!(fx.store.get(crate::queue::QUEUE_KEY).await.unwrap(), None);
}
