//! End-to-end scenarios against the public `pgnotify` API.

#![allow(clippy::unwrap_used)] // integration tests favor unwrap over explicit error handling

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use pgnotify::{Hooks, InMemoryConnectionProvider, Notifier, NotifierConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn pgnotify_round_trip_within_100ms() {
    let provider = Arc::new(InMemoryConnectionProvider::new());
    let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();

    let received = Arc::new(Mutex::new(None));
    let received_clone = Arc::clone(&received);
    notifier
        .subscribe(
            "events",
            Arc::new(move |n| {
                let received = Arc::clone(&received_clone);
                Box::pin(async move {
                    *received.lock().unwrap() = Some((n.channel, n.payload));
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    let notifier_clone = Arc::clone(&notifier);
    let ctx_clone = ctx.clone();
    let handle = tokio::spawn(async move { notifier_clone.start(ctx_clone).await });

    notifier.publish("events", b"Hello, World!").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (channel, payload) = received.lock().unwrap().clone().expect("callback should have fired");
    assert_eq!(channel, "events");
    assert_eq!(payload, b"Hello, World!");

    ctx.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_and_re_register_listeners() {
    let provider = Arc::new(InMemoryConnectionProvider::new());
    let mut config = NotifierConfig::default();
    config.reconnect_interval = Duration::from_millis(10);
    config.max_reconnect_interval = Duration::from_millis(80);

    let disconnects = Arc::new(AtomicU32::new(0));
    let disconnects_clone = Arc::clone(&disconnects);
    let reconnect_delays = Arc::new(Mutex::new(Vec::new()));
    let delays_clone = Arc::clone(&reconnect_delays);
    let reconnected = Arc::new(AtomicU32::new(0));
    let reconnected_clone = Arc::clone(&reconnected);

    let hooks = Hooks::builder()
        .on_disconnect(move |_e| {
            disconnects_clone.fetch_add(1, Ordering::SeqCst);
        })
        .on_reconnect_attempt(move |_attempt, delay| {
            delays_clone.lock().unwrap().push(delay);
        })
        .on_reconnect_success(move |_attempt| {
            reconnected_clone.fetch_add(1, Ordering::SeqCst);
        });

    let notifier = Notifier::new(provider.clone(), config, hooks).unwrap();

    for channel in ["a", "b", "c"] {
        notifier.subscribe(channel, Arc::new(|_n| Box::pin(async { Ok(()) }))).await.unwrap();
    }
    assert_eq!(provider.listened_channels().await, vec!["a", "b", "c"]);

    let ctx = CancellationToken::new();
    let notifier_clone = Arc::clone(&notifier);
    let ctx_clone = ctx.clone();
    let handle = tokio::spawn(async move { notifier_clone.start(ctx_clone).await });

    provider.set_connected(false);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(reconnected.load(Ordering::SeqCst) >= 1);
    assert_eq!(provider.listened_channels().await, vec!["a", "b", "c"]);

    let delays = reconnect_delays.lock().unwrap().clone();
    assert!(!delays.is_empty());
    for pair in delays.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert!(delays.iter().all(|d| *d <= Duration::from_millis(80)));

    ctx.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_outstanding_callbacks() {
    let provider = Arc::new(InMemoryConnectionProvider::new());
    let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let completed_clone = Arc::clone(&completed);
    notifier
        .subscribe(
            "events",
            Arc::new(move |_n| {
                let completed = Arc::clone(&completed_clone);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    let ctx = CancellationToken::new();
    let notifier_clone = Arc::clone(&notifier);
    let handle = tokio::spawn(async move { notifier_clone.start(ctx).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    notifier.publish("events", b"x").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    notifier.shutdown(CancellationToken::new()).await.unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    handle.await.unwrap().unwrap();
}
