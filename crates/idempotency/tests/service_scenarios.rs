//! End-to-end scenarios against the public `idempotency` API.

#![allow(clippy::unwrap_used)] // integration tests favor unwrap over explicit error handling

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use idempotency::{IdempotencyError, InMemoryStorage, Service, Storage};

#[tokio::test]
async fn single_key_success_runs_once_and_replays() {
    let service = Service::new(Arc::new(InMemoryStorage::new())).with_ttl(Duration::from_secs(300));
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = Arc::clone(&calls);
    let first: idempotency::Result<String> = service
        .execute("k1", || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<String, String>("ok".to_string())
        })
        .await;
    assert_eq!(first.unwrap(), "ok");

    let calls_clone = Arc::clone(&calls);
    let second: idempotency::Result<String> = service
        .execute("k1", || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<String, String>("different".to_string())
        })
        .await;
    assert_eq!(second.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_key_failure_is_cached_for_later_callers() {
    let service = Service::new(Arc::new(InMemoryStorage::new()));

    let first: idempotency::Result<String> = service.execute("k2", || async { Err::<String, _>("failed") }).await;
    assert!(matches!(first, Err(IdempotencyError::OperationFailed { ref reason, .. }) if reason == "failed"));

    let second: idempotency::Result<String> = service.execute("k2", || async { Ok::<String, String>("ok".to_string()) }).await;
    match second {
        Err(IdempotencyError::PreviouslyFailed { message, .. }) => assert_eq!(message, "failed"),
        other => panic!("expected PreviouslyFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_claim_race_yields_exactly_one_winner() {
    let service = Arc::new(Service::new(Arc::new(InMemoryStorage::new())));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&service);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            service
                .execute("k4", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<String, String>("result".to_string())
                })
                .await
        }));
    }

    let mut successes = 0;
    let mut already_processing = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(value) => {
                assert_eq!(value, "result");
                successes += 1;
            }
            Err(IdempotencyError::AlreadyProcessing { .. }) => already_processing += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_processing, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ttl_expiry_allows_a_clean_reclaim() {
    let storage = Arc::new(InMemoryStorage::new());
    let service = Service::new(Arc::clone(&storage) as Arc<dyn Storage>).with_ttl(Duration::from_millis(100));

    let _: idempotency::Result<String> = service.execute("k6", || async { Ok::<String, String>("first".to_string()) }).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(storage.load("k6").await.unwrap().is_none());

    let second: idempotency::Result<String> = service.execute("k6", || async { Ok::<String, String>("second".to_string()) }).await;
    assert_eq!(second.unwrap(), "second");
}
