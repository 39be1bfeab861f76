mod common;

use common::test_helpers::{ban, request, token_cache, unban, MockHelix, Reply, USERS};
use helix_gate::{
    Bandwidth, BucketRegistry, EndpointScope, GateConfig, GateError, RateLimitKey,
    RateLimitedExecutor, RateLimitedLayer,
};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::{ServiceBuilder, ServiceExt};

fn executor(mock: &MockHelix, registry: BucketRegistry) -> RateLimitedExecutor<MockHelix> {
    RateLimitedExecutor::new(mock.clone(), Arc::new(registry), token_cache())
}

fn per_second(capacity: u32) -> Bandwidth {
    Bandwidth::new(capacity, Duration::from_secs(1)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn empty_bucket_delays_dispatch_until_refill() {
    let mock = MockHelix::new();
    let exec = executor(&mock, BucketRegistry::new(per_second(1)));

    exec.execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(5)).await.unwrap();
    let second = exec
        .execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(5))
        .await
        .expect("second call should complete after one refill");
    assert_eq!(second.status(), StatusCode::OK);

    let calls = mock.calls();
    let gap = calls[1].0 - calls[0].0;
    assert!(gap >= Duration::from_secs(1), "dispatched too early: {gap:?}");
    assert!(gap < Duration::from_millis(1100), "dispatched too late: {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn ban_and_unban_share_the_broadcaster_bucket() {
    let mock = MockHelix::new();
    let config = GateConfig::builder()
        .endpoint_bandwidth(EndpointScope::ModerationBans, 1, Duration::from_secs(10))
        .build()
        .unwrap();
    let exec = executor(&mock, config.registry());
    let timeout = Duration::from_secs(30);
    let start = Instant::now();

    exec.execute(ban("123", "tok-a"), timeout).await.unwrap();
    // Another broadcaster has its own bucket.
    exec.execute(ban("456", "tok-a"), timeout).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);

    // A different moderator still waits on broadcaster 123.
    exec.execute(unban("123", "99", "tok-b"), timeout).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(10));

    let calls = mock.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].1, Method::DELETE);
    assert!(exec
        .registry()
        .contains(&RateLimitKey::endpoint(EndpointScope::ModerationBans, "123")));
}

#[tokio::test(start_paused = true)]
async fn unknown_credentials_are_not_throttled() {
    let mock = MockHelix::new();
    let exec = executor(&mock, BucketRegistry::new(Bandwidth::new(1, Duration::from_secs(60)).unwrap()));
    let start = Instant::now();

    for token in [Some("stranger"), None, Some("stranger")] {
        let response = exec
            .execute(request(Method::GET, USERS, token), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(mock.call_count(), 3);
    assert!(exec.registry().is_empty());
}

#[tokio::test]
async fn transport_failures_pass_through_unchanged() {
    let mock = MockHelix::replying(&[Reply::Fail("connection reset"), Reply::Status(500)]);
    let exec = executor(&mock, BucketRegistry::default());

    let err = exec
        .execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert_eq!(err.into_transport().unwrap().0, "connection reset");

    // Error statuses are responses at this layer.
    let response = exec
        .execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn timed_out_wait_consumes_nothing() {
    let mock = MockHelix::new();
    let exec = executor(&mock, BucketRegistry::new(Bandwidth::new(1, Duration::from_secs(10)).unwrap()));

    exec.execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(1)).await.unwrap();

    let err = exec
        .execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(2))
        .await
        .unwrap_err();
    match err {
        GateError::Timeout { elapsed, timeout } => {
            assert_eq!(timeout, Duration::from_secs(2));
            assert!(elapsed >= timeout);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(mock.call_count(), 1);

    // The refill at t=10s is still available to the next caller.
    tokio::time::advance(Duration::from_secs(8)).await;
    let start = Instant::now();
    exec.execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_millis(1))
        .await
        .expect("token should not have been taken by the abandoned wait");
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn endpoint_timeout_keeps_principal_token_spent() {
    let mock = MockHelix::new();
    let config = GateConfig::builder()
        .principal_bandwidth(10, Duration::from_secs(1000))
        .endpoint_bandwidth(EndpointScope::ModerationBans, 1, Duration::from_secs(60))
        .build()
        .unwrap();
    let exec = executor(&mock, config.registry());

    exec.execute(ban("123", "tok-a"), Duration::from_secs(1)).await.unwrap();
    let err = exec.execute(ban("123", "tok-a"), Duration::from_secs(1)).await.unwrap_err();
    assert!(err.is_timeout());

    let principal = exec.registry().get_or_create_bucket(&RateLimitKey::principal("cid:1"));
    assert_eq!(principal.available_tokens(), 8);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_call_times_out_but_keeps_running() {
    let mock = MockHelix::new().with_latency(Duration::from_secs(5));
    let exec = executor(&mock, BucketRegistry::default());

    let err = exec
        .execute(request(Method::POST, USERS, Some("tok-a")), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(mock.call_count(), 1);
    assert_eq!(mock.completed(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_are_spaced_by_the_refill_interval() {
    let mock = MockHelix::new();
    let exec = executor(&mock, BucketRegistry::new(per_second(2)));
    let start = Instant::now();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            tokio::spawn(exec.execute(request(Method::GET, USERS, Some("tok-a")), Duration::from_secs(10)))
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut offsets: Vec<_> = mock.calls().into_iter().map(|(at, _, _)| at - start).collect();
    offsets.sort();
    assert_eq!(offsets.iter().filter(|d| d.is_zero()).count(), 2);
    let last = *offsets.last().unwrap();
    assert!(last >= Duration::from_secs(2), "last dispatch at {last:?}");
    assert!(last < Duration::from_millis(2100), "last dispatch at {last:?}");
}

#[tokio::test(start_paused = true)]
async fn layer_composes_with_service_builder() {
    let mock = MockHelix::new();
    let registry = Arc::new(BucketRegistry::new(per_second(1)));
    let svc = ServiceBuilder::new()
        .layer(RateLimitedLayer::new(registry.clone(), token_cache()).with_timeout(Duration::from_millis(500)))
        .service(mock.clone());

    let ok = svc.clone().oneshot(request(Method::GET, USERS, Some("tok-a"))).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let err = svc.clone().oneshot(request(Method::GET, USERS, Some("tok-a"))).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(mock.call_count(), 1);
    assert!(registry.contains(&RateLimitKey::principal("cid:1")));
}
