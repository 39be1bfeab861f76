use criterion::{black_box, criterion_group, criterion_main, Criterion};
use helix_gate::{
    ApiRequest, ApiResponse, Bandwidth, BucketRegistry, Credential, RateLimitKey,
    RateLimitedExecutor, TokenBucket, TokenCache,
};
use futures::future::Ready;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tower::Service;

// Answers every request with an empty 200.
#[derive(Clone)]
struct EchoService;

impl Service<ApiRequest> for EchoService {
    type Response = ApiResponse;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ApiRequest) -> Self::Future {
        futures::future::ready(Ok(ApiResponse::for_request(&req, StatusCode::OK)))
    }
}

// Refills faster than the benchmark can drain it.
fn unlimited() -> Bandwidth {
    Bandwidth::new(u32::MAX, Duration::from_secs(1)).unwrap()
}

fn bucket_try_consume(c: &mut Criterion) {
    let bucket = TokenBucket::new(unlimited());

    c.bench_function("token_bucket_try_consume", |b| {
        b.iter(|| black_box(bucket.try_consume(black_box(1))));
    });
}

fn registry_lookup(c: &mut Criterion) {
    let registry = BucketRegistry::new(unlimited());
    let key = RateLimitKey::principal("cid:42");
    registry.get_or_create_bucket(&key);

    c.bench_function("bucket_registry_existing_key", |b| {
        b.iter(|| black_box(registry.get_or_create_bucket(black_box(&key))));
    });
}

fn executor_unthrottled_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tokens = Arc::new(TokenCache::new());
    tokens.insert(Credential::new("bench").with_client_id("cid").with_user_id("42"));
    let exec = RateLimitedExecutor::new(EchoService, Arc::new(BucketRegistry::new(unlimited())), tokens);
    let request = ApiRequest::get(Url::parse("https://api.twitch.tv/helix/users").unwrap())
        .with_bearer_token("bench")
        .unwrap();

    c.bench_function("executor_token_available", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(exec.execute(request.clone(), Duration::from_secs(1)).await);
        });
    });
}

criterion_group!(benches, bucket_try_consume, registry_lookup, executor_unthrottled_path);
criterion_main!(benches);
