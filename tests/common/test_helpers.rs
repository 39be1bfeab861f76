#![allow(dead_code)]

use futures::future::BoxFuture;
use helix_gate::{ApiRequest, ApiResponse, Credential, TokenCache};
use reqwest::{Method, StatusCode, Url};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower_service::Service;

pub const BANS: &str = "https://api.twitch.tv/helix/moderation/bans";
pub const USERS: &str = "https://api.twitch.tv/helix/users";

#[derive(Debug)]
pub struct MockError(pub &'static str);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mock transport failure: {}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Clone, Copy, Debug)]
pub enum Reply {
    Status(u16),
    Fail(&'static str),
}

/// Transport double: replays scripted replies (then 200s) after an optional delay and records
/// when each call was dispatched.
#[derive(Clone, Default)]
pub struct MockHelix {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<Mutex<Vec<(Instant, Method, String)>>>,
    completed: Arc<Mutex<usize>>,
    latency: Duration,
}

impl MockHelix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(replies: &[Reply]) -> Self {
        let mock = Self::new();
        mock.replies.lock().unwrap().extend(replies.iter().copied());
        mock
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<(Instant, Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn completed(&self) -> usize {
        *self.completed.lock().unwrap()
    }
}

impl Service<ApiRequest> for MockHelix {
    type Response = ApiResponse;
    type Error = MockError;
    type Future = BoxFuture<'static, Result<ApiResponse, MockError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        self.calls.lock().unwrap().push((
            Instant::now(),
            request.method().clone(),
            request.url().to_string(),
        ));
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Status(200));
        let latency = self.latency;
        let completed = self.completed.clone();
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            *completed.lock().unwrap() += 1;
            match reply {
                Reply::Status(code) => {
                    let status = StatusCode::from_u16(code).unwrap();
                    let body = if status.is_success() {
                        r#"{"data":[]}"#.to_string()
                    } else {
                        format!(
                            r#"{{"error":"{}","status":{},"message":"scripted"}}"#,
                            status.canonical_reason().unwrap_or("Error"),
                            code
                        )
                    };
                    Ok(ApiResponse::for_request(&request, status).with_body(body))
                }
                Reply::Fail(reason) => Err(MockError(reason)),
            }
        })
    }
}

/// Cache knowing `tok-a` (user 1) and `tok-b` (user 2) of the same client.
pub fn token_cache() -> Arc<TokenCache> {
    let cache = Arc::new(TokenCache::new());
    cache.insert(Credential::new("tok-a").with_client_id("cid").with_user_id("1"));
    cache.insert(Credential::new("tok-b").with_client_id("cid").with_user_id("2"));
    cache
}

pub fn request(method: Method, url: &str, token: Option<&str>) -> ApiRequest {
    let request = ApiRequest::new(method, Url::parse(url).unwrap());
    match token {
        Some(token) => request.with_bearer_token(token).unwrap(),
        None => request,
    }
}

pub fn ban(broadcaster: &str, token: &str) -> ApiRequest {
    request(Method::POST, &format!("{BANS}?broadcaster_id={broadcaster}&moderator_id=1"), Some(token))
}

pub fn unban(broadcaster: &str, user: &str, token: &str) -> ApiRequest {
    request(
        Method::DELETE,
        &format!("{BANS}?broadcaster_id={broadcaster}&moderator_id=1&user_id={user}"),
        Some(token),
    )
}
