mod common;

use common::test_helpers::{request, token_cache};
use helix_gate::{ErrorKind, GateConfig, GateError, HelixClient, ReqwestTransport};
use reqwest::{Method, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HelixClient<ReqwestTransport> {
    HelixClient::with_reqwest(GateConfig::default(), token_cache())
}

#[tokio::test]
async fn forwards_request_and_buffers_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/helix/users"))
        .and(query_param("login", "ninja"))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":[{"id":"19571641"}]}"#)
                .insert_header("ratelimit-remaining", "799"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/helix/users?login=ninja", server.uri());
    let response = client().send(request(Method::GET, &url, Some("tok-a"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), r#"{"data":[{"id":"19571641"}]}"#);
    assert_eq!(response.headers().get("ratelimit-remaining").unwrap(), "799");
    assert_eq!(response.request().url.as_str(), url);
    assert_eq!(response.request().method, Method::GET);
}

#[tokio::test]
async fn forwards_method_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/helix/moderation/bans"))
        .and(query_param("broadcaster_id", "123"))
        .and(body_string(r#"{"data":{"user_id":"9","reason":"spam"}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/helix/moderation/bans?broadcaster_id=123&moderator_id=1", server.uri());
    let ban = request(Method::POST, &url, Some("tok-a"))
        .with_body(r#"{"data":{"user_id":"9","reason":"spam"}}"#);
    let response = client().send(ban).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthorized_is_classified_with_request_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/helix/users"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/helix/users?id=42", server.uri());
    let err = client().send(request(Method::GET, &url, Some("tok-a"))).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let context = err.context().unwrap();
    assert_eq!(context.request_url, url);
    assert_eq!(context.request_method, "GET");
    assert_eq!(context.status, 401);
    assert!(context.response_body.contains("Invalid OAuth token"));
}

#[tokio::test]
async fn error_statuses_are_responses_at_the_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let url = format!("{}/helix/users", server.uri());
    let response = ReqwestTransport::default()
        .oneshot(request(Method::GET, &url, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body(), b"boom");
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    // Bind then release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let url = format!("http://127.0.0.1:{port}/helix/users");

    let err = client().send(request(Method::GET, &url, Some("tok-a"))).await.unwrap_err();

    assert!(err.is_transport());
    match err {
        GateError::Transport(e) => {
            assert!(e.is_connect(), "expected a connect error, got {e:?}");
            assert!(e.url().is_some_and(|u| u.as_str() == url));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}
