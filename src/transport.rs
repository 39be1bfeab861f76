//! HTTP transport backed by `reqwest`.
//!
//! [`ReqwestTransport`] is the innermost service of the gate: it sends an [`ApiRequest`] and
//! buffers the whole response so that classification can read it without further I/O.
//! Non-2xx statuses are returned as responses, not errors.

use crate::request::{ApiRequest, ApiResponse};
use futures::future::BoxFuture;
use reqwest::Client;
use std::task::{Context, Poll};
use tower_service::Service;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn send(client: Client, request: ApiRequest) -> Result<ApiResponse, reqwest::Error> {
        let meta = request.meta();
        let (method, url, headers, body) = request.into_parts();

        let mut builder = client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        trace!(
            target: "helix_gate::transport",
            method = %meta.method,
            url = %meta.url,
            status = status.as_u16(),
            bytes = body.len(),
            "response received"
        );

        Ok(ApiResponse::new(status, meta).with_headers(headers).with_body(body.to_vec()))
    }
}

impl From<Client> for ReqwestTransport {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}

impl Service<ApiRequest> for ReqwestTransport {
    type Response = ApiResponse;
    type Error = reqwest::Error;
    type Future = BoxFuture<'static, Result<ApiResponse, reqwest::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        Box::pin(Self::send(self.client.clone(), request))
    }
}
