//! Outbound request and buffered response types exchanged with the binding layer.
//!
//! Requests arrive fully formed; this crate only inspects the `Authorization` header, the URL
//! path and the query string to pick rate-limit buckets.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};

/// Prefix of an OAuth bearer `Authorization` value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// A fully formed outbound call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach `Authorization: Bearer <token>`, replacing any existing value.
    pub fn with_bearer_token(mut self, token: &str) -> Result<Self, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// First value of the query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    /// The token from the first `Authorization: Bearer ...` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .filter(|t| !t.is_empty())
    }

    /// Method, URL and headers, without the body.
    pub fn meta(&self) -> RequestMeta {
        RequestMeta {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (Method, Url, HeaderMap, Option<Vec<u8>>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// The parts of the originating request kept alongside a response for diagnostics.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

/// A completed response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    request: RequestMeta,
}

impl ApiResponse {
    pub fn new(status: StatusCode, request: RequestMeta) -> Self {
        Self { status, headers: HeaderMap::new(), body: Vec::new(), request }
    }

    /// Convenience for transports: a response to `request` with the given status.
    pub fn for_request(request: &ApiRequest, status: StatusCode) -> Self {
        Self::new(status, request.meta())
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn request(&self) -> &RequestMeta {
        &self.request
    }
}
