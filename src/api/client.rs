//! Throttled, retrying JSON client.
//!
//! `ThrottledClient` owns one `ThrottleGate` and one `RetryPolicy`. Every
//! attempt goes through the gate, so retries are rate limited too. HTTP
//! status codes are classified into the error taxonomy here and nowhere else.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::retry::RetryPolicy;
use super::throttle::ThrottleGate;
use crate::error::LadderError;

/// Header list passed alongside a request.
pub type Headers = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

/// Raw response: status plus body text. Classification happens in the client.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// The bare network hop, without throttling or retries.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, LadderError>;
}

// ---------------------------------------------------------------------------
// reqwest transport
// ---------------------------------------------------------------------------

pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, LadderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("LADDERBOT/0.1.0 (limit-order-agent)")
            .build()
            .map_err(|e| LadderError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, LadderError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ApiResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Throttled client
// ---------------------------------------------------------------------------

pub struct ThrottledClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    gate: ThrottleGate,
    retry: RetryPolicy,
}

impl<T: HttpTransport> ThrottledClient<T> {
    pub fn new(transport: T, gate: ThrottleGate, retry: RetryPolicy) -> Self {
        Self { transport, gate, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    pub async fn get(&self, url: &str, headers: &Headers) -> Result<Value, LadderError> {
        self.get_with(self.retry, url, headers).await
    }

    pub async fn post(&self, url: &str, body: &Value, headers: &Headers) -> Result<Value, LadderError> {
        self.post_with(self.retry, url, body, headers).await
    }

    /// GET with an explicit retry policy (e.g. `RetryPolicy::none()`).
    pub async fn get_with(
        &self,
        policy: RetryPolicy,
        url: &str,
        headers: &Headers,
    ) -> Result<Value, LadderError> {
        let request = ApiRequest {
            method: Method::Get,
            url: url.to_string(),
            headers: headers.clone(),
            body: None,
        };
        policy.run("GET", || self.execute(request.clone())).await
    }

    pub async fn post_with(
        &self,
        policy: RetryPolicy,
        url: &str,
        body: &Value,
        headers: &Headers,
    ) -> Result<Value, LadderError> {
        let request = ApiRequest {
            method: Method::Post,
            url: url.to_string(),
            headers: headers.clone(),
            body: Some(body.clone()),
        };
        policy.run("POST", || self.execute(request.clone())).await
    }

    /// One gated attempt: wait for the gate, dispatch, classify, cool down.
    async fn execute(&self, request: ApiRequest) -> Result<Value, LadderError> {
        self.gate.acquire().await;

        let url = request.url.clone();
        debug!(method = ?request.method, url = %url, "Dispatching API request");
        let outcome = self.transport.send(request).await;

        self.gate.cooldown().await;

        let response = outcome?;
        classify(&url, response)
    }
}

/// Map a raw response onto the error taxonomy, parsing JSON on success.
pub fn classify(url: &str, response: ApiResponse) -> Result<Value, LadderError> {
    if !(200..300).contains(&response.status) {
        return Err(LadderError::from_status(url, response.status, response.body));
    }
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| {
        LadderError::DataIntegrity(format!("malformed JSON from {url}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
