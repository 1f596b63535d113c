use crate::types::HttpMethod;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod http;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },
    #[error("Failed to read response body from {url}: {message}")]
    BodyUnreadable { url: String, message: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_payment_required(&self) -> bool {
        self.status == 402
    }

    /// Body as JSON; non-JSON text becomes a string value, an empty body `null`.
    pub fn json_body(&self) -> Value {
        let text = self.body.trim();
        if text.is_empty() {
            return Value::Null;
        }
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

/// Issues one HTTP request and hands back status and body.
///
/// A non-2xx status is a normal response, not an error; errors are reserved
/// for requests that never produced a response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
