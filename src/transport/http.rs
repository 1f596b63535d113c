/// HTTP transport backed by reqwest.
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::types::HttpMethod;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: request.url.clone(),
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::BodyUnreadable {
                url: request.url.clone(),
                message: e.to_string(),
            })?;
        debug!(method = %request.method, url = %request.url, status, "http response");
        Ok(HttpResponse { status, body })
    }
}
