//! HTTP transport
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. The agent keeps a
//! cookie jar so the long-lived refresh cookie set at sign-in is sent back
//! on `/auth/refresh`.

use anyhow::Result;
use log::debug;
use std::time::Duration;
use ureq::{Agent, RequestBuilder};
use url::Url;

use super::{ApiError, ApiRequest, ApiResponse, Body, Method};
use crate::config::ClientConfig;

/// Sends a fully-stamped request and returns whatever the server answered
///
/// Implementations return `Err` only when no response was received; every
/// HTTP status (including 401) comes back as an `ApiResponse`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Blocking transport backed by a ureq agent
pub struct UreqTransport {
    agent: Agent,
    api_url: Url,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let api_url = config.api_url()?;
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self { agent, api_url })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let raw = format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|e| ApiError::Transport(format!("{}: {}", raw, e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, request: &ApiRequest) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(request)?;
        debug!("{:?} {}", request.method, url);

        let result = match request.method {
            Method::Get => with_headers(self.agent.get(url.as_str()), request).call(),
            Method::Post => {
                let builder = with_headers(self.agent.post(url.as_str()), request);
                match &request.body {
                    Body::Empty => builder.send_empty(),
                    Body::Json(value) => builder.send_json(value),
                    Body::Form(fields) => builder
                        .send_form(fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
                }
            }
        };

        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(ApiResponse::new(status, body))
    }
}
