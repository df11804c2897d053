//! HTTP plumbing for the mail REST API
//!
//! This module provides:
//! - Request/response values that can be stamped, queued and replayed
//! - The `Transport` seam with a blocking ureq implementation
//! - Envelope normalization for payloads in `.data` or at the root

pub mod envelope;
mod mock;
mod transport;

pub use mock::MockTransport;
pub use transport::{Transport, UreqTransport};

use serde_json::Value;

use crate::session::RefreshError;

/// HTTP status reported for an expired or missing credential
pub const UNAUTHORIZED: u16 = 401;

/// Errors surfaced by API calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset, ...)
    #[error("Transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status
    #[error("Request to {path} failed with status {status}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    /// A 401 that is not eligible for refresh (refresh endpoint, or already retried)
    #[error("Not authorized to call {path}")]
    Unauthorized { path: String },
    /// The session could not be refreshed
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    /// The response body was not in the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status of the failure, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(UNAUTHORIZED),
            _ => None,
        }
    }

    /// Whether the call failed because the session was torn down
    ///
    /// Local state has already been purged when this is true, so callers
    /// must not write their pre-call state back.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, ApiError::Refresh(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    /// Form fields, sent url-encoded
    Form(Vec<(String, String)>),
}

/// A request against the API, relative to the configured API root
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, e.g. `/mail/mailboxes`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Set once the request has been replayed after a refresh
    pub retried: bool,
    /// Whether a 401 on this request may trigger a session refresh
    pub refreshable: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            retried: false,
            refreshable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Body::Form(fields);
        self
    }

    /// Mark the request as one whose 401 must be surfaced directly
    pub fn without_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }

    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Stamp a bearer credential onto the request
    pub fn set_bearer(&mut self, token: &str) {
        self.set_header("Authorization", format!("Bearer {}", token));
    }

    /// The bearer credential currently stamped on the request
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Whether the request path contains the given endpoint
    pub fn targets(&self, endpoint: &str) -> bool {
        self.path.contains(endpoint)
    }
}

/// A response from the API
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response carrying a JSON body
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as (lossy) UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON; an empty body reads as `null`
    pub fn json_value(&self) -> Result<Value, ApiError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Convert a non-success status into an error
    pub fn error_for_status(self, path: &str) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                path: path.to_string(),
                status: self.status,
                body: self.text(),
            })
        }
    }
}
