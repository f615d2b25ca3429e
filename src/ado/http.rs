//! HTTP utilities for Azure DevOps REST API calls

use crate::error::{AdoError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use super::auth::Credentials;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Upper bound for one request, connection and body included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Header list endpoints such as builds use for the next page
pub const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Status code and decoded body of a completed request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
    /// Value of the continuation header, when the backend sent one
    pub continuation_token: Option<String>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            continuation_token: None,
        }
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.continuation_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Backend-supplied error message, when the payload carries one
    pub fn backend_message(&self) -> String {
        self.body
            .get("message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| match &self.body {
                Value::Null => describe_status(self.status).to_string(),
                Value::String(s) => sanitize_for_log(s),
                other => sanitize_for_log(&other.to_string()),
            })
    }

    /// True when the backend reports the addressed resource does not exist
    pub fn is_not_found(&self) -> bool {
        if self.status == 404 {
            return true;
        }
        self.body
            .get("typeKey")
            .and_then(|v| v.as_str())
            .map(|t| t.contains("NotFound"))
            .unwrap_or(false)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

/// The HTTP session collaborator: issues one authenticated request and decodes
/// the response body. Only connection and decoding failures are errors, every
/// status code is returned to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, body: Option<&Value>)
        -> Result<TransportResponse>;
}

/// HTTP client wrapper for Azure DevOps API calls
#[derive(Clone)]
pub struct AdoHttpClient {
    client: Client,
    credentials: Credentials,
}

impl AdoHttpClient {
    /// Create a new HTTP client
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_timeout(credentials, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("adokit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AdoError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl Transport for AdoHttpClient {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<TransportResponse> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.credentials.email, Some(self.credentials.pat()));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdoError::transport(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let continuation = response
            .headers()
            .get(CONTINUATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let text = response
            .text()
            .await
            .map_err(|e| AdoError::transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                // Error pages are frequently HTML, keep them as text for the message
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => {
                    return Err(AdoError::transport(format!(
                        "Failed to parse response JSON: {}",
                        e
                    )))
                },
            }
        };

        let response = TransportResponse::new(status.as_u16(), body);
        Ok(match continuation {
            Some(token) => response.with_continuation_token(token),
            None => response,
        })
    }
}

/// Short human-readable explanation of an HTTP status
pub fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Check your parameters.",
        401 => "Authentication failed. Check ADO_EMAIL and ADO_PAT.",
        403 => "Permission denied. Check the scopes of your personal access token.",
        404 => "Resource not found.",
        409 => "Resource conflict. The resource may already exist or be in use.",
        429 => "Rate limit exceeded. Please try again later.",
        500 | 503 => "Azure DevOps service temporarily unavailable. Please try again.",
        _ => "Request failed.",
    }
}
