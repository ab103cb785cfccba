use axum::response::{IntoResponse, Response};

use crate::config::ProviderKind;

const PLAIN_TEXT_UTF8: &str = "text/plain; charset=utf-8";
const UPSTREAM_ERROR_MAX_LEN: usize = 2_000;

/// Error type used across the proxy.
///
/// Every variant renders to a plain-text diagnostic; the chat endpoint never
/// answers with a structured error body.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{provider} API key is not configured (set {env_var})")]
    MissingApiKey {
        provider: &'static str,
        env_var: String,
    },
    #[error("Request to {provider} failed ({status}): {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("Request to {provider} failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
}

impl ProxyError {
    #[must_use]
    pub fn upstream(provider: ProviderKind, status: u16, body: &[u8]) -> Self {
        ProxyError::Upstream {
            provider: provider.display_name(),
            status,
            message: upstream_error_text(body),
        }
    }

    #[must_use]
    pub fn transport(provider: ProviderKind, message: impl Into<String>) -> Self {
        ProxyError::Transport {
            provider: provider.display_name(),
            message: message.into(),
        }
    }

    /// HTTP status for the plain-text response.
    ///
    /// Provider-side failures are reported with 200 so the client renders
    /// them through the same text path as a normal answer.
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            ProxyError::Config(_)
            | ProxyError::MissingApiKey { .. }
            | ProxyError::Upstream { .. }
            | ProxyError::Transport { .. } => http::StatusCode::OK,
        }
    }
}

/// Extract a readable message from an upstream error body.
///
/// Prefers `error.message` (or a string `error`) from JSON payloads, otherwise
/// the raw body text. Output is bounded.
#[must_use]
pub fn upstream_error_text(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(serde_json::Value::as_str)
            .or_else(|| json.get("detail").and_then(serde_json::Value::as_str));
        if let Some(message) = message {
            return truncate_chars(message.trim(), UPSTREAM_ERROR_MAX_LEN);
        }
    }
    let text = String::from_utf8_lossy(body);
    truncate_chars(text.trim(), UPSTREAM_ERROR_MAX_LEN)
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Build a plain-text response with the given status.
#[must_use]
pub fn plain_text_response(status: http::StatusCode, body: impl Into<axum::body::Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(PLAIN_TEXT_UTF8),
    );
    response
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        plain_text_response(self.http_status(), self.to_string())
    }
}
