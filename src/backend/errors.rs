use thiserror::Error;

/// Shown when the request never produced a response
pub const NETWORK_UNREACHABLE: &str = "网络连接失败，请检查网络设置";

/// Failures below the application level: nothing usable came back from the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Request timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Http { status: u16, message: Option<String> },

    #[error("Unexpected response from backend: {0}")]
    Protocol(String),

    #[error("Invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Message for the person filling the form. Server text wins, then the
    /// generic network message, then the raw error.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Http {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            BackendError::Http { status, .. } => format!("请求失败 ({status})"),
            BackendError::Timeout { .. } | BackendError::Network(_) => {
                NETWORK_UNREACHABLE.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, BackendError::Protocol(_))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Protocol(err.to_string())
    }
}

impl BackendError {
    pub(crate) fn from_transport(err: reqwest::Error, operation: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            }
        } else if err.is_decode() {
            BackendError::Protocol(err.to_string())
        } else if err.is_builder() {
            BackendError::Config(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}
