use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NovaError {
    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Upstream protocol error{}: {detail}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    UpstreamProtocolError { status: Option<u16>, detail: String },

    #[error("Not found: {what}")]
    NotFoundError { what: String },

    #[error("Timed out after {after:?}: {operation}")]
    TimeoutError { operation: String, after: Duration },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}' ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("XML parsing error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Event stream error: {message}")]
    EventStreamError { message: String },
}

pub type Result<T> = std::result::Result<T, NovaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Upstream,
    NotFound,
    Timeout,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl NovaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn upstream(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::UpstreamProtocolError {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFoundError { what: what.into() }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::TimeoutError {
            operation: operation.into(),
            after,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// reqwest 的逾時錯誤歸類為 TimeoutError，其餘保留原樣
    pub fn from_http(operation: &str, after: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(operation, after)
        } else if err.is_connect() {
            Self::upstream(None, format!("{}: connection failed: {}", operation, err))
        } else {
            Self::ApiError(err)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError { .. } => ErrorCategory::Validation,
            Self::UpstreamProtocolError { .. } | Self::ApiError(_) | Self::SshError(_) => {
                ErrorCategory::Upstream
            }
            Self::NotFoundError { .. } => ErrorCategory::NotFound,
            Self::TimeoutError { .. } => ErrorCategory::Timeout,
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_)
            | Self::SerializationError(_)
            | Self::XmlError(_)
            | Self::EventStreamError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::NotFound => ErrorSeverity::Low,
            ErrorCategory::Upstream | ErrorCategory::Timeout => ErrorSeverity::Medium,
            ErrorCategory::System => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 對外回應使用的 HTTP 狀態碼
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Upstream => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Timeout => 504,
            ErrorCategory::Configuration | ErrorCategory::System => 500,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ValidationError { message } => format!("Invalid request: {}", message),
            Self::UpstreamProtocolError {
                status: Some(status),
                detail,
            } => format!("Controller answered with HTTP {}: {}", status, detail),
            Self::UpstreamProtocolError { status: None, detail } => {
                format!("Device or controller call failed: {}", detail)
            }
            Self::TimeoutError { operation, after } => {
                format!("{} did not complete within {}s", operation, after.as_secs())
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "Provide component-name, frequency and target power in the request body",
            ErrorCategory::Upstream => "Check device/controller reachability and credentials, then retry",
            ErrorCategory::NotFound => "Make sure the payload template or capability exists",
            ErrorCategory::Timeout => "Increase the configured timeout or check network latency",
            ErrorCategory::Configuration => "Fix the configuration file and restart",
            ErrorCategory::System => "Inspect the logs for details",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(NovaError::validation("x").status_code(), 400);
        assert_eq!(NovaError::upstream(Some(500), "boom").status_code(), 400);
        assert_eq!(NovaError::not_found("tpl").status_code(), 404);
        assert_eq!(
            NovaError::timeout("commit", Duration::from_secs(3)).status_code(),
            504
        );
        assert_eq!(NovaError::config("missing").status_code(), 500);
    }

    #[test]
    fn test_upstream_message_carries_status() {
        let err = NovaError::upstream(Some(503), "unavailable");
        assert_eq!(
            err.to_string(),
            "Upstream protocol error (HTTP 503): unavailable"
        );
        let err = NovaError::upstream(None, "rpc-error");
        assert_eq!(err.to_string(), "Upstream protocol error: rpc-error");
    }

    #[test]
    fn test_configuration_is_critical() {
        assert_eq!(
            NovaError::config("no creds").severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(NovaError::validation("x").severity(), ErrorSeverity::Low);
    }
}
