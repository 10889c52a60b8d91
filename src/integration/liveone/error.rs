//! Error handling for the LiveOne push client.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Response JSON error: {0}")]
    ResponseJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Push configuration problems, reported once and latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("LIVEONE_API_KEY must be a non-empty string starting with 'fr_'")]
    InvalidApiKey,
    #[error("LIVEONE_SERVER must be a non-empty http:// or https:// URL")]
    InvalidServer,
    #[error("LIVEONE_ENABLED must be exactly 'true' or 'false'")]
    InvalidEnabled,
}

/// Classifies a transport failure for the push self-test event.
pub fn classify_failure(error: &Error) -> String {
    let Error::RequestFailed(error) = error else {
        return "invalid response".to_string();
    };
    if error.is_timeout() {
        return "timeout".to_string();
    }
    if let Some(status) = error.status() {
        return format!("HTTP {}", status.as_u16());
    }
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return "refused".to_string();
            }
        }
        if cause.to_string().to_lowercase().contains("dns") {
            return "dns".to_string();
        }
        source = cause.source();
    }
    "network".to_string()
}
