//! Error handling for the Fronius Solar API client.

use strum_macros::Display;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Response JSON error: {0}")]
    ResponseJsonError(#[from] serde_json::Error),
    #[error("Value parse error: {0}")]
    ValueParseError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the device answered but the body did not have the expected
    /// shape. Such calls fail softly: no fault code is raised.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::ResponseJsonError(_) | Error::ValueParseError(_))
    }
}

/// Transport failure classes recorded as inverter fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorClass {
    #[strum(serialize = "TIMEOUT")]
    Timeout,
    #[strum(serialize = "CONNECTION_REFUSED")]
    ConnectionRefused,
    #[strum(serialize = "HOST_UNREACHABLE")]
    HostUnreachable,
    #[strum(to_string = "HTTP_{0}")]
    Http(u16),
    #[strum(serialize = "NETWORK_ERROR")]
    NetworkError,
    #[strum(serialize = "UNKNOWN_ERROR")]
    UnknownError,
}

impl ErrorClass {
    /// Classifies a transport error for fault reporting.
    pub fn classify(error: &Error) -> Self {
        let Error::RequestFailed(error) = error else {
            return ErrorClass::UnknownError;
        };
        if error.is_timeout() {
            return ErrorClass::Timeout;
        }
        if let Some(status) = error.status() {
            return ErrorClass::Http(status.as_u16());
        }
        if error.is_connect() {
            return match Self::io_error_kind(error) {
                Some(std::io::ErrorKind::ConnectionRefused) => ErrorClass::ConnectionRefused,
                Some(std::io::ErrorKind::HostUnreachable)
                | Some(std::io::ErrorKind::NetworkUnreachable) => ErrorClass::HostUnreachable,
                _ => ErrorClass::NetworkError,
            };
        }
        if error.is_request() || error.is_body() || error.is_decode() {
            return ErrorClass::NetworkError;
        }
        ErrorClass::UnknownError
    }

    /// Walks the source chain looking for the underlying io error kind.
    fn io_error_kind(error: &reqwest::Error) -> Option<std::io::ErrorKind> {
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                return Some(io.kind());
            }
            source = cause.source();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqwest_error_with_status(status: reqwest::StatusCode) -> reqwest::Error {
        let response = http::Response::builder()
            .status(status)
            .body(Vec::new())
            .unwrap();
        reqwest::Response::from(response)
            .error_for_status()
            .unwrap_err()
    }

    #[test]
    fn test_classify_http_status() {
        let error = Error::RequestFailed(reqwest_error_with_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        ));
        let class = ErrorClass::classify(&error);
        assert_eq!(class, ErrorClass::Http(500));
        assert_eq!(class.to_string(), "HTTP_500");
    }

    #[test]
    fn test_classify_protocol_error_is_unknown() {
        let error =
            Error::ResponseJsonError(serde_json::from_str::<serde_json::Value>("x").unwrap_err());
        assert!(error.is_protocol());
        assert_eq!(ErrorClass::classify(&error), ErrorClass::UnknownError);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorClass::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorClass::ConnectionRefused.to_string(), "CONNECTION_REFUSED");
        assert_eq!(ErrorClass::HostUnreachable.to_string(), "HOST_UNREACHABLE");
        assert_eq!(ErrorClass::NetworkError.to_string(), "NETWORK_ERROR");
        assert_eq!(ErrorClass::UnknownError.to_string(), "UNKNOWN_ERROR");
    }
}
