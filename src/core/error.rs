use thiserror::Error;

/// Coarse classification of a cloud API failure, decided once at the
/// wrapper boundary so callers never inspect status codes or error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource does not exist (yet). Polling loops treat this as a
    /// benign "not published" state, cleanup treats it as already done.
    NotFound,
    /// Timeouts, throttling, 5xx; worth retrying.
    Transient,
    /// Auth failures, bad requests, local errors; retrying will not help.
    Fatal,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Classify a non-success HTTP response. `what` names the operation for
    /// the error message, `body` is the (possibly empty) response body.
    pub fn from_status(status: reqwest::StatusCode, what: &str, body: &str) -> Self {
        let kind = match status.as_u16() {
            404 => ErrorKind::NotFound,
            408 | 429 => ErrorKind::Transient,
            s if s >= 500 => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        };
        let body = body.trim();
        let message = if body.is_empty() {
            format!("{}: HTTP {}", what, status.as_u16())
        } else {
            format!("{}: HTTP {}: {}", what, status.as_u16(), body)
        };
        Self::new(kind, message)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, "request failed", &err.to_string());
        }
        let kind = if err.is_timeout() || err.is_connect() {
            ErrorKind::Transient
        } else {
            ErrorKind::Fatal
        };
        Self::new(kind, err.to_string())
    }
}

/// Accumulated failures from concurrent operations that must all run to
/// completion before any error is reported.
#[derive(Debug)]
pub struct MultiError {
    errors: Vec<ApiError>,
}

impl std::error::Error for MultiError {}

impl MultiError {
    /// Empty input is not an error.
    pub fn from_vec(errors: Vec<ApiError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self { errors })
        }
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} operation(s) failed: ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_classifies_not_found() {
        let err = ApiError::from_status(reqwest::StatusCode::NOT_FOUND, "get vault", "");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn from_status_classifies_server_errors_as_transient() {
        for code in [500u16, 502, 503, 429, 408] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            let err = ApiError::from_status(status, "list", "");
            assert_eq!(err.kind(), ErrorKind::Transient, "status {}", code);
        }
    }

    #[test]
    fn from_status_classifies_auth_failures_as_fatal() {
        let err = ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, "list", "no token");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("no token"));
    }

    #[test]
    fn from_status_omits_empty_body() {
        let err = ApiError::from_status(reqwest::StatusCode::NOT_FOUND, "get", "  ");
        assert_eq!(err.to_string(), "get: HTTP 404");
    }

    #[test]
    fn multi_error_empty_is_ok() {
        assert!(MultiError::from_vec(Vec::new()).is_ok());
    }

    #[test]
    fn multi_error_joins_messages() {
        let err = MultiError::from_vec(vec![
            ApiError::fatal("channel a: boom"),
            ApiError::transient("channel b: 503"),
        ])
        .unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("2 operation(s) failed"));
        assert!(text.contains("channel a: boom"));
        assert!(text.contains("channel b: 503"));
    }
}
