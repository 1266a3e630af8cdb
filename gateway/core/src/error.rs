use http::{Method, StatusCode};
use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request-level failure. Every variant maps onto a single HTTP status; none of them are
/// retried by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no proxy matches the request")]
    NoRoute,

    #[error("no mock response matches {method} {path}")]
    NoMockRoute { method: Method, path: String },

    #[error("no backend available: {0}")]
    Selection(String),

    /// The cause is logged but never exposed to clients.
    #[error("api key is missing or invalid")]
    Unauthenticated(AuthnFailure),

    #[error("api key is not authorized for this request")]
    Forbidden,

    #[error("api key quota exceeded")]
    RateLimited { retry_after: Duration },

    #[error("{message}")]
    Plugin { status: StatusCode, message: String },

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("upstream request failed")]
    Upstream(#[source] BoxError),
}

/// Why a presented API key was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthnFailure {
    #[error("no api key was presented")]
    Missing,

    #[error("api key {0} does not exist")]
    UnknownKey(String),

    #[error("api key {0} has no active revision")]
    NoActiveRevision(String),

    #[error("active revision of api key {0} could not be decrypted")]
    Decrypt(String),

    #[error("presented secret does not match api key {0}")]
    Mismatch(String),
}

// === impl Error ===

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoRoute | Self::NoMockRoute { .. } => StatusCode::NOT_FOUND,
            Self::Selection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Plugin { status, .. } => *status,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn upstream(error: impl Into<BoxError>) -> Self {
        Self::Upstream(error.into())
    }
}

impl From<AuthnFailure> for Error {
    fn from(failure: AuthnFailure) -> Self {
        Self::Unauthenticated(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(Error::NoRoute.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Selection("no services".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::from(AuthnFailure::Missing).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(Error::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Error::Plugin {
                status: StatusCode::PAYMENT_REQUIRED,
                message: "pay up".into()
            }
            .status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            Error::PayloadTooLarge { limit: 1024 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::upstream("connection refused").status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn authentication_details_are_not_rendered() {
        let error = Error::from(AuthnFailure::Mismatch("key-0".to_string()));
        assert!(!error.to_string().contains("key-0"));
    }
}
