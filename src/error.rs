//! Error taxonomy shared by every client and the analyzer.
//!
//! External failures are classified by the HTTP status (or transport
//! failure) that produced them so the shells can report them precisely.

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// External collaborator that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Search,
    Embedding,
    Completion,
    Store,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Service::Search => "search API",
            Service::Embedding => "embedding API",
            Service::Completion => "completion API",
            Service::Store => "vector store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required key or URL is not configured.
    #[error("{service} is not configured: missing {what}")]
    MissingCredential { service: Service, what: &'static str },

    #[error("{service} rejected the credentials ({status}): {body}")]
    Unauthorized {
        service: Service,
        status: StatusCode,
        body: String,
    },

    #[error("{service} rate limit exceeded: {body}")]
    RateLimited { service: Service, body: String },

    #[error("{service} request timed out")]
    Timeout { service: Service },

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: Service,
        status: StatusCode,
        body: String,
    },

    #[error("failed to reach {service}: {source}")]
    Transport {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode {service} response: {message}")]
    Decode { service: Service, message: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store persistence failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Classify a `reqwest` failure that happened before a response arrived.
    pub fn transport(service: Service, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Error::Timeout { service }
        } else if source.is_decode() {
            Error::Decode {
                service,
                message: source.to_string(),
            }
        } else {
            Error::Transport { service, source }
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(service: Service, status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized {
                service,
                status,
                body,
            },
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { service, body },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Error::Timeout { service }
            }
            _ => Error::Upstream {
                service,
                status,
                body,
            },
        }
    }

    /// Transient failures: the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::Timeout { .. } | Error::Transport { .. }
        )
    }

    /// HTTP status the API shell answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Unauthorized { .. }
            | Error::Upstream { .. }
            | Error::Transport { .. }
            | Error::Decode { .. } => StatusCode::BAD_GATEWAY,
            Error::MissingCredential { .. }
            | Error::DimensionMismatch { .. }
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
