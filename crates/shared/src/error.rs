use thiserror::Error;

/// Failure taxonomy surfaced across the façade boundary. Nothing else
/// escapes a public operation: remote `{data, error}` envelopes, transport
/// failures, and local cache failures all fold into one of these variants.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Remote-service error; the underlying message is passed through.
    #[error("{0}")]
    Remote(String),
    /// The operation requires a signed-in user and none is present. No
    /// remote call is attempted.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// Transport-level failure reaching a remote endpoint.
    #[error("network error: {0}")]
    Network(String),
    /// Local cache read or write failed.
    #[error("local cache error: {0}")]
    Cache(String),
    /// Filesystem side effect failed (report download destination).
    #[error("i/o error: {0}")]
    Io(String),
}

impl ClientError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    pub fn cache(err: impl std::fmt::Display) -> Self {
        Self::Cache(err.to_string())
    }

    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
