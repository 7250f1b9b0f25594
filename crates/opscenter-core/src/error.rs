use std::fmt;

/// Error taxonomy shared by every component of the operations center.
///
/// Structural validation failures surface synchronously with a stable code;
/// transient upstream failures during replay or action execution are captured
/// into the owning entity's terminal state instead of being raised here.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OpsError {
    InvalidArgument(String),
    Conflict(String),
    NotFound(String),
    TransientUpstream(String),
    Expired(String),
    Internal(String),
}

impl OpsError {
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub fn transient_upstream(message: impl Into<String>) -> Self {
        Self::TransientUpstream(message.into())
    }

    #[must_use]
    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::TransientUpstream(_) => "transient_upstream",
            Self::Expired(_) => "expired",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::Conflict(m)
            | Self::NotFound(m)
            | Self::TransientUpstream(m)
            | Self::Expired(m)
            | Self::Internal(m) => m,
        }
    }
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for OpsError {}
