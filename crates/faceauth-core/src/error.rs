use thiserror::Error;

pub type FaceauthResult<T> = Result<T, FaceauthError>;

/// Every failure the engine can surface.
///
/// Messages never carry key bytes, embedding bytes, or feature-vector values.
#[derive(Debug, Error)]
pub enum FaceauthError {
    /// Bad embedding input (empty, non-finite, zero magnitude, wrong dimension).
    #[error("invalid feature vector: {0}")]
    InvalidVector(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Not a faceauth file, or its header is corrupted.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Tag verification failed. Deliberately does not say whether the key or
    /// the data was wrong.
    #[error("authentication failed")]
    Authentication,

    #[error("truncated file: expected {expected} plaintext bytes, found {actual}")]
    TruncatedFile { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Resource(#[from] std::io::Error),

    /// The authentication collaborator could not produce a feature vector.
    #[error("secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

impl FaceauthError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::SecretUnavailable(_))
    }
}
