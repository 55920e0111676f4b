//! Error types for claim extraction, evaluation and rewriting.

/// Policy layer errors.
///
/// Parse failures on trust material (`TokenDecode`, `GeometryParse`) are
/// hard failures: a negotiation must not proceed on data that cannot be read.
/// A missing claim is never an error; rule functions deny instead.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Identity token is malformed or cannot be decoded.
    #[error("token decode error: {reason}")]
    TokenDecode { reason: String },

    /// Well-known-text (or bounding box) input could not be parsed.
    #[error("geometry parse error for '{input}': {reason}")]
    GeometryParse { input: String, reason: String },

    /// Claims were readable but do not satisfy the policy.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Negotiation subsystem rejected or failed the request.
    #[error("negotiation error: {message}")]
    Negotiation { message: String },
}

impl PolicyError {
    pub fn token_decode(reason: impl Into<String>) -> Self {
        Self::TokenDecode {
            reason: reason.into(),
        }
    }

    pub fn geometry_parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GeometryParse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for authorization outcomes, false for integration faults.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// True when the caller presented identity material we could not read.
    pub fn is_malformed_identity(&self) -> bool {
        matches!(self, Self::TokenDecode { .. } | Self::GeometryParse { .. })
    }

    /// HTTP status a controller should answer with.
    ///
    /// Denials are client-facing rejections (403). Unreadable tokens or
    /// geometries are reported as server-side errors so that operators can
    /// tell integration bugs apart from authorization failures.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AccessDenied { .. } => 403,
            Self::TokenDecode { .. } => 500,
            Self::GeometryParse { .. } => 500,
            Self::Config { .. } => 500,
            Self::Negotiation { .. } => 502,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::TokenDecode { .. } => 2,
            Self::GeometryParse { .. } => 2,
            Self::AccessDenied { .. } => 3,
            Self::Negotiation { .. } => 4,
        }
    }

    /// Whether the error is retryable. A malformed token stays malformed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Negotiation { .. })
    }
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
