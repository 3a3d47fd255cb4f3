use thiserror::Error;

/// Convenient result alias for the planner crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome classes of a rate-limited provider request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Quota exhausted or credential rejected. Never retried.
    #[error("provider rejected request with status {code}: {message}")]
    Terminal { code: i64, message: String },

    /// Transient failures persisted through every retry attempt.
    #[error("request failed after {attempts} attempt(s): {last_error}")]
    Transient { attempts: u32, last_error: String },

    /// No usable credential is configured (or left) for the endpoint type.
    #[error("no credential available for endpoint {endpoint}")]
    NoCredential { endpoint: String },

    /// Rate-limit capacity did not free up within the acquire timeout.
    #[error("timed out waiting for rate-limit capacity on {endpoint}")]
    AcquireTimeout { endpoint: String },

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    Client { message: String },
}

impl DispatchError {
    /// True when the failure must not be retried by anyone upstream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. } | Self::NoCredential { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::AcquireTimeout { .. })
    }
}

/// Failures reported by the external collaborators.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The provider answered, but the payload did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("invalid coordinate ({lat}, {lng}) for {name}")]
    InvalidCoordinate { name: String, lat: f64, lng: f64 },

    #[error("invalid vehicle profile: {message}")]
    InvalidVehicle { message: String },

    /// A node index handed to the planner does not exist in the graph.
    #[error("node index {index} out of range for graph with {len} nodes")]
    NodeOutOfRange { index: usize, len: usize },

    /// The graph build was cancelled; partial adjacency was discarded.
    #[error("graph build cancelled")]
    BuildCancelled,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
