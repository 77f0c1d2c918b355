use thiserror::Error;

/// Failures raised at the model gateway boundary. Wrapped into
/// [`IngestError`] or [`SearchError`] by the calling component.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from model endpoint: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed for {url} after {attempts} attempts: {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("response for {0} is not an image")]
    NotAnImage(String),

    #[error("image decode error: {0}")]
    Decode(String),

    #[error("model inference failed: {0}")]
    ModelInference(String),

    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("ingestion cancelled: {0}")]
    Cancelled(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IngestError {
    /// A dimension mismatch means the configured model and the store no
    /// longer agree. That is configuration drift, not a bad asset, so the
    /// whole batch stops instead of skipping one asset.
    pub fn halts_batch(&self) -> bool {
        matches!(self, IngestError::DimensionMismatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("query embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
