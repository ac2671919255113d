use thiserror::Error;

/// Central error type for the vocal-split-core crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("Model download failed, every mirror exhausted: {last}")]
    Download { last: String },

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Model is not loaded")]
    ModelNotLoaded,

    #[error("Audio decode failed: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Checksum mismatch for {key}")]
    Checksum { key: String },

    #[error("Cache dir not available")]
    CacheDirUnavailable,
}

impl StemError {
    /// Same variant and message, detached from any wrapped source.
    pub(crate) fn replicate(&self) -> StemError {
        match self {
            StemError::Anyhow(e) => StemError::Anyhow(anyhow::anyhow!("{e:#}")),
            StemError::Download { last } => StemError::Download { last: last.clone() },
            StemError::ModelLoad(m) => StemError::ModelLoad(m.clone()),
            StemError::ModelNotLoaded => StemError::ModelNotLoaded,
            StemError::Decode(m) => StemError::Decode(m.clone()),
            StemError::Inference(m) => StemError::Inference(m.clone()),
            StemError::Registry(m) => StemError::Registry(m.clone()),
            StemError::Checksum { key } => StemError::Checksum { key: key.clone() },
            StemError::CacheDirUnavailable => StemError::CacheDirUnavailable,
        }
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for StemError {
    fn from(e: std::io::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for StemError {
    fn from(e: serde_json::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<reqwest::Error> for StemError {
    fn from(e: reqwest::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<hex::FromHexError> for StemError {
    fn from(e: hex::FromHexError) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<ort::Error> for StemError {
    fn from(e: ort::Error) -> Self {
        StemError::Anyhow(anyhow::anyhow!(e.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
