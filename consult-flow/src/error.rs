use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid or missing model connection settings. Raised before any session starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("model credential is missing")]
    MissingCredential,

    #[error("model endpoint is missing")]
    MissingEndpoint,

    #[error("model endpoint must be an http(s) URL, got '{0}'")]
    InvalidEndpoint(String),

    #[error("model identifier is missing")]
    MissingModel,

    #[error("temperature must be within [0, 2], got {0}")]
    InvalidTemperature(f32),

    #[error("turn budget must be at least 1")]
    InvalidTurnBudget,

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Failure of a chat-completion round trip.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("client setup failed: {0}")]
    Client(String),

    #[error(transparent)]
    Completion(#[from] rig::completion::CompletionError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("tool loop did not settle after {0} rounds")]
    ToolRoundsExceeded(usize),
}

/// Failure to build an index from documents.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("nothing to index: {0}")]
    EmptyInput(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("corpus '{0}' does not exist")]
    UnknownCorpus(String),

    #[error("invalid corpus name '{0}'")]
    InvalidCorpusId(String),

    #[error("index storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("index file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failure while searching an index.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("invalid query parameters: {0}")]
    InvalidParameters(String),
}

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("backend call failed: {0}")]
    BackendCall(#[from] BackendError),

    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("dialogue has not been initialized")]
    NotInitialized,

    #[error("dialogue is not running")]
    NotRunning,

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl ConsultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsultError::Configuration(_)
            | ConsultError::NotInitialized
            | ConsultError::NotRunning
            | ConsultError::SessionNotFound(_) => ErrorKind::Configuration,
            ConsultError::BackendCall(_) => ErrorKind::BackendCall,
            ConsultError::Ingest(_) => ErrorKind::Ingest,
            ConsultError::Query(_) => ErrorKind::Query,
        }
    }
}

/// Error category carried by error-flagged messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    BackendCall,
    Ingest,
    Query,
}

pub type Result<T> = std::result::Result<T, ConsultError>;
