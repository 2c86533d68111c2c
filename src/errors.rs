/*!
 * Error types for the sublingo library.
 *
 * This module contains custom error types for the different layers of the
 * translation pipeline, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when talking to a chat completion provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The request was abandoned because its task was cancelled
    #[error("Request cancelled")]
    Cancelled,
}

/// Errors produced while decoding model output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The model returned nothing but whitespace
    #[error("empty response")]
    Empty,

    /// The payload was readable but contained no usable item
    #[error("no items parsed from response")]
    NoItems,

    /// The analysis payload was not a usable project analysis
    #[error("invalid analysis result: {0}")]
    InvalidAnalysis(String),
}

/// Errors raised by document and glossary stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::Backend(format!("{:#}", error))
    }
}

/// Errors that can occur while starting or running a translation task
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Source and target language are the same
    #[error("Source and target language are identical: {0}")]
    SameLanguage(String),

    /// The project has no segments to translate
    #[error("Project {0} has no segments")]
    EmptyProject(String),

    /// Another task already owns this project and language
    #[error("A translation task is already running for project {project_id} ({language})")]
    TaskAlreadyRunning {
        /// Project identifier
        project_id: String,
        /// Target language
        language: String,
    },

    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error decoding model output
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error from the document store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The background task could not be joined
    #[error("Task join error: {0}")]
    TaskJoin(String),
}
