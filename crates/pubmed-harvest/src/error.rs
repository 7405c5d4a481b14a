//! Error types for the harvesting pipeline.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Per-paper errors never escape a batch: they are folded into a [`FailureKind`]
//! on the paper's record. Only [`PipelineError`] reaches the batch caller.

use std::time::Duration;

use crate::models::FailureKind;

/// Errors from the upstream API client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Transport error (connection, DNS, TLS, reset).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Throttled by the upstream (429), possibly after exhausting retries.
    #[error("Rate limit exceeded after {attempts} attempt(s), retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Upstream-advised wait, when one was sent.
        retry_after: Option<Duration>,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Upstream server error (5xx), possibly after exhausting retries.
    #[error("Upstream unavailable ({status}) after {attempts} attempt(s): {message}")]
    UpstreamUnavailable {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Resource not found. Terminal, never retried.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Invalid request parameters (400 or an upstream error payload).
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message from API
        message: String,
    },

    /// Request exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be parsed.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create a rate limited error for a single attempt.
    #[must_use]
    pub const fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimitExceeded { retry_after, attempts: 1 }
    }

    /// Create an upstream-unavailable error for a single attempt.
    #[must_use]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable { status, message: message.into(), attempts: 1 }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if this error is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimitExceeded { .. } | Self::UpstreamUnavailable { .. })
    }

    /// Get the upstream-advised delay if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Record how many attempts were made before this error became final.
    #[must_use]
    pub fn with_attempts(mut self, n: u32) -> Self {
        match &mut self {
            Self::RateLimitExceeded { attempts, .. } | Self::UpstreamUnavailable { attempts, .. } => {
                *attempts = n;
            }
            _ => {}
        }
        self
    }

    /// Classify this error for a paper record.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::RateLimitExceeded { .. } => FailureKind::RateLimitExceeded,
            Self::UpstreamUnavailable { .. } => FailureKind::UpstreamUnavailable,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::BadRequest { .. } | Self::UnexpectedStatus { .. } => FailureKind::BadRequest,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Parse(_) => FailureKind::Parse,
        }
    }
}

/// Configuration errors. Fatal before any work starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The NCBI contact email was not supplied.
    #[error("A contact email is required (set PUBMED_EMAIL or pass --email)")]
    MissingEmail,

    /// A setting had an unusable value.
    #[error("Invalid value for '{field}': {value}")]
    Invalid {
        /// Setting name
        field: String,
        /// Offending value
        value: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client initialisation failed: {0}")]
    HttpClient(String),
}

impl ConfigError {
    /// Create an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Invalid { field: field.into(), value: value.into() }
    }
}

/// Errors from the artifact store and dedup index.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The index file is not valid JSON.
    #[error("Corrupt index {path}: {source}")]
    Corrupt {
        /// Index path
        path: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failure while persisting the index.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wrap an I/O error with the path it concerns.
    #[must_use]
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { path: path.display().to_string(), source }
    }
}

/// Errors from downloading a PDF.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Transport error.
    #[error("Network error fetching {url}: {source}")]
    Network {
        /// URL being fetched
        url: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success status.
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// URL being fetched
        url: String,
        /// HTTP status code
        status: u16,
        /// Host-advised wait, when one was sent.
        retry_after: Option<Duration>,
    },

    /// Download exceeded its deadline.
    #[error("Download of {url} timed out after {timeout:?}")]
    Timeout {
        /// URL being fetched
        url: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Body was not a PDF.
    #[error("Content at {url} is not a PDF")]
    NotPdf {
        /// URL being fetched
        url: String,
    },

    /// Body exceeded the size cap.
    #[error("PDF at {url} is too large ({bytes} bytes)")]
    TooLarge {
        /// URL being fetched
        url: String,
        /// Body size
        bytes: usize,
    },
}

impl FetchError {
    /// Returns true if this error is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } | Self::NotPdf { .. } | Self::TooLarge { .. } => false,
        }
    }

    /// Host-advised delay before the next attempt.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify this error for a paper record.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Status { status: 404 | 410, .. } => FailureKind::NotFound,
            Self::Status { status: 429, .. } => FailureKind::RateLimitExceeded,
            Self::Status { status, .. } if *status >= 500 => FailureKind::UpstreamUnavailable,
            Self::Status { .. } => FailureKind::BadRequest,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::NotPdf { .. } | Self::TooLarge { .. } => FailureKind::InvalidContent,
        }
    }
}

/// Errors from the PDF to markdown collaborator.
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    /// The PDF could not be parsed.
    #[error("PDF parsing failed: {0}")]
    Parse(String),

    /// The PDF has no extractable text layer.
    #[error("No extractable text in PDF")]
    Empty,

    /// The blocking conversion task died.
    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// Batch-fatal errors. Everything else is recorded per paper.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Configuration failure, raised before any work starts.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The search criteria were unusable.
    #[error("Invalid search criteria: {field}: {message}")]
    InvalidCriteria {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// The initial candidate search failed.
    #[error("Search failed: {0}")]
    Search(#[source] ClientError),

    /// A single-identifier lookup failed.
    #[error("Lookup failed: {0}")]
    Lookup(#[source] ClientError),

    /// The dedup index could not be opened.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Create an invalid-criteria error.
    #[must_use]
    pub fn invalid_criteria(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCriteria { field: field.into(), message: message.into() }
    }

    /// Returns true when the failure means the identifier does not exist upstream.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Lookup(ClientError::NotFound { .. }))
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for batch operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
