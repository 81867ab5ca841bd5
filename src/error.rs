/*!
 * Error types for the populator engine
 */

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::SourceType;

pub type Result<T> = std::result::Result<T, VolareError>;

/// Unified error type for the populator engine.
///
/// Fetchers wrap their failures with operation context; the orchestrator
/// wraps submission failures as `Submit` and worker failures as
/// `Processing`. Cleanup failures are logged by the orchestrator and never
/// surface through this type.
#[derive(Debug, Error)]
pub enum VolareError {
    #[error("empty specs string")]
    EmptySpec,

    #[error("failed to unmarshal specs JSON: {0}")]
    SpecJson(#[source] serde_json::Error),

    #[error("failed to unmarshal envs JSON: {0}")]
    EnvJson(#[source] serde_json::Error),

    #[error("failed to unmarshal JSON: {0}")]
    ResourcesJson(#[source] serde_json::Error),

    #[error("failed to decode base64 for {path:?}: {source}")]
    ResourceDecode {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid source configuration: '{source_type}' options must be provided for source type '{source_type}'")]
    InvalidSourceConfig { source_type: SourceType },

    #[error("fetcher already registered for type {0}")]
    FetcherRegistered(SourceType),

    #[error("no fetcher registered for type {0}")]
    NoFetcherRegistered(SourceType),

    #[error("submit item: {0}")]
    Submit(#[source] Box<VolareError>),

    #[error("processing error: {0}")]
    Processing(#[source] Box<VolareError>),

    /// The parent cancellation scope was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to fetch {url:?}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} fetching {url:?}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("GitHub API returned status {0}")]
    GithubStatus(u16),

    #[error("failed to list tree: status {0}")]
    GitlabTreeStatus(u16),

    #[error("failed to decode tree: {0}")]
    DecodeTree(String),

    #[error("failed to create {backend} client: {message}")]
    Client {
        backend: &'static str,
        message: String,
    },

    #[error("failed to list objects: {0}")]
    ListObjects(String),

    #[error("failed to get object {key:?}: {message}")]
    GetObject { key: String, message: String },

    #[error("failed to clone repository {url:?}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to create directory for {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file {path:?}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file {path:?}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl VolareError {
    /// Check whether this error was caused by scope cancellation, at any
    /// wrapping depth.
    pub fn is_cancelled(&self) -> bool {
        match self {
            VolareError::Cancelled => true,
            VolareError::Submit(inner) | VolareError::Processing(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    /// Check whether this error comes from spec parsing or source validation.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            VolareError::EmptySpec
                | VolareError::SpecJson(_)
                | VolareError::InvalidSourceConfig { .. }
                | VolareError::FetcherRegistered(_)
                | VolareError::NoFetcherRegistered(_)
                | VolareError::Config(_)
        )
    }
}
