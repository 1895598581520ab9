use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that abort a deploy
#[derive(Debug, Error)]
pub enum DeployError {
    /// Reading the source tree failed
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// Credentials were rejected or could not be used
    #[error("authorization failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Connection, timeout or body decoding failure
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The hosting API answered with a non-success status
    #[error("{step} failed with status {status}: {body}")]
    Http {
        step: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The hosting API answered successfully but the body is unusable
    #[error("{step} returned an invalid response: {message}")]
    InvalidResponse {
        step: &'static str,
        message: String,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }
}
