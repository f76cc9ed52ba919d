//! Error types of the release pipeline

use crate::pipeline::Step;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("source directory {0} does not exist")]
    MissingSource(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("file name of {0} is not valid UTF-8")]
    NonUtf8Name(PathBuf),

    #[error("invalid commit id '{0}'")]
    InvalidCommit(String),

    #[error("release '{0}' has no assets")]
    NoAssets(String),

    #[error("asset name '{0}' is used more than once")]
    DuplicateAsset(String),

    #[error("invalid repository '{0}', expected owner/name")]
    InvalidRepository(String),

    #[error("a repository token is required to publish")]
    MissingToken,

    #[error("GitHub API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReleaseError>;

/// A failed pipeline run, naming the step that stopped it.
#[derive(Debug, Error)]
#[error("step '{step}' failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: ReleaseError,
}
