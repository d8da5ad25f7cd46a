use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{RecordId, SourceId};

/// Error type for configuration, parsing, persistence, and collaborator failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("source '{}' not found", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to parse '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("collection '{source_id}' is empty after validation ({discarded} records discarded)")]
    EmptyCollection { source_id: SourceId, discarded: usize },
    #[error("collection '{source_id}' contains duplicate record id '{record_id}'")]
    DuplicateRecord {
        source_id: SourceId,
        record_id: RecordId,
    },
    #[error("record '{record_id}' has image path '{image}' outside its partition folder")]
    InvalidImagePath { record_id: RecordId, image: String },
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("image '{}' could not be processed: {reason}", path.display())]
    Image { path: PathBuf, reason: String },
    #[error("archive failure: {0}")]
    Archive(String),
    #[error(
        "external command '{command}' timed out after {:.1}s\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}",
        elapsed.as_secs_f64()
    )]
    Timeout {
        command: String,
        elapsed: Duration,
        stdout: String,
        stderr: String,
    },
    #[error(
        "external command '{command}' failed with {status}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}"
    )]
    ExternalProcess {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}
