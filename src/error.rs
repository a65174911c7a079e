use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum BucketError {
    #[error("bucket length must be between 1 and {max} seconds, got {0}", max = i64::MAX)]
    InvalidLength(u64),
}

#[derive(Error, Debug)]
pub(crate) enum EncodeError {
    #[error("no frames to encode")]
    NoFrames,

    #[error("failed to write concat manifest: {0}")]
    Manifest(#[source] std::io::Error),

    #[error("failed to spawn encoder {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

#[derive(Error, Debug)]
pub(crate) enum OcrError {
    #[error("image not found: {0:?}")]
    MissingImage(PathBuf),

    #[error("failed to spawn OCR command {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR command exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("vision request failed: {0}")]
    Vision(#[from] async_openai::error::OpenAIError),

    #[error("vision request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("no content in vision response")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub(crate) enum MaterializeError {
    #[error("bucket {0} has no captures")]
    EmptyBucket(i64),

    #[error("artifact path {0:?} has no parent directory")]
    NoParent(PathBuf),

    #[error("encoder produced an empty artifact for bucket {0}")]
    EmptyArtifact(i64),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to commit artifact: {0}")]
    Persist(#[from] tempfile::PathPersistError),
}
