use std::path::{Path, PathBuf};

use tracing::info;

use crate::capture::Capture;
use crate::error::MaterializeError;
use crate::video::Encoder;

#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o644;

/// Whether a bucket's artifact is on disk. Existence is the only completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BucketState {
    Pending,
    Materialized,
}

impl BucketState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BucketState::Pending => "pending",
            BucketState::Materialized => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Materialization {
    Skipped(PathBuf),
    Created(PathBuf),
}

pub(crate) fn bucket_state(artifact: &Path) -> BucketState {
    if artifact.exists() {
        BucketState::Materialized
    } else {
        BucketState::Pending
    }
}

/// Encodes `captures` into the artifact for `key` unless it already exists.
///
/// The encoder writes to a temporary file next to the destination, which is
/// renamed into place only after a successful, non-empty encode. A failed or
/// interrupted run therefore never leaves a file that a later run would skip.
pub(crate) async fn materialize<F, E>(
    captures: &[Capture],
    key: i64,
    artifact_path: F,
    encoder: &E,
) -> Result<Materialization, MaterializeError>
where
    F: Fn(i64) -> PathBuf,
    E: Encoder,
{
    let destination = artifact_path(key);
    if tokio::fs::try_exists(&destination).await? {
        info!("{:?} exists; skipping", destination);
        return Ok(Materialization::Skipped(destination));
    }
    if captures.is_empty() {
        return Err(MaterializeError::EmptyBucket(key));
    }

    let parent = match destination.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(MaterializeError::NoParent(destination.clone())),
    };
    tokio::fs::create_dir_all(parent).await?;

    let prefix = format!(".{}-", key);
    let suffix = destination
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let staging = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(parent)?
        .into_temp_path();

    let frames: Vec<PathBuf> = captures.iter().map(|c| c.image.clone()).collect();
    encoder.encode(&frames, &staging).await?;

    if tokio::fs::metadata(&staging).await?.len() == 0 {
        return Err(MaterializeError::EmptyArtifact(key));
    }
    // staging files are created owner-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::Permissions::from_mode(ARTIFACT_MODE);
        tokio::fs::set_permissions(&staging, mode).await?;
    }
    staging.persist_noclobber(&destination)?;

    info!("Made {:?} from {} captures", destination, captures.len());
    Ok(Materialization::Created(destination))
}
