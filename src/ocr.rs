use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::ai::VisionOcr;
use crate::capture::Capture;
use crate::config::{OcrBackendKind, OcrConfig};
use crate::error::OcrError;

pub(crate) trait Ocr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError>;
}

/// Runs `<program> <args..> <image>` and takes the text from stdout.
#[derive(Debug, Clone)]
pub(crate) struct CommandOcr {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandOcr {
    pub(crate) fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Ocr for CommandOcr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        if !image.is_file() {
            return Err(OcrError::MissingImage(image.to_path_buf()));
        }
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub(crate) enum OcrBackend {
    Command(CommandOcr),
    Vision(VisionOcr),
}

impl OcrBackend {
    pub(crate) fn from_config(config: &OcrConfig) -> Self {
        match config.backend {
            OcrBackendKind::Command => {
                OcrBackend::Command(CommandOcr::new(&config.program, config.args.clone()))
            }
            OcrBackendKind::OpenAi => {
                OcrBackend::Vision(VisionOcr::new(&config.model, &config.prompt))
            }
        }
    }
}

impl Ocr for OcrBackend {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        match self {
            OcrBackend::Command(ocr) => ocr.recognize(image).await,
            OcrBackend::Vision(ocr) => ocr.recognize(image).await,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OcrSummary {
    pub(crate) written: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

/// Writes a text sidecar next to every capture that lacks one.
/// Failures are logged per capture and never stop the pass.
pub(crate) async fn ocr_captures<O: Ocr>(
    captures: &[Capture],
    ocr: &O,
    sidecar_name: &str,
) -> OcrSummary {
    let mut summary = OcrSummary::default();
    for capture in captures {
        let sidecar = capture.sidecar(sidecar_name);
        if sidecar.exists() {
            summary.skipped += 1;
            continue;
        }

        let text = match ocr.recognize(&capture.image).await {
            Ok(text) => text,
            Err(e) => {
                warn!("OCR failed for capture {}: {}", capture.timestamp, e);
                summary.failed += 1;
                continue;
            }
        };
        match write_sidecar(&sidecar, &text) {
            Ok(()) => {
                debug!("Wrote {:?}", sidecar);
                summary.written += 1;
            }
            Err(e) => {
                warn!("Failed to write {:?}: {}", sidecar, e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "OCR: {} written, {} already present, {} failed",
        summary.written, summary.skipped, summary.failed
    );
    summary
}

fn write_sidecar(path: &Path, text: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
