use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::{EncoderConfig, RenditionConfig};
use crate::error::EncodeError;

/// Turns an ordered list of still images into one video at `destination`.
pub(crate) trait Encoder {
    async fn encode(&self, frames: &[PathBuf], destination: &Path) -> Result<(), EncodeError>;
}

/// Runs ffmpeg's concat demuxer over a generated manifest.
#[derive(Debug, Clone)]
pub(crate) struct FfmpegEncoder {
    program: PathBuf,
    frame_duration: f64,
    output_args: Vec<String>,
}

impl FfmpegEncoder {
    pub(crate) fn new(encoder: &EncoderConfig, rendition: &RenditionConfig) -> Self {
        let mut output_args = vec!["-c:v".to_owned(), encoder.codec.clone()];
        output_args.extend(encoder.codec_args.iter().cloned());
        output_args.extend(rendition.extra_args.iter().cloned());
        output_args.extend([
            "-pix_fmt".to_owned(),
            encoder.pix_fmt.clone(),
            "-vf".to_owned(),
            video_filter(rendition.height),
            "-f".to_owned(),
            encoder.format.clone(),
        ]);

        Self {
            program: encoder.program.clone(),
            frame_duration: encoder.frame_duration,
            output_args,
        }
    }

    fn command_args(&self, manifest: &Path, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.extend(["-nostdin", "-v", "error", "-y"].map(OsString::from));
        args.extend(["-f", "concat", "-safe", "0", "-i"].map(OsString::from));
        args.push(manifest.into());
        args.extend(self.output_args.iter().map(OsString::from));
        args.push(destination.into());
        args
    }
}

impl Encoder for FfmpegEncoder {
    async fn encode(&self, frames: &[PathBuf], destination: &Path) -> Result<(), EncodeError> {
        if frames.is_empty() {
            return Err(EncodeError::NoFrames);
        }

        let manifest_text = concat_manifest(frames, self.frame_duration)
            .map_err(EncodeError::Manifest)?;
        let mut manifest = tempfile::Builder::new()
            .prefix("shotlapse-")
            .suffix(".ffconcat")
            .tempfile()
            .map_err(EncodeError::Manifest)?;
        manifest
            .write_all(manifest_text.as_bytes())
            .and_then(|_| manifest.flush())
            .map_err(EncodeError::Manifest)?;

        let args = self.command_args(manifest.path(), destination);
        debug!("Running {:?} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EncodeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

/// Even dimensions for 4:2:0 chroma, then an optional downscale keeping aspect.
fn video_filter(height: Option<u32>) -> String {
    let mut filter = "crop=trunc(iw/2)*2:trunc(ih/2)*2".to_owned();
    if let Some(height) = height {
        let _ = write!(filter, ",scale=-2:{}", height);
    }
    filter
}

/// The concat demuxer drops the last entry's duration unless the file is listed again.
fn concat_manifest(frames: &[PathBuf], frame_duration: f64) -> std::io::Result<String> {
    let mut manifest = String::from("ffconcat version 1.0\n");
    let mut last = None;
    for frame in frames {
        let path = quote(&std::path::absolute(frame)?);
        let _ = writeln!(manifest, "file {}\nduration {}", path, frame_duration);
        last = Some(path);
    }
    if let Some(path) = last {
        let _ = writeln!(manifest, "file {}", path);
    }
    Ok(manifest)
}

fn quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_manifest_repeats_last_frame() {
        let frames = vec![
            PathBuf::from("/ss/img/1/image.png"),
            PathBuf::from("/ss/img/2/image.png"),
        ];
        let manifest = concat_manifest(&frames, 0.05).unwrap();
        assert_eq!(
            manifest,
            "ffconcat version 1.0\n\
             file '/ss/img/1/image.png'\nduration 0.05\n\
             file '/ss/img/2/image.png'\nduration 0.05\n\
             file '/ss/img/2/image.png'\n"
        );
    }

    #[test]
    fn test_manifest_escapes_quotes() {
        assert_eq!(quote(Path::new("/tmp/it's.png")), r"'/tmp/it'\''s.png'");
        let frames = [PathBuf::from("relative/image.png")];
        let manifest = concat_manifest(&frames, 1.0).unwrap();
        assert!(manifest.contains("/relative/image.png'"));
        assert!(manifest.lines().nth(1).unwrap().starts_with("file '/"));
    }

    #[test]
    fn test_video_filter() {
        assert_eq!(video_filter(None), "crop=trunc(iw/2)*2:trunc(ih/2)*2");
        assert_eq!(
            video_filter(Some(480)),
            "crop=trunc(iw/2)*2:trunc(ih/2)*2,scale=-2:480"
        );
    }

    fn arg_line(encoder: &FfmpegEncoder, manifest: &str, destination: &str) -> String {
        encoder
            .command_args(Path::new(manifest), Path::new(destination))
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_command_args_per_rendition() {
        let config = Config::default();
        let full = FfmpegEncoder::new(&config.encoder, &config.renditions[0]);
        let small = FfmpegEncoder::new(&config.encoder, &config.renditions[1]);

        assert_eq!(
            arg_line(&full, "/tmp/list", "/ss/full/.300-x.mp4"),
            "-nostdin -v error -y -f concat -safe 0 -i /tmp/list \
             -c:v libaom-av1 -cpu-used 8 -pix_fmt yuv420p \
             -vf crop=trunc(iw/2)*2:trunc(ih/2)*2 -f mp4 /ss/full/.300-x.mp4"
        );

        let small = arg_line(&small, "m", "d");
        assert!(small.contains(" -cpu-used 8 -crf 30 -pix_fmt "));
        assert!(small.ends_with(",scale=-2:480 -f mp4 d"));
    }

    #[tokio::test]
    async fn test_encode_rejects_empty_bucket() {
        let config = Config::default();
        let encoder = FfmpegEncoder::new(&config.encoder, &config.renditions[0]);
        let destination = Path::new("/nonexistent/out.mp4");
        let result = encoder.encode(&[], destination).await;
        assert!(matches!(result, Err(EncodeError::NoFrames)));
    }

    #[tokio::test]
    async fn test_encode_reports_missing_program() {
        let mut config = Config::default();
        config.encoder.program = PathBuf::from("/nonexistent/ffmpeg");
        let encoder = FfmpegEncoder::new(&config.encoder, &config.renditions[0]);
        let frames = [PathBuf::from("/ss/img/1/image.png")];
        let destination = Path::new("/nonexistent/out.mp4");
        let result = encoder.encode(&frames, destination).await;
        assert!(matches!(result, Err(EncodeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_encode_reports_failed_exit() {
        let mut config = Config::default();
        config.encoder.program = PathBuf::from("false");
        let encoder = FfmpegEncoder::new(&config.encoder, &config.renditions[0]);
        let frames = [PathBuf::from("/ss/img/1/image.png")];
        let destination = Path::new("/nonexistent/out.mp4");
        let result = encoder.encode(&frames, destination).await;
        assert!(matches!(result, Err(EncodeError::Failed { .. })));
    }
}
