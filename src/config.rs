use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::bucket::BucketPolicy;

const APP_NAME: &str = "shotlapse";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Archive root. Capture and artifact directories are resolved against it.
    pub(crate) root: PathBuf,
    pub(crate) capture_dir: PathBuf,
    pub(crate) image_file: String,
    pub(crate) ocr_file: String,

    /// Window width in seconds.
    pub(crate) bucket_length: u64,
    /// Captures younger than this many seconds are left for a later run.
    pub(crate) min_age: u64,
    pub(crate) wait_for_full_window: bool,
    pub(crate) verify_images: bool,

    pub(crate) encoder: EncoderConfig,
    pub(crate) renditions: Vec<RenditionConfig>,
    pub(crate) ocr: OcrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct EncoderConfig {
    pub(crate) program: PathBuf,
    pub(crate) codec: String,
    pub(crate) codec_args: Vec<String>,
    pub(crate) pix_fmt: String,
    /// Seconds each screenshot stays on screen.
    pub(crate) frame_duration: f64,
    pub(crate) format: String,
    pub(crate) extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RenditionConfig {
    pub(crate) name: String,
    pub(crate) output_dir: PathBuf,
    #[serde(default)]
    pub(crate) height: Option<u32>,
    #[serde(default)]
    pub(crate) extra_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OcrBackendKind {
    #[default]
    Command,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct OcrConfig {
    pub(crate) enabled: bool,
    pub(crate) backend: OcrBackendKind,
    pub(crate) program: PathBuf,
    pub(crate) args: Vec<String>,
    pub(crate) model: String,
    pub(crate) prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            capture_dir: PathBuf::from("img"),
            image_file: "image.png".to_owned(),
            ocr_file: "ocr.txt".to_owned(),
            bucket_length: 300,
            min_age: 300,
            wait_for_full_window: false,
            verify_images: true,
            encoder: EncoderConfig::default(),
            renditions: vec![
                RenditionConfig {
                    name: "full".to_owned(),
                    output_dir: PathBuf::from("full"),
                    height: None,
                    extra_args: Vec::new(),
                },
                RenditionConfig {
                    name: "small".to_owned(),
                    output_dir: PathBuf::from("small"),
                    height: Some(480),
                    extra_args: vec!["-crf".to_owned(), "30".to_owned()],
                },
            ],
            ocr: OcrConfig::default(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libaom-av1".to_owned(),
            codec_args: vec!["-cpu-used".to_owned(), "8".to_owned()],
            pix_fmt: "yuv420p".to_owned(),
            frame_duration: 1.0,
            format: "mp4".to_owned(),
            extension: "mp4".to_owned(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: OcrBackendKind::Command,
            program: PathBuf::from("ocr"),
            args: Vec::new(),
            model: "gpt-4o".to_owned(),
            prompt: "Transcribe all text visible in this screenshot. \
                     Reply with the text only, preserving line breaks."
                .to_owned(),
        }
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("ss"))
        .unwrap_or_else(|| PathBuf::from("ss"))
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

impl Config {
    pub(crate) fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the per-user config file if one exists, else defaults.
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.bucket_length == 0 || i64::try_from(self.bucket_length).is_err() {
            bail!("bucket_length must be a positive number of seconds");
        }
        if i64::try_from(self.min_age).is_err() {
            bail!("min_age is out of range");
        }
        if self.image_file.is_empty() || self.ocr_file.is_empty() {
            bail!("image_file and ocr_file must be non-empty");
        }
        if !(self.encoder.frame_duration.is_finite() && self.encoder.frame_duration > 0.0) {
            bail!("encoder.frame_duration must be positive");
        }
        if self.renditions.is_empty() {
            bail!("at least one rendition is required");
        }
        let mut seen = HashSet::new();
        for rendition in &self.renditions {
            if !seen.insert(&rendition.output_dir) {
                bail!(
                    "rendition {:?} shares output_dir {:?} with another rendition",
                    rendition.name,
                    rendition.output_dir
                );
            }
            if rendition.height == Some(0) {
                bail!("rendition {:?} has a zero height", rendition.name);
            }
        }
        Ok(())
    }

    pub(crate) fn bucket_policy(&self) -> BucketPolicy {
        BucketPolicy {
            length: self.bucket_length,
            min_age: self.min_age,
            wait_for_full_window: self.wait_for_full_window,
        }
    }

    pub(crate) fn capture_root(&self) -> PathBuf {
        self.root.join(&self.capture_dir)
    }

    pub(crate) fn artifact_path(&self, rendition: &RenditionConfig, key: i64) -> PathBuf {
        self.root
            .join(&rendition.output_dir)
            .join(format!("{}.{}", key, self.encoder.extension))
    }
}
