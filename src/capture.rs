use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::config::Config;

/// One screenshot on disk, named by the UNIX second it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Capture {
    pub(crate) timestamp: i64,
    pub(crate) dir: PathBuf,
    pub(crate) image: PathBuf,
}

impl Capture {
    pub(crate) fn new(timestamp: i64, dir: PathBuf, image_file: &str) -> Self {
        let image = dir.join(image_file);
        Self {
            timestamp,
            dir,
            image,
        }
    }

    pub(crate) fn sidecar(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

/// Lists `<root>/<capture_dir>/<timestamp>/` folders holding an image, in directory order.
/// Symlinked capture folders are followed.
pub(crate) fn scan_captures(config: &Config) -> anyhow::Result<Vec<Capture>> {
    let capture_root = config.capture_root();
    let entries = fs::read_dir(&capture_root)
        .with_context(|| format!("Failed to read capture directory {:?}", capture_root))?;

    let mut captures = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(timestamp) = parse_timestamp(&path) else {
            debug!("Skipping non-capture directory {:?}", path);
            continue;
        };

        let capture = Capture::new(timestamp, path, &config.image_file);
        if !capture.image.is_file() {
            warn!("Capture {} has no {}", timestamp, config.image_file);
            continue;
        }
        // a capture still being written decodes short
        if config.verify_images {
            if let Err(e) = image::open(&capture.image) {
                warn!("Skipping unreadable image {:?}: {}", capture.image, e);
                continue;
            }
        }
        captures.push(capture);
    }

    debug!("Found {} captures in {:?}", captures.len(), capture_root);
    Ok(captures)
}

fn parse_timestamp(path: &Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path) {
        image::RgbImage::new(4, 2).save(path).unwrap();
    }

    /// A noisy PNG cut off halfway through its pixel data.
    fn write_truncated_png(path: &Path) {
        let noise = image::RgbImage::from_fn(256, 256, |x, y| {
            let v = (x * 7919 + y * 104_729) ^ (x * y);
            image::Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        });
        noise.save(path).unwrap();
        let bytes = fs::read(path).unwrap();
        fs::write(path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(image::image_dimensions(path).is_ok());
    }

    fn test_config(root: &Path) -> Config {
        Config {
            root: root.to_path_buf(),
            ..Config::default()
        }
    }

    fn timestamp_of(name: &str) -> Option<i64> {
        parse_timestamp(&Path::new("/ss/img").join(name))
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(timestamp_of("1700000000"), Some(1_700_000_000));
        assert_eq!(timestamp_of("0"), Some(0));
        assert_eq!(timestamp_of("-5"), None);
        assert_eq!(timestamp_of("+5"), None);
        assert_eq!(timestamp_of("12a"), None);
        assert_eq!(timestamp_of(".cache"), None);
        assert_eq!(timestamp_of("99999999999999999999"), None);
    }

    #[test]
    fn test_scan_skips_foreign_entries() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        let img = config.capture_root();

        for ts in ["100", "250"] {
            fs::create_dir_all(img.join(ts)).unwrap();
            write_png(&img.join(ts).join("image.png"));
        }
        // no image inside
        fs::create_dir_all(img.join("300")).unwrap();
        // not a timestamp
        fs::create_dir_all(img.join("notes")).unwrap();
        write_png(&img.join("notes").join("image.png"));
        // plain file with a numeric name
        fs::write(img.join("400"), b"x").unwrap();

        let mut found: Vec<i64> = scan_captures(&config)
            .unwrap()
            .into_iter()
            .map(|c| c.timestamp)
            .collect();
        found.sort();
        assert_eq!(found, vec![100, 250]);
    }

    #[test]
    fn test_scan_verifies_images() {
        let root = tempdir().unwrap();
        let mut config = test_config(root.path());
        let img = config.capture_root();

        fs::create_dir_all(img.join("10")).unwrap();
        write_png(&img.join("10").join("image.png"));
        fs::create_dir_all(img.join("20")).unwrap();
        fs::write(img.join("20").join("image.png"), b"truncated").unwrap();
        fs::create_dir_all(img.join("30")).unwrap();
        write_truncated_png(&img.join("30").join("image.png"));

        let found = scan_captures(&config).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timestamp, 10);
        assert_eq!(found[0].image, img.join("10").join("image.png"));

        config.verify_images = false;
        assert_eq!(scan_captures(&config).unwrap().len(), 3);
    }

    #[test]
    fn test_scan_follows_symlinked_captures() {
        let root = tempdir().unwrap();
        let config = test_config(root.path());
        let img = config.capture_root();
        fs::create_dir_all(&img).unwrap();

        let elsewhere = root.path().join("archive").join("500");
        fs::create_dir_all(&elsewhere).unwrap();
        write_png(&elsewhere.join("image.png"));
        std::os::unix::fs::symlink(&elsewhere, img.join("500")).unwrap();

        let found = scan_captures(&config).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].timestamp, 500);
        assert_eq!(found[0].image, img.join("500").join("image.png"));
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let root = tempdir().unwrap();
        let config = test_config(&root.path().join("missing"));
        assert!(scan_captures(&config).is_err());
    }

    #[test]
    fn test_sidecar_path() {
        let capture = Capture::new(42, PathBuf::from("/ss/img/42"), "image.png");
        assert_eq!(capture.image, PathBuf::from("/ss/img/42/image.png"));
        assert_eq!(
            capture.sidecar("ocr.txt"),
            PathBuf::from("/ss/img/42/ocr.txt")
        );
    }
}
