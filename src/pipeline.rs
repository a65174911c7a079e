use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::bucket::{partition, Partition};
use crate::capture::scan_captures;
use crate::config::{Config, RenditionConfig};
use crate::error::MaterializeError;
use crate::materialize::{bucket_state, materialize, BucketState, Materialization};
use crate::ocr::{ocr_captures, Ocr};
use crate::video::{Encoder, FfmpegEncoder};

/// One output variant of every bucket, e.g. the full-size or the 480p video.
pub(crate) struct Rendition<E> {
    pub(crate) config: RenditionConfig,
    pub(crate) encoder: E,
}

pub(crate) fn ffmpeg_renditions(config: &Config) -> Vec<Rendition<FfmpegEncoder>> {
    config
        .renditions
        .iter()
        .map(|rendition| Rendition {
            config: rendition.clone(),
            encoder: FfmpegEncoder::new(&config.encoder, rendition),
        })
        .collect()
}

#[derive(Debug)]
pub(crate) struct BucketFailure {
    pub(crate) key: i64,
    pub(crate) rendition: String,
    pub(crate) error: MaterializeError,
}

#[derive(Debug, Default)]
pub(crate) struct RunSummary {
    pub(crate) buckets: usize,
    pub(crate) created: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: Vec<BucketFailure>,
}

pub(crate) async fn run<E, O>(
    config: &Config,
    renditions: &[Rendition<E>],
    ocr: Option<&O>,
    now: i64,
) -> anyhow::Result<RunSummary>
where
    E: Encoder,
    O: Ocr,
{
    let captures = scan_captures(config)?;
    if let Some(ocr) = ocr {
        ocr_captures(&captures, ocr, &config.ocr_file).await;
    }

    let buckets = partition(captures, &config.bucket_policy(), now)?;
    info!("Partitioned captures into {} buckets", buckets.len());
    Ok(materialize_all(config, &buckets, renditions).await)
}

/// Oldest bucket first. A failed bucket is recorded and the loop moves on.
pub(crate) async fn materialize_all<E: Encoder>(
    config: &Config,
    buckets: &Partition,
    renditions: &[Rendition<E>],
) -> RunSummary {
    let mut summary = RunSummary {
        buckets: buckets.len(),
        ..RunSummary::default()
    };

    for (key, captures) in buckets {
        for rendition in renditions {
            let artifact_path = |key| config.artifact_path(&rendition.config, key);
            match materialize(captures, *key, artifact_path, &rendition.encoder).await {
                Ok(Materialization::Created(_)) => summary.created += 1,
                Ok(Materialization::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    error!("Bucket {} ({}) failed: {}", key, rendition.config.name, e);
                    summary.failed.push(BucketFailure {
                        key: *key,
                        rendition: rendition.config.name.clone(),
                        error: e,
                    });
                }
            }
        }
    }

    info!(
        "{} created, {} skipped, {} failed",
        summary.created,
        summary.skipped,
        summary.failed.len()
    );
    summary
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanRow {
    pub(crate) key: i64,
    pub(crate) count: usize,
    pub(crate) first: i64,
    pub(crate) last: i64,
    pub(crate) states: Vec<(String, BucketState)>,
}

impl fmt::Display for PlanRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = DateTime::<Utc>::from_timestamp(self.key, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "out of range".to_owned());
        write!(
            f,
            "{}  {}  {:>5} captures  [{}..{}]",
            self.key, start, self.count, self.first, self.last
        )?;
        for (name, state) in &self.states {
            write!(f, "  {}={}", name, state.as_str())?;
        }
        Ok(())
    }
}

/// Computes the partition and each rendition's state without encoding anything.
pub(crate) fn plan(config: &Config, now: i64) -> anyhow::Result<Vec<PlanRow>> {
    let captures = scan_captures(config)?;
    let buckets = partition(captures, &config.bucket_policy(), now)?;

    let rows = buckets
        .iter()
        .filter_map(|(key, captures)| {
            let first = captures.first()?.timestamp;
            let last = captures.last()?.timestamp;
            let states = config
                .renditions
                .iter()
                .map(|r| {
                    let state = bucket_state(&config.artifact_path(r, *key));
                    (r.name.clone(), state)
                })
                .collect();
            Some(PlanRow {
                key: *key,
                count: captures.len(),
                first,
                last,
                states,
            })
        })
        .collect();
    Ok(rows)
}
