use std::collections::BTreeMap;

use tracing::warn;

use crate::capture::Capture;
use crate::error::BucketError;

/// Bucket start timestamp mapped to its captures, oldest first.
pub(crate) type Partition = BTreeMap<i64, Vec<Capture>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketPolicy {
    pub(crate) length: u64,
    pub(crate) min_age: u64,
    /// Hold a window back until all of it is at least `min_age` old,
    /// instead of emitting whichever members have aged in so far.
    pub(crate) wait_for_full_window: bool,
}

impl BucketPolicy {
    fn length_secs(&self) -> Result<i64, BucketError> {
        match i64::try_from(self.length) {
            Ok(length) if length > 0 => Ok(length),
            _ => Err(BucketError::InvalidLength(self.length)),
        }
    }

    fn min_age_secs(&self) -> i64 {
        i64::try_from(self.min_age).unwrap_or(i64::MAX)
    }
}

/// Aligned start of the window holding `timestamp`. Floors toward negative infinity.
/// `None` when that start lies below `i64::MIN`.
pub(crate) fn bucket_key(timestamp: i64, length: i64) -> Option<i64> {
    timestamp.checked_sub(timestamp.rem_euclid(length))
}

pub(crate) fn partition<I>(
    captures: I,
    policy: &BucketPolicy,
    now: i64,
) -> Result<Partition, BucketError>
where
    I: IntoIterator<Item = Capture>,
{
    let length = policy.length_secs()?;
    let min_age = policy.min_age_secs();
    let cutoff = now.saturating_sub(min_age);

    let mut buckets = Partition::new();
    for capture in captures {
        if now.saturating_sub(capture.timestamp) < min_age {
            continue;
        }
        let Some(key) = bucket_key(capture.timestamp, length) else {
            warn!("Capture {} has no representable bucket", capture.timestamp);
            continue;
        };
        if policy.wait_for_full_window && key.saturating_add(length) > cutoff {
            continue;
        }
        buckets.entry(key).or_default().push(capture);
    }

    // stable: equal timestamps keep discovery order
    for captures in buckets.values_mut() {
        captures.sort_by_key(|c| c.timestamp);
    }
    Ok(buckets)
}
