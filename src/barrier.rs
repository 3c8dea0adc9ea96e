// Sync barrier: holds a display cycle until every live sampler's published
// sample carries the same grid timestamp, so cross-host merges never mix
// time windows.

use crate::models::RateSample;
use crate::sampler::SamplerHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BarrierConfig {
    /// Sleep between alignment polls.
    pub backoff: Duration,
    /// Upper bound on one alignment wait; past it the cycle degrades to the
    /// aligned subset instead of stalling the display.
    pub max_wait: Duration,
}

impl BarrierConfig {
    pub fn for_interval(interval_secs: u64) -> Self {
        Self {
            backoff: Duration::from_millis(100),
            max_wait: Duration::from_secs(2 * interval_secs + 1),
        }
    }
}

/// Produce one timestamp-aligned set of samples from the currently-sampling
/// hosts. Samplers that have not yet computed a first rate hold the barrier
/// (they publish nothing to align on) until the deadline; a stuck or failed
/// sampler is dropped from the cycle at the deadline, never merged stale.
pub async fn align(handles: &[SamplerHandle], config: &BarrierConfig) -> Vec<Arc<RateSample>> {
    let deadline = Instant::now() + config.max_wait;
    let mut wait_logged = false;

    loop {
        let live: Vec<&SamplerHandle> = handles.iter().filter(|h| h.is_sampling()).collect();
        if live.is_empty() {
            return Vec::new();
        }

        let samples: Vec<Arc<RateSample>> = live.iter().filter_map(|h| h.latest()).collect();
        if samples.len() == live.len()
            && let Some(first) = samples.first()
            && samples.iter().all(|s| s.timestamp == first.timestamp)
        {
            return samples;
        }

        if Instant::now() >= deadline {
            let subset = aligned_subset(samples);
            let ts = subset.first().map(|s| s.timestamp);
            let stale: Vec<&str> = live
                .iter()
                .filter(|h| h.latest().map(|s| Some(s.timestamp)) != Some(ts))
                .map(|h| h.host())
                .collect();
            tracing::debug!(
                aligned = subset.len(),
                stale = ?stale,
                "alignment timed out; proceeding with aligned subset"
            );
            return subset;
        }

        if !wait_logged {
            tracing::debug!("waiting for samplers to synchronise");
            wait_logged = true;
        }
        tokio::time::sleep(config.backoff).await;
    }
}

/// Largest group of samples sharing one timestamp; ties go to the newer
/// timestamp. Used as the degraded-cycle fallback.
pub fn aligned_subset(samples: Vec<Arc<RateSample>>) -> Vec<Arc<RateSample>> {
    let mut groups: std::collections::HashMap<i64, Vec<Arc<RateSample>>> =
        std::collections::HashMap::new();
    for sample in samples {
        groups.entry(sample.timestamp).or_default().push(sample);
    }
    groups
        .into_iter()
        .max_by_key(|(ts, group)| (group.len(), *ts))
        .map(|(_, group)| group)
        .unwrap_or_default()
}
