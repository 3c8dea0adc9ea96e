// Per-host sampler task. Owns its exporter channel and snapshot history;
// publishes immutable rate samples through a watch slot the barrier reads
// without ever blocking the sampler.

use crate::collector::{MetricChannel, MetricConnector};
use crate::models::{CounterSnapshot, RateSample};
use crate::rates::{self, SourceVariant};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Sampler lifecycle. `Failed` samplers are dropped from aggregation; a run
/// is only fatal when zero samplers ever reach `Sampling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Connecting,
    Sampling,
    Stopped,
    Failed,
}

impl SamplerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SamplerState::Connecting,
            1 => SamplerState::Sampling,
            2 => SamplerState::Stopped,
            _ => SamplerState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval_secs: u64,
    pub connect_timeout: Duration,
    /// Upper bound on one snapshot fetch; a hung exporter counts as a fetch
    /// failure instead of wedging the sampler in `Sampling`.
    pub fetch_timeout: Duration,
    /// Consecutive fetch failures tolerated before the sampler fails out.
    pub max_fetch_failures: u32,
    pub variant: SourceVariant,
}

/// Reader side of one sampler: latest published sample + observable state.
pub struct SamplerHandle {
    host: String,
    sample_rx: watch::Receiver<Option<Arc<RateSample>>>,
    state: Arc<AtomicU8>,
    join: tokio::task::JoinHandle<()>,
}

impl SamplerHandle {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> SamplerState {
        SamplerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_sampling(&self) -> bool {
        self.state() == SamplerState::Sampling
    }

    /// Latest published sample, if the sampler has produced one. Non-blocking.
    pub fn latest(&self) -> Option<Arc<RateSample>> {
        self.sample_rx.borrow().clone()
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Connects to `host`'s metric source (bounded timeout) and spawns the
/// sampling loop. A connect failure returns `Err` and spawns nothing; the
/// caller decides whether losing this host is fatal.
pub async fn spawn<C: MetricConnector>(
    connector: Arc<C>,
    host: String,
    config: SamplerConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<SamplerHandle> {
    let channel = tokio::time::timeout(config.connect_timeout, connector.connect(&host))
        .await
        .with_context(|| format!("connection to metric source on {} timed out", host))?
        .with_context(|| format!("connect to metric source on {}", host))?;

    let (tx, rx) = watch::channel(None);
    let state = Arc::new(AtomicU8::new(SamplerState::Sampling as u8));
    tracing::debug!(host = %host, "sampler connected");

    let join = tokio::spawn(run(
        channel,
        host.clone(),
        config,
        tx,
        state.clone(),
        shutdown,
    ));

    Ok(SamplerHandle {
        host,
        sample_rx: rx,
        state,
        join,
    })
}

async fn run<Ch: MetricChannel>(
    mut channel: Ch,
    host: String,
    config: SamplerConfig,
    tx: watch::Sender<Option<Arc<RateSample>>>,
    state: Arc<AtomicU8>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_secs(config.interval_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut prev: Option<CounterSnapshot> = None;
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // an in-flight fetch is abandoned on shutdown; nothing
                // partial is ever published
                let fetched = tokio::select! {
                    res = tokio::time::timeout(config.fetch_timeout, channel.fetch_snapshot()) => {
                        Some(match res {
                            Ok(inner) => inner,
                            Err(_) => Err(anyhow::anyhow!(
                                "snapshot fetch exceeded {:?}",
                                config.fetch_timeout
                            )),
                        })
                    }
                    _ = shutdown.changed() => None,
                };
                match fetched {
                    None => break,
                    Some(Ok(snapshot)) => {
                        failures = 0;
                        if let Some(prev_snap) = prev.as_ref()
                            && let Some(sample) =
                                compute_sample(&host, prev_snap, &snapshot, &config)
                        {
                            let _ = tx.send(Some(Arc::new(sample)));
                        }
                        prev = Some(snapshot);
                    }
                    Some(Err(e)) => {
                        failures += 1;
                        tracing::warn!(
                            host = %host,
                            error = %e,
                            consecutive = failures,
                            "snapshot fetch failed; keeping previous snapshot"
                        );
                        if failures >= config.max_fetch_failures {
                            tracing::warn!(
                                host = %host,
                                "sampler failed after {} consecutive fetch errors",
                                failures
                            );
                            state.store(SamplerState::Failed as u8, Ordering::Release);
                            return;
                        }
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    state.store(SamplerState::Stopped as u8, Ordering::Release);
    tracing::debug!(host = %host, "sampler stopped");
}

/// Snapshot capture time floored to the sampling-interval grid, so samplers
/// polling independently still agree on a cycle timestamp.
pub fn grid_timestamp(captured_us: i64, interval_secs: u64) -> i64 {
    let secs = captured_us / 1_000_000;
    secs - secs.rem_euclid(interval_secs as i64)
}

/// Derive a publishable sample from two consecutive snapshots. `None` when
/// no time has passed between them (no rate computable this cycle).
fn compute_sample(
    host: &str,
    prev: &CounterSnapshot,
    cur: &CounterSnapshot,
    config: &SamplerConfig,
) -> Option<RateSample> {
    let dt = rates::elapsed_secs(prev, cur);
    if dt <= 0.0 {
        return None;
    }

    // devices only present in the current snapshot have no history to
    // difference against; they contribute from the next cycle
    let mut devices = HashMap::with_capacity(cur.devices.len());
    for (id, counters) in &cur.devices {
        if let Some(prev_counters) = prev.devices.get(id) {
            devices.insert(
                id.clone(),
                rates::device_rates(prev_counters, counters, dt, config.variant),
            );
        }
    }

    let (net_in, net_out) = rates::net_rates(&prev.host, &cur.host, dt);
    Some(RateSample {
        host: host.to_string(),
        timestamp: grid_timestamp(cur.captured_us, config.interval_secs),
        devices,
        cpu_busy_pct: rates::cpu_busy_pct(&prev.host, &cur.host, dt * 1_000.0),
        net_in,
        net_out,
    })
}
