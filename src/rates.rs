// Rate calculator: pure cur/prev delta math, plus the static per-variant
// field combination policy used by the aggregator.

use crate::models::{CounterSnapshot, DeviceCounters, DeviceRates, HostCounters};

/// Which metric source backs the gateways' LUNs. Selected once at startup;
/// drives both which rate fields a sampler fills and how the aggregator
/// combines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceVariant {
    /// Device-mapper backed LUNs: full read/write split with wait times.
    BlockMapper,
    /// User-backed (tcmu) LUNs: total iops plus read/write byte totals only.
    UserBacked,
}

impl std::str::FromStr for SourceVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(SourceVariant::BlockMapper),
            "lio" => Ok(SourceVariant::UserBacked),
            other => anyhow::bail!("unknown metric-source variant '{}' (expected dm or lio)", other),
        }
    }
}

/// How multiple hosts' observations of one field merge into a summary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    Sum,
    Max,
}

/// Enumerated rate fields; each is bound to its accessor here rather than
/// looked up by name at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Reads,
    Writes,
    Iops,
    ReadBytes,
    WriteBytes,
    AwaitMs,
    RAwaitMs,
    WAwaitMs,
}

impl MetricField {
    pub fn get(&self, r: &DeviceRates) -> f64 {
        match self {
            MetricField::Reads => r.reads,
            MetricField::Writes => r.writes,
            MetricField::Iops => r.iops,
            MetricField::ReadBytes => r.read_bytes,
            MetricField::WriteBytes => r.write_bytes,
            MetricField::AwaitMs => r.await_ms,
            MetricField::RAwaitMs => r.r_await_ms,
            MetricField::WAwaitMs => r.w_await_ms,
        }
    }

    pub fn set(&self, r: &mut DeviceRates, v: f64) {
        match self {
            MetricField::Reads => r.reads = v,
            MetricField::Writes => r.writes = v,
            MetricField::Iops => r.iops = v,
            MetricField::ReadBytes => r.read_bytes = v,
            MetricField::WriteBytes => r.write_bytes = v,
            MetricField::AwaitMs => r.await_ms = v,
            MetricField::RAwaitMs => r.r_await_ms = v,
            MetricField::WAwaitMs => r.w_await_ms = v,
        }
    }
}

/// Throughput fields sum across hosts; wait times take the worst host.
const DM_POLICY: &[(MetricField, Combine)] = &[
    (MetricField::Reads, Combine::Sum),
    (MetricField::Writes, Combine::Sum),
    (MetricField::Iops, Combine::Sum),
    (MetricField::ReadBytes, Combine::Sum),
    (MetricField::WriteBytes, Combine::Sum),
    (MetricField::AwaitMs, Combine::Max),
    (MetricField::RAwaitMs, Combine::Max),
    (MetricField::WAwaitMs, Combine::Max),
];

const LIO_POLICY: &[(MetricField, Combine)] = &[
    (MetricField::Iops, Combine::Sum),
    (MetricField::ReadBytes, Combine::Sum),
    (MetricField::WriteBytes, Combine::Sum),
];

impl SourceVariant {
    pub fn policy(self) -> &'static [(MetricField, Combine)] {
        match self {
            SourceVariant::BlockMapper => DM_POLICY,
            SourceVariant::UserBacked => LIO_POLICY,
        }
    }
}

/// Elapsed seconds between two snapshots of the same host, at microsecond
/// precision. May be sub-second; never assumed to equal the configured
/// interval. Non-positive means no rate is computable this cycle.
pub fn elapsed_secs(prev: &CounterSnapshot, cur: &CounterSnapshot) -> f64 {
    (cur.captured_us - prev.captured_us) as f64 / 1_000_000.0
}

/// Per-second rate for a simple cumulative counter. A counter decrease
/// (wraparound, device re-added) yields 0, never a negative rate.
pub fn counter_rate(prev: u64, cur: u64, dt: f64) -> f64 {
    if dt <= 0.0 || cur <= prev {
        return 0.0;
    }
    (cur - prev) as f64 / dt
}

/// Average wait per op over the window: delta active time / delta ops,
/// exactly 0 when no ops completed (explicit guard, not a division fault).
pub fn avg_wait_ms(active_delta_ms: u64, ops_delta: u64) -> f64 {
    if ops_delta == 0 {
        return 0.0;
    }
    active_delta_ms as f64 / ops_delta as f64
}

/// Host CPU busy percentage from sys/user/intr tick deltas, normalised by
/// cpu count and elapsed wall time, clamped to [0, 100].
pub fn cpu_busy_pct(prev: &HostCounters, cur: &HostCounters, elapsed_ms: f64) -> f64 {
    if elapsed_ms <= 0.0 || cur.cpu_count == 0 {
        return 0.0;
    }
    let busy_ms = cur.cpu_sys_ms.saturating_sub(prev.cpu_sys_ms)
        + cur.cpu_user_ms.saturating_sub(prev.cpu_user_ms)
        + cur.cpu_intr_ms.saturating_sub(prev.cpu_intr_ms);
    let pct = 100.0 * busy_ms as f64 / (cur.cpu_count as f64 * elapsed_ms);
    pct.clamp(0.0, 100.0)
}

/// Host NIC rates: (in bytes/sec, out bytes/sec).
pub fn net_rates(prev: &HostCounters, cur: &HostCounters, dt: f64) -> (f64, f64) {
    (
        counter_rate(prev.net_in_bytes, cur.net_in_bytes, dt),
        counter_rate(prev.net_out_bytes, cur.net_out_bytes, dt),
    )
}

/// Build a full `DeviceRates` from two consecutive device counter readings.
/// Fields the variant does not collect stay at their 0 default.
pub fn device_rates(
    prev: &DeviceCounters,
    cur: &DeviceCounters,
    dt: f64,
    variant: SourceVariant,
) -> DeviceRates {
    let mut r = DeviceRates::default();
    match variant {
        SourceVariant::BlockMapper => {
            r.reads = counter_rate(prev.reads, cur.reads, dt);
            r.writes = counter_rate(prev.writes, cur.writes, dt);
            r.iops = r.reads + r.writes;
            r.read_bytes = counter_rate(prev.read_bytes, cur.read_bytes, dt);
            r.write_bytes = counter_rate(prev.write_bytes, cur.write_bytes, dt);

            let d_reads = cur.reads.saturating_sub(prev.reads);
            let d_writes = cur.writes.saturating_sub(prev.writes);
            let d_ractive = cur.read_active_ms.saturating_sub(prev.read_active_ms);
            let d_wactive = cur.write_active_ms.saturating_sub(prev.write_active_ms);
            r.await_ms = avg_wait_ms(d_ractive + d_wactive, d_reads + d_writes);
            r.r_await_ms = avg_wait_ms(d_ractive, d_reads);
            r.w_await_ms = avg_wait_ms(d_wactive, d_writes);
        }
        SourceVariant::UserBacked => {
            r.iops = counter_rate(prev.ops, cur.ops, dt);
            r.read_bytes = counter_rate(prev.read_bytes, cur.read_bytes, dt);
            r.write_bytes = counter_rate(prev.write_bytes, cur.write_bytes, dt);
        }
    }
    r
}
