// Per-second rates derived from two consecutive counter snapshots.

use std::collections::HashMap;

/// Instantaneous rates for one device on one host. Fields a metric-source
/// variant does not collect stay at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceRates {
    pub reads: f64,
    pub writes: f64,
    pub iops: f64,
    pub read_bytes: f64,
    pub write_bytes: f64,
    pub await_ms: f64,
    pub r_await_ms: f64,
    pub w_await_ms: f64,
}

/// One host's published observation for one sample cycle. Built by that
/// host's sampler and published as an immutable `Arc`; the barrier only
/// merges samples whose `timestamp` values agree.
#[derive(Debug, Clone)]
pub struct RateSample {
    pub host: String,
    /// Unix seconds of the later snapshot, floored to the sampling-interval
    /// grid so independent samplers land on the same slice.
    pub timestamp: i64,
    pub devices: HashMap<String, DeviceRates>,
    pub cpu_busy_pct: f64,
    pub net_in: f64,
    pub net_out: f64,
}
