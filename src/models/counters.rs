// Raw cumulative counters, as captured by a gateway's metric exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cumulative per-device counters since boot. Superset of both metric-source
/// variants: dm-backed LUNs fill the read/write split and active-time fields,
/// user-backed (tcmu) LUNs fill `ops` plus the byte totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCounters {
    #[serde(default)]
    pub reads: u64,
    #[serde(default)]
    pub writes: u64,
    #[serde(default)]
    pub read_bytes: u64,
    #[serde(default)]
    pub write_bytes: u64,
    /// Cumulative ms spent with read I/O in flight.
    #[serde(default)]
    pub read_active_ms: u64,
    /// Cumulative ms spent with write I/O in flight.
    #[serde(default)]
    pub write_active_ms: u64,
    /// Total ops; only reported by the user-backed variant.
    #[serde(default)]
    pub ops: u64,
}

/// Host-level cumulative counters: CPU tick totals (ms) and NIC byte totals
/// summed over non-loopback interfaces by the exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCounters {
    pub cpu_sys_ms: u64,
    pub cpu_user_ms: u64,
    pub cpu_intr_ms: u64,
    pub cpu_count: u32,
    pub net_in_bytes: u64,
    pub net_out_bytes: u64,
}

/// One snapshot of a host's counters. Immutable once captured; each sampler
/// keeps the previous snapshot to difference against the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// Capture instant on the exporting host, unix microseconds.
    pub captured_us: i64,
    pub devices: HashMap<String, DeviceCounters>,
    pub host: HostCounters,
}
