// Per-cycle merged views: one row per device plus the fleet-level rollup.

use super::DeviceRates;

/// Which side of the fleet drove a device's I/O this cycle. Rendered as the
/// one-character Src column: 'T' (this gateway) / 'O' (other gateway).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum IoSource {
    #[default]
    None,
    Local,
    Remote,
}

impl IoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoSource::None => "",
            IoSource::Local => "T",
            IoSource::Remote => "O",
        }
    }
}

impl std::fmt::Display for IoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined multi-host view of one device for one cycle. Fresh per cycle;
/// devices no host reported still get a directory-seeded entry with zero
/// rates.
#[derive(Debug, Clone, Default)]
pub struct DeviceSummary {
    pub rates: DeviceRates,
    /// Static attributes from the device directory.
    pub capacity: u64,
    pub rbd_name: String,
    /// Client shortname mapped to this device, if resolved.
    pub client: String,
    pub io_source: IoSource,
}

/// Fleet-level rollup for one cycle.
#[derive(Debug, Clone, Default)]
pub struct HostSummary {
    /// One CPU-busy value per contributing host (for min/max display).
    pub cpu_busy: Vec<f64>,
    pub min_cpu: f64,
    pub max_cpu: f64,
    pub total_net_in: f64,
    pub total_net_out: f64,
    pub total_capacity: u64,
    pub total_iops: u64,
    /// Hosts that contributed an aligned sample this cycle.
    pub hosts_up: usize,
    pub hosts_configured: usize,
    /// Reconciled cycle timestamp (unix seconds); 0 before the first cycle.
    pub timestamp: i64,
}

/// Render a byte count in the 1024-based short form used across the display
/// (e.g. "500K", "20G", "1.5T").
pub fn bytes2human(in_bytes: u64) -> String {
    const SUFFIXES: [(char, usize); 5] = [('K', 0), ('M', 0), ('G', 0), ('T', 1), ('P', 2)];

    let mut size = in_bytes as f64;
    for (suffix, precision) in SUFFIXES {
        size /= 1024.0;
        if size < 1024.0 {
            return format!("{size:.precision$}{suffix}");
        }
    }
    // saturate rather than fail on absurd sizes
    format!("{size:.2}P")
}
