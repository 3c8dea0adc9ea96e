// Per-cycle merge: combines the barrier-aligned per-host samples into one
// summary row per directory device plus the fleet rollup. Allocates fresh
// output every cycle; nothing visible outside the cycle is mutated.

use crate::directory::DeviceInfo;
use crate::models::{DeviceRates, DeviceSummary, HostSummary, IoSource, RateSample};
use crate::rates::{Combine, SourceVariant};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Merge one aligned cycle. Every directory device gets a row (zero rates
/// when no host reported it); reported devices missing from the directory
/// are logged once and skipped. O(devices x hosts).
pub fn summarize(
    directory: &HashMap<String, DeviceInfo>,
    clients: &HashMap<String, String>,
    aligned: &[Arc<RateSample>],
    variant: SourceVariant,
    local_host: &str,
    hosts_configured: usize,
    warned_unknown: &mut HashSet<String>,
) -> (HostSummary, BTreeMap<String, DeviceSummary>) {
    for sample in aligned {
        for dev in sample.devices.keys() {
            if !directory.contains_key(dev) && warned_unknown.insert(dev.clone()) {
                tracing::warn!(
                    device = %dev,
                    host = %sample.host,
                    "reported device has no directory entry; excluded from output"
                );
            }
        }
    }

    let mut devices = BTreeMap::new();
    let mut total_capacity: u64 = 0;
    let mut total_iops: f64 = 0.0;

    for (dev, info) in directory {
        let contributors: Vec<(&str, &DeviceRates)> = aligned
            .iter()
            .filter_map(|s| s.devices.get(dev).map(|r| (s.host.as_str(), r)))
            .collect();

        let mut combined = DeviceRates::default();
        for (field, rule) in variant.policy() {
            let values = contributors.iter().map(|(_, r)| field.get(r));
            let merged = match rule {
                Combine::Sum => values.sum(),
                Combine::Max => values.fold(0.0, f64::max),
            };
            field.set(&mut combined, merged);
        }

        let mut io_source = IoSource::None;
        for (host, r) in &contributors {
            if r.iops > 0.0 {
                if *host == local_host {
                    io_source = IoSource::Local;
                    break;
                }
                io_source = IoSource::Remote;
            }
        }

        total_capacity += info.capacity;
        total_iops += combined.iops;

        devices.insert(
            dev.clone(),
            DeviceSummary {
                rates: combined,
                capacity: info.capacity,
                rbd_name: info.rbd_name.clone(),
                client: clients.get(dev).cloned().unwrap_or_default(),
                io_source,
            },
        );
    }

    let cpu_busy: Vec<f64> = aligned.iter().map(|s| s.cpu_busy_pct).collect();
    let min_cpu = if cpu_busy.is_empty() {
        0.0
    } else {
        cpu_busy.iter().copied().fold(f64::INFINITY, f64::min)
    };
    let host_summary = HostSummary {
        min_cpu,
        max_cpu: cpu_busy.iter().copied().fold(0.0, f64::max),
        total_net_in: aligned.iter().map(|s| s.net_in).sum(),
        total_net_out: aligned.iter().map(|s| s.net_out).sum(),
        total_capacity,
        total_iops: total_iops.round() as u64,
        hosts_up: aligned.len(),
        hosts_configured,
        timestamp: aligned.first().map(|s| s.timestamp).unwrap_or(0),
        cpu_busy,
    };

    (host_summary, devices)
}
