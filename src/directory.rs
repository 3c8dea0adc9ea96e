// Device directory and slow-cadence cluster lookups. Read-only facts from
// the core's perspective: seeded at startup, refreshed on the auxiliary
// cadence, never per sample cycle.

use crate::collector::ExporterClient;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

/// Static attributes of one exported device, keyed fleet-wide by the
/// pool/image name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub capacity: u64,
    /// Short rbd device name (e.g. "rbd0") on the reporting gateway.
    pub rbd_name: String,
}

/// Cluster health and client mapping, refreshed on the aux interval only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxStatus {
    pub health: String,
    pub osd_count: u32,
    /// pool/image -> client shortname ("- multi -" when mapped to several).
    #[serde(default)]
    pub clients: HashMap<String, String>,
    #[serde(default)]
    pub client_count: u32,
}

/// Slow-cadence collaborator contract for the presenter's auxiliary refresh.
pub trait AuxSource: Send + Sync + 'static {
    fn cluster_status(&self) -> impl Future<Output = Result<AuxStatus>> + Send;
    fn device_directory(&self) -> impl Future<Output = Result<HashMap<String, DeviceInfo>>> + Send;
}

/// Production aux source: queries one gateway's exporter.
#[derive(Debug, Clone)]
pub struct ExporterAux {
    client: ExporterClient,
    host: String,
}

impl ExporterAux {
    pub fn new(client: ExporterClient, host: String) -> Self {
        Self { client, host }
    }
}

impl AuxSource for ExporterAux {
    async fn cluster_status(&self) -> Result<AuxStatus> {
        self.client.request(&self.host, "cluster").await
    }

    async fn device_directory(&self) -> Result<HashMap<String, DeviceInfo>> {
        self.client.request(&self.host, "devices").await
    }
}

/// Local host shortname, used to tag device I/O as locally vs remotely
/// driven. Falls back to $HOSTNAME off Linux.
pub fn local_shortname() -> String {
    let name = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".into());
    name.split('.').next().unwrap_or(&name).to_string()
}
