// Shared test helpers: snapshot/sample builders and a scripted in-process
// metric source for driving the pipeline without real gateways.
#![allow(dead_code)]

use anyhow::Result;
use gwtop::collector::{MetricChannel, MetricConnector};
use gwtop::directory::DeviceInfo;
use gwtop::models::{CounterSnapshot, DeviceCounters, DeviceRates, HostCounters, RateSample};
use std::collections::{HashMap, VecDeque};

pub fn read_write_counters(reads: u64, writes: u64) -> DeviceCounters {
    DeviceCounters {
        reads,
        writes,
        read_bytes: reads * 4096,
        write_bytes: writes * 4096,
        ..Default::default()
    }
}

pub fn snapshot(captured_us: i64, devices: &[(&str, DeviceCounters)]) -> CounterSnapshot {
    CounterSnapshot {
        captured_us,
        devices: devices
            .iter()
            .map(|(name, c)| (name.to_string(), c.clone()))
            .collect(),
        host: HostCounters {
            cpu_count: 2,
            ..Default::default()
        },
    }
}

pub fn rate_sample(host: &str, timestamp: i64, devices: &[(&str, DeviceRates)]) -> RateSample {
    RateSample {
        host: host.to_string(),
        timestamp,
        devices: devices
            .iter()
            .map(|(name, r)| (name.to_string(), *r))
            .collect(),
        cpu_busy_pct: 0.0,
        net_in: 0.0,
        net_out: 0.0,
    }
}

pub fn device_info(capacity: u64, rbd_name: &str) -> DeviceInfo {
    DeviceInfo {
        capacity,
        rbd_name: rbd_name.to_string(),
    }
}

/// One scripted sampler tick: a snapshot to hand out, a fetch error, or a
/// fetch that never completes.
#[derive(Clone)]
pub enum Step {
    Snap(CounterSnapshot),
    Fail,
    Hang,
}

/// Metric source whose per-host behaviour is scripted up front. Once a
/// host's script is exhausted its channel blocks forever, so the sampler
/// idles rather than failing out.
#[derive(Default)]
pub struct ScriptedConnector {
    hosts: HashMap<String, Vec<Step>>,
    refuse: Vec<String>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, name: &str, steps: Vec<Step>) -> Self {
        self.hosts.insert(name.to_string(), steps);
        self
    }

    pub fn refuse(mut self, name: &str) -> Self {
        self.refuse.push(name.to_string());
        self
    }
}

impl MetricConnector for ScriptedConnector {
    type Channel = ScriptedChannel;

    async fn connect(&self, host: &str) -> Result<ScriptedChannel> {
        if self.refuse.iter().any(|h| h == host) {
            anyhow::bail!("scripted connect refusal for {}", host);
        }
        let steps = self
            .hosts
            .get(host)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no script for host {}", host))?;
        Ok(ScriptedChannel {
            steps: steps.into(),
        })
    }
}

pub struct ScriptedChannel {
    steps: VecDeque<Step>,
}

impl MetricChannel for ScriptedChannel {
    async fn fetch_snapshot(&mut self) -> Result<CounterSnapshot> {
        match self.steps.pop_front() {
            Some(Step::Snap(s)) => Ok(s),
            Some(Step::Fail) => anyhow::bail!("scripted fetch failure"),
            Some(Step::Hang) | None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
