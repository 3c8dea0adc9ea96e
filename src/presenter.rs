// Presenter/scheduler: drives the display refresh, the slower auxiliary
// refresh, and the quit-key/interrupt loop. Owns the terminal raw-mode
// guard and the shutdown fan-out to the samplers.

use crate::aggregator;
use crate::barrier::{self, BarrierConfig};
use crate::config::{AppConfig, SortKey};
use crate::directory::{AuxSource, AuxStatus, DeviceInfo};
use crate::models::{DeviceSummary, HostSummary, bytes2human};
use crate::rates::SourceVariant;
use crate::sampler::SamplerHandle;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const MB: f64 = 1024.0 * 1024.0;

/// Active display options, fixed for the run.
#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub sortkey: SortKey,
    pub reverse: bool,
    pub busy_only: bool,
    /// Case-insensitive substring match on the pool/image name.
    pub filter: Option<String>,
    pub limit: Option<usize>,
}

impl ViewOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sortkey: config.sortkey,
            reverse: config.reverse,
            busy_only: config.busy_only,
            filter: config.filter.as_ref().map(|f| f.to_lowercase()),
            limit: config.limit,
        }
    }
}

/// Raw-mode guard: keypresses reach the poll loop unbuffered, and the
/// terminal is restored on every exit path, panics included.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            original_hook(panic_info);
        }));
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

pub struct Presenter<A: AuxSource> {
    handles: Vec<SamplerHandle>,
    aux: A,
    view: ViewOptions,
    variant: SourceVariant,
    local_host: String,
    hosts_configured: usize,
    interval_secs: u64,
    aux_interval_secs: u64,
    barrier: BarrierConfig,
    directory: HashMap<String, DeviceInfo>,
    aux_status: AuxStatus,
    warned_unknown: HashSet<String>,
    shutdown_tx: watch::Sender<bool>,
}

impl<A: AuxSource> Presenter<A> {
    pub fn new(
        config: &AppConfig,
        handles: Vec<SamplerHandle>,
        aux: A,
        directory: HashMap<String, DeviceInfo>,
        local_host: String,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            handles,
            aux,
            view: ViewOptions::from_config(config),
            variant: config.variant,
            local_host,
            hosts_configured: config.gateways.len(),
            interval_secs: config.interval_secs,
            aux_interval_secs: config.aux_interval_secs,
            barrier: BarrierConfig::for_interval(config.interval_secs),
            directory,
            aux_status: AuxStatus::default(),
            warned_unknown: HashSet::new(),
            shutdown_tx,
        }
    }

    /// Run until 'q' or an interrupt. Fans shutdown out to the samplers and
    /// joins them before returning; the terminal is restored on all paths.
    pub async fn run(mut self) -> Result<()> {
        let guard = TerminalGuard::new()?;

        let mut display_tick = interval(Duration::from_secs(self.interval_secs));
        display_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut aux_tick = interval(Duration::from_secs(self.aux_interval_secs));
        aux_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_tick = interval(INPUT_POLL_INTERVAL);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = display_tick.tick() => {
                    // the refresh may sit in the alignment wait; a quit
                    // keypress or interrupt cancels it rather than queueing
                    // behind it
                    let refresh = self.refresh_display();
                    tokio::pin!(refresh);
                    let quit = loop {
                        tokio::select! {
                            res = &mut refresh => {
                                // a failed cycle leaves the previous output
                                // on screen
                                if let Err(e) = res {
                                    tracing::error!(error = %e, "display refresh failed; cycle skipped");
                                }
                                break false;
                            }
                            _ = input_tick.tick() => {
                                match quit_requested() {
                                    Ok(true) => break true,
                                    Ok(false) => {}
                                    Err(e) => tracing::warn!(error = %e, "key poll failed"),
                                }
                            }
                            _ = &mut ctrl_c => {
                                tracing::debug!("interrupt received");
                                break true;
                            }
                        }
                    };
                    if quit {
                        break;
                    }
                }
                _ = aux_tick.tick() => {
                    self.refresh_aux().await;
                }
                _ = input_tick.tick() => {
                    match quit_requested() {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, "key poll failed"),
                    }
                }
                _ = &mut ctrl_c => {
                    tracing::debug!("interrupt received");
                    break;
                }
            }
        }

        drop(guard);
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            handle.join().await;
        }
        Ok(())
    }

    async fn refresh_display(&mut self) -> Result<()> {
        let aligned = barrier::align(&self.handles, &self.barrier).await;
        let (host_summary, devices) = aggregator::summarize(
            &self.directory,
            &self.aux_status.clients,
            &aligned,
            self.variant,
            &self.local_host,
            self.hosts_configured,
            &mut self.warned_unknown,
        );

        let rows = select_rows(&devices, &self.view);
        let mut out = std::io::stdout().lock();
        render(&mut out, &host_summary, &self.aux_status, &rows, self.variant)?;
        Ok(())
    }

    /// Slow-cadence facts: cluster health and the device directory/client
    /// map. Failures keep the previous values; the display never blocks on
    /// this.
    async fn refresh_aux(&mut self) {
        match self.aux.cluster_status().await {
            Ok(status) => self.aux_status = status,
            Err(e) => tracing::warn!(error = %e, "cluster status refresh failed"),
        }
        match self.aux.device_directory().await {
            Ok(directory) if !directory.is_empty() => self.directory = directory,
            Ok(_) => tracing::warn!("device directory refresh returned no devices; keeping previous"),
            Err(e) => tracing::warn!(error = %e, "device directory refresh failed"),
        }
    }
}

/// Non-blocking check for 'q' or Ctrl-C at the terminal.
fn quit_requested() -> Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(true);
                }
                _ => {}
            }
        }
    }
    Ok(false)
}

/// Filter, sort and truncate the device map into display order.
pub fn select_rows<'a>(
    devices: &'a BTreeMap<String, DeviceSummary>,
    view: &ViewOptions,
) -> Vec<(&'a String, &'a DeviceSummary)> {
    let mut rows: Vec<(&String, &DeviceSummary)> = devices
        .iter()
        .filter(|(name, summary)| {
            if view.busy_only && summary.rates.iops <= 0.0 {
                return false;
            }
            match &view.filter {
                Some(pattern) => name.to_lowercase().contains(pattern),
                None => true,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let primary = compare_by_key(a, b, view.sortkey);
        let primary = if view.reverse { primary.reverse() } else { primary };
        // deterministic output: ties always fall back to the device name
        primary.then_with(|| a.0.cmp(b.0))
    });

    if let Some(limit) = view.limit {
        rows.truncate(limit);
    }
    rows
}

fn compare_by_key(
    a: &(&String, &DeviceSummary),
    b: &(&String, &DeviceSummary),
    key: SortKey,
) -> Ordering {
    match key {
        SortKey::Image => a.0.cmp(b.0),
        SortKey::RbdName => a.1.rbd_name.cmp(&b.1.rbd_name),
        SortKey::Reads => f64_cmp(a.1.rates.reads, b.1.rates.reads),
        SortKey::Writes => f64_cmp(a.1.rates.writes, b.1.rates.writes),
        SortKey::Await => f64_cmp(a.1.rates.await_ms, b.1.rates.await_ms),
        SortKey::IoSource => a.1.io_source.cmp(&b.1.io_source),
    }
}

fn f64_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn render(
    out: &mut impl Write,
    hosts: &HostSummary,
    aux: &AuxStatus,
    rows: &[(&String, &DeviceSummary)],
    variant: SourceVariant,
) -> Result<()> {
    // raw mode disables newline translation, hence the explicit \r\n
    let name_width = rows
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max(16);

    let desc = if hosts.hosts_up == 1 { "Gateway" } else { "Gateways" };
    write!(
        out,
        "gwtop  {:>3} {:<8}   CPU% MIN:{:>3.0} MAX:{:>3.0}    Network Total In:{:>6}  Out:{:>6}   {}\r\n",
        format!("{}/{}", hosts.hosts_up, hosts.hosts_configured),
        desc,
        hosts.min_cpu,
        hosts.max_cpu,
        bytes2human(hosts.total_net_in as u64),
        bytes2human(hosts.total_net_out as u64),
        format_timestamp(hosts.timestamp),
    )?;
    write!(
        out,
        "Capacity: {:>5}    IOPS: {:>5}   Clients:{:>3}   Ceph: {:<26}   OSDs: {:>4}\r\n",
        bytes2human(hosts.total_capacity),
        hosts.total_iops,
        aux.client_count,
        aux.health,
        aux.osd_count,
    )?;

    write!(out, "{}\r\n", header_row(variant, name_width))?;
    for (name, summary) in rows {
        write!(out, "{}\r\n", device_row(name, summary, variant, name_width))?;
    }
    write!(out, "\r\n")?;
    out.flush()?;
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::TimeZone;
    if timestamp == 0 {
        return "NO DATA".to_string();
    }
    match chrono::Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(t) => t.format("%H:%M:%S").to_string(),
        _ => "NO DATA".to_string(),
    }
}

pub fn header_row(variant: SourceVariant, name_width: usize) -> String {
    match variant {
        SourceVariant::BlockMapper => format!(
            "{:<name_width$}  Src  Device   Size     r/s     w/s    rMB/s     wMB/s    await  r_await  w_await  Client",
            "Pool.Image"
        ),
        SourceVariant::UserBacked => format!(
            "{:<name_width$}    Src    Size     iops     rMB/s     wMB/s   Client",
            "Pool.Image"
        ),
    }
}

pub fn device_row(
    name: &str,
    summary: &DeviceSummary,
    variant: SourceVariant,
    name_width: usize,
) -> String {
    let r = &summary.rates;
    match variant {
        SourceVariant::BlockMapper => format!(
            "{:<name_width$}  {:^3}  {:^6}   {:>4}   {:>5}   {:>5}   {:>6.2}    {:>6.2}   {:>6.2}   {:>6.2}   {:>6.2}  {:<20}",
            name,
            summary.io_source,
            summary.rbd_name,
            bytes2human(summary.capacity),
            r.reads.round() as i64,
            r.writes.round() as i64,
            r.read_bytes / MB,
            r.write_bytes / MB,
            r.await_ms,
            r.r_await_ms,
            r.w_await_ms,
            summary.client,
        ),
        SourceVariant::UserBacked => format!(
            "{:<name_width$}    {:^3}    {:>4}    {:>5}    {:>6.2}    {:>6.2}   {:<20}",
            name,
            summary.io_source,
            bytes2human(summary.capacity),
            r.iops.round() as i64,
            r.read_bytes / MB,
            r.write_bytes / MB,
            summary.client,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceRates, IoSource};

    fn summary(reads: f64, await_ms: f64) -> DeviceSummary {
        DeviceSummary {
            rates: DeviceRates {
                reads,
                iops: reads,
                await_ms,
                ..Default::default()
            },
            capacity: 1024 * 1024 * 1024,
            rbd_name: "rbd0".into(),
            client: String::new(),
            io_source: IoSource::None,
        }
    }

    fn view(sortkey: SortKey) -> ViewOptions {
        ViewOptions {
            sortkey,
            reverse: false,
            busy_only: false,
            filter: None,
            limit: None,
        }
    }

    #[test]
    fn select_rows_sorts_by_name_by_default() {
        let mut devices = BTreeMap::new();
        devices.insert("rbd.b".to_string(), summary(1.0, 0.0));
        devices.insert("rbd.a".to_string(), summary(2.0, 0.0));
        let rows = select_rows(&devices, &view(SortKey::Image));
        let names: Vec<&str> = rows.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["rbd.a", "rbd.b"]);
    }

    #[test]
    fn select_rows_await_descending_tie_breaks_by_name() {
        let mut devices = BTreeMap::new();
        devices.insert("rbd.c".to_string(), summary(0.0, 5.0));
        devices.insert("rbd.a".to_string(), summary(0.0, 5.0));
        devices.insert("rbd.b".to_string(), summary(0.0, 9.0));
        let mut v = view(SortKey::Await);
        v.reverse = true;
        let rows = select_rows(&devices, &v);
        let names: Vec<&str> = rows.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["rbd.b", "rbd.a", "rbd.c"]);
    }

    #[test]
    fn select_rows_busy_only_hides_idle_devices() {
        let mut devices = BTreeMap::new();
        devices.insert("rbd.busy".to_string(), summary(10.0, 0.0));
        devices.insert("rbd.idle".to_string(), summary(0.0, 0.0));
        let mut v = view(SortKey::Image);
        v.busy_only = true;
        let rows = select_rows(&devices, &v);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "rbd.busy");
        // the idle device still exists in the summary map
        assert!(devices.contains_key("rbd.idle"));
    }

    #[test]
    fn select_rows_filter_and_limit() {
        let mut devices = BTreeMap::new();
        devices.insert("rbd.app_1".to_string(), summary(3.0, 0.0));
        devices.insert("rbd.app_2".to_string(), summary(2.0, 0.0));
        devices.insert("rbd.db_1".to_string(), summary(1.0, 0.0));
        let mut v = view(SortKey::Image);
        v.filter = Some("app".to_string());
        v.limit = Some(1);
        let rows = select_rows(&devices, &v);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "rbd.app_1");
    }

    #[test]
    fn format_timestamp_no_data_before_first_cycle() {
        assert_eq!(format_timestamp(0), "NO DATA");
    }

    #[test]
    fn header_row_matches_variant_columns() {
        assert!(header_row(SourceVariant::BlockMapper, 16).contains("r_await"));
        assert!(!header_row(SourceVariant::UserBacked, 16).contains("await"));
        assert!(header_row(SourceVariant::UserBacked, 16).contains("iops"));
    }
}
