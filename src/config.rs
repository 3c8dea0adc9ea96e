// Layered configuration: /etc/gwtop.rc then ~/.gwtop.rc (TOML, single
// [config] table) with CLI flags overriding both. Everything is validated
// before the refresh loop starts.

use crate::rates::SourceVariant;
use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

pub const SYSTEM_CONFIG: &str = "/etc/gwtop.rc";
const DEFAULT_PORT: u16 = 9765;
const DEFAULT_AUX_INTERVAL_SECS: u64 = 30;

/// Sortable display fields. Enumerated here so an unknown sort key is
/// rejected at startup, never mid-cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Image,
    RbdName,
    Reads,
    Writes,
    Await,
    IoSource,
}

impl std::str::FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(SortKey::Image),
            "rbd_name" | "rbd-name" => Ok(SortKey::RbdName),
            "reads" => Ok(SortKey::Reads),
            "writes" => Ok(SortKey::Writes),
            "await" => Ok(SortKey::Await),
            "io_source" | "io-source" => Ok(SortKey::IoSource),
            other => anyhow::bail!("unknown sort key '{}'", other),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "gwtop", version, about = "Show iSCSI gateway performance metrics")]
pub struct Cli {
    /// Comma separated iSCSI gateway server names
    #[arg(short, long)]
    pub gateways: Option<String>,

    /// Monitoring interval (secs)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=9))]
    pub interval: Option<u64>,

    /// Sort key for the device rows
    #[arg(short, long, value_enum)]
    pub sortkey: Option<SortKey>,

    /// Reverse the sort order
    #[arg(short, long)]
    pub reverse: bool,

    /// Only show devices with I/O this cycle
    #[arg(short, long)]
    pub busy_only: bool,

    /// Only show devices whose pool/image name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Maximum number of device rows to display
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Metric exporter port on the gateways
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Metric-source variant (dm or lio)
    #[arg(long)]
    pub variant: Option<String>,

    /// Run with additional debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// One `.gwtop.rc` file: a single `[config]` table of optional settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub gateways: Option<String>,
    pub interval: Option<u64>,
    pub sortkey: Option<String>,
    pub reverse: Option<bool>,
    pub busy_only: Option<bool>,
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub port: Option<u16>,
    pub variant: Option<String>,
    pub aux_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RcFile {
    config: FileConfig,
}

impl FileConfig {
    /// Parse one config file's contents (e.g. for tests).
    pub fn parse(s: &str) -> Result<Self> {
        let rc: RcFile = toml::from_str(s)?;
        Ok(rc.config)
    }

    /// Overlay `over` on top of `self` (per-key; later files win).
    pub fn merged_with(self, over: FileConfig) -> Self {
        Self {
            gateways: over.gateways.or(self.gateways),
            interval: over.interval.or(self.interval),
            sortkey: over.sortkey.or(self.sortkey),
            reverse: over.reverse.or(self.reverse),
            busy_only: over.busy_only.or(self.busy_only),
            filter: over.filter.or(self.filter),
            limit: over.limit.or(self.limit),
            port: over.port.or(self.port),
            variant: over.variant.or(self.variant),
            aux_interval: over.aux_interval.or(self.aux_interval),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateways: Vec<String>,
    pub interval_secs: u64,
    pub port: u16,
    pub sortkey: SortKey,
    pub reverse: bool,
    pub busy_only: bool,
    pub filter: Option<String>,
    /// `None` means no row limit.
    pub limit: Option<usize>,
    pub variant: SourceVariant,
    pub aux_interval_secs: u64,
    pub debug: bool,
}

impl AppConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut file = FileConfig::default();
        for path in config_paths() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                let parsed = FileConfig::parse(&contents).map_err(|e| {
                    anyhow::anyhow!(
                        "{}: unsupported config format (expected a single [config] table): {}",
                        path.display(),
                        e
                    )
                })?;
                file = file.merged_with(parsed);
            }
        }
        Self::from_sources(file, cli)
    }

    /// Combine file-level defaults with runtime overrides.
    pub fn from_sources(file: FileConfig, cli: &Cli) -> Result<Self> {
        let gateways: Vec<String> = cli
            .gateways
            .clone()
            .or(file.gateways)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sortkey = match cli.sortkey {
            Some(key) => key,
            None => match &file.sortkey {
                Some(name) => name.parse()?,
                None => SortKey::default(),
            },
        };
        let variant: SourceVariant = cli
            .variant
            .clone()
            .or(file.variant)
            .as_deref()
            .unwrap_or("dm")
            .parse()?;

        let config = Self {
            gateways,
            interval_secs: cli.interval.or(file.interval).unwrap_or(1),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            sortkey,
            reverse: cli.reverse || file.reverse.unwrap_or(false),
            busy_only: cli.busy_only || file.busy_only.unwrap_or(false),
            filter: cli.filter.clone().or(file.filter),
            limit: cli.limit.or(file.limit),
            variant,
            aux_interval_secs: file.aux_interval.unwrap_or(DEFAULT_AUX_INTERVAL_SECS),
            debug: cli.debug,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.gateways.is_empty(),
            "no gateways configured (use --gateways or a config file)"
        );
        anyhow::ensure!(
            (1..=9).contains(&self.interval_secs),
            "interval must be between 1 and 9 seconds, got {}",
            self.interval_secs
        );
        anyhow::ensure!(self.port > 0, "port must be nonzero");
        anyhow::ensure!(
            self.limit != Some(0),
            "limit must be at least 1 when set"
        );
        anyhow::ensure!(
            self.aux_interval_secs > 0,
            "aux_interval must be > 0, got {}",
            self.aux_interval_secs
        );
        Ok(())
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".gwtop.rc"));
    }
    paths
}
