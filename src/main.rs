use anyhow::Result;
use clap::Parser;
use gwtop::directory::AuxSource;
use gwtop::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FETCH_FAILURES: u32 = 5;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // stderr, so log lines never interleave with the rendered display
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app_config = config::AppConfig::load(&cli)?;
    let local_host = directory::local_shortname();

    let client = collector::ExporterClient::new(app_config.port);
    // the directory collaborator lives on a gateway; prefer the local one
    let aux_host = if app_config.gateways.iter().any(|g| *g == local_host) {
        local_host.clone()
    } else {
        app_config.gateways[0].clone()
    };
    let aux = directory::ExporterAux::new(client.clone(), aux_host.clone());

    let devices = aux.device_directory().await.map_err(|e| {
        anyhow::anyhow!("unable to read the device directory from {}: {}", aux_host, e)
    })?;
    anyhow::ensure!(
        !devices.is_empty(),
        "no devices have been detected on {}, unable to continue",
        aux_host
    );
    tracing::debug!(devices = devices.len(), host = %aux_host, "device directory seeded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler_config = sampler::SamplerConfig {
        interval_secs: app_config.interval_secs,
        connect_timeout: CONNECT_TIMEOUT,
        fetch_timeout: FETCH_TIMEOUT,
        max_fetch_failures: MAX_FETCH_FAILURES,
        variant: app_config.variant,
    };

    let connector = Arc::new(client);
    let mut handles = Vec::new();
    for gateway in &app_config.gateways {
        match sampler::spawn(
            connector.clone(),
            gateway.clone(),
            sampler_config.clone(),
            shutdown_rx.clone(),
        )
        .await
        {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::error!(host = %gateway, error = %e, "gateway excluded"),
        }
    }
    anyhow::ensure!(
        !handles.is_empty(),
        "unable to continue, no metric exporters are reachable on the gateways"
    );
    tracing::info!(
        connected = handles.len(),
        configured = app_config.gateways.len(),
        "sampling started"
    );

    let presenter = presenter::Presenter::new(
        &app_config,
        handles,
        aux,
        devices,
        local_host,
        shutdown_tx,
    );
    presenter.run().await
}
