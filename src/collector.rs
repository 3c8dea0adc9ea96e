// Metric-source binding: the trait seam the samplers run against, plus the
// production client for the per-gateway exporter daemon (newline-delimited
// JSON request/response over TCP).

use crate::models::CounterSnapshot;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// An established channel to one host's metric source.
pub trait MetricChannel: Send + 'static {
    /// Fetch the next cumulative counter snapshot for this host.
    fn fetch_snapshot(&mut self) -> impl Future<Output = Result<CounterSnapshot>> + Send;
}

/// Factory for per-host metric channels. Samplers are generic over this so
/// tests can drive the whole pipeline with in-process sources.
pub trait MetricConnector: Send + Sync + 'static {
    type Channel: MetricChannel;

    fn connect(&self, host: &str) -> impl Future<Output = Result<Self::Channel>> + Send;
}

/// Client side of the gateway exporter protocol: one request verb per line,
/// one JSON document per reply line.
#[derive(Debug, Clone)]
pub struct ExporterClient {
    port: u16,
    request_timeout: Duration,
}

impl ExporterClient {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            request_timeout: Duration::from_secs(5),
        }
    }

    /// One-shot request against `host`: connect, send `verb`, parse a single
    /// JSON reply line. Used for the slow-cadence lookups (directory,
    /// cluster status); samplers hold a persistent channel instead.
    pub async fn request<T: DeserializeOwned>(&self, host: &str, verb: &str) -> Result<T> {
        let fut = async {
            let mut chan = self.open(host).await?;
            chan.request(verb).await
        };
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .with_context(|| format!("exporter request '{}' to {} timed out", verb, host))?
    }

    async fn open(&self, host: &str) -> Result<ExporterChannel> {
        let addr = format!("{}:{}", host, self.port);
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect to exporter at {}", addr))?;
        let (read_half, write_half) = stream.into_split();
        Ok(ExporterChannel {
            reader: BufReader::new(read_half),
            writer: write_half,
            line: String::new(),
        })
    }
}

impl MetricConnector for ExporterClient {
    type Channel = ExporterChannel;

    async fn connect(&self, host: &str) -> Result<ExporterChannel> {
        self.open(host).await
    }
}

/// Persistent exporter connection held by one sampler.
pub struct ExporterChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl ExporterChannel {
    async fn request<T: DeserializeOwned>(&mut self, verb: &str) -> Result<T> {
        self.writer
            .write_all(verb.as_bytes())
            .await
            .context("write exporter request")?;
        self.writer.write_all(b"\n").await.context("write exporter request")?;

        self.line.clear();
        let n = self
            .reader
            .read_line(&mut self.line)
            .await
            .context("read exporter reply")?;
        anyhow::ensure!(n > 0, "exporter closed the connection");

        serde_json::from_str(self.line.trim_end())
            .with_context(|| format!("parse exporter '{}' reply", verb))
    }
}

impl MetricChannel for ExporterChannel {
    async fn fetch_snapshot(&mut self) -> Result<CounterSnapshot> {
        self.request("stats").await
    }
}
