//! TOML configuration for the sampling schedule and export pipeline

pub mod defaults;

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::metrics::{MetricRegistry, ReservoirKind};
use crate::report::{ConsoleReporter, ElasticsearchReporter, Node, Reporter, ScheduledReporter};
use crate::transport::{ConsoleSender, HttpClientSender, HttpSender, SocketSender, TransportError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to build http transport: {0}")]
    Transport(#[from] TransportError),
}

/// Which HTTP transport the Elasticsearch reporter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Print requests instead of sending them
    Console,
    /// Pooled client with connect and request timeouts
    #[default]
    Client,
    /// One raw TCP connection per request
    Socket,
}

/// One Elasticsearch cluster member.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    #[serde(default = "defaults::node_port")]
    pub port: u16,
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Where to export; console output only when empty.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default = "defaults::es_major_version")]
    pub es_major_version: u8,

    #[serde(default = "defaults::index_prefix")]
    pub index_prefix: String,

    /// Value of each document's `host` field; autodetected when unset.
    #[serde(default)]
    pub local_host: Option<String>,

    #[serde(default = "defaults::sample_interval_ms")]
    pub sample_interval_ms: u64,

    #[serde(default = "defaults::graceful_shutdown_ms")]
    pub graceful_shutdown_ms: u64,

    #[serde(default = "defaults::forced_shutdown_ms")]
    pub forced_shutdown_ms: u64,

    #[serde(default)]
    pub transport: TransportKind,

    /// Attach an HDR reservoir to every timer for percentile export.
    #[serde(default)]
    pub enable_histograms: bool,

    /// Gzip bulk request bodies.
    #[serde(default)]
    pub gzip: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            es_major_version: defaults::es_major_version(),
            index_prefix: defaults::index_prefix(),
            local_host: None,
            sample_interval_ms: defaults::sample_interval_ms(),
            graceful_shutdown_ms: defaults::graceful_shutdown_ms(),
            forced_shutdown_ms: defaults::forced_shutdown_ms(),
            transport: TransportKind::default(),
            enable_histograms: false,
            gzip: false,
        }
    }
}

impl MetricsConfig {
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.index_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "index_prefix must not be empty".to_owned(),
            ));
        }
        for node in &self.nodes {
            if node.host.is_empty() {
                return Err(ConfigError::Invalid(
                    "node host must not be empty".to_owned(),
                ));
            }
            if node.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "node {} has port 0",
                    node.host
                )));
            }
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_ms)
    }

    pub fn forced_shutdown(&self) -> Duration {
        Duration::from_millis(self.forced_shutdown_ms)
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .map(|node| Node::new(node.host.clone(), node.port))
            .collect()
    }

    /// Build a registry matching this configuration's histogram setting.
    pub fn registry(&self) -> Arc<MetricRegistry> {
        let reservoirs = if self.enable_histograms {
            ReservoirKind::Hdr
        } else {
            ReservoirKind::None
        };
        Arc::new(MetricRegistry::new().with_reservoirs(reservoirs))
    }

    /// The transport this configuration selects.
    pub fn sender(&self) -> Result<Arc<dyn HttpSender>, ConfigError> {
        Ok(match self.transport {
            TransportKind::Console => Arc::new(ConsoleSender::new()),
            TransportKind::Client => Arc::new(HttpClientSender::new()?),
            TransportKind::Socket => Arc::new(SocketSender::new()),
        })
    }

    /// Wire up a full scheduled pipeline for `registry`: an Elasticsearch
    /// sink when nodes are configured, a console sink otherwise. The
    /// returned scheduler has not been started.
    pub async fn build_reporter(
        &self,
        registry: Arc<MetricRegistry>,
    ) -> Result<ScheduledReporter, ConfigError> {
        let sink: Arc<dyn Reporter> = if self.nodes.is_empty() {
            info!("no export nodes configured; reporting to console");
            Arc::new(ConsoleReporter::new())
        } else {
            let mut builder = ElasticsearchReporter::builder()
                .nodes(self.nodes())
                .es_major_version(self.es_major_version)
                .index_prefix(self.index_prefix.clone())
                .sender(self.sender()?)
                .gzip(self.gzip);
            if let Some(host) = &self.local_host {
                builder = builder.local_host(host.clone());
            }
            Arc::new(builder.build().await)
        };
        Ok(ScheduledReporter::builder(registry, sink)
            .period(self.sample_interval())
            .graceful_timeout(self.graceful_shutdown())
            .forced_timeout(self.forced_shutdown())
            .build())
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<MetricsConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    MetricsConfig::from_str(&content)
}
