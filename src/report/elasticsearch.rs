//! Elasticsearch bulk-export sink
//!
//! Each sampled window becomes one `POST /_bulk` NDJSON payload: an index
//! action line per metric, followed by the document line. Documents land in
//! daily indices named `<prefix>-<kind>-<yyyy-MM-dd>`. Requests rotate
//! round-robin across the configured nodes, one node per window.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ReportError, Reporter, SampleSet};
use crate::net;
use crate::transport::{ConsoleSender, HttpSender, Request};

const DEFAULT_INDEX_PREFIX: &str = "metrics";
const DEFAULT_ES_MAJOR_VERSION: u8 = 7;
const NDJSON: &str = "application/x-ndjson";

const TEMPLATE_LEGACY: &str = include_str!("../../templates/metrics-template.json");
const TEMPLATE_V7: &str = include_str!("../../templates/metrics-template-7.json");

/// One cluster member, addressed over plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Last-resort target used when no nodes were configured.
    fn localhost() -> Self {
        Self::new("localhost", 9200)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configures and bootstraps an [`ElasticsearchReporter`].
pub struct ElasticsearchReporterBuilder {
    nodes: Vec<Node>,
    sender: Arc<dyn HttpSender>,
    es_major_version: u8,
    index_prefix: String,
    local_host: Option<String>,
    gzip: bool,
}

impl ElasticsearchReporterBuilder {
    /// Cluster version the index template targets. Versions 7 and later drop
    /// the mapping type from both the template and the bulk action lines.
    pub fn es_major_version(mut self, version: u8) -> Self {
        self.es_major_version = version;
        self
    }

    pub fn node(mut self, host: impl Into<String>, port: u16) -> Self {
        self.nodes.push(Node::new(host, port));
        self
    }

    pub fn nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Transport used for every request; defaults to [`ConsoleSender`].
    pub fn sender(mut self, sender: Arc<dyn HttpSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Value of each document's `host` field; autodetected when unset.
    pub fn local_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = Some(host.into());
        self
    }

    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self
    }

    /// Finish the reporter and install the index template, best effort: a
    /// failed bootstrap is logged and export proceeds regardless.
    pub async fn build(self) -> ElasticsearchReporter {
        let local_host = self
            .local_host
            .or_else(net::local_ip)
            .unwrap_or_else(|| "127.0.0.1".to_owned());
        let reporter = ElasticsearchReporter {
            nodes: self.nodes,
            sender: self.sender,
            es_major_version: self.es_major_version,
            index_prefix: self.index_prefix,
            local_host,
            gzip: self.gzip,
            next_node: AtomicUsize::new(0),
        };
        reporter.install_template().await;
        reporter
    }
}

/// Ships sampled windows to an Elasticsearch cluster as bulk NDJSON.
pub struct ElasticsearchReporter {
    nodes: Vec<Node>,
    sender: Arc<dyn HttpSender>,
    es_major_version: u8,
    index_prefix: String,
    local_host: String,
    gzip: bool,
    next_node: AtomicUsize,
}

impl ElasticsearchReporter {
    pub fn builder() -> ElasticsearchReporterBuilder {
        ElasticsearchReporterBuilder {
            nodes: Vec::new(),
            sender: Arc::new(ConsoleSender::new()),
            es_major_version: DEFAULT_ES_MAJOR_VERSION,
            index_prefix: DEFAULT_INDEX_PREFIX.to_owned(),
            local_host: None,
            gzip: false,
        }
    }

    /// Push the index template to the first configured node. Bootstrap does
    /// not advance the round-robin cursor, so the first bulk request still
    /// goes to the first node.
    async fn install_template(&self) {
        let node = self.nodes.first().cloned().unwrap_or_else(|| {
            warn!("no elasticsearch nodes configured; falling back to localhost:9200");
            Node::localhost()
        });
        let template = if self.es_major_version >= 7 {
            TEMPLATE_V7
        } else {
            TEMPLATE_LEGACY
        };
        let uri = format!(
            "http://{}/_template/{}",
            node,
            self.index_prefix
        );
        let request = Request::post(uri).json(template).build();
        match self.sender.send(request).await {
            Ok(response) => {
                response
                    .on_success(|_| {
                        info!(node = %node, prefix = %self.index_prefix, "index template installed")
                    })
                    .on_error(|resp| {
                        warn!(
                            node = %node,
                            code = resp.code(),
                            body = resp.body(),
                            "index template install rejected"
                        )
                    });
            }
            Err(error) => {
                warn!(node = %node, %error, "index template install failed; continuing");
            }
        }
    }

    /// Next node in strict rotation; uses localhost:9200 when none are
    /// configured.
    fn select_node(&self) -> Node {
        if self.nodes.is_empty() {
            warn!("no elasticsearch nodes configured; sending to localhost:9200");
            return Node::localhost();
        }
        let index = self.next_node.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        self.nodes[index].clone()
    }

    fn export_time(&self, samples: &SampleSet) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(samples.timestamp_millis as i64)
            .single()
            .unwrap_or_default()
    }

    fn index_name(&self, kind: &str, when: DateTime<Utc>) -> String {
        format!("{}-{}-{}", self.index_prefix, kind, when.format("%Y-%m-%d"))
    }

    fn action_line(&self, kind: &str, when: DateTime<Utc>) -> serde_json::Value {
        let mut action = json!({ "_index": self.index_name(kind, when) });
        if self.es_major_version < 7 {
            action["_type"] = json!("_doc");
        }
        json!({ "index": action })
    }

    /// Render the whole window as one NDJSON payload, or `None` when the
    /// window holds no metrics at all.
    fn bulk_payload(&self, samples: &SampleSet) -> Option<String> {
        if samples.is_empty() {
            return None;
        }
        let when = self.export_time(samples);
        let timestamp = when.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut lines = Vec::with_capacity(2 * (samples.meters.len() + samples.timers.len()));

        for (name, meter) in &samples.meters {
            lines.push(self.action_line("meter", when));
            lines.push(json!({
                "name": name,
                "@timestamp": timestamp,
                "host": self.local_host,
                "kind": "meter",
                "count": meter.count,
                "rate": meter.rate(samples.window),
            }));
        }
        for (name, timer) in &samples.timers {
            lines.push(self.action_line("timer", when));
            let mut doc = json!({
                "name": name,
                "@timestamp": timestamp,
                "host": self.local_host,
                "kind": "timer",
                "count": timer.count,
                "rate": timer.rate(samples.window),
                "sum_ms": millis(timer.sum),
                "avg_ms": millis(timer.avg()),
                "max_ms": millis(timer.max),
                "min_ms": millis(timer.min),
            });
            if let Some(p) = &timer.percentiles {
                doc["p75_ms"] = json!(p.p75);
                doc["p95_ms"] = json!(p.p95);
                doc["p98_ms"] = json!(p.p98);
                doc["p99_ms"] = json!(p.p99);
                doc["p999_ms"] = json!(p.p999);
            }
            lines.push(doc);
        }

        let mut payload = String::new();
        for line in lines {
            payload.push_str(&line.to_string());
            payload.push('\n');
        }
        Some(payload)
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[async_trait]
impl Reporter for ElasticsearchReporter {
    async fn report(&self, samples: &SampleSet) -> Result<(), ReportError> {
        let Some(payload) = self.bulk_payload(samples) else {
            debug!("empty sample window; skipping bulk export");
            return Ok(());
        };
        let node = self.select_node();
        let uri = format!("http://{node}/_bulk");
        let request = Request::post(uri)
            .body(NDJSON, payload.into_bytes())
            .gzip_when(self.gzip)?
            .build();

        let response = self.sender.send(request).await?;
        response
            .on_success(|resp| debug!(node = %node, code = resp.code(), "bulk export accepted"))
            .on_error(|resp| {
                warn!(
                    node = %node,
                    code = resp.code(),
                    body = resp.body(),
                    "bulk export rejected"
                )
            });
        Ok(())
    }

    fn name(&self) -> &str {
        "es-reporter"
    }
}
