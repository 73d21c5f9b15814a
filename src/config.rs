//! Configuration file parsing (spec.md §6): the two JSON documents (topology
//! adjacency and name-to-endpoint bindings), kept outside the core and
//! handed to the runtime as plain structures.
//!
//! Shaped after `runtime::config::load_daemon_config`'s
//! raw-struct-then-validate approach and its liberal use of
//! `anyhow::Context`, but over `serde_json` rather than `serde_yaml` —
//! spec.md §6 names the wire and config formats as JSON (see DESIGN.md).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Udp { host: String, port: u16 },
    Channel { channel: String },
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub adjacency: BTreeMap<String, Vec<String>>,
}

impl Topology {
    pub fn neighbors_of(&self, node_id: &str) -> Vec<String> {
        self.adjacency.get(node_id).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    pub endpoints: BTreeMap<String, Endpoint>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(rename = "type")]
    kind: String,
    config: Value,
}

pub fn load_topology(path: &Path) -> Result<Topology> {
    let doc = load_document(path, "topo")?;
    let obj = doc
        .config
        .as_object()
        .context("topo config must be a JSON object")?;

    let mut adjacency = BTreeMap::new();
    for (node_id, neighbors) in obj {
        let neighbors = neighbors
            .as_array()
            .with_context(|| format!("topo.config[{node_id}] must be an array"))?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .with_context(|| format!("topo.config[{node_id}] entries must be strings"))
            })
            .collect::<Result<Vec<_>>>()?;
        adjacency.insert(node_id.clone(), neighbors);
    }
    Ok(Topology { adjacency })
}

pub fn load_names(path: &Path) -> Result<NameTable> {
    let doc = load_document(path, "names")?;
    let obj = doc
        .config
        .as_object()
        .context("names config must be a JSON object")?;

    let mut endpoints = BTreeMap::new();
    for (node_id, raw) in obj {
        endpoints.insert(node_id.clone(), parse_endpoint(node_id, raw)?);
    }
    Ok(NameTable { endpoints })
}

fn parse_endpoint(node_id: &str, raw: &Value) -> Result<Endpoint> {
    let obj = raw
        .as_object()
        .with_context(|| format!("names.config[{node_id}] must be an object"))?;

    if let Some(channel) = obj.get("channel").and_then(Value::as_str) {
        return Ok(Endpoint::Channel {
            channel: channel.to_string(),
        });
    }

    let host = obj
        .get("host")
        .and_then(Value::as_str)
        .with_context(|| format!("names.config[{node_id}] must have host+port or channel"))?
        .to_string();
    let port = obj
        .get("port")
        .and_then(Value::as_u64)
        .with_context(|| format!("names.config[{node_id}] missing port"))?;
    Ok(Endpoint::Udp {
        host,
        port: port as u16,
    })
}

fn load_document(path: &Path, expected_type: &str) -> Result<RawDocument> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let doc: RawDocument = serde_json::from_str(&raw_text)
        .with_context(|| format!("failed to parse {} as JSON", path.display()))?;
    if doc.kind != expected_type {
        bail!(
            "expected config type \"{expected_type}\" in {}, got \"{}\"",
            path.display(),
            doc.kind
        );
    }
    Ok(doc)
}

/// Daemon-level knobs that live outside the algorithm core: which of the
/// two strategies to run, tick cadence, and dedup capacities (spec.md §3,
/// §4.5: "recommended cadence 500-1000ms").
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub self_id: String,
    pub protocol: String,
    pub tick_interval: Duration,
    pub lsa_capacity: usize,
    pub seen_capacity: usize,
}

impl DaemonSettings {
    pub fn new(self_id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            protocol: protocol.into(),
            tick_interval: Duration::from_millis(750),
            lsa_capacity: 1024,
            seen_capacity: 50_000,
        }
    }
}
