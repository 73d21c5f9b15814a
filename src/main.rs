use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use labrouted::algorithm::flooding::FloodingStrategy;
use labrouted::algorithm::lsr::{LsrStrategy, LsrTimers};
use labrouted::algorithm::RoutingAlgorithm;
use labrouted::cli::{run_shell, LogRing, RingLayer};
use labrouted::config::{load_names, load_topology, Endpoint};
use labrouted::runtime::node::Node;
use labrouted::transport::udp_mesh::UdpMeshTransport;

#[derive(Debug, Parser)]
#[command(name = "labrouted")]
#[command(about = "Flooding + link-state routing daemon for a lab-scale node mesh")]
struct Args {
    /// This node's id, as it appears in both config documents.
    #[arg(long)]
    self_id: String,
    /// "flooding" or "lsr".
    #[arg(long, default_value = "lsr")]
    protocol: String,
    #[arg(long)]
    topo: PathBuf,
    #[arg(long)]
    names: PathBuf,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long, default_value_t = 750)]
    tick_interval_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let ring = LogRing::new();
    init_logging(&args.log_level, ring.clone())?;

    let topo = load_topology(&args.topo)?;
    let names = load_names(&args.names)?;
    let neighbor_ids = topo.neighbors_of(&args.self_id);

    let self_endpoint = names
        .endpoints
        .get(&args.self_id)
        .with_context(|| format!("no names entry for self id {}", args.self_id))?;
    let (bind_host, bind_port) = match self_endpoint {
        Endpoint::Udp { host, port } => (host.clone(), *port),
        Endpoint::Channel { .. } => bail!(
            "labrouted requires a host:port endpoint for {}; channel endpoints are for the in-process test harness only",
            args.self_id
        ),
    };

    let mut neighbor_addrs: BTreeMap<String, SocketAddr> = BTreeMap::new();
    for id in &neighbor_ids {
        let endpoint = names
            .endpoints
            .get(id)
            .with_context(|| format!("no names entry for neighbor {id}"))?;
        match endpoint {
            Endpoint::Udp { host, port } => {
                let addr: SocketAddr = format!("{host}:{port}")
                    .parse()
                    .with_context(|| format!("invalid address for neighbor {id}"))?;
                neighbor_addrs.insert(id.clone(), addr);
            }
            Endpoint::Channel { .. } => {
                bail!("neighbor {id} has a channel endpoint; labrouted requires host:port")
            }
        }
    }

    let transport = UdpMeshTransport::bind(&bind_host, bind_port, neighbor_addrs)?;

    let algo: Box<dyn RoutingAlgorithm> = match args.protocol.as_str() {
        "flooding" => Box::new(FloodingStrategy::new(args.self_id.clone())),
        "lsr" => Box::new(LsrStrategy::new(args.self_id.clone(), LsrTimers::default())),
        other => bail!("unknown protocol: {other} (expected \"flooding\" or \"lsr\")"),
    };

    let node = Node::new(
        args.self_id.clone(),
        algo,
        Box::new(transport),
        neighbor_ids,
        50_000,
    );

    info!(self_id = %node.self_id(), protocol = %args.protocol, "labrouted starting");
    install_signal_handler(&node)?;

    let runner = Arc::clone(&node);
    let tick_interval = Duration::from_millis(args.tick_interval_ms);
    let run_handle = std::thread::spawn(move || runner.run(tick_interval));

    run_shell(&node, &ring);
    node.shutdown();
    let _ = run_handle.join();
    Ok(())
}

fn install_signal_handler(node: &Arc<Node>) -> Result<()> {
    let node = Arc::clone(node);
    ctrlc::set_handler(move || node.shutdown())?;
    Ok(())
}

fn init_logging(level: &str, ring: LogRing) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(RingLayer::new(ring))
        .init();
    Ok(())
}
