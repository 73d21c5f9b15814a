//! The routing algorithm strategy: one trait, two variants (spec.md §4.3/§4.4).
//!
//! Implementations are pure state machines — no I/O, no blocking, no
//! sleeping (spec.md §5). The orchestrator (`runtime::node`) is the only
//! thing that touches the transport.

pub mod flooding;
pub mod lsr;

use crate::model::packet::Packet;

/// Sentinel used when the transport can't identify the sending link
/// (spec.md §6: `Transport::receive` returns `"unknown"` in that case).
pub const UNKNOWN_NEIGHBOR: &str = "unknown";

/// What the orchestrator should do with a packet after
/// [`RoutingAlgorithm::process_packet`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Consumed locally, or otherwise requires no further action.
    None,
    /// Forward to every known neighbor except the inbound one.
    Flood,
    /// Forward to every known neighbor except the inbound one (LSA variant;
    /// distinguished from `Flood` only for observability/metrics).
    FloodLsa,
    /// Forward to exactly this neighbor.
    Unicast(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborInfo {
    pub cost: Option<u32>,
}

/// Capability set shared by the flooding and LSR strategies (spec.md §9:
/// "model as a tagged variant or an interface; avoid deep inheritance
/// hierarchies").
pub trait RoutingAlgorithm: Send {
    fn get_name(&self) -> &'static str;

    /// Upserts liveness/cost for a directly configured neighbor. A no-op
    /// for strategies (like flooding) that track no per-neighbor state.
    fn update_neighbor(&mut self, _id: &str, _info: NeighborInfo, _now: f64) {}

    /// `from_neighbor` is [`UNKNOWN_NEIGHBOR`] when the transport couldn't
    /// identify the inbound link.
    fn process_packet(&mut self, pkt: &mut Packet, from_neighbor: &str, now: f64) -> Action;

    fn should_send_hello(&self, _now: f64) -> bool {
        false
    }

    fn create_hello_packet(&mut self, _now: f64) -> Option<Packet> {
        None
    }

    fn should_send_lsa(&self, _now: f64) -> bool {
        false
    }

    fn create_lsa_packet(&mut self, _now: f64) -> Option<Packet> {
        None
    }

    /// Periodic maintenance: neighbor liveness sweep. No-op for strategies
    /// with no neighbor liveness state.
    fn check_neighbor_timeouts(&mut self, _now: f64) {}

    /// Periodic maintenance: LSDB aging. No-op for strategies with no LSDB.
    fn age_lsa_database(&mut self, _now: f64) {}

    fn get_next_hop(&self, _dst: &str) -> Option<String> {
        None
    }

    /// Full destination -> first-hop snapshot, for the `routes` CLI command.
    /// Empty for strategies (flooding) with no routing table.
    fn routes_snapshot(&self) -> std::collections::BTreeMap<String, String> {
        std::collections::BTreeMap::new()
    }
}
