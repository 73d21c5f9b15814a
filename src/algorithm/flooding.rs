//! Flooding strategy (spec.md §4.3): forward everything to every neighbor
//! except the inbound one. No per-neighbor state; storm prevention is
//! entirely delegated to the orchestrator's dedup + TTL decrement.

use crate::algorithm::{Action, NeighborInfo, RoutingAlgorithm};
use crate::model::packet::{Packet, BROADCAST, TYPE_ECHO, TYPE_ECHO_REPLY, TYPE_HELLO, TYPE_MESSAGE};

/// Flooding has no LSA, but it does emit HELLO so peers can discover it.
const HELLO_INTERVAL: f64 = 5.0;
const HELLO_TTL: i64 = 1;

pub struct FloodingStrategy {
    self_id: String,
    last_hello_time: f64,
}

impl FloodingStrategy {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            last_hello_time: f64::NEG_INFINITY,
        }
    }
}

impl RoutingAlgorithm for FloodingStrategy {
    fn get_name(&self) -> &'static str {
        "flooding"
    }

    fn update_neighbor(&mut self, _id: &str, _info: NeighborInfo, _now: f64) {
        // Flooding tracks no per-neighbor liveness or cost.
    }

    fn process_packet(&mut self, pkt: &mut Packet, _from_neighbor: &str, _now: f64) -> Action {
        let addressed_to_self = pkt.to_addr == self.self_id;
        let deliverable = matches!(pkt.kind.as_str(), TYPE_MESSAGE | TYPE_ECHO | TYPE_ECHO_REPLY);
        if addressed_to_self && deliverable {
            return Action::None;
        }
        Action::Flood
    }

    fn should_send_hello(&self, now: f64) -> bool {
        now - self.last_hello_time >= HELLO_INTERVAL
    }

    fn create_hello_packet(&mut self, now: f64) -> Option<Packet> {
        self.last_hello_time = now;
        let mut pkt = Packet::new("flooding", TYPE_HELLO, self.self_id.clone(), BROADCAST, HELLO_TTL);
        pkt.set_ts(now);
        pkt.set_path(Vec::new());
        Some(pkt)
    }

    fn get_next_hop(&self, _dst: &str) -> Option<String> {
        None
    }
}
