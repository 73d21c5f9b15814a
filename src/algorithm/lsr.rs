//! Link-state routing (LSR) strategy (spec.md §4.4): HELLO/LSA timers, a
//! link-state database with sequence-number ordering and aging, and a
//! deterministic shortest-path computation.
//!
//! Shaped after `protocols::ospf::OspfProtocol` + `protocols::link_state::
//! LinkStateControlPlane` (hello/LSA gating, `LinkStateDb::upsert`/
//! `age_out`) and `protocols::route_compute::spf::compute_spf_single`
//! (Dijkstra with lexicographic tie-break on first hop), generalized to
//! string router ids and to the `prefer_first_hop` tie-break below.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::algorithm::{Action, NeighborInfo, RoutingAlgorithm, UNKNOWN_NEIGHBOR};
use crate::model::packet::{Packet, BROADCAST, TYPE_HELLO, TYPE_INFO, TYPE_LSA};
use crate::model::seen_set::SeenSet;

#[derive(Debug, Clone, Copy)]
pub struct LsrTimers {
    pub hello_interval: f64,
    pub neighbor_timeout: f64,
    pub lsa_min_interval: f64,
    pub lsa_refresh_interval: f64,
    pub lsa_max_age: f64,
}

impl Default for LsrTimers {
    fn default() -> Self {
        Self {
            hello_interval: 5.0,
            neighbor_timeout: 20.0,
            lsa_min_interval: 8.0,
            lsa_refresh_interval: 30.0,
            lsa_max_age: 90.0,
        }
    }
}

const HELLO_TTL: i64 = 5;
const LSA_TTL: i64 = 16;
const DEFAULT_LSA_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct NeighborState {
    cost: u32,
    last_seen: f64,
    alive: bool,
}

#[derive(Debug, Clone)]
struct LsdbEntry {
    seq: i64,
    neighbors: BTreeMap<String, u32>,
    last_received: f64,
}

pub struct LsrStrategy {
    self_id: String,
    timers: LsrTimers,
    neighbor_states: BTreeMap<String, NeighborState>,
    link_state_db: BTreeMap<String, LsdbEntry>,
    area_routers: BTreeSet<String>,
    my_lsa_seq: i64,
    last_lsa_time: f64,
    last_hello_time: f64,
    topology_changed: bool,
    lsa_seen: SeenSet<(String, i64)>,
    routing_table: BTreeMap<String, String>,
}

impl LsrStrategy {
    pub fn new(self_id: impl Into<String>, timers: LsrTimers) -> Self {
        Self::with_lsa_capacity(self_id, timers, DEFAULT_LSA_CAPACITY)
    }

    pub fn with_lsa_capacity(self_id: impl Into<String>, timers: LsrTimers, lsa_capacity: usize) -> Self {
        let self_id = self_id.into();
        let mut area_routers = BTreeSet::new();
        area_routers.insert(self_id.clone());
        Self {
            self_id,
            timers,
            neighbor_states: BTreeMap::new(),
            link_state_db: BTreeMap::new(),
            area_routers,
            my_lsa_seq: 0,
            last_lsa_time: f64::NEG_INFINITY,
            last_hello_time: f64::NEG_INFINITY,
            topology_changed: true,
            lsa_seen: SeenSet::new(lsa_capacity),
            routing_table: BTreeMap::new(),
        }
    }

    pub fn routing_table(&self) -> &BTreeMap<String, String> {
        &self.routing_table
    }

    pub fn neighbor_ids(&self) -> Vec<String> {
        self.neighbor_states.keys().cloned().collect()
    }

    pub fn is_neighbor_alive(&self, id: &str) -> bool {
        self.neighbor_states.get(id).is_some_and(|n| n.alive)
    }

    fn handle_path(&self, pkt: &mut Packet) -> bool {
        let mut path = pkt.get_path();
        if path.iter().any(|hop| hop == &self.self_id) {
            return false;
        }
        if path.len() >= crate::model::packet::PATH_WINDOW {
            path.remove(0);
        }
        path.push(self.self_id.clone());
        pkt.set_path(path);
        true
    }

    fn build_adjacency(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
        let mut adj: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
        let mut add_edge = |adj: &mut BTreeMap<String, BTreeMap<String, u32>>, a: &str, b: &str, cost: u32| {
            adj.entry(a.to_string()).or_default();
            adj.entry(b.to_string()).or_default();
            let entry = adj.get_mut(a).unwrap().entry(b.to_string()).or_insert(cost);
            *entry = (*entry).min(cost);
            let entry = adj.get_mut(b).unwrap().entry(a.to_string()).or_insert(cost);
            *entry = (*entry).min(cost);
        };

        for (n, state) in &self.neighbor_states {
            if state.alive {
                add_edge(&mut adj, &self.self_id, n, state.cost);
            }
        }
        for (origin, entry) in &self.link_state_db {
            for (m, cost) in &entry.neighbors {
                add_edge(&mut adj, origin, m, *cost);
            }
        }
        adj.entry(self.self_id.clone()).or_default();
        adj
    }

    fn prefer_first_hop(&self, cand: &Option<String>, cur: &Option<String>) -> bool {
        let (cand, cur) = match (cand, cur) {
            (_, None) => return true,
            (None, Some(_)) => return false,
            (Some(cand), Some(cur)) => (cand, cur),
        };
        let cand_live = self.is_neighbor_alive(cand);
        let cur_live = self.is_neighbor_alive(cur);
        if cand_live && !cur_live {
            return true;
        }
        if cur_live && !cand_live {
            return false;
        }
        cand < cur
    }

    fn calculate_routes(&mut self) {
        let adj = self.build_adjacency();
        if !adj.contains_key(&self.self_id) {
            self.routing_table.clear();
            return;
        }

        let mut dist: BTreeMap<String, f64> = adj.keys().map(|k| (k.clone(), f64::INFINITY)).collect();
        let mut first: BTreeMap<String, Option<String>> = adj.keys().map(|k| (k.clone(), None)).collect();
        dist.insert(self.self_id.clone(), 0.0);

        let mut unvisited: BTreeSet<String> = adj.keys().cloned().collect();

        loop {
            let u = unvisited
                .iter()
                .filter(|id| dist[*id].is_finite())
                .min_by(|a, b| {
                    dist[*a]
                        .partial_cmp(&dist[*b])
                        .unwrap()
                        .then_with(|| a.cmp(b))
                })
                .cloned();
            let Some(u) = u else { break };
            unvisited.remove(&u);

            let mut neighbor_ids: Vec<&String> = adj[&u].keys().collect();
            neighbor_ids.sort();
            for v in neighbor_ids {
                let edge_cost = adj[&u][v];
                let alt = dist[&u] + edge_cost as f64;
                let cand_first = if u == self.self_id {
                    Some(v.clone())
                } else {
                    first[&u].clone()
                };

                if alt < dist[v] {
                    dist.insert(v.clone(), alt);
                    first.insert(v.clone(), cand_first);
                } else if alt == dist[v] && self.prefer_first_hop(&cand_first, &first[v]) {
                    first.insert(v.clone(), cand_first);
                }
            }
        }

        let mut table = BTreeMap::new();
        for dest in adj.keys() {
            if dest == &self.self_id {
                continue;
            }
            if !dist[dest].is_finite() {
                continue;
            }
            if let Some(hop) = &first[dest] {
                table.insert(dest.clone(), hop.clone());
            }
        }
        self.routing_table = table;
    }

    fn process_hello(&mut self, pkt: &Packet, from_neighbor: &str, now: f64) -> Action {
        let resolved: Option<String> = if from_neighbor != UNKNOWN_NEIGHBOR {
            Some(from_neighbor.to_string())
        } else if self.neighbor_states.contains_key(&pkt.from_addr) {
            Some(pkt.from_addr.clone())
        } else {
            None
        };

        if let Some(id) = resolved {
            let entry = self.neighbor_states.entry(id).or_insert(NeighborState {
                cost: 1,
                last_seen: now,
                alive: true,
            });
            entry.last_seen = now;
            entry.alive = true;
            self.topology_changed = true;
        }
        Action::None
    }

    fn process_info(&mut self, pkt: &mut Packet, now: f64) -> Action {
        if !self.handle_path(pkt) {
            return Action::None;
        }

        let Ok(payload) = serde_json::from_str::<Value>(&pkt.payload) else {
            return Action::None;
        };
        let Some(origin) = payload.get("origin").and_then(Value::as_str) else {
            return Action::None;
        };
        if origin != pkt.from_addr {
            return Action::None;
        }
        let Some(seq) = payload.get("seq").and_then(Value::as_i64) else {
            return Action::None;
        };

        if self.lsa_seen.contains(&(origin.to_string(), seq)) {
            return Action::None;
        }
        self.lsa_seen.insert((origin.to_string(), seq));

        if let Some(existing) = self.link_state_db.get(origin) {
            if existing.seq >= seq {
                return Action::None;
            }
        }

        let neighbors = normalize_neighbors(payload.get("neighbors"));
        self.area_routers.insert(origin.to_string());
        self.area_routers.insert(self.self_id.clone());
        for id in neighbors.keys() {
            self.area_routers.insert(id.clone());
        }

        self.link_state_db.insert(
            origin.to_string(),
            LsdbEntry {
                seq,
                neighbors,
                last_received: now,
            },
        );

        self.calculate_routes();
        Action::FloodLsa
    }
}

fn normalize_neighbors(raw: Option<&Value>) -> BTreeMap<String, u32> {
    let mut out = BTreeMap::new();
    let Some(obj) = raw.and_then(Value::as_object) else {
        return out;
    };
    for (id, cost) in obj {
        if let Some(cost) = cost.as_i64() {
            if cost > 0 {
                out.insert(id.clone(), cost as u32);
            }
        }
    }
    out
}

impl RoutingAlgorithm for LsrStrategy {
    fn get_name(&self) -> &'static str {
        "lsr"
    }

    fn update_neighbor(&mut self, id: &str, info: NeighborInfo, now: f64) {
        let entry = self.neighbor_states.entry(id.to_string()).or_insert(NeighborState {
            cost: 1,
            last_seen: now,
            alive: true,
        });
        entry.last_seen = now;
        entry.alive = true;
        entry.cost = info.cost.unwrap_or(1);
        self.topology_changed = true;
    }

    fn process_packet(&mut self, pkt: &mut Packet, from_neighbor: &str, now: f64) -> Action {
        if pkt.kind == TYPE_HELLO {
            return self.process_hello(pkt, from_neighbor, now);
        }
        if pkt.kind == TYPE_INFO || pkt.kind == TYPE_LSA {
            return self.process_info(pkt, now);
        }

        if pkt.to_addr == self.self_id {
            return Action::None;
        }
        match self.get_next_hop(&pkt.to_addr) {
            Some(next) => Action::Unicast(next),
            None => Action::None,
        }
    }

    fn should_send_hello(&self, now: f64) -> bool {
        now - self.last_hello_time >= self.timers.hello_interval
    }

    fn create_hello_packet(&mut self, now: f64) -> Option<Packet> {
        self.last_hello_time = now;
        let mut pkt = Packet::new("lsr", TYPE_HELLO, self.self_id.clone(), BROADCAST, HELLO_TTL);
        pkt.ensure_msg_id();
        pkt.set_ts(now);
        pkt.set_path(Vec::new());
        Some(pkt)
    }

    fn should_send_lsa(&self, now: f64) -> bool {
        let triggered = self.topology_changed && now - self.last_lsa_time >= self.timers.lsa_min_interval;
        let refresh = now - self.last_lsa_time >= self.timers.lsa_refresh_interval;
        triggered || refresh
    }

    fn create_lsa_packet(&mut self, now: f64) -> Option<Packet> {
        self.my_lsa_seq += 1;
        self.last_lsa_time = now;
        self.topology_changed = false;

        let neighs: BTreeMap<String, u32> = self
            .neighbor_states
            .iter()
            .filter(|(_, state)| state.alive && now - state.last_seen < self.timers.neighbor_timeout)
            .map(|(id, state)| (id.clone(), state.cost))
            .collect();

        self.link_state_db.insert(
            self.self_id.clone(),
            LsdbEntry {
                seq: self.my_lsa_seq,
                neighbors: neighs.clone(),
                last_received: now,
            },
        );
        self.lsa_seen.insert((self.self_id.clone(), self.my_lsa_seq));
        self.calculate_routes();

        let mut neighbors_json = Map::new();
        for (id, cost) in &neighs {
            neighbors_json.insert(id.clone(), json!(cost));
        }
        let payload = json!({
            "origin": self.self_id,
            "seq": self.my_lsa_seq,
            "neighbors": neighbors_json,
            "ts": now,
        });

        let mut pkt = Packet::new("lsr", TYPE_INFO, self.self_id.clone(), BROADCAST, LSA_TTL);
        pkt.ensure_msg_id();
        pkt.set_seq(self.my_lsa_seq);
        pkt.set_path(Vec::new());
        pkt.payload = payload.to_string();
        Some(pkt)
    }

    fn check_neighbor_timeouts(&mut self, now: f64) {
        let mut changed = false;
        for state in self.neighbor_states.values_mut() {
            let alive_now = now - state.last_seen < self.timers.neighbor_timeout;
            if alive_now != state.alive {
                state.alive = alive_now;
                changed = true;
            }
        }
        if changed {
            self.topology_changed = true;
            self.calculate_routes();
        }
    }

    fn age_lsa_database(&mut self, now: f64) {
        let before = self.link_state_db.len();
        self.link_state_db
            .retain(|_, entry| now - entry.last_received < self.timers.lsa_max_age);
        if self.link_state_db.len() != before {
            self.topology_changed = true;
            self.calculate_routes();
        }
    }

    fn get_next_hop(&self, dst: &str) -> Option<String> {
        if dst == self.self_id {
            return None;
        }
        self.routing_table.get(dst).cloned()
    }

    fn routes_snapshot(&self) -> BTreeMap<String, String> {
        self.routing_table.clone()
    }
}
