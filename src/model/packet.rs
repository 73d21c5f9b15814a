//! Wire-format control packet and its codec (spec.md §4.1).
//!
//! The wire encoding is a single JSON object. `ttl` is a number, `path` is
//! an array of at most 3 strings, and unrecognized top-level keys are
//! preserved verbatim so they survive a forward even though this node does
//! not interpret them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RouteError;

pub const TYPE_HELLO: &str = "hello";
pub const TYPE_INFO: &str = "info";
pub const TYPE_LSA: &str = "lsa";
pub const TYPE_MESSAGE: &str = "message";
pub const TYPE_ECHO: &str = "echo";
pub const TYPE_ECHO_REPLY: &str = "echo_reply";
pub const BROADCAST: &str = "broadcast";

const HEADER_MSG_ID: &str = "msg_id";
const HEADER_SEQ: &str = "seq";
const HEADER_TS: &str = "ts";
const HEADER_PATH: &str = "path";

/// Maximum forwarders recorded in a packet's path window (spec.md §3).
pub const PATH_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub proto: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "from")]
    pub from_addr: String,
    #[serde(rename = "to")]
    pub to_addr: String,
    pub ttl: i64,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub payload: String,
    /// Top-level keys this implementation doesn't recognize. Ignored for
    /// decision-making, but re-serialized so a forwarded packet doesn't
    /// silently drop fields another implementation put there.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Packet {
    pub fn new(
        proto: impl Into<String>,
        kind: impl Into<String>,
        from_addr: impl Into<String>,
        to_addr: impl Into<String>,
        ttl: i64,
    ) -> Self {
        Self {
            proto: proto.into(),
            kind: kind.into(),
            from_addr: from_addr.into(),
            to_addr: to_addr.into(),
            ttl,
            headers: BTreeMap::new(),
            payload: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn is_info_or_lsa(&self) -> bool {
        self.kind == TYPE_INFO || self.kind == TYPE_LSA
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_addr == BROADCAST
    }

    pub fn msg_id(&self) -> Option<&str> {
        self.headers.get(HEADER_MSG_ID).and_then(Value::as_str)
    }

    pub fn set_msg_id(&mut self, msg_id: impl Into<String>) {
        self.headers
            .insert(HEADER_MSG_ID.to_string(), Value::String(msg_id.into()));
    }

    /// Assigns a fresh id if `headers.msg_id` is missing or empty; returns
    /// the (possibly freshly assigned) id.
    pub fn ensure_msg_id(&mut self) -> &str {
        let needs_fresh = self.msg_id().map_or(true, str::is_empty);
        if needs_fresh {
            self.set_msg_id(Uuid::new_v4().to_string());
        }
        self.msg_id().expect("msg_id was just set")
    }

    pub fn seq(&self) -> Option<i64> {
        self.headers.get(HEADER_SEQ).and_then(Value::as_i64)
    }

    pub fn set_seq(&mut self, seq: i64) {
        self.headers.insert(HEADER_SEQ.to_string(), Value::from(seq));
    }

    pub fn ts(&self) -> Option<f64> {
        self.headers.get(HEADER_TS).and_then(Value::as_f64)
    }

    pub fn set_ts(&mut self, ts: f64) {
        self.headers.insert(HEADER_TS.to_string(), Value::from(ts));
    }

    pub fn get_path(&self) -> Vec<String> {
        self.headers
            .get(HEADER_PATH)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_path(&mut self, path: Vec<String>) {
        let value = Value::Array(path.into_iter().map(Value::String).collect());
        self.headers.insert(HEADER_PATH.to_string(), value);
    }

    pub fn decrement_ttl(&mut self) {
        self.ttl -= 1;
    }

    pub fn encode(&self) -> Result<Vec<u8>, RouteError> {
        serde_json::to_vec(self).map_err(|err| RouteError::MalformedPacket(err.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RouteError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| RouteError::MalformedPacket(err.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| RouteError::MalformedPacket("top-level value is not an object".into()))?;

        for field in ["proto", "type", "from", "to", "ttl"] {
            if !obj.contains_key(field) {
                return Err(RouteError::MalformedPacket(format!("missing field {field}")));
            }
        }
        for field in ["proto", "type", "from", "to"] {
            if !obj[field].is_string() {
                return Err(RouteError::MalformedPacket(format!(
                    "field {field} must be a string"
                )));
            }
        }
        if !obj["ttl"].is_i64() && !obj["ttl"].is_u64() {
            return Err(RouteError::MalformedPacket("field ttl must be an integer".into()));
        }

        let packet: Packet = serde_json::from_value(value)
            .map_err(|err| RouteError::MalformedPacket(err.to_string()))?;
        if packet.ttl < 0 {
            return Err(RouteError::MalformedPacket("ttl must be >= 0".into()));
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut pkt = Packet::new("lsr", TYPE_HELLO, "A", BROADCAST, 5);
        pkt.set_msg_id("abc-123");
        pkt.set_ts(10.5);
        pkt.set_path(vec!["A".to_string(), "B".to_string()]);

        let bytes = pkt.encode().expect("encode");
        let decoded = Packet::decode(&bytes).expect("decode");
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn ensure_msg_id_assigns_once() {
        let mut pkt = Packet::new("flooding", TYPE_MESSAGE, "A", "D", 5);
        assert!(pkt.msg_id().is_none());
        let first = pkt.ensure_msg_id().to_string();
        assert!(!first.is_empty());
        let second = pkt.ensure_msg_id().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn decode_rejects_missing_required_field() {
        let raw = serde_json::json!({
            "proto": "lsr",
            "type": "hello",
            "from": "A",
            "ttl": 5,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        let err = Packet::decode(&bytes).unwrap_err();
        assert!(matches!(err, RouteError::MalformedPacket(_)));
    }

    #[test]
    fn decode_rejects_negative_ttl() {
        let raw = serde_json::json!({
            "proto": "lsr",
            "type": "hello",
            "from": "A",
            "to": "broadcast",
            "ttl": -1,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        let err = Packet::decode(&bytes).unwrap_err();
        assert!(matches!(err, RouteError::MalformedPacket(_)));
    }

    #[test]
    fn path_window_is_truncated_by_caller_not_packet() {
        let mut pkt = Packet::new("lsr", TYPE_INFO, "A", BROADCAST, 16);
        pkt.set_path(vec!["A".into(), "B".into(), "C".into()]);
        assert_eq!(pkt.get_path(), vec!["A", "B", "C"]);
    }

    #[test]
    fn unknown_top_level_keys_survive_roundtrip() {
        let raw = serde_json::json!({
            "proto": "lsr",
            "type": "hello",
            "from": "A",
            "to": "broadcast",
            "ttl": 5,
            "headers": {},
            "payload": "",
            "future_field": "kept",
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(
            decoded.extra.get("future_field").and_then(Value::as_str),
            Some("kept")
        );
        let re_encoded = decoded.encode().unwrap();
        let value: Value = serde_json::from_slice(&re_encoded).unwrap();
        assert_eq!(value.get("future_field").and_then(Value::as_str), Some("kept"));
    }
}
