//! Wire types for the controller's REST API.
//!
//! The controller emits numbers and numeric strings interchangeably
//! (port numbers can even be the literal string "local"), so the scalar
//! fields tolerate both forms and the sensors skip what does not parse.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A JSON scalar that may arrive as a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumOrStr {
    Num(serde_json::Number),
    Str(String),
}

impl NumOrStr {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumOrStr::Num(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            NumOrStr::Str(s) => s.trim().parse::<i64>().ok(),
        }
    }
}

/// A counter that defaults to zero when absent or malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count(pub i64);

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = NumOrStr::deserialize(deserializer)?;
        Ok(Count(value.as_i64().unwrap_or(0)))
    }
}

/// `core/controller/switches/json` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchEntry {
    #[serde(rename = "switchDPID")]
    pub switch_dpid: String,
    #[serde(rename = "connectedSince")]
    pub connected_since: Option<NumOrStr>,
}

/// `device/` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub mac: Vec<String>,
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(rename = "attachmentPoint", default)]
    pub attachment_point: Vec<AttachmentPoint>,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<NumOrStr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPoint {
    #[serde(rename = "switchDPID")]
    pub switch_dpid: String,
    pub port: NumOrStr,
}

/// `core/switch/all/features/json` value.
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesEntry {
    #[serde(rename = "portDesc")]
    pub port_desc: Option<Vec<PortDesc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortDesc {
    #[serde(rename = "portNumber")]
    pub port_number: NumOrStr,
    #[serde(rename = "hardwareAddress", default)]
    pub hardware_address: String,
    #[serde(default)]
    pub name: String,
}

/// `core/switch/all/port/json` value.
#[derive(Debug, Clone, Deserialize)]
pub struct PortStatsEntry {
    pub port: Option<Vec<PortCounters>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortCounters {
    #[serde(rename = "portNumber")]
    pub port_number: NumOrStr,
    #[serde(rename = "receivePackets", default)]
    pub receive_packets: Count,
    #[serde(rename = "transmitPackets", default)]
    pub transmit_packets: Count,
    #[serde(rename = "receiveBytes", default)]
    pub receive_bytes: Count,
    #[serde(rename = "transmitBytes", default)]
    pub transmit_bytes: Count,
    #[serde(rename = "receiveDropped", default)]
    pub receive_dropped: Count,
    #[serde(rename = "transmitDropped", default)]
    pub transmit_dropped: Count,
    #[serde(rename = "receiveErrors", default)]
    pub receive_errors: Count,
    #[serde(rename = "transmitErrors", default)]
    pub transmit_errors: Count,
    #[serde(rename = "receiveFrameErrors", default)]
    pub receive_frame_errors: Count,
    #[serde(rename = "receiveOverrunErrors", default)]
    pub receive_overrun_errors: Count,
    #[serde(rename = "receiveCRCErrors", default)]
    pub receive_crc_errors: Count,
    #[serde(default)]
    pub collisions: Count,
}

/// `topology/links/json` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkEntry {
    #[serde(rename = "src-switch")]
    pub src_switch: String,
    #[serde(rename = "src-port")]
    pub src_port: NumOrStr,
    #[serde(rename = "dst-switch")]
    pub dst_switch: String,
    #[serde(rename = "dst-port")]
    pub dst_port: NumOrStr,
    #[serde(rename = "type", default)]
    pub link_type: String,
    #[serde(default)]
    pub direction: String,
}

/// `core/switch/all/flow/json` value.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowsEntry {
    pub flows: Option<Vec<FlowEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowEntry {
    #[serde(default)]
    pub cookie: Count,
    #[serde(default)]
    pub priority: Count,
    #[serde(rename = "idleTimeoutSec", default)]
    pub idle_timeout_sec: Count,
    #[serde(rename = "hardTimeoutSec", default)]
    pub hard_timeout_sec: Count,
    #[serde(rename = "packetCount", default)]
    pub packet_count: Count,
    #[serde(rename = "byteCount", default)]
    pub byte_count: Count,
    #[serde(rename = "durationSeconds", default)]
    pub duration_seconds: Count,
    #[serde(rename = "match", default)]
    pub match_fields: serde_json::Map<String, Value>,
}

/// `uds/delay/json` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DelayEntry {
    #[serde(default)]
    pub inconsistency: bool,
    #[serde(rename = "fullDelay", default)]
    pub full_delay: f64,
    #[serde(rename = "srcCtrlDelay")]
    pub src_ctrl_delay: Option<f64>,
    #[serde(rename = "dstCtrlDelay")]
    pub dst_ctrl_delay: Option<f64>,
    #[serde(rename = "srcDpid", default)]
    pub src_dpid: String,
    #[serde(rename = "srcPort")]
    pub src_port: Option<NumOrStr>,
    #[serde(rename = "dstDpid", default)]
    pub dst_dpid: String,
    #[serde(rename = "dstPort")]
    pub dst_port: Option<NumOrStr>,
}

pub const ETH_TYPE_ARP: i64 = 2054;

/// A flow's normalized match tuple. Together with the owning node and
/// the cookie it is the flow's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMatch {
    pub dl_dst: String,
    pub dl_src: String,
    pub dl_type: Option<i64>,
    pub dl_vlan: i64,
    pub dl_vlan_pcp: i64,
    pub in_port: i64,
    pub nw_dst: String,
    pub nw_dst_mask_len: i64,
    pub nw_proto: i64,
    pub nw_src: String,
    pub nw_src_mask_len: i64,
    pub nw_tos: i64,
    pub tp_dst: i64,
    pub tp_src: i64,
    pub wildcards: i64,
}

impl Default for FlowMatch {
    fn default() -> Self {
        Self {
            dl_dst: String::new(),
            dl_src: String::new(),
            dl_type: None,
            dl_vlan: -1,
            dl_vlan_pcp: 0,
            in_port: 0,
            nw_dst: String::new(),
            nw_dst_mask_len: 0,
            nw_proto: 0,
            nw_src: String::new(),
            nw_src_mask_len: 24,
            nw_tos: 0,
            tp_dst: 0,
            tp_src: 0,
            wildcards: 0,
        }
    }
}

fn field_i64(fields: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn field_str(fields: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FlowMatch {
    /// Normalize a raw controller match map. ARP flows carry their
    /// addresses in arp_spa/arp_tpa, IP flows in ipv4_src/ipv4_dst with
    /// transport ports when both ends are present. `in_port` "any"
    /// collapses to 0.
    pub fn from_wire(fields: &serde_json::Map<String, Value>) -> Self {
        let dl_type = field_i64(fields, "eth_type");

        let mut m = FlowMatch {
            dl_dst: field_str(fields, "eth_dst").unwrap_or_default(),
            dl_src: field_str(fields, "eth_src").unwrap_or_default(),
            dl_type,
            dl_vlan: field_i64(fields, "eth_vlan_vid").unwrap_or(-1),
            in_port: field_i64(fields, "in_port").unwrap_or(0),
            nw_proto: field_i64(fields, "ip_proto").unwrap_or(0),
            nw_tos: field_i64(fields, "ip_dscp").unwrap_or(0),
            ..FlowMatch::default()
        };

        if matches!(fields.get("in_port"), Some(Value::String(s)) if s == "any") {
            m.in_port = 0;
        }

        if dl_type == Some(ETH_TYPE_ARP) {
            m.nw_src = field_str(fields, "arp_spa").unwrap_or_default();
            m.nw_dst = field_str(fields, "arp_tpa").unwrap_or_default();
        } else {
            m.nw_src = field_str(fields, "ipv4_src").unwrap_or_default();
            m.nw_dst = field_str(fields, "ipv4_dst").unwrap_or_default();

            if let (Some(src), Some(dst)) = (
                field_i64(fields, "tcp_src"),
                field_i64(fields, "tcp_dst"),
            ) {
                m.tp_src = src;
                m.tp_dst = dst;
            }
            if let (Some(src), Some(dst)) = (
                field_i64(fields, "udp_src"),
                field_i64(fields, "udp_dst"),
            ) {
                m.tp_src = src;
                m.tp_dst = dst;
            }
        }

        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn num_or_str_accepts_both_forms() {
        let n: NumOrStr = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(n.as_i64(), Some(42));
        let s: NumOrStr = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(s.as_i64(), Some(42));
        let local: NumOrStr = serde_json::from_value(json!("local")).unwrap();
        assert_eq!(local.as_i64(), None);
    }

    #[test]
    fn flow_match_defaults_when_fields_absent() {
        let m = FlowMatch::from_wire(&map(json!({})));
        assert_eq!(m.dl_type, None);
        assert_eq!(m.dl_vlan, -1);
        assert_eq!(m.in_port, 0);
        assert_eq!(m.nw_proto, 0);
        assert_eq!(m.nw_src_mask_len, 24);
        assert_eq!(m.nw_dst_mask_len, 0);
        assert_eq!(m.tp_src, 0);
        assert_eq!(m.tp_dst, 0);
        assert_eq!(m.wildcards, 0);
    }

    #[test]
    fn flow_match_arp_uses_arp_addresses() {
        let m = FlowMatch::from_wire(&map(json!({
            "eth_type": "2054",
            "arp_spa": "10.0.0.1",
            "arp_tpa": "10.0.0.2",
            "tcp_src": "1234",
            "tcp_dst": "80"
        })));
        assert_eq!(m.dl_type, Some(ETH_TYPE_ARP));
        assert_eq!(m.nw_src, "10.0.0.1");
        assert_eq!(m.nw_dst, "10.0.0.2");
        // transport ports stay at their defaults for ARP
        assert_eq!(m.tp_src, 0);
        assert_eq!(m.tp_dst, 0);
    }

    #[test]
    fn flow_match_ip_reads_transport_ports() {
        let m = FlowMatch::from_wire(&map(json!({
            "eth_type": "2048",
            "ipv4_src": "10.0.0.1",
            "ipv4_dst": "10.0.0.2",
            "ip_proto": "6",
            "tcp_src": "49152",
            "tcp_dst": "80",
            "in_port": "any"
        })));
        assert_eq!(m.dl_type, Some(2048));
        assert_eq!(m.nw_src, "10.0.0.1");
        assert_eq!(m.nw_proto, 6);
        assert_eq!(m.tp_src, 49152);
        assert_eq!(m.tp_dst, 80);
        assert_eq!(m.in_port, 0);
    }

    #[test]
    fn port_counters_decode_mixed_forms() {
        let counters: PortCounters = serde_json::from_value(json!({
            "portNumber": "1",
            "receivePackets": 10,
            "transmitPackets": "20",
            "receiveBytes": 1000,
            "transmitBytes": "2000"
        }))
        .unwrap();
        assert_eq!(counters.port_number.as_i64(), Some(1));
        assert_eq!(counters.receive_packets.0, 10);
        assert_eq!(counters.transmit_packets.0, 20);
        assert_eq!(counters.transmit_bytes.0, 2000);
        assert_eq!(counters.collisions.0, 0);
    }
}
