//! Service discovery over observed flows: who talks to well-known
//! ports, and how much.

use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analyzer::{mean, std_dev, AnalysisTask, TaskOutput, HOUR_MS};
use crate::error::Error;
use crate::store::{self, FlowRow};

const TCP_PORTS: &[(i64, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (161, "SNMP"),
    (443, "HTTPS"),
    (554, "RTSP"),
];
const UDP_PORTS: &[(i64, &str)] = &[(554, "RTSP")];

const IP_PROTO_TCP: i64 = 6;
const IP_PROTO_UDP: i64 = 17;

/// device → consumes/provides → tcp/udp → port → flow count
type UsageMap = BTreeMap<String, BTreeMap<&'static str, BTreeMap<&'static str, BTreeMap<String, i64>>>>;

fn add_count(
    devices: &mut UsageMap,
    device_id: &str,
    direction: &'static str,
    protocol: &'static str,
    port: i64,
    count: i64,
) {
    *devices
        .entry(device_id.to_string())
        .or_default()
        .entry(direction)
        .or_default()
        .entry(protocol)
        .or_default()
        .entry(port.to_string())
        .or_default() += count;
}

fn accumulate_for_protocol(
    devices: &mut UsageMap,
    known: &HashSet<String>,
    count: i64,
    flow: &FlowRow,
    ports: &[(i64, &str)],
    protocol_key: &'static str,
    protocol_number: i64,
) {
    if flow.network_protocol != protocol_number {
        return;
    }
    let source = format!("00:00:{}", flow.data_layer_source);
    let destination = format!("00:00:{}", flow.data_layer_destination);

    if ports.iter().any(|(p, _)| *p == flow.transport_source) {
        let port = flow.transport_source;
        if known.contains(&source) {
            add_count(devices, &source, "provides", protocol_key, port, count);
        }
        if known.contains(&destination) {
            add_count(devices, &destination, "consumes", protocol_key, port, count);
        }
    }
    if ports.iter().any(|(p, _)| *p == flow.transport_destination) {
        let port = flow.transport_destination;
        if known.contains(&source) {
            add_count(devices, &source, "consumes", protocol_key, port, count);
        }
        if known.contains(&destination) {
            add_count(devices, &destination, "provides", protocol_key, port, count);
        }
    }
}

pub struct SimpleServiceUsage;

impl AnalysisTask for SimpleServiceUsage {
    fn kind(&self) -> &'static str {
        "ServiceUsage"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - HOUR_MS;
        let known: HashSet<String> = store::nodes_all(conn)?
            .into_iter()
            .map(|n| n.device_id)
            .collect();
        let samples: BTreeSet<i64> = store::sample_timestamps_since(conn, window_start)?
            .into_iter()
            .collect();

        let mut stmt = conn.prepare(
            "SELECT flow_id, COUNT(*) FROM flow_sample WHERE sampled > ?1 GROUP BY flow_id",
        )?;
        let counts: Vec<(i64, i64)> = stmt
            .query_map(params![window_start], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut devices = UsageMap::new();
        for (flow_id, observations) in counts {
            let Some(flow) = store::flow_by_id(conn, flow_id)? else {
                continue;
            };
            // flows are typically observed once per direction
            let count = observations / 2;
            accumulate_for_protocol(
                &mut devices,
                &known,
                count,
                &flow,
                TCP_PORTS,
                "tcp",
                IP_PROTO_TCP,
            );
            accumulate_for_protocol(
                &mut devices,
                &known,
                count,
                &flow,
                UDP_PORTS,
                "udp",
                IP_PROTO_UDP,
            );
        }

        let port_names = |ports: &[(i64, &str)]| -> BTreeMap<String, String> {
            ports
                .iter()
                .map(|(port, name)| (port.to_string(), name.to_string()))
                .collect()
        };

        Ok(TaskOutput {
            content: json!({
                "tcp": port_names(TCP_PORTS),
                "udp": port_names(UDP_PORTS),
                "devices": devices,
            }),
            samples,
        })
    }
}

pub struct ServiceStatistics;

const KNOWN_PORTS: &[i64] = &[21, 22, 23, 25, 53, 80, 110, 143, 161, 443, 554];

/// Per-direction statistics for one provider, evaluated over the flows
/// the attachment switch owns. `None` when the window holds no data.
fn direction_statistics(
    conn: &Connection,
    flows: &[&FlowRow],
    attachment_id: i64,
    window_start: i64,
    expected: &BTreeSet<i64>,
) -> Result<Option<Value>, Error> {
    // per sampling instant: summed bytes, summed duration, flow count
    let mut per_stamp: BTreeMap<i64, (f64, f64, i64)> = BTreeMap::new();
    for flow in flows.iter().filter(|f| f.node_id == attachment_id) {
        let mut stmt = conn.prepare(
            "SELECT sampled, COALESCE(byte_count, 0), COALESCE(duration_seconds, 0)
             FROM flow_sample WHERE flow_id = ?1 AND sampled > ?2 ORDER BY sampled",
        )?;
        let rows: Vec<(i64, i64, i64)> = stmt
            .query_map(params![flow.id, window_start], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (sampled, bytes, duration) in rows {
            let entry = per_stamp.entry(sampled).or_insert((0.0, 0.0, 0));
            entry.0 += bytes as f64;
            entry.1 += duration as f64;
            entry.2 += 1;
        }
    }
    if per_stamp.is_empty() {
        return Ok(None);
    }

    let stamps: Vec<i64> = per_stamp.keys().copied().collect();
    let bytes: Vec<f64> = per_stamp.values().map(|v| v.0).collect();
    let durations: Vec<f64> = per_stamp.values().map(|v| v.1).collect();
    let counts: Vec<f64> = per_stamp.values().map(|v| v.2 as f64).collect();

    // data rate between successive instants; only growing byte counts
    // yield a valid rate
    let mut rates = Vec::new();
    for i in 1..stamps.len() {
        let delta_bytes = bytes[i] - bytes[i - 1];
        let delta_seconds = (stamps[i] - stamps[i - 1]) as f64 / 1000.0;
        if delta_bytes > 0.0 && delta_seconds > 0.0 {
            rates.push(delta_bytes / delta_seconds * 8.0);
        }
    }

    let observed = stamps.iter().filter(|s| expected.contains(s)).count();
    Ok(Some(json!({
        "rate_avg": mean(&rates),
        "rate_std": std_dev(&rates),
        "count_avg": mean(&counts),
        "count_std": std_dev(&counts),
        "duration_avg": mean(&durations),
        "duration_std": std_dev(&durations),
        "activity_actual": observed as f64,
        "activity_max": expected.len() as f64,
    })))
}

impl AnalysisTask for ServiceStatistics {
    fn kind(&self) -> &'static str {
        "ServiceStatistics"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - HOUR_MS;
        let expected: BTreeSet<i64> = store::sample_timestamps_since(conn, window_start)?
            .into_iter()
            .collect();
        let flows = store::flows_sampled_since(conn, window_start)?;

        // the lower transport port identifies the provider side
        let mut providers: BTreeMap<(String, String, i64, i64), (Vec<usize>, Vec<usize>)> =
            BTreeMap::new();
        for (index, flow) in flows.iter().enumerate() {
            let is_consume = flow.transport_destination < flow.transport_source;
            let (mac, ip, port) = if is_consume {
                (
                    &flow.data_layer_destination,
                    &flow.network_destination,
                    flow.transport_destination,
                )
            } else {
                (
                    &flow.data_layer_source,
                    &flow.network_source,
                    flow.transport_source,
                )
            };
            if !KNOWN_PORTS.contains(&port) {
                continue;
            }
            let entry = providers
                .entry((mac.clone(), ip.clone(), flow.network_protocol, port))
                .or_default();
            if is_consume {
                entry.0.push(index);
            } else {
                entry.1.push(index);
            }
        }

        let mut content = Vec::new();
        for ((mac, ip, protocol, port), (consume_idx, provide_idx)) in &providers {
            let device_id = format!("00:00:{mac}");
            let Some(node) = store::node_by_device_id(conn, &device_id)? else {
                continue;
            };
            let Some(link) = store::first_link_touching(conn, node.id)? else {
                continue;
            };
            let attachment_id = if link.src_type != "host" {
                link.src_id
            } else {
                link.dst_id
            };

            let consume_flows: Vec<&FlowRow> = consume_idx.iter().map(|i| &flows[*i]).collect();
            let provide_flows: Vec<&FlowRow> = provide_idx.iter().map(|i| &flows[*i]).collect();
            let consume =
                direction_statistics(conn, &consume_flows, attachment_id, window_start, &expected)?;
            let provide =
                direction_statistics(conn, &provide_flows, attachment_id, window_start, &expected)?;
            if consume.is_none() && provide.is_none() {
                tracing::debug!("provider {device_id}:{port} has no flow entries in the window");
                continue;
            }

            let mut entry = json!({
                "device_id": device_id,
                "mac": mac,
                "ip": ip,
                "protocol": protocol,
                "port": port,
            });
            if let Some(consume) = consume {
                entry["consume"] = consume;
            }
            if let Some(provide) = provide {
                entry["provide"] = provide;
            }
            content.push(entry);
        }

        content.sort_by_key(|entry| {
            format!(
                "{}{}",
                entry["device_id"].as_str().unwrap_or_default(),
                entry["protocol"]
            )
        });

        Ok(TaskOutput {
            content: Value::Array(content),
            samples: expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FlowMatch;
    use crate::store::open_test_store;

    const SWITCH: &str = "00:00:00:00:00:00:00:01";
    const MAC_A: &str = "aa:aa:aa:aa:aa:01";
    const MAC_B: &str = "bb:bb:bb:bb:bb:02";

    fn seed_flow(
        conn: &Connection,
        owner: i64,
        src_mac: &str,
        dst_mac: &str,
        tp_src: i64,
        tp_dst: i64,
    ) -> i64 {
        let matched = FlowMatch {
            dl_src: src_mac.to_string(),
            dl_dst: dst_mac.to_string(),
            dl_type: Some(2048),
            nw_src: "10.0.0.1".to_string(),
            nw_dst: "10.0.0.2".to_string(),
            nw_proto: IP_PROTO_TCP,
            tp_src,
            tp_dst,
            ..FlowMatch::default()
        };
        store::find_or_create_flow(conn, 0, owner, 1, &matched).unwrap()
    }

    fn seed_flow_sample(conn: &Connection, flow_id: i64, sampled: i64, bytes: i64) {
        conn.execute(
            "INSERT INTO flow_sample (sampled, packet_count, byte_count, duration_seconds,
                 priority, idle_timeout_sec, hard_timeout_sec, flow_id)
             VALUES (?1, 10, ?2, 3, 1, 5, 0, ?3)",
            params![sampled, bytes, flow_id],
        )
        .unwrap();
    }

    #[test]
    fn usage_splits_consumers_and_providers() {
        let conn = open_test_store();
        let now = HOUR_MS + 1_000_000;
        let t1 = now - 40_000;
        let t2 = now - 10_000;

        let switch = store::find_or_create_node(&conn, 0, SWITCH, "switch").unwrap();
        store::find_or_create_node(&conn, 0, &format!("00:00:{MAC_A}"), "host").unwrap();
        store::find_or_create_node(&conn, 0, &format!("00:00:{MAC_B}"), "host").unwrap();
        store::insert_sample_timestamp(&conn, t1, Some(30.0)).unwrap();
        store::insert_sample_timestamp(&conn, t2, Some(30.0)).unwrap();

        // A consumes HTTP from B
        let flow = seed_flow(&conn, switch.id, MAC_A, MAC_B, 49152, 80);
        seed_flow_sample(&conn, flow, t1, 1000);
        seed_flow_sample(&conn, flow, t2, 3000);

        let output = SimpleServiceUsage.analyze(&conn, now).unwrap();
        let devices = &output.content["devices"];

        assert_eq!(
            devices[format!("00:00:{MAC_A}")]["consumes"]["tcp"]["80"],
            1
        );
        assert_eq!(
            devices[format!("00:00:{MAC_B}")]["provides"]["tcp"]["80"],
            1
        );
        assert_eq!(output.samples.len(), 2);
        // the port catalogues ride along in the report
        assert_eq!(output.content["tcp"]["80"], "HTTP");
        assert_eq!(output.content["udp"]["554"], "RTSP");
    }

    #[test]
    fn usage_ignores_unknown_devices_and_ports() {
        let conn = open_test_store();
        let now = HOUR_MS + 1_000_000;
        let switch = store::find_or_create_node(&conn, 0, SWITCH, "switch").unwrap();

        // neither endpoint is a known node
        let flow = seed_flow(&conn, switch.id, "ff:ff:ff:ff:ff:01", "ff:ff:ff:ff:ff:02", 1234, 80);
        seed_flow_sample(&conn, flow, now - 10_000, 100);
        // known endpoints but an unlisted port
        store::find_or_create_node(&conn, 0, &format!("00:00:{MAC_A}"), "host").unwrap();
        let flow = seed_flow(&conn, switch.id, MAC_A, "ff:ff:ff:ff:ff:02", 40000, 9999);
        seed_flow_sample(&conn, flow, now - 10_000, 100);

        let output = SimpleServiceUsage.analyze(&conn, now).unwrap();
        assert!(output.content["devices"].as_object().unwrap().is_empty());
    }

    #[test]
    fn statistics_identify_provider_by_lower_port() {
        let conn = open_test_store();
        let now = HOUR_MS + 1_000_000;
        let t1 = now - 20_000;
        let t2 = now - 10_000;

        let switch = store::find_or_create_node(&conn, 0, SWITCH, "switch").unwrap();
        let provider = store::find_or_create_node(&conn, 0, &format!("00:00:{MAC_B}"), "host")
            .unwrap();
        conn.execute(
            "INSERT INTO link (created, last_seen, src_id, src_port, dst_id, dst_port)
             VALUES (0, 0, ?1, 1, ?2, 2)",
            params![provider.id, switch.id],
        )
        .unwrap();
        store::insert_sample_timestamp(&conn, t1, Some(30.0)).unwrap();
        store::insert_sample_timestamp(&conn, t2, Some(30.0)).unwrap();

        // tp_dst 80 < tp_src: the destination provides, the flow is a consume
        let flow = seed_flow(&conn, switch.id, MAC_A, MAC_B, 49152, 80);
        seed_flow_sample(&conn, flow, t1, 1000);
        seed_flow_sample(&conn, flow, t2, 3000);

        let output = ServiceStatistics.analyze(&conn, now).unwrap();
        let entries = output.content.as_array().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry["device_id"], format!("00:00:{MAC_B}"));
        assert_eq!(entry["port"], 80);
        assert_eq!(entry["protocol"], IP_PROTO_TCP);
        assert!(entry.get("provide").is_none());

        let consume = &entry["consume"];
        // 2000 bytes over 10 seconds
        assert_eq!(consume["rate_avg"], 1600.0);
        assert_eq!(consume["count_avg"], 1.0);
        assert_eq!(consume["activity_actual"], 2.0);
        assert_eq!(consume["activity_max"], 2.0);
    }

    #[test]
    fn statistics_skip_providers_without_window_data() {
        let conn = open_test_store();
        let now = HOUR_MS + 1_000_000;

        let switch = store::find_or_create_node(&conn, 0, SWITCH, "switch").unwrap();
        let provider = store::find_or_create_node(&conn, 0, &format!("00:00:{MAC_B}"), "host")
            .unwrap();
        conn.execute(
            "INSERT INTO link (created, last_seen, src_id, src_port, dst_id, dst_port)
             VALUES (0, 0, ?1, 1, ?2, 2)",
            params![provider.id, switch.id],
        )
        .unwrap();

        // the flow is owned by the provider host, not the attachment
        // switch, so no data aggregates there
        let flow = seed_flow(&conn, provider.id, MAC_A, MAC_B, 49152, 80);
        seed_flow_sample(&conn, flow, now - 10_000, 1000);

        let output = ServiceStatistics.analyze(&conn, now).unwrap();
        assert!(output.content.as_array().unwrap().is_empty());
    }
}
