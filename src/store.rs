//! Row types and shared store queries.
//!
//! Modules that own a data flow keep their SQL inline; the helpers here
//! are the ones used from more than one place (node/port/flow
//! find-or-create, link lookups for the analysis tasks, report inserts).

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::protocol::FlowMatch;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// ISO-8601 rendering of a Unix-millisecond timestamp, used in report
/// bodies and the admin endpoint.
pub fn iso(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: i64,
    pub device_id: String,
    pub node_type: String,
}

fn map_node(row: &Row) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        device_id: row.get(1)?,
        node_type: row.get(2)?,
    })
}

pub fn node_by_device_id(conn: &Connection, device_id: &str) -> Result<Option<Node>, Error> {
    Ok(conn
        .query_row(
            "SELECT id, device_id, type FROM node WHERE device_id = ?1",
            params![device_id],
            map_node,
        )
        .optional()?)
}

pub fn nodes_all(conn: &Connection) -> Result<Vec<Node>, Error> {
    let mut stmt = conn.prepare("SELECT id, device_id, type FROM node ORDER BY id")?;
    let nodes = stmt
        .query_map([], map_node)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

pub fn nodes_by_type(conn: &Connection, node_type: &str) -> Result<Vec<Node>, Error> {
    let mut stmt =
        conn.prepare("SELECT id, device_id, type FROM node WHERE type = ?1 ORDER BY id")?;
    let nodes = stmt
        .query_map(params![node_type], map_node)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// Nodes are created on first sighting and never deleted.
pub fn find_or_create_node(
    conn: &Connection,
    now: i64,
    device_id: &str,
    node_type: &str,
) -> Result<Node, Error> {
    if let Some(node) = node_by_device_id(conn, device_id)? {
        return Ok(node);
    }
    conn.execute(
        "INSERT INTO node (device_id, created, last_seen, type) VALUES (?1, ?2, ?2, ?3)",
        params![device_id, now, node_type],
    )?;
    Ok(Node {
        id: conn.last_insert_rowid(),
        device_id: device_id.to_string(),
        node_type: node_type.to_string(),
    })
}

pub fn insert_node_sample(conn: &Connection, node_id: i64, sampled: i64) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO node_sample (sampled, node_id) VALUES (?1, ?2)",
        params![sampled, node_id],
    )?;
    Ok(())
}

pub fn node_sample_exists(conn: &Connection, node_id: i64, sampled: i64) -> Result<bool, Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM node_sample WHERE node_id = ?1 AND sampled = ?2",
        params![node_id, sampled],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Associate an IPv4 address with a node, creating the address row on
/// first sighting.
pub fn associate_address(
    conn: &Connection,
    now: i64,
    node_id: i64,
    address: &str,
) -> Result<(), Error> {
    let address_id: i64 = match conn
        .query_row(
            "SELECT id FROM internet_address WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )
        .optional()?
    {
        Some(id) => id,
        None => {
            conn.execute(
                "INSERT INTO internet_address (created, address) VALUES (?1, ?2)",
                params![now, address],
            )?;
            conn.last_insert_rowid()
        }
    };

    let associated: i64 = conn.query_row(
        "SELECT COUNT(*) FROM internet_address_association WHERE node_id = ?1 AND address_id = ?2",
        params![node_id, address_id],
        |row| row.get(0),
    )?;
    if associated == 0 {
        conn.execute(
            "INSERT INTO internet_address_association (node_id, address_id) VALUES (?1, ?2)",
            params![node_id, address_id],
        )?;
    }
    Ok(())
}

pub fn insert_sample_timestamp(
    conn: &Connection,
    timestamp: i64,
    interval: Option<f64>,
) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO sample_timestamp (timestamp, interval) VALUES (?1, ?2)",
        params![timestamp, interval],
    )?;
    Ok(())
}

pub fn sample_timestamps_since(conn: &Connection, start: i64) -> Result<Vec<i64>, Error> {
    let mut stmt = conn
        .prepare("SELECT timestamp FROM sample_timestamp WHERE timestamp > ?1 ORDER BY timestamp")?;
    let timestamps = stmt
        .query_map(params![start], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(timestamps)
}

/// Distinct poll intervals of the sample timestamps in `samples`.
pub fn sample_intervals_for(
    conn: &Connection,
    samples: &BTreeSet<i64>,
) -> Result<Vec<f64>, Error> {
    let (Some(&start), Some(&stop)) = (samples.first(), samples.last()) else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT timestamp, interval FROM sample_timestamp WHERE timestamp BETWEEN ?1 AND ?2",
    )?;
    let rows = stmt
        .query_map(params![start, stop], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut intervals: Vec<f64> = Vec::new();
    for (timestamp, interval) in rows {
        if let (true, Some(interval)) = (samples.contains(&timestamp), interval) {
            if !intervals.iter().any(|i| i.to_bits() == interval.to_bits()) {
                intervals.push(interval);
            }
        }
    }
    Ok(intervals)
}

/// A link joined with both endpoint nodes, as the analysis tasks need it.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub id: i64,
    pub src_id: i64,
    pub src_port: i64,
    pub dst_id: i64,
    pub dst_port: i64,
    pub src_device: String,
    pub dst_device: String,
    pub src_type: String,
    pub dst_type: String,
}

impl LinkInfo {
    /// Stable report identifier: canonical endpoint order makes this
    /// independent of the direction a link was observed in.
    pub fn ident(&self) -> String {
        format!(
            "{}-{}.{}-{}",
            self.src_device, self.src_port, self.dst_device, self.dst_port
        )
    }
}

fn map_link_info(row: &Row) -> rusqlite::Result<LinkInfo> {
    Ok(LinkInfo {
        id: row.get(0)?,
        src_id: row.get(1)?,
        src_port: row.get(2)?,
        dst_id: row.get(3)?,
        dst_port: row.get(4)?,
        src_device: row.get(5)?,
        dst_device: row.get(6)?,
        src_type: row.get(7)?,
        dst_type: row.get(8)?,
    })
}

const LINK_INFO_SQL: &str = "SELECT l.id, l.src_id, l.src_port, l.dst_id, l.dst_port,
            s.device_id, d.device_id, s.type, d.type
     FROM link l
     JOIN node s ON l.src_id = s.id
     JOIN node d ON l.dst_id = d.id";

pub fn link_infos(conn: &Connection) -> Result<BTreeMap<i64, LinkInfo>, Error> {
    let mut stmt = conn.prepare(&format!("{LINK_INFO_SQL} ORDER BY l.id"))?;
    let links = stmt
        .query_map([], map_link_info)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links.into_iter().map(|l| (l.id, l)).collect())
}

pub fn links_touching(conn: &Connection, node_id: i64) -> Result<Vec<LinkInfo>, Error> {
    let mut stmt = conn.prepare(&format!(
        "{LINK_INFO_SQL} WHERE l.src_id = ?1 OR l.dst_id = ?1 ORDER BY l.id"
    ))?;
    let links = stmt
        .query_map(params![node_id], map_link_info)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

pub fn first_link_touching(conn: &Connection, node_id: i64) -> Result<Option<LinkInfo>, Error> {
    Ok(links_touching(conn, node_id)?.into_iter().next())
}

#[derive(Debug, Clone)]
pub struct LinkSampleRow {
    pub id: i64,
    pub sampled: i64,
    pub link_id: i64,
    pub betweenness: Option<f64>,
    pub src_packet_loss: Option<f64>,
    pub dst_packet_loss: Option<f64>,
    pub src_transmit_data_rate: Option<i64>,
    pub src_receive_data_rate: Option<i64>,
    pub dst_transmit_data_rate: Option<i64>,
    pub dst_receive_data_rate: Option<i64>,
    pub src_delay: Option<f64>,
    pub dst_delay: Option<f64>,
}

fn map_link_sample(row: &Row) -> rusqlite::Result<LinkSampleRow> {
    Ok(LinkSampleRow {
        id: row.get(0)?,
        sampled: row.get(1)?,
        link_id: row.get(2)?,
        betweenness: row.get(3)?,
        src_packet_loss: row.get(4)?,
        dst_packet_loss: row.get(5)?,
        src_transmit_data_rate: row.get(6)?,
        src_receive_data_rate: row.get(7)?,
        dst_transmit_data_rate: row.get(8)?,
        dst_receive_data_rate: row.get(9)?,
        src_delay: row.get(10)?,
        dst_delay: row.get(11)?,
    })
}

const LINK_SAMPLE_SQL: &str = "SELECT id, sampled, link_id, betweenness,
            src_packet_loss, dst_packet_loss,
            src_transmit_data_rate, src_receive_data_rate,
            dst_transmit_data_rate, dst_receive_data_rate,
            src_delay, dst_delay
     FROM link_sample";

/// All link samples in the window, grouped per link.
pub fn link_samples_since(
    conn: &Connection,
    start: i64,
) -> Result<BTreeMap<i64, Vec<LinkSampleRow>>, Error> {
    let mut stmt =
        conn.prepare(&format!("{LINK_SAMPLE_SQL} WHERE sampled > ?1 ORDER BY link_id, sampled"))?;
    let rows = stmt
        .query_map(params![start], map_link_sample)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: BTreeMap<i64, Vec<LinkSampleRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.link_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Samples for one link in the window, newest first.
pub fn link_samples_for_link(
    conn: &Connection,
    link_id: i64,
    start: i64,
) -> Result<Vec<LinkSampleRow>, Error> {
    let mut stmt = conn.prepare(&format!(
        "{LINK_SAMPLE_SQL} WHERE link_id = ?1 AND sampled > ?2 ORDER BY sampled DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map(params![link_id, start], map_link_sample)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn distinct_link_sample_times(conn: &Connection, start: i64) -> Result<Vec<i64>, Error> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT sampled FROM link_sample WHERE sampled > ?1 ORDER BY sampled")?;
    let times = stmt
        .query_map(params![start], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(times)
}

/// The flow columns the analysis tasks consume.
#[derive(Debug, Clone)]
pub struct FlowRow {
    pub id: i64,
    pub node_id: i64,
    pub data_layer_source: String,
    pub data_layer_destination: String,
    pub network_source: String,
    pub network_destination: String,
    pub network_protocol: i64,
    pub transport_source: i64,
    pub transport_destination: i64,
}

fn map_flow(row: &Row) -> rusqlite::Result<FlowRow> {
    Ok(FlowRow {
        id: row.get(0)?,
        node_id: row.get(1)?,
        data_layer_source: row.get(2)?,
        data_layer_destination: row.get(3)?,
        network_source: row.get(4)?,
        network_destination: row.get(5)?,
        network_protocol: row.get(6)?,
        transport_source: row.get(7)?,
        transport_destination: row.get(8)?,
    })
}

const FLOW_SQL: &str = "SELECT id, node_id, data_layer_source, data_layer_destination,
            network_source, network_destination,
            COALESCE(network_protocol, 0),
            COALESCE(transport_source, 0), COALESCE(transport_destination, 0)
     FROM flow";

pub fn flow_by_id(conn: &Connection, id: i64) -> Result<Option<FlowRow>, Error> {
    Ok(conn
        .query_row(&format!("{FLOW_SQL} WHERE id = ?1"), params![id], map_flow)
        .optional()?)
}

/// Flows that were sampled at least once after `start`.
pub fn flows_sampled_since(conn: &Connection, start: i64) -> Result<Vec<FlowRow>, Error> {
    let mut stmt = conn.prepare(&format!(
        "{FLOW_SQL} WHERE id IN (SELECT DISTINCT flow_id FROM flow_sample WHERE sampled > ?1)
         ORDER BY id"
    ))?;
    let flows = stmt
        .query_map(params![start], map_flow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(flows)
}

/// Flow identity is the owning node, the cookie and the full match
/// tuple. `IS` comparison treats two absent eth_type fields as equal.
pub fn find_or_create_flow(
    conn: &Connection,
    now: i64,
    node_id: i64,
    cookie: i64,
    m: &FlowMatch,
) -> Result<i64, Error> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM flow
             WHERE node_id = ?1 AND cookie = ?2
               AND data_layer_destination = ?3 AND data_layer_source = ?4
               AND data_layer_type IS ?5
               AND data_layer_virtual_lan = ?6
               AND data_layer_virtual_lan_priority_code_point = ?7
               AND input_port = ?8
               AND network_destination = ?9 AND network_destination_mask_len = ?10
               AND network_protocol = ?11
               AND network_source = ?12 AND network_source_mask_len = ?13
               AND network_type_of_service = ?14
               AND transport_destination = ?15 AND transport_source = ?16
               AND wildcards = ?17",
            params![
                node_id,
                cookie,
                m.dl_dst,
                m.dl_src,
                m.dl_type,
                m.dl_vlan,
                m.dl_vlan_pcp,
                m.in_port,
                m.nw_dst,
                m.nw_dst_mask_len,
                m.nw_proto,
                m.nw_src,
                m.nw_src_mask_len,
                m.nw_tos,
                m.tp_dst,
                m.tp_src,
                m.wildcards,
            ],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO flow (created, cookie,
             data_layer_destination, data_layer_source, data_layer_type,
             data_layer_virtual_lan, data_layer_virtual_lan_priority_code_point,
             input_port,
             network_destination, network_destination_mask_len,
             network_protocol,
             network_source, network_source_mask_len,
             network_type_of_service,
             transport_destination, transport_source,
             wildcards, node_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            now,
            cookie,
            m.dl_dst,
            m.dl_src,
            m.dl_type,
            m.dl_vlan,
            m.dl_vlan_pcp,
            m.in_port,
            m.nw_dst,
            m.nw_dst_mask_len,
            m.nw_proto,
            m.nw_src,
            m.nw_src_mask_len,
            m.nw_tos,
            m.tp_dst,
            m.tp_src,
            m.wildcards,
            node_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug)]
pub struct NewReport<'a> {
    pub created: i64,
    pub report_type: &'a str,
    pub sample_interval: Option<f64>,
    pub sample_start: Option<i64>,
    pub sample_stop: Option<i64>,
    pub sample_count: i64,
    pub execution_duration: f64,
    pub content: &'a str,
}

pub fn insert_report(conn: &Connection, report: &NewReport) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO report (created, type, sample_interval, sample_start, sample_stop,
             sample_count, execution_duration, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.created,
            report.report_type,
            report.sample_interval,
            report.sample_start,
            report.sample_stop,
            report.sample_count,
            report.execution_duration,
            report.content,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_test_store() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    crate::database::init_schema(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_create_node_is_idempotent() {
        let conn = open_test_store();
        let a = find_or_create_node(&conn, 1000, "00:00:00:00:00:00:00:01", "switch").unwrap();
        let b = find_or_create_node(&conn, 2000, "00:00:00:00:00:00:00:01", "switch").unwrap();
        assert_eq!(a.id, b.id);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM node", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn address_association_does_not_duplicate() {
        let conn = open_test_store();
        let node = find_or_create_node(&conn, 1000, "00:00:aa:bb:cc:dd:ee:ff", "host").unwrap();
        associate_address(&conn, 1000, node.id, "10.0.0.1").unwrap();
        associate_address(&conn, 2000, node.id, "10.0.0.1").unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM internet_address_association", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn flow_identity_tolerates_absent_eth_type() {
        let conn = open_test_store();
        let node = find_or_create_node(&conn, 1000, "00:00:00:00:00:00:00:01", "switch").unwrap();

        let m = FlowMatch {
            dl_type: None,
            ..FlowMatch::default()
        };
        let a = find_or_create_flow(&conn, 1000, node.id, 0, &m).unwrap();
        let b = find_or_create_flow(&conn, 2000, node.id, 0, &m).unwrap();
        assert_eq!(a, b);

        let with_type = FlowMatch {
            dl_type: Some(2048),
            ..FlowMatch::default()
        };
        let c = find_or_create_flow(&conn, 3000, node.id, 0, &with_type).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn sample_intervals_are_deduplicated() {
        let conn = open_test_store();
        insert_sample_timestamp(&conn, 1000, Some(30.0)).unwrap();
        insert_sample_timestamp(&conn, 2000, Some(30.0)).unwrap();
        insert_sample_timestamp(&conn, 3000, Some(60.0)).unwrap();

        let all: BTreeSet<i64> = [1000, 2000].into_iter().collect();
        assert_eq!(sample_intervals_for(&conn, &all).unwrap(), vec![30.0]);

        let mixed: BTreeSet<i64> = [1000, 3000].into_iter().collect();
        assert_eq!(sample_intervals_for(&conn, &mixed).unwrap().len(), 2);
    }

    #[test]
    fn link_ident_format() {
        let info = LinkInfo {
            id: 1,
            src_id: 1,
            src_port: 1,
            dst_id: 2,
            dst_port: 3,
            src_device: "00:00:00:00:00:00:00:01".into(),
            dst_device: "00:00:00:00:00:00:00:02".into(),
            src_type: "switch".into(),
            dst_type: "switch".into(),
        };
        assert_eq!(
            info.ident(),
            "00:00:00:00:00:00:00:01-1.00:00:00:00:00:00:00:02-3"
        );
    }
}
