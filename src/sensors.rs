//! Controller sensors.
//!
//! Each sensor is bound to one controller endpoint and split into two
//! phases: `prepare` fetches and decodes the JSON payload (soft-fail,
//! idempotent), `apply` translates the cached payload into store writes
//! stamped with the tick's `now`. The observer runs prepares
//! concurrently and applies strictly in catalogue order, because later
//! sensors build on earlier sensors' rows (ports before counters, links
//! before delays).

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Error;
use crate::protocol::{
    DelayEntry, DeviceEntry, FeaturesEntry, FlowMatch, FlowsEntry, LinkEntry, PortStatsEntry,
    SwitchEntry,
};
use crate::store::{self, Node};

/// HTTP client bound to the controller's REST root.
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base: String,
}

impl ControllerClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{host}:{port}/wm/"),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// The body is decoded regardless of HTTP status; some controller
    /// modules report their errors as JSON bodies (the delay endpoint
    /// answers `{"code": 404}` when no measurements exist).
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.http.get(self.url(path)).send().await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
pub trait Sensor: Send {
    fn name(&self) -> &'static str;
    fn path(&self) -> &'static str;

    /// Fetch and decode the endpoint payload. Failure is soft: the
    /// observer drops the whole tick but the process keeps running.
    async fn prepare(&mut self) -> Result<(), Error>;

    /// Translate the cached payload into store writes under `now`.
    /// Runs inside the sensor's own transaction.
    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error>;
}

/// All sensors in their fixed apply order.
pub fn sensor_catalogue(client: &ControllerClient) -> Vec<Box<dyn Sensor>> {
    vec![
        Box::new(SwitchListSensor::new(client.clone())),
        Box::new(DevicesSensor::new(client.clone())),
        Box::new(SwitchFeaturesSensor::new(client.clone())),
        Box::new(SwitchPortSensor::new(client.clone())),
        Box::new(LinksSensor::new(client.clone())),
        Box::new(SwitchFlowSensor::new(client.clone())),
        Box::new(DelaySensor::new(client.clone())),
    ]
}

/// Controller timestamps arrive as Unix seconds or milliseconds;
/// normalize to milliseconds.
fn parse_controller_time(raw: i64) -> i64 {
    if raw >= 1_000_000_000_000 {
        raw
    } else {
        raw * 1000
    }
}

/// Ports are created on first sighting; address and name refresh on
/// every observation.
fn create_update_port(
    conn: &Connection,
    now: i64,
    node_id: i64,
    port_number: i64,
    hardware_address: &str,
    name: &str,
) -> Result<i64, Error> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM port WHERE node_id = ?1 AND port_number = ?2",
            params![node_id, port_number],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE port SET hardware_address = ?1, name = ?2, last_seen = ?3 WHERE id = ?4",
                params![hardware_address, name, now, id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO port (hardware_address, port_number, name, created, last_seen, node_id)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
                params![hardware_address, port_number, name, now, node_id],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PortCounterSample {
    sampled: i64,
    receive_packets: i64,
    transmit_packets: i64,
    receive_bytes: i64,
    transmit_bytes: i64,
}

/// The two most recent counter samples for a node's port, newest first.
fn recent_port_samples(
    conn: &Connection,
    node_id: i64,
    port_number: i64,
) -> Result<Option<(PortCounterSample, PortCounterSample)>, Error> {
    let port_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM port WHERE node_id = ?1 AND port_number = ?2",
            params![node_id, port_number],
            |row| row.get(0),
        )
        .optional()?;
    let Some(port_id) = port_id else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT sampled, COALESCE(receive_packets, 0), COALESCE(transmit_packets, 0),
                COALESCE(receive_bytes, 0), COALESCE(transmit_bytes, 0)
         FROM port_sample WHERE port_id = ?1
         ORDER BY sampled DESC, id DESC LIMIT 2",
    )?;
    let samples: Vec<PortCounterSample> = stmt
        .query_map(params![port_id], |row| {
            Ok(PortCounterSample {
                sampled: row.get(0)?,
                receive_packets: row.get(1)?,
                transmit_packets: row.get(2)?,
                receive_bytes: row.get(3)?,
                transmit_bytes: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    match samples.as_slice() {
        [newest, previous] => Ok(Some((*newest, *previous))),
        _ => Ok(None),
    }
}

enum Direction {
    Transmit,
    Receive,
}

/// Bits per second between two counter samples. Counter resets clamp to
/// zero instead of producing negative rates; a zero time delta leaves
/// the rate unset.
fn data_rate(
    before: &PortCounterSample,
    now: &PortCounterSample,
    direction: Direction,
) -> Option<i64> {
    let delta = match direction {
        Direction::Transmit => now.transmit_bytes - before.transmit_bytes,
        Direction::Receive => now.receive_bytes - before.receive_bytes,
    };
    let delta_bits = delta.max(0) as f64 * 8.0;
    let delta_seconds = (now.sampled - before.sampled) as f64 / 1000.0;
    if delta_seconds <= 0.0 {
        return None;
    }
    Some((delta_bits / delta_seconds).floor() as i64)
}

/// Loss in the tx→rx direction: 1 - clamp01(Δreceived / Δtransmitted),
/// 0 when nothing was transmitted. Rounded to 5 decimals.
fn packet_loss(
    tx_before: &PortCounterSample,
    tx_now: &PortCounterSample,
    rx_before: &PortCounterSample,
    rx_now: &PortCounterSample,
) -> f64 {
    let delta_transmit = (tx_now.transmit_packets - tx_before.transmit_packets) as f64;
    let delta_receive = (rx_now.receive_packets - rx_before.receive_packets) as f64;
    if delta_transmit == 0.0 {
        return 0.0;
    }
    let loss = 1.0 - (delta_receive / delta_transmit).clamp(0.0, 1.0);
    (loss * 1e5).round() / 1e5
}

#[derive(Debug, Default)]
struct LinkMetrics {
    src_packet_loss: Option<f64>,
    dst_packet_loss: Option<f64>,
    src_transmit_data_rate: Option<i64>,
    src_receive_data_rate: Option<i64>,
    dst_transmit_data_rate: Option<i64>,
    dst_receive_data_rate: Option<i64>,
}

fn derive_link_metrics(
    conn: &Connection,
    src_id: i64,
    src_port: i64,
    dst_id: i64,
    dst_port: i64,
) -> Result<LinkMetrics, Error> {
    let src = recent_port_samples(conn, src_id, src_port)?;
    let dst = recent_port_samples(conn, dst_id, dst_port)?;

    let mut metrics = LinkMetrics::default();
    if let Some((now, before)) = &src {
        metrics.src_transmit_data_rate = data_rate(before, now, Direction::Transmit);
        metrics.src_receive_data_rate = data_rate(before, now, Direction::Receive);
    }
    if let Some((now, before)) = &dst {
        metrics.dst_transmit_data_rate = data_rate(before, now, Direction::Transmit);
        metrics.dst_receive_data_rate = data_rate(before, now, Direction::Receive);
    }
    if let (Some((src_now, src_before)), Some((dst_now, dst_before))) = (&src, &dst) {
        metrics.src_packet_loss = Some(packet_loss(src_before, src_now, dst_before, dst_now));
        metrics.dst_packet_loss = Some(packet_loss(dst_before, dst_now, src_before, src_now));
    }
    Ok(metrics)
}

/// Canonical link find-or-create: endpoints are swapped so the smaller
/// device_id is always the source, making each physical link a single
/// row. Always appends a LinkSample for `now` with derived metrics.
pub fn create_update_link(
    conn: &Connection,
    now: i64,
    src: &Node,
    src_port: i64,
    dst: &Node,
    dst_port: i64,
    link_type: &str,
    direction: &str,
) -> Result<i64, Error> {
    let (src, src_port, dst, dst_port) = if src.device_id > dst.device_id {
        (dst, dst_port, src, src_port)
    } else {
        (src, src_port, dst, dst_port)
    };

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM link
             WHERE src_id = ?1 AND src_port = ?2 AND dst_id = ?3 AND dst_port = ?4",
            params![src.id, src_port, dst.id, dst_port],
            |row| row.get(0),
        )
        .optional()?;

    let link_id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE link SET type = ?1, direction = ?2, last_seen = ?3 WHERE id = ?4",
                params![link_type, direction, now, id],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO link (created, last_seen, type, direction, src_id, src_port, dst_id, dst_port)
                 VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![now, link_type, direction, src.id, src_port, dst.id, dst_port],
            )?;
            conn.last_insert_rowid()
        }
    };

    let metrics = derive_link_metrics(conn, src.id, src_port, dst.id, dst_port)?;
    conn.execute(
        "INSERT INTO link_sample (sampled, link_id,
             src_packet_loss, dst_packet_loss,
             src_transmit_data_rate, src_receive_data_rate,
             dst_transmit_data_rate, dst_receive_data_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            now,
            link_id,
            metrics.src_packet_loss,
            metrics.dst_packet_loss,
            metrics.src_transmit_data_rate,
            metrics.src_receive_data_rate,
            metrics.dst_transmit_data_rate,
            metrics.dst_receive_data_rate,
        ],
    )?;

    Ok(link_id)
}

// ============================================================================
// Sensors
// ============================================================================

pub struct SwitchListSensor {
    client: ControllerClient,
    payload: Option<Vec<SwitchEntry>>,
}

impl SwitchListSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for SwitchListSensor {
    fn name(&self) -> &'static str {
        "SwitchList"
    }

    fn path(&self) -> &'static str {
        "core/controller/switches/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(switches) = &self.payload else {
            return Ok(());
        };
        for entry in switches {
            let node = store::find_or_create_node(conn, now, &entry.switch_dpid, "switch")?;
            let connected_since = entry
                .connected_since
                .as_ref()
                .and_then(|v| v.as_i64())
                .map(parse_controller_time);
            conn.execute(
                "UPDATE node SET last_seen = ?1, connected_since = ?2 WHERE id = ?3",
                params![now, connected_since, node.id],
            )?;
            store::insert_node_sample(conn, node.id, now)?;
        }
        Ok(())
    }
}

pub struct DevicesSensor {
    client: ControllerClient,
    payload: Option<Vec<DeviceEntry>>,
}

impl DevicesSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for DevicesSensor {
    fn name(&self) -> &'static str {
        "Devices"
    }

    fn path(&self) -> &'static str {
        "device/"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(devices) = &self.payload else {
            return Ok(());
        };
        for device in devices {
            let Some(mac) = device.mac.first() else {
                continue;
            };
            let device_id = format!("00:00:{mac}");
            let node = store::find_or_create_node(conn, now, &device_id, "host")?;

            for ip in &device.ipv4 {
                store::associate_address(conn, now, node.id, ip)?;
            }

            let last_seen = device
                .last_seen
                .as_ref()
                .and_then(|v| v.as_i64())
                .map(parse_controller_time)
                .unwrap_or(now);
            conn.execute(
                "UPDATE node SET last_seen = ?1 WHERE id = ?2",
                params![last_seen, node.id],
            )?;

            if !device.attachment_point.is_empty()
                && !store::node_sample_exists(conn, node.id, now)?
            {
                store::insert_node_sample(conn, node.id, now)?;
            }

            for attachment in &device.attachment_point {
                let Some(switch) = store::node_by_device_id(conn, &attachment.switch_dpid)? else {
                    tracing::warn!(
                        "could not find switch [{}] for device [{}]; this should only happen occasionally",
                        attachment.switch_dpid,
                        device_id
                    );
                    continue;
                };
                let Some(switch_port) = attachment.port.as_i64() else {
                    continue;
                };
                // hosts expose a single synthetic local port
                let local_port = 1;
                create_update_port(conn, now, node.id, local_port, mac, "UNK")?;
                create_update_link(
                    conn,
                    now,
                    &node,
                    local_port,
                    &switch,
                    switch_port,
                    "ethernet",
                    "bidirectional",
                )?;
            }
        }
        Ok(())
    }
}

pub struct SwitchFeaturesSensor {
    client: ControllerClient,
    payload: Option<BTreeMap<String, FeaturesEntry>>,
}

impl SwitchFeaturesSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for SwitchFeaturesSensor {
    fn name(&self) -> &'static str {
        "SwitchFeatures"
    }

    fn path(&self) -> &'static str {
        "core/switch/all/features/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(features) = &self.payload else {
            return Ok(());
        };
        for (device_id, entry) in features {
            let Some(ports) = &entry.port_desc else {
                continue;
            };
            let Some(switch) = store::node_by_device_id(conn, device_id)? else {
                tracing::warn!(
                    "could not find switch [{device_id}]; this should only happen occasionally"
                );
                continue;
            };
            for port in ports {
                // "local" is the switch's internal port
                let Some(number) = port.port_number.as_i64() else {
                    continue;
                };
                create_update_port(
                    conn,
                    now,
                    switch.id,
                    number,
                    &port.hardware_address,
                    &port.name,
                )?;
            }
        }
        Ok(())
    }
}

pub struct SwitchPortSensor {
    client: ControllerClient,
    payload: Option<BTreeMap<String, PortStatsEntry>>,
}

impl SwitchPortSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for SwitchPortSensor {
    fn name(&self) -> &'static str {
        "SwitchPort"
    }

    fn path(&self) -> &'static str {
        "core/switch/all/port/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(stats) = &self.payload else {
            return Ok(());
        };
        for (device_id, entry) in stats {
            let Some(ports) = &entry.port else {
                continue;
            };
            let Some(switch) = store::node_by_device_id(conn, device_id)? else {
                tracing::warn!(
                    "could not find switch [{device_id}]; this should only happen occasionally"
                );
                continue;
            };
            for counters in ports {
                let Some(number) = counters.port_number.as_i64() else {
                    continue;
                };
                let port_id: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM port WHERE node_id = ?1 AND port_number = ?2",
                        params![switch.id, number],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(port_id) = port_id else {
                    tracing::warn!(
                        "could not find switch [{device_id}]'s port [{number}]; this should only happen occasionally"
                    );
                    continue;
                };
                conn.execute(
                    "INSERT INTO port_sample (sampled,
                         receive_packets, transmit_packets,
                         receive_bytes, transmit_bytes,
                         receive_dropped, transmit_dropped,
                         receive_errors, transmit_errors,
                         receive_frame_errors, receive_overrun_errors,
                         receive_crc_errors, collisions, port_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        now,
                        counters.receive_packets.0,
                        counters.transmit_packets.0,
                        counters.receive_bytes.0,
                        counters.transmit_bytes.0,
                        counters.receive_dropped.0,
                        counters.transmit_dropped.0,
                        counters.receive_errors.0,
                        counters.transmit_errors.0,
                        counters.receive_frame_errors.0,
                        counters.receive_overrun_errors.0,
                        counters.receive_crc_errors.0,
                        counters.collisions.0,
                        port_id,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

pub struct LinksSensor {
    client: ControllerClient,
    payload: Option<Vec<LinkEntry>>,
}

impl LinksSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for LinksSensor {
    fn name(&self) -> &'static str {
        "Links"
    }

    fn path(&self) -> &'static str {
        "topology/links/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(links) = &self.payload else {
            return Ok(());
        };
        for entry in links {
            let src = store::node_by_device_id(conn, &entry.src_switch)?;
            let dst = store::node_by_device_id(conn, &entry.dst_switch)?;
            let (Some(src), Some(dst)) = (src, dst) else {
                tracing::warn!(
                    "could not find switch [{}] or switch [{}]; this should only happen occasionally",
                    entry.src_switch,
                    entry.dst_switch
                );
                continue;
            };
            let (Some(src_port), Some(dst_port)) =
                (entry.src_port.as_i64(), entry.dst_port.as_i64())
            else {
                continue;
            };
            create_update_link(
                conn,
                now,
                &src,
                src_port,
                &dst,
                dst_port,
                &entry.link_type,
                &entry.direction,
            )?;
        }
        Ok(())
    }
}

pub struct SwitchFlowSensor {
    client: ControllerClient,
    payload: Option<BTreeMap<String, FlowsEntry>>,
}

impl SwitchFlowSensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for SwitchFlowSensor {
    fn name(&self) -> &'static str {
        "SwitchFlow"
    }

    fn path(&self) -> &'static str {
        "core/switch/all/flow/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(switches) = &self.payload else {
            return Ok(());
        };
        for (dpid, entry) in switches {
            let Some(switch) = store::node_by_device_id(conn, dpid)? else {
                continue;
            };
            let Some(flows) = &entry.flows else {
                continue;
            };
            for flow in flows {
                let matched = FlowMatch::from_wire(&flow.match_fields);
                let flow_id =
                    store::find_or_create_flow(conn, now, switch.id, flow.cookie.0, &matched)?;
                conn.execute(
                    "INSERT INTO flow_sample (sampled, packet_count, byte_count,
                         duration_seconds, priority, idle_timeout_sec, hard_timeout_sec, flow_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        now,
                        flow.packet_count.0,
                        flow.byte_count.0,
                        flow.duration_seconds.0,
                        flow.priority.0,
                        flow.idle_timeout_sec.0,
                        flow.hard_timeout_sec.0,
                        flow_id,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

pub struct DelaySensor {
    client: ControllerClient,
    payload: Option<Value>,
}

impl DelaySensor {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            payload: None,
        }
    }
}

#[async_trait]
impl Sensor for DelaySensor {
    fn name(&self) -> &'static str {
        "Delay"
    }

    fn path(&self) -> &'static str {
        "uds/delay/json"
    }

    async fn prepare(&mut self) -> Result<(), Error> {
        self.payload = None;
        self.payload = Some(self.client.get_json(self.path()).await?);
        Ok(())
    }

    fn apply(&self, conn: &Connection, now: i64) -> Result<(), Error> {
        let Some(data) = &self.payload else {
            return Ok(());
        };
        if data.get("code").and_then(Value::as_i64) == Some(404) {
            return Ok(());
        }
        let Some(raw_entries) = data.as_array() else {
            return Ok(());
        };

        struct TickLinkSample {
            id: i64,
            src_device: String,
            src_port: i64,
            dst_device: String,
            dst_port: i64,
        }

        let mut stmt = conn.prepare(
            "SELECT ls.id, sn.device_id, l.src_port, dn.device_id, l.dst_port
             FROM link_sample ls
             JOIN link l ON ls.link_id = l.id
             JOIN node sn ON l.src_id = sn.id
             JOIN node dn ON l.dst_id = dn.id
             WHERE ls.sampled = ?1",
        )?;
        let samples: Vec<TickLinkSample> = stmt
            .query_map(params![now], |row| {
                Ok(TickLinkSample {
                    id: row.get(0)?,
                    src_device: row.get(1)?,
                    src_port: row.get(2)?,
                    dst_device: row.get(3)?,
                    dst_port: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for raw in raw_entries {
            let Ok(entry) = serde_json::from_value::<DelayEntry>(raw.clone()) else {
                continue;
            };
            let (Some(src_ctrl), Some(dst_ctrl)) = (entry.src_ctrl_delay, entry.dst_ctrl_delay)
            else {
                continue;
            };
            if entry.inconsistency {
                continue;
            }
            // the measured delay includes both control-channel legs
            let delay = entry.full_delay - 0.5 * (src_ctrl + dst_ctrl);

            if let Some(port) = entry.src_port.as_ref().and_then(|p| p.as_i64()) {
                for sample in samples
                    .iter()
                    .filter(|s| s.src_device == entry.src_dpid && s.src_port == port)
                {
                    conn.execute(
                        "UPDATE link_sample SET src_delay = ?1 WHERE id = ?2",
                        params![delay, sample.id],
                    )?;
                }
            }
            if let Some(port) = entry.dst_port.as_ref().and_then(|p| p.as_i64()) {
                for sample in samples
                    .iter()
                    .filter(|s| s.dst_device == entry.dst_dpid && s.dst_port == port)
                {
                    conn.execute(
                        "UPDATE link_sample SET dst_delay = ?1 WHERE id = ?2",
                        params![delay, sample.id],
                    )?;
                }
            }
        }
        Ok(())
    }
}
