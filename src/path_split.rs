//! Path-split recommendations: which of a switch's links differ enough
//! in loss and delay to be worth splitting traffic across.
//!
//! Every inter-switch link of a switch becomes a 2-feature vector
//! (mean loss, mean delay over the window, floored at the measurement
//! noise level); link pairs are compared by standardized Euclidean
//! distance using the switch's pooled per-feature variance.

use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::analyzer::{AnalysisTask, TaskOutput, DAY_MS};
use crate::error::Error;
use crate::store::{self, LinkInfo, LinkSampleRow};

pub struct PathSplitRecommendations;

const MINIMAL_LOSS: f64 = 1e-3;
const MINIMAL_DELAY: f64 = 1.0;

/// The [loss, delay] features of one sample, seen from the side of the
/// link the switch owns.
fn features(sample: &LinkSampleRow, from_src: bool) -> [f64; 2] {
    let (loss, delay) = if from_src {
        (sample.src_packet_loss, sample.src_delay)
    } else {
        (sample.dst_packet_loss, sample.dst_delay)
    };
    [
        loss.unwrap_or(MINIMAL_LOSS).max(MINIMAL_LOSS),
        delay.unwrap_or(MINIMAL_DELAY).max(MINIMAL_DELAY),
    ]
}

fn component_mean(samples: &[[f64; 2]]) -> [f64; 2] {
    if samples.is_empty() {
        return [0.0, 0.0];
    }
    let n = samples.len() as f64;
    [
        samples.iter().map(|s| s[0]).sum::<f64>() / n,
        samples.iter().map(|s| s[1]).sum::<f64>() / n,
    ]
}

fn component_variance(samples: &[[f64; 2]]) -> [f64; 2] {
    if samples.is_empty() {
        return [0.0, 0.0];
    }
    let mean = component_mean(samples);
    let n = samples.len() as f64;
    [
        samples.iter().map(|s| (s[0] - mean[0]).powi(2)).sum::<f64>() / n,
        samples.iter().map(|s| (s[1] - mean[1]).powi(2)).sum::<f64>() / n,
    ]
}

fn switch_side_port(link: &LinkInfo, node_id: i64) -> i64 {
    if link.src_id == node_id {
        link.src_port
    } else {
        link.dst_port
    }
}

impl AnalysisTask for PathSplitRecommendations {
    fn kind(&self) -> &'static str {
        "PathSplitRecommendations"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - DAY_MS;
        let mut samples = BTreeSet::new();
        let mut nodes = Map::new();
        let mut max_distance = 0.0f64;

        for node in store::nodes_by_type(conn, "switch")? {
            let links: Vec<LinkInfo> = store::links_touching(conn, node.id)?
                .into_iter()
                .filter(|l| l.src_type != "host" && l.dst_type != "host")
                .collect();
            let link_count = links.len();

            let mut means: Vec<[f64; 2]> = Vec::with_capacity(link_count);
            let mut pooled: Vec<[f64; 2]> = Vec::new();
            for link in &links {
                let rows = store::link_samples_for_link(conn, link.id, window_start)?;
                samples.extend(rows.iter().map(|r| r.sampled));

                let from_src = link.src_id == node.id;
                let link_features: Vec<[f64; 2]> =
                    rows.iter().map(|r| features(r, from_src)).collect();
                means.push(component_mean(&link_features));
                pooled.extend(link_features);
            }

            let variance = component_variance(&pooled);
            let variance = [
                variance[0].max(MINIMAL_LOSS * MINIMAL_LOSS),
                variance[1].max(MINIMAL_DELAY * MINIMAL_DELAY),
            ];

            let mut splits: Vec<(f64, Value)> = Vec::new();
            let mut node_max_distance = 0.0f64;
            for i in 0..link_count {
                for j in (i + 1)..link_count {
                    let squared = (means[i][0] - means[j][0]).powi(2) / variance[0]
                        + (means[i][1] - means[j][1]).powi(2) / variance[1];
                    let mut distance = squared.sqrt();
                    if !distance.is_finite() {
                        distance = 0.0;
                    }
                    max_distance = max_distance.max(distance);
                    node_max_distance = node_max_distance.max(distance);
                    splits.push((
                        distance,
                        json!({
                            "left": switch_side_port(&links[i], node.id),
                            "right": switch_side_port(&links[j], node.id),
                            "distance": distance,
                        }),
                    ));
                }
            }

            if link_count > 1 {
                splits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

                let mut ports = Map::new();
                for (link, mean) in links.iter().zip(&means) {
                    ports.insert(
                        switch_side_port(link, node.id).to_string(),
                        json!({
                            "link_id": link.ident(),
                            "loss": mean[0].max(MINIMAL_LOSS),
                            "delay": mean[1].max(MINIMAL_DELAY),
                        }),
                    );
                }

                nodes.insert(
                    node.device_id.clone(),
                    json!({
                        "max_distance": node_max_distance,
                        "ports": ports,
                        "splits": splits.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
                    }),
                );
            }
        }

        Ok(TaskOutput {
            content: json!({"max_distance": max_distance, "nodes": nodes}),
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_test_store;
    use rusqlite::params;

    const SW1: &str = "00:00:00:00:00:00:00:01";
    const SW2: &str = "00:00:00:00:00:00:00:02";
    const SW3: &str = "00:00:00:00:00:00:00:03";

    fn seed_link(conn: &Connection, src: i64, src_port: i64, dst: i64, dst_port: i64) -> i64 {
        conn.execute(
            "INSERT INTO link (created, last_seen, src_id, src_port, dst_id, dst_port)
             VALUES (0, 0, ?1, ?2, ?3, ?4)",
            params![src, src_port, dst, dst_port],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn seed_sample(conn: &Connection, link_id: i64, sampled: i64, src_loss: f64, src_delay: f64) {
        conn.execute(
            "INSERT INTO link_sample (sampled, link_id, src_packet_loss, src_delay)
             VALUES (?1, ?2, ?3, ?4)",
            params![sampled, link_id, src_loss, src_delay],
        )
        .unwrap();
    }

    #[test]
    fn identical_links_have_zero_distance() {
        let conn = open_test_store();
        let now = DAY_MS + 1_000_000;
        let a = store::find_or_create_node(&conn, 0, SW1, "switch").unwrap();
        let b = store::find_or_create_node(&conn, 0, SW2, "switch").unwrap();
        let c = store::find_or_create_node(&conn, 0, SW3, "switch").unwrap();

        let ab = seed_link(&conn, a.id, 1, b.id, 1);
        let ac = seed_link(&conn, a.id, 2, c.id, 1);
        seed_sample(&conn, ab, now - 10_000, 0.01, 5.0);
        seed_sample(&conn, ac, now - 10_000, 0.01, 5.0);

        let output = PathSplitRecommendations.analyze(&conn, now).unwrap();
        assert_eq!(output.content["max_distance"], 0.0);

        let node = &output.content["nodes"][SW1];
        assert_eq!(node["max_distance"], 0.0);
        let splits = node["splits"].as_array().unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0]["left"], 1);
        assert_eq!(splits[0]["right"], 2);

        // the leaf switches have only one inter-switch link each
        assert!(output.content["nodes"].get(SW2).is_none());
        assert_eq!(output.samples.len(), 1);
    }

    #[test]
    fn diverging_links_rank_by_distance() {
        let conn = open_test_store();
        let now = DAY_MS + 1_000_000;
        let a = store::find_or_create_node(&conn, 0, SW1, "switch").unwrap();
        let b = store::find_or_create_node(&conn, 0, SW2, "switch").unwrap();
        let c = store::find_or_create_node(&conn, 0, SW3, "switch").unwrap();

        let ab = seed_link(&conn, a.id, 1, b.id, 1);
        let ac = seed_link(&conn, a.id, 2, c.id, 1);
        for t in [now - 30_000, now - 20_000, now - 10_000] {
            seed_sample(&conn, ab, t, 0.001, 1.0);
            seed_sample(&conn, ac, t, 0.2, 40.0);
        }

        let output = PathSplitRecommendations.analyze(&conn, now).unwrap();
        let max = output.content["max_distance"].as_f64().unwrap();
        assert!(max > 0.0);
        assert_eq!(output.content["nodes"][SW1]["max_distance"], max);

        let ports = output.content["nodes"][SW1]["ports"].as_object().unwrap();
        assert_eq!(ports["2"]["loss"], 0.2);
        assert_eq!(ports["2"]["delay"], 40.0);
        assert_eq!(output.samples.len(), 3);
    }

    #[test]
    fn host_links_are_excluded() {
        let conn = open_test_store();
        let now = DAY_MS + 1_000_000;
        let a = store::find_or_create_node(&conn, 0, SW1, "switch").unwrap();
        let b = store::find_or_create_node(&conn, 0, SW2, "switch").unwrap();
        let host = store::find_or_create_node(&conn, 0, "00:00:aa:bb:cc:dd:ee:ff", "host").unwrap();

        let ab = seed_link(&conn, a.id, 1, b.id, 1);
        seed_link(&conn, host.id, 1, a.id, 2);
        seed_sample(&conn, ab, now - 10_000, 0.01, 5.0);

        let output = PathSplitRecommendations.analyze(&conn, now).unwrap();
        // only one non-host link at SW1: no split entry
        assert!(output.content["nodes"].as_object().unwrap().is_empty());
    }
}
