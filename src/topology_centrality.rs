//! Snapshot of the newest per-node and per-link centrality values.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Map};
use std::collections::BTreeSet;

use crate::analyzer::{AnalysisTask, TaskOutput};
use crate::error::Error;
use crate::store;

pub struct TopologyCentrality;

impl AnalysisTask for TopologyCentrality {
    fn kind(&self) -> &'static str {
        "TopologyCentrality"
    }

    fn analyze(&self, conn: &Connection, _now: i64) -> Result<TaskOutput, Error> {
        let mut samples = BTreeSet::new();
        let mut devices = Map::new();
        let mut links = Map::new();

        let newest_node: Option<i64> = conn
            .query_row("SELECT MAX(sampled) FROM node_sample", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        if let Some(newest) = newest_node {
            samples.insert(newest);
            let mut stmt = conn.prepare(
                "SELECT n.device_id, ns.degree, ns.betweenness, ns.closeness
                 FROM node_sample ns JOIN node n ON ns.node_id = n.id
                 WHERE ns.sampled = ?1 ORDER BY n.device_id",
            )?;
            let rows: Vec<(String, Option<i64>, Option<f64>, Option<f64>)> = stmt
                .query_map(params![newest], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (device_id, degree, betweenness, closeness) in rows {
                let closeness = if degree == Some(0) {
                    Some(0.0)
                } else {
                    closeness
                };
                devices.insert(
                    device_id,
                    json!({
                        "degree": degree,
                        "betweenness": betweenness,
                        "closeness": closeness,
                    }),
                );
            }
        }

        let newest_link: Option<i64> = conn
            .query_row("SELECT MAX(sampled) FROM link_sample", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        if let Some(newest) = newest_link {
            samples.insert(newest);
            let link_infos = store::link_infos(conn)?;
            let mut stmt = conn.prepare(
                "SELECT link_id, betweenness FROM link_sample WHERE sampled = ?1 ORDER BY id",
            )?;
            let rows: Vec<(i64, Option<f64>)> = stmt
                .query_map(params![newest], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            for (link_id, betweenness) in rows {
                if let Some(info) = link_infos.get(&link_id) {
                    links.insert(info.ident(), json!({"betweenness": betweenness}));
                }
            }
        }

        Ok(TaskOutput {
            content: json!({"devices": devices, "links": links}),
            samples,
        })
    }
}
