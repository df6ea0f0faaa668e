//! Post-processing over a completed tick: centrality written back onto
//! the tick's samples.

use rusqlite::{params, Connection};

use crate::centrality;
use crate::error::Error;
use crate::topology::TopologyView;

/// Compute degree, betweenness and closeness over the tick's topology
/// and store them on the NodeSample/LinkSample rows. Runs in one
/// transaction; store errors here abort the tick.
pub fn augment_centrality(conn: &mut Connection, now: i64) -> Result<(), Error> {
    let view = TopologyView::materialize(conn, now)?;
    let result = centrality::compute(&view.vertex_ids(), &view.edge_pairs());

    let tx = conn.transaction()?;
    for vertex in &view.vertices {
        let degree = result.degree.get(&vertex.node_id).copied().unwrap_or(0);
        let betweenness = result
            .node_betweenness
            .get(&vertex.node_id)
            .copied()
            .unwrap_or(0.0);
        // an unconnected node has no meaningful closeness
        let closeness = if degree == 0 {
            0.0
        } else {
            result
                .node_closeness
                .get(&vertex.node_id)
                .copied()
                .unwrap_or(0.0)
        };
        tx.execute(
            "UPDATE node_sample SET degree = ?1, betweenness = ?2, closeness = ?3 WHERE id = ?4",
            params![degree, betweenness, closeness, vertex.sample_id],
        )?;
    }
    for (position, edge) in view.edges.iter().enumerate() {
        tx.execute(
            "UPDATE link_sample SET betweenness = ?1 WHERE id = ?2",
            params![result.edge_betweenness[position], edge.sample_id],
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{self, open_test_store};

    #[test]
    fn augment_writes_centrality_onto_samples() {
        let mut conn = open_test_store();
        let now = 1000;

        // 1 - 2 - 3 path
        let mut node_ids = Vec::new();
        for device in [
            "00:00:00:00:00:00:00:01",
            "00:00:00:00:00:00:00:02",
            "00:00:00:00:00:00:00:03",
        ] {
            let node = store::find_or_create_node(&conn, now, device, "switch").unwrap();
            store::insert_node_sample(&conn, node.id, now).unwrap();
            node_ids.push(node.id);
        }
        for (src, dst) in [(0, 1), (1, 2)] {
            conn.execute(
                "INSERT INTO link (created, last_seen, src_id, src_port, dst_id, dst_port)
                 VALUES (?1, ?1, ?2, 1, ?3, 1)",
                params![now, node_ids[src], node_ids[dst]],
            )
            .unwrap();
            let link_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO link_sample (sampled, link_id) VALUES (?1, ?2)",
                params![now, link_id],
            )
            .unwrap();
        }

        augment_centrality(&mut conn, now).unwrap();

        let (degree, betweenness, closeness): (i64, f64, f64) = conn
            .query_row(
                "SELECT degree, betweenness, closeness FROM node_sample WHERE node_id = ?1",
                params![node_ids[1]],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(degree, 2);
        assert!((betweenness - 1.0).abs() < 1e-9);
        assert!((closeness - 1.0).abs() < 1e-9);

        let edge_betweenness: f64 = conn
            .query_row(
                "SELECT betweenness FROM link_sample WHERE sampled = ?1 ORDER BY id LIMIT 1",
                params![1000],
                |r| r.get(0),
            )
            .unwrap();
        assert!((edge_betweenness - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn isolated_node_gets_zero_closeness() {
        let mut conn = open_test_store();
        let node = store::find_or_create_node(&conn, 1000, "00:00:00:00:00:00:00:09", "switch")
            .unwrap();
        store::insert_node_sample(&conn, node.id, 1000).unwrap();

        augment_centrality(&mut conn, 1000).unwrap();

        let (degree, closeness): (i64, f64) = conn
            .query_row(
                "SELECT degree, closeness FROM node_sample WHERE node_id = ?1",
                params![node.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(degree, 0);
        assert_eq!(closeness, 0.0);
    }
}
