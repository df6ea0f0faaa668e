//! In-memory view of one tick's topology, as the augmentors consume it.

use rusqlite::{params, Connection};

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct NodeVertex {
    pub sample_id: i64,
    pub node_id: i64,
}

#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub sample_id: i64,
    pub link_id: i64,
    pub src_id: i64,
    pub dst_id: i64,
}

/// The graph observed at one tick: the NodeSample rows stamped `now`
/// are the vertices, the LinkSample rows stamped `now` the edges.
#[derive(Debug)]
pub struct TopologyView {
    pub vertices: Vec<NodeVertex>,
    pub edges: Vec<LinkEdge>,
}

impl TopologyView {
    pub fn materialize(conn: &Connection, now: i64) -> Result<Self, Error> {
        let mut stmt =
            conn.prepare("SELECT id, node_id FROM node_sample WHERE sampled = ?1 ORDER BY id")?;
        let vertices = stmt
            .query_map(params![now], |row| {
                Ok(NodeVertex {
                    sample_id: row.get(0)?,
                    node_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT ls.id, ls.link_id, l.src_id, l.dst_id
             FROM link_sample ls
             JOIN link l ON ls.link_id = l.id
             WHERE ls.sampled = ?1
             ORDER BY ls.id",
        )?;
        let edges = stmt
            .query_map(params![now], |row| {
                Ok(LinkEdge {
                    sample_id: row.get(0)?,
                    link_id: row.get(1)?,
                    src_id: row.get(2)?,
                    dst_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { vertices, edges })
    }

    /// Distinct vertex ids for the graph layer.
    pub fn vertex_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.vertices.iter().map(|v| v.node_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn edge_pairs(&self) -> Vec<(i64, i64)> {
        self.edges.iter().map(|e| (e.src_id, e.dst_id)).collect()
    }
}
