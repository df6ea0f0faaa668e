//! Most-recent-per-link metrics plus the full sample series.

use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use crate::analyzer::{AnalysisTask, TaskOutput, DAY_MS};
use crate::error::Error;
use crate::store::{self, LinkSampleRow};

pub struct SimpleLinkStatistics;

fn parse(sample: &LinkSampleRow) -> Value {
    json!({
        "t": store::iso(sample.sampled),
        "srcPlr": sample.src_packet_loss,
        "dstPlr": sample.dst_packet_loss,
        "srcTxDr": sample.src_transmit_data_rate,
        "srcRxDr": sample.src_receive_data_rate,
        "dstTxDr": sample.dst_transmit_data_rate,
        "dstRxDr": sample.dst_receive_data_rate,
    })
}

impl AnalysisTask for SimpleLinkStatistics {
    fn kind(&self) -> &'static str {
        "LinkStatistics"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - DAY_MS;
        let links = store::link_infos(conn)?;

        let mut content = Map::new();
        let mut samples = BTreeSet::new();

        for info in links.values() {
            let rows = store::link_samples_for_link(conn, info.id, window_start)?;
            let Some(newest) = rows.first() else {
                continue;
            };
            samples.insert(newest.sampled);

            content.insert(
                info.ident(),
                json!({
                    "srcPlr": newest.src_packet_loss,
                    "dstPlr": newest.dst_packet_loss,
                    "srcTxDr": newest.src_transmit_data_rate,
                    "srcRxDr": newest.src_receive_data_rate,
                    "dstTxDr": newest.dst_transmit_data_rate,
                    "dstRxDr": newest.dst_receive_data_rate,
                    "samples": rows.iter().map(parse).collect::<Vec<_>>(),
                }),
            );
        }

        Ok(TaskOutput {
            content: Value::Object(content),
            samples,
        })
    }
}
