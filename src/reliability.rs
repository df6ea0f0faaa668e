//! Link reliability over time, alone and against centrality.
//!
//! Reliability of a sample is 1 - max(src loss, dst loss), falling back
//! to whichever side is present. Both tasks resample every link's
//! series onto the window's distinct sampling instants, filling gaps
//! with 0.0 so all series are comparable.

use rusqlite::Connection;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::analyzer::{mean, AnalysisTask, TaskOutput, DAY_MS};
use crate::error::Error;
use crate::store::{self, LinkSampleRow};

fn reliability(sample: &LinkSampleRow) -> f64 {
    let loss = match (sample.src_packet_loss, sample.dst_packet_loss) {
        (Some(src), Some(dst)) => src.max(dst),
        (Some(src), None) => src,
        (None, Some(dst)) => dst,
        (None, None) => 0.0,
    };
    1.0 - loss
}

fn resample<F>(timestamps: &[i64], rows: &[LinkSampleRow], value: F) -> Vec<f64>
where
    F: Fn(&LinkSampleRow) -> f64,
{
    let by_time: HashMap<i64, f64> = rows.iter().map(|r| (r.sampled, value(r))).collect();
    timestamps
        .iter()
        .map(|t| by_time.get(t).copied().unwrap_or(0.0))
        .collect()
}

pub struct LinkReliabilityStatistics;

impl AnalysisTask for LinkReliabilityStatistics {
    fn kind(&self) -> &'static str {
        "LinkReliabilityStatistics"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - DAY_MS;
        let links = store::link_infos(conn)?;
        let timestamps = store::distinct_link_sample_times(conn, window_start)?;
        let grouped = store::link_samples_since(conn, window_start)?;

        let mut series: Vec<(f64, Value)> = Vec::new();
        for (link_id, rows) in &grouped {
            let Some(info) = links.get(link_id) else {
                continue;
            };
            let data = resample(&timestamps, rows, reliability);
            let ratio = mean(&data).unwrap_or(0.0);
            let last_mile = info.src_type == "host" || info.dst_type == "host";
            series.push((
                ratio,
                json!({
                    "id": link_id,
                    "link_id": info.ident(),
                    "data": data,
                    "ratio": ratio,
                    "last_mile": last_mile,
                }),
            ));
        }
        // least reliable links first
        series.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let samples: BTreeSet<i64> = timestamps.iter().copied().collect();
        Ok(TaskOutput {
            content: json!({
                "linkSeries": series.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
                "timestamps": timestamps.iter().map(|t| store::iso(*t)).collect::<Vec<_>>(),
            }),
            samples,
        })
    }
}

pub struct LinkImprovementAnalysis;

impl AnalysisTask for LinkImprovementAnalysis {
    fn kind(&self) -> &'static str {
        "LinkImprovementAnalysis"
    }

    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error> {
        let window_start = now - DAY_MS;
        let links = store::link_infos(conn)?;
        let timestamps = store::distinct_link_sample_times(conn, window_start)?;
        let grouped = store::link_samples_since(conn, window_start)?;

        let mut series = Vec::new();
        let mut centrality_max = 0.0f64;
        for (link_id, rows) in &grouped {
            let Some(info) = links.get(link_id) else {
                continue;
            };
            let reliability_series = resample(&timestamps, rows, reliability);
            let centrality_series =
                resample(&timestamps, rows, |r| r.betweenness.unwrap_or(0.0));
            for value in &centrality_series {
                centrality_max = centrality_max.max(*value);
            }
            series.push(json!({
                "id": link_id,
                "link_id": info.ident(),
                "reliability": reliability_series,
                "centrality": centrality_series,
            }));
        }

        let samples: BTreeSet<i64> = timestamps.iter().copied().collect();
        Ok(TaskOutput {
            content: json!({
                "series": series,
                "centrality_max": centrality_max,
                "timestamps": timestamps.iter().map(|t| store::iso(*t)).collect::<Vec<_>>(),
            }),
            samples,
        })
    }
}
