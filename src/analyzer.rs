//! The analysis task catalogue and the shared report protocol.
//!
//! Every task reads a bounded time window from the store, computes a
//! JSON body and reports the set of sampled timestamps it touched; the
//! run protocol turns that into a persisted Report row. Reports always
//! persist, even when a window was empty.

use rusqlite::Connection;
use std::collections::BTreeSet;
use std::time::Instant;

use crate::error::Error;
use crate::link_statistics::SimpleLinkStatistics;
use crate::path_split::PathSplitRecommendations;
use crate::reliability::{LinkImprovementAnalysis, LinkReliabilityStatistics};
use crate::services::{ServiceStatistics, SimpleServiceUsage};
use crate::store;
use crate::topology_centrality::TopologyCentrality;

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// What a task hands back to the run protocol.
pub struct TaskOutput {
    pub content: serde_json::Value,
    pub samples: BTreeSet<i64>,
}

pub trait AnalysisTask: Send + Sync {
    fn kind(&self) -> &'static str;
    fn analyze(&self, conn: &Connection, now: i64) -> Result<TaskOutput, Error>;
}

pub struct Analyzer {
    tasks: Vec<Box<dyn AnalysisTask>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            tasks: vec![
                Box::new(SimpleLinkStatistics),
                Box::new(LinkReliabilityStatistics),
                Box::new(LinkImprovementAnalysis),
                Box::new(SimpleServiceUsage),
                Box::new(ServiceStatistics),
                Box::new(TopologyCentrality),
                Box::new(PathSplitRecommendations),
            ],
        }
    }

    /// Run one task by name, or every task for "all".
    pub fn run(&self, conn: &mut Connection, which: &str) -> Result<(), Error> {
        if which == "all" {
            for task in &self.tasks {
                run_task(conn, task.as_ref())?;
            }
            return Ok(());
        }
        let task = self
            .tasks
            .iter()
            .find(|t| t.kind() == which)
            .ok_or_else(|| Error::UnknownTask(which.to_string()))?;
        run_task(conn, task.as_ref())
    }
}

fn run_task(conn: &mut Connection, task: &dyn AnalysisTask) -> Result<(), Error> {
    let clock = Instant::now();
    let now = store::now_ms();
    tracing::info!("started {} at {}", task.kind(), store::iso(now));

    let output = task.analyze(conn, now)?;

    let intervals = store::sample_intervals_for(conn, &output.samples)?;
    let sample_interval = match intervals.as_slice() {
        [only] => Some(*only),
        _ => None,
    };

    let execution_duration = clock.elapsed().as_secs_f64();
    store::insert_report(
        conn,
        &store::NewReport {
            created: store::now_ms(),
            report_type: task.kind(),
            sample_interval,
            sample_start: output.samples.first().copied(),
            sample_stop: output.samples.last().copied(),
            sample_count: output.samples.len() as i64,
            execution_duration,
            content: &serde_json::to_string(&output.content)?,
        },
    )?;

    tracing::info!(
        "completed {}; took {:.3} seconds",
        task.kind(),
        execution_duration
    );
    Ok(())
}

/// Mean of a sample; `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Corrected sample standard deviation; `None` below two observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
