//! The tick scheduler.
//!
//! Per tick: all sensor prepares run concurrently with a per-sensor
//! deadline, then the applies run serially in catalogue order (each in
//! its own transaction), then the augmentors, then the tick's
//! SampleTimestamp. A failed or timed-out prepare drops the whole tick:
//! nothing is applied and no timestamp is written, so a tick is either
//! absent or self-consistent.

use std::sync::Arc;
use std::time::Duration;

use crate::augment;
use crate::database::DbConnection;
use crate::error::Error;
use crate::sensors::Sensor;
use crate::state::ProgramState;
use crate::store;

pub const PREPARE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Observer {
    db: DbConnection,
    sensors: Vec<Box<dyn Sensor>>,
    poll_interval: u64,
}

impl Observer {
    pub fn new(db: DbConnection, sensors: Vec<Box<dyn Sensor>>, poll_interval: u64) -> Self {
        Self {
            db,
            sensors,
            poll_interval,
        }
    }

    pub async fn observe(&mut self, single: bool, state: Arc<ProgramState>) -> Result<(), Error> {
        if single {
            return self.tick(&state).await;
        }
        loop {
            let started = store::now_ms();
            self.tick(&state).await?;

            let next_run = started + self.poll_interval as i64 * 1000;
            let wait = (((next_run - store::now_ms()) as f64 / 1000.0).floor()).max(0.0) as u64;
            tracing::info!("waiting {wait} seconds till next run");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    async fn tick(&mut self, state: &ProgramState) -> Result<(), Error> {
        let started = store::now_ms();
        tracing::info!("start preparing at {}", store::iso(started));

        let prepared = self.prepare_all().await;
        state.set_healthy(prepared);
        if !prepared {
            tracing::warn!("some sensors failed to prepare; dropping this tick");
            return Ok(());
        }
        tracing::info!("completed preparing");

        let mut conn = self.db.lock().await;
        for sensor in &self.sensors {
            let tx = conn.transaction()?;
            let applied = sensor
                .apply(&tx, started)
                .and_then(|()| tx.commit().map_err(Error::from));
            if let Err(e) = applied {
                // rolled back on drop; the tick goes on with partial data
                tracing::error!("sensor {} failed to apply: {e}", sensor.name());
            }
        }
        tracing::info!("completed executing at {}", store::iso(store::now_ms()));

        augment::augment_centrality(&mut conn, started)?;

        store::insert_sample_timestamp(&conn, started, Some(self.poll_interval as f64))?;
        tracing::info!("completed postprocessing at {}", store::iso(store::now_ms()));
        Ok(())
    }

    /// Run every sensor's prepare concurrently, each against its own
    /// deadline. Any failure or timeout marks the tick unhealthy.
    async fn prepare_all(&mut self) -> bool {
        let prepares = self.sensors.iter_mut().map(|sensor| async move {
            let name = sensor.name();
            let url = sensor.path();
            match tokio::time::timeout(PREPARE_TIMEOUT, sensor.prepare()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!("requesting {url} failed: {e}");
                    false
                }
                Err(_) => {
                    tracing::warn!("sensor {name} timed out while preparing");
                    false
                }
            }
        });
        futures::future::join_all(prepares)
            .await
            .into_iter()
            .all(|ok| ok)
    }
}
