//! ==============================================================================
//! device.rs - the acquisition + publish cycle
//! ==============================================================================
//!
//! purpose:
//!     ties a data source (synthetic generator or filtered sensor acquisition)
//!     to the metrics publisher and gates it on the publish interval. also holds
//!     the bounded waits the control loop needs before its first cycle: joining
//!     the network and waiting for the wall clock.
//!
//! relationships:
//!     - used by: main.rs (control loop)
//!     - uses: simulator.rs / acquisition.rs (data), publisher.rs (wire),
//!             retry.rs (bounded waits), hal.rs (NetworkLink)
//!
//! cycle:
//!     due? ─no─> nothing
//!      │yes
//!     acquire
//!      │
//!     connected? ─no─> skip publish (logged), the interval restarts
//!      │yes
//!     build record ─> publish once
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::acquisition::SensorAcquisition;
use crate::domain::{Credentials, MetricsRecord, Reading};
use crate::hal::NetworkLink;
use crate::publisher::{MetricsPublisher, Transport};
use crate::retry::{retry_bounded, RetryPolicy};
use crate::simulator::{Jitter, SyntheticGenerator};
use crate::trend::Trend;

/// where readings come from
pub enum Pipeline {
    Synthetic(SyntheticGenerator<Box<dyn Jitter + Send>>),
    Sensor {
        acquisition: SensorAcquisition,
        /// pH of the previous report, for the trend
        last_reported_ph: Option<f64>,
    },
}

impl Pipeline {
    pub fn synthetic(jitter: Box<dyn Jitter + Send>) -> Self {
        Pipeline::Synthetic(SyntheticGenerator::new(jitter))
    }

    pub fn sensor(acquisition: SensorAcquisition) -> Self {
        Pipeline::Sensor { acquisition, last_reported_ph: None }
    }

    /// one tick of the data source
    pub fn acquire(&mut self) -> Reading {
        match self {
            Pipeline::Synthetic(generator) => {
                let tick = generator.advance();
                tracing::debug!(
                    angle = generator.state().angle,
                    reads = generator.state().reads,
                    ph = tick.ph,
                    temperature_c = tick.temperature_c,
                    tds_ppm = tick.tds_ppm,
                    "[SIM] tick"
                );
                generator.report()
            }
            Pipeline::Sensor { acquisition, last_reported_ph } => {
                let ph = acquisition.read_ph();
                let temperature_c = acquisition.read_temperature();
                // TDS compensation uses the temperature just read
                let tds_ppm = acquisition.read_tds();

                let trend = last_reported_ph.map_or(Trend::Stable, |last| Trend::from_delta(ph - last));
                *last_reported_ph = Some(ph);

                Reading { ph, temperature_c, tds_ppm, trend }
            }
        }
    }
}

pub struct Device {
    pipeline: Pipeline,
    publisher: MetricsPublisher,
    started: Instant,
    interval: Duration,
    last_cycle: Option<Instant>,
}

impl Device {
    pub fn new(pipeline: Pipeline, publisher: MetricsPublisher, interval: Duration, started: Instant) -> Self {
        Self { pipeline, publisher, started, interval, last_cycle: None }
    }

    /// the first cycle is due immediately, then every `interval`
    pub fn cycle_due(&self, now: Instant) -> bool {
        self.last_cycle
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Run one acquisition + publish cycle.
    ///
    /// Returns the record when the transport accepted it. The data source
    /// ticks on every due cycle; a disconnected transport only skips the publish.
    pub fn run_cycle<T: Transport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> Option<MetricsRecord> {
        self.last_cycle = Some(now);
        let reading = self.pipeline.acquire();

        if !transport.is_connected() {
            tracing::warn!("[CYCLE] Broker not connected, skipping publish");
            return None;
        }

        let timestamp = now.saturating_duration_since(self.started).as_secs();
        let (record, accepted) = self.publisher.build_and_publish(transport, &reading, timestamp);

        accepted.then_some(record)
    }
}

/// Join the network with bounded retries. Link calls block, so they run off the runtime.
pub async fn join_network(link: &Arc<dyn NetworkLink>, credentials: &Credentials, policy: &RetryPolicy) -> Result<()> {
    tracing::info!(ssid = %credentials.ssid, "[NET] Joining network");

    retry_bounded(policy, "network join", |attempt| {
        let link = link.clone();
        let ssid = credentials.ssid.clone();
        let password = credentials.password.clone();
        async move {
            tracing::debug!(attempt, "[NET] join attempt");
            tokio::task::spawn_blocking(move || link.join(&ssid, &password)).await?
        }
    })
    .await?;

    tracing::info!("[NET] Network up");
    Ok(())
}

/// Wait for the wall clock; true once synchronised, false when the budget ran out.
pub async fn wait_for_clock(link: &Arc<dyn NetworkLink>, policy: &RetryPolicy) -> bool {
    let outcome = retry_bounded(policy, "clock sync", |_| {
        let link = link.clone();
        async move {
            if tokio::task::spawn_blocking(move || link.clock_synced()).await? {
                Ok(())
            } else {
                Err(anyhow::anyhow!("clock not synchronised yet"))
            }
        }
    })
    .await;

    match outcome {
        Ok(()) => {
            tracing::info!("[TIME] Clock synchronised");
            true
        }
        Err(e) => {
            tracing::warn!("[TIME] {:#}", e);
            false
        }
    }
}
