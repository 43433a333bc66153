//! ==============================================================================
//! main.rs - pool monitor entry point
//! ==============================================================================
//!
//! purpose:
//!     runs one pool-monitor device. depending on `device.mode` it publishes
//!     synthetic readings to a TLS broker or filtered probe readings to a
//!     local plain broker.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - open the peripherals (mock or rppal, see hal.rs)
//!     - load TLS material when the broker needs it
//!     - serve the configuration portal and wait for credentials
//!     - join the network, wait for the clock, start the MQTT transport
//!     - run the acquisition + publish cycle on the configured interval
//!
//! relationships:
//!     - uses: config.rs, hal.rs, tls.rs, portal.rs, device.rs, mqtt.rs
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     control loop (this file)                  │
//!     │                                                              │
//!     │  wait for credentials ─> join network ─> clock ─> broker     │
//!     │                                                  │           │
//!     │            ┌─────────── every tick ──────────────┘           │
//!     │            ▼                                                 │
//!     │   cycle due? ─> link up? ─> device.run_cycle() ─> state      │
//!     └──────┬──────────────────────────────┬────────────────────────┘
//!            │ Arc<RwLock<AppState>>        │ Transport
//!     ┌──────┴──────┐               ┌───────┴────────┐
//!     │   portal    │               │ mqtt event task │
//!     │ (axum task) │               │   (rumqttc)     │
//!     └─────────────┘               └────────────────┘
//!
//! ==============================================================================

mod acquisition;
mod config;
mod device;
mod domain;
mod hal;
mod mqtt;
mod portal;
mod publisher;
mod retry;
mod simulator;
mod system;
mod tls;
mod trend;
mod window;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use acquisition::{SensorAcquisition, SensorFilterState, TdsCalibration};
use config::{DeviceConfig, Mode};
use device::{Device, Pipeline};
use domain::AppState;
use mqtt::{BrokerSettings, MqttTransport};
use portal::PortalState;
use publisher::MetricsPublisher;
use retry::{Reconnector, RetryPolicy};
use simulator::RandomJitter;
use window::SampleWindow;

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();

    // startup banner
    println!("===========================================================");
    println!("  Pool Monitor");
    println!("  pH / temperature / TDS over MQTT");
    println!("===========================================================");

    // step 1: load configuration (an explicit path must load)
    let config = match std::env::args().nth(1) {
        Some(path) => DeviceConfig::load(&path)?,
        None => DeviceConfig::load_or_default(),
    };
    init_tracing(&config.logging.level);
    config.print_summary();

    // step 2: peripherals
    let peripherals = hal::open(&config).context("failed to open peripherals")?;
    let link = peripherals.link.clone();

    // step 3: certificates, only when the broker is TLS
    let tls_material = match &config.mqtt.tls {
        Some(paths) => match tls::load_certificates(paths) {
            Ok(material) => Some(material),
            Err(e) => {
                tracing::error!("[TLS] Certificate setup failed: {:#}", e);
                None
            }
        },
        None => None,
    };
    let certificates_ready = config.mqtt.tls.is_none() || tls_material.is_some();

    // step 4: shared state, pre-seeded credentials skip the form
    let state = Arc::new(RwLock::new(AppState { certificates_ready, ..AppState::default() }));
    match portal::preseeded_credentials(&config) {
        Some(Ok(credentials)) if certificates_ready => {
            tracing::info!(ssid = %credentials.ssid, "[CONFIG] Using credentials from config file");
            state.write().await.credentials = Some(credentials);
        }
        Some(Ok(_)) => tracing::warn!("[CONFIG] Ignoring file credentials: certificates not configured"),
        Some(Err(e)) => tracing::warn!("[CONFIG] Ignoring file credentials: {}", e),
        None => {}
    }

    // step 5: configuration portal in background
    let portal_state = PortalState {
        shared: state.clone(),
        mode: config.device.mode,
        mqtt: config.mqtt.clone(),
    };
    let bind = config.portal.bind.clone();
    let portal_task = tokio::spawn(async move { portal::run_server(&bind, portal_state).await });
    if !config.portal.ap_ssid.is_empty() {
        tracing::info!("[PORTAL] Join access point {} to configure", config.portal.ap_ssid);
    }

    // step 6: wait for credentials
    let credentials = loop {
        if let Some(credentials) = state.read().await.credentials.clone() {
            break credentials;
        }
        if portal_task.is_finished() {
            return match portal_task.await {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(anyhow!("portal stopped before credentials were saved")),
                Err(e) => Err(anyhow!("portal task failed: {}", e)),
            };
        }
        tokio::time::sleep(config.loop_tick()).await;
    };

    // step 7: network, then the clock for TLS
    let network_policy = config.retry.network_policy();
    if let Err(e) = device::join_network(&link, &credentials, &network_policy).await {
        tracing::error!("[NET] {:#}", e);
    }
    if tls_material.is_some() {
        device::wait_for_clock(&link, &config.retry.clock_sync_policy()).await;
    }

    // step 8: broker transport
    let mut transport = MqttTransport::start(
        BrokerSettings {
            client_id: config.client_id().to_string(),
            host: credentials.broker_host.clone(),
            port: credentials.broker_port,
            keep_alive: Duration::from_secs(config.mqtt.keep_alive_secs),
            retain: config.mqtt.retain,
            tls: tls_material,
        },
        config.retry.broker_policy(),
    );

    // step 9: data source
    let pipeline = match config.device.mode {
        Mode::Synthetic => Pipeline::synthetic(Box::new(RandomJitter::from_entropy())),
        Mode::Sensor => Pipeline::sensor(
            SensorAcquisition::new(
                peripherals.probe,
                peripherals.adc,
                SensorFilterState::new(SampleWindow::new(config.adc.window, config.adc.warmup)),
                TdsCalibration::from(&config.adc),
                Duration::from_millis(config.probe.response_timeout_ms),
            )
            .show_data(config.logging.show_sensor_data),
        ),
    };
    let mut device = Device::new(
        pipeline,
        MetricsPublisher::new(config.mqtt.topic.as_str(), config.device.id.as_str()),
        config.publish_interval(),
        started,
    );

    // step 10: control loop
    tracing::info!(
        "[RUNTIME] Publishing to {} every {}s",
        config.mqtt.topic,
        config.publish_interval().as_secs()
    );
    println!("────────────────────────────────────────────────────────────");

    // one failed join burst holds further attempts off for the cooldown
    let mut link_gate = Reconnector::new(
        RetryPolicy::new(1, Duration::ZERO).with_cooldown(Duration::from_secs(config.retry.cooldown_secs)),
    );
    let mut ticker = tokio::time::interval(config.loop_tick());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                if !device.cycle_due(now) {
                    continue;
                }

                let probe = link.clone();
                let link_up = tokio::task::spawn_blocking(move || probe.is_up()).await.unwrap_or(false);
                if !link_up && link_gate.ready(now) {
                    tracing::warn!("[NET] Link down, rejoining");
                    match device::join_network(&link, &credentials, &network_policy).await {
                        Ok(()) => link_gate.record_success(),
                        Err(e) => {
                            let wait = link_gate.record_failure(Instant::now());
                            tracing::error!("[NET] {:#} (next attempt in {:?})", e, wait);
                        }
                    }
                }

                // probe reads block up to their timeout
                let record = tokio::task::block_in_place(|| device.run_cycle(&mut transport, now));
                if let Some(record) = record {
                    state.write().await.last_published = Some(record);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("[RUNTIME] Shutting down");
                break;
            }
        }
    }

    portal_task.abort();
    Ok(())
}

/// `RUST_LOG` wins; otherwise the level from the config file
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
