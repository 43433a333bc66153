//! ==============================================================================
//! mqtt.rs - rumqttc-backed transport for the metrics publisher
//! ==============================================================================
//!
//! purpose:
//!     owns the MQTT client and drives its event loop on a background task.
//!     the control loop only sees the `Transport` trait: a connected flag and
//!     a fire-and-forget QoS 0 publish.
//!
//! connection handling:
//!     rumqttc reconnects on the next poll after an error. the event task paces
//!     those attempts with a `Reconnector`: `delay` between failed attempts and
//!     a `cooldown` hold-off once `max_attempts` in a row have failed.
//!
//! ==============================================================================

use rumqttc::{
    AsyncClient, ConnectionError, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport as Wire,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::publisher::Transport;
use crate::retry::{Reconnector, RetryPolicy};
use crate::tls::TlsMaterial;

const REQUEST_CAPACITY: usize = 10;

/// everything needed to reach one broker
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub retain: bool,
    pub tls: Option<TlsMaterial>,
}

impl BrokerSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);

        if let Some(tls) = &self.tls {
            options.set_transport(Wire::tls_with_config(TlsConfiguration::Simple {
                ca: tls.ca.clone(),
                alpn: None,
                client_auth: Some((tls.client_cert.clone(), tls.client_key.clone())),
            }));
        }
        options
    }
}

pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    retain: bool,
    event_task: JoinHandle<()>,
}

impl MqttTransport {
    /// create the client and spawn its event loop; must run inside a tokio runtime
    pub fn start(settings: BrokerSettings, policy: RetryPolicy) -> Self {
        tracing::info!(
            "[MQTT] Connecting to {}:{} as {} ({})",
            settings.host,
            settings.port,
            settings.client_id,
            if settings.tls.is_some() { "TLS" } else { "plain" }
        );

        let (client, mut eventloop) = AsyncClient::new(settings.options(), REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let flag = connected.clone();
        let event_task = tokio::spawn(async move {
            let mut reconnector = Reconnector::new(policy);
            loop {
                let event = eventloop.poll().await;
                if let Some(wait) = track_connection(&flag, &mut reconnector, &event, Instant::now()) {
                    tokio::time::sleep(wait).await;
                }
            }
        });

        Self { client, connected, retain: settings.retain, event_task }
    }
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        match self.client.try_publish(topic, QoS::AtMostOnce, self.retain, payload.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[MQTT] Publish not queued: {}", e);
                false
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

/// update the connected flag from one event loop result;
/// returns how long to wait before polling again after a failure
fn track_connection(
    connected: &AtomicBool,
    reconnector: &mut Reconnector,
    event: &Result<Event, ConnectionError>,
    now: Instant,
) -> Option<Duration> {
    match event {
        Ok(Event::Incoming(Packet::ConnAck(_))) => {
            tracing::info!("[MQTT] Connected");
            connected.store(true, Ordering::SeqCst);
            reconnector.record_success();
            None
        }
        Ok(Event::Incoming(Packet::Disconnect)) => {
            tracing::warn!("[MQTT] Broker closed the session");
            connected.store(false, Ordering::SeqCst);
            None
        }
        Ok(_) => None,
        Err(e) => {
            connected.store(false, Ordering::SeqCst);
            let wait = reconnector.record_failure(now);
            tracing::error!("[MQTT] Connection error: {} (retrying in {:?})", e, wait);
            Some(wait)
        }
    }
}
