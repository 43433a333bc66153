//! publisher.rs - stamps a reading into a MetricsRecord and hands it to the transport
//!
//! the caller checks connectivity first; nothing here retries or reconnects.

use crate::domain::{MetricsRecord, Reading};

/// what the publisher needs from the message transport
pub trait Transport {
    fn is_connected(&self) -> bool;
    /// true when the transport accepted the message
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;
}

pub struct MetricsPublisher {
    topic: String,
    device_id: String,
}

impl MetricsPublisher {
    pub fn new(topic: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self { topic: topic.into(), device_id: device_id.into() }
    }

    pub fn build(&self, reading: &Reading, timestamp_secs: u64) -> MetricsRecord {
        MetricsRecord::new(reading, timestamp_secs, &self.device_id)
    }

    /// build the record and publish it once; the result only reflects the transport
    pub fn build_and_publish<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        reading: &Reading,
        timestamp_secs: u64,
    ) -> (MetricsRecord, bool) {
        let record = self.build(reading, timestamp_secs);
        let payload = match record.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("[MQTT] Failed to encode record: {}", e);
                return (record, false);
            }
        };
        let accepted = transport.publish(&self.topic, &payload);

        if accepted {
            tracing::info!(topic = %self.topic, "[MQTT] Published {}", String::from_utf8_lossy(&payload));
        } else {
            tracing::error!(topic = %self.topic, "[MQTT] Publish rejected by transport");
        }
        (record, accepted)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::trend::Trend;

    /// keeps every published message; `accept` decides the publish result
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub connected: bool,
        pub accept: bool,
        pub sent: Vec<(String, Vec<u8>)>,
    }

    impl RecordingTransport {
        pub fn online() -> Self {
            Self { connected: true, accept: true, sent: Vec::new() }
        }
    }

    impl Transport for RecordingTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
            self.sent.push((topic.to_string(), payload.to_vec()));
            self.accept
        }
    }

    fn reading() -> Reading {
        Reading { ph: 7.2, temperature_c: 26.1, tds_ppm: 480.0, trend: Trend::Stable }
    }

    #[test]
    fn test_publishes_once_to_topic() {
        let publisher = MetricsPublisher::new("pool/metrics", "X");
        let mut transport = RecordingTransport::online();

        let (record, ok) = publisher.build_and_publish(&mut transport, &reading(), 120);

        assert!(ok);
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].0, "pool/metrics");
        assert_eq!(transport.sent[0].1, record.to_payload().unwrap());
        assert_eq!(record.device_id, "X");
        assert_eq!(record.timestamp, 120);
    }

    #[test]
    fn test_failure_reflects_transport_only() {
        let publisher = MetricsPublisher::new("pool/metrics", "X");
        let mut transport = RecordingTransport { connected: true, accept: false, sent: Vec::new() };

        let (record, ok) = publisher.build_and_publish(&mut transport, &reading(), 1);

        assert!(!ok);
        assert_eq!(record.tds_ppm, 480);
        assert_eq!(transport.sent.len(), 1);
    }
}
