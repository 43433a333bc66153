use serde::Serialize;

use crate::trend::Trend;

/// one acquisition cycle's values, before they are stamped and published
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub ph: f64,
    pub temperature_c: f64,
    pub tds_ppm: f64,
    pub trend: Trend,
}

/// the record published per cycle
/// built fresh every time, never mutated afterwards
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsRecord {
    pub ph: f64,
    pub temperature_c: f64,
    pub tds_ppm: i64,
    pub trend: Trend,
    pub trend_value: i8,
    /// seconds since the device started
    pub timestamp: u64,
    pub device_id: String,
}

impl MetricsRecord {
    pub fn new(reading: &Reading, timestamp: u64, device_id: &str) -> Self {
        Self {
            ph: round_to(reading.ph, 2),
            temperature_c: round_to(reading.temperature_c, 2),
            tds_ppm: reading.tds_ppm.round() as i64,
            trend: reading.trend,
            trend_value: reading.trend.value(),
            timestamp,
            device_id: device_id.to_string(),
        }
    }

    /// JSON payload for the wire
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// network and broker credentials entered through the portal
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
    pub broker_host: String,
    pub broker_port: u16,
}

// keep the password out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &format_args!("<{} chars>", self.password.chars().count()))
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .finish()
    }
}

/// state shared between the control loop and the portal
#[derive(Clone, Default)]
pub struct AppState {
    pub credentials: Option<Credentials>,
    /// false when TLS material is required but failed to load
    pub certificates_ready: bool,
    /// last record handed to the transport
    pub last_published: Option<MetricsRecord>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_seven_fields() {
        let reading = Reading { ph: 7.2, temperature_c: 26.1, tds_ppm: 480.0, trend: Trend::Stable };
        let record = MetricsRecord::new(&reading, 120, "X");

        let value: serde_json::Value = serde_json::from_slice(&record.to_payload().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 7);
        assert_eq!(value["ph"], 7.2);
        assert_eq!(value["temperature_c"], 26.1);
        assert_eq!(value["tds_ppm"], 480);
        assert_eq!(value["trend"], "estable");
        assert_eq!(value["trend_value"], 0);
        assert_eq!(value["timestamp"], 120);
        assert_eq!(value["device_id"], "X");
    }

    #[test]
    fn test_payload_rounds_and_labels_trend() {
        let reading = Reading { ph: 7.456, temperature_c: 24.999, tds_ppm: 512.6, trend: Trend::Falling };
        let record = MetricsRecord::new(&reading, 5, "pool");

        let value: serde_json::Value = serde_json::from_slice(&record.to_payload().unwrap()).unwrap();
        assert_eq!(value["ph"], 7.46);
        assert_eq!(value["temperature_c"], 25.0);
        assert_eq!(value["tds_ppm"], 513);
        assert_eq!(value["trend"], Trend::Falling.label());
        assert_eq!(value["trend_value"], -1);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            ssid: "pool-net".into(),
            password: "supersecret".into(),
            broker_host: "192.168.1.100".into(),
            broker_port: 1883,
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("<11 chars>"));
    }
}
