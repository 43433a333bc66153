//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `device.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - DeviceSection: identity (device id) and pipeline mode.
//!     - PollingConfig: publish interval and control-loop tick.
//!     - MqttConfig: broker address, topic, optional TLS material paths.
//!     - ProbeConfig / AdcConfig: serial probe and TDS analog front end.
//!     - PortalConfig / NetworkConfig: web form binding and pre-seeded credentials.
//!     - RetryConfig: bounded retry budgets for link, broker and clock sync.
//!
//! ==============================================================================

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::window::WarmupPolicy;

/// Which pipeline feeds the publisher
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// sinusoidal readings, TLS broker
    Synthetic,
    /// real probe + ADC, plain broker
    Sensor,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Synthetic => write!(f, "synthetic"),
            Mode::Sensor => write!(f, "sensor"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub adc: AdcConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceSection {
    pub id: String,
    pub mode: Mode,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    /// falls back to the per-mode default when omitted
    pub interval_seconds: Option<u64>,
    pub loop_tick_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub retain: bool,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsPaths {
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    pub serial_path: String,
    pub baud_rate: u32,
    pub response_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdcConfig {
    pub spi_channel: u8,
    pub vref: f64,
    pub full_scale: u16,
    pub window: usize,
    pub warmup: WarmupPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PortalConfig {
    pub bind: String,
    pub ap_ssid: String,
}

/// Credentials pre-seeded in the file instead of the web form
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NetworkConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub broker: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub network_attempts: u32,
    pub network_delay_ms: u64,
    pub broker_attempts: u32,
    pub broker_delay_ms: u64,
    pub cooldown_secs: u64,
    pub clock_sync_attempts: u32,
    pub clock_sync_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

fn default_loop_tick_ms() -> u64 {
    100
}

fn default_topic() -> String {
    "pool/metrics".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: None, loop_tick_ms: default_loop_tick_ms() }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: default_topic(),
            client_id: None,
            keep_alive_secs: default_keep_alive(),
            retain: false,
            tls: None,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            serial_path: "/dev/serial0".to_string(),
            baud_rate: 9600,
            response_timeout_ms: 1000,
        }
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            spi_channel: 0,
            vref: 3.3,
            full_scale: 4095,
            window: 30,
            warmup: WarmupPolicy::default(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            ap_ssid: "ESP32_Config".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_attempts: 20,
            network_delay_ms: 500,
            broker_attempts: 5,
            broker_delay_ms: 2000,
            cooldown_secs: 30,
            clock_sync_attempts: 30,
            clock_sync_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl RetryConfig {
    pub fn network_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.network_attempts, Duration::from_millis(self.network_delay_ms))
    }

    pub fn broker_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.broker_attempts, Duration::from_millis(self.broker_delay_ms))
            .with_cooldown(Duration::from_secs(self.cooldown_secs))
    }

    pub fn clock_sync_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.clock_sync_attempts, Duration::from_millis(self.clock_sync_delay_ms))
    }
}

impl DeviceConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: DeviceConfig = toml::from_str(&content).context("Failed to parse config")?;
        config.validate()?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("device.toml"),
            PathBuf::from("..").join("config").join("device.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.device.id.trim().is_empty() {
            bail!("device.id must not be empty");
        }
        if self.mqtt.topic.trim().is_empty() {
            bail!("mqtt.topic must not be empty");
        }
        if self.polling.interval_seconds == Some(0) {
            bail!("polling.interval_seconds must be at least 1");
        }
        if self.adc.window == 0 {
            bail!("adc.window must be at least 1");
        }
        if !(self.adc.vref > 0.0) {
            bail!("adc.vref must be positive");
        }
        if self.adc.full_scale == 0 {
            bail!("adc.full_scale must be non-zero");
        }
        Ok(())
    }

    /// Publish period: 60s for synthetic mode, 5s for sensor mode unless overridden
    pub fn publish_interval(&self) -> Duration {
        let default = match self.device.mode {
            Mode::Synthetic => 60,
            Mode::Sensor => 5,
        };
        Duration::from_secs(self.polling.interval_seconds.unwrap_or(default))
    }

    pub fn loop_tick(&self) -> Duration {
        Duration::from_millis(self.polling.loop_tick_ms.max(1))
    }

    pub fn client_id(&self) -> &str {
        self.mqtt.client_id.as_deref().unwrap_or(&self.device.id)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          DEVICE CONFIGURATION           │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Device ID: {}", self.device.id);
        println!("│ Mode: {}", self.device.mode);
        println!("│ Publish Interval: {}s", self.publish_interval().as_secs());
        println!("│ Broker: {}:{} ({})", self.mqtt.host, self.mqtt.port,
                 if self.mqtt.tls.is_some() { "TLS" } else { "plain" });
        println!("│ Topic: {}", self.mqtt.topic);
        println!("│ Portal: http://{}", self.portal.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: DeviceSection { id: "ESP32_Pileta".to_string(), mode: Mode::Sensor },
            polling: PollingConfig::default(),
            mqtt: MqttConfig::default(),
            probe: ProbeConfig::default(),
            adc: AdcConfig::default(),
            portal: PortalConfig::default(),
            network: NetworkConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
