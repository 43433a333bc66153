//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the device's peripherals: the serial
//!     pH/temperature probe, the TDS analog input and the network link.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": The device should compile on Windows/Mac/Linux.
//!     - "Zero Cost": On the Pi, this compiles down to direct `rppal` calls.
//!     - "Bounded": every blocking call carries its own timeout.
//!
//! relationships:
//!     - used by: acquisition.rs (probe + adc), device.rs (network link)
//!     - uses: rppal (on feature="hardware")
//!     - uses: system.rs (nmcli / timedatectl subprocesses for the link)
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DeviceConfig;

/// serial-attached probe speaking a line-based command/response protocol
pub trait ProbePort: Send {
    /// send one command; the implementation appends the `\r` terminator
    fn send_command(&mut self, command: &str) -> Result<()>;
    /// wait up to `timeout` for one `\r`-terminated line; `None` on timeout
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;
}

/// analog input wired to the TDS sensor
pub trait AnalogInput: Send {
    fn sample(&mut self) -> Result<u16>;
}

/// Wi-Fi association and clock state of the host
pub trait NetworkLink: Send + Sync {
    fn is_up(&self) -> bool;
    fn join(&self, ssid: &str, password: &str) -> Result<()>;
    fn clock_synced(&self) -> bool;
}

/// the device's peripherals, opened once at startup
pub struct Peripherals {
    pub probe: Box<dyn ProbePort>,
    pub adc: Box<dyn AnalogInput>,
    pub link: Arc<dyn NetworkLink>,
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
mod mock {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// answers `R` with a pH around 7.2 and `RT` with a temperature around 26 °C
    pub struct MockProbe {
        pending: Option<String>,
    }

    impl ProbePort for MockProbe {
        fn send_command(&mut self, command: &str) -> Result<()> {
            let mut rng = rand::thread_rng();
            self.pending = match command {
                "R" => Some(format!("{:.2}", 7.2 + rng.gen_range(-0.05..=0.05))),
                "RT" => Some(format!("{:.1}", 26.0 + rng.gen_range(-0.2..=0.2))),
                _ => Some("*ER".to_string()),
            };
            tracing::debug!("[MOCK PROBE] {} -> {:?}", command, self.pending);
            Ok(())
        }

        fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>> {
            Ok(self.pending.take())
        }
    }

    /// raw counts around 1000 (roughly 300 ppm at 25 °C)
    pub struct MockAdc;

    impl AnalogInput for MockAdc {
        fn sample(&mut self) -> Result<u16> {
            Ok(1000 + rand::thread_rng().gen_range(0..20))
        }
    }

    pub struct MockLink {
        up: AtomicBool,
    }

    impl NetworkLink for MockLink {
        fn is_up(&self) -> bool {
            self.up.load(Ordering::SeqCst)
        }

        fn join(&self, ssid: &str, _password: &str) -> Result<()> {
            tracing::debug!("[MOCK LINK] Joined {}", ssid);
            self.up.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn clock_synced(&self) -> bool {
            true
        }
    }

    pub fn open(_config: &DeviceConfig) -> Result<Peripherals> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Peripherals {
            probe: Box::new(MockProbe { pending: None }),
            adc: Box::new(MockAdc),
            link: Arc::new(MockLink { up: AtomicBool::new(false) }),
        })
    }
}

#[cfg(not(feature = "hardware"))]
pub use mock::open;

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
mod real {
    use super::*;
    use anyhow::Context;
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
    use rppal::uart::{Parity, Uart};
    use std::time::Instant;

    use crate::system;

    /// Atlas EZO-style probe on a UART
    pub struct UartProbe {
        uart: Uart,
    }

    impl ProbePort for UartProbe {
        fn send_command(&mut self, command: &str) -> Result<()> {
            // stale bytes from an earlier timed-out reply would shift every answer by one
            self.uart.flush(rppal::uart::Queue::Input)?;
            let framed = format!("{}\r", command);
            self.uart.write(framed.as_bytes())?;
            Ok(())
        }

        fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
            let deadline = Instant::now() + timeout;
            let mut line = Vec::new();
            let mut byte = [0u8; 1];

            while Instant::now() < deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.uart.set_read_mode(0, remaining)?;
                if self.uart.read(&mut byte)? == 0 {
                    break;
                }
                if byte[0] == b'\r' {
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                line.push(byte[0]);
            }
            Ok(None)
        }
    }

    /// MCP3208 12-bit ADC on SPI0
    pub struct Mcp3208 {
        spi: Spi,
        channel: u8,
    }

    impl AnalogInput for Mcp3208 {
        fn sample(&mut self) -> Result<u16> {
            let ch = self.channel & 0x07;
            let tx = [0x06 | (ch >> 2), (ch & 0x03) << 6, 0x00];
            let mut rx = [0u8; 3];
            self.spi.transfer(&mut rx, &tx)?;
            Ok((u16::from(rx[1] & 0x0F) << 8) | u16::from(rx[2]))
        }
    }

    /// NetworkManager-managed Wi-Fi
    pub struct NmcliLink;

    impl NetworkLink for NmcliLink {
        fn is_up(&self) -> bool {
            system::wifi_connected()
        }

        fn join(&self, ssid: &str, password: &str) -> Result<()> {
            system::wifi_connect(ssid, password)
        }

        fn clock_synced(&self) -> bool {
            system::clock_synchronized()
        }
    }

    pub fn open(config: &DeviceConfig) -> Result<Peripherals> {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");

        let uart = Uart::with_path(&config.probe.serial_path, config.probe.baud_rate, Parity::None, 8, 1)
            .with_context(|| format!("failed to open probe UART {}", config.probe.serial_path))?;
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)
            .context("failed to open SPI0 for the TDS ADC")?;

        Ok(Peripherals {
            probe: Box::new(UartProbe { uart }),
            adc: Box::new(Mcp3208 { spi, channel: config.adc.spi_channel }),
            link: Arc::new(NmcliLink),
        })
    }
}

#[cfg(feature = "hardware")]
pub use real::open;
