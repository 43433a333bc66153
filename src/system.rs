//! ==============================================================================
//! system.rs - host capability helpers for the network link and clock
//! ==============================================================================
//!
//! purpose:
//!     wraps the host's own tooling for the two things the device cannot do
//!     through a peripheral: joining a Wi-Fi network and knowing whether the
//!     wall clock has been synchronised (TLS certificate validation needs it).
//!
//! relationships:
//!     - used by: hal.rs (NmcliLink, feature="hardware")
//!     - uses: nmcli (NetworkManager), timedatectl (systemd-timesyncd)
//!
//! why subprocess?:
//!     NetworkManager and timesyncd own this state on the Pi; their CLIs are
//!     the stable interface and keep the device free of D-Bus plumbing.
//!
//! ==============================================================================

#![cfg_attr(not(feature = "hardware"), allow(dead_code))]

use anyhow::{anyhow, Result};
use std::process::Command;

/// associate with a Wi-Fi network via NetworkManager
pub fn wifi_connect(ssid: &str, password: &str) -> Result<()> {
    let output = Command::new("nmcli")
        .args(["device", "wifi", "connect", ssid, "password", password])
        .output()
        .map_err(|e| anyhow!("Failed to run nmcli: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("nmcli error: {}", stderr.trim()));
    }
    Ok(())
}

/// true when NetworkManager reports full connectivity
pub fn wifi_connected() -> bool {
    Command::new("nmcli")
        .args(["-t", "-f", "STATE", "general"])
        .output()
        .map(|o| parse_nm_state(&String::from_utf8_lossy(&o.stdout)))
        .unwrap_or(false)
}

/// true once timesyncd has synchronised the system clock
pub fn clock_synchronized() -> bool {
    Command::new("timedatectl")
        .args(["show", "-p", "NTPSynchronized", "--value"])
        .output()
        .map(|o| parse_yes_no(&String::from_utf8_lossy(&o.stdout)))
        .unwrap_or(false)
}

fn parse_nm_state(stdout: &str) -> bool {
    stdout.trim() == "connected"
}

fn parse_yes_no(stdout: &str) -> bool {
    stdout.trim().eq_ignore_ascii_case("yes")
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nm_state() {
        assert!(parse_nm_state("connected\n"));
        assert!(!parse_nm_state("connecting\n"));
        assert!(!parse_nm_state("connected (site only)\n"));
        assert!(!parse_nm_state(""));
    }

    #[test]
    fn test_parse_yes_no() {
        assert!(parse_yes_no("yes\n"));
        assert!(!parse_yes_no("no\n"));
    }

    // note: link tests require NetworkManager and are not run in ci
    // #[test]
    // fn test_wifi_connect() {
    //     wifi_connect("pool-net", "12345678").unwrap();
    // }
}
