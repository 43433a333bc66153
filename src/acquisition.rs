//! ==============================================================================
//! acquisition.rs - probe and analog acquisition with validation filters
//! ==============================================================================
//!
//! purpose:
//!     reads pH and temperature from the serial probe and TDS from the analog
//!     input, and decides per sample whether to accept it. a rejected sample
//!     never reaches the caller: every `read_*` returns either the new accepted
//!     value or the last accepted one, unchanged.
//!
//! acceptance rules:
//!     pH          non-empty, not `*`-prefixed, parses, within [0, 14]
//!     temperature as pH, within [-10, 60], and within 5 °C of the last accepted
//!     TDS         within [0, 3000], and within 100 ppm of the last accepted
//!                 unless no TDS sample was ever accepted
//!
//! TDS conversion:
//!     mean raw → volts (vref / full_scale) → divide by 1 + 0.02·(T − 25)
//!     → ppm = 0.5 · (133.42·v³ − 255.86·v² + 857.39·v)
//!
//! ==============================================================================

use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

use crate::config::AdcConfig;
use crate::hal::{AnalogInput, ProbePort};
use crate::window::SampleWindow;

pub const PH_RANGE: RangeInclusive<f64> = 0.0..=14.0;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -10.0..=60.0;
pub const TDS_RANGE: RangeInclusive<f64> = 0.0..=3000.0;

pub const TEMPERATURE_MAX_STEP: f64 = 5.0;
pub const TDS_MAX_STEP: f64 = 100.0;

pub const INITIAL_PH: f64 = 7.0;
pub const INITIAL_TEMPERATURE: f64 = 25.0;
pub const INITIAL_TDS: f64 = 300.0;

const PH_COMMAND: &str = "R";
const TEMPERATURE_COMMAND: &str = "RT";

/// why a sample was not accepted
#[derive(Debug, Error, PartialEq)]
pub enum RejectReason {
    #[error("no response from probe")]
    NoResponse,
    #[error("probe error: {0}")]
    ProbeError(String),
    #[error("unparseable response {0:?}")]
    Unparseable(String),
    #[error("{value} outside plausible range")]
    OutOfRange { value: f64 },
    #[error("jump of {delta:.2} exceeds limit {limit}")]
    TooLargeJump { delta: f64, limit: f64 },
    #[error("io: {0}")]
    Io(String),
}

/// analog front-end parameters for the TDS conversion
#[derive(Debug, Clone, Copy)]
pub struct TdsCalibration {
    pub vref: f64,
    pub full_scale: f64,
}

impl From<&AdcConfig> for TdsCalibration {
    fn from(adc: &AdcConfig) -> Self {
        Self { vref: adc.vref, full_scale: f64::from(adc.full_scale) }
    }
}

impl Default for TdsCalibration {
    fn default() -> Self {
        Self { vref: 3.3, full_scale: 4095.0 }
    }
}

/// last accepted values plus the TDS sample window
#[derive(Debug, Clone)]
pub struct SensorFilterState {
    pub ph: f64,
    pub temperature_c: f64,
    pub tds_ppm: f64,
    /// no TDS sample accepted yet; the first one skips the jump check
    pub tds_untouched: bool,
    pub window: SampleWindow,
}

impl SensorFilterState {
    pub fn new(window: SampleWindow) -> Self {
        Self {
            ph: INITIAL_PH,
            temperature_c: INITIAL_TEMPERATURE,
            tds_ppm: INITIAL_TDS,
            tds_untouched: true,
            window,
        }
    }
}

pub struct SensorAcquisition {
    probe: Box<dyn ProbePort>,
    adc: Box<dyn AnalogInput>,
    state: SensorFilterState,
    calibration: TdsCalibration,
    response_timeout: Duration,
    show_data: bool,
}

impl SensorAcquisition {
    pub fn new(
        probe: Box<dyn ProbePort>,
        adc: Box<dyn AnalogInput>,
        state: SensorFilterState,
        calibration: TdsCalibration,
        response_timeout: Duration,
    ) -> Self {
        Self { probe, adc, state, calibration, response_timeout, show_data: true }
    }

    pub fn show_data(mut self, show: bool) -> Self {
        self.show_data = show;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &SensorFilterState {
        &self.state
    }

    pub fn read_ph(&mut self) -> f64 {
        let result = self
            .query(PH_COMMAND)
            .and_then(|ph| accept_in_range(ph, &PH_RANGE));

        match result {
            Ok(ph) => {
                self.state.ph = ph;
                if self.show_data {
                    tracing::info!(ph, "[PROBE] pH reading");
                }
            }
            Err(reason) => {
                tracing::warn!(fallback = self.state.ph, "[PROBE] pH rejected: {}", reason);
            }
        }
        self.state.ph
    }

    pub fn read_temperature(&mut self) -> f64 {
        let last = self.state.temperature_c;
        let result = self
            .query(TEMPERATURE_COMMAND)
            .and_then(|t| accept_in_range(t, &TEMPERATURE_RANGE))
            .and_then(|t| accept_step(t, last, TEMPERATURE_MAX_STEP));

        match result {
            Ok(temperature_c) => {
                self.state.temperature_c = temperature_c;
                if self.show_data {
                    tracing::info!(temperature_c, "[PROBE] temperature reading");
                }
            }
            Err(reason) => {
                tracing::warn!(fallback = last, "[PROBE] temperature rejected: {}", reason);
            }
        }
        self.state.temperature_c
    }

    pub fn read_tds(&mut self) -> f64 {
        let raw = match self.adc.sample() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(fallback = self.state.tds_ppm, "[ADC] TDS sample failed: {:#}", e);
                return self.state.tds_ppm;
            }
        };
        self.state.window.push(raw);

        let voltage = self.state.window.mean() * self.calibration.vref / self.calibration.full_scale;
        let ppm = tds_from_voltage(voltage, self.state.temperature_c);

        let last = self.state.tds_ppm;
        let result = accept_in_range(ppm, &TDS_RANGE).and_then(|ppm| {
            if self.state.tds_untouched {
                Ok(ppm)
            } else {
                accept_step(ppm, last, TDS_MAX_STEP)
            }
        });

        match result {
            Ok(tds_ppm) => {
                self.state.tds_ppm = tds_ppm;
                self.state.tds_untouched = false;
                if self.show_data {
                    tracing::info!("[ADC] TDS reading: {:.0} ppm (voltage: {:.3}V)", tds_ppm, voltage);
                }
            }
            Err(reason) => {
                tracing::warn!(fallback = last, "[ADC] TDS rejected: {}", reason);
            }
        }
        self.state.tds_ppm
    }

    /// send a command and parse the single-line float response
    fn query(&mut self, command: &str) -> Result<f64, RejectReason> {
        self.probe
            .send_command(command)
            .map_err(|e| RejectReason::Io(format!("{:#}", e)))?;
        let line = self
            .probe
            .read_line(self.response_timeout)
            .map_err(|e| RejectReason::Io(format!("{:#}", e)))?
            .ok_or(RejectReason::NoResponse)?;
        parse_response(&line)
    }
}

/// validate a raw probe line
pub fn parse_response(line: &str) -> Result<f64, RejectReason> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(RejectReason::NoResponse);
    }
    if trimmed.starts_with('*') {
        return Err(RejectReason::ProbeError(trimmed.to_string()));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| RejectReason::Unparseable(trimmed.to_string()))
}

/// temperature-compensated cubic voltage → ppm conversion
pub fn tds_from_voltage(voltage: f64, temperature_c: f64) -> f64 {
    let compensation = 1.0 + 0.02 * (temperature_c - 25.0);
    let v = voltage / compensation;
    0.5 * (133.42 * v * v * v - 255.86 * v * v + 857.39 * v)
}

fn accept_in_range(value: f64, range: &RangeInclusive<f64>) -> Result<f64, RejectReason> {
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        Err(RejectReason::OutOfRange { value })
    }
}

fn accept_step(value: f64, last: f64, limit: f64) -> Result<f64, RejectReason> {
    let delta = (value - last).abs();
    if delta <= limit {
        Ok(value)
    } else {
        Err(RejectReason::TooLargeJump { delta, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WarmupPolicy;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// replies from a script, one line per command; `None` simulates a timeout
    struct ScriptedProbe {
        replies: VecDeque<Option<String>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ProbePort for ScriptedProbe {
        fn send_command(&mut self, command: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }

        fn read_line(&mut self, _timeout: Duration) -> anyhow::Result<Option<String>> {
            Ok(self.replies.pop_front().flatten())
        }
    }

    struct ScriptedAdc(VecDeque<anyhow::Result<u16>>);

    impl AnalogInput for ScriptedAdc {
        fn sample(&mut self) -> anyhow::Result<u16> {
            self.0.pop_front().unwrap_or(Ok(0))
        }
    }

    fn acquisition(replies: &[Option<&str>], samples: Vec<anyhow::Result<u16>>, window: usize) -> SensorAcquisition {
        let probe = ScriptedProbe {
            replies: replies.iter().map(|r| r.map(str::to_string)).collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        SensorAcquisition::new(
            Box::new(probe),
            Box::new(ScriptedAdc(samples.into())),
            SensorFilterState::new(SampleWindow::new(window, WarmupPolicy::ZeroPadded)),
            TdsCalibration::default(),
            Duration::from_millis(10),
        )
    }

    /// raw count that averages to `ppm` at 25 °C over a full single-slot window
    fn raw_for_ppm(ppm: f64) -> u16 {
        let mut lo = 0u16;
        let mut hi = 4095u16;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let v = f64::from(mid) * 3.3 / 4095.0;
            if tds_from_voltage(v, 25.0) < ppm {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    #[test]
    fn test_ph_out_of_range_keeps_last() {
        let mut acq = acquisition(&[Some("7.0"), Some("20.5")], vec![], 1);
        assert_eq!(acq.read_ph(), 7.0);
        assert_eq!(acq.read_ph(), 7.0);
        assert_eq!(acq.state().ph, 7.0);
    }

    #[test]
    fn test_ph_accepts_new_value() {
        let mut acq = acquisition(&[Some("7.45\r")], vec![], 1);
        assert_eq!(acq.read_ph(), 7.45);
        assert_eq!(acq.state().ph, 7.45);
    }

    #[test]
    fn test_ph_rejects_error_sentinel_timeout_and_garbage() {
        let mut acq = acquisition(&[Some("6.8"), Some("*ER"), None, Some(""), Some("abc")], vec![], 1);
        assert_eq!(acq.read_ph(), 6.8);
        for _ in 0..4 {
            assert_eq!(acq.read_ph(), 6.8);
        }
    }

    #[test]
    fn test_temperature_rate_clamp() {
        let mut acq = acquisition(&[Some("31.2"), Some("29.0")], vec![], 1);
        // delta 6.2 from the initial 25.0
        assert_eq!(acq.read_temperature(), 25.0);
        // delta 4.0
        assert_eq!(acq.read_temperature(), 29.0);
        assert_eq!(acq.state().temperature_c, 29.0);
    }

    #[test]
    fn test_temperature_range_check() {
        let mut acq = acquisition(&[Some("-12.0"), Some("61")], vec![], 1);
        assert_eq!(acq.read_temperature(), 25.0);
        assert_eq!(acq.read_temperature(), 25.0);
    }

    #[test]
    fn test_probe_commands() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let probe = ScriptedProbe { replies: VecDeque::new(), sent: sent.clone() };
        let mut acq = SensorAcquisition::new(
            Box::new(probe),
            Box::new(ScriptedAdc(VecDeque::new())),
            SensorFilterState::new(SampleWindow::new(1, WarmupPolicy::ZeroPadded)),
            TdsCalibration::default(),
            Duration::from_millis(10),
        );
        acq.read_ph();
        acq.read_temperature();
        assert_eq!(*sent.lock().unwrap(), vec!["R".to_string(), "RT".to_string()]);
    }

    #[test]
    fn test_first_tds_exempt_from_rate_clamp() {
        let raw = raw_for_ppm(800.0);
        let mut acq = acquisition(&[], vec![Ok(raw)], 1);
        let tds = acq.read_tds();
        // far more than 100 away from the initial 300, accepted anyway
        assert!((tds - 800.0).abs() < 2.0, "got {tds}");
        assert!(!acq.state().tds_untouched);
    }

    #[test]
    fn test_tds_jump_rejected_after_first() {
        let first = raw_for_ppm(400.0);
        let jump = raw_for_ppm(700.0);
        let small = raw_for_ppm(450.0);
        let mut acq = acquisition(&[], vec![Ok(first), Ok(jump), Ok(small)], 1);

        let accepted = acq.read_tds();
        assert_eq!(acq.read_tds(), accepted);
        let next = acq.read_tds();
        assert!((next - 450.0).abs() < 2.0, "got {next}");
    }

    #[test]
    fn test_tds_out_of_range_rejected() {
        // full scale is about 2400 ppm at 25 °C; cold compensation pushes it past 3000
        let mut acq = acquisition(&[], vec![Ok(4095)], 1);
        acq.state.temperature_c = -9.0;
        let ppm = tds_from_voltage(3.3, -9.0);
        assert!(ppm > 3000.0, "got {ppm}");
        assert_eq!(acq.read_tds(), INITIAL_TDS);
        assert!(acq.state().tds_untouched);
    }

    #[test]
    fn test_tds_compensates_with_last_accepted_temperature() {
        let raw = raw_for_ppm(500.0);
        let voltage = f64::from(raw) * 3.3 / 4095.0;
        let mut acq = acquisition(&[Some("31.2"), Some("29.0")], vec![Ok(raw), Ok(raw)], 1);

        // 31.2 is rejected by the rate clamp, compensation stays at 25.0
        assert_eq!(acq.read_temperature(), 25.0);
        let tds = acq.read_tds();
        assert!((tds - tds_from_voltage(voltage, 25.0)).abs() < 1e-9, "got {tds}");
        assert!((tds - tds_from_voltage(voltage, 31.2)).abs() > 1.0);

        assert_eq!(acq.read_temperature(), 29.0);
        let tds = acq.read_tds();
        assert!((tds - tds_from_voltage(voltage, 29.0)).abs() < 1e-9, "got {tds}");
    }

    #[test]
    fn test_tds_adc_failure_keeps_last() {
        let mut acq = acquisition(&[], vec![Err(anyhow!("spi fault"))], 4);
        assert_eq!(acq.read_tds(), INITIAL_TDS);
    }

    #[test]
    fn test_tds_warmup_bias_with_zero_padding() {
        let raw = raw_for_ppm(600.0);
        let mut acq = acquisition(&[], vec![Ok(raw)], 2);
        // one real sample + one zero slot halves the mean
        let half_voltage = f64::from(raw) / 2.0 * 3.3 / 4095.0;
        let expected = tds_from_voltage(half_voltage, 25.0);
        assert!((acq.read_tds() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_tds_conversion_polynomial() {
        let v: f64 = 1.0;
        let expected = 0.5 * (133.42 - 255.86 + 857.39);
        assert!((tds_from_voltage(v, 25.0) - expected).abs() < 1e-9);
        // 35 °C: divisor 1.2
        let compensated: f64 = 1.0 / 1.2;
        let expected = 0.5 * (133.42 * compensated.powi(3) - 255.86 * compensated.powi(2) + 857.39 * compensated);
        assert!((tds_from_voltage(v, 35.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response(" 7.12 "), Ok(7.12));
        assert_eq!(parse_response("*OK"), Err(RejectReason::ProbeError("*OK".into())));
        assert_eq!(parse_response(""), Err(RejectReason::NoResponse));
        assert!(matches!(parse_response("7,1"), Err(RejectReason::Unparseable(_))));
    }
}
