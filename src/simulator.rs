//! ==============================================================================
//! simulator.rs - synthetic pool readings
//! ==============================================================================
//!
//! purpose:
//!     produces pH / temperature / TDS from a slowly advancing phase angle plus
//!     bounded uniform jitter, clamped to plausible pool ranges.
//!
//! signal model (θ advances by STEP per tick, no wraparound):
//!     pH          = 7.4   + 0.15·sin(θ)   ± 0.05   clamped to [6.0, 8.5]
//!     temperature = 25.0  + 1.5·sin(θ/3)  ± 0.3    clamped to [20.0, 35.0]
//!     TDS         = 500.0 + 30·sin(θ/4)   ± 10     clamped to [200, 1000]
//!
//! reporting:
//!     the published pH is the last generated (noisy, clamped) value. temperature
//!     and TDS are re-derived noise-free from the current angle and clamped
//!     again, so reported values always stay inside their bounds.
//!
//! ==============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

use crate::domain::Reading;
use crate::trend::Trend;

/// phase advance per tick (radians)
pub const STEP: f64 = 0.2;

pub const PH_BASE: f64 = 7.4;
pub const TEMPERATURE_BASE: f64 = 25.0;
pub const TDS_BASE: f64 = 500.0;

pub const PH_RANGE: RangeInclusive<f64> = 6.0..=8.5;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 20.0..=35.0;
pub const TDS_RANGE: RangeInclusive<f64> = 200.0..=1000.0;

const PH_JITTER: f64 = 0.05;
const TEMPERATURE_JITTER: f64 = 0.3;
const TDS_JITTER: f64 = 10.0;

/// source of bounded uniform noise
pub trait Jitter {
    /// a value in `[-bound, +bound]`
    fn uniform(&mut self, bound: f64) -> f64;
}

impl<J: Jitter + ?Sized> Jitter for Box<J> {
    fn uniform(&mut self, bound: f64) -> f64 {
        (**self).uniform(bound)
    }
}

pub struct RandomJitter(StdRng);

impl RandomJitter {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Jitter for RandomJitter {
    fn uniform(&mut self, bound: f64) -> f64 {
        if bound <= 0.0 {
            return 0.0;
        }
        self.0.gen_range(-bound..=bound)
    }
}

/// noise-free jitter, used when the signal must be reproducible
#[cfg(test)]
pub struct NoJitter;

#[cfg(test)]
impl Jitter for NoJitter {
    fn uniform(&mut self, _bound: f64) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub angle: f64,
    pub reads: u64,
    /// last generated pH, the value that gets published
    pub last_ph: f64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self { angle: 0.0, reads: 0, last_ph: PH_BASE }
    }
}

/// values computed during one tick, clamped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub ph: f64,
    pub temperature_c: f64,
    pub tds_ppm: f64,
    pub trend: Trend,
}

pub struct SyntheticGenerator<J: Jitter> {
    state: SimulationState,
    jitter: J,
}

impl<J: Jitter> SyntheticGenerator<J> {
    pub fn new(jitter: J) -> Self {
        Self::with_state(SimulationState::default(), jitter)
    }

    pub fn with_state(state: SimulationState, jitter: J) -> Self {
        Self { state, jitter }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// advance the phase one step and generate a tick
    pub fn advance(&mut self) -> Tick {
        self.state.angle += STEP;
        let angle = self.state.angle;

        let ph = clamp(
            PH_BASE + 0.15 * angle.sin() + self.jitter.uniform(PH_JITTER),
            &PH_RANGE,
        );
        let temperature_c = clamp(
            TEMPERATURE_BASE + 1.5 * (angle / 3.0).sin() + self.jitter.uniform(TEMPERATURE_JITTER),
            &TEMPERATURE_RANGE,
        );
        let tds_ppm = clamp(
            TDS_BASE + 30.0 * (angle / 4.0).sin() + self.jitter.uniform(TDS_JITTER),
            &TDS_RANGE,
        );

        self.state.last_ph = ph;
        self.state.reads += 1;

        Tick { ph, temperature_c, tds_ppm, trend: Trend::at_angle(angle, STEP) }
    }

    /// the reading to publish for the current angle
    pub fn report(&self) -> Reading {
        let angle = self.state.angle;
        Reading {
            ph: self.state.last_ph,
            temperature_c: clamp(TEMPERATURE_BASE + 1.5 * (angle / 3.0).sin(), &TEMPERATURE_RANGE),
            tds_ppm: clamp(TDS_BASE + 30.0 * (angle / 4.0).sin(), &TDS_RANGE),
            trend: Trend::at_angle(angle, STEP),
        }
    }
}

fn clamp(value: f64, range: &RangeInclusive<f64>) -> f64 {
    value.clamp(*range.start(), *range.end())
}
