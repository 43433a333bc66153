//! trend.rs - qualitative direction of a reading (rising / falling / stable)

use serde::{Serialize, Serializer};

/// changes smaller than this in either direction count as stable
pub const DEADBAND: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl Trend {
    /// classify a signed change using the deadband
    pub fn from_delta(delta: f64) -> Self {
        if delta > DEADBAND {
            Trend::Rising
        } else if delta < -DEADBAND {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    /// local derivative of sin() at `angle`, sampled over the same step used to advance it
    pub fn at_angle(angle: f64, step: f64) -> Self {
        Self::from_delta(angle.sin() - (angle - step).sin())
    }

    pub fn label(self) -> &'static str {
        match self {
            Trend::Rising => "subiendo",
            Trend::Falling => "bajando",
            Trend::Stable => "estable",
        }
    }

    pub fn value(self) -> i8 {
        match self {
            Trend::Rising => 1,
            Trend::Falling => -1,
            Trend::Stable => 0,
        }
    }
}

/// serialized as its wire label
impl Serialize for Trend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadband_edges() {
        assert_eq!(Trend::from_delta(0.011), Trend::Rising);
        assert_eq!(Trend::from_delta(0.01), Trend::Stable);
        assert_eq!(Trend::from_delta(-0.01), Trend::Stable);
        assert_eq!(Trend::from_delta(-0.011), Trend::Falling);
    }

    #[test]
    fn test_sign_matches_sine_derivative() {
        let step = 0.2;
        for i in 0..400 {
            let angle = i as f64 * 0.05;
            let delta = angle.sin() - (angle - step).sin();
            let trend = Trend::at_angle(angle, step);
            match trend {
                Trend::Rising => assert!(delta > DEADBAND),
                Trend::Falling => assert!(delta < -DEADBAND),
                Trend::Stable => assert!(delta.abs() <= DEADBAND),
            }
        }
    }

    #[test]
    fn test_labels_and_values() {
        assert_eq!(Trend::Rising.label(), "subiendo");
        assert_eq!(Trend::Falling.value(), -1);
        assert_eq!(serde_json::to_string(&Trend::Stable).unwrap(), "\"estable\"");
        assert_eq!(serde_json::to_string(&Trend::Rising).unwrap(), "\"subiendo\"");
        assert_eq!(serde_json::to_string(&Trend::Falling).unwrap(), "\"bajando\"");
    }
}
