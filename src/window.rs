//! ==============================================================================
//! window.rs - fixed-capacity moving average for raw analog samples
//! ==============================================================================
//!
//! purpose:
//!     smooths the TDS analog input. each new sample overwrites the oldest slot;
//!     capacity is fixed when the window is created and never changes.
//!
//! warm-up:
//!     slots start at zero. `ZeroPadded` averages over every slot from the first
//!     sample on, so early means are biased low until the window has wrapped
//!     once. `FilledOnly` averages over the slots written so far.
//!
//! ==============================================================================

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WarmupPolicy {
    #[default]
    ZeroPadded,
    FilledOnly,
}

#[derive(Debug, Clone)]
pub struct SampleWindow {
    slots: Vec<u16>,
    cursor: usize,
    filled: usize,
    warmup: WarmupPolicy,
}

impl SampleWindow {
    /// a zero capacity is bumped to one slot
    pub fn new(capacity: usize, warmup: WarmupPolicy) -> Self {
        Self {
            slots: vec![0; capacity.max(1)],
            cursor: 0,
            filled: 0,
            warmup,
        }
    }

    /// overwrite the oldest slot and advance the write cursor
    pub fn push(&mut self, raw: u16) {
        self.slots[self.cursor] = raw;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.filled = (self.filled + 1).min(self.slots.len());
    }

    pub fn mean(&self) -> f64 {
        let divisor = match self.warmup {
            WarmupPolicy::ZeroPadded => self.slots.len(),
            WarmupPolicy::FilledOnly => self.filled,
        };
        if divisor == 0 {
            return 0.0;
        }
        let sum: u64 = self.slots.iter().map(|&s| u64::from(s)).sum();
        sum as f64 / divisor as f64
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.filled == self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_padded_warmup_bias() {
        let mut window = SampleWindow::new(4, WarmupPolicy::ZeroPadded);
        window.push(400);
        // three untouched zero slots drag the mean down
        assert_eq!(window.mean(), 100.0);
        assert!(!window.is_full());
    }

    #[test]
    fn test_filled_only_ignores_empty_slots() {
        let mut window = SampleWindow::new(4, WarmupPolicy::FilledOnly);
        assert_eq!(window.mean(), 0.0);
        window.push(400);
        window.push(200);
        assert_eq!(window.mean(), 300.0);
    }

    #[test]
    fn test_overwrites_oldest_after_wrap() {
        let mut window = SampleWindow::new(3, WarmupPolicy::ZeroPadded);
        for raw in [10, 20, 30] {
            window.push(raw);
        }
        assert!(window.is_full());
        assert_eq!(window.mean(), 20.0);

        // replaces the 10
        window.push(100);
        assert_eq!(window.mean(), 50.0);
        assert_eq!(window.capacity(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = SampleWindow::new(0, WarmupPolicy::ZeroPadded);
        window.push(7);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.mean(), 7.0);
    }
}
