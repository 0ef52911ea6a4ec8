//! Sun angle and sky brightness.
//!
//! Time of day runs from 0 to 1: 0.25 is sunrise, 0.5 noon, 0.75 sunset.
//! The brightness scalar is the only lighting the world derives from it;
//! block light is unaffected.

use std::f32::consts::TAU;

/// Seconds for a full day.
pub const DAY_LENGTH_SECONDS: f32 = 1200.0;

/// Brightness floor at night.
pub const MIN_BRIGHTNESS: f32 = 0.15;

/// Advancing clock for the sun.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DayCycle {
    time_of_day: f32,
    frozen: bool,
}

impl Default for DayCycle {
    fn default() -> Self {
        DayCycle {
            time_of_day: 0.5,
            frozen: false,
        }
    }
}

impl DayCycle {
    /// Creates a cycle at `time_of_day`, wrapped into `[0, 1)`.
    pub fn at(time_of_day: f32) -> Self {
        DayCycle {
            time_of_day: time_of_day.rem_euclid(1.0),
            frozen: false,
        }
    }

    /// Advances the clock by `dt` seconds unless frozen.
    pub fn advance(&mut self, dt: f32) {
        if self.frozen || !dt.is_finite() {
            return;
        }
        self.time_of_day = (self.time_of_day + dt.max(0.0) / DAY_LENGTH_SECONDS).rem_euclid(1.0);
    }

    /// Stops or restarts the clock.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Current time of day in `[0, 1)`.
    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    /// Sun elevation in radians: 0 at sunrise, π/2 at noon.
    pub fn sun_angle(&self) -> f32 {
        (self.time_of_day - 0.25) * TAU
    }

    /// Sky brightness in `[MIN_BRIGHTNESS, 1]`.
    pub fn sun_brightness(&self) -> f32 {
        (self.sun_angle().sin() * 2.0 + 0.5).clamp(MIN_BRIGHTNESS, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noon_is_brightest_and_midnight_darkest() {
        assert_eq!(DayCycle::at(0.5).sun_brightness(), 1.0);
        assert_eq!(DayCycle::at(0.0).sun_brightness(), MIN_BRIGHTNESS);
        let sunrise = DayCycle::at(0.25).sun_brightness();
        assert!(sunrise > MIN_BRIGHTNESS && sunrise < 1.0);
    }

    #[test]
    fn advance_wraps_and_respects_freeze() {
        let mut cycle = DayCycle::at(0.9);
        cycle.advance(DAY_LENGTH_SECONDS * 0.2);
        assert!((cycle.time_of_day() - 0.1).abs() < 1e-4);

        cycle.set_frozen(true);
        cycle.advance(100.0);
        assert!((cycle.time_of_day() - 0.1).abs() < 1e-4);
    }
}
