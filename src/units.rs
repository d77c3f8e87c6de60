// Conversions between wheel speed (m/s), ticks per control frame and raw pulses.
// All conversions go through the single derived ticks-per-meter constant.

use crate::config::{BaseConfig, Calibration, ConfigError};

/// Stateless speed/tick converter for one calibration and control interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    ticks_per_meter: f64,
    control_interval_s: f64,
    counts_per_output_rev: u32,
}

impl UnitConverter {
    pub fn new(calibration: &Calibration, control_interval_s: f64) -> Result<Self, ConfigError> {
        calibration.validate()?;
        if !control_interval_s.is_finite() || control_interval_s <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "control_interval_s",
                value: control_interval_s,
            });
        }
        Ok(Self {
            ticks_per_meter: calibration.ticks_per_meter(),
            control_interval_s,
            counts_per_output_rev: calibration.counts_per_output_rev(),
        })
    }

    pub fn from_config(config: &BaseConfig) -> Result<Self, ConfigError> {
        Self::new(&config.calibration, config.control_interval())
    }

    /// Convert a linear wheel speed to the ticks expected within one control frame
    ///
    /// Rounds half away from zero, so `speed_to_ticks(-v) == -speed_to_ticks(v)`.
    /// Non-finite or huge inputs saturate (NaN maps to 0); callers bound their inputs.
    pub fn speed_to_ticks(&self, speed_mps: f64) -> i32 {
        (speed_mps * self.ticks_per_frame_per_mps()).round() as i32
    }

    /// Convert ticks per control frame back to a linear wheel speed
    pub fn ticks_to_speed(&self, ticks_per_frame: i32) -> f64 {
        let scale = self.ticks_per_frame_per_mps();
        if scale == 0.0 {
            return 0.0;
        }
        f64::from(ticks_per_frame) / scale
    }

    /// Distance travelled for a raw pulse count
    pub fn ticks_to_meters(&self, ticks: i64) -> f64 {
        ticks as f64 / self.ticks_per_meter
    }

    pub fn ticks_per_meter(&self) -> f64 {
        self.ticks_per_meter
    }

    pub fn control_interval(&self) -> f64 {
        self.control_interval_s
    }

    pub fn counts_per_output_rev(&self) -> u32 {
        self.counts_per_output_rev
    }

    fn ticks_per_frame_per_mps(&self) -> f64 {
        self.ticks_per_meter * self.control_interval_s
    }
}
