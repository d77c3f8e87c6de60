// Rates, calibration, timeouts, topics and the validated base configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Encoder sampling + PID loop frequency
pub const PID_RATE_HZ: u32 = 30;

// Odometry publishing frequency
pub const ODOM_RATE_HZ: u32 = 10;

// PID parameters (gain, integral time, derivative time)
pub const KC: f64 = 1.6;
pub const TI: f64 = 0.2;
pub const TD: f64 = 0.0;

// Robot geometry (Pololu 30:1 gearmotor with 64 CPR encoder)
pub const ENCODER_CPR: u32 = 64;
pub const GEAR_RATIO: u32 = 30;
pub const WHEEL_DIAMETER_M: f64 = 0.123825;
pub const WHEEL_TRACK_M: f64 = 0.23;

// Stop the robot if it hasn't received a movement command within this window
pub const AUTO_STOP_INTERVAL: Duration = Duration::from_millis(2000);

// Motor output range in PWM counts (either direction)
pub const MAX_PWM: u16 = 255;

// Zenoh topics
pub const TOPIC_CMD_WHEELS: &str = "hase/cmd/wheels"; // commands
pub const TOPIC_ODOM: &str = "hase/state/odom"; // pose estimate
pub const TOPIC_HEALTH: &str = "hase/state/health"; // health status

// Serial port for the wheel board
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} must be a finite number >= 0, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be non-zero")]
    Zero { name: &'static str },

    #[error("odometry rate {odom_hz}Hz must not exceed control rate {pid_hz}Hz")]
    OdomFasterThanControl { odom_hz: u32, pid_hz: u32 },

    #[error("encoder counter width must be 2..=32 bits, got {0}")]
    CounterWidth(u32),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Encoder and wheel geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Encoder pulses per motor shaft revolution
    pub encoder_cpr: u32,
    /// Motor shaft revolutions per wheel revolution
    pub gear_ratio: u32,
    pub wheel_diameter_m: f64,
    /// Distance between the wheel contact points
    pub wheel_track_m: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            encoder_cpr: ENCODER_CPR,
            gear_ratio: GEAR_RATIO,
            wheel_diameter_m: WHEEL_DIAMETER_M,
            wheel_track_m: WHEEL_TRACK_M,
        }
    }
}

impl Calibration {
    /// Encoder pulses per wheel revolution (1920 for the default motor)
    pub fn counts_per_output_rev(&self) -> u32 {
        self.encoder_cpr.saturating_mul(self.gear_ratio)
    }

    /// Encoder pulses per meter of wheel travel (~4935.6 by default)
    pub fn ticks_per_meter(&self) -> f64 {
        f64::from(self.counts_per_output_rev()) / (std::f64::consts::PI * self.wheel_diameter_m)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoder_cpr == 0 {
            return Err(ConfigError::Zero { name: "encoder_cpr" });
        }
        if self.gear_ratio == 0 {
            return Err(ConfigError::Zero { name: "gear_ratio" });
        }
        if self.encoder_cpr.checked_mul(self.gear_ratio).is_none() {
            return Err(ConfigError::NotPositive {
                name: "encoder_cpr * gear_ratio",
                value: f64::from(self.encoder_cpr) * f64::from(self.gear_ratio),
            });
        }
        positive("wheel_diameter_m", self.wheel_diameter_m)?;
        positive("wheel_track_m", self.wheel_track_m)
    }
}

/// Speed controller gains in the gain / integral time / derivative time form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kc: f64,
    pub ti: f64,
    pub td: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kc: KC,
            ti: TI,
            td: TD,
        }
    }
}

impl PidGains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("kc", self.kc)?;
        positive("ti", self.ti)?;
        if !self.td.is_finite() || self.td < 0.0 {
            return Err(ConfigError::Negative {
                name: "td",
                value: self.td,
            });
        }
        Ok(())
    }
}

/// What the watchdog does with the stored targets when commands go stale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Output is forced to zero; stored targets survive and resume on keep-alive
    #[default]
    HoldIntent,
    /// Stored targets are cleared; motion resumes only on a new speed command
    ClearIntent,
}

/// Full base configuration, fixed once the controller starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub calibration: Calibration,
    pub gains: PidGains,
    pub pid_rate_hz: u32,
    pub odom_rate_hz: u32,
    pub auto_stop_ms: u64,
    pub stale_policy: StalePolicy,
    pub max_pwm: u16,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            gains: PidGains::default(),
            pid_rate_hz: PID_RATE_HZ,
            odom_rate_hz: ODOM_RATE_HZ,
            auto_stop_ms: AUTO_STOP_INTERVAL.as_millis() as u64,
            stale_policy: StalePolicy::default(),
            max_pwm: MAX_PWM,
        }
    }
}

impl BaseConfig {
    /// Load from a JSON file; missing fields fall back to the defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        self.gains.validate()?;
        if self.pid_rate_hz == 0 {
            return Err(ConfigError::Zero {
                name: "pid_rate_hz",
            });
        }
        if self.odom_rate_hz == 0 {
            return Err(ConfigError::Zero {
                name: "odom_rate_hz",
            });
        }
        if self.odom_rate_hz > self.pid_rate_hz {
            return Err(ConfigError::OdomFasterThanControl {
                odom_hz: self.odom_rate_hz,
                pid_hz: self.pid_rate_hz,
            });
        }
        if self.auto_stop_ms == 0 {
            return Err(ConfigError::Zero {
                name: "auto_stop_ms",
            });
        }
        if self.max_pwm == 0 {
            return Err(ConfigError::Zero { name: "max_pwm" });
        }
        Ok(())
    }

    /// Control frame length in seconds
    pub fn control_interval(&self) -> f64 {
        1.0 / f64::from(self.pid_rate_hz)
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(self.control_interval())
    }

    pub fn odom_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.odom_rate_hz))
    }

    pub fn auto_stop(&self) -> Duration {
        Duration::from_millis(self.auto_stop_ms)
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflowing_counts_per_rev_rejected() {
        let calibration = Calibration {
            encoder_cpr: u32::MAX,
            gear_ratio: 2,
            ..Calibration::default()
        };
        assert_eq!(calibration.counts_per_output_rev(), u32::MAX);
        assert!(calibration.validate().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BaseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration.counts_per_output_rev(), 1920);
        assert!((config.calibration.ticks_per_meter() - 4935.6).abs() < 0.1);
        assert_eq!(config.auto_stop(), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_wheel_track_rejected() {
        let mut config = BaseConfig::default();
        config.calibration.wheel_track_m = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                name: "wheel_track_m",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_control_rate_rejected() {
        let config = BaseConfig {
            pid_rate_hz: 0,
            ..BaseConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                name: "pid_rate_hz"
            })
        ));
    }

    #[test]
    fn test_odom_faster_than_control_rejected() {
        let config = BaseConfig {
            odom_rate_hz: 60,
            ..BaseConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OdomFasterThanControl { .. })
        ));
    }

    #[test]
    fn test_nan_gain_rejected() {
        let mut config = BaseConfig::default();
        config.gains.ti = f64::NAN;
        assert!(config.validate().is_err());
        config.gains.ti = TI;
        config.gains.td = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "pid_rate_hz": 50, "calibration": { "wheel_track_m": 0.3 } }"#;
        let config: BaseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pid_rate_hz, 50);
        assert_eq!(config.odom_rate_hz, ODOM_RATE_HZ);
        assert_eq!(config.calibration.wheel_track_m, 0.3);
        assert_eq!(config.calibration.encoder_cpr, ENCODER_CPR);
        assert_eq!(config.stale_policy, StalePolicy::HoldIntent);
    }

    #[test]
    fn test_stale_policy_serde_name() {
        let json = r#"{ "stale_policy": "clear_intent" }"#;
        let config: BaseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stale_policy, StalePolicy::ClearIntent);
    }
}
