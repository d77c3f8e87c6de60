// Per-wheel speed controller
//
// Positional PID in gain / integral time / derivative time form, evaluated in
// ticks per control frame. The derivative acts on the measured ticks rather
// than on the error, so setpoint steps do not kick the output.

use crate::config::{ConfigError, PidGains};
use crate::motor::MotorCommand;
use crate::units::UnitConverter;

/// Share of the output range the integral term may reach on its own
const INTEGRAL_SHARE: f64 = 0.8;

/// A wheel speed setpoint in both caller-facing and controller units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Target {
    pub speed_mps: f64,
    pub ticks_per_frame: i32,
}

impl Target {
    pub const ZERO: Target = Target {
        speed_mps: 0.0,
        ticks_per_frame: 0,
    };

    pub fn from_speed(units: &UnitConverter, speed_mps: f64) -> Self {
        Self {
            speed_mps,
            ticks_per_frame: units.speed_to_ticks(speed_mps),
        }
    }

    /// The speed is derived back from the ticks so both fields stay in step
    pub fn from_ticks(units: &UnitConverter, ticks_per_frame: i32) -> Self {
        Self {
            speed_mps: units.ticks_to_speed(ticks_per_frame),
            ticks_per_frame,
        }
    }
}

/// Controller state of one wheel, updated once per control frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetPointInfo {
    pub target_speed: f64,
    pub target_ticks_per_frame: i32,
    /// Encoder count at the last update
    pub encoder: i64,
    /// Encoder count at the update before
    pub prev_encoder: i64,
    pub prev_error: i32,
    /// Anti-windup clamped to the controller's integral limit
    pub integrated_error: i32,
    /// Last emitted signed output
    pub output: i32,
}

#[derive(Debug, Clone)]
pub struct SpeedController {
    gains: PidGains,
    interval_s: f64,
    max_pwm: u16,
    integral_limit: i32,
    prev_input: i32,
    state: SetPointInfo,
}

impl SpeedController {
    pub fn new(gains: PidGains, interval_s: f64, max_pwm: u16) -> Result<Self, ConfigError> {
        gains.validate()?;
        if !interval_s.is_finite() || interval_s <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "control_interval_s",
                value: interval_s,
            });
        }
        if max_pwm == 0 {
            return Err(ConfigError::Zero { name: "max_pwm" });
        }

        // Kc * (T / Ti) * I_MAX stays below INTEGRAL_SHARE of the output range
        let bound = INTEGRAL_SHARE * f64::from(max_pwm) * gains.ti / (gains.kc * interval_s);
        let integral_limit = bound.floor().clamp(1.0, f64::from(i32::MAX)) as i32;

        Ok(Self {
            gains,
            interval_s,
            max_pwm,
            integral_limit,
            prev_input: 0,
            state: SetPointInfo::default(),
        })
    }

    /// Run one control frame against the wheel's cumulative encoder count
    ///
    /// A zero target is not special-cased: the loop keeps running so a
    /// still-rolling wheel is braked instead of left to coast.
    pub fn update(&mut self, target: Target, encoder: i64) -> MotorCommand {
        let s = &mut self.state;
        s.target_speed = target.speed_mps;
        s.target_ticks_per_frame = target.ticks_per_frame;
        s.prev_encoder = s.encoder;
        s.encoder = encoder;

        let input = saturate(encoder - s.prev_encoder);
        let error = target.ticks_per_frame.saturating_sub(input);
        s.integrated_error = s
            .integrated_error
            .saturating_add(error)
            .clamp(-self.integral_limit, self.integral_limit);

        let proportional = f64::from(error);
        let integral = (self.interval_s / self.gains.ti) * f64::from(s.integrated_error);
        let derivative =
            (self.gains.td / self.interval_s) * f64::from(input.saturating_sub(self.prev_input));
        let output = self.gains.kc * (proportional + integral - derivative);

        self.prev_input = input;
        s.prev_error = error;

        let limit = i32::from(self.max_pwm);
        s.output = (output.round() as i32).clamp(-limit, limit);
        MotorCommand::from_output(s.output, self.max_pwm)
    }

    /// Park the controller while its motor is held stopped
    ///
    /// Error history and output are dropped, but the encoder keeps being
    /// tracked so the first frame after resuming measures one frame of motion.
    pub fn hold(&mut self, encoder: i64) {
        let input = saturate(encoder - self.state.encoder);
        self.state = SetPointInfo {
            prev_encoder: self.state.encoder,
            encoder,
            ..SetPointInfo::default()
        };
        self.prev_input = input;
    }

    /// Forget all history, as after an encoder reset
    pub fn reset(&mut self) {
        self.state = SetPointInfo::default();
        self.prev_input = 0;
    }

    pub fn state(&self) -> &SetPointInfo {
        &self.state
    }

    pub fn integral_limit(&self) -> i32 {
        self.integral_limit
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
