// Simulated wheel board
//
// Each motor is a first-order lag from PWM duty to wheel speed; wheel travel
// is integrated into wrapping 16-bit counters like the real board's.

use std::time::{Duration, Instant};

use super::bus::{BoardError, COUNTER_BITS};
use super::driver::{MotorCommand, Wheel, WheelBoard};
use crate::config::BaseConfig;

/// Wheel speed at full duty
pub const SIM_MAX_SPEED_MPS: f64 = 1.2;

/// Motor time constant
pub const SIM_TIME_CONSTANT_S: f64 = 0.15;

#[derive(Debug, Clone, Copy, Default)]
struct SimWheel {
    duty: f64,      // signed, [-1, 1]
    speed_mps: f64, // current wheel speed
    fraction: f64,  // fractional ticks carried to the next step
    counter: u16,   // wrapping hardware counter
}

/// Simulated base used by `--sim` and in tests
pub struct SimBoard {
    wheels: [SimWheel; 2],
    ticks_per_meter: f64,
    max_pwm: u16,
    last_step: Instant,
    fail_writes: bool,
}

impl SimBoard {
    pub fn new(config: &BaseConfig) -> Self {
        Self {
            wheels: [SimWheel::default(); 2],
            ticks_per_meter: config.calibration.ticks_per_meter(),
            max_pwm: config.max_pwm,
            last_step: Instant::now(),
            fail_writes: false,
        }
    }

    /// Start the counters at an arbitrary raw value
    pub fn with_counters(mut self, left: u16, right: u16) -> Self {
        self.wheels[0].counter = left;
        self.wheels[1].counter = right;
        self
    }

    /// Make every motor write fail, like a driver in fault
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Current simulated wheel speed
    pub fn speed(&self, wheel: Wheel) -> f64 {
        self.wheels[wheel.index()].speed_mps
    }

    /// Advance the simulation by `dt`
    pub fn step(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        if dt <= 0.0 {
            return;
        }
        let alpha = 1.0 - (-dt / SIM_TIME_CONSTANT_S).exp();
        for wheel in &mut self.wheels {
            let target = wheel.duty * SIM_MAX_SPEED_MPS;
            wheel.speed_mps += (target - wheel.speed_mps) * alpha;

            let ticks = wheel.speed_mps * dt * self.ticks_per_meter + wheel.fraction;
            let whole = ticks.trunc();
            wheel.fraction = ticks - whole;
            wheel.counter = wheel.counter.wrapping_add(whole as i64 as u16);
        }
    }

    fn step_to_now(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_step);
        self.last_step = now;
        self.step(dt);
    }
}

impl WheelBoard for SimBoard {
    fn read_encoder(&mut self, wheel: Wheel) -> Result<u32, BoardError> {
        self.step_to_now();
        Ok(u32::from(self.wheels[wheel.index()].counter))
    }

    fn counter_bits(&self) -> u32 {
        COUNTER_BITS
    }

    fn write_motor(&mut self, wheel: Wheel, command: MotorCommand) -> Result<(), BoardError> {
        if self.fail_writes {
            return Err(BoardError::Simulated("driver refused command"));
        }
        let duty = command.duty(self.max_pwm);
        self.wheels[wheel.index()].duty = if command.signed() < 0 { -duty } else { duty };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::Direction;

    fn forward(magnitude: u16) -> MotorCommand {
        MotorCommand {
            direction: Direction::Forward,
            magnitude,
        }
    }

    #[test]
    fn test_idle_board_does_not_move() {
        let mut board = SimBoard::new(&BaseConfig::default());
        board.step(Duration::from_secs(1));
        assert_eq!(board.wheels[0].counter, 0);
        assert_eq!(board.wheels[1].counter, 0);
    }

    #[test]
    fn test_full_duty_approaches_max_speed() {
        let mut board = SimBoard::new(&BaseConfig::default());
        board.write_motor(Wheel::Left, forward(255)).unwrap();
        for _ in 0..100 {
            board.step(Duration::from_millis(10));
        }
        assert!((board.speed(Wheel::Left) - SIM_MAX_SPEED_MPS).abs() < 0.01);
        assert_eq!(board.speed(Wheel::Right), 0.0);
        assert!(board.wheels[0].counter > 0);
    }

    #[test]
    fn test_reverse_counts_down_and_wraps() {
        let mut board = SimBoard::new(&BaseConfig::default()).with_counters(5, 0);
        board
            .write_motor(
                Wheel::Left,
                MotorCommand {
                    direction: Direction::Reverse,
                    magnitude: 255,
                },
            )
            .unwrap();
        board.step(Duration::from_millis(500));
        // Counted down through zero into the top of the 16-bit range
        assert!(board.wheels[0].counter > 60_000);
    }

    #[test]
    fn test_failed_writes_report_fault() {
        let mut board = SimBoard::new(&BaseConfig::default());
        board.set_fail_writes(true);
        assert!(matches!(
            board.write_motor(Wheel::Right, forward(10)),
            Err(BoardError::Simulated(_))
        ));
    }
}
