// Speed loop against a deterministic first-order wheel model, one model step per frame

use std::time::{Duration, Instant};

use hase_zenoh_runtime::config::{BaseConfig, MAX_PWM};
use hase_zenoh_runtime::motor::{BoardError, MotorCommand, Wheel, WheelBoard};
use hase_zenoh_runtime::Base;

const MAX_SPEED_MPS: f64 = 1.2;
const TIME_CONSTANT_S: f64 = 0.15;

struct PlantBoard {
    ticks_per_meter: f64,
    interval: f64,
    speed: [f64; 2],
    fraction: [f64; 2],
    raw: [u16; 2],
}

impl PlantBoard {
    fn new(config: &BaseConfig) -> Self {
        Self {
            ticks_per_meter: config.calibration.ticks_per_meter(),
            interval: config.control_interval(),
            speed: [0.0; 2],
            fraction: [0.0; 2],
            raw: [0; 2],
        }
    }
}

impl WheelBoard for PlantBoard {
    fn read_encoder(&mut self, wheel: Wheel) -> Result<u32, BoardError> {
        Ok(u32::from(self.raw[wheel.index()]))
    }

    fn counter_bits(&self) -> u32 {
        16
    }

    fn write_motor(&mut self, wheel: Wheel, command: MotorCommand) -> Result<(), BoardError> {
        let i = wheel.index();
        let duty = f64::from(command.signed()) / f64::from(MAX_PWM);
        let alpha = 1.0 - (-self.interval / TIME_CONSTANT_S).exp();
        self.speed[i] += (duty * MAX_SPEED_MPS - self.speed[i]) * alpha;

        let ticks = self.speed[i] * self.interval * self.ticks_per_meter + self.fraction[i];
        let whole = ticks.trunc();
        self.fraction[i] = ticks - whole;
        self.raw[i] = self.raw[i].wrapping_add(whole as i64 as u16);
        Ok(())
    }
}

fn settle(left: f64, right: f64, frames: u32) -> (Base, Vec<[i32; 2]>) {
    let config = BaseConfig::default();
    let board = PlantBoard::new(&config);
    let mut base = Base::new(&config, Box::new(board)).unwrap();
    base.handle.set_speeds(left, right);

    let t0 = Instant::now();
    let frame = Duration::from_millis(33);
    let mut deltas = Vec::new();
    for n in 0..frames {
        base.control.cycle(t0 + frame * n);
        deltas.push(Wheel::ALL.map(|w| base.control.sampler(w).delta()));
    }
    (base, deltas)
}

fn mean(values: impl Iterator<Item = i32>) -> f64 {
    let values: Vec<i32> = values.collect();
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}

#[test]
fn test_tracks_forward_target() {
    let (base, deltas) = settle(0.3, 0.3, 60);
    let target = f64::from(base.handle.speed_to_ticks(0.3));
    let tail = &deltas[deltas.len() - 20..];
    for i in 0..2 {
        let avg = mean(tail.iter().map(|d| d[i]));
        assert!(
            (avg - target).abs() < 2.0,
            "wheel {} settled at {} ticks/frame, target {}",
            i,
            avg,
            target
        );
    }
}

#[test]
fn test_tracks_opposite_targets() {
    let (base, deltas) = settle(0.5, -0.5, 60);
    let target = f64::from(base.handle.speed_to_ticks(0.5));
    let tail = &deltas[deltas.len() - 20..];
    assert!((mean(tail.iter().map(|d| d[0])) - target).abs() < 2.0);
    assert!((mean(tail.iter().map(|d| d[1])) + target).abs() < 2.0);
}

#[test]
fn test_integral_stays_bounded_while_tracking() {
    let (base, _) = settle(0.8, 0.8, 60);
    for wheel in Wheel::ALL {
        let controller = base.control.controller(wheel);
        assert!(controller.state().integrated_error.abs() <= controller.integral_limit());
    }
}
