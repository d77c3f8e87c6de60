// Public command facade and the state shared between execution contexts
//
// Three contexts touch the base:
// - the control loop (encoder sampling + PID), which owns the samplers and
//   controllers and is the only writer of the readback snapshot,
// - the odometry loop, which owns its own previous counts and pose,
// - command handling, which writes targets through `BaseHandle`.
//
// Targets and the watchdog live behind one short critical section, so the
// control loop always sees both wheels' targets from the same command.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{BaseConfig, ConfigError};
use crate::control::ControlLoop;
use crate::messages::{OdometryMessage, RuntimeHealth};
use crate::motor::{twist_to_wheel_speeds, MotorCommand, Wheel, WheelBoard};
use crate::odometry::OdometryEstimator;
use crate::pid::{SetPointInfo, Target};
use crate::units::UnitConverter;
use crate::watchdog::Watchdog;

/// Written by command handling, read once per control cycle
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandState {
    pub targets: [Target; 2],
    pub watchdog: Watchdog,
    pub reset_requests: [bool; 2],
}

/// Snapshot of one wheel, published at the end of every control cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelReadback {
    pub pulses: i64,
    pub pulses_per_second: i32,
    pub rpm: i32,
    pub speed_mps: f64,
    pub revolutions: i64,
    /// Bumped every time the wheel's encoder count is reset
    pub reset_generation: u32,
    pub setpoint: SetPointInfo,
    pub command: MotorCommand,
}

/// Consistent snapshot of both wheels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readback {
    pub wheels: [WheelReadback; 2],
    pub health: RuntimeHealth,
    pub stale: bool,
    pub sampled_at: Option<Instant>,
}

impl Readback {
    pub fn wheel(&self, wheel: Wheel) -> &WheelReadback {
        &self.wheels[wheel.index()]
    }
}

pub(crate) struct Shared {
    pub command: Mutex<CommandState>,
    pub readback: Mutex<Readback>,
}

/// Cloneable handle for the command source and readback consumers
#[derive(Clone)]
pub struct BaseHandle {
    shared: Arc<Shared>,
    units: UnitConverter,
    wheel_track_m: f64,
}

impl BaseHandle {
    /// Set both wheel speeds in m/s and feed the watchdog
    ///
    /// Out-of-range speeds are not rejected; the controller clamps its output.
    pub fn set_speeds(&self, left_mps: f64, right_mps: f64) {
        let targets = [
            Target::from_speed(&self.units, left_mps),
            Target::from_speed(&self.units, right_mps),
        ];
        self.apply(targets);
    }

    /// Set both wheel speeds in ticks per control frame and feed the watchdog
    pub fn set_speeds_ticks(&self, left_tpf: i32, right_tpf: i32) {
        let targets = [
            Target::from_ticks(&self.units, left_tpf),
            Target::from_ticks(&self.units, right_tpf),
        ];
        self.apply(targets);
    }

    /// Set a body twist: linear m/s, angular rad/s
    pub fn set_twist(&self, linear: f64, angular: f64) {
        let speeds = twist_to_wheel_speeds(linear, angular, self.wheel_track_m);
        self.set_speeds(speeds.left, speeds.right);
    }

    /// Feed the watchdog without changing the stored targets
    pub fn keep_alive(&self) {
        self.shared.command.lock().watchdog.feed(Instant::now());
    }

    /// Zero a wheel's pulse count at the start of the next control cycle
    pub fn reset_encoder(&self, wheel: Wheel) {
        info!("Encoder reset requested for {:?} wheel", wheel);
        self.shared.command.lock().reset_requests[wheel.index()] = true;
    }

    fn apply(&self, targets: [Target; 2]) {
        debug!(
            "Targets: left={:.3}m/s ({} tpf), right={:.3}m/s ({} tpf)",
            targets[0].speed_mps,
            targets[0].ticks_per_frame,
            targets[1].speed_mps,
            targets[1].ticks_per_frame
        );
        let mut command = self.shared.command.lock();
        command.targets = targets;
        command.watchdog.feed(Instant::now());
    }

    /// Stored (requested) target; the effective one is zero while stale
    pub fn target(&self, wheel: Wheel) -> Target {
        self.shared.command.lock().targets[wheel.index()]
    }

    pub fn readback(&self) -> Readback {
        *self.shared.readback.lock()
    }

    pub fn wheel(&self, wheel: Wheel) -> WheelReadback {
        *self.shared.readback.lock().wheel(wheel)
    }

    pub fn pulses(&self, wheel: Wheel) -> i64 {
        self.wheel(wheel).pulses
    }

    pub fn pulses_per_second(&self, wheel: Wheel) -> i32 {
        self.wheel(wheel).pulses_per_second
    }

    pub fn rpm(&self, wheel: Wheel) -> i32 {
        self.wheel(wheel).rpm
    }

    pub fn wheel_speed(&self, wheel: Wheel) -> f64 {
        self.wheel(wheel).speed_mps
    }

    pub fn revolutions(&self, wheel: Wheel) -> i64 {
        self.wheel(wheel).revolutions
    }

    pub fn health(&self) -> RuntimeHealth {
        self.shared.readback.lock().health
    }

    pub fn speed_to_ticks(&self, speed_mps: f64) -> i32 {
        self.units.speed_to_ticks(speed_mps)
    }

    pub fn ticks_to_speed(&self, ticks_per_frame: i32) -> f64 {
        self.units.ticks_to_speed(ticks_per_frame)
    }

    pub fn units(&self) -> &UnitConverter {
        &self.units
    }
}

/// Odometry cycle: reads the control loop's published counts at its own cadence
pub struct OdometryLoop {
    shared: Arc<Shared>,
    estimator: OdometryEstimator,
}

impl OdometryLoop {
    pub fn cycle(&mut self, now: Instant) -> OdometryMessage {
        let (counts, generations) = {
            let readback = self.shared.readback.lock();
            (
                readback.wheels.map(|w| w.pulses),
                readback.wheels.map(|w| w.reset_generation),
            )
        };
        self.estimator.update(counts, generations, now)
    }

    pub fn estimator(&self) -> &OdometryEstimator {
        &self.estimator
    }
}

/// A fully wired base: command handle, control loop and odometry loop
pub struct Base {
    pub handle: BaseHandle,
    pub control: ControlLoop,
    pub odometry: OdometryLoop,
}

impl Base {
    /// Validate the configuration and wire the three contexts together.
    /// Misconfiguration stops here, before any cycle runs.
    pub fn new(config: &BaseConfig, board: Box<dyn WheelBoard>) -> Result<Self, ConfigError> {
        config.validate()?;
        let units = UnitConverter::from_config(config)?;
        let epoch = Instant::now();

        let shared = Arc::new(Shared {
            command: Mutex::new(CommandState {
                targets: [Target::ZERO; 2],
                watchdog: Watchdog::new(config.auto_stop()),
                reset_requests: [false; 2],
            }),
            readback: Mutex::new(Readback::default()),
        });

        let control = ControlLoop::new(config, units, board, Arc::clone(&shared))?;
        let estimator = OdometryEstimator::new(units, config.calibration.wheel_track_m, epoch)?;

        info!(
            "Base ready: {}Hz control, {}Hz odometry, {:.1} ticks/m, {}ms auto-stop",
            config.pid_rate_hz,
            config.odom_rate_hz,
            units.ticks_per_meter(),
            config.auto_stop_ms
        );

        Ok(Self {
            handle: BaseHandle {
                shared: Arc::clone(&shared),
                units,
                wheel_track_m: config.calibration.wheel_track_m,
            },
            control,
            odometry: OdometryLoop { shared, estimator },
        })
    }
}
