// Fixed-rate control cycle: watchdog, encoder sampling and per-wheel PID
//
// One call to `ControlLoop::cycle` is one control frame. It does no waiting
// and no allocation on the success path; the caller provides the pacing.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::base::{Readback, Shared, WheelReadback};
use crate::config::{BaseConfig, ConfigError, StalePolicy};
use crate::encoder::EncoderSampler;
use crate::messages::RuntimeHealth;
use crate::motor::{BoardError, MotorCommand, Wheel, WheelBoard};
use crate::pid::{SpeedController, Target};
use crate::units::UnitConverter;

/// Outcome of one control frame
#[derive(Debug)]
pub struct CycleReport {
    /// Watchdog forced both targets to zero this frame
    pub stale: bool,
    /// Command written per wheel [left, right], or the device fault that stopped it
    pub outcomes: [Result<MotorCommand, BoardError>; 2],
}

impl CycleReport {
    pub fn outcome(&self, wheel: Wheel) -> &Result<MotorCommand, BoardError> {
        &self.outcomes[wheel.index()]
    }

    pub fn is_ok(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    pub fn health(&self) -> RuntimeHealth {
        if !self.is_ok() {
            RuntimeHealth::DeviceFault
        } else if self.stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }
}

pub struct ControlLoop {
    board: Box<dyn WheelBoard>,
    shared: Arc<Shared>,
    units: UnitConverter,
    samplers: [EncoderSampler; 2],
    controllers: [SpeedController; 2],
    reset_generations: [u32; 2],
    stale_policy: StalePolicy,
    was_stale: bool,
    faulted: [bool; 2],
    /// Last command the board accepted, per wheel
    sent: [MotorCommand; 2],
}

impl ControlLoop {
    pub(crate) fn new(
        config: &BaseConfig,
        units: UnitConverter,
        board: Box<dyn WheelBoard>,
        shared: Arc<Shared>,
    ) -> Result<Self, ConfigError> {
        let sampler = EncoderSampler::new(
            board.counter_bits(),
            config.pid_rate_hz,
            config.calibration.counts_per_output_rev(),
        )?;
        let controller =
            SpeedController::new(config.gains, config.control_interval(), config.max_pwm)?;
        debug!(
            "Speed controller: kc={} ti={} td={} integral limit={}",
            config.gains.kc,
            config.gains.ti,
            config.gains.td,
            controller.integral_limit()
        );

        Ok(Self {
            board,
            shared,
            units,
            samplers: [sampler.clone(), sampler],
            controllers: [controller.clone(), controller],
            reset_generations: [0; 2],
            stale_policy: config.stale_policy,
            // watchdog starts stale, so the first cycle logs nothing
            was_stale: true,
            faulted: [false; 2],
            sent: [MotorCommand::STOP; 2],
        })
    }

    /// Run one control frame at time `now`
    pub fn cycle(&mut self, now: Instant) -> CycleReport {
        // 1. Targets, watchdog and reset requests under one lock.
        // No targets while stale: both motors are held at zero output.
        let (targets, stale, resets, age) = {
            let mut command = self.shared.command.lock();
            let stale = command.watchdog.is_stale(now);
            let age = command.watchdog.age(now);
            let resets = std::mem::take(&mut command.reset_requests);
            let targets = if stale {
                if self.stale_policy == StalePolicy::ClearIntent {
                    command.targets = [Target::ZERO; 2];
                }
                None
            } else {
                Some(command.targets)
            };
            (targets, stale, resets, age)
        };

        if stale && !self.was_stale {
            warn!("No command for {:?}, stopping robot", age.unwrap_or_default());
        } else if !stale && self.was_stale {
            info!("Commands resumed");
        }
        self.was_stale = stale;

        // 2. Encoder resets requested since the last frame
        for wheel in Wheel::ALL {
            let i = wheel.index();
            if resets[i] {
                self.samplers[i].reset();
                self.controllers[i].reset();
                self.reset_generations[i] = self.reset_generations[i].wrapping_add(1);
                info!("{:?} encoder reset", wheel);
            }
        }

        // 3. Sample, regulate and drive each wheel
        let outcomes = Wheel::ALL.map(|wheel| {
            let target = targets.map(|targets| targets[wheel.index()]);
            self.drive_wheel(wheel, target)
        });
        for wheel in Wheel::ALL {
            self.log_fault_transition(wheel, &outcomes[wheel.index()]);
        }

        let report = CycleReport { stale, outcomes };

        // 4. Publish one consistent snapshot of both wheels
        let readback = Readback {
            wheels: Wheel::ALL.map(|wheel| self.wheel_readback(wheel)),
            health: report.health(),
            stale,
            sampled_at: Some(now),
        };
        *self.shared.readback.lock() = readback;

        report
    }

    /// Sample one wheel and write its command. `None` holds the motor at zero
    /// while the encoder keeps being counted.
    fn drive_wheel(
        &mut self,
        wheel: Wheel,
        target: Option<Target>,
    ) -> Result<MotorCommand, BoardError> {
        let i = wheel.index();
        let raw = match self.board.read_encoder(wheel) {
            Ok(raw) => raw,
            Err(e) => {
                // no feedback this frame, don't leave the last output running
                match self.board.write_motor(wheel, MotorCommand::STOP) {
                    Ok(()) => self.sent[i] = MotorCommand::STOP,
                    Err(stop_err) => warn!("{:?} wheel stop failed: {}", wheel, stop_err),
                }
                return Err(e);
            }
        };
        let delta = self.samplers[i].sample(raw);
        let pulses = self.samplers[i].pulses();

        let command = match target {
            Some(target) => self.controllers[i].update(target, pulses),
            None => {
                self.controllers[i].hold(pulses);
                MotorCommand::STOP
            }
        };
        debug!(
            "{:?}: target={:?} delta={} output={}",
            wheel,
            target.map(|t| t.ticks_per_frame),
            delta,
            command.signed()
        );
        self.board.write_motor(wheel, command)?;
        self.sent[i] = command;
        Ok(command)
    }

    fn wheel_readback(&self, wheel: Wheel) -> WheelReadback {
        let i = wheel.index();
        let sampler = &self.samplers[i];
        WheelReadback {
            pulses: sampler.pulses(),
            pulses_per_second: sampler.pulses_per_second(),
            rpm: sampler.rpm(),
            speed_mps: sampler.wheel_speed(&self.units),
            revolutions: sampler.revolutions(),
            reset_generation: self.reset_generations[i],
            setpoint: *self.controllers[i].state(),
            command: self.sent[i],
        }
    }

    fn log_fault_transition(&mut self, wheel: Wheel, outcome: &Result<MotorCommand, BoardError>) {
        let i = wheel.index();
        match outcome {
            Err(e) if !self.faulted[i] => {
                warn!("{:?} wheel device fault, skipping cycle: {}", wheel, e);
                self.faulted[i] = true;
            }
            Err(e) => debug!("{:?} wheel still faulted: {}", wheel, e),
            Ok(_) if self.faulted[i] => {
                info!("{:?} wheel recovered", wheel);
                self.faulted[i] = false;
            }
            Ok(_) => {}
        }
    }

    /// Command both motors to zero, e.g. on shutdown
    pub fn stop(&mut self) -> Result<(), BoardError> {
        info!("Stopping base");
        self.board.stop()
    }

    pub fn controller(&self, wheel: Wheel) -> &SpeedController {
        &self.controllers[wheel.index()]
    }

    pub fn sampler(&self, wheel: Wheel) -> &EncoderSampler {
        &self.samplers[wheel.index()]
    }
}
