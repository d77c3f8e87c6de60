// Wheel identity, motor commands and the board seam driven by the control loop.
//
// `SerialBoard` wraps the wheel-board protocol; `SimBoard` stands in for it
// when no hardware is attached.

use tracing::{debug, info, warn};

use super::bus::{self, BoardError, WheelBus};

/// Channel ids on the wheel board
pub const MOTOR_ID_LEFT: u8 = 1;
pub const MOTOR_ID_RIGHT: u8 = 2;

/// One side of the differential base. A wheel and its motor are the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    Left,
    Right,
}

impl Wheel {
    pub const ALL: [Wheel; 2] = [Wheel::Left, Wheel::Right];

    /// Index into per-wheel arrays ([left, right])
    pub fn index(self) -> usize {
        match self {
            Wheel::Left => 0,
            Wheel::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// PWM magnitude plus direction pins for one motor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorCommand {
    pub direction: Direction,
    pub magnitude: u16,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand {
        direction: Direction::Forward,
        magnitude: 0,
    };

    /// Split a signed controller output into direction and magnitude,
    /// clamping the magnitude to `max_pwm`
    pub fn from_output(output: i32, max_pwm: u16) -> Self {
        let direction = if output < 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let magnitude = output.unsigned_abs().min(u32::from(max_pwm)) as u16;
        Self {
            direction,
            magnitude,
        }
    }

    /// Signed output (negative = reverse)
    pub fn signed(&self) -> i32 {
        match self.direction {
            Direction::Forward => i32::from(self.magnitude),
            Direction::Reverse => -i32::from(self.magnitude),
        }
    }

    /// Duty cycle in [0, 1] for a given PWM range
    pub fn duty(&self, max_pwm: u16) -> f64 {
        if max_pwm == 0 {
            return 0.0;
        }
        (f64::from(self.magnitude) / f64::from(max_pwm)).min(1.0)
    }

    pub fn is_stop(&self) -> bool {
        self.magnitude == 0
    }
}

/// Hardware behind the control loop: encoder counters in, motor commands out
pub trait WheelBoard: Send {
    /// Raw cumulative pulse count; only the low `counter_bits()` bits are meaningful
    fn read_encoder(&mut self, wheel: Wheel) -> Result<u32, BoardError>;

    /// Width of the hardware counter behind `read_encoder`
    fn counter_bits(&self) -> u32;

    fn write_motor(&mut self, wheel: Wheel, command: MotorCommand) -> Result<(), BoardError>;

    /// Command both motors to zero
    fn stop(&mut self) -> Result<(), BoardError> {
        for wheel in Wheel::ALL {
            self.write_motor(wheel, MotorCommand::STOP)?;
        }
        Ok(())
    }
}

/// Wheel board on a serial port
pub struct SerialBoard {
    bus: WheelBus,
    motor_ids: [u8; 2], // [left, right]
}

impl SerialBoard {
    pub fn open(port: &str) -> Result<Self, BoardError> {
        Self::with_motor_ids(port, [MOTOR_ID_LEFT, MOTOR_ID_RIGHT])
    }

    pub fn with_motor_ids(port: &str, motor_ids: [u8; 2]) -> Result<Self, BoardError> {
        info!("Opening wheel board on {}", port);
        let bus = WheelBus::open(port)?;
        Ok(Self { bus, motor_ids })
    }

    /// Check both channels answer, zero their outputs and enable the drivers
    ///
    /// Must be called before the control loop starts.
    pub fn initialize(&mut self) -> Result<(), BoardError> {
        info!("Initializing wheel board channels {:?}", self.motor_ids);

        for &id in &self.motor_ids {
            match self.bus.firmware_version(id) {
                Ok(version) => debug!("Channel {} responding, firmware v{}", id, version),
                Err(e) => {
                    warn!("Channel {} not responding: {}", id, e);
                    return Err(e);
                }
            }
        }

        for &id in &self.motor_ids {
            self.bus.set_output(id, 0)?;
            self.bus.set_driver_enabled(id, true)?;
        }

        info!("Wheel board initialized");
        Ok(())
    }

    /// Let both wheels coast
    pub fn disable_drivers(&mut self) -> Result<(), BoardError> {
        info!("Disabling motor drivers");
        for &id in &self.motor_ids {
            self.bus.set_driver_enabled(id, false)?;
        }
        Ok(())
    }

    fn id(&self, wheel: Wheel) -> u8 {
        self.motor_ids[wheel.index()]
    }
}

impl WheelBoard for SerialBoard {
    fn read_encoder(&mut self, wheel: Wheel) -> Result<u32, BoardError> {
        let id = self.id(wheel);
        self.bus.encoder_count(id).map(u32::from)
    }

    fn counter_bits(&self) -> u32 {
        bus::COUNTER_BITS
    }

    fn write_motor(&mut self, wheel: Wheel, command: MotorCommand) -> Result<(), BoardError> {
        let id = self.id(wheel);
        let output = command.signed().clamp(-0x7FFF, 0x7FFF) as i16;
        self.bus.set_output(id, output)
    }

    /// One broadcast packet, no reply to wait for
    fn stop(&mut self) -> Result<(), BoardError> {
        info!("Stopping both motors");
        let outputs = [(self.motor_ids[0], 0), (self.motor_ids[1], 0)];
        self.bus.sync_set_outputs(&outputs)
    }
}

impl Drop for SerialBoard {
    fn drop(&mut self) {
        if let Err(e) = WheelBoard::stop(self) {
            warn!("Failed to stop motors on drop: {}", e);
        }
        if let Err(e) = self.disable_drivers() {
            warn!("Failed to disable drivers on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_positive_output() {
        let cmd = MotorCommand::from_output(120, 255);
        assert_eq!(cmd.direction, Direction::Forward);
        assert_eq!(cmd.magnitude, 120);
        assert_eq!(cmd.signed(), 120);
    }

    #[test]
    fn test_command_from_negative_output() {
        let cmd = MotorCommand::from_output(-80, 255);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.magnitude, 80);
        assert_eq!(cmd.signed(), -80);
    }

    #[test]
    fn test_command_magnitude_clamped() {
        assert_eq!(MotorCommand::from_output(10_000, 255).magnitude, 255);
        assert_eq!(MotorCommand::from_output(i32::MIN, 255).magnitude, 255);
        assert!((MotorCommand::from_output(-10_000, 255).duty(255) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_output_is_stop() {
        let cmd = MotorCommand::from_output(0, 255);
        assert!(cmd.is_stop());
        assert_eq!(cmd, MotorCommand::STOP);
    }

    #[test]
    fn test_wheel_indices() {
        assert_eq!(Wheel::ALL.map(Wheel::index), [0, 1]);
    }
}
