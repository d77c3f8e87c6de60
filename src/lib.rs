// Motion-control core of the Hase differential-drive base.
//
// Velocity commands become per-wheel PWM through a fixed-rate PID loop on
// encoder feedback; wheel ticks are integrated into an odometry pose; stale
// commands stop the robot.

pub mod base;
pub mod config;
pub mod control;
pub mod encoder;
pub mod messages;
pub mod motor;
pub mod odometry;
pub mod pid;
pub mod runtime;
pub mod units;
pub mod watchdog;

pub use base::{Base, BaseHandle, OdometryLoop, Readback, WheelReadback};
pub use config::{BaseConfig, ConfigError};
pub use control::{ControlLoop, CycleReport};
pub use motor::{MotorCommand, Wheel, WheelBoard};
