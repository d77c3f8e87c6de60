// Message types exchanged with the robot middleware

use serde::{Deserialize, Serialize};

use crate::base::BaseHandle;
use crate::odometry::Pose;

// Command from teleop/navigation -> runtime
// Tagged on "type", e.g. {"type":"speeds","left":0.2,"right":0.2}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WheelCommand {
    /// Wheel speeds in m/s
    Speeds { left: f64, right: f64 },
    /// Wheel speeds in ticks per control frame
    Ticks { left: i32, right: i32 },
    /// Body twist: linear m/s, angular rad/s (positive = counter-clockwise)
    Twist { linear: f64, angular: f64 },
    /// Refresh the watchdog without changing targets
    KeepAlive,
}

impl WheelCommand {
    pub fn apply(&self, base: &BaseHandle) {
        match *self {
            WheelCommand::Speeds { left, right } => base.set_speeds(left, right),
            WheelCommand::Ticks { left, right } => base.set_speeds_ticks(left, right),
            WheelCommand::Twist { linear, angular } => base.set_twist(linear, angular),
            WheelCommand::KeepAlive => base.keep_alive(),
        }
    }
}

/// Pose estimate published by runtime at the odometry rate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct OdometryMessage {
    pub pose: Pose,
    /// Body linear velocity over the last interval (m/s)
    pub linear_velocity: f64,
    /// Body angular velocity over the last interval (rad/s)
    pub angular_velocity: f64,
    /// Monotonic milliseconds since start when the encoders were read
    pub encoder_stamp_ms: u64,
    /// Monotonic milliseconds since start when the pose was computed
    pub odom_stamp_ms: u64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    #[default]
    CmdStale,
    DeviceFault,
}
