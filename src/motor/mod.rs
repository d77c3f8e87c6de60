// Motor and encoder hardware for the Hase differential-drive base
//
// Provides:
// - Wheel identity and signed motor commands
// - The `WheelBoard` seam driven by the control loop
// - Serial wheel-board protocol and a simulated board
// - Differential-drive kinematics (body twist -> wheel speeds)

pub mod bus;
mod driver;
pub mod kinematics;
pub mod sim;

pub use bus::{BoardError, WheelBus};
pub use driver::{
    Direction, MotorCommand, SerialBoard, Wheel, WheelBoard, MOTOR_ID_LEFT, MOTOR_ID_RIGHT,
};
pub use kinematics::{twist_to_wheel_speeds, WheelSpeeds};
pub use sim::SimBoard;
