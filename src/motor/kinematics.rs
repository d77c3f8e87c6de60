// Differential-drive inverse kinematics for the Hase base
// Converts a body twist (linear m/s, angular rad/s) to left/right wheel speeds.

/// Linear wheel speeds in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Convert a body twist to wheel speeds
///
/// # Arguments
/// * `linear` - Forward velocity in m/s (positive = forward)
/// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
/// * `wheel_track` - Distance between the wheels in meters
pub fn twist_to_wheel_speeds(linear: f64, angular: f64, wheel_track: f64) -> WheelSpeeds {
    let half_track = wheel_track / 2.0;
    WheelSpeeds {
        left: linear - angular * half_track,
        right: linear + angular * half_track,
    }
}

/// Body twist (linear m/s, angular rad/s) produced by a pair of wheel speeds
pub fn wheel_speeds_to_twist(speeds: WheelSpeeds, wheel_track: f64) -> (f64, f64) {
    let linear = (speeds.left + speeds.right) / 2.0;
    let angular = (speeds.right - speeds.left) / wheel_track;
    (linear, angular)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: f64 = 0.23;

    #[test]
    fn test_zero_twist() {
        assert_eq!(twist_to_wheel_speeds(0.0, 0.0, TRACK), WheelSpeeds::default());
    }

    #[test]
    fn test_forward_motion() {
        let speeds = twist_to_wheel_speeds(0.5, 0.0, TRACK);
        assert_eq!(speeds.left, 0.5);
        assert_eq!(speeds.right, 0.5);
    }

    #[test]
    fn test_rotation_only() {
        // Counter-clockwise spin: right wheel forward, left wheel back
        let speeds = twist_to_wheel_speeds(0.0, 1.0, TRACK);
        assert!((speeds.left + 0.115).abs() < 1e-12);
        assert!((speeds.right - 0.115).abs() < 1e-12);
    }

    #[test]
    fn test_twist_round_trip() {
        let speeds = twist_to_wheel_speeds(0.3, -0.8, TRACK);
        let (linear, angular) = wheel_speeds_to_twist(speeds, TRACK);
        assert!((linear - 0.3).abs() < 1e-12);
        assert!((angular + 0.8).abs() < 1e-12);
    }
}
