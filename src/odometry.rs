// Dead-reckoning odometry
//
// Integrates wheel pulse deltas into a planar pose at the odometry rate. It
// keeps its own previous counts, independent of the speed controller's,
// because the two run at different cadences.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::messages::OdometryMessage;
use crate::units::UnitConverter;

/// Accumulated planar pose; heading is not wrapped
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Odometry bookkeeping, mutated once per odometry cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdomInfo {
    /// When odometry was last computed
    pub last_odom: Instant,
    /// When the encoders were last read
    pub encoder_stamp: Instant,
    pub encoder_time_ms: u64,
    pub last_encoder_time_ms: u64,
    pub odom_time_ms: u64,
    pub last_odom_time_ms: u64,
    /// Encoder counts used by the previous odometry cycle
    pub prev_left_enc: i64,
    pub prev_right_enc: i64,
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

pub struct OdometryEstimator {
    units: UnitConverter,
    wheel_track: f64,
    epoch: Instant,
    info: OdomInfo,
    reset_generations: [u32; 2],
    updates: u64,
}

impl OdometryEstimator {
    /// `epoch` is time zero for the millisecond stamps
    pub fn new(units: UnitConverter, wheel_track: f64, epoch: Instant) -> Result<Self, ConfigError> {
        if !wheel_track.is_finite() || wheel_track <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "wheel_track_m",
                value: wheel_track,
            });
        }
        Ok(Self {
            units,
            wheel_track,
            epoch,
            info: OdomInfo {
                last_odom: epoch,
                encoder_stamp: epoch,
                encoder_time_ms: 0,
                last_encoder_time_ms: 0,
                odom_time_ms: 0,
                last_odom_time_ms: 0,
                prev_left_enc: 0,
                prev_right_enc: 0,
                linear_x: 0.0,
                linear_y: 0.0,
                angular_z: 0.0,
            },
            reset_generations: [0; 2],
            updates: 0,
        })
    }

    /// Integrate the motion since the previous call
    ///
    /// `counts` are the cumulative [left, right] pulse counts. A change in a
    /// wheel's `reset_generations` entry means its count was zeroed since the
    /// last call, so that wheel's previous count restarts from zero.
    pub fn update(
        &mut self,
        counts: [i64; 2],
        reset_generations: [u32; 2],
        now: Instant,
    ) -> OdometryMessage {
        let info = &mut self.info;
        if reset_generations[0] != self.reset_generations[0] {
            info.prev_left_enc = 0;
        }
        if reset_generations[1] != self.reset_generations[1] {
            info.prev_right_enc = 0;
        }
        self.reset_generations = reset_generations;

        let [left, right] = counts;
        let delta_left = self.units.ticks_to_meters(left - info.prev_left_enc);
        let delta_right = self.units.ticks_to_meters(right - info.prev_right_enc);
        info.prev_left_enc = left;
        info.prev_right_enc = right;

        let delta_distance = (delta_left + delta_right) / 2.0;
        let delta_heading = (delta_right - delta_left) / self.wheel_track;

        // Midpoint integration: project along the average heading of the interval
        let half_turn = delta_heading / 2.0;
        info.angular_z += half_turn;
        info.linear_x += delta_distance * info.angular_z.cos();
        info.linear_y += delta_distance * info.angular_z.sin();
        info.angular_z += half_turn;

        let dt = now.saturating_duration_since(info.last_odom).as_secs_f64();
        let (linear_velocity, angular_velocity) = if self.updates > 0 && dt > 0.0 {
            (delta_distance / dt, delta_heading / dt)
        } else {
            (0.0, 0.0)
        };

        let stamp_ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        info.last_encoder_time_ms = info.encoder_time_ms;
        info.encoder_time_ms = stamp_ms;
        info.encoder_stamp = now;
        info.last_odom_time_ms = info.odom_time_ms;
        info.odom_time_ms = stamp_ms;
        info.last_odom = now;
        self.updates += 1;

        debug!(
            "Odometry: x={:.3} y={:.3} th={:.3} (dd={:.4}m dth={:.4}rad)",
            info.linear_x, info.linear_y, info.angular_z, delta_distance, delta_heading
        );

        OdometryMessage {
            pose: self.pose(),
            linear_velocity,
            angular_velocity,
            encoder_stamp_ms: stamp_ms,
            odom_stamp_ms: stamp_ms,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x: self.info.linear_x,
            y: self.info.linear_y,
            heading: self.info.angular_z,
        }
    }

    pub fn info(&self) -> &OdomInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Calibration;
    use std::f64::consts::PI;
    use std::time::Duration;

    const TRACK: f64 = 0.23;
    const DIAMETER: f64 = 0.123825;
    const REV: i64 = 1920;

    fn estimator(epoch: Instant) -> OdometryEstimator {
        let units = UnitConverter::new(&Calibration::default(), 1.0 / 30.0).unwrap();
        OdometryEstimator::new(units, TRACK, epoch).unwrap()
    }

    #[test]
    fn test_straight_line_keeps_heading() {
        let t0 = Instant::now();
        let mut odom = estimator(t0);
        for n in 1..=50 {
            let count = n * 137;
            odom.update([count, count], [0, 0], t0 + Duration::from_millis(100 * n as u64));
        }
        let pose = odom.pose();
        assert_eq!(pose.heading, 0.0);
        assert_eq!(pose.y, 0.0);
        let expected = 50.0 * 137.0 / Calibration::default().ticks_per_meter();
        assert!((pose.x - expected).abs() < 1e-9);
    }

    #[test]
    fn test_right_wheel_revolution_turns_left() {
        let t0 = Instant::now();
        let mut odom = estimator(t0);
        odom.update([0, REV], [0, 0], t0 + Duration::from_millis(100));
        let delta_right_m = PI * DIAMETER;
        let pose = odom.pose();
        assert!((pose.heading - delta_right_m / TRACK).abs() < 1e-9);

        // Midpoint step: half the arc length along half the turn
        let half = pose.heading / 2.0;
        assert!((pose.x - delta_right_m / 2.0 * half.cos()).abs() < 1e-9);
        assert!((pose.y - delta_right_m / 2.0 * half.sin()).abs() < 1e-9);
    }

    #[test]
    fn test_spin_in_place_does_not_translate() {
        let t0 = Instant::now();
        let mut odom = estimator(t0);
        odom.update([-500, 500], [0, 0], t0 + Duration::from_millis(100));
        let pose = odom.pose();
        assert!(pose.x.abs() < 1e-12 && pose.y.abs() < 1e-12);
        assert!(pose.heading > 0.0);
    }

    #[test]
    fn test_timestamps_and_velocities() {
        let t0 = Instant::now();
        let mut odom = estimator(t0);
        let first = odom.update([0, 0], [0, 0], t0 + Duration::from_millis(100));
        assert_eq!(first.encoder_stamp_ms, 100);
        assert_eq!(first.odom_stamp_ms, 100);
        assert_eq!(first.linear_velocity, 0.0);

        let ticks = 494; // ~0.1m
        let second = odom.update([ticks, ticks], [0, 0], t0 + Duration::from_millis(200));
        assert_eq!(second.odom_stamp_ms, 200);
        assert_eq!(odom.info().last_odom_time_ms, 100);
        assert_eq!(odom.info().last_encoder_time_ms, 100);
        let meters = ticks as f64 / Calibration::default().ticks_per_meter();
        assert!((second.linear_velocity - meters / 0.1).abs() < 1e-9);
        assert_eq!(second.angular_velocity, 0.0);
    }

    #[test]
    fn test_encoder_reset_does_not_jump() {
        let t0 = Instant::now();
        let mut odom = estimator(t0);
        odom.update([1000, 1000], [0, 0], t0 + Duration::from_millis(100));
        let before = odom.pose();
        // Left count zeroed and then moved 10 more pulses, as did the right
        odom.update([10, 1010], [1, 0], t0 + Duration::from_millis(200));
        let after = odom.pose();
        assert_eq!(after.heading, before.heading);
        let step = 10.0 / Calibration::default().ticks_per_meter();
        assert!((after.x - before.x - step).abs() < 1e-12);
    }

    #[test]
    fn test_zero_track_rejected() {
        let units = UnitConverter::new(&Calibration::default(), 1.0 / 30.0).unwrap();
        assert!(OdometryEstimator::new(units, 0.0, Instant::now()).is_err());
    }
}
