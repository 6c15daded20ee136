// Odometry samples forwarded by the drive, and a dead-reckoning pose estimator.

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::{
    MODULE_COUNT, SwerveKinematics, SwerveModulePosition, Twist2d, wrap_angle,
};

/// All four modules sampled at one instant, plus the heading at that instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OdometrySample {
    pub timestamp: f64,
    pub drive_positions_rad: [f64; MODULE_COUNT],
    pub turn_positions: [f64; MODULE_COUNT],
    /// Wheel distance (m) and azimuth per module
    pub module_positions: [SwerveModulePosition; MODULE_COUNT],
    /// Gyro yaw when connected, otherwise integrated from the modules
    pub heading: f64,
}

/// Consumer of the drive's ordered odometry stream
pub trait PoseEstimator {
    fn add_odometry_sample(&mut self, sample: &OdometrySample);
}

/// Collects samples as-is, e.g. for forwarding over the network
impl PoseEstimator for Vec<OdometrySample> {
    fn add_odometry_sample(&mut self, sample: &OdometrySample) {
        self.push(*sample);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: wrap_angle(heading),
        }
    }

    /// Apply a body-frame twist along a constant-curvature arc
    pub fn exp(&self, twist: Twist2d) -> Self {
        let Twist2d { dx, dy, dtheta } = twist;
        let (sin_theta, cos_theta) = dtheta.sin_cos();
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };
        let local_x = dx * s - dy * c;
        let local_y = dx * c + dy * s;

        let (sin_h, cos_h) = self.heading.sin_cos();
        Self::new(
            self.x + local_x * cos_h - local_y * sin_h,
            self.y + local_x * sin_h + local_y * cos_h,
            self.heading + dtheta,
        )
    }
}

/// Pure wheel odometry; the heading in each sample overrides the kinematic rotation
#[derive(Debug, Clone)]
pub struct WheelOdometry {
    kinematics: SwerveKinematics,
    pose: Pose2d,
    last: Option<([SwerveModulePosition; MODULE_COUNT], f64)>,
}

impl WheelOdometry {
    pub fn new(kinematics: SwerveKinematics) -> Self {
        Self {
            kinematics,
            pose: Pose2d::default(),
            last: None,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Reset the pose; the next sample becomes the new reference
    pub fn reset(&mut self, pose: Pose2d) {
        self.pose = pose;
        self.last = None;
    }
}

impl PoseEstimator for WheelOdometry {
    fn add_odometry_sample(&mut self, sample: &OdometrySample) {
        let Some((last_positions, last_heading)) = self.last else {
            self.last = Some((sample.module_positions, sample.heading));
            return;
        };

        let mut deltas = [SwerveModulePosition::default(); MODULE_COUNT];
        for ((delta, now), before) in deltas
            .iter_mut()
            .zip(&sample.module_positions)
            .zip(&last_positions)
        {
            *delta = SwerveModulePosition::new(now.distance - before.distance, now.angle);
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta = wrap_angle(sample.heading - last_heading);
        self.pose = self.pose.exp(twist);
        self.last = Some((sample.module_positions, sample.heading));
    }
}
