// Heading source for the drive
//
// Provides:
// - GyroIo trait + inputs reported once per control cycle
// - NoGyro for sim and replay (always disconnected)
// - ZenohGyro fed by IMU readings published on a zenoh topic

use std::time::Duration;

use tracing::{info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::config::IMU_TIMEOUT;
use crate::drive::odometry_thread::timestamp;
use crate::messages::ImuReading;
use crate::motor::kinematics::wrap_angle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GyroInputs {
    pub connected: bool,
    /// Latest absolute heading (rad), wrapped to [-pi, pi)
    pub yaw_position: f64,
    pub yaw_velocity_rad_per_sec: f64,
    /// Headings received since the previous cycle, oldest first
    pub odometry_yaw_timestamps: Vec<f64>,
    pub odometry_yaw_positions: Vec<f64>,
}

pub trait GyroIo: Send {
    /// Refresh `inputs`; the sub-cycle yaw arrays are replaced, not appended
    fn update_inputs(&mut self, _inputs: &mut GyroInputs) {}
}

/// No heading sensor; the drive integrates heading from the modules instead
#[derive(Debug, Default)]
pub struct NoGyro;

impl GyroIo for NoGyro {}

/// Buffers timestamped yaw readings and tracks connectivity
#[derive(Debug)]
pub struct HeadingTracker {
    timeout: f64,
    pending: Vec<(f64, ImuReading)>,
    latest: Option<(f64, ImuReading)>,
    connected: bool,
}

impl HeadingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.as_secs_f64(),
            pending: Vec::new(),
            latest: None,
            connected: false,
        }
    }

    /// Record a reading received at `at` (monotonic seconds)
    pub fn push(&mut self, at: f64, reading: ImuReading) {
        if !reading.yaw_rad.is_finite() {
            warn!("Ignoring non-finite IMU yaw");
            return;
        }
        self.pending.push((at, reading));
        self.latest = Some((at, reading));
    }

    pub fn update(&mut self, now: f64, inputs: &mut GyroInputs) {
        let connected = self
            .latest
            .is_some_and(|(at, _)| now - at <= self.timeout);
        if connected != self.connected {
            if connected {
                info!("IMU heading connected");
            } else {
                warn!("IMU heading lost, falling back to wheel odometry");
            }
            self.connected = connected;
        }

        inputs.connected = connected;
        if let Some((_, reading)) = self.latest {
            inputs.yaw_position = wrap_angle(reading.yaw_rad);
            inputs.yaw_velocity_rad_per_sec = if connected {
                reading.yaw_rate_rad_per_sec
            } else {
                0.0
            };
        }

        inputs.odometry_yaw_timestamps.clear();
        inputs.odometry_yaw_positions.clear();
        for (at, reading) in self.pending.drain(..) {
            inputs.odometry_yaw_timestamps.push(at);
            inputs.odometry_yaw_positions.push(wrap_angle(reading.yaw_rad));
        }
    }
}

pub struct ZenohGyro {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    tracker: HeadingTracker,
}

impl ZenohGyro {
    pub fn new(subscriber: Subscriber<FifoChannelHandler<Sample>>) -> Self {
        Self {
            subscriber,
            tracker: HeadingTracker::new(IMU_TIMEOUT),
        }
    }
}

impl GyroIo for ZenohGyro {
    fn update_inputs(&mut self, inputs: &mut GyroInputs) {
        // Drain all pending readings (non-blocking)
        while let Ok(Some(sample)) = self.subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ImuReading>(&payload) {
                Ok(reading) => self.tracker.push(timestamp(), reading),
                Err(e) => warn!("Failed to parse IMU reading: {}", e),
            }
        }
        self.tracker.update(timestamp(), inputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(yaw_rad: f64) -> ImuReading {
        ImuReading {
            yaw_rad,
            yaw_rate_rad_per_sec: 0.5,
        }
    }

    #[test]
    fn test_no_gyro_is_disconnected() {
        let mut gyro = NoGyro;
        let mut inputs = GyroInputs::default();
        gyro.update_inputs(&mut inputs);
        assert!(!inputs.connected);
        assert!(inputs.odometry_yaw_positions.is_empty());
    }

    #[test]
    fn test_tracker_drains_readings_in_order() {
        let mut tracker = HeadingTracker::new(IMU_TIMEOUT);
        let mut inputs = GyroInputs::default();
        tracker.push(1.00, reading(0.1));
        tracker.push(1.01, reading(0.2));
        tracker.update(1.02, &mut inputs);

        assert!(inputs.connected);
        assert_eq!(inputs.odometry_yaw_timestamps, vec![1.00, 1.01]);
        let yaws = &inputs.odometry_yaw_positions;
        assert_eq!(yaws.len(), 2);
        assert!((yaws[0] - 0.1).abs() < 1e-12 && (yaws[1] - 0.2).abs() < 1e-12);
        assert!((inputs.yaw_position - 0.2).abs() < 1e-12);
        assert_eq!(inputs.yaw_velocity_rad_per_sec, 0.5);

        tracker.update(1.03, &mut inputs);
        assert!(inputs.odometry_yaw_positions.is_empty());
        assert!(inputs.connected);
    }

    #[test]
    fn test_tracker_goes_stale() {
        let mut tracker = HeadingTracker::new(Duration::from_millis(250));
        let mut inputs = GyroInputs::default();
        tracker.update(0.0, &mut inputs);
        assert!(!inputs.connected);

        tracker.push(1.0, reading(0.3));
        tracker.update(1.2, &mut inputs);
        assert!(inputs.connected);
        tracker.update(1.3, &mut inputs);
        assert!(!inputs.connected);
        // Last heading is held
        assert!((inputs.yaw_position - 0.3).abs() < 1e-12);
        assert_eq!(inputs.yaw_velocity_rad_per_sec, 0.0);
    }

    #[test]
    fn test_tracker_wraps_and_rejects_nan() {
        let mut tracker = HeadingTracker::new(IMU_TIMEOUT);
        let mut inputs = GyroInputs::default();
        tracker.push(0.0, reading(f64::NAN));
        tracker.push(0.0, reading(std::f64::consts::TAU + 0.5));
        tracker.update(0.0, &mut inputs);
        assert_eq!(inputs.odometry_yaw_positions.len(), 1);
        assert!((inputs.yaw_position - 0.5).abs() < 1e-9);
    }
}
