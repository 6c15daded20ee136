// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::odometry::{OdometrySample, Pose2d};
use crate::motor::kinematics::{ChassisSpeeds, SwerveModuleState, MODULE_COUNT};

// Command from teleop/scripts -> runtime
// Body-frame velocities; NaN components are treated as zero by the drive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChassisCommand {
    pub vx: f64,    // m/s, forward
    pub vy: f64,    // m/s, left
    pub omega: f64, // rad/s, counter-clockwise
}

impl From<&ChassisCommand> for ChassisSpeeds {
    fn from(cmd: &ChassisCommand) -> Self {
        ChassisSpeeds::new(cmd.vx, cmd.vy, cmd.omega)
    }
}

// Heading reading from the IMU bridge -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImuReading {
    pub yaw_rad: f64,
    pub yaw_rate_rad_per_sec: f64,
}

// One forwarded odometry sample, runtime -> estimators/loggers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OdometryMessage {
    pub timestamp: f64,
    pub drive_positions_rad: [f64; MODULE_COUNT],
    pub turn_positions: [f64; MODULE_COUNT],
    pub heading: f64,
}

impl From<&OdometrySample> for OdometryMessage {
    fn from(sample: &OdometrySample) -> Self {
        Self {
            timestamp: sample.timestamp,
            drive_positions_rad: sample.drive_positions_rad,
            turn_positions: sample.turn_positions,
            heading: sample.heading,
        }
    }
}

// Dead-reckoned pose, runtime -> consumers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoseMessage {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl PoseMessage {
    pub fn new(timestamp: f64, pose: Pose2d) -> Self {
        Self {
            timestamp,
            x: pose.x,
            y: pose.y,
            heading: pose.heading,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// Commands are fresh but some module backend failed its sensor reads
    SensorStale,
}

/// Health report with the commanded and measured module states
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthMessage {
    pub status: RuntimeHealth,
    pub gyro_connected: bool,
    pub setpoints: [SwerveModuleState; MODULE_COUNT],
    pub measured: [SwerveModuleState; MODULE_COUNT],
}
