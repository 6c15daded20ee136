// Loop timing, topics, and the drive configuration file
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::{FeedforwardGains, PidGains};
use crate::motor::dc_motor::MotorModel;
use crate::motor::kinematics::MODULE_COUNT;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Control period in seconds
pub const LOOP_PERIOD_SECS: f64 = 1.0 / LOOP_HZ as f64;

// Fastest odometry sampling allowed, as a multiple of the loop rate
pub const MAX_ODOMETRY_MULTIPLE: f64 = 5.0;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// IMU readings older than this mark the heading source disconnected
pub const IMU_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // chassis commands
pub const TOPIC_ODOMETRY: &str = "swerve/state/odometry"; // forwarded odometry samples
pub const TOPIC_POSE: &str = "swerve/state/pose"; // wheel-odometry pose
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status
pub const TOPIC_IMU: &str = "swerve/sensor/imu"; // heading source input

// Serial port for the Feetech module servos
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

/// Which backends the drive runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    /// Feetech servos and the zenoh IMU
    Real,
    /// Physics-simulated modules, no gyro
    Sim,
    /// No-op backends for log replay
    Replay,
}

/// Errors loading or validating the drive configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-module hardware wiring and calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub drive_motor_id: u8,
    pub turn_motor_id: u8,
    /// Raw absolute-encoder angle (rad) at which the wheel faces forward.
    /// `None` leaves the azimuth uncorrected.
    pub turn_zero_offset: Option<f64>,
}

/// Gains and clamps shared by the drive and turn loops of one backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub drive: PidGains,
    pub drive_feedforward: FeedforwardGains,
    pub turn: PidGains,
    /// Optional clamp on the feedback term alone (volts)
    pub feedback_limit_volts: Option<f64>,
    /// Optional clamp on feedback + feedforward, tighter than the supply rail (volts)
    pub output_limit_volts: Option<f64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            drive: PidGains::new(0.1, 0.0, 0.0),
            drive_feedforward: FeedforwardGains::new(0.0, 0.13, 0.0),
            turn: PidGains::new(10.0, 0.0, 0.0),
            feedback_limit_volts: None,
            output_limit_volts: None,
        }
    }
}

/// Physics simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub control: ControlConfig,
    pub drive_motor: MotorModel,
    pub drive_gearing: f64,
    pub drive_moment_of_inertia: f64,
    pub turn_motor: MotorModel,
    pub turn_gearing: f64,
    pub turn_moment_of_inertia: f64,
    /// Physical azimuth of each module at boot; random when absent
    pub initial_azimuths: Option<[f64; MODULE_COUNT]>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            drive_motor: MotorModel::KrakenX60,
            drive_gearing: 6.75,
            drive_moment_of_inertia: 0.025,
            turn_motor: MotorModel::Falcon500,
            turn_gearing: 150.0 / 7.0,
            turn_moment_of_inertia: 0.004,
            initial_azimuths: None,
        }
    }
}

/// Feetech hardware parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealConfig {
    pub control: ControlConfig,
    /// Servo output radians per wheel radian
    pub drive_gear_ratio: f64,
}

impl Default for RealConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig {
                drive: PidGains::new(0.5, 0.0, 0.0),
                drive_feedforward: FeedforwardGains::new(0.3, 2.5, 0.0),
                turn: PidGains::new(8.0, 0.0, 0.05),
                feedback_limit_volts: None,
                output_limit_volts: None,
            },
            drive_gear_ratio: 1.0,
        }
    }
}

/// Full drive configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Left-right distance between module centers (m)
    pub track_width: f64,
    /// Front-back distance between module centers (m)
    pub wheel_base: f64,
    pub wheel_radius: f64,
    pub max_linear_speed: f64,
    /// Modules in order: front-left, front-right, back-left, back-right
    pub modules: [ModuleConfig; MODULE_COUNT],
    pub sim: SimConfig,
    pub real: RealConfig,
    /// Encoder sampling rate of the real backend (Hz)
    pub odometry_frequency_hz: f64,
    /// Samples held per module between drains
    pub sample_buffer_capacity: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        let module = |drive_motor_id, turn_motor_id| ModuleConfig {
            drive_motor_id,
            turn_motor_id,
            turn_zero_offset: Some(0.0),
        };
        Self {
            track_width: 0.5,
            wheel_base: 0.5,
            wheel_radius: 0.0508,
            max_linear_speed: 4.5,
            modules: [module(1, 2), module(3, 4), module(5, 6), module(7, 8)],
            sim: SimConfig::default(),
            real: RealConfig::default(),
            odometry_frequency_hz: 250.0,
            sample_buffer_capacity: 64,
        }
    }
}

impl DriveConfig {
    /// Load and validate a JSON config file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("track_width", self.track_width),
            ("wheel_base", self.wheel_base),
            ("wheel_radius", self.wheel_radius),
            ("max_linear_speed", self.max_linear_speed),
            ("real.drive_gear_ratio", self.real.drive_gear_ratio),
            ("sim.drive_gearing", self.sim.drive_gearing),
            ("sim.turn_gearing", self.sim.turn_gearing),
            ("sim.drive_moment_of_inertia", self.sim.drive_moment_of_inertia),
            ("sim.turn_moment_of_inertia", self.sim.turn_moment_of_inertia),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }

        let min_hz = LOOP_HZ as f64;
        let max_hz = min_hz * MAX_ODOMETRY_MULTIPLE;
        if !(min_hz..=max_hz).contains(&self.odometry_frequency_hz) {
            return Err(ConfigError::Invalid(format!(
                "odometry_frequency_hz must be within [{}, {}], got {}",
                min_hz, max_hz, self.odometry_frequency_hz
            )));
        }

        // One control period of samples must fit without eviction
        let per_cycle = (self.odometry_frequency_hz / min_hz).ceil() as usize;
        if self.sample_buffer_capacity < per_cycle {
            return Err(ConfigError::Invalid(format!(
                "sample_buffer_capacity must hold at least {} samples",
                per_cycle
            )));
        }

        let mut ids: Vec<u8> = self
            .modules
            .iter()
            .flat_map(|m| [m.drive_motor_id, m.turn_motor_id])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != MODULE_COUNT * 2 {
            return Err(ConfigError::Invalid("motor IDs must be unique".to_string()));
        }

        for limit in [
            self.sim.control.feedback_limit_volts,
            self.sim.control.output_limit_volts,
            self.real.control.feedback_limit_volts,
            self.real.control.output_limit_volts,
        ]
        .into_iter()
        .flatten()
        {
            if limit.is_nan() || limit <= 0.0 {
                return Err(ConfigError::Invalid(format!("voltage limits must be positive, got {}", limit)));
            }
        }

        Ok(())
    }

    /// Number of odometry samples the real backend takes per control cycle
    pub fn samples_per_cycle(&self) -> usize {
        (self.odometry_frequency_hz / LOOP_HZ as f64).round().max(1.0) as usize
    }
}
