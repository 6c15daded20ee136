// 50 Hz drive loop with watchdog
// Note: the watchdog stops the drive when chassis commands stop arriving, so a crashed
// teleop never leaves the base running on its last command

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, DriveConfig, LOOP_HZ, RobotMode, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_IMU,
    TOPIC_ODOMETRY, TOPIC_POSE,
};
use crate::drive::odometry_thread::timestamp;
use crate::drive::{
    Drive, FeetechModuleIo, GyroIo, ModuleIo, NoGyro, OdometrySample, OdometryThread,
    PoseEstimator, ReplayModuleIo, SimModuleIo, WheelOdometry, ZenohGyro,
};
use crate::messages::{
    ChassisCommand, HealthMessage, OdometryMessage, PoseMessage, RuntimeHealth,
};
use crate::motor::feetech::FeetechBus;
use crate::motor::kinematics::{ChassisSpeeds, MODULE_COUNT, SwerveKinematics};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything `run` needs from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RobotMode,
    pub config: DriveConfig,
    pub port: String,
}

pub struct Runtime {
    latest_cmd: Option<ChassisCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: ChassisCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Latest chassis request, or `None` when the watchdog says stop
    fn fresh_command(&mut self) -> Option<ChassisSpeeds> {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            None
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            Some(ChassisSpeeds::from(cmd))
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            None
        }
    }

    /// Downgrade an otherwise healthy status when module sensors are failing
    fn note_sensors(&mut self, sensors_ok: bool) {
        if self.health == RuntimeHealth::Ok && !sensors_ok {
            self.health = RuntimeHealth::SensorStale;
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the drive for `mode`; the sampler thread must outlive the drive loop
async fn build_drive(
    options: &RunOptions,
    session: &zenoh::Session,
) -> Result<(Drive, Option<OdometryThread>), BoxError> {
    let config = &options.config;
    match options.mode {
        RobotMode::Real => {
            info!("Opening motor bus on {}...", options.port);
            let bus = FeetechBus::open(&options.port)?.into_shared();

            let mut modules = Vec::with_capacity(MODULE_COUNT);
            for index in 0..MODULE_COUNT {
                modules.push(FeetechModuleIo::new(Arc::clone(&bus), config, index)?);
            }
            let sources = modules.iter_mut().map(FeetechModuleIo::sample_source).collect();
            let sampler = OdometryThread::spawn(bus, sources, config.odometry_frequency_hz);

            let modules: [Box<dyn ModuleIo>; MODULE_COUNT] = modules
                .into_iter()
                .map(|m| Box::new(m) as Box<dyn ModuleIo>)
                .collect::<Vec<_>>()
                .try_into()
                .map_err(|_| "expected one backend per module")?;

            info!("Subscribing to IMU on {}", TOPIC_IMU);
            let subscriber = session.declare_subscriber(TOPIC_IMU).await?;
            let gyro: Box<dyn GyroIo> = Box::new(ZenohGyro::new(subscriber));
            Ok((Drive::new(gyro, modules, config), Some(sampler)))
        }
        RobotMode::Sim | RobotMode::Replay => {
            let modules = offline_modules(options.mode, config);
            Ok((Drive::new(Box::new(NoGyro), modules, config), None))
        }
    }
}

/// Simulated modules in sim mode, no-op modules otherwise
fn offline_modules(mode: RobotMode, config: &DriveConfig) -> [Box<dyn ModuleIo>; MODULE_COUNT] {
    std::array::from_fn(|index| match mode {
        RobotMode::Sim => Box::new(SimModuleIo::new(config, index)) as Box<dyn ModuleIo>,
        _ => Box::new(ReplayModuleIo),
    })
}

pub async fn run(options: RunOptions) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Building {:?} drive...", options.mode);
    let (mut drive, _sampler) = build_drive(&options, &session).await?;
    let mut odometry = WheelOdometry::new(SwerveKinematics::rectangular(
        options.config.track_width,
        options.config.wheel_base,
    ));

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_odometry = session.declare_publisher(TOPIC_ODOMETRY).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut samples: Vec<OdometrySample> = Vec::new();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!("Publishing to: {}, {}, {}", TOPIC_ODOMETRY, TOPIC_POSE, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, stopping drive");
                drive.stop();
                drive.periodic(&mut Vec::<OdometrySample>::new());
                return Ok(());
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ChassisCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog decides between the latest request and a stop
        match runtime.fresh_command() {
            Some(speeds) => drive.run_velocity(speeds),
            None => drive.stop(),
        }

        // 3. One drive cycle; samples arrive in timestamp order
        samples.clear();
        drive.periodic(&mut samples);
        for sample in &samples {
            odometry.add_odometry_sample(sample);
        }

        // 4. Publish odometry and pose
        if !samples.is_empty() {
            let messages: Vec<OdometryMessage> = samples.iter().map(OdometryMessage::from).collect();
            pub_odometry.put(serde_json::to_string(&messages)?).await?;
        }
        let stamp = samples.last().map_or_else(timestamp, |s| s.timestamp);
        let pose_json = serde_json::to_string(&PoseMessage::new(stamp, odometry.pose()))?;
        pub_pose.put(pose_json).await?;

        // 5. Publish health
        runtime.note_sensors(options.mode == RobotMode::Replay || !drive.any_module_stale());
        let health = HealthMessage {
            status: runtime.health,
            gyro_connected: drive.gyro_connected(),
            setpoints: drive.setpoints(),
            measured: drive.module_states(),
        };
        pub_health.put(serde_json::to_string(&health)?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> ChassisCommand {
        ChassisCommand {
            vx: 0.5,
            vy: 0.0,
            omega: 0.1,
        }
    }

    #[test]
    fn test_starts_stale() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.fresh_command(), None);
        assert_eq!(runtime.health, RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_passes_through() {
        let mut runtime = Runtime::new();
        runtime.on_command(command());
        assert_eq!(runtime.fresh_command(), Some(ChassisSpeeds::new(0.5, 0.0, 0.1)));
        assert_eq!(runtime.health, RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_stops_old_command() {
        let mut runtime = Runtime::new();
        runtime.on_command(command());
        runtime.cmd_received_at = Instant::now() - (CMD_TIMEOUT + Duration::from_millis(50));
        assert_eq!(runtime.fresh_command(), None);
        assert_eq!(runtime.health, RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_sensor_fault_downgrades_health() {
        let mut runtime = Runtime::new();
        runtime.on_command(command());
        runtime.fresh_command();
        runtime.note_sensors(false);
        assert_eq!(runtime.health, RuntimeHealth::SensorStale);

        // A stale command outranks a sensor fault
        let mut runtime = Runtime::new();
        runtime.fresh_command();
        runtime.note_sensors(false);
        assert_eq!(runtime.health, RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_offline_modules_per_mode() {
        let config = DriveConfig::default();

        let modules = offline_modules(RobotMode::Sim, &config);
        let mut drive = Drive::new(Box::new(NoGyro), modules, &config);
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.periodic(&mut samples);
        assert_eq!(samples.len(), config.samples_per_cycle());
        assert!(!drive.any_module_stale());

        let modules = offline_modules(RobotMode::Replay, &config);
        let mut drive = Drive::new(Box::new(NoGyro), modules, &config);
        samples.clear();
        drive.periodic(&mut samples);
        assert!(samples.is_empty());
    }
}
