// Swerve drive: module backends, controllers, and the coordinator
//
// Provides:
// - ModuleIo trait with Feetech, simulated, and replay backends
// - GyroIo trait with zenoh IMU and no-op sources
// - Module controller (azimuth optimization, cosine compensation)
// - Drive coordinator with ordered odometry forwarding
// - High-rate encoder sampling through bounded sample buffers

pub mod gyro_io;
pub mod module;
pub mod module_io;
pub mod module_io_feetech;
pub mod module_io_sim;
pub mod odometry;
pub mod odometry_thread;
pub mod sample_buffer;
pub mod swerve_drive;

pub use gyro_io::{GyroInputs, GyroIo, NoGyro, ZenohGyro};
pub use module::Module;
pub use module_io::{ModuleInputs, ModuleIo, ModuleSample, ReplayModuleIo};
pub use module_io_feetech::FeetechModuleIo;
pub use module_io_sim::SimModuleIo;
pub use odometry::{OdometrySample, Pose2d, PoseEstimator, WheelOdometry};
pub use odometry_thread::OdometryThread;
pub use sample_buffer::SampleBuffer;
pub use swerve_drive::Drive;
