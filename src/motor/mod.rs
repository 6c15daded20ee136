// Motor layer for the swerve base
//
// Provides:
// - Swerve inverse and forward kinematics
// - Feetech STS3215 serial protocol implementation
// - DC motor physics for simulation

pub mod dc_motor;
#[cfg(test)]
pub mod fake_servo;
pub mod feetech;
pub mod kinematics;

pub use dc_motor::{DcMotor, DcMotorSim, MotorModel};
pub use feetech::{FeetechBus, FeetechError, SharedBus};
pub use kinematics::{ChassisSpeeds, SwerveKinematics, SwerveModulePosition, SwerveModuleState};
