// Swerve module controller
//
// Owns one hardware backend and turns a (speed, azimuth) command into backend calls:
// optimize the azimuth so the wheel never turns more than 90 degrees, then command
// the drive with cosine compensation for the remaining azimuth error.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::{debug, info};

use crate::control::module_loops::ModuleLoops;
use crate::drive::module_io::{ModuleInputs, ModuleIo, ModuleSample};
use crate::motor::kinematics::{MODULE_NAMES, SwerveModulePosition, SwerveModuleState, wrap_angle};

/// Flip `desired` by 180 degrees (negating speed) when it is more than 90 degrees
/// from `current`. Exactly 90 degrees is not flipped.
pub fn optimize(desired: SwerveModuleState, current: f64) -> SwerveModuleState {
    let error = wrap_angle(desired.angle - current);
    if error.abs() > FRAC_PI_2 {
        SwerveModuleState::new(-desired.speed, desired.angle + PI)
    } else {
        desired
    }
}

pub struct Module {
    io: Box<dyn ModuleIo>,
    inputs: ModuleInputs,
    index: usize,
    wheel_radius: f64,
    stale: bool,
}

impl Module {
    pub fn new(io: Box<dyn ModuleIo>, index: usize, wheel_radius: f64) -> Self {
        Self {
            io,
            inputs: ModuleInputs::default(),
            index,
            wheel_radius,
            stale: false,
        }
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAMES[self.index]
    }

    /// Refresh inputs from the backend. Call once per cycle before any command.
    pub fn periodic(&mut self) {
        self.inputs.odometry.clear();
        self.io.update_inputs(&mut self.inputs);

        let stale = self.inputs.is_stale();
        if stale != self.stale {
            debug!("{} module sensor readings stale: {}", self.name(), stale);
            self.stale = stale;
        }
    }

    /// Command a speed (m/s) and azimuth; returns the optimized command actually sent
    pub fn run_setpoint(&mut self, state: SwerveModuleState) -> SwerveModuleState {
        let current = self.inputs.turn_absolute_position;
        let optimized = optimize(state, current);
        self.io.set_turn_position(optimized.angle);

        // Scale down drive speed while the azimuth is still off target
        let error = wrap_angle(optimized.angle - current);
        let velocity = optimized.speed * error.cos() / self.wheel_radius;
        self.io.set_drive_velocity(velocity);
        optimized
    }

    /// Zero voltage on both motors
    pub fn stop(&mut self) {
        self.io.set_drive_voltage(0.0);
        self.io.set_turn_voltage(0.0);
    }

    /// Hold azimuth at zero and apply an open-loop drive voltage
    pub fn run_characterization(&mut self, volts: f64) {
        self.io.set_turn_position(0.0);
        self.io.set_drive_voltage(volts);
    }

    /// Drive velocity (rad/s) for feedforward characterization
    pub fn characterization_velocity(&self) -> f64 {
        self.inputs.drive_velocity_rad_per_sec
    }

    /// Re-seat the azimuth zero by `offset` radians
    pub fn apply_relative_offset(&mut self, offset: f64) {
        info!("{} module azimuth zero shifted by {:.4} rad", self.name(), offset);
        self.io.apply_relative_offsets(offset);
    }

    pub fn set_brake_mode(&mut self, enable: bool) {
        self.io.set_brake_mode(enable);
    }

    /// Gains of the backend's closed loops, for runtime tuning
    pub fn control_loops(&mut self) -> Option<&mut ModuleLoops> {
        self.io.control_loops()
    }

    pub fn inputs(&self) -> &ModuleInputs {
        &self.inputs
    }

    /// Samples taken since the previous cycle, oldest first
    pub fn odometry_samples(&self) -> &[ModuleSample] {
        &self.inputs.odometry
    }

    pub fn angle(&self) -> f64 {
        self.inputs.turn_absolute_position
    }

    pub fn position_meters(&self) -> f64 {
        self.inputs.drive_position_rad * self.wheel_radius
    }

    pub fn velocity_meters_per_sec(&self) -> f64 {
        self.inputs.drive_velocity_rad_per_sec * self.wheel_radius
    }

    pub fn position(&self) -> SwerveModulePosition {
        SwerveModulePosition::new(self.position_meters(), self.angle())
    }

    pub fn state(&self) -> SwerveModuleState {
        SwerveModuleState::new(self.velocity_meters_per_sec(), self.angle())
    }

    /// Convert a raw sample to distance and azimuth
    pub fn sample_position(&self, sample: &ModuleSample) -> SwerveModulePosition {
        SwerveModulePosition::new(
            sample.drive_position_rad * self.wheel_radius,
            sample.turn_position,
        )
    }
}
