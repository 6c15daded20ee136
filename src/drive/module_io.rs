// Hardware interface for one swerve module.
//
// Every backend (Feetech servos, physics sim, replay) implements `ModuleIo`, so the
// module controller and the drive coordinator are written once. All methods have
// no-op defaults; the replay backend relies on that.

use crate::control::module_loops::ModuleLoops;

/// One high-frequency encoder sample taken between control cycles
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModuleSample {
    /// Monotonic seconds
    pub timestamp: f64,
    pub drive_position_rad: f64,
    /// Calibrated azimuth (rad)
    pub turn_position: f64,
}

/// Sensor state reported by a module backend once per control cycle.
///
/// Empty current/temperature arrays mean the backend could not read them this
/// cycle; the other fields then hold their last known values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInputs {
    pub drive_position_rad: f64,
    pub drive_velocity_rad_per_sec: f64,
    pub drive_applied_volts: f64,
    pub drive_current_amps: Vec<f64>,
    pub drive_temp_celsius: Vec<f64>,

    /// Azimuth relative to the calibrated zero, wrapped to [-pi, pi)
    pub turn_absolute_position: f64,
    pub turn_velocity_rad_per_sec: f64,
    pub turn_applied_volts: f64,
    pub turn_current_amps: Vec<f64>,
    pub turn_temp_celsius: Vec<f64>,

    /// Samples taken since the previous cycle, oldest first
    pub odometry: Vec<ModuleSample>,
}

impl ModuleInputs {
    /// True when the backend failed to refresh its electrical readings
    pub fn is_stale(&self) -> bool {
        self.drive_current_amps.is_empty() || self.turn_current_amps.is_empty()
    }
}

pub trait ModuleIo: Send {
    /// Refresh `inputs` from the backend. Called exactly once per cycle, before any command.
    ///
    /// `inputs.odometry` is cleared by the caller; the backend appends this cycle's samples.
    fn update_inputs(&mut self, _inputs: &mut ModuleInputs) {}

    /// Open-loop drive voltage, clamped to the supply rail
    fn set_drive_voltage(&mut self, _volts: f64) {}

    /// Open-loop turn voltage, clamped to the supply rail
    fn set_turn_voltage(&mut self, _volts: f64) {}

    /// Closed-loop drive velocity at the wheel (rad/s)
    fn set_drive_velocity(&mut self, velocity_rad_per_sec: f64) {
        self.set_drive_setpoint(velocity_rad_per_sec, 0.0);
    }

    /// Closed-loop drive velocity with an acceleration feedforward term (rad/s, rad/s²)
    fn set_drive_setpoint(&mut self, _velocity_rad_per_sec: f64, _accel_rad_per_sec2: f64) {}

    /// Closed-loop azimuth (rad, continuous across ±pi)
    fn set_turn_position(&mut self, _angle: f64) {}

    /// Shift the calibrated azimuth zero by `offset` radians
    fn apply_relative_offsets(&mut self, _offset: f64) {}

    /// Hold (brake) or release (coast) the motors when no voltage is applied
    fn set_brake_mode(&mut self, _enable: bool) {}

    /// Closed-loop gains for runtime tuning; `None` when the backend has no loops
    fn control_loops(&mut self) -> Option<&mut ModuleLoops> {
        None
    }
}

/// Backend used during log replay: reports frozen inputs and ignores commands
#[derive(Debug, Default)]
pub struct ReplayModuleIo;

impl ModuleIo for ReplayModuleIo {}
