// Physics-simulated module backend.
//
// Two geared DC motor models stand in for the drive and turn motors. Each call to
// `update_inputs` advances physics by one control period, split into the same number
// of sub-steps the real backend samples at, and emits one odometry sample per sub-step.

use tracing::debug;

use crate::config::{DriveConfig, LOOP_PERIOD_SECS};
use crate::control::module_loops::ModuleLoops;
use crate::control::{SUPPLY_VOLTAGE, clamp_voltage};
use crate::drive::module_io::{ModuleInputs, ModuleIo, ModuleSample};
use crate::motor::dc_motor::{DcMotor, DcMotorSim};
use crate::motor::kinematics::wrap_angle;

/// Reported motor temperature; the sim has no thermal model
const AMBIENT_CELSIUS: f64 = 25.0;

pub struct SimModuleIo {
    drive_sim: DcMotorSim,
    turn_sim: DcMotorSim,
    /// Physical azimuth that reads as zero
    turn_zero: f64,
    loops: ModuleLoops,
    drive_applied_volts: f64,
    turn_applied_volts: f64,
    /// Simulated seconds since construction
    clock: f64,
    substeps: usize,
}

impl SimModuleIo {
    /// Build the sim for module `index`; its wheel starts at the configured (or a random) azimuth
    pub fn new(config: &DriveConfig, index: usize) -> Self {
        let sim = &config.sim;
        let initial_azimuth = match sim.initial_azimuths {
            Some(azimuths) => azimuths[index],
            None => rand::random::<f64>() * std::f64::consts::TAU,
        };
        debug!("Sim module {} starts at azimuth {:.3} rad", index, initial_azimuth);

        let drive_sim = DcMotorSim::new(
            DcMotor::from_model(sim.drive_motor),
            sim.drive_gearing,
            sim.drive_moment_of_inertia,
        );
        let mut turn_sim = DcMotorSim::new(
            DcMotor::from_model(sim.turn_motor),
            sim.turn_gearing,
            sim.turn_moment_of_inertia,
        );
        turn_sim.set_state(initial_azimuth, 0.0);

        Self {
            drive_sim,
            turn_sim,
            turn_zero: 0.0,
            loops: ModuleLoops::new(&sim.control, LOOP_PERIOD_SECS),
            drive_applied_volts: 0.0,
            turn_applied_volts: 0.0,
            clock: 0.0,
            substeps: config.samples_per_cycle(),
        }
    }

    /// Calibrated azimuth, wrapped to [-pi, pi)
    fn turn_position(&self) -> f64 {
        wrap_angle(self.turn_sim.angular_position_rad() - self.turn_zero)
    }

    /// Advance physics one control period, recording a sample after each sub-step
    fn step(&mut self, samples: &mut Vec<ModuleSample>) {
        let dt = LOOP_PERIOD_SECS / self.substeps as f64;
        for _ in 0..self.substeps {
            self.drive_sim.update(dt);
            self.turn_sim.update(dt);
            self.clock += dt;
            samples.push(ModuleSample {
                timestamp: self.clock,
                drive_position_rad: self.drive_sim.angular_position_rad(),
                turn_position: self.turn_position(),
            });
        }
    }
}

impl ModuleIo for SimModuleIo {
    fn update_inputs(&mut self, inputs: &mut ModuleInputs) {
        self.step(&mut inputs.odometry);

        inputs.drive_position_rad = self.drive_sim.angular_position_rad();
        inputs.drive_velocity_rad_per_sec = self.drive_sim.angular_velocity_rad_per_sec();
        inputs.drive_applied_volts = self.drive_applied_volts;
        inputs.drive_current_amps = vec![self.drive_sim.current_draw_amps().abs()];
        inputs.drive_temp_celsius = vec![AMBIENT_CELSIUS];

        inputs.turn_absolute_position = self.turn_position();
        inputs.turn_velocity_rad_per_sec = self.turn_sim.angular_velocity_rad_per_sec();
        inputs.turn_applied_volts = self.turn_applied_volts;
        inputs.turn_current_amps = vec![self.turn_sim.current_draw_amps().abs()];
        inputs.turn_temp_celsius = vec![AMBIENT_CELSIUS];
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.drive_applied_volts = clamp_voltage(volts, SUPPLY_VOLTAGE);
        self.drive_sim.set_input_voltage(self.drive_applied_volts);
    }

    fn set_turn_voltage(&mut self, volts: f64) {
        self.turn_applied_volts = clamp_voltage(volts, SUPPLY_VOLTAGE);
        self.turn_sim.set_input_voltage(self.turn_applied_volts);
    }

    fn set_drive_setpoint(&mut self, velocity_rad_per_sec: f64, accel_rad_per_sec2: f64) {
        let measured = self.drive_sim.angular_velocity_rad_per_sec();
        let volts = self
            .loops
            .drive_volts(measured, velocity_rad_per_sec, accel_rad_per_sec2);
        self.set_drive_voltage(volts);
    }

    fn set_turn_position(&mut self, angle: f64) {
        let volts = self.loops.turn_volts(self.turn_position(), angle);
        self.set_turn_voltage(volts);
    }

    fn apply_relative_offsets(&mut self, offset: f64) {
        if offset.is_finite() {
            self.turn_zero = wrap_angle(self.turn_zero + offset);
        }
    }

    fn control_loops(&mut self) -> Option<&mut ModuleLoops> {
        Some(&mut self.loops)
    }
}
