// Feetech STS servo backend for one swerve module
//
// Both servos run in PWM mode; the host closes the drive-velocity and azimuth loops
// with the same `ModuleLoops` the simulator uses. The drive encoder wraps every
// revolution, so positions are unwrapped into an accumulated count. The turn servo
// is direct-drive and its encoder is the absolute azimuth sensor.

use std::f64::consts::TAU;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{DriveConfig, LOOP_PERIOD_SECS};
use crate::control::module_loops::ModuleLoops;
use crate::control::{SUPPLY_VOLTAGE, clamp_voltage};
use crate::drive::module_io::{ModuleInputs, ModuleIo, ModuleSample};
use crate::drive::odometry_thread::{RawSample, SampleSource, timestamp};
use crate::drive::sample_buffer::SampleBuffer;
use crate::motor::feetech::{
    FeetechBus, FeetechError, OperatingMode, PWM_FULL_SCALE, STEPS_PER_REVOLUTION, SharedBus,
};
use crate::motor::kinematics::wrap_angle;

const RAD_PER_STEP: f64 = TAU / STEPS_PER_REVOLUTION as f64;

/// Below this the supply reading is treated as bogus and the nominal rail is used
const MIN_SUPPLY_VOLTAGE: f64 = 6.0;

/// Turns a wrapping 12-bit encoder into an unbounded step count
#[derive(Debug, Default, Clone)]
struct EncoderUnwrapper {
    last: Option<u16>,
    accumulated: i64,
}

impl EncoderUnwrapper {
    fn update(&mut self, raw: u16) -> i64 {
        let steps = STEPS_PER_REVOLUTION as i64;
        match self.last {
            None => self.accumulated = raw as i64,
            Some(prev) => {
                let mut delta = raw as i64 - prev as i64;
                if delta > steps / 2 {
                    delta -= steps;
                } else if delta < -steps / 2 {
                    delta += steps;
                }
                self.accumulated += delta;
            }
        }
        self.last = Some(raw);
        self.accumulated
    }
}

pub struct FeetechModuleIo {
    bus: SharedBus,
    index: usize,
    drive_id: u8,
    turn_id: u8,
    /// Raw turn-encoder angle that reads as zero; `None` when uncalibrated
    turn_zero: Option<f64>,
    drive_gear_ratio: f64,
    loops: ModuleLoops,
    drive_encoder: EncoderUnwrapper,
    samples: Arc<SampleBuffer<RawSample>>,
    /// Set once an odometry thread has been attached to `samples`
    sampled: bool,

    // Last good readings, held across bus faults
    drive_position_rad: f64,
    drive_velocity_rad_per_sec: f64,
    turn_raw_angle: f64,
    turn_velocity_rad_per_sec: f64,
    supply_voltage: f64,

    drive_applied_volts: f64,
    turn_applied_volts: f64,
}

impl FeetechModuleIo {
    /// Configure the module's servos for PWM control
    ///
    /// Disables torque, switches both servos to PWM mode and re-enables torque.
    pub fn new(bus: SharedBus, config: &DriveConfig, index: usize) -> Result<Self, FeetechError> {
        let module = config.modules[index];
        info!(
            "Initializing module {} (drive {}, turn {})",
            index, module.drive_motor_id, module.turn_motor_id
        );

        {
            let mut bus = bus.lock();
            for id in [module.drive_motor_id, module.turn_motor_id] {
                if !bus.ping(id)? {
                    warn!("Motor {} not responding to ping", id);
                    return Err(FeetechError::Timeout { id });
                }
                bus.disable_torque(id)?;
                bus.set_operating_mode(id, OperatingMode::Pwm)?;
                bus.set_pwm(id, 0)?;
                bus.enable_torque(id)?;
            }
        }

        if module.turn_zero_offset.is_none() {
            warn!("Module {} has no turn zero offset, azimuth is uncalibrated", index);
        }

        Ok(Self {
            bus,
            index,
            drive_id: module.drive_motor_id,
            turn_id: module.turn_motor_id,
            turn_zero: module.turn_zero_offset,
            drive_gear_ratio: config.real.drive_gear_ratio,
            loops: ModuleLoops::new(&config.real.control, LOOP_PERIOD_SECS),
            drive_encoder: EncoderUnwrapper::default(),
            samples: Arc::new(SampleBuffer::new(config.sample_buffer_capacity)),
            sampled: false,
            drive_position_rad: 0.0,
            drive_velocity_rad_per_sec: 0.0,
            turn_raw_angle: 0.0,
            turn_velocity_rad_per_sec: 0.0,
            supply_voltage: SUPPLY_VOLTAGE,
            drive_applied_volts: 0.0,
            turn_applied_volts: 0.0,
        })
    }

    /// Hand this module's encoders to an `OdometryThread`
    pub fn sample_source(&mut self) -> SampleSource {
        self.sampled = true;
        SampleSource {
            drive_id: self.drive_id,
            turn_id: self.turn_id,
            buffer: Arc::clone(&self.samples),
        }
    }

    fn drive_rad(&self, steps: i64) -> f64 {
        steps as f64 * RAD_PER_STEP / self.drive_gear_ratio
    }

    /// Azimuth relative to the calibrated zero; left uncorrected without one
    fn calibrated(&self, raw_angle: f64) -> f64 {
        wrap_angle(raw_angle - self.turn_zero.unwrap_or(0.0))
    }

    fn turn_position(&self) -> f64 {
        self.calibrated(self.turn_raw_angle)
    }

    /// Positions and velocities of both servos
    fn read_motion(bus: &mut FeetechBus, drive_id: u8, turn_id: u8) -> Result<(u16, i16, u16, i16), FeetechError> {
        Ok((
            bus.get_position(drive_id)?,
            bus.get_velocity(drive_id)?,
            bus.get_position(turn_id)?,
            bus.get_velocity(turn_id)?,
        ))
    }

    /// Supply voltage, then current and temperature of the drive and turn servos
    fn read_electrical(
        bus: &mut FeetechBus,
        drive_id: u8,
        turn_id: u8,
    ) -> Result<(f64, f64, f64, f64, f64), FeetechError> {
        Ok((
            bus.get_supply_voltage(drive_id)?,
            bus.get_current(drive_id)?,
            bus.get_temperature(drive_id)?,
            bus.get_current(turn_id)?,
            bus.get_temperature(turn_id)?,
        ))
    }

    fn write_pwm(&mut self, id: u8, volts: f64) {
        let duty = volts / self.supply_voltage;
        let pwm = (duty * PWM_FULL_SCALE as f64).round() as i16;
        if let Err(e) = self.bus.lock().set_pwm(id, pwm) {
            warn!("Module {}: failed to command motor {}: {}", self.index, id, e);
        }
    }
}

impl ModuleIo for FeetechModuleIo {
    fn update_inputs(&mut self, inputs: &mut ModuleInputs) {
        // Sub-cycle samples first, in the order they were taken
        for raw in self.samples.drain() {
            let steps = self.drive_encoder.update(raw.drive_raw);
            inputs.odometry.push(ModuleSample {
                timestamp: raw.timestamp,
                drive_position_rad: self.drive_rad(steps),
                turn_position: self.calibrated(raw.turn_raw as f64 * RAD_PER_STEP),
            });
        }

        let (motion, electrical, read_at) = {
            let mut bus = self.bus.lock();
            let motion = Self::read_motion(&mut bus, self.drive_id, self.turn_id);
            let read_at = timestamp();
            let electrical = Self::read_electrical(&mut bus, self.drive_id, self.turn_id);
            (motion, electrical, read_at)
        };

        match motion {
            Ok((drive_raw, drive_vel, turn_raw, turn_vel)) => {
                let steps = self.drive_encoder.update(drive_raw);
                self.drive_position_rad = self.drive_rad(steps);
                self.drive_velocity_rad_per_sec =
                    drive_vel as f64 * RAD_PER_STEP / self.drive_gear_ratio;
                self.turn_raw_angle = turn_raw as f64 * RAD_PER_STEP;
                self.turn_velocity_rad_per_sec = turn_vel as f64 * RAD_PER_STEP;

                if !self.sampled {
                    inputs.odometry.push(ModuleSample {
                        timestamp: read_at,
                        drive_position_rad: self.drive_position_rad,
                        turn_position: self.turn_position(),
                    });
                }
            }
            // Hold the last readings
            Err(e) => debug!("Module {}: motion read failed: {}", self.index, e),
        }

        inputs.drive_position_rad = self.drive_position_rad;
        inputs.drive_velocity_rad_per_sec = self.drive_velocity_rad_per_sec;
        inputs.drive_applied_volts = self.drive_applied_volts;
        inputs.turn_absolute_position = self.turn_position();
        inputs.turn_velocity_rad_per_sec = self.turn_velocity_rad_per_sec;
        inputs.turn_applied_volts = self.turn_applied_volts;

        match electrical {
            Ok((supply, drive_amps, drive_temp, turn_amps, turn_temp)) => {
                if supply >= MIN_SUPPLY_VOLTAGE {
                    self.supply_voltage = supply;
                }
                inputs.drive_current_amps = vec![drive_amps];
                inputs.drive_temp_celsius = vec![drive_temp];
                inputs.turn_current_amps = vec![turn_amps];
                inputs.turn_temp_celsius = vec![turn_temp];
            }
            Err(e) => {
                debug!("Module {}: electrical read failed: {}", self.index, e);
                inputs.drive_current_amps.clear();
                inputs.drive_temp_celsius.clear();
                inputs.turn_current_amps.clear();
                inputs.turn_temp_celsius.clear();
            }
        }
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.drive_applied_volts = clamp_voltage(volts, SUPPLY_VOLTAGE);
        self.write_pwm(self.drive_id, self.drive_applied_volts);
    }

    fn set_turn_voltage(&mut self, volts: f64) {
        self.turn_applied_volts = clamp_voltage(volts, SUPPLY_VOLTAGE);
        self.write_pwm(self.turn_id, self.turn_applied_volts);
    }

    fn set_drive_setpoint(&mut self, velocity_rad_per_sec: f64, accel_rad_per_sec2: f64) {
        let volts = self.loops.drive_volts(
            self.drive_velocity_rad_per_sec,
            velocity_rad_per_sec,
            accel_rad_per_sec2,
        );
        self.set_drive_voltage(volts);
    }

    fn set_turn_position(&mut self, angle: f64) {
        let volts = self.loops.turn_volts(self.turn_position(), angle);
        self.set_turn_voltage(volts);
    }

    fn apply_relative_offsets(&mut self, offset: f64) {
        if offset.is_finite() {
            let zero = self.turn_zero.unwrap_or(0.0) + offset;
            self.turn_zero = Some(wrap_angle(zero));
            info!("Module {}: turn zero moved to {:.4} rad", self.index, zero);
        }
    }

    fn set_brake_mode(&mut self, enable: bool) {
        let mut bus = self.bus.lock();
        for id in [self.drive_id, self.turn_id] {
            let result = if enable {
                bus.enable_torque(id)
            } else {
                bus.disable_torque(id)
            };
            if let Err(e) = result {
                warn!("Module {}: failed to set brake mode on motor {}: {}", self.index, id, e);
            }
        }
    }

    fn control_loops(&mut self) -> Option<&mut ModuleLoops> {
        Some(&mut self.loops)
    }
}

impl Drop for FeetechModuleIo {
    fn drop(&mut self) {
        // Try to stop motors when the backend is dropped (safety measure)
        let mut bus = self.bus.lock();
        if let Err(e) = bus.sync_write_pwm(&[(self.drive_id, 0), (self.turn_id, 0)]) {
            warn!("Failed to stop module {} on drop: {}", self.index, e);
        }
    }
}
