// DC motor physics for the simulated modules
//
// A geared permanent-magnet motor driving an inertia. State is [position, velocity]
// of the output shaft; the voltage input fights back-EMF through the winding resistance.

use serde::{Deserialize, Serialize};

const RPM_TO_RAD_PER_SEC: f64 = std::f64::consts::TAU / 60.0;

/// Motor models available to the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorModel {
    KrakenX60,
    Falcon500,
    Sts3215,
}

/// Electrical and mechanical constants of one motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcMotor {
    pub nominal_voltage: f64,
    pub stall_torque: f64,  // N·m
    pub stall_current: f64, // A
    pub free_current: f64,  // A
    pub free_speed: f64,    // rad/s
    /// Winding resistance (ohms)
    pub resistance: f64,
    /// Velocity constant (rad/s per volt)
    pub kv: f64,
    /// Torque constant (N·m per amp)
    pub kt: f64,
}

impl DcMotor {
    pub fn new(
        nominal_voltage: f64,
        stall_torque: f64,
        stall_current: f64,
        free_current: f64,
        free_speed: f64,
    ) -> Self {
        let resistance = nominal_voltage / stall_current;
        Self {
            nominal_voltage,
            stall_torque,
            stall_current,
            free_current,
            free_speed,
            resistance,
            kv: free_speed / (nominal_voltage - resistance * free_current),
            kt: stall_torque / stall_current,
        }
    }

    pub fn from_model(model: MotorModel) -> Self {
        match model {
            MotorModel::KrakenX60 => Self::new(12.0, 7.09, 366.0, 2.0, 6000.0 * RPM_TO_RAD_PER_SEC),
            MotorModel::Falcon500 => Self::new(12.0, 4.69, 257.0, 1.5, 6380.0 * RPM_TO_RAD_PER_SEC),
            // Feetech STS3215 at 12 V, speed at the servo output
            MotorModel::Sts3215 => Self::new(12.0, 2.94, 2.7, 0.18, 45.0 * RPM_TO_RAD_PER_SEC),
        }
    }

    /// Current drawn at motor `speed` (rad/s) with `volts` applied
    pub fn current(&self, speed: f64, volts: f64) -> f64 {
        (volts - speed / self.kv) / self.resistance
    }
}

/// Geared motor turning a flywheel-like load
#[derive(Debug, Clone)]
pub struct DcMotorSim {
    motor: DcMotor,
    gearing: f64,
    moment_of_inertia: f64, // kg·m², at the output
    position: f64,          // rad, output shaft
    velocity: f64,          // rad/s, output shaft
    input_voltage: f64,
}

impl DcMotorSim {
    pub fn new(motor: DcMotor, gearing: f64, moment_of_inertia: f64) -> Self {
        Self {
            motor,
            gearing,
            moment_of_inertia,
            position: 0.0,
            velocity: 0.0,
            input_voltage: 0.0,
        }
    }

    pub fn set_input_voltage(&mut self, volts: f64) {
        self.input_voltage = volts;
    }

    pub fn set_state(&mut self, position: f64, velocity: f64) {
        self.position = position;
        self.velocity = velocity;
    }

    /// Advance the model by `dt` seconds
    ///
    /// Velocity obeys `v' = a·v + b·u`, integrated in closed form so large steps stay stable.
    pub fn update(&mut self, dt: f64) {
        let DcMotor { kt, kv, resistance, .. } = self.motor;
        let a = -self.gearing * self.gearing * kt / (kv * resistance * self.moment_of_inertia);
        let b = self.gearing * kt / (resistance * self.moment_of_inertia);
        let u = self.input_voltage;

        let decay = (a * dt).exp();
        let gain = (decay - 1.0) / a; // integral of e^(a·s) over [0, dt]
        let steady = -b * u / a; // velocity the motor settles to

        self.position += steady * dt + (self.velocity - steady) * gain;
        self.velocity = steady + (self.velocity - steady) * decay;
    }

    pub fn angular_position_rad(&self) -> f64 {
        self.position
    }

    pub fn angular_velocity_rad_per_sec(&self) -> f64 {
        self.velocity
    }

    /// Signed like the applied voltage; an unpowered motor draws nothing
    pub fn current_draw_amps(&self) -> f64 {
        // signum() of 0.0 is 1.0
        if self.input_voltage == 0.0 {
            return 0.0;
        }
        let motor_speed = self.velocity * self.gearing;
        self.motor.current(motor_speed, self.input_voltage) * self.input_voltage.signum()
    }

    pub fn input_voltage(&self) -> f64 {
        self.input_voltage
    }
}
