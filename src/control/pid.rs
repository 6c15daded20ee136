// Discrete PID controller for the module control loops
//
// Runs at a fixed period and optionally treats its input as continuous
// (wrap-around), which the azimuth loop needs so that crossing ±pi never
// produces a reversed-direction command.

use serde::{Deserialize, Serialize};

/// PID gains as loaded from configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// PID controller with tunable gains and optional continuous input.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,

    /// Loop period in seconds
    period: f64,

    setpoint: f64,
    integral: f64,
    prev_error: f64,
    first_update: bool,

    /// Integrator clamp (anti-windup)
    int_min: f64,
    int_max: f64,

    /// Input range when continuous, as (min, max)
    continuous: Option<(f64, f64)>,
}

impl PidController {
    pub fn new(gains: PidGains, period: f64) -> Self {
        Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            period,
            setpoint: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            first_update: true,
            int_min: -1.0,
            int_max: 1.0,
            continuous: None,
        }
    }

    /// Set integral limits for anti-windup.
    pub fn with_integral_limits(mut self, min: f64, max: f64) -> Self {
        self.int_min = min;
        self.int_max = max;
        self
    }

    /// Treat the input as wrapping between `min` and `max`.
    pub fn with_continuous_input(mut self, min: f64, max: f64) -> Self {
        self.continuous = Some((min, max));
        self
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Error between setpoint and measurement, wrapped when continuous.
    pub fn error(&self, measurement: f64) -> f64 {
        let error = self.setpoint - measurement;
        match self.continuous {
            Some((min, max)) => {
                let half = (max - min) / 2.0;
                (error + half).rem_euclid(max - min) - half
            }
            None => error,
        }
    }

    /// Compute the controller output for `measurement`.
    pub fn calculate(&mut self, measurement: f64) -> f64 {
        let error = self.error(measurement);

        if self.ki != 0.0 {
            self.integral = (self.integral + error * self.period).clamp(self.int_min, self.int_max);
        }

        let derivative = if self.first_update {
            self.first_update = false;
            0.0
        } else {
            (error - self.prev_error) / self.period
        };
        self.prev_error = error;

        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    /// Set a new setpoint and compute the output in one step.
    pub fn calculate_to(&mut self, measurement: f64, setpoint: f64) -> f64 {
        self.set_setpoint(setpoint);
        self.calculate(measurement)
    }

    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    /// Swap in new gains; integrator and derivative history carry over
    pub fn set_gains(&mut self, gains: PidGains) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
    }
}
