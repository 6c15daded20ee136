// Drive-velocity and azimuth-position loops for one module
//
// Shared by the simulated and Feetech backends so both produce the same voltage
// for the same measurement and setpoint.

use crate::config::ControlConfig;
use crate::control::{
    FeedforwardGains, PidController, PidGains, SUPPLY_VOLTAGE, SimpleMotorFeedforward,
    clamp_voltage,
};
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct ModuleLoops {
    drive: PidController,
    drive_ff: SimpleMotorFeedforward,
    turn: PidController,
    feedback_limit: f64,
    output_limit: f64,
}

impl ModuleLoops {
    pub fn new(config: &ControlConfig, period: f64) -> Self {
        Self {
            drive: PidController::new(config.drive, period),
            drive_ff: SimpleMotorFeedforward::new(config.drive_feedforward),
            turn: PidController::new(config.turn, period).with_continuous_input(-PI, PI),
            feedback_limit: feedback_limit(config),
            output_limit: output_limit(config),
        }
    }

    /// Replace gains and clamps in place, keeping the loops' accumulated state
    pub fn retune(&mut self, config: &ControlConfig) {
        self.drive.set_gains(config.drive);
        self.drive_ff.set_gains(config.drive_feedforward);
        self.turn.set_gains(config.turn);
        self.feedback_limit = feedback_limit(config);
        self.output_limit = output_limit(config);
    }

    /// Voltage for a wheel velocity setpoint (rad/s), given the measured velocity
    pub fn drive_volts(&mut self, measured: f64, velocity: f64, acceleration: f64) -> f64 {
        let velocity = if velocity.is_finite() { velocity } else { 0.0 };
        let acceleration = if acceleration.is_finite() { acceleration } else { 0.0 };

        let feedback = clamp_voltage(
            self.drive.calculate_to(measured, velocity),
            self.feedback_limit,
        );
        let feedforward = self.drive_ff.calculate(velocity, acceleration);
        clamp_voltage(feedback + feedforward, self.output_limit)
    }

    /// Voltage for an azimuth setpoint (rad), given the measured azimuth
    pub fn turn_volts(&mut self, measured: f64, angle: f64) -> f64 {
        // A bad setpoint holds the current azimuth
        let angle = if angle.is_finite() { angle } else { measured };
        let feedback = clamp_voltage(self.turn.calculate_to(measured, angle), self.feedback_limit);
        clamp_voltage(feedback, self.output_limit)
    }

    /// Wrapped azimuth error for the current setpoint
    pub fn turn_error(&self, measured: f64) -> f64 {
        self.turn.error(measured)
    }

    pub fn drive_gains(&self) -> PidGains {
        self.drive.gains()
    }

    pub fn turn_gains(&self) -> PidGains {
        self.turn.gains()
    }

    pub fn drive_feedforward(&self) -> FeedforwardGains {
        self.drive_ff.gains()
    }
}

fn feedback_limit(config: &ControlConfig) -> f64 {
    config.feedback_limit_volts.unwrap_or(SUPPLY_VOLTAGE)
}

fn output_limit(config: &ControlConfig) -> f64 {
    config
        .output_limit_volts
        .unwrap_or(SUPPLY_VOLTAGE)
        .min(SUPPLY_VOLTAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOOP_PERIOD_SECS;

    fn loops(config: ControlConfig) -> ModuleLoops {
        ModuleLoops::new(&config, LOOP_PERIOD_SECS)
    }

    #[test]
    fn test_drive_volts_is_feedforward_at_setpoint() {
        let mut loops = loops(ControlConfig::default());
        let volts = loops.drive_volts(20.0, 20.0, 0.0);
        assert!((volts - 0.13 * 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_turn_crosses_wrap_with_small_command() {
        let mut loops = loops(ControlConfig::default());
        let volts = loops.turn_volts(PI - 0.01, PI + 0.01);
        // kP 10 on a 0.02 rad error, not on ~2pi
        assert!((volts - 0.2).abs() < 1e-9, "volts was {}", volts);
        assert!((loops.turn_error(PI - 0.01) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_named_limits_clamp_output() {
        let mut loops = loops(ControlConfig {
            feedback_limit_volts: Some(3.0),
            output_limit_volts: Some(4.0),
            ..ControlConfig::default()
        });
        assert_eq!(loops.turn_volts(0.0, 2.0), 3.0);
        // Feedback clamps at 3, feedforward adds 0.13 * 100 = 13, total clamps at 4
        assert_eq!(loops.drive_volts(0.0, 100.0, 0.0), 4.0);
    }

    #[test]
    fn test_supply_rail_is_default_clamp() {
        let mut loops = loops(ControlConfig::default());
        assert_eq!(loops.drive_volts(0.0, 1e6, 0.0), SUPPLY_VOLTAGE);
        assert_eq!(loops.drive_volts(0.0, -1e6, 0.0), -SUPPLY_VOLTAGE);
    }

    #[test]
    fn test_non_finite_setpoints_are_neutral() {
        let mut loops = loops(ControlConfig::default());
        assert_eq!(loops.drive_volts(0.0, f64::NAN, f64::INFINITY), 0.0);
        assert_eq!(loops.turn_volts(0.7, f64::NAN), 0.0);
    }

    #[test]
    fn test_retune_replaces_gains_and_clamps() {
        let mut loops = loops(ControlConfig::default());
        loops.retune(&ControlConfig {
            turn: PidGains::new(2.0, 0.0, 0.0),
            drive_feedforward: FeedforwardGains::new(0.0, 0.2, 0.0),
            output_limit_volts: Some(1.0),
            ..ControlConfig::default()
        });
        assert_eq!(loops.turn_gains(), PidGains::new(2.0, 0.0, 0.0));
        assert_eq!(loops.drive_feedforward(), FeedforwardGains::new(0.0, 0.2, 0.0));
        assert!((loops.turn_volts(0.0, 0.25) - 0.5).abs() < 1e-12);
        assert_eq!(loops.drive_volts(0.0, 10.0, 0.0), 1.0);
    }
}
