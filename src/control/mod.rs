// Closed-loop control primitives shared by the module backends
//
// Provides:
// - Discrete PID with continuous-input support
// - Simple motor feedforward (static + velocity + acceleration)
// - Supply-rail voltage clamp
// - Per-module drive/turn loops with named tuning clamps

pub mod feedforward;
pub mod module_loops;
pub mod pid;

pub use feedforward::{FeedforwardGains, SimpleMotorFeedforward};
pub use module_loops::ModuleLoops;
pub use pid::{PidController, PidGains};

/// Nominal supply rail of the drive motors (volts)
pub const SUPPLY_VOLTAGE: f64 = 12.0;

/// Clamp a voltage request to `±limit`
///
/// Infinite requests clamp to the nearest rail; NaN is replaced by 0 V so a
/// bad computation never reaches the motor.
pub fn clamp_voltage(volts: f64, limit: f64) -> f64 {
    if volts.is_nan() {
        return 0.0;
    }
    volts.clamp(-limit, limit)
}
