// Permanent-magnet DC motor feedforward: `V = kS·sign(v) + kV·v + kA·a`

use serde::{Deserialize, Serialize};

/// Feedforward coefficients as loaded from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedforwardGains {
    pub ks: f64, // volts
    pub kv: f64, // volts per (rad/s)
    pub ka: f64, // volts per (rad/s^2)
}

impl FeedforwardGains {
    pub const fn new(ks: f64, kv: f64, ka: f64) -> Self {
        Self { ks, kv, ka }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMotorFeedforward {
    gains: FeedforwardGains,
}

impl SimpleMotorFeedforward {
    pub fn new(gains: FeedforwardGains) -> Self {
        Self { gains }
    }

    /// Voltage needed to hold `velocity` while accelerating at `acceleration`
    pub fn calculate(&self, velocity: f64, acceleration: f64) -> f64 {
        let FeedforwardGains { ks, kv, ka } = self.gains;
        // signum() of 0.0 is 1.0, so only apply static friction while moving
        let friction = if velocity == 0.0 { 0.0 } else { ks * velocity.signum() };
        friction + kv * velocity + ka * acceleration
    }

    pub fn gains(&self) -> FeedforwardGains {
        self.gains
    }

    pub fn set_gains(&mut self, gains: FeedforwardGains) {
        self.gains = gains;
    }
}
