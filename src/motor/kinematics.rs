// Swerve inverse and forward kinematics for the 4-module base
// Converts body-frame velocities (vx, vy, omega) to per-module speed and azimuth,
// and module displacements back to a body-frame twist.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// Number of swerve modules on the base
pub const MODULE_COUNT: usize = 4;

/// Module names in index order
pub const MODULE_NAMES: [&str; MODULE_COUNT] = ["FrontLeft", "FrontRight", "BackLeft", "BackRight"];

/// Speeds below this are treated as "no motion" when keeping the previous azimuth
const EPSILON: f64 = 1e-9;

/// Bound on sanitized request components; far past any speed limit, far from overflow
const SATURATED: f64 = 1e150;

/// Wrap an angle into [-pi, pi)
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Body-frame velocity request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub vx: f64,    // m/s, positive = forward
    pub vy: f64,    // m/s, positive = left
    pub omega: f64, // rad/s, positive = counter-clockwise
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Replace NaN components with zero and pull out-of-range ones in to a finite
    /// bound, so desaturation scales them like any other oversized request
    pub fn sanitized(self) -> Self {
        let clean = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(-SATURATED, SATURATED) };
        Self::new(clean(self.vx), clean(self.vy), clean(self.omega))
    }

    fn is_zero(&self) -> bool {
        self.vx.abs() < EPSILON && self.vy.abs() < EPSILON && self.omega.abs() < EPSILON
    }
}

/// Speed and azimuth command for one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwerveModuleState {
    pub speed: f64, // m/s, signed
    pub angle: f64, // rad, wrapped to [-pi, pi)
}

impl SwerveModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }
}

/// Accumulated distance and azimuth for one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SwerveModulePosition {
    pub distance: f64, // meters, unbounded
    pub angle: f64,    // rad
}

impl SwerveModulePosition {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self { distance, angle }
    }
}

/// Body-frame displacement over one odometry step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Kinematic model of the module layout
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    /// Module positions relative to robot center [x, y] in meters
    locations: [[f64; 2]; MODULE_COUNT],
    /// Last commanded azimuths, reused when the request is zero
    headings: [f64; MODULE_COUNT],
}

impl SwerveKinematics {
    pub fn new(locations: [[f64; 2]; MODULE_COUNT]) -> Self {
        Self {
            locations,
            headings: [0.0; MODULE_COUNT],
        }
    }

    /// Rectangular layout: front-left, front-right, back-left, back-right
    pub fn rectangular(track_width: f64, wheel_base: f64) -> Self {
        let x = wheel_base / 2.0;
        let y = track_width / 2.0;
        Self::new([[x, y], [x, -y], [-x, y], [-x, -y]])
    }

    pub fn locations(&self) -> &[[f64; 2]; MODULE_COUNT] {
        &self.locations
    }

    /// Convert body velocities to module commands
    ///
    /// A zero request keeps each module at its previous azimuth so the wheels
    /// do not snap back to zero when the robot stops.
    pub fn to_module_states(&mut self, speeds: ChassisSpeeds) -> [SwerveModuleState; MODULE_COUNT] {
        if speeds.is_zero() {
            return self.headings.map(|angle| SwerveModuleState::new(0.0, angle));
        }

        let mut states = [SwerveModuleState::default(); MODULE_COUNT];
        for (i, [x, y]) in self.locations.iter().enumerate() {
            // Each row: [1, 0, -y; 0, 1, x] applied to [vx, vy, omega]
            let vx = speeds.vx - speeds.omega * y;
            let vy = speeds.vy + speeds.omega * x;
            let speed = vx.hypot(vy);
            let angle = if speed > EPSILON {
                vy.atan2(vx)
            } else {
                self.headings[i]
            };
            states[i] = SwerveModuleState::new(speed, angle);
            self.headings[i] = states[i].angle;
        }
        states
    }

    /// Override the remembered azimuths (used by X-lock)
    pub fn reset_headings(&mut self, headings: [f64; MODULE_COUNT]) {
        self.headings = headings.map(wrap_angle);
    }

    /// Least-squares forward kinematics: module displacements to body twist
    pub fn to_twist(&self, deltas: &[SwerveModulePosition; MODULE_COUNT]) -> Twist2d {
        // Normal equations of the stacked rows [1, 0, -y; 0, 1, x]
        let n = MODULE_COUNT as f64;
        let (mut sx, mut sy, mut sr) = (0.0, 0.0, 0.0);
        let (mut bx, mut by, mut bt) = (0.0, 0.0, 0.0);
        for ([x, y], delta) in self.locations.iter().zip(deltas) {
            let dx = delta.distance * delta.angle.cos();
            let dy = delta.distance * delta.angle.sin();
            sx += x;
            sy += y;
            sr += x * x + y * y;
            bx += dx;
            by += dy;
            bt += x * dy - y * dx;
        }

        let m = [[n, 0.0, -sy], [0.0, n, sx], [-sy, sx, sr]];
        let det = det3(&m);
        if det.abs() < EPSILON {
            return Twist2d::default();
        }
        let b = [bx, by, bt];
        let solve = |col: usize| {
            let mut mi = m;
            for (row, value) in mi.iter_mut().zip(b) {
                row[col] = value;
            }
            det3(&mi) / det
        };

        Twist2d {
            dx: solve(0),
            dy: solve(1),
            dtheta: solve(2),
        }
    }
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Scale all module speeds down uniformly if any exceeds `max_speed`
pub fn desaturate_wheel_speeds(states: &mut [SwerveModuleState; MODULE_COUNT], max_speed: f64) {
    let fastest = states
        .iter()
        .map(|s| s.speed.abs())
        .fold(0.0f64, f64::max);

    if fastest > max_speed {
        if fastest.is_infinite() {
            // Only the infinite components survive the scale; keep their sign at the limit
            for state in states.iter_mut() {
                state.speed = if state.speed.is_infinite() {
                    max_speed.copysign(state.speed)
                } else {
                    0.0
                };
            }
            return;
        }
        let scale = max_speed / fastest;
        for state in states.iter_mut() {
            state.speed *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn square() -> SwerveKinematics {
        SwerveKinematics::rectangular(0.5, 0.5)
    }

    #[test]
    fn test_wrap_angle_range() {
        assert!((wrap_angle(PI) + PI).abs() < EPS);
        assert!((wrap_angle(-PI) + PI).abs() < EPS);
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((wrap_angle(0.25) - 0.25).abs() < EPS);
    }

    #[test]
    fn test_forward_motion() {
        let mut kinematics = square();
        let states = kinematics.to_module_states(ChassisSpeeds::new(1.0, 0.0, 0.0));
        for state in states {
            assert!((state.speed - 1.0).abs() < EPS);
            assert!(state.angle.abs() < EPS);
        }
    }

    #[test]
    fn test_rotation_only() {
        let mut kinematics = square();
        let states = kinematics.to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        for (state, [x, y]) in states.iter().zip(kinematics.locations()) {
            assert!((state.speed - x.hypot(*y)).abs() < 1e-6);
            // Module velocity is perpendicular to its lever arm
            let dot = state.angle.cos() * x + state.angle.sin() * y;
            assert!(dot.abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_request_keeps_headings() {
        let mut kinematics = square();
        kinematics.to_module_states(ChassisSpeeds::new(0.0, 1.0, 0.0));
        let states = kinematics.to_module_states(ChassisSpeeds::default());
        for state in states {
            assert_eq!(state.speed, 0.0);
            assert!((state.angle - PI / 2.0).abs() < EPS);
        }
    }

    #[test]
    fn test_desaturate_preserves_ratios() {
        let mut states = [
            SwerveModuleState::new(6.0, 0.0),
            SwerveModuleState::new(3.0, 0.0),
            SwerveModuleState::new(-1.5, 0.0),
            SwerveModuleState::new(2.0, 0.0),
        ];
        desaturate_wheel_speeds(&mut states, 4.0);
        assert!((states[0].speed - 4.0).abs() < EPS);
        assert!((states[1].speed - 2.0).abs() < EPS);
        assert!((states[2].speed + 1.0).abs() < EPS);
        assert!((states[3].speed - 4.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_desaturate_leaves_feasible_speeds() {
        let mut states = [SwerveModuleState::new(1.0, 0.0); MODULE_COUNT];
        desaturate_wheel_speeds(&mut states, 4.0);
        assert!(states.iter().all(|s| (s.speed - 1.0).abs() < EPS));
    }

    #[test]
    fn test_twist_round_trip_rotation() {
        let mut kinematics = square();
        let dt = 0.02;
        let states = kinematics.to_module_states(ChassisSpeeds::new(0.3, -0.2, 0.8));
        let deltas = states.map(|s| SwerveModulePosition::new(s.speed * dt, s.angle));
        let twist = kinematics.to_twist(&deltas);
        assert!((twist.dx - 0.3 * dt).abs() < 1e-9);
        assert!((twist.dy + 0.2 * dt).abs() < 1e-9);
        assert!((twist.dtheta - 0.8 * dt).abs() < 1e-9);
    }

    #[test]
    fn test_sanitized_rejects_nan() {
        let speeds = ChassisSpeeds::new(f64::NAN, 1.0, f64::NAN).sanitized();
        assert_eq!(speeds, ChassisSpeeds::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_infinite_request_keeps_direction() {
        let mut kinematics = square();
        let mut states = kinematics
            .to_module_states(ChassisSpeeds::new(f64::INFINITY, 0.0, f64::NEG_INFINITY).sanitized());
        desaturate_wheel_speeds(&mut states, 4.0);

        let mut unit = square().to_module_states(ChassisSpeeds::new(1.0, 0.0, -1.0));
        desaturate_wheel_speeds(&mut unit, 1e-3);
        let scale = 4.0 / 1e-3;
        for (state, expected) in states.iter().zip(unit) {
            assert!(state.speed.is_finite() && state.angle.is_finite());
            assert!((state.angle - expected.angle).abs() < 1e-9);
            assert!((state.speed - expected.speed * scale).abs() < 1e-6);
        }
    }
}
