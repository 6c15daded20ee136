// Drive coordinator: four modules plus a heading source.
//
// Each cycle the coordinator refreshes every input, forwards the sub-cycle odometry
// samples to the pose estimator in timestamp order, then turns the latest chassis
// request into module commands.
//
// Modules drain their samplers one after another, so one module can see a burst the
// others only see next cycle. Samples are merged by timestamp: a snapshot is only
// forwarded once every module has reported up to that time, and a module with no
// sample at exactly that time contributes its newest earlier one.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::{ControlConfig, DriveConfig};
use crate::drive::gyro_io::{GyroInputs, GyroIo};
use crate::drive::module::Module;
use crate::drive::module_io::{ModuleIo, ModuleSample};
use crate::drive::odometry::{OdometrySample, PoseEstimator};
use crate::motor::kinematics::{
    ChassisSpeeds, MODULE_COUNT, SwerveKinematics, SwerveModulePosition, SwerveModuleState,
    desaturate_wheel_speeds, wrap_angle,
};

/// What the modules are told to do on the next cycle
#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Stop,
    Velocity(ChassisSpeeds),
    XLock,
    Characterization(f64),
}

pub struct Drive {
    gyro: Box<dyn GyroIo>,
    gyro_inputs: GyroInputs,
    modules: [Module; MODULE_COUNT],
    kinematics: SwerveKinematics,
    max_linear_speed: f64,
    request: Request,
    setpoints: [SwerveModuleState; MODULE_COUNT],
    /// Samples received but not yet forwarded, oldest first
    pending: [VecDeque<ModuleSample>; MODULE_COUNT],
    /// Past this many pending samples a module stops waiting for a silent peer
    pending_limit: usize,
    /// Newest sample per module at or before the last forwarded timestamp
    held: [Option<ModuleSample>; MODULE_COUNT],
    /// Snapshot forwarded last, the baseline for integrating heading
    last_snapshot: Option<[ModuleSample; MODULE_COUNT]>,
    last_timestamp: f64,
    /// Heading from the gyro when connected, integrated from the modules otherwise
    heading: f64,
}

impl Drive {
    pub fn new(
        gyro: Box<dyn GyroIo>,
        modules: [Box<dyn ModuleIo>; MODULE_COUNT],
        config: &DriveConfig,
    ) -> Self {
        let mut index = 0;
        let modules = modules.map(|io| {
            let module = Module::new(io, index, config.wheel_radius);
            index += 1;
            module
        });
        info!(
            "Drive created: {:.3}m x {:.3}m, max {:.2}m/s",
            config.track_width, config.wheel_base, config.max_linear_speed
        );

        Self {
            gyro,
            gyro_inputs: GyroInputs::default(),
            modules,
            kinematics: SwerveKinematics::rectangular(config.track_width, config.wheel_base),
            max_linear_speed: config.max_linear_speed,
            request: Request::Stop,
            setpoints: [SwerveModuleState::default(); MODULE_COUNT],
            pending: std::array::from_fn(|_| VecDeque::new()),
            pending_limit: config.sample_buffer_capacity.max(config.samples_per_cycle()),
            held: [None; MODULE_COUNT],
            last_snapshot: None,
            last_timestamp: f64::NEG_INFINITY,
            heading: 0.0,
        }
    }

    /// Run one control cycle: refresh inputs, forward odometry, command the modules
    pub fn periodic(&mut self, estimator: &mut dyn PoseEstimator) {
        self.gyro.update_inputs(&mut self.gyro_inputs);
        for module in &mut self.modules {
            module.periodic();
        }

        self.forward_odometry(estimator);
        self.apply_request();
    }

    /// Drive at the given body-frame velocities from the next cycle on
    pub fn run_velocity(&mut self, speeds: ChassisSpeeds) {
        self.request = Request::Velocity(speeds);
    }

    /// Zero voltage on every motor from the next cycle on
    pub fn stop(&mut self) {
        if self.request != Request::Stop {
            debug!("Drive stopping");
        }
        self.request = Request::Stop;
    }

    /// Stop and turn the wheels into an X so the base resists being pushed
    pub fn stop_with_x(&mut self) {
        let headings = self.kinematics.locations().map(|[x, y]| y.atan2(x));
        self.kinematics.reset_headings(headings);
        self.request = Request::XLock;
    }

    /// Open-loop drive voltage with all wheels facing forward
    pub fn run_characterization(&mut self, volts: f64) {
        self.request = Request::Characterization(volts);
    }

    /// Mean drive velocity (rad/s) across modules, for feedforward characterization
    pub fn characterization_velocity(&self) -> f64 {
        self.modules
            .iter()
            .map(Module::characterization_velocity)
            .sum::<f64>()
            / MODULE_COUNT as f64
    }

    pub fn set_brake_mode(&mut self, enable: bool) {
        for module in &mut self.modules {
            module.set_brake_mode(enable);
        }
    }

    /// Push new loop gains and clamps to every module with closed loops
    ///
    /// Returns how many modules were retuned; replay modules have no loops.
    pub fn retune(&mut self, config: &ControlConfig) -> usize {
        let mut retuned = 0;
        for (index, module) in self.modules.iter_mut().enumerate() {
            let Some(loops) = module.control_loops() else {
                continue;
            };
            info!(
                "Module {} retuned: drive {:?} -> {:?}, turn {:?} -> {:?}",
                index,
                loops.drive_gains(),
                config.drive,
                loops.turn_gains(),
                config.turn
            );
            loops.retune(config);
            retuned += 1;
        }
        retuned
    }

    /// Commands sent last cycle, after optimization
    pub fn setpoints(&self) -> [SwerveModuleState; MODULE_COUNT] {
        self.setpoints
    }

    pub fn module_states(&self) -> [SwerveModuleState; MODULE_COUNT] {
        self.modules.each_ref().map(Module::state)
    }

    pub fn module_positions(&self) -> [SwerveModulePosition; MODULE_COUNT] {
        self.modules.each_ref().map(Module::position)
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn gyro_connected(&self) -> bool {
        self.gyro_inputs.connected
    }

    /// True when any module failed its sensor reads this cycle
    pub fn any_module_stale(&self) -> bool {
        self.modules.iter().any(|m| m.inputs().is_stale())
    }

    /// Merge the modules' sub-cycle samples by timestamp and push them in order
    fn forward_odometry(&mut self, estimator: &mut dyn PoseEstimator) {
        let forwarded = self.last_timestamp;
        for ((module, queue), held) in self.modules.iter().zip(&mut self.pending).zip(&mut self.held) {
            for sample in module.odometry_samples() {
                if sample.timestamp > forwarded {
                    queue.push_back(*sample);
                } else if sample.timestamp.is_finite()
                    && held.is_none_or(|h| h.timestamp < sample.timestamp)
                {
                    // Too late to forward, still the freshest reading for this module
                    *held = Some(*sample);
                }
            }
        }

        let mut warned = false;
        loop {
            let ready = self.pending.iter().all(|q| !q.is_empty());
            let overflowing = self.pending.iter().any(|q| q.len() > self.pending_limit);
            if !ready && !overflowing {
                break;
            }
            if !ready && !warned {
                warn!("Module odometry out of step, dropping samples a silent module cannot match");
                warned = true;
            }

            let Some(timestamp) = self
                .pending
                .iter()
                .filter_map(VecDeque::front)
                .map(|s| s.timestamp)
                .reduce(f64::min)
            else {
                break;
            };
            for (queue, held) in self.pending.iter_mut().zip(&mut self.held) {
                if queue.front().is_some_and(|s| s.timestamp == timestamp) {
                    *held = queue.pop_front();
                }
            }

            // Nothing to report until every module has a reading at or before `timestamp`
            if self.held.iter().all(Option::is_some) {
                let current = self.held.map(Option::unwrap_or_default);
                self.forward_snapshot(timestamp, current, estimator);
            }
        }
    }

    fn forward_snapshot(
        &mut self,
        timestamp: f64,
        current: [ModuleSample; MODULE_COUNT],
        estimator: &mut dyn PoseEstimator,
    ) {
        let positions: [SwerveModulePosition; MODULE_COUNT] =
            std::array::from_fn(|m| self.modules[m].sample_position(&current[m]));
        self.heading = match self.gyro_heading_at(timestamp) {
            Some(yaw) => yaw,
            None => match self.last_snapshot {
                Some(last) => {
                    let deltas: [SwerveModulePosition; MODULE_COUNT] = std::array::from_fn(|m| {
                        let before = self.modules[m].sample_position(&last[m]);
                        SwerveModulePosition::new(
                            positions[m].distance - before.distance,
                            positions[m].angle,
                        )
                    });
                    wrap_angle(self.heading + self.kinematics.to_twist(&deltas).dtheta)
                }
                None => self.heading,
            },
        };

        estimator.add_odometry_sample(&OdometrySample {
            timestamp,
            drive_positions_rad: current.map(|s| s.drive_position_rad),
            turn_positions: current.map(|s| s.turn_position),
            module_positions: positions,
            heading: self.heading,
        });
        self.last_snapshot = Some(current);
        self.last_timestamp = timestamp;
    }

    /// Latest gyro yaw taken at or before `timestamp`; `None` when disconnected
    fn gyro_heading_at(&self, timestamp: f64) -> Option<f64> {
        let inputs = &self.gyro_inputs;
        if !inputs.connected {
            return None;
        }
        let sampled = inputs
            .odometry_yaw_timestamps
            .iter()
            .zip(&inputs.odometry_yaw_positions)
            .take_while(|&(&t, _)| t <= timestamp)
            .last()
            .map(|(_, &yaw)| yaw);
        Some(sampled.unwrap_or(inputs.yaw_position))
    }

    fn apply_request(&mut self) {
        match self.request {
            Request::Stop => {
                for (module, setpoint) in self.modules.iter_mut().zip(&mut self.setpoints) {
                    module.stop();
                    *setpoint = SwerveModuleState::new(0.0, module.angle());
                }
            }
            Request::Velocity(speeds) => {
                let mut states = self.kinematics.to_module_states(speeds.sanitized());
                desaturate_wheel_speeds(&mut states, self.max_linear_speed);
                self.run_states(states);
            }
            Request::XLock => {
                let states = self.kinematics.to_module_states(ChassisSpeeds::default());
                self.run_states(states);
            }
            Request::Characterization(volts) => {
                for (module, setpoint) in self.modules.iter_mut().zip(&mut self.setpoints) {
                    module.run_characterization(volts);
                    *setpoint = SwerveModuleState::new(0.0, 0.0);
                }
            }
        }
    }

    fn run_states(&mut self, states: [SwerveModuleState; MODULE_COUNT]) {
        for ((module, state), setpoint) in self.modules.iter_mut().zip(states).zip(&mut self.setpoints) {
            *setpoint = module.run_setpoint(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::drive::gyro_io::NoGyro;
    use crate::drive::module_io::{ModuleInputs, ReplayModuleIo};
    use crate::drive::module_io_feetech::FeetechModuleIo;
    use crate::drive::module_io_sim::SimModuleIo;
    use crate::drive::odometry_thread::{RawSample, SampleSource};
    use crate::motor::fake_servo::FakeServoBus;
    use crate::motor::feetech::{FeetechBus, Register};
    use std::f64::consts::FRAC_PI_4;
    use std::sync::Arc;

    fn sim_config() -> DriveConfig {
        DriveConfig {
            sim: SimConfig {
                initial_azimuths: Some([0.0; MODULE_COUNT]),
                ..SimConfig::default()
            },
            ..DriveConfig::default()
        }
    }

    fn sim_drive(config: &DriveConfig) -> Drive {
        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] =
            std::array::from_fn(|i| Box::new(SimModuleIo::new(config, i)) as Box<dyn ModuleIo>);
        Drive::new(Box::new(NoGyro), modules, config)
    }

    /// Emits `per_cycle` samples per update, module `m` at distance `step * m`
    struct ScriptedIo {
        module: usize,
        per_cycle: usize,
        clock: usize,
    }

    impl ModuleIo for ScriptedIo {
        fn update_inputs(&mut self, inputs: &mut ModuleInputs) {
            for _ in 0..self.per_cycle {
                self.clock += 1;
                inputs.odometry.push(ModuleSample {
                    timestamp: self.clock as f64 * 0.004,
                    drive_position_rad: self.clock as f64 * (self.module + 1) as f64,
                    turn_position: 0.0,
                });
            }
        }
    }

    fn scripted_drive(per_cycle: [usize; MODULE_COUNT], gyro: Box<dyn GyroIo>) -> Drive {
        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] = std::array::from_fn(|module| {
            Box::new(ScriptedIo {
                module,
                per_cycle: per_cycle[module],
                clock: 0,
            }) as Box<dyn ModuleIo>
        });
        Drive::new(gyro, modules, &DriveConfig::default())
    }

    struct FixedGyro;

    impl GyroIo for FixedGyro {
        fn update_inputs(&mut self, inputs: &mut GyroInputs) {
            inputs.connected = true;
            inputs.yaw_position = 0.3;
            inputs.odometry_yaw_timestamps = vec![0.0, 0.006];
            inputs.odometry_yaw_positions = vec![0.1, 0.2];
        }
    }

    #[test]
    fn test_samples_forwarded_in_order_without_loss() {
        let mut drive = scripted_drive([3; MODULE_COUNT], Box::new(NoGyro));
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.periodic(&mut samples);
        drive.periodic(&mut samples);

        assert_eq!(samples.len(), 6);
        for (i, sample) in samples.iter().enumerate() {
            let tick = (i + 1) as f64;
            assert!((sample.timestamp - tick * 0.004).abs() < 1e-12);
            for m in 0..MODULE_COUNT {
                assert_eq!(sample.drive_positions_rad[m], tick * (m + 1) as f64);
            }
        }
    }

    #[test]
    fn test_lagging_module_holds_back_tail() {
        let mut drive = scripted_drive([3, 3, 2, 3], Box::new(NoGyro));
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.periodic(&mut samples);
        assert_eq!(samples.len(), 2);

        drive.periodic(&mut samples);
        assert_eq!(samples.len(), 4);
        for (i, sample) in samples.iter().enumerate() {
            let tick = (i + 1) as f64;
            assert!((sample.timestamp - tick * 0.004).abs() < 1e-12);
            assert_eq!(sample.drive_positions_rad[0], tick);
            assert_eq!(sample.drive_positions_rad[2], tick * 3.0);
        }
    }

    /// Module `m` reads its own encoder `m` ms into each 20 ms cycle
    struct StaggeredIo {
        module: usize,
        cycle: usize,
    }

    impl ModuleIo for StaggeredIo {
        fn update_inputs(&mut self, inputs: &mut ModuleInputs) {
            self.cycle += 1;
            let timestamp = self.cycle as f64 * 0.02 + self.module as f64 * 0.001;
            inputs.odometry.push(ModuleSample {
                timestamp,
                drive_position_rad: timestamp,
                turn_position: 0.0,
            });
        }
    }

    #[test]
    fn test_staggered_reads_never_use_later_data() {
        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] = std::array::from_fn(|module| {
            Box::new(StaggeredIo { module, cycle: 0 }) as Box<dyn ModuleIo>
        });
        let mut drive = Drive::new(Box::new(NoGyro), modules, &DriveConfig::default());
        let mut samples: Vec<OdometrySample> = Vec::new();
        for _ in 0..5 {
            drive.periodic(&mut samples);
        }

        assert!(!samples.is_empty());
        for pair in samples.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
        for sample in &samples {
            for position in sample.drive_positions_rad {
                assert!(position <= sample.timestamp);
            }
        }
    }

    #[test]
    fn test_silent_module_does_not_grow_queues() {
        let mut drive = scripted_drive([3, 3, 0, 3], Box::new(NoGyro));
        let mut samples: Vec<OdometrySample> = Vec::new();
        for _ in 0..100 {
            drive.periodic(&mut samples);
        }
        assert!(samples.is_empty());
        assert!(drive.pending.iter().all(|q| q.len() <= drive.pending_limit));
    }

    #[test]
    fn test_burst_split_across_drains_stays_consistent() {
        let fake = FakeServoBus::new(&[1, 2, 3, 4, 5, 6, 7, 8]);
        for id in [1, 3, 5, 7] {
            fake.set_u16(id, Register::PresentPosition, 300);
        }
        let bus = FeetechBus::from_transport(fake).into_shared();
        let config = DriveConfig::default();
        let mut ios: Vec<FeetechModuleIo> = (0..MODULE_COUNT)
            .map(|index| FeetechModuleIo::new(Arc::clone(&bus), &config, index).unwrap())
            .collect();
        let sources: Vec<SampleSource> = ios.iter_mut().map(FeetechModuleIo::sample_source).collect();
        let push = |module: usize, burst: u16| {
            sources[module].buffer.push(RawSample {
                timestamp: burst as f64 * 0.004,
                drive_raw: burst * 100,
                turn_raw: 0,
            });
        };

        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] = ios
            .into_iter()
            .map(|io| Box::new(io) as Box<dyn ModuleIo>)
            .collect::<Vec<_>>()
            .try_into()
            .unwrap_or_else(|_| panic!("four modules"));
        let mut drive = Drive::new(Box::new(NoGyro), modules, &config);
        let mut samples: Vec<OdometrySample> = Vec::new();

        // Burst 2 lands after module 0 drained but before the others did
        for module in 0..MODULE_COUNT {
            push(module, 1);
        }
        for module in 1..MODULE_COUNT {
            push(module, 2);
        }
        drive.periodic(&mut samples);

        push(0, 2);
        for module in 0..MODULE_COUNT {
            push(module, 3);
        }
        drive.periodic(&mut samples);

        assert_eq!(samples.len(), 3);
        for (i, sample) in samples.iter().enumerate() {
            assert!((sample.timestamp - (i + 1) as f64 * 0.004).abs() < 1e-12);
            let first = sample.drive_positions_rad[0];
            assert!(sample.drive_positions_rad.iter().all(|&p| p == first));
        }
    }

    #[test]
    fn test_connected_gyro_supplies_heading() {
        let mut drive = scripted_drive([3; MODULE_COUNT], Box::new(FixedGyro));
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.periodic(&mut samples);

        // Samples at 0.004, 0.008, 0.012 against yaw readings at 0.0 and 0.006
        let headings: Vec<f64> = samples.iter().map(|s| s.heading).collect();
        assert_eq!(headings, vec![0.1, 0.2, 0.2]);
        assert!(drive.gyro_connected());
    }

    #[test]
    fn test_forward_request_on_square_layout() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0));
        for _ in 0..100 {
            drive.periodic(&mut samples);
        }

        for setpoint in drive.setpoints() {
            assert_eq!(setpoint.speed, 1.0);
            assert_eq!(setpoint.angle, 0.0);
        }
        for state in drive.module_states() {
            assert!(state.angle.abs() < 0.01, "azimuth was {}", state.angle);
            assert!((state.speed - 1.0).abs() < 0.05, "speed was {}", state.speed);
        }
        assert_eq!(samples.len(), 100 * config.samples_per_cycle());
        for pair in samples.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }

    #[test]
    fn test_request_is_desaturated() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.run_velocity(ChassisSpeeds::new(3.0, 0.0, 10.0));
        drive.periodic(&mut Vec::<OdometrySample>::new());

        let speeds = drive.setpoints().map(|s| s.speed.abs());
        let fastest = speeds.iter().cloned().fold(0.0, f64::max);
        assert!((fastest - config.max_linear_speed).abs() < 1e-9);
    }

    #[test]
    fn test_nan_request_is_sanitized() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.run_velocity(ChassisSpeeds::new(f64::NAN, 0.5, f64::NAN));
        drive.periodic(&mut Vec::<OdometrySample>::new());
        for setpoint in drive.setpoints() {
            assert!(setpoint.speed.is_finite() && setpoint.angle.is_finite());
            assert!((setpoint.speed.abs() - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_heading_integrates_without_gyro() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.run_velocity(ChassisSpeeds::new(0.0, 0.0, 1.0));
        for _ in 0..100 {
            drive.periodic(&mut Vec::<OdometrySample>::new());
        }
        let heading = drive.heading();
        assert!(!drive.gyro_connected());
        assert!((1.7..2.1).contains(&heading), "heading was {}", heading);
    }

    #[test]
    fn test_stop_with_x_points_wheels_at_center() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.stop_with_x();
        drive.periodic(&mut Vec::<OdometrySample>::new());
        let angles = drive.setpoints().map(|s| s.angle.abs());
        for angle in angles {
            let folded = if angle > std::f64::consts::FRAC_PI_2 {
                std::f64::consts::PI - angle
            } else {
                angle
            };
            assert!((folded - FRAC_PI_4).abs() < 1e-9);
        }
        assert!(drive.setpoints().iter().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_replay_modules_are_not_an_error() {
        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] =
            std::array::from_fn(|_| Box::new(ReplayModuleIo) as Box<dyn ModuleIo>);
        let mut drive = Drive::new(Box::new(NoGyro), modules, &DriveConfig::default());
        let mut samples: Vec<OdometrySample> = Vec::new();
        drive.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0));
        drive.periodic(&mut samples);
        assert!(samples.is_empty());
        assert_eq!(drive.heading(), 0.0);
        assert_eq!(drive.characterization_velocity(), 0.0);
    }

    #[test]
    fn test_stop_zeroes_setpoints() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0));
        drive.periodic(&mut Vec::<OdometrySample>::new());
        drive.stop();
        drive.periodic(&mut Vec::<OdometrySample>::new());
        assert!(drive.setpoints().iter().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_infinite_request_is_saturated() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        drive.run_velocity(ChassisSpeeds::new(f64::INFINITY, 0.0, f64::NEG_INFINITY));
        drive.periodic(&mut Vec::<OdometrySample>::new());

        let setpoints = drive.setpoints();
        assert!(setpoints.iter().all(|s| s.speed.is_finite() && s.angle.is_finite()));
        let fastest = setpoints.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
        assert!((fastest - config.max_linear_speed).abs() < 1e-9);
        assert!(setpoints.iter().all(|s| s.speed.abs() > 0.0));
    }

    #[test]
    fn test_retune_reaches_every_closed_loop_module() {
        let config = sim_config();
        let mut drive = sim_drive(&config);
        let gains = ControlConfig {
            drive: crate::control::PidGains::new(0.0, 0.0, 0.0),
            drive_feedforward: crate::control::FeedforwardGains::new(0.0, 0.0, 0.0),
            ..ControlConfig::default()
        };
        assert_eq!(drive.retune(&gains), MODULE_COUNT);

        // With no drive gains the wheels get no voltage and stay put
        drive.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0));
        for _ in 0..10 {
            drive.periodic(&mut Vec::<OdometrySample>::new());
        }
        assert!(drive.module_states().iter().all(|s| s.speed == 0.0));

        let modules: [Box<dyn ModuleIo>; MODULE_COUNT] =
            std::array::from_fn(|_| Box::new(ReplayModuleIo) as Box<dyn ModuleIo>);
        let mut replay = Drive::new(Box::new(NoGyro), modules, &DriveConfig::default());
        assert_eq!(replay.retune(&gains), 0);
    }
}
