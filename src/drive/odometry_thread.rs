// High-frequency encoder sampler for the Feetech modules
//
// Reads every module's drive and turn encoder in one bus transaction burst, stamps
// the burst with a single timestamp, and pushes one raw sample per module. The control
// loop drains the per-module buffers once per cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::drive::sample_buffer::SampleBuffer;
use crate::motor::feetech::{FeetechBus, FeetechError, SharedBus};

/// Monotonic seconds since the first call in this process
pub fn timestamp() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Raw encoder counts captured by the sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub drive_raw: u16,
    pub turn_raw: u16,
}

/// One module's encoders and the buffer its samples go to
#[derive(Clone)]
pub struct SampleSource {
    pub drive_id: u8,
    pub turn_id: u8,
    pub buffer: Arc<SampleBuffer<RawSample>>,
}

pub struct OdometryThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OdometryThread {
    /// Start sampling `sources` at `frequency_hz`
    pub fn spawn(bus: SharedBus, sources: Vec<SampleSource>, frequency_hz: f64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs_f64(1.0 / frequency_hz);
        info!(
            "Odometry sampler started: {:.0}Hz, {} modules",
            frequency_hz,
            sources.len()
        );

        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("odometry".to_string())
                .spawn(move || run(bus, sources, period, stop))
        };

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Backends fall back to one sample per cycle
                warn!("Failed to spawn odometry sampler: {}", e);
                None
            }
        };

        Self { stop, handle }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop sampling and wait for the thread to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Odometry sampler panicked");
            }
        }
    }
}

impl Drop for OdometryThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(bus: SharedBus, sources: Vec<SampleSource>, period: Duration, stop: Arc<AtomicBool>) {
    let mut next = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let burst = sample_all(&mut bus.lock(), &sources);
        match burst {
            Ok(samples) => {
                for (source, sample) in sources.iter().zip(samples) {
                    source.buffer.push(sample);
                }
            }
            // Skipping the whole burst keeps the modules in lockstep
            Err(e) => debug!("Odometry sample skipped: {}", e),
        }

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

fn sample_all(bus: &mut FeetechBus, sources: &[SampleSource]) -> Result<Vec<RawSample>, FeetechError> {
    let mut raws = Vec::with_capacity(sources.len());
    for source in sources {
        let drive_raw = bus.get_position(source.drive_id)?;
        let turn_raw = bus.get_position(source.turn_id)?;
        raws.push((drive_raw, turn_raw));
    }
    let timestamp = timestamp();
    Ok(raws
        .into_iter()
        .map(|(drive_raw, turn_raw)| RawSample {
            timestamp,
            drive_raw,
            turn_raw,
        })
        .collect())
}
