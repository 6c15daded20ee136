// Bounded queue between the high-frequency sampler and the control loop.
//
// The producer pushes timestamped samples; the control loop drains everything at
// the top of each cycle. When the consumer stalls the oldest samples are dropped so
// the producer never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::warn;

pub struct SampleBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> SampleBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a sample, evicting the oldest one if full
    pub fn push(&self, sample: T) {
        let mut queue = self.queue.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!("Sample buffer full, dropped {} samples so far", dropped);
            }
        }
        queue.push_back(sample);
    }

    /// Take every buffered sample, oldest first
    pub fn drain(&self) -> Vec<T> {
        let mut queue = self.queue.lock();
        queue.drain(..).collect()
    }

    /// Take every buffered sample into `out`, oldest first
    pub fn drain_into(&self, out: &mut Vec<T>) {
        let mut queue = self.queue.lock();
        out.extend(queue.drain(..));
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples evicted since construction
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
