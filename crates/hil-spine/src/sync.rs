use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::ports::SensorOutputs;

/// One-shot flag between a step and the telemetry callback.
///
/// The controller thread arms it right before waiting; the device's
/// callback releases it. Only the first release after an arm counts, any
/// further callback finds it clear and is discarded.
#[derive(Debug, Default)]
pub struct WaitGate {
    armed: AtomicBool,
    released: AtomicU64,
    discarded: AtomicU64,
}

impl WaitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Called from the telemetry callback. Returns whether this call cleared
    /// an armed gate.
    pub fn release(&self) -> bool {
        match self
            .armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.released.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Drops an armed gate after the waiter gave up, so a late frame is
    /// discarded instead of counted as the answer. Returns `false` when a
    /// callback cleared the gate first.
    fn disarm(&self) -> bool {
        self.armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn releases(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Released { waited: Duration },
    TimedOut { waited: Duration },
}

impl WaitOutcome {
    pub fn waited(&self) -> Duration {
        match self {
            WaitOutcome::Released { waited } | WaitOutcome::TimedOut { waited } => *waited,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut { .. })
    }
}

/// Spins until the gate is released or `timeout` has passed.
///
/// Never sleeps and never fails. Returns within `timeout` plus one poll.
pub fn wait_for_telemetry(gate: &WaitGate, timeout: Duration) -> WaitOutcome {
    let start = Instant::now();
    let deadline = start + timeout;
    loop {
        if !gate.is_armed() {
            return WaitOutcome::Released {
                waited: start.elapsed(),
            };
        }
        if Instant::now() >= deadline {
            let waited = start.elapsed();
            // A callback may have landed between the two checks.
            return if gate.disarm() {
                WaitOutcome::TimedOut { waited }
            } else {
                WaitOutcome::Released { waited }
            };
        }
        std::hint::spin_loop();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSnapshot {
    pub timestamp_us: u64,
    pub step: u64,
    pub outputs: SensorOutputs,
    pub wait_us: u64,
    pub timed_out: bool,
}

struct TripleBuffer<T: Copy + Default> {
    slots: [UnsafeCell<T>; 3],
    index: AtomicUsize,
}

unsafe impl<T: Copy + Default + Send> Send for TripleBuffer<T> {}
unsafe impl<T: Copy + Default + Sync> Sync for TripleBuffer<T> {}

impl<T: Copy + Default> TripleBuffer<T> {
    fn new() -> Self {
        let slots = std::array::from_fn(|_| UnsafeCell::new(T::default()));
        Self {
            slots,
            index: AtomicUsize::new(0),
        }
    }

    fn write(&self, value: T) {
        let current = self.index.load(Ordering::Relaxed);
        let next = (current + 1) % 3;
        unsafe {
            *self.slots[next].get() = value;
        }
        self.index.store(next, Ordering::Release);
    }

    fn read(&self) -> T {
        let idx = self.index.load(Ordering::Acquire);
        unsafe { *self.slots[idx].get() }
    }
}

/// Latest cycle, handed from the controller thread to observers without
/// ever blocking the writer.
pub struct SnapshotExchange {
    latest: TripleBuffer<CycleSnapshot>,
}

impl SnapshotExchange {
    pub fn new() -> Self {
        Self {
            latest: TripleBuffer::new(),
        }
    }

    /// Called by the controller thread once per tick (single writer).
    pub fn publish(&self, snapshot: CycleSnapshot) {
        self.latest.write(snapshot);
    }

    pub fn read(&self) -> CycleSnapshot {
        self.latest.read()
    }
}

impl Default for SnapshotExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn second_release_is_discarded() {
        let gate = WaitGate::new();
        gate.arm();
        assert!(gate.release());
        assert!(!gate.release());
        assert!(!gate.is_armed());
        assert_eq!(gate.releases(), 1);
        assert_eq!(gate.discarded(), 1);
    }

    #[test]
    fn release_without_arm_has_no_effect() {
        let gate = WaitGate::new();
        assert!(!gate.release());
        assert!(!gate.is_armed());
        assert_eq!(gate.releases(), 0);
    }

    #[test]
    fn returns_immediately_when_not_armed() {
        let gate = WaitGate::new();
        let outcome = wait_for_telemetry(&gate, Duration::from_secs(5));
        assert!(!outcome.is_timeout());
        assert!(outcome.waited() < Duration::from_millis(50));
    }

    #[test]
    fn times_out_within_bound_when_never_released() {
        let gate = WaitGate::new();
        gate.arm();
        let timeout = Duration::from_millis(11);
        let outcome = wait_for_telemetry(&gate, timeout);
        assert!(outcome.is_timeout());
        assert!(outcome.waited() >= timeout);
        assert!(outcome.waited() < timeout + Duration::from_millis(5));
        // A frame arriving after the step gave up is not taken as an answer.
        assert!(!gate.release());
    }

    #[test]
    fn disarm_loses_to_a_callback_that_cleared_first() {
        let gate = WaitGate::new();
        gate.arm();
        assert!(gate.release());
        assert!(!gate.disarm());
        assert_eq!(gate.releases(), 1);

        gate.arm();
        assert!(gate.disarm());
        assert!(!gate.release());
        assert_eq!(gate.discarded(), 1);
    }

    #[test]
    fn expired_timeout_still_reports_a_release_that_landed() {
        let gate = WaitGate::new();
        gate.arm();
        gate.release();
        let outcome = wait_for_telemetry(&gate, Duration::ZERO);
        assert!(!outcome.is_timeout());
        assert_eq!(gate.releases(), 1);
    }

    #[test]
    fn early_release_ends_the_wait() {
        let gate = Arc::new(WaitGate::new());
        gate.arm();
        let remote = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(2));
            remote.release();
        });
        let outcome = wait_for_telemetry(&gate, Duration::from_millis(200));
        handle.join().unwrap();
        assert!(!outcome.is_timeout());
        assert!(outcome.waited() >= Duration::from_millis(2));
        assert!(outcome.waited() < Duration::from_millis(100));
    }

    #[test]
    fn exchange_returns_latest_snapshot() {
        let exchange = SnapshotExchange::new();
        assert_eq!(exchange.read().step, 0);
        for step in 1..=5 {
            exchange.publish(CycleSnapshot {
                step,
                ..Default::default()
            });
        }
        assert_eq!(exchange.read().step, 5);
    }
}
