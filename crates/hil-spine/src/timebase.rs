use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Real time elapsed since the simulation started, as seen by the board.
///
/// The reference instant is captured lazily on the first sample taken at
/// simulation time zero. A sample taken later without a reference captures
/// one on the spot so the output never jumps backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElapsedClock {
    reference: Option<Instant>,
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self { reference: None }
    }

    pub fn sample(&mut self, sim_time_s: f64) -> Duration {
        let now = Instant::now();
        let reference = match self.reference {
            Some(reference) => reference,
            None => {
                if sim_time_s > 0.0 {
                    log::warn!(
                        "first output arrived at t={sim_time_s}s instead of t=0, elapsed time starts now"
                    );
                }
                self.reference = Some(now);
                now
            }
        };
        now.saturating_duration_since(reference)
    }
}
