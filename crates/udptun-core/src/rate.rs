//! Fixed-window admission control for tunnel traffic.
//!
//! One instance guards the client's egress path and each server connection
//! gets its own, so one abusive client cannot exhaust another's quota.
//! Instances are explicitly owned and passed, never process-wide.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(1);

/// Rate limiting configuration. Zero disables the corresponding check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Max packets admitted per one-second window (0 = unlimited).
    pub packets_per_sec: u32,
    /// Max payload bytes admitted per one-second window (0 = unlimited).
    pub bytes_per_sec: u32,
}

impl RateLimitConfig {
    pub fn unlimited(&self) -> bool {
        self.packets_per_sec == 0 && self.bytes_per_sec == 0
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    packets: u32,
    bytes: u64,
}

/// Fixed-window packet/byte rate limiter.
///
/// Counters are valid only within `[window, window + 1s)`; once the window
/// elapses they reset and partial-window history is discarded. This admits
/// up to twice the configured rate across a window boundary. That burst
/// allowance is the accepted contract of the fixed-window design; switching
/// to a token bucket or sliding window would change observable behavior.
#[derive(Debug)]
pub struct RateLimit {
    config: RateLimitConfig,
    window: Mutex<Window>,
}

impl RateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window {
                started: Instant::now(),
                packets: 0,
                bytes: 0,
            }),
        }
    }

    /// Admit one packet of `n` payload bytes, or refuse it.
    ///
    /// Refusal leaves the counters untouched: the caller must drop the
    /// packet, not retry it against the same window.
    pub fn allow(&self, n: usize) -> bool {
        if self.config.unlimited() {
            return true;
        }
        let mut w = self.window.lock();
        let now = Instant::now();
        if now.duration_since(w.started) >= WINDOW {
            w.started = now;
            w.packets = 0;
            w.bytes = 0;
        }
        let pps = self.config.packets_per_sec;
        if pps > 0 && w.packets + 1 > pps {
            return false;
        }
        let bps = self.config.bytes_per_sec;
        if bps > 0 && w.bytes + n as u64 > u64::from(bps) {
            return false;
        }
        w.packets += 1;
        w.bytes += n as u64;
        true
    }

    /// Shift the current window back in time. Test-only hook so window
    /// expiry can be exercised without sleeping.
    #[cfg(test)]
    fn backdate(&self, d: Duration) {
        let mut w = self.window.lock();
        w.started -= d;
    }
}
