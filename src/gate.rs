//! Named debounce gates over a monotonic clock.
//!
//! Every sampled signal and the main policy tick share this primitive: a gate
//! fires at most once per configured interval, and firing resets its clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Map of gate id to the offset (from a fixed origin) at which it last fired.
///
/// Offsets rather than raw `Instant`s so tests can drive the clock by hand
/// through [`TimerGate::fire_at`]. Single-threaded by design; callers on the
/// daemon loop are the only writers.
#[derive(Debug)]
pub struct TimerGate {
    origin: Instant,
    last_fired: HashMap<String, Duration>,
}

impl TimerGate {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_fired: HashMap::new(),
        }
    }

    /// Fire the gate if its interval has elapsed since it last fired.
    ///
    /// Returns `true` and resets the gate's clock when `now - last_fired`
    /// is at least `interval`. A gate id that has never fired always fires,
    /// as does any gate with a zero interval.
    pub fn fire(&mut self, id: &str, interval: Duration) -> bool {
        let now = self.origin.elapsed();
        self.fire_at(id, interval, now)
    }

    /// Forget a gate's last firing so the next query fires unconditionally.
    /// Used to force an immediate refresh of a debounced signal.
    pub fn clear(&mut self, id: &str) {
        self.last_fired.remove(id);
    }

    /// Clock-explicit form of [`fire`](Self::fire), where `now` is an offset
    /// from the gate map's origin.
    pub fn fire_at(&mut self, id: &str, interval: Duration, now: Duration) -> bool {
        let due = match self.last_fired.get(id) {
            None => true,
            Some(last) => now.saturating_sub(*last) >= interval,
        };
        if due {
            self.last_fired.insert(id.to_string(), now);
        }
        due
    }
}

impl Default for TimerGate {
    fn default() -> Self {
        Self::new()
    }
}
