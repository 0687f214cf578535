//! Debounced sampling of the system signals the policy engine consumes.
//!
//! Each signal has its own refresh cadence behind a named timer gate; between
//! refreshes the last sampled value is sticky, so a read is cheap even when
//! ground truth has drifted. A failed probe falls back to the cached value;
//! a probe that fails before any value exists surfaces as an error rather
//! than a silent default.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::gate::TimerGate;
use crate::host::Host;

const AC_CHECK_INTERVAL: Duration = Duration::from_secs(51);
const AUDIO_CHECK_INTERVAL: Duration = Duration::from_secs(29);
const CPU_CHECK_INTERVAL: Duration = Duration::from_secs(15);
const NETWORK_CHECK_INTERVAL: Duration = Duration::from_secs(55);
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const LOCK_CHECK_INTERVAL: Duration = Duration::from_secs(29);

/// Direction of a power-source edge observed during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransition {
    ToAc,
    ToBattery,
}

/// A power-source read: the current level plus, when this read refreshed the
/// cache and the value flipped, the edge. The edge travels with the reading
/// so the caller can react to the transition before acting on the level.
#[derive(Debug, Clone, Copy)]
pub struct PowerReading {
    pub on_ac: bool,
    pub transition: Option<PowerTransition>,
}

/// Owns the signal cache and the timer-gate map. All methods are explicit
/// "sample if due" reads; caching is part of the contract, not a hidden
/// side effect.
pub struct SignalSampler {
    gate: TimerGate,
    /// Window for the two-point network throughput measurement. One second in
    /// production; the refresh deliberately blocks for this long.
    measurement_window: Duration,
    power_on_ac: Option<bool>,
    audio_playing: Option<bool>,
    cpu_usage: Option<f64>,
    network_kbps: Option<u64>,
    idle_seconds: Option<f64>,
    lock_active: Option<bool>,
}

impl SignalSampler {
    pub fn new() -> Self {
        Self {
            gate: TimerGate::new(),
            measurement_window: Duration::from_secs(1),
            power_on_ac: None,
            audio_playing: None,
            cpu_usage: None,
            network_kbps: None,
            idle_seconds: None,
            lock_active: None,
        }
    }

    /// Shrink the network measurement window. Intended for tests and for
    /// callers that cannot tolerate the one-second blocking refresh.
    pub fn with_measurement_window(mut self, window: Duration) -> Self {
        self.measurement_window = window;
        self
    }

    /// Main policy tick, shared with the controller's evaluation cadence.
    pub fn main_tick_due(&mut self, interval: Duration) -> bool {
        self.gate.fire("main_tick", interval)
    }

    /// Drop the debounce for one gate so the next read refreshes immediately.
    pub fn clear_gate(&mut self, id: &str) {
        self.gate.clear(id);
    }

    pub fn power_supplied(&mut self, host: &dyn Host) -> Result<PowerReading> {
        if self.gate.fire("ac_check", AC_CHECK_INTERVAL) || self.power_on_ac.is_none() {
            match host.power_source() {
                Ok(source) => {
                    let fresh = source.on_ac();
                    let transition = match self.power_on_ac {
                        Some(previous) if previous != fresh => Some(if fresh {
                            PowerTransition::ToAc
                        } else {
                            PowerTransition::ToBattery
                        }),
                        _ => None,
                    };
                    debug!(on_ac = fresh, "power source refreshed");
                    self.power_on_ac = Some(fresh);
                    return Ok(PowerReading {
                        on_ac: fresh,
                        transition,
                    });
                }
                Err(err) => {
                    warn!("power source probe failed: {err:#}");
                    // Firing reset the gate's clock; give it back so the
                    // retry happens on the next tick, not a full interval out.
                    self.gate.clear("ac_check");
                }
            }
        }
        self.power_on_ac
            .map(|on_ac| PowerReading {
                on_ac,
                transition: None,
            })
            .ok_or_else(|| anyhow!("power source signal unavailable"))
    }

    /// True only when an output stream is running AND the sink is audible.
    /// A muted sink counts as silence even if a stream is nominally active.
    pub fn audio_playing(&mut self, host: &dyn Host) -> Result<bool> {
        if self.gate.fire("audio_check", AUDIO_CHECK_INTERVAL) || self.audio_playing.is_none() {
            let fresh = host
                .audio_stream_active()
                .and_then(|active| Ok(active && host.system_volume()? > 0));
            match fresh {
                Ok(playing) => {
                    debug!(playing, "audio playback refreshed");
                    self.audio_playing = Some(playing);
                }
                Err(err) => {
                    warn!("audio probe failed: {err:#}");
                    self.gate.clear("audio_check");
                }
            }
        }
        self.audio_playing
            .ok_or_else(|| anyhow!("audio playback signal unavailable"))
    }

    pub fn cpu_usage(&mut self, host: &dyn Host) -> Result<f64> {
        if self.gate.fire("cpu_check", CPU_CHECK_INTERVAL) || self.cpu_usage.is_none() {
            match host.cpu_usage_percent() {
                Ok(usage) => {
                    debug!(usage, "cpu usage refreshed");
                    self.cpu_usage = Some(usage);
                }
                Err(err) => {
                    warn!("cpu probe failed: {err:#}");
                    self.gate.clear("cpu_check");
                }
            }
        }
        self.cpu_usage
            .ok_or_else(|| anyhow!("cpu usage signal unavailable"))
    }

    /// Estimated throughput in KB/s over a blocking measurement window.
    /// The tick on which this gate fires stalls for the window duration.
    pub fn network_activity(&mut self, host: &dyn Host, interface: &str) -> Result<u64> {
        if self.gate.fire("network_check", NETWORK_CHECK_INTERVAL) || self.network_kbps.is_none() {
            match self.measure_throughput(host, interface) {
                Ok(kbps) => {
                    debug!(kbps, "network activity refreshed");
                    self.network_kbps = Some(kbps);
                }
                Err(err) => {
                    warn!("network probe failed: {err:#}");
                    self.gate.clear("network_check");
                }
            }
        }
        self.network_kbps
            .ok_or_else(|| anyhow!("network activity signal unavailable"))
    }

    fn measure_throughput(&self, host: &dyn Host, interface: &str) -> Result<u64> {
        let first = host.network_byte_counters(interface)?;
        thread::sleep(self.measurement_window);
        let second = host.network_byte_counters(interface)?;
        let delta = second.bytes_received.saturating_sub(first.bytes_received)
            + second.bytes_sent.saturating_sub(first.bytes_sent);
        Ok(((delta as f64) / 1024.0).round() as u64)
    }

    pub fn idle_seconds(&mut self, host: &dyn Host) -> Result<f64> {
        if self.gate.fire("idle_check", IDLE_CHECK_INTERVAL) || self.idle_seconds.is_none() {
            match host.idle_seconds() {
                Ok(idle) => self.idle_seconds = Some(idle),
                Err(err) => {
                    warn!("idle time probe failed: {err:#}");
                    self.gate.clear("idle_check");
                }
            }
        }
        self.idle_seconds
            .ok_or_else(|| anyhow!("idle time signal unavailable"))
    }

    /// Activity score in [0, 1]: 1.0 means very recently active, trending to
    /// zero as idle time approaches the chill timeout.
    pub fn user_activity(&mut self, host: &dyn Host, chill_timeout_minutes: u32) -> Result<f64> {
        let idle = self.idle_seconds(host)?;
        let score = 1.0 - (idle / 60.0) / f64::from(chill_timeout_minutes.max(1));
        Ok(score.clamp(0.0, 1.0))
    }

    pub fn lock_screen_active(&mut self, host: &dyn Host) -> Result<bool> {
        if self.gate.fire("lock_check", LOCK_CHECK_INTERVAL) || self.lock_active.is_none() {
            match host.lock_screen_active() {
                Ok(active) => {
                    debug!(active, "lock screen state refreshed");
                    self.lock_active = Some(active);
                }
                Err(err) => {
                    warn!("lock screen probe failed: {err:#}");
                    self.gate.clear("lock_check");
                }
            }
        }
        self.lock_active
            .ok_or_else(|| anyhow!("lock screen signal unavailable"))
    }
}

impl Default for SignalSampler {
    fn default() -> Self {
        Self::new()
    }
}
