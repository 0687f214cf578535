//! Host collaborators: the OS-specific probes and power-manager mutations the
//! policy engine depends on.
//!
//! The engine itself is OS-agnostic; everything it needs from the machine is
//! behind the [`Host`] trait so the sampler and controller can be exercised
//! against a scripted mock.

mod command;
mod xfce;

pub use command::{run_command, run_command_with_timeout, COMMAND_TIMEOUT};
pub use xfce::XfceHost;

#[cfg(test)]
pub mod mock;

use anyhow::Result;

/// Whether the machine is externally powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Ac,
    Battery,
}

impl PowerSource {
    pub fn on_ac(self) -> bool {
        matches!(self, PowerSource::Ac)
    }
}

/// Cumulative per-interface byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Read and write access to the machine's power-relevant state.
///
/// Probes return `Err` on any failure to reach or parse the underlying
/// facility; callers decide whether to fall back to a cached value. Mutations
/// are expected to be idempotent at the OS level; the controller additionally
/// only issues them on state edges.
pub trait Host {
    // Probes.
    fn power_source(&self) -> Result<PowerSource>;
    fn audio_stream_active(&self) -> Result<bool>;
    fn system_volume(&self) -> Result<u8>;
    fn cpu_usage_percent(&self) -> Result<f64>;
    fn network_byte_counters(&self, interface: &str) -> Result<NetCounters>;
    fn idle_seconds(&self) -> Result<f64>;
    fn lock_screen_active(&self) -> Result<bool>;
    fn inactivity_timeout(&self) -> Result<u32>;

    // Power-manager mutations.
    fn set_inactivity_timeout(&self, minutes: u32) -> Result<()>;
    fn set_display_dpms_enabled(&self, enabled: bool) -> Result<()>;
    fn set_blank_on_battery(&self, seconds: u32) -> Result<()>;
    fn set_dpms_sleep_on_battery(&self, seconds: u32) -> Result<()>;
    fn set_dpms_off_on_battery(&self, seconds: u32) -> Result<()>;
    fn set_brightness_on_battery(&self, enabled: bool) -> Result<()>;
    fn set_brightness_level_on_battery(&self, percent: u32) -> Result<()>;

    /// Inject a negligible synthetic input event to reset OS idle timers.
    fn pointer_nudge(&self) -> Result<()>;
}
