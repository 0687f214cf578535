//! XFCE host backend.
//!
//! Probes and mutations are thin wrappers over the same tools the desktop
//! itself uses: `acpi` for the power source, `pactl` for audio, `xprintidle`
//! for idle time, `xfconf-query` against the xfce4-power-manager channel for
//! every power setting, and `xdotool` for the synthetic nudge. CPU and network
//! figures come straight from procfs.

use std::fs;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use super::command::run_command;
use super::{Host, NetCounters, PowerSource};

const XFPM_CHANNEL: &str = "xfce4-power-manager";
const PROP_INACTIVITY_ON_BATTERY: &str = "/xfce4-power-manager/inactivity-on-battery";
const PROP_DPMS_ENABLED: &str = "/xfce4-power-manager/dpms-enabled";
const PROP_BLANK_ON_BATTERY: &str = "/xfce4-power-manager/blank-on-battery";
const PROP_DPMS_SLEEP_ON_BATTERY: &str = "/xfce4-power-manager/dpms-on-battery-sleep";
const PROP_DPMS_OFF_ON_BATTERY: &str = "/xfce4-power-manager/dpms-on-battery-off";
const PROP_BRIGHTNESS_ON_BATTERY: &str = "/xfce4-power-manager/brightness-on-battery";
const PROP_BRIGHTNESS_LEVEL_ON_BATTERY: &str = "/xfce4-power-manager/brightness-level-on-battery";

/// One row of /proc/stat cpu jiffies, reduced to busy/total.
#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Command-backed [`Host`] for XFCE desktops.
///
/// Holds the previous /proc/stat reading so CPU usage can be computed as a
/// delta between consecutive probes without blocking; the first probe after
/// startup reports 0.0.
pub struct XfceHost {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl XfceHost {
    pub fn new() -> Self {
        Self {
            last_cpu: Mutex::new(None),
        }
    }

    fn xfconf_get(&self, prop: &str) -> Result<String> {
        run_command("xfconf-query", &["-c", XFPM_CHANNEL, "-p", prop])
    }

    fn xfconf_set(&self, prop: &str, value: &str) -> Result<()> {
        run_command("xfconf-query", &["-c", XFPM_CHANNEL, "-p", prop, "-s", value])?;
        Ok(())
    }

    fn read_cpu_times() -> Result<CpuTimes> {
        let stat = fs::read_to_string("/proc/stat").context("Failed to read /proc/stat")?;
        let line = stat
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| anyhow!("No aggregate cpu line in /proc/stat"))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse::<u64>().unwrap_or(0))
            .collect();
        if fields.len() < 4 {
            bail!("Malformed cpu line in /proc/stat: {line}");
        }
        let total: u64 = fields.iter().sum();
        // idle + iowait are the non-busy jiffies
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        Ok(CpuTimes {
            busy: total - idle,
            total,
        })
    }
}

impl Default for XfceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for XfceHost {
    fn power_source(&self) -> Result<PowerSource> {
        let out = run_command("acpi", &["-a"])?;
        if out.contains("on-line") {
            Ok(PowerSource::Ac)
        } else {
            Ok(PowerSource::Battery)
        }
    }

    fn audio_stream_active(&self) -> Result<bool> {
        let out = run_command("pactl", &["list"])?;
        Ok(out.contains("State: RUNNING"))
    }

    fn system_volume(&self) -> Result<u8> {
        let mute = run_command("pactl", &["get-sink-mute", "@DEFAULT_SINK@"])?;
        if mute.contains("yes") {
            return Ok(0);
        }
        let out = run_command("pactl", &["get-sink-volume", "@DEFAULT_SINK@"])?;
        // e.g. "Volume: front-left: 39322 /  60% / -13.31 dB, ..."
        let volume = out
            .split_whitespace()
            .find_map(|tok| tok.strip_suffix('%').and_then(|v| v.parse::<u8>().ok()))
            .ok_or_else(|| anyhow!("No percentage in pactl volume output: {out}"))?;
        Ok(volume.min(100))
    }

    fn cpu_usage_percent(&self) -> Result<f64> {
        let current = Self::read_cpu_times()?;
        let mut last = self
            .last_cpu
            .lock()
            .map_err(|_| anyhow!("cpu sample lock poisoned"))?;
        let usage = match *last {
            Some(prev) if current.total > prev.total => {
                let busy = current.busy.saturating_sub(prev.busy) as f64;
                let total = (current.total - prev.total) as f64;
                (busy / total * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };
        *last = Some(current);
        Ok(usage)
    }

    fn network_byte_counters(&self, interface: &str) -> Result<NetCounters> {
        let dev = fs::read_to_string("/proc/net/dev").context("Failed to read /proc/net/dev")?;
        for line in dev.lines() {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            if name.trim() != interface {
                continue;
            }
            let fields: Vec<u64> = rest
                .split_whitespace()
                .map(|f| f.parse::<u64>().unwrap_or(0))
                .collect();
            if fields.len() < 9 {
                bail!("Malformed /proc/net/dev line for {interface}");
            }
            return Ok(NetCounters {
                bytes_received: fields[0],
                bytes_sent: fields[8],
            });
        }
        bail!("Interface not found in /proc/net/dev: {interface}");
    }

    fn idle_seconds(&self) -> Result<f64> {
        let out = run_command("xprintidle", &[])?;
        let millis: f64 = out
            .parse()
            .with_context(|| format!("Unparseable xprintidle output: {out}"))?;
        Ok(millis / 1000.0)
    }

    fn lock_screen_active(&self) -> Result<bool> {
        let out = run_command("xfce4-screensaver-command", &["--query"])?;
        Ok(out.contains("is active"))
    }

    fn inactivity_timeout(&self) -> Result<u32> {
        let out = self.xfconf_get(PROP_INACTIVITY_ON_BATTERY)?;
        out.parse()
            .with_context(|| format!("Unparseable inactivity timeout: {out}"))
    }

    fn set_inactivity_timeout(&self, minutes: u32) -> Result<()> {
        self.xfconf_set(PROP_INACTIVITY_ON_BATTERY, &minutes.to_string())
    }

    fn set_display_dpms_enabled(&self, enabled: bool) -> Result<()> {
        self.xfconf_set(PROP_DPMS_ENABLED, if enabled { "true" } else { "false" })
    }

    fn set_blank_on_battery(&self, seconds: u32) -> Result<()> {
        self.xfconf_set(PROP_BLANK_ON_BATTERY, &seconds.to_string())
    }

    fn set_dpms_sleep_on_battery(&self, seconds: u32) -> Result<()> {
        self.xfconf_set(PROP_DPMS_SLEEP_ON_BATTERY, &seconds.to_string())
    }

    fn set_dpms_off_on_battery(&self, seconds: u32) -> Result<()> {
        self.xfconf_set(PROP_DPMS_OFF_ON_BATTERY, &seconds.to_string())
    }

    fn set_brightness_on_battery(&self, enabled: bool) -> Result<()> {
        self.xfconf_set(
            PROP_BRIGHTNESS_ON_BATTERY,
            if enabled { "true" } else { "false" },
        )
    }

    fn set_brightness_level_on_battery(&self, percent: u32) -> Result<()> {
        self.xfconf_set(PROP_BRIGHTNESS_LEVEL_ON_BATTERY, &percent.to_string())
    }

    fn pointer_nudge(&self) -> Result<()> {
        run_command("xdotool", &["mousemove_relative", "--", "1", "0"])?;
        thread::sleep(Duration::from_millis(8));
        run_command("xdotool", &["mousemove_relative", "--", "-1", "0"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_times_parse_from_proc_stat() {
        // Only meaningful on Linux, which is the only supported host anyway.
        let times = XfceHost::read_cpu_times().unwrap();
        assert!(times.total >= times.busy);
        assert!(times.total > 0);
    }

    #[test]
    fn first_cpu_probe_reports_zero() {
        let host = XfceHost::new();
        assert_eq!(host.cpu_usage_percent().unwrap(), 0.0);
    }
}
