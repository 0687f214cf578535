//! Scripted in-memory host for unit tests.
//!
//! Probe values are set per test and can be flipped to failures; every
//! successful mutation is recorded so tests can assert exactly which
//! power-manager commands were issued, and how many times.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};

use super::{Host, NetCounters, PowerSource};

type Scripted<T> = Result<T, String>;

#[derive(Debug)]
struct Inner {
    power: Scripted<PowerSource>,
    audio_stream: Scripted<bool>,
    volume: Scripted<u8>,
    cpu: Scripted<f64>,
    net_counters: VecDeque<NetCounters>,
    idle: Scripted<f64>,
    lock: Scripted<bool>,
    inactivity_timeout: u32,
    fail_mutations: bool,
    calls: Vec<String>,
}

/// Cloning shares the underlying state, so a test can keep a handle while the
/// controller owns another.
#[derive(Clone)]
pub struct MockHost {
    inner: Arc<Mutex<Inner>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                power: Ok(PowerSource::Battery),
                audio_stream: Ok(false),
                volume: Ok(50),
                cpu: Ok(0.0),
                net_counters: VecDeque::new(),
                idle: Ok(0.0),
                lock: Ok(false),
                inactivity_timeout: 2,
                fail_mutations: false,
                calls: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_power(&self, value: Scripted<PowerSource>) {
        self.lock().power = value;
    }

    pub fn set_audio(&self, stream: Scripted<bool>, volume: Scripted<u8>) {
        let mut inner = self.lock();
        inner.audio_stream = stream;
        inner.volume = volume;
    }

    pub fn fail_audio(&self) {
        self.set_audio(
            Err("pactl exited with 1".to_string()),
            Err("pactl exited with 1".to_string()),
        );
    }

    pub fn set_cpu(&self, value: Scripted<f64>) {
        self.lock().cpu = value;
    }

    pub fn fail_cpu(&self) {
        self.set_cpu(Err("cannot read /proc/stat".to_string()));
    }

    /// Queue a counter reading; the last queued reading repeats once the
    /// queue would otherwise run dry.
    pub fn push_net_counters(&self, bytes_received: u64, bytes_sent: u64) {
        self.lock().net_counters.push_back(NetCounters {
            bytes_received,
            bytes_sent,
        });
    }

    pub fn set_idle(&self, value: Scripted<f64>) {
        self.lock().idle = value;
    }

    pub fn set_lock_screen(&self, value: Scripted<bool>) {
        self.lock().lock = value;
    }

    /// Make every mutation fail until cleared; failed mutations are not
    /// recorded in the call log.
    pub fn set_fail_mutations(&self, fail: bool) {
        self.lock().fail_mutations = fail;
    }

    /// Successful mutations, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn nudge_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| *c == "nudge").count()
    }

    fn record(&self, call: String) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_mutations {
            bail!("mutation refused: {call}");
        }
        inner.calls.push(call);
        Ok(())
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

fn scripted<T: Clone>(value: &Scripted<T>) -> Result<T> {
    value.clone().map_err(|msg| anyhow!(msg))
}

impl Host for MockHost {
    fn power_source(&self) -> Result<PowerSource> {
        scripted(&self.lock().power)
    }

    fn audio_stream_active(&self) -> Result<bool> {
        scripted(&self.lock().audio_stream)
    }

    fn system_volume(&self) -> Result<u8> {
        scripted(&self.lock().volume)
    }

    fn cpu_usage_percent(&self) -> Result<f64> {
        scripted(&self.lock().cpu)
    }

    fn network_byte_counters(&self, _interface: &str) -> Result<NetCounters> {
        let mut inner = self.lock();
        if inner.net_counters.len() > 1 {
            Ok(inner.net_counters.pop_front().unwrap())
        } else {
            inner
                .net_counters
                .front()
                .copied()
                .ok_or_else(|| anyhow!("no scripted net counters"))
        }
    }

    fn idle_seconds(&self) -> Result<f64> {
        scripted(&self.lock().idle)
    }

    fn lock_screen_active(&self) -> Result<bool> {
        scripted(&self.lock().lock)
    }

    fn inactivity_timeout(&self) -> Result<u32> {
        Ok(self.lock().inactivity_timeout)
    }

    fn set_inactivity_timeout(&self, minutes: u32) -> Result<()> {
        self.record(format!("set_inactivity_timeout({minutes})"))?;
        self.lock().inactivity_timeout = minutes;
        Ok(())
    }

    fn set_display_dpms_enabled(&self, enabled: bool) -> Result<()> {
        self.record(format!("set_display_dpms_enabled({enabled})"))
    }

    fn set_blank_on_battery(&self, seconds: u32) -> Result<()> {
        self.record(format!("set_blank_on_battery({seconds})"))
    }

    fn set_dpms_sleep_on_battery(&self, seconds: u32) -> Result<()> {
        self.record(format!("set_dpms_sleep_on_battery({seconds})"))
    }

    fn set_dpms_off_on_battery(&self, seconds: u32) -> Result<()> {
        self.record(format!("set_dpms_off_on_battery({seconds})"))
    }

    fn set_brightness_on_battery(&self, enabled: bool) -> Result<()> {
        self.record(format!("set_brightness_on_battery({enabled})"))
    }

    fn set_brightness_level_on_battery(&self, percent: u32) -> Result<()> {
        self.record(format!("set_brightness_level_on_battery({percent})"))
    }

    fn pointer_nudge(&self) -> Result<()> {
        self.record("nudge".to_string())
    }
}
