//! The two-state agitation controller.
//!
//! Once per main tick (and only while on battery, unless debug forces it) the
//! controller walks the configured inhibitors in priority order and settles on
//! Agitated or Chilled. Host settings are only written on state edges, and a
//! write that fails is retried the next time the same state is entered because
//! the applied-value trackers only advance on success.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::{Config, Inhibitor};
use crate::host::Host;
use crate::sampler::{PowerTransition, SignalSampler};

const MAIN_TICK_INTERVAL: Duration = Duration::from_secs(29);

/// Below this user-activity score a synthetic nudge accompanies the return to
/// Chilled, so the OS idle timers re-evaluate instead of sleeping immediately.
const NUDGE_ACTIVITY_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgitationState {
    /// Process start; the first resolved evaluation applies its settings
    /// unconditionally because there is no meaningful previous state.
    Unknown,
    Agitated,
    Chilled,
}

pub struct Controller<H: Host> {
    host: H,
    sampler: SignalSampler,
    config: Config,
    state: AgitationState,
    last_reason: Option<Inhibitor>,
    applied_timeout: Option<u32>,
    applied_battery_brightness: Option<bool>,
    applied_lockscreen_keep_awake: Option<bool>,
}

impl<H: Host> Controller<H> {
    pub fn new(config: Config, host: H, sampler: SignalSampler) -> Self {
        Self {
            host,
            sampler,
            config,
            state: AgitationState::Unknown,
            last_reason: None,
            applied_timeout: None,
            applied_battery_brightness: None,
            applied_lockscreen_keep_awake: None,
        }
    }

    pub fn state(&self) -> AgitationState {
        self.state
    }

    /// The inhibitor behind the current Agitated state, if any.
    pub fn last_reason(&self) -> Option<Inhibitor> {
        self.last_reason
    }

    /// Log the host's pre-existing inactivity timeout as a startup baseline.
    pub fn log_host_state(&self) {
        match self.host.inactivity_timeout() {
            Ok(minutes) => info!(minutes, "host inactivity timeout at startup"),
            Err(err) => warn!("inactivity timeout read: {err:#}"),
        }
    }

    /// One pass of the control loop, called at 1 Hz.
    ///
    /// Power-source edges and the lock-screen display sub-policy run every
    /// tick; the inhibitor evaluation runs behind its own gate and is inert
    /// while externally powered (unless debug overrides).
    pub fn update(&mut self) {
        let on_ac = match self.sampler.power_supplied(&self.host) {
            Ok(reading) => {
                match reading.transition {
                    Some(PowerTransition::ToAc) => {
                        info!("external power restored");
                        self.reset();
                    }
                    Some(PowerTransition::ToBattery) => {
                        info!("running on battery");
                        self.nudge_if_idle();
                    }
                    None => {}
                }
                Some(reading.on_ac)
            }
            Err(err) => {
                warn!("power source: {err:#}");
                None
            }
        };

        if self.config.display.keep_awake_on_lockscreen {
            self.apply_lockscreen_policy();
        }

        if !self.sampler.main_tick_due(MAIN_TICK_INTERVAL) {
            return;
        }
        // Unreadable power source with no cached value: leave the state
        // machine untouched rather than guess.
        if self.config.debug || on_ac == Some(false) {
            self.evaluate();
        }
    }

    /// Walk the inhibitor rules in strict priority order; the first match
    /// wins and lower-priority signals are not sampled at all.
    fn evaluate(&mut self) {
        if self.config.inhibitor_enabled(Inhibitor::AudioPlayback) {
            match self.sampler.audio_playing(&self.host) {
                Ok(true) => return self.agitate(Inhibitor::AudioPlayback),
                Ok(false) => {}
                Err(err) => {
                    warn!("audio playback: {err:#}");
                    if self.holds_agitation(Inhibitor::AudioPlayback) {
                        return;
                    }
                }
            }
        }

        if self.config.inhibitor_enabled(Inhibitor::CpuUsage) {
            match self.sampler.cpu_usage(&self.host) {
                Ok(usage) if usage >= self.config.cpu_usage_threshold => {
                    return self.agitate(Inhibitor::CpuUsage);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("cpu usage: {err:#}");
                    if self.holds_agitation(Inhibitor::CpuUsage) {
                        return;
                    }
                }
            }
        }

        if self.config.inhibitor_enabled(Inhibitor::NetworkActivity) {
            if let Some(interface) = &self.config.network_interface {
                match self.sampler.network_activity(&self.host, interface) {
                    Ok(kbps) if kbps >= self.config.network_activity_threshold => {
                        return self.agitate(Inhibitor::NetworkActivity);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("network activity: {err:#}");
                        if self.holds_agitation(Inhibitor::NetworkActivity) {
                            return;
                        }
                    }
                }
            }
        }

        self.chill();
    }

    /// An unreadable inhibitor keeps the machine awake when it is the one
    /// that justified the current Agitated state; uncertainty must not put
    /// the machine to sleep under genuine activity.
    fn holds_agitation(&self, inhibitor: Inhibitor) -> bool {
        self.state == AgitationState::Agitated && self.last_reason == Some(inhibitor)
    }

    fn agitate(&mut self, reason: Inhibitor) {
        if self.state != AgitationState::Agitated {
            info!(reason = %reason, "AGITATED");
        }
        self.last_reason = Some(reason);
        self.apply_inactivity_timeout(self.config.sleep_timeout);
        self.apply_battery_brightness(false);
        self.state = AgitationState::Agitated;
    }

    fn chill(&mut self) {
        let entering = self.state != AgitationState::Chilled;
        if self.state == AgitationState::Agitated {
            info!("chilled");
        }
        self.apply_inactivity_timeout(self.config.defaults.sleep_timeout);
        self.apply_battery_brightness(self.config.defaults.brightness_on_battery);
        if entering {
            self.last_reason = None;
            self.nudge_if_idle();
        }
        self.state = AgitationState::Chilled;
    }

    /// Restore every configured default. Invoked on graceful shutdown and the
    /// instant external power returns. Trackers are cleared first so every
    /// setting is force-applied, and each step runs even if an earlier one
    /// fails.
    pub fn reset(&mut self) {
        info!("restoring default power-management settings");
        let d = self.config.defaults.clone();
        self.applied_timeout = None;
        self.applied_battery_brightness = None;
        self.applied_lockscreen_keep_awake = None;

        if log_step(
            self.host.set_inactivity_timeout(d.sleep_timeout),
            "inactivity timeout",
        ) {
            self.applied_timeout = Some(d.sleep_timeout);
        }
        let brightness_ok = log_step(
            self.host.set_brightness_on_battery(d.brightness_on_battery),
            "battery brightness",
        );
        let level_ok = log_step(
            self.host
                .set_brightness_level_on_battery(d.brightness_level_on_battery),
            "battery brightness level",
        );
        if brightness_ok && level_ok {
            self.applied_battery_brightness = Some(d.brightness_on_battery);
        }
        log_step(
            self.host.set_display_dpms_enabled(d.dpms_enabled),
            "dpms enabled",
        );
        log_step(
            self.host.set_blank_on_battery(d.blank_on_battery),
            "blank on battery",
        );
        log_step(
            self.host.set_dpms_sleep_on_battery(d.dpms_sleep_on_battery),
            "dpms sleep on battery",
        );
        log_step(
            self.host.set_dpms_off_on_battery(d.dpms_off_on_battery),
            "dpms off on battery",
        );

        self.state = AgitationState::Chilled;
        self.last_reason = None;
    }

    fn apply_inactivity_timeout(&mut self, minutes: u32) {
        if self.applied_timeout == Some(minutes) {
            return;
        }
        match self.host.set_inactivity_timeout(minutes) {
            Ok(()) => {
                debug!(minutes, "inactivity timeout applied");
                self.applied_timeout = Some(minutes);
            }
            Err(err) => warn!("inactivity timeout: {err:#}"),
        }
    }

    fn apply_battery_brightness(&mut self, enabled: bool) {
        if self.applied_battery_brightness == Some(enabled) {
            return;
        }
        let result = self.host.set_brightness_on_battery(enabled).and_then(|()| {
            if enabled {
                self.host
                    .set_brightness_level_on_battery(self.config.defaults.brightness_level_on_battery)
            } else {
                Ok(())
            }
        });
        match result {
            Ok(()) => {
                debug!(enabled, "battery brightness policy applied");
                self.applied_battery_brightness = Some(enabled);
            }
            Err(err) => warn!("battery brightness: {err:#}"),
        }
    }

    /// Keep the display awake while the lock screen is engaged, restore the
    /// configured blanking behavior once it clears. Edge-triggered on the
    /// last applied value.
    fn apply_lockscreen_policy(&mut self) {
        let locked = match self.sampler.lock_screen_active(&self.host) {
            Ok(locked) => locked,
            Err(err) => {
                warn!("lock screen: {err:#}");
                return;
            }
        };
        if self.applied_lockscreen_keep_awake == Some(locked) {
            return;
        }
        let result = if locked {
            self.host.set_display_dpms_enabled(false)
        } else {
            self.restore_display_defaults()
        };
        match result {
            Ok(()) => {
                info!(keep_awake = locked, "lock-screen display policy applied");
                self.applied_lockscreen_keep_awake = Some(locked);
            }
            Err(err) => warn!("lock-screen display policy: {err:#}"),
        }
    }

    fn restore_display_defaults(&self) -> Result<()> {
        let d = &self.config.defaults;
        self.host.set_display_dpms_enabled(d.dpms_enabled)?;
        self.host.set_blank_on_battery(d.blank_on_battery)?;
        self.host.set_dpms_sleep_on_battery(d.dpms_sleep_on_battery)?;
        self.host.set_dpms_off_on_battery(d.dpms_off_on_battery)?;
        Ok(())
    }

    fn nudge_if_idle(&mut self) {
        let chill_minutes = self.config.defaults.sleep_timeout;
        match self.sampler.user_activity(&self.host, chill_minutes) {
            Ok(score) if score < NUDGE_ACTIVITY_THRESHOLD => {
                debug!(score, "injecting idle nudge");
                if let Err(err) = self.host.pointer_nudge() {
                    warn!("nudge: {err:#}");
                }
            }
            Ok(_) => {}
            Err(err) => warn!("user activity: {err:#}"),
        }
    }
}

fn log_step(result: Result<()>, step: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!("reset: {step}: {err:#}");
            false
        }
    }
}
