//! Shared control state and its accessor surface.
//!
//! One [`ControlState`] lives behind a single `Mutex`.  Every periodic task
//! holds a cloned [`SharedControl`] handle and touches the state only for
//! short snapshot-in / publish-out copies; no I/O happens under the lock.
//! A `Condvar` paired with the same mutex signals fresh ADC sample sets.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitflags::bitflags;
use heapless::String;
use log::{debug, info};

use crate::adapters::utils::is_printable_ascii;
use crate::config::SystemConfig;
use crate::control::pid::{PidGains, is_valid_gain};
use crate::error::ValidationError;
use crate::fsm::StateId;
use crate::pins::{N_ADC_CHANNELS, N_PROBE_CHANNELS};

/// Maximum channel name length in bytes.
pub const CHANNEL_NAME_LEN: usize = 64;

pub type ChannelName = String<CHANNEL_NAME_LEN>;

bitflags! {
    /// Optional diagnostic output.  Read by reporting code only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DebugFlags: u8 {
        /// Log every raw ADC sample set.
        const ADC = 1 << 0;
        /// Log each PID update.
        const PID = 1 << 1;
        /// Log servo commands as they are sent.
        const SERVO = 1 << 2;
        /// Log the flame temperature on every monitor tick.
        const MONITOR = 1 << 3;
    }
}

impl DebugFlags {
    /// Look a flag up by its (case-insensitive) name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::all()
            .iter_names()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, flag)| flag)
    }
}

// ---------------------------------------------------------------------------
// The state itself
// ---------------------------------------------------------------------------

/// Everything the periodic tasks exchange.  Fixed-size, `Clone` for snapshots.
#[derive(Debug, Clone)]
pub struct ControlState {
    /// Latest ADC codes, one per analog input.
    pub raw_samples: [u16; N_ADC_CHANNELS],
    /// Incremented on every published sample set.
    pub sample_seq: u64,
    /// Conditioned probe temperatures (°F), NaN until first conversion.
    pub channel_temperatures: [f32; N_PROBE_CHANNELS],
    /// Filtered flame channel temperature (°F).
    pub flame_temperature: f32,
    /// Cabinet setpoint (°F).
    pub setpoint: f32,
    /// Last position handed to the servo driver.
    pub actuator_position: i32,
    /// Manual override replacing the PID position while set.
    pub forced_position: Option<i32>,
    pub flame_state: StateId,
    /// Operator asked to light the burner; consumed by the flame monitor.
    pub light_request: bool,
    /// Requested PID gains, always positive.
    pub gains: PidGains,
    pub pid_output: f32,
    pub pid_integral: f32,
    pub debug_flags: DebugFlags,
    pub channel_names: [ChannelName; N_PROBE_CHANNELS],
}

impl ControlState {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            raw_samples: [0; N_ADC_CHANNELS],
            sample_seq: 0,
            channel_temperatures: [f32::NAN; N_PROBE_CHANNELS],
            flame_temperature: f32::NAN,
            setpoint: config.initial_setpoint_f,
            actuator_position: 0,
            forced_position: None,
            flame_state: StateId::WaitingForFlame,
            light_request: false,
            gains: PidGains {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
                windup_guard: config.windup_guard,
            },
            pid_output: 0.0,
            pid_integral: 0.0,
            debug_flags: DebugFlags::empty(),
            channel_names: core::array::from_fn(default_channel_name),
        }
    }
}

fn default_channel_name(channel: usize) -> ChannelName {
    let mut name = ChannelName::new();
    // "Probe 9" always fits
    let _ = core::fmt::write(&mut name, format_args!("Probe {channel}"));
    name
}

/// Results of one orchestrator tick, published back in a single critical section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutputs {
    pub flame_temperature: f32,
    pub actuator_position: i32,
    pub pid_output: f32,
    pub pid_integral: f32,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct Inner {
    state: Mutex<ControlState>,
    fresh_samples: Condvar,
    setpoint_min: f32,
    setpoint_max: f32,
}

/// Cloneable handle to the process-wide control state.
#[derive(Clone)]
pub struct SharedControl {
    inner: Arc<Inner>,
}

impl SharedControl {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ControlState::new(config)),
                fresh_samples: Condvar::new(),
                setpoint_min: config.setpoint_min_f,
                setpoint_max: config.setpoint_max_f,
            }),
        }
    }

    /// Lock the state.  A panicked holder cannot leave a torn copy behind
    /// (all writers assign whole fields), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the whole state in one critical section.
    pub fn snapshot(&self) -> ControlState {
        self.lock().clone()
    }

    // ── Acquisition side ──────────────────────────────────────

    /// Publish a complete sample set and wake waiting consumers.
    pub fn publish_samples(&self, raw: [u16; N_ADC_CHANNELS]) -> u64 {
        let seq = {
            let mut s = self.lock();
            s.raw_samples = raw;
            s.sample_seq = s.sample_seq.wrapping_add(1);
            s.sample_seq
        };
        self.inner.fresh_samples.notify_all();
        seq
    }

    /// Block until a sample set newer than `last_seq` is available or the
    /// timeout expires.  Returns the newest set and its sequence number.
    pub fn wait_for_samples(
        &self,
        last_seq: u64,
        timeout: Duration,
    ) -> Option<([u16; N_ADC_CHANNELS], u64)> {
        let guard = self.lock();
        let (guard, _) = self
            .inner
            .fresh_samples
            .wait_timeout_while(guard, timeout, |s| s.sample_seq == last_seq)
            .unwrap_or_else(PoisonError::into_inner);
        (guard.sample_seq != last_seq).then_some((guard.raw_samples, guard.sample_seq))
    }

    // ── Conditioner / orchestrator / monitor side ─────────────

    pub fn publish_temperatures(&self, temps: [f32; N_PROBE_CHANNELS]) {
        self.lock().channel_temperatures = temps;
    }

    pub fn publish_control(&self, out: ControlOutputs) {
        let mut s = self.lock();
        s.flame_temperature = out.flame_temperature;
        s.actuator_position = out.actuator_position;
        s.pid_output = out.pid_output;
        s.pid_integral = out.pid_integral;
    }

    pub fn publish_flame_state(&self, state: StateId) {
        self.lock().flame_state = state;
    }

    /// Consume a pending light request.
    pub fn take_light_request(&self) -> bool {
        core::mem::take(&mut self.lock().light_request)
    }

    // ── Accessor surface for command collaborators ────────────

    /// Accept a setpoint inside the configured range; always returns the
    /// setpoint now in effect.
    pub fn set_setpoint(&self, degrees: f32) -> f32 {
        let mut s = self.lock();
        if (self.inner.setpoint_min..=self.inner.setpoint_max).contains(&degrees) {
            s.setpoint = degrees;
        } else {
            debug!("{}: {degrees}", ValidationError::SetpointOutOfRange);
        }
        s.setpoint
    }

    pub fn get_setpoint(&self) -> f32 {
        self.lock().setpoint
    }

    pub fn get_channel_temperatures(&self) -> [f32; N_PROBE_CHANNELS] {
        self.lock().channel_temperatures
    }

    pub fn get_flame_temperature(&self) -> f32 {
        self.lock().flame_temperature
    }

    pub fn get_actuator_position(&self) -> i32 {
        self.lock().actuator_position
    }

    pub fn get_flame_state(&self) -> StateId {
        self.lock().flame_state
    }

    /// Each value is validated on its own; invalid ones keep the old gain.
    pub fn set_gains(&self, kp: f32, ki: f32, kd: f32, windup_guard: f32) -> PidGains {
        let mut s = self.lock();
        let g = &mut s.gains;
        for (slot, value) in [
            (&mut g.kp, kp),
            (&mut g.ki, ki),
            (&mut g.kd, kd),
            (&mut g.windup_guard, windup_guard),
        ] {
            if is_valid_gain(value) {
                *slot = value;
            } else {
                debug!("{}: {value}", ValidationError::NonPositiveGain);
            }
        }
        s.gains
    }

    pub fn gains(&self) -> PidGains {
        self.lock().gains
    }

    /// Hold the valve at `position` while the flame state allows it.
    /// The servo driver clamps to the physical range; negative widths are
    /// rejected outright.
    pub fn force_actuator_position(&self, position: i32) -> Result<(), ValidationError> {
        if position < 0 {
            return Err(ValidationError::BadPosition);
        }
        info!("Servo forced to {position}");
        self.lock().forced_position = Some(position);
        Ok(())
    }

    pub fn clear_forced_position(&self) {
        info!("Servo returned to automatic control");
        self.lock().forced_position = None;
    }

    pub fn forced_position(&self) -> Option<i32> {
        self.lock().forced_position
    }

    /// Ask the flame monitor to return to `WaitingForFlame`.
    pub fn light_flame(&self) {
        self.lock().light_request = true;
    }

    pub fn set_channel_name(&self, channel: usize, name: &str) -> Result<(), ValidationError> {
        if channel >= N_PROBE_CHANNELS {
            return Err(ValidationError::NoSuchChannel);
        }
        if !is_printable_ascii(name) {
            return Err(ValidationError::BadChannelName);
        }
        let name = ChannelName::try_from(name).map_err(|_| ValidationError::BadChannelName)?;
        self.lock().channel_names[channel] = name;
        Ok(())
    }

    pub fn get_channel_name(&self, channel: usize) -> Option<ChannelName> {
        self.lock().channel_names.get(channel).cloned()
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.lock().debug_flags
    }

    /// Flip `flag` and return the resulting set.
    pub fn toggle_debug_flag(&self, flag: DebugFlags) -> DebugFlags {
        let mut s = self.lock();
        s.debug_flags.toggle(flag);
        s.debug_flags
    }
}
