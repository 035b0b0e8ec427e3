//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to: the latest flame reading, the debounce counter, thresholds
//! taken from configuration, and an outbox of notifications that the
//! monitor delivers after the tick.  Handlers never perform I/O.

use heapless::Vec;
use log::warn;

use crate::app::events::Notification;
use crate::config::SystemConfig;

/// Notifications a single tick can produce (exit + enter + repeat).
pub const OUTBOX_CAPACITY: usize = 4;

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,

    // -- Input --
    /// Flame channel temperature (°F), NaN before the first conversion.
    pub flame_temperature: f32,

    // -- Debounce --
    /// Consecutive ticks the current transition condition has held.
    /// Doubles as the repeat timer while the flame is lost.
    pub debounce: u32,
    pub debounce_ticks: u32,
    pub repeat_ticks: u32,

    // -- Thresholds --
    pub detected_f: f32,
    pub lost_f: f32,

    // -- Output --
    pub outbox: Vec<Notification, OUTBOX_CAPACITY>,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            ticks_in_state: 0,
            flame_temperature: f32::NAN,
            debounce: 0,
            debounce_ticks: config.flame_debounce_ticks(),
            repeat_ticks: config.flame_repeat_ticks(),
            detected_f: config.flame_detected_f,
            lost_f: config.flame_lost_f,
            outbox: Vec::new(),
        }
    }

    /// Queue a notification for delivery after the tick.
    pub fn post(&mut self, notification: Notification) {
        if self.outbox.push(notification).is_err() {
            warn!("FSM outbox full, dropping: {notification}");
        }
    }

    pub fn flame_present(&self) -> bool {
        self.flame_temperature > self.detected_f
    }

    /// NaN counts as "no flame".
    pub fn flame_absent(&self) -> bool {
        self.flame_temperature.is_nan() || self.flame_temperature < self.lost_f
    }
}
