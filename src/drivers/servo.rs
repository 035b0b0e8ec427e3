//! Needle-valve servo driver with drive-enable safety timing.
//!
//! The servo is only powered while it is expected to be moving:
//!
//! - Every request is clamped to the physical travel range.
//! - While the position is *unknown* (startup, or the periodic re-arm) the
//!   drive-enable timer is set to the full safety window.
//! - While the position is known, a change extends the timer by the travel
//!   distance times a per-count allowance, capped at the safety window.
//! - Otherwise the timer runs down by one tick per call; at zero the pulse
//!   output is de-asserted (`0`).
//! - Every re-arm period the position is forced back to unknown so the
//!   commanded position is periodically re-asserted.
//!
//! Hardware writes happen only when the output changes or the previous
//! write failed.

use log::{debug, error, info};

use crate::app::ports::ServoOutput;
use crate::config::SystemConfig;

/// Timing and travel parameters, all times in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoTiming {
    pub physical_min: i32,
    pub physical_max: i32,
    pub safety_window_us: u32,
    pub us_per_count: u32,
    pub rearm_period_us: u32,
    pub tick_us: u32,
}

impl ServoTiming {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            physical_min: config.servo_physical_min,
            physical_max: config.servo_physical_max,
            safety_window_us: config.servo_safety_window_ms.saturating_mul(1000),
            us_per_count: config.servo_us_per_count,
            rearm_period_us: config.servo_rearm_secs.saturating_mul(1_000_000),
            tick_us: config.control_tick_ms.saturating_mul(1000),
        }
    }
}

pub struct ServoDriver<O> {
    output: O,
    timing: ServoTiming,
    last_position: i32,
    position_known: bool,
    enable_timer_us: u32,
    rearm_timer_us: u32,
    /// Pulse width last accepted by the hardware; `None` forces a resend.
    last_sent: Option<u32>,
    link_up: bool,
    verbose: bool,
}

impl<O: ServoOutput> ServoDriver<O> {
    pub fn new(output: O, timing: ServoTiming) -> Self {
        Self {
            output,
            timing,
            last_position: 0,
            position_known: false,
            enable_timer_us: 0,
            rearm_timer_us: 0,
            last_sent: None,
            link_up: true,
            verbose: false,
        }
    }

    pub fn clamp(&self, position: i32) -> i32 {
        position.clamp(self.timing.physical_min, self.timing.physical_max)
    }

    /// One control tick: update the safety timers for `requested` and send
    /// the resulting pulse width.  Returns the pulse width commanded
    /// (`0` when de-asserted).
    pub fn drive(&mut self, requested: i32) -> u32 {
        let position = self.clamp(requested);

        self.rearm_timer_us = self.rearm_timer_us.saturating_add(self.timing.tick_us);
        if self.rearm_timer_us >= self.timing.rearm_period_us {
            self.rearm_timer_us = 0;
            self.position_known = false;
        }

        if !self.position_known {
            self.enable_timer_us = self.timing.safety_window_us;
            self.position_known = true;
        } else if position != self.last_position {
            let travel = position.abs_diff(self.last_position);
            let extra = travel.saturating_mul(self.timing.us_per_count);
            self.enable_timer_us = self
                .enable_timer_us
                .saturating_add(extra)
                .min(self.timing.safety_window_us);
        } else {
            self.enable_timer_us = self.enable_timer_us.saturating_sub(self.timing.tick_us);
        }
        self.last_position = position;

        let pulse = if self.enable_timer_us > 0 {
            position as u32
        } else {
            0
        };
        self.send(pulse);
        pulse
    }

    /// De-assert the output (shutdown).  The next `drive` re-arms.
    pub fn release(&mut self) {
        self.position_known = false;
        self.enable_timer_us = 0;
        self.send(0);
    }

    /// Log every hardware write at `info` level.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn enable_timer_us(&self) -> u32 {
        self.enable_timer_us
    }

    pub fn position_known(&self) -> bool {
        self.position_known
    }

    pub fn last_position(&self) -> i32 {
        self.last_position
    }

    /// `false` from the first failed write until one succeeds again.
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    fn send(&mut self, pulse: u32) {
        if self.last_sent == Some(pulse) {
            return;
        }
        match self.output.set_pulse_width(pulse) {
            Ok(()) => {
                if self.verbose {
                    info!("Servo pulse {pulse}us");
                } else {
                    debug!("Servo pulse {pulse}us");
                }
                if !self.link_up {
                    info!("Servo link restored");
                    self.link_up = true;
                }
                self.last_sent = Some(pulse);
            }
            Err(e) => {
                if self.link_up {
                    error!("Servo command {pulse}us failed: {e}; retrying every tick");
                    self.link_up = false;
                }
                self.last_sent = None;
            }
        }
    }
}
