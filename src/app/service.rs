//! Control orchestrator: the 5 ms control loop.
//!
//! [`ControlLoop`] owns the PID controller, the flame thermocouple filter
//! and the servo driver.  Each tick it snapshots shared state, runs the PID
//! on its slower sub-cadence, applies the flame-state override, drives the
//! servo and publishes the results.  All I/O goes through the
//! [`ServoOutput`] port, so the loop runs unchanged against mocks.
//!
//! ```text
//!  SharedControl ──snapshot──▶ ┌─────────────────────────┐ ──▶ ServoOutput
//!                              │       ControlLoop       │
//!  SharedControl ◀──publish─── │ PID · flame override    │
//!                              └─────────────────────────┘
//! ```

use log::debug;

use crate::app::ports::ServoOutput;
use crate::config::SystemConfig;
use crate::control::pid::{PidController, PidGains};
use crate::drivers::servo::{ServoDriver, ServoTiming};
use crate::fsm::StateId;
use crate::pins::{CABINET_CHANNEL, FLAME_CHANNEL};
use crate::sensors::thermocouple::Thermocouple;
use crate::state::{ControlOutputs, DebugFlags, SharedControl};

/// Valve travel used by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveRange {
    /// Fully closed; used when the flame is lost.
    pub closed: i32,
    /// Lowest position that keeps the burner lit; PID output zero maps here.
    pub control_min: i32,
    /// Fully open; used while waiting for ignition.
    pub open: i32,
}

impl ValveRange {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            closed: config.servo_physical_min,
            control_min: config.servo_control_min,
            open: config.servo_physical_max,
        }
    }

    /// Map a PID output onto the control range.
    pub fn position_for(&self, output: f32) -> i32 {
        let offset = if output.is_finite() { output.round() as i32 } else { 0 };
        self.control_min
            .saturating_add(offset)
            .clamp(self.control_min, self.open)
    }
}

/// Inputs copied out of shared state at the start of a tick.
#[derive(Debug, Clone, Copy)]
struct TickInputs {
    flame_raw: u16,
    sample_seq: u64,
    cabinet: f32,
    setpoint: f32,
    flame_state: StateId,
    forced: Option<i32>,
    gains: PidGains,
    debug: DebugFlags,
}

pub struct ControlLoop<O> {
    pid: PidController,
    servo: ServoDriver<O>,
    thermocouple: Thermocouple,
    valve: ValveRange,
    pid_every: u64,
    pid_dt: f32,
    ticks: u64,
    last_seq: u64,
    pid_position: i32,
}

impl<O: ServoOutput> ControlLoop<O> {
    pub fn new(config: &SystemConfig, output: O) -> Self {
        let valve = ValveRange::from_config(config);
        Self {
            pid: PidController::new(PidGains {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
                windup_guard: config.windup_guard,
            }),
            servo: ServoDriver::new(output, ServoTiming::from_config(config)),
            thermocouple: Thermocouple::new(),
            valve,
            pid_every: u64::from(config.pid_every_ticks()),
            pid_dt: config.pid_interval_ms as f32 / 1000.0,
            ticks: 0,
            last_seq: 0,
            pid_position: valve.control_min,
        }
    }

    /// Run one control tick.  Returns the final valve position requested.
    pub fn tick(&mut self, shared: &SharedControl) -> i32 {
        let input = {
            let s = shared.lock();
            TickInputs {
                flame_raw: s.raw_samples[FLAME_CHANNEL],
                sample_seq: s.sample_seq,
                cabinet: s.channel_temperatures[CABINET_CHANNEL],
                setpoint: s.setpoint,
                flame_state: s.flame_state,
                forced: s.forced_position,
                gains: s.gains,
                debug: s.debug_flags,
            }
        };
        self.ticks += 1;

        if input.sample_seq != self.last_seq {
            self.last_seq = input.sample_seq;
            self.thermocouple.update(input.flame_raw);
        }

        self.pid.set_gains(input.gains);
        if self.ticks % self.pid_every == 0 && input.cabinet.is_finite() {
            let error = input.setpoint - input.cabinet;
            let output = self.pid.update(error, self.pid_dt);
            self.pid_position = self.valve.position_for(output);
            if input.debug.contains(DebugFlags::PID) {
                debug!(
                    "PID err={error:.2} out={output:.2} int={:.2} pos={}",
                    self.pid.integral(),
                    self.pid_position
                );
            }
        }

        let position = self.select_position(input.flame_state, input.forced);
        self.servo.set_verbose(input.debug.contains(DebugFlags::SERVO));
        self.servo.drive(position);
        let position = self.servo.clamp(position);

        shared.publish_control(ControlOutputs {
            flame_temperature: self.thermocouple.value(),
            actuator_position: position,
            pid_output: self.pid.output(),
            pid_integral: self.pid.integral(),
        });
        position
    }

    /// Flame state overrides the PID (or forced) position.
    fn select_position(&self, flame: StateId, forced: Option<i32>) -> i32 {
        let base = forced.unwrap_or(self.pid_position);
        match flame {
            StateId::FlameDetected => base,
            StateId::WaitingForFlame => forced.unwrap_or(self.valve.open),
            StateId::FlameLost => self.valve.closed,
        }
    }

    /// De-assert the servo before exit.
    pub fn shutdown(&mut self) {
        self.servo.release();
    }

    pub fn servo(&self) -> &ServoDriver<O> {
        &self.servo
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn valve(&self) -> ValveRange {
        self.valve
    }
}
