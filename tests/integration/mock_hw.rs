//! Mock hardware for integration tests.
//!
//! Records every servo pulse and notification so tests can assert on the
//! full history, and scripts the ADC inputs in degrees instead of raw
//! codes.  [`Rig`] wires the real tasks together on one thread with a
//! deterministic 10 ms step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

use smokinpi::adapters::sim::{flame_code, probe_code};
use smokinpi::app::events::Notification;
use smokinpi::app::ports::{NotificationSink, ServoOutput};
use smokinpi::app::service::ControlLoop;
use smokinpi::config::SystemConfig;
use smokinpi::error::TransportError;
use smokinpi::monitor::FlameMonitor;
use smokinpi::pins::{FLAME_CHANNEL, N_ADC_CHANNELS, N_PROBE_CHANNELS};
use smokinpi::sensors::SignalConditioner;
use smokinpi::sensors::tlc1543::AcquisitionDriver;
use smokinpi::state::SharedControl;

// ── Servo recorder ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ServoRecorder {
    pub pulses: Vec<u32>,
}

#[allow(dead_code)]
impl ServoRecorder {
    pub fn last(&self) -> Option<u32> {
        self.pulses.last().copied()
    }
}

impl ServoOutput for ServoRecorder {
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), TransportError> {
        self.pulses.push(pulse_us);
        Ok(())
    }
}

// ── Notification recorder ─────────────────────────────────────

#[derive(Debug, Default)]
pub struct NotificationRecorder {
    pub sent: Vec<Notification>,
}

#[allow(dead_code)]
impl NotificationRecorder {
    pub fn count(&self, n: Notification) -> usize {
        self.sent.iter().filter(|s| **s == n).count()
    }
}

impl NotificationSink for NotificationRecorder {
    fn notify(&mut self, n: &Notification) {
        self.sent.push(*n);
    }
}

// ── Scripted ADC ──────────────────────────────────────────────

/// Handle for steering what the scripted ADC reads.
#[derive(Clone)]
pub struct AdcInputs {
    codes: Arc<Mutex<[u16; N_ADC_CHANNELS]>>,
    link_down: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl AdcInputs {
    pub fn set_probe_f(&self, channel: usize, f: f32) {
        self.codes.lock().unwrap()[channel] = probe_code(channel, f);
    }

    pub fn set_all_probes_f(&self, f: f32) {
        for ch in 0..N_PROBE_CHANNELS {
            self.set_probe_f(ch, f);
        }
    }

    pub fn set_flame_f(&self, f: f32) {
        self.codes.lock().unwrap()[FLAME_CHANNEL] = flame_code(f);
    }

    pub fn set_link_down(&self, down: bool) {
        self.link_down.store(down, Ordering::SeqCst);
    }
}

/// Pipelined TLC1543 fake reading its codes from [`AdcInputs`].
pub struct ScriptedAdc {
    inputs: AdcInputs,
    pending: Option<usize>,
}

impl ScriptedAdc {
    pub fn new() -> (Self, AdcInputs) {
        let inputs = AdcInputs {
            codes: Arc::new(Mutex::new([0; N_ADC_CHANNELS])),
            link_down: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                inputs: inputs.clone(),
                pending: None,
            },
            inputs,
        )
    }
}

impl ErrorType for ScriptedAdc {
    type Error = TransportError;
}

impl SpiDevice for ScriptedAdc {
    fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), TransportError> {
        if self.inputs.link_down.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        for op in ops {
            if let Operation::TransferInPlace(buf) = op {
                let code = self
                    .pending
                    .map_or(0, |ch| self.inputs.codes.lock().unwrap()[ch]);
                let commanded = usize::from(buf[0] >> 4);
                buf.copy_from_slice(&(code << 6).to_be_bytes());
                self.pending = Some(commanded);
            }
        }
        Ok(())
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// All periodic task bodies driven from one thread.
pub struct Rig {
    pub shared: SharedControl,
    pub inputs: AdcInputs,
    pub acquisition: AcquisitionDriver<ScriptedAdc>,
    pub conditioner: SignalConditioner,
    pub control: ControlLoop<ServoRecorder>,
    pub monitor: FlameMonitor,
    pub notes: NotificationRecorder,
    steps: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(&SystemConfig::default())
    }

    pub fn with_config(config: &SystemConfig) -> Self {
        let (adc, inputs) = ScriptedAdc::new();
        inputs.set_all_probes_f(70.0);
        inputs.set_flame_f(70.0);
        let shared = SharedControl::new(config);
        let mut monitor = FlameMonitor::new(config).unwrap();
        let mut notes = NotificationRecorder::default();
        monitor.start(&shared, &mut notes);
        Self {
            shared,
            inputs,
            acquisition: AcquisitionDriver::new(adc),
            conditioner: SignalConditioner::new(),
            control: ControlLoop::new(config, ServoRecorder::default()),
            monitor,
            notes,
            steps: 0,
        }
    }

    /// 10 ms: one acquisition, conditioning, two control ticks, and a
    /// monitor tick every tenth step.
    pub fn step(&mut self) {
        let _ = self.acquisition.cycle(&self.shared);
        self.conditioner.service(&self.shared, Duration::ZERO);
        self.control.tick(&self.shared);
        self.control.tick(&self.shared);
        self.steps += 1;
        if self.steps % 10 == 0 {
            self.monitor.tick(&self.shared, &mut self.notes);
        }
    }

    pub fn run_for(&mut self, d: Duration) {
        let steps = d.as_millis() / 10;
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn position(&self) -> i32 {
        self.shared.get_actuator_position()
    }

    /// Position the PID alone would ask for right now.
    pub fn pid_position(&self) -> i32 {
        self.control.valve().position_for(self.control.pid().output())
    }
}
