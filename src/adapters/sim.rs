//! Simulated smoker for running without a Raspberry Pi.
//!
//! A first-order thermal plant: the cabinet heats in proportion to valve
//! opening while the burner is lit and loses heat to ambient.  The burner
//! lights itself a few seconds after the valve opens (standing in for the
//! operator with a lighter) and goes out when the valve closes.
//!
//! The plant is exposed through the same ports as the hardware: a
//! TLC1543-compatible [`SpiDevice`] that reproduces the one-command
//! pipeline lag, and a [`ServoOutput`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};
use log::info;

use crate::app::ports::ServoOutput;
use crate::error::TransportError;
use crate::pins::{CABINET_CHANNEL, FLAME_CHANNEL, N_ADC_CHANNELS, N_PROBE_CHANNELS};
use crate::sensors::thermistor::calibration_for;
use crate::sensors::tlc1543::decode_result;

const AMBIENT_F: f32 = 70.0;
const BURNER_F: f32 = 700.0;
/// Cabinet heating at full valve (°F/s).
const HEAT_RATE: f32 = 1.5;
/// Cabinet loss coefficient (1/s).
const LOSS_RATE: f32 = 0.004;
/// Flame sensor time constant (s).
const FLAME_TAU: f32 = 5.0;
/// Meat probe follows the cabinet with this time constant (s).
const MEAT_TAU: f32 = 600.0;
const IGNITION_DELAY_S: f32 = 3.0;
const VALVE_CLOSED: u32 = 600;
const VALVE_OPEN: u32 = 1200;
/// Below this the burner cannot stay lit.
const VALVE_MIN_FLAME: u32 = 610;

#[derive(Debug, Clone)]
pub struct Plant {
    pub cabinet_f: f32,
    pub meat_f: f32,
    pub flame_f: f32,
    pub lit: bool,
    /// Physical valve position; servo pulses of 0 leave it where it is.
    pub valve: u32,
    ignition_timer: f32,
    last_update: Option<Instant>,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            cabinet_f: AMBIENT_F,
            meat_f: AMBIENT_F,
            flame_f: AMBIENT_F,
            lit: false,
            valve: VALVE_CLOSED,
            ignition_timer: 0.0,
            last_update: None,
        }
    }
}

impl Plant {
    /// Fraction of full gas flow.
    pub fn opening(&self) -> f32 {
        (self.valve.saturating_sub(VALVE_CLOSED)) as f32 / (VALVE_OPEN - VALVE_CLOSED) as f32
    }

    /// Advance the model by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if self.valve < VALVE_MIN_FLAME {
            if self.lit {
                info!("SIM | burner out");
            }
            self.lit = false;
            self.ignition_timer = 0.0;
        } else if !self.lit {
            self.ignition_timer += dt;
            if self.ignition_timer >= IGNITION_DELAY_S {
                info!("SIM | burner lit");
                self.lit = true;
            }
        }

        let heat = if self.lit { HEAT_RATE * self.opening() } else { 0.0 };
        self.cabinet_f += (heat - LOSS_RATE * (self.cabinet_f - AMBIENT_F)) * dt;

        let flame_target = if self.lit { BURNER_F } else { AMBIENT_F };
        self.flame_f += (flame_target - self.flame_f) * (dt / FLAME_TAU).min(1.0);
        self.meat_f += (self.cabinet_f - self.meat_f) * (dt / MEAT_TAU).min(1.0);
    }

    /// Advance to wall-clock `now`.
    pub fn advance_to(&mut self, now: Instant) {
        if let Some(prev) = self.last_update {
            let dt = now.duration_since(prev).as_secs_f32();
            if dt > 0.0 {
                self.step(dt);
            }
        }
        self.last_update = Some(now);
    }

    /// What the ADC would read on `channel` right now.
    pub fn adc_code(&self, channel: usize) -> u16 {
        match channel {
            CABINET_CHANNEL => probe_code(channel, self.cabinet_f),
            1 => probe_code(channel, self.meat_f),
            FLAME_CHANNEL => flame_code(self.flame_f),
            ch if ch < N_PROBE_CHANNELS => probe_code(ch, AMBIENT_F),
            _ => 0,
        }
    }
}

/// Inverse of the probe calibration: the code whose reading is nearest `f`.
pub fn probe_code(channel: usize, f: f32) -> u16 {
    let cal = calibration_for(channel);
    // Calibrations fall monotonically over the usable code range.
    let (mut lo, mut hi) = (60u16, 1000u16);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if cal.fahrenheit(mid) > f {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Inverse of the thermocouple law.
pub fn flame_code(f: f32) -> u16 {
    let volts = (f - 32.0) * 5.0 / 9.0 * 0.005 + 1.25;
    (volts / 3.3 * 1023.0).round().clamp(0.0, 1023.0) as u16
}

pub type SharedPlant = Arc<Mutex<Plant>>;

fn lock(plant: &SharedPlant) -> std::sync::MutexGuard<'_, Plant> {
    plant.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated smoker: hand out the ADC and servo ends.
#[derive(Clone, Default)]
pub struct SimulatedSmoker {
    plant: SharedPlant,
}

impl SimulatedSmoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adc(&self) -> SimAdc {
        SimAdc {
            plant: Arc::clone(&self.plant),
            pending: None,
        }
    }

    pub fn servo(&self) -> SimServo {
        SimServo {
            plant: Arc::clone(&self.plant),
        }
    }

    pub fn plant(&self) -> Plant {
        lock(&self.plant).clone()
    }

    pub fn with_plant<R>(&self, f: impl FnOnce(&mut Plant) -> R) -> R {
        f(&mut lock(&self.plant))
    }
}

/// Pipelined TLC1543 stand-in.
pub struct SimAdc {
    plant: SharedPlant,
    /// Channel commanded by the previous transfer.
    pending: Option<usize>,
}

impl ErrorType for SimAdc {
    type Error = TransportError;
}

impl SpiDevice for SimAdc {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), TransportError> {
        for op in operations {
            if let Operation::TransferInPlace(buf) = op {
                if buf.len() != 2 {
                    return Err(TransportError::ShortResponse);
                }
                let commanded = usize::from(buf[0] >> 4);
                let code = {
                    let mut plant = lock(&self.plant);
                    plant.advance_to(Instant::now());
                    self.pending.map_or(0, |ch| plant.adc_code(ch))
                };
                buf.copy_from_slice(&(code << 6).to_be_bytes());
                debug_assert_eq!(decode_result([buf[0], buf[1]]), code);
                self.pending = (commanded < N_ADC_CHANNELS).then_some(commanded);
            }
        }
        Ok(())
    }
}

/// Servo stand-in: a non-zero pulse moves the valve.
pub struct SimServo {
    plant: SharedPlant,
}

impl ServoOutput for SimServo {
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), TransportError> {
        if pulse_us != 0 {
            let mut plant = lock(&self.plant);
            plant.advance_to(Instant::now());
            plant.valve = pulse_us.clamp(VALVE_CLOSED, VALVE_OPEN);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::thermocouple;
    use crate::sensors::tlc1543::Tlc1543;

    #[test]
    fn probe_code_inverts_calibration() {
        for f in [90.0, 150.0, 225.0, 270.0] {
            let code = probe_code(0, f);
            let back = calibration_for(0).fahrenheit(code);
            assert!((back - f).abs() < 1.0, "{f} -> {code} -> {back}");
        }
    }

    #[test]
    fn flame_code_inverts_thermocouple() {
        for f in [70.0, 250.0, 700.0] {
            let back = thermocouple::fahrenheit(flame_code(f));
            assert!((back - f).abs() < 3.0, "{f} -> {back}");
        }
    }

    #[test]
    fn lit_burner_heats_cabinet() {
        let mut p = Plant {
            valve: VALVE_OPEN,
            ..Plant::default()
        };
        for _ in 0..600 {
            p.step(1.0);
        }
        assert!(p.lit);
        assert!(p.cabinet_f > 250.0);
        assert!(p.flame_f > 600.0);
    }

    #[test]
    fn closed_valve_puts_burner_out() {
        let mut p = Plant {
            valve: VALVE_OPEN,
            ..Plant::default()
        };
        p.step(5.0);
        assert!(p.lit);
        p.valve = VALVE_CLOSED;
        p.step(0.1);
        assert!(!p.lit);
    }

    #[test]
    fn sim_adc_scans_like_hardware() {
        let smoker = SimulatedSmoker::new();
        smoker.with_plant(|p| p.cabinet_f = 225.0);
        let mut adc = Tlc1543::new(smoker.adc());
        let samples = adc.scan().unwrap();
        let plant = smoker.plant();
        for (ch, code) in samples.iter().enumerate() {
            // Allow for a tiny drift between the transfer and now.
            assert!(code.abs_diff(plant.adc_code(ch)) <= 1, "channel {ch}");
        }
    }

    #[test]
    fn zero_pulse_leaves_valve() {
        let smoker = SimulatedSmoker::new();
        let mut servo = smoker.servo();
        servo.set_pulse_width(900).unwrap();
        servo.set_pulse_width(0).unwrap();
        assert_eq!(smoker.plant().valve, 900);
    }
}
