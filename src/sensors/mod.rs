//! Sensor subsystem: the TLC1543 acquisition driver and signal conditioning.
//!
//! The [`SignalConditioner`] owns one smoothing filter per thermistor probe
//! and turns each fresh raw sample set into °F.  The flame thermocouple is
//! converted separately by the control loop (see [`thermocouple`]).

pub mod thermistor;
pub mod thermocouple;
pub mod tlc1543;

use std::time::Duration;

use log::trace;

use crate::pins::{N_ADC_CHANNELS, N_PROBE_CHANNELS};
use crate::state::{DebugFlags, SharedControl};

/// Weight of the previous value in the probe filters.
pub const PROBE_FILTER_WEIGHT: f32 = 0.9;

// ---------------------------------------------------------------------------
// Single-pole exponential filter
// ---------------------------------------------------------------------------

/// `filtered = filtered * weight + new * (1 - weight)`, seeded by the first
/// sample.
#[derive(Debug, Clone, Copy)]
pub struct ExpFilter {
    weight: f32,
    value: Option<f32>,
}

impl ExpFilter {
    pub fn new(weight: f32) -> Self {
        Self {
            weight: weight.clamp(0.0, 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        let next = match self.value {
            Some(prev) => prev * self.weight + sample * (1.0 - self.weight),
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// NaN until the first sample.
    pub fn value(&self) -> f32 {
        self.value.unwrap_or(f32::NAN)
    }
}

// ---------------------------------------------------------------------------
// Signal conditioner
// ---------------------------------------------------------------------------

/// Converts raw probe codes into smoothed °F.
pub struct SignalConditioner {
    filters: [ExpFilter; N_PROBE_CHANNELS],
    last_seq: u64,
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalConditioner {
    pub fn new() -> Self {
        Self {
            filters: [ExpFilter::new(PROBE_FILTER_WEIGHT); N_PROBE_CHANNELS],
            last_seq: 0,
        }
    }

    /// Unfiltered calibrated temperature of a probe channel.
    pub fn convert(raw_code: u16, channel: usize) -> f32 {
        thermistor::calibration_for(channel).fahrenheit(raw_code)
    }

    /// Fold one sample set into the filters and return every probe's °F.
    pub fn condition(&mut self, raw: &[u16; N_ADC_CHANNELS]) -> [f32; N_PROBE_CHANNELS] {
        core::array::from_fn(|ch| self.filters[ch].update(Self::convert(raw[ch], ch)))
    }

    /// Wait up to `timeout` for a fresh sample set; when one arrives,
    /// condition it and publish the temperatures.  Returns `true` if a set
    /// was processed.
    pub fn service(&mut self, shared: &SharedControl, timeout: Duration) -> bool {
        let Some((raw, seq)) = shared.wait_for_samples(self.last_seq, timeout) else {
            return false;
        };
        self.last_seq = seq;
        let temps = self.condition(&raw);
        shared.publish_temperatures(temps);
        if shared.debug_flags().contains(DebugFlags::ADC) {
            trace!("ADC {raw:?} -> {temps:.1?}");
        }
        true
    }
}
