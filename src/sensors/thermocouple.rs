//! Flame thermocouple behind an AD8495-style amplifier.
//!
//! The amplifier outputs 1.25 V at 0 °C with 5 mV/°C, sampled by the same
//! 10-bit ADC as the probes (3.3 V reference).  The reading is noisy and
//! only needs to resolve "burner lit or not", so it is heavily filtered.

use super::ExpFilter;

const ADC_FULL_SCALE: f32 = 1023.0;
const V_REF: f32 = 3.3;
const V_OFFSET: f32 = 1.25;
const V_PER_DEG_C: f32 = 0.005;

/// Weight of the previous value in the flame filter.
pub const FLAME_FILTER_WEIGHT: f32 = 0.99;

/// Convert a raw ADC code to °F.
pub fn fahrenheit(code: u16) -> f32 {
    let volts = f32::from(code) / ADC_FULL_SCALE * V_REF;
    let celsius = (volts - V_OFFSET) / V_PER_DEG_C;
    celsius * 9.0 / 5.0 + 32.0
}

/// Filtered flame temperature.
#[derive(Debug, Clone)]
pub struct Thermocouple {
    filter: ExpFilter,
}

impl Default for Thermocouple {
    fn default() -> Self {
        Self::new()
    }
}

impl Thermocouple {
    pub fn new() -> Self {
        Self {
            filter: ExpFilter::new(FLAME_FILTER_WEIGHT),
        }
    }

    /// Fold one raw sample into the filter and return the smoothed °F.
    pub fn update(&mut self, code: u16) -> f32 {
        self.filter.update(fahrenheit(code))
    }

    /// NaN until the first sample.
    pub fn value(&self) -> f32 {
        self.filter.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplifier_offset_is_freezing() {
        // 1.25 V ≈ code 387.5
        let t = fahrenheit(388);
        assert!((t - 32.58).abs() < 0.05, "got {t}");
    }

    #[test]
    fn reference_codes() {
        assert!((fahrenheit(500) - 162.65).abs() < 0.05);
        assert!((fahrenheit(700) - 394.90).abs() < 0.05);
        assert!((fahrenheit(1023) - 770.0).abs() < 0.05);
    }

    #[test]
    fn first_sample_seeds_filter() {
        let mut tc = Thermocouple::new();
        assert!(tc.value().is_nan());
        let t = tc.update(700);
        assert!((t - fahrenheit(700)).abs() < 1e-3);
    }

    #[test]
    fn heavy_filter_moves_slowly() {
        let mut tc = Thermocouple::new();
        tc.update(400);
        let cold = tc.value();
        let after = tc.update(700);
        let step = fahrenheit(700) - cold;
        assert!((after - (cold + step * 0.01)).abs() < 1e-2);
    }
}
