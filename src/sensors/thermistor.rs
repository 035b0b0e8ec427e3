//! Thermistor probe calibration.
//!
//! Each probe family is characterised by a fifth-order polynomial mapping the
//! raw 10-bit ADC code straight to °F.  Coefficients are stored highest order
//! first and evaluated with Horner's method in `f64`.

use crate::pins::N_PROBE_CHANNELS;

/// Polynomial order of every probe calibration.
pub const ORDER: usize = 5;

/// Calibration for one family of thermistor probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub name: &'static str,
    coefficients: [f64; ORDER + 1],
}

/// Probes on channels 0 and 1 (cabinet and meat probe).
pub const TAYLOR: Calibration = Calibration {
    name: "Taylor",
    coefficients: [
        -2.597_999_331_435_03e-12,
        6.617_601_772_858_94e-9,
        -6.861_679_837_533_89e-6,
        0.003_680_897_223_327_18,
        -1.230_093_844_194_63,
        371.041_602_633_187,
    ],
};

/// All remaining probe channels.
pub const CDDT: Calibration = Calibration {
    name: "CDDT",
    coefficients: [
        -1.071_415_803_872_66e-11,
        3.713_462_629_932_03e-8,
        -5.184_674_105_394_53e-5,
        0.036_300_825_634_745_8,
        -12.976_570_645_261_5,
        2_160.074_990_942_98,
    ],
};

impl Calibration {
    /// Convert a raw ADC code to °F.
    pub fn fahrenheit(&self, code: u16) -> f32 {
        let x = f64::from(code);
        self.coefficients
            .iter()
            .fold(0.0_f64, |acc, &c| acc.mul_add(x, c)) as f32
    }
}

/// Calibration used for a probe channel.  Out-of-range indices fall back to
/// the generic family.
pub fn calibration_for(channel: usize) -> &'static Calibration {
    debug_assert!(channel < N_PROBE_CHANNELS);
    match channel {
        0 | 1 => &TAYLOR,
        _ => &CDDT,
    }
}
