//! TLC1543 11-channel, 10-bit serial ADC.
//!
//! The converter is pipelined: the transfer that commands channel *i* clocks
//! out the result of the conversion commanded by the *previous* transfer.
//! A scan therefore commands `[1, 2, …, N-1, 0]` and files each result under
//! the previously commanded channel.  The final command (channel 0) leaves
//! the next scan primed.
//!
//! ```text
//!  cmd:    (0) │  1    2    3   …  10    0
//!  result:     │  0    1    2   …   9   10
//! ```
//!
//! Each transfer is two bytes: the channel address in the upper nibble of
//! the first byte out, and a left-justified 10-bit result in.

use embedded_hal::spi::{Operation, SpiDevice};
use log::{error, info};

use crate::error::{Error, TransportError};
use crate::pins::N_ADC_CHANNELS;
use crate::state::SharedControl;

/// Settling time before each transfer.
pub const SETTLE_NS: u32 = 200_000;

/// One raw reading per analog input.
pub type SampleSet = [u16; N_ADC_CHANNELS];

/// Command byte selecting `channel`.
pub fn command_byte(channel: u8) -> u8 {
    channel << 4
}

/// Extract the 10-bit result from the two bytes clocked in.
pub fn decode_result(rx: [u8; 2]) -> u16 {
    u16::from_be_bytes(rx) >> 6
}

/// Low-level driver; owns the SPI device.
pub struct Tlc1543<SPI> {
    spi: SPI,
    /// The converter holds a pending channel-0 conversion.
    primed: bool,
}

impl<SPI> Tlc1543<SPI>
where
    SPI: SpiDevice,
    SPI::Error: Into<TransportError>,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi, primed: false }
    }

    /// Command a channel-0 conversion so the first scan has valid data.
    pub fn prime(&mut self) -> Result<(), TransportError> {
        self.transfer(0)?;
        self.primed = true;
        Ok(())
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Scan every channel once.
    ///
    /// On a transport error the scan is abandoned and the converter is
    /// re-primed before the next one, since its pipeline position is unknown.
    pub fn scan(&mut self) -> Result<SampleSet, TransportError> {
        if !self.primed {
            self.prime()?;
        }

        let mut samples = [0u16; N_ADC_CHANNELS];
        let mut pending = 0usize;
        for step in 1..=N_ADC_CHANNELS {
            let next = step % N_ADC_CHANNELS;
            match self.transfer(next as u8) {
                Ok(value) => samples[pending] = value,
                Err(e) => {
                    self.primed = false;
                    return Err(e);
                }
            }
            pending = next;
        }
        Ok(samples)
    }

    /// Give the SPI device back (used on shutdown).
    pub fn release(self) -> SPI {
        self.spi
    }

    fn transfer(&mut self, channel: u8) -> Result<u16, TransportError> {
        let mut buf = [command_byte(channel), 0];
        if let Err(e) = self.spi.transaction(&mut [
            Operation::DelayNs(SETTLE_NS),
            Operation::TransferInPlace(&mut buf),
        ]) {
            return Err(e.into());
        }
        Ok(decode_result(buf))
    }
}

// ---------------------------------------------------------------------------
// Acquisition task body
// ---------------------------------------------------------------------------

/// Periodic acquisition: scan, then publish the whole set atomically.
///
/// A failed scan leaves the previous set in shared state.  Failures are
/// logged once when the link goes down and once when it recovers.
pub struct AcquisitionDriver<SPI> {
    adc: Tlc1543<SPI>,
    link_up: bool,
}

impl<SPI> AcquisitionDriver<SPI>
where
    SPI: SpiDevice,
    SPI::Error: Into<TransportError>,
{
    pub fn new(spi: SPI) -> Self {
        Self {
            adc: Tlc1543::new(spi),
            link_up: true,
        }
    }

    pub fn cycle(&mut self, shared: &SharedControl) -> Result<SampleSet, Error> {
        match self.adc.scan() {
            Ok(samples) => {
                shared.publish_samples(samples);
                if !self.link_up {
                    info!("ADC link restored");
                    self.link_up = true;
                }
                Ok(samples)
            }
            Err(e) => {
                if self.link_up {
                    error!("ADC scan failed: {e}; keeping previous samples");
                    self.link_up = false;
                }
                Err(e.into())
            }
        }
    }

    pub fn release(self) -> SPI {
        self.adc.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use embedded_hal::spi::ErrorType;

    /// Pipelined fake converter: each transfer answers with the previous
    /// command's channel encoded as `100 + channel`.
    struct FakeAdc {
        pending: Option<u8>,
        commands: Vec<u8>,
        fail_at: Option<usize>,
    }

    impl FakeAdc {
        fn new() -> Self {
            Self {
                pending: None,
                commands: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl ErrorType for FakeAdc {
        type Error = TransportError;
    }

    impl SpiDevice for FakeAdc {
        fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), TransportError> {
            for op in ops {
                if let Operation::TransferInPlace(buf) = op {
                    if self.fail_at == Some(self.commands.len()) {
                        self.fail_at = None;
                        return Err(TransportError::Io);
                    }
                    let channel = buf[0] >> 4;
                    self.commands.push(channel);
                    let result = self.pending.map_or(0, |c| 100 + u16::from(c));
                    buf.copy_from_slice(&(result << 6).to_be_bytes());
                    self.pending = Some(channel);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn command_encoding() {
        assert_eq!(command_byte(0), 0x00);
        assert_eq!(command_byte(10), 0xA0);
        assert_eq!(decode_result([0xFF, 0xC0]), 1023);
        assert_eq!(decode_result([0x80, 0x00]), 512);
    }

    #[test]
    fn scan_attributes_results_to_previous_command() {
        let mut adc = Tlc1543::new(FakeAdc::new());
        let samples = adc.scan().unwrap();
        for (ch, value) in samples.iter().enumerate() {
            assert_eq!(*value, 100 + ch as u16, "channel {ch}");
        }
    }

    #[test]
    fn command_sequence_is_prime_then_rotated() {
        let mut adc = Tlc1543::new(FakeAdc::new());
        adc.scan().unwrap();
        adc.scan().unwrap();
        let cmds = adc.release().commands;
        let mut expected = vec![0u8];
        for _ in 0..2 {
            expected.extend(1..N_ADC_CHANNELS as u8);
            expected.push(0);
        }
        assert_eq!(cmds, expected);
    }

    #[test]
    fn failure_mid_scan_reprimes() {
        let mut fake = FakeAdc::new();
        fake.fail_at = Some(5);
        let mut adc = Tlc1543::new(fake);
        assert_eq!(adc.scan(), Err(TransportError::Io));
        assert!(!adc.is_primed());

        let samples = adc.scan().unwrap();
        for (ch, value) in samples.iter().enumerate() {
            assert_eq!(*value, 100 + ch as u16);
        }
        // 5 commands before the failure, then prime + full scan.
        let cmds = adc.release().commands;
        assert_eq!(cmds.len(), 5 + 1 + N_ADC_CHANNELS);
        assert_eq!(cmds[5], 0);
    }

    #[test]
    fn failed_cycle_keeps_previous_samples() {
        let shared = SharedControl::new(&SystemConfig::default());
        let mut driver = AcquisitionDriver::new(FakeAdc::new());
        let first = driver.cycle(&shared).unwrap();
        let seq = shared.lock().sample_seq;

        driver.adc.spi.fail_at = Some(driver.adc.spi.commands.len() + 2);
        assert!(driver.cycle(&shared).is_err());
        let s = shared.lock();
        assert_eq!(s.raw_samples, first);
        assert_eq!(s.sample_seq, seq);
    }
}
