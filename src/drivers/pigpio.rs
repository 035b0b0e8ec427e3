//! pigpio daemon socket client.
//!
//! `pigpiod` accepts fixed 16-byte little-endian commands on a TCP socket:
//!
//! ```text
//!  request:  | cmd u32 | p1 u32 | p2 u32 | p3 u32 (ext len) | ext bytes…
//!  response: | cmd u32 | p1 u32 | p2 u32 | res i32 |          [res data bytes for SPIX]
//! ```
//!
//! A negative `res` is a pigpio error code.  The ADC and the servo share
//! one daemon connection, so the client sits behind a mutex (the hardware
//! lock) and each command/response pair runs under it.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};
use log::{info, warn};

use crate::app::ports::ServoOutput;
use crate::error::TransportError;

// Command codes (pigpio.h)
pub const CMD_SERVO: u32 = 8;
pub const CMD_SPIO: u32 = 71;
pub const CMD_SPIC: u32 = 72;
pub const CMD_SPIX: u32 = 75;

const HEADER_LEN: usize = 16;
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Encode a command header followed by its extension.
pub fn encode_command(cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + ext.len());
    for word in [cmd, p1, p2, ext.len() as u32] {
        frame.extend_from_slice(&word.to_le_bytes());
    }
    frame.extend_from_slice(ext);
    frame
}

/// Extract the result word of a response header.
pub fn decode_result(cmd: u32, header: &[u8; HEADER_LEN]) -> Result<u32, TransportError> {
    let word = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
    if word(0) != cmd {
        return Err(TransportError::ShortResponse);
    }
    let res = word(12) as i32;
    if res < 0 {
        return Err(TransportError::Rejected(res));
    }
    Ok(res as u32)
}

fn io_error(e: &std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => TransportError::ShortResponse,
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => TransportError::Disconnected,
        _ => TransportError::Io,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PigpioClient<S = TcpStream> {
    stream: S,
}

impl PigpioClient<TcpStream> {
    pub fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        info!("Connected to pigpiod at {addr}");
        Ok(Self { stream })
    }
}

impl<S: Read + Write> PigpioClient<S> {
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Result<u32, TransportError> {
        let frame = encode_command(cmd, p1, p2, ext);
        self.stream.write_all(&frame).map_err(|e| io_error(&e))?;
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).map_err(|e| io_error(&e))?;
        decode_result(cmd, &header)
    }

    /// Set a servo pulse width (µs); `0` stops the pulses.
    pub fn servo(&mut self, gpio: u32, pulse_us: u32) -> Result<(), TransportError> {
        self.command(CMD_SERVO, gpio, pulse_us, &[]).map(|_| ())
    }

    /// Open an SPI channel, returning its handle.
    pub fn spi_open(&mut self, channel: u32, baud: u32, flags: u32) -> Result<u32, TransportError> {
        self.command(CMD_SPIO, channel, baud, &flags.to_le_bytes())
    }

    pub fn spi_close(&mut self, handle: u32) -> Result<(), TransportError> {
        self.command(CMD_SPIC, handle, 0, &[]).map(|_| ())
    }

    /// Full-duplex transfer; `buf` is sent and overwritten with the reply.
    pub fn spi_xfer(&mut self, handle: u32, buf: &mut [u8]) -> Result<(), TransportError> {
        let count = self.command(CMD_SPIX, handle, 0, buf)? as usize;
        if count != buf.len() {
            return Err(TransportError::ShortResponse);
        }
        self.stream.read_exact(buf).map_err(|e| io_error(&e))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// The hardware lock shared by every pigpio-backed device.
pub type SharedPigpio<S = TcpStream> = Arc<Mutex<PigpioClient<S>>>;

fn lock<S>(client: &SharedPigpio<S>) -> std::sync::MutexGuard<'_, PigpioClient<S>> {
    client.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// SPI device
// ---------------------------------------------------------------------------

/// An open SPI channel on the daemon.
pub struct PigpioSpi<S = TcpStream> {
    client: SharedPigpio<S>,
    handle: u32,
}

impl<S: Read + Write> PigpioSpi<S> {
    pub fn open(client: SharedPigpio<S>, channel: u32, baud: u32, flags: u32) -> Result<Self, TransportError> {
        let handle = lock(&client).spi_open(channel, baud, flags)?;
        info!("SPI channel {channel} open at {baud} Hz (handle {handle})");
        Ok(Self { client, handle })
    }

    pub fn close(self) {
        if let Err(e) = lock(&self.client).spi_close(self.handle) {
            warn!("SPI close failed: {e}");
        }
    }
}

impl<S> ErrorType for PigpioSpi<S> {
    type Error = TransportError;
}

impl<S: Read + Write> SpiDevice for PigpioSpi<S> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), TransportError> {
        for op in operations {
            match op {
                Operation::DelayNs(ns) => std::thread::sleep(Duration::from_nanos(u64::from(*ns))),
                Operation::TransferInPlace(buf) => lock(&self.client).spi_xfer(self.handle, buf)?,
                Operation::Write(data) => {
                    let mut scratch = data.to_vec();
                    lock(&self.client).spi_xfer(self.handle, &mut scratch)?;
                }
                Operation::Read(buf) => {
                    buf.fill(0);
                    lock(&self.client).spi_xfer(self.handle, buf)?;
                }
                Operation::Transfer(read, write) => {
                    let mut scratch = write.to_vec();
                    scratch.resize(read.len().max(write.len()), 0);
                    lock(&self.client).spi_xfer(self.handle, &mut scratch)?;
                    let n = read.len();
                    read.copy_from_slice(&scratch[..n]);
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Servo
// ---------------------------------------------------------------------------

/// Servo pulses generated by the daemon on one GPIO.
pub struct PigpioServo<S = TcpStream> {
    client: SharedPigpio<S>,
    gpio: u32,
}

impl<S> PigpioServo<S> {
    pub fn new(client: SharedPigpio<S>, gpio: u32) -> Self {
        Self { client, gpio }
    }
}

impl<S: Read + Write> ServoOutput for PigpioServo<S> {
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), TransportError> {
        lock(&self.client).servo(self.gpio, pulse_us)
    }
}
