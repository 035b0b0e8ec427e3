//! TCP command server for remote front ends.
//!
//! Binary frames, one request per frame:
//!
//! ```text
//!  | 0xAC 0xED | length u16 | msg id u16 | payload… |
//! ```
//!
//! The sync word is sent most significant byte first; every other field is
//! little-endian.  `length` counts the whole frame, sync word included.
//! Bytes before a sync word are skipped, as is any frame whose length is
//! out of range, so a client can always resynchronise.
//!
//! Setters go through [`AppCommand`] exactly like console input and get no
//! reply frame.  `GET_VERSION` and `GET_STATUS` are answered with
//! `VERSION_RESPONSE` and `STATUS_RESPONSE` frames.

use core::fmt;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::app::commands::AppCommand;
use crate::app::service::ValveRange;
use crate::config::SystemConfig;
use crate::drivers::task::{ShutdownFlag, spawn_named};
use crate::pins::{FLAME_CHANNEL, N_ADC_CHANNELS, N_PROBE_CHANNELS};
use crate::state::{CHANNEL_NAME_LEN, SharedControl};

/// Default listening port.
pub const LISTEN_PORT: u16 = 46879;
pub const SYNC_PATTERN: u16 = 0xACED;

/// Sync word, length and message id.
pub const HEADER_LEN: usize = 6;
/// Longest request accepted: a channel index plus a full-length name.
pub const MAX_REQUEST_LEN: usize = HEADER_LEN + 2 + CHANNEL_NAME_LEN;

/// Name reported for the flame channel in status frames.
const FLAME_CHANNEL_NAME: &str = "Flame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageId {
    GetVersion = 0,
    SetTemperatureSetpoint = 1,
    SetKp = 2,
    SetKi = 3,
    SetKl = 4,
    SetChannelName = 5,
    GetStatus = 6,
    VersionResponse = 7,
    StatusResponse = 8,
}

impl TryFrom<u16> for MessageId {
    type Error = FrameError;

    fn try_from(id: u16) -> Result<Self, FrameError> {
        Ok(match id {
            0 => Self::GetVersion,
            1 => Self::SetTemperatureSetpoint,
            2 => Self::SetKp,
            3 => Self::SetKi,
            4 => Self::SetKl,
            5 => Self::SetChannelName,
            6 => Self::GetStatus,
            7 => Self::VersionResponse,
            8 => Self::StatusResponse,
            _ => return Err(FrameError::UnknownMessage(id)),
        })
    }
}

/// Why a well-framed message could not be turned into a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    UnknownMessage(u16),
    /// A response id sent by the client.
    NotARequest(MessageId),
    /// Payload too short or name not UTF-8.
    BadPayload(MessageId),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessage(id) => write!(f, "unknown message id {id}"),
            Self::NotARequest(id) => write!(f, "{id:?} is not a request"),
            Self::BadPayload(id) => write!(f, "malformed {id:?} payload"),
        }
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetVersion,
    SetSetpoint(f32),
    SetKp(f32),
    SetKi(f32),
    SetKl(f32),
    SetChannelName { channel: usize, name: String },
    GetStatus,
}

impl Request {
    pub fn decode(id: u16, payload: &[u8]) -> Result<Self, FrameError> {
        let id = MessageId::try_from(id)?;
        let float = || {
            payload
                .first_chunk::<4>()
                .map(|b| f32::from_le_bytes(*b))
                .ok_or(FrameError::BadPayload(id))
        };
        Ok(match id {
            MessageId::GetVersion => Self::GetVersion,
            MessageId::GetStatus => Self::GetStatus,
            MessageId::SetTemperatureSetpoint => Self::SetSetpoint(float()?),
            MessageId::SetKp => Self::SetKp(float()?),
            MessageId::SetKi => Self::SetKi(float()?),
            MessageId::SetKl => Self::SetKl(float()?),
            MessageId::SetChannelName => {
                let (channel, name) = payload
                    .split_first_chunk::<2>()
                    .ok_or(FrameError::BadPayload(id))?;
                let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
                let name = core::str::from_utf8(&name[..end])
                    .map_err(|_| FrameError::BadPayload(id))?;
                Self::SetChannelName {
                    channel: usize::from(u16::from_le_bytes(*channel)),
                    name: name.to_owned(),
                }
            }
            MessageId::VersionResponse | MessageId::StatusResponse => {
                return Err(FrameError::NotARequest(id));
            }
        })
    }

    /// The console command a setter maps onto; `None` for queries.
    pub fn to_command(&self) -> Option<AppCommand> {
        Some(match self {
            Self::SetSetpoint(v) => AppCommand::SetSetpoint(*v),
            Self::SetKp(v) => AppCommand::SetKp(*v),
            Self::SetKi(v) => AppCommand::SetKi(*v),
            Self::SetKl(v) => AppCommand::SetKl(*v),
            Self::SetChannelName { channel, name } => AppCommand::SetChannelName {
                channel: *channel,
                name: name.clone(),
            },
            Self::GetVersion | Self::GetStatus => return None,
        })
    }
}

/// Build a complete frame around `payload`.
pub fn encode_frame(id: MessageId, payload: &[u8]) -> Vec<u8> {
    let len = HEADER_LEN + payload.len();
    let mut frame = Vec::with_capacity(len);
    frame.extend_from_slice(&SYNC_PATTERN.to_be_bytes());
    frame.extend_from_slice(&(len as u16).to_le_bytes());
    frame.extend_from_slice(&(id as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

// ---------------------------------------------------------------------------
// Frame reader
// ---------------------------------------------------------------------------

/// Message id and payload of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u16,
    pub payload: Vec<u8>,
}

/// Pulls frames out of a byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next frame, or `None` once the stream ends.  A frame cut short by
    /// the end of the stream is dropped.
    pub fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            if !self.find_sync()? {
                return Ok(None);
            }
            let mut length = [0u8; 2];
            if !read_full(&mut self.reader, &mut length)? {
                return Ok(None);
            }
            let length = u16::from_le_bytes(length);
            let len = usize::from(length);
            if !(HEADER_LEN..=MAX_REQUEST_LEN).contains(&len) {
                warn!("Dropping frame with invalid length {length}");
                continue;
            }
            let mut body = vec![0u8; len - 4];
            if !read_full(&mut self.reader, &mut body)? {
                return Ok(None);
            }
            let id = u16::from_le_bytes([body[0], body[1]]);
            body.drain(..2);
            return Ok(Some(Frame { id, payload: body }));
        }
    }

    fn find_sync(&mut self) -> std::io::Result<bool> {
        let mut window = 0u16;
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            window = (window << 8) | u16::from(byte[0]);
            if window == SYNC_PATTERN {
                return Ok(true);
            }
        }
    }
}

/// `read_exact` that reports a clean end of stream as `false`.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Answers requests against the shared control state.
#[derive(Clone)]
pub struct CommandServer {
    ctl: SharedControl,
    shutdown: ShutdownFlag,
    valve: ValveRange,
}

impl CommandServer {
    pub fn new(ctl: SharedControl, shutdown: ShutdownFlag, config: &SystemConfig) -> Self {
        Self {
            ctl,
            shutdown,
            valve: ValveRange::from_config(config),
        }
    }

    /// Execute one request; returns the reply frame for queries.
    pub fn respond(&self, request: &Request) -> Option<Vec<u8>> {
        if let Some(cmd) = request.to_command() {
            let reply = cmd.apply(&self.ctl, &self.shutdown);
            debug!("net> {}", reply.trim_end());
            return None;
        }
        match request {
            Request::GetVersion => {
                Some(encode_frame(MessageId::VersionResponse, &version_payload()))
            }
            Request::GetStatus => {
                Some(encode_frame(MessageId::StatusResponse, &self.status_payload()))
            }
            _ => None,
        }
    }

    /// Serve one connection until the peer closes it or shutdown is
    /// requested.
    pub fn serve(&self, reader: impl Read, mut writer: impl Write) -> std::io::Result<()> {
        let mut frames = FrameReader::new(reader);
        while !self.shutdown.is_set() {
            let Some(frame) = frames.next_frame()? else {
                break;
            };
            match Request::decode(frame.id, &frame.payload) {
                Ok(request) => {
                    if let Some(reply) = self.respond(&request) {
                        writer.write_all(&reply)?;
                        writer.flush()?;
                    }
                }
                Err(e) => warn!("Ignoring frame: {e}"),
            }
        }
        Ok(())
    }

    /// Status layout:
    ///
    /// ```text
    ///  setpoint f32 | temperature f32 × 11 | name [u8; 64] × 11 |
    ///  kp ki kl integral output f32 |
    ///  position closed open control_min control_max u16
    /// ```
    ///
    /// Temperatures and names run over the probes, then the flame channel.
    fn status_payload(&self) -> Vec<u8> {
        let s = self.ctl.snapshot();
        let mut out = Vec::new();
        out.extend_from_slice(&s.setpoint.to_le_bytes());
        for ch in 0..N_ADC_CHANNELS {
            let t = if ch == FLAME_CHANNEL {
                s.flame_temperature
            } else {
                s.channel_temperatures[ch]
            };
            out.extend_from_slice(&t.to_le_bytes());
        }
        for ch in 0..N_ADC_CHANNELS {
            let name = if ch < N_PROBE_CHANNELS {
                s.channel_names[ch].as_str()
            } else {
                FLAME_CHANNEL_NAME
            };
            let mut field = [0u8; CHANNEL_NAME_LEN];
            field[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&field);
        }
        for v in [
            s.gains.kp,
            s.gains.ki,
            s.gains.windup_guard,
            s.pid_integral,
            s.pid_output,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for p in [
            s.actuator_position,
            self.valve.closed,
            self.valve.open,
            self.valve.control_min,
            self.valve.open,
        ] {
            out.extend_from_slice(&u16::try_from(p).unwrap_or(0).to_le_bytes());
        }
        out
    }
}

/// Major, minor and patch of this build as three `u32`.
fn version_payload() -> Vec<u8> {
    [
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    ]
    .iter()
    .flat_map(|part| part.parse::<u32>().unwrap_or(0).to_le_bytes())
    .collect()
}

/// Accept connections on `addr`, one client at a time.
pub fn spawn_server(addr: String, server: CommandServer) -> std::io::Result<JoinHandle<()>> {
    let listener = TcpListener::bind(&addr)?;
    info!("Command server listening on {addr}");
    spawn_named("net", move || {
        for stream in listener.incoming() {
            if server.shutdown.is_set() {
                break;
            }
            match stream {
                Ok(stream) => {
                    if let Err(e) = serve_stream(&server, stream) {
                        warn!("Command connection: {e}");
                    }
                }
                Err(e) => warn!("Command server accept failed: {e}"),
            }
        }
    })
}

fn serve_stream(server: &CommandServer, stream: TcpStream) -> std::io::Result<()> {
    let peer = stream.peer_addr()?;
    info!("Command client {peer} connected");
    let writer = stream.try_clone()?;
    server.serve(BufReader::new(stream), writer)?;
    info!("Command client {peer} disconnected");
    Ok(())
}
