//! Unified error types for the Smokin'Pi controller.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! error handling of the periodic tasks uniform.  All variants are `Copy` so
//! they can be passed out of a driver and logged without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The ADC / actuator link is unavailable or answered garbage.
    Transport(TransportError),
    /// A value supplied at the accessor boundary was rejected.
    Validation(ValidationError),
    /// An enum or table held a value that should be unreachable.
    StateInconsistency(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::StateInconsistency(msg) => write!(f, "state inconsistency: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Socket to the hardware daemon could not be opened or was dropped.
    Disconnected,
    /// The daemon returned a negative status code for a command.
    Rejected(i32),
    /// A response was shorter than the protocol requires.
    ShortResponse,
    /// Read or write on the link failed.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "link disconnected"),
            Self::Rejected(code) => write!(f, "command rejected (rc={code})"),
            Self::ShortResponse => write!(f, "short response"),
            Self::Io => write!(f, "I/O failure"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl embedded_hal::spi::Error for TransportError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Rejections at the accessor boundary.  These never reach the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Setpoint outside the plausible cooking range.
    SetpointOutOfRange,
    /// Gain or windup limit was zero, negative, or not finite.
    NonPositiveGain,
    /// Channel index beyond the number of analog inputs.
    NoSuchChannel,
    /// Channel name too long or not printable ASCII.
    BadChannelName,
    /// Actuator position could not be parsed or is negative.
    BadPosition,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetpointOutOfRange => write!(f, "setpoint out of range"),
            Self::NonPositiveGain => write!(f, "gain must be positive"),
            Self::NoSuchChannel => write!(f, "no such channel"),
            Self::BadChannelName => write!(f, "invalid channel name"),
            Self::BadPosition => write!(f, "invalid actuator position"),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
