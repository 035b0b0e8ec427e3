//! Port traits: the boundary between control logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlLoop / FlameMonitor
//! ```
//!
//! Driven adapters (pigpio servo, simulator, mail) implement these traits.
//! The control tasks consume them via generics, so the core never touches
//! hardware directly and every task can run against recording mocks.

use crate::error::TransportError;

use super::events::Notification;

// ───────────────────────────────────────────────────────────────
// Servo port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the needle-valve servo.
pub trait ServoOutput {
    /// Command a pulse width in microseconds.  `0` de-asserts the signal.
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), TransportError>;
}

impl<T: ServoOutput + ?Sized> ServoOutput for Box<T> {
    fn set_pulse_width(&mut self, pulse_us: u32) -> Result<(), TransportError> {
        (**self).set_pulse_width(pulse_us)
    }
}

// ───────────────────────────────────────────────────────────────
// Notification port (driven adapter: domain → operator)
// ───────────────────────────────────────────────────────────────

/// Delivery of operator notifications.  Implementations must not block
/// for long: the flame monitor calls this from its periodic task.
pub trait NotificationSink {
    fn notify(&mut self, notification: &Notification);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Box<T> {
    fn notify(&mut self, notification: &Notification) {
        (**self).notify(notification);
    }
}
