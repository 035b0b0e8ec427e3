//! Outbound operator notifications.
//!
//! The flame monitor emits these through the
//! [`NotificationSink`](super::ports::NotificationSink) port.  Adapters on
//! the other side decide where they go (log, mail, SMS gateway).

use core::fmt;

/// How urgently the operator should look at the smoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Notice,
    Warning,
}

impl Severity {
    /// Used as the mail subject.
    pub fn label(self) -> &'static str {
        match self {
            Self::Notice => "Notice",
            Self::Warning => "Warning",
        }
    }
}

/// A single operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: &'static str,
}

impl Notification {
    pub const STARTING: Self = Self {
        severity: Severity::Notice,
        message: "Application is starting",
    };

    pub const LIGHTING: Self = Self {
        severity: Severity::Notice,
        message: "Opening valve for lighting",
    };

    pub const FLAME_DETECTED: Self = Self {
        severity: Severity::Notice,
        message: "Fire detected",
    };

    pub const FLAME_LOST: Self = Self {
        severity: Severity::Warning,
        message: "Loss of fire has been detected",
    };
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.label(), self.message)
    }
}
