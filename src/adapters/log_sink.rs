//! Log-based notification sink.
//!
//! Implements [`NotificationSink`] by writing each notification to the
//! process log.  Always installed, so every notification leaves a trace
//! even when no mail transport is configured.

use log::{info, warn};

use crate::app::events::{Notification, Severity};
use crate::app::ports::NotificationSink;

/// Adapter that logs every [`Notification`].
#[derive(Debug, Default)]
pub struct LogNotificationSink;

impl LogNotificationSink {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationSink for LogNotificationSink {
    fn notify(&mut self, n: &Notification) {
        match n.severity {
            Severity::Notice => info!("NOTIFY | {}", n.message),
            Severity::Warning => warn!("NOTIFY | {}", n.message),
        }
    }
}
