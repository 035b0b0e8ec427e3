//! Queued notification delivery.
//!
//! The flame monitor must never wait on a mail transport, so it talks to a
//! [`QueuedNotifier`] that only pushes into a bounded channel.  A delivery
//! thread drains the channel into the real sinks.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{info, warn};

use crate::app::events::Notification;
use crate::app::ports::NotificationSink;
use crate::drivers::task::spawn_named;

const QUEUE_DEPTH: usize = 16;

/// Non-blocking sink handed to the monitor.
#[derive(Clone)]
pub struct QueuedNotifier {
    tx: Sender<Notification>,
}

impl NotificationSink for QueuedNotifier {
    fn notify(&mut self, n: &Notification) {
        match self.tx.try_send(*n) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => warn!("Notification queue full, dropping: {n}"),
            Err(TrySendError::Disconnected(n)) => warn!("Notifier stopped, dropping: {n}"),
        }
    }
}

/// Create the queue and the receiving end for the delivery loop.
pub fn channel() -> (QueuedNotifier, Receiver<Notification>) {
    let (tx, rx) = bounded(QUEUE_DEPTH);
    (QueuedNotifier { tx }, rx)
}

/// Deliver every queued notification to all `sinks` until every sender is
/// dropped.
pub fn deliver_all(rx: &Receiver<Notification>, sinks: &mut [Box<dyn NotificationSink + Send>]) {
    for n in rx.iter() {
        for sink in sinks.iter_mut() {
            sink.notify(&n);
        }
    }
}

/// Spawn the delivery thread.
pub fn spawn_delivery(
    rx: Receiver<Notification>,
    mut sinks: Vec<Box<dyn NotificationSink + Send>>,
) -> std::io::Result<JoinHandle<()>> {
    spawn_named("notify", move || {
        deliver_all(&rx, &mut sinks);
        info!("Notification delivery stopped");
    })
}
