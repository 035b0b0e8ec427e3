//! Periodic task spawning and process shutdown.
//!
//! Every control task is a named OS thread running a fixed-rate loop.  The
//! loop checks the shared [`ShutdownFlag`] at its top, so a task always
//! finishes its current cycle (and releases the state lock) before exiting.
//!
//! SIGINT / SIGTERM are routed to a process-wide atomic by a minimal
//! `libc` signal handler; every `ShutdownFlag` observes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::info;

static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT / SIGTERM handlers.  Call once from `main`.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only stores to an atomic, which is
        // async-signal-safe.
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Cooperative shutdown request shared by all tasks.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// `true` once requested here or by a signal.
    pub fn is_set(&self) -> bool {
        self.requested.load(Ordering::SeqCst) || SIGNALLED.load(Ordering::SeqCst)
    }
}

/// Spawn a named thread.
pub fn spawn_named(
    name: &str,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    info!("Spawning '{name}'");
    std::thread::Builder::new().name(name.into()).spawn(f)
}

/// Spawn a fixed-rate task calling `body` once per `period` until shutdown.
///
/// Deadlines advance by whole periods; if a cycle overruns by more than a
/// period the schedule restarts from now instead of bursting.
pub fn spawn_periodic(
    name: &str,
    period: Duration,
    shutdown: ShutdownFlag,
    mut body: impl FnMut() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    let task = name.to_owned();
    spawn_named(name, move || {
        let mut next = Instant::now() + period;
        while !shutdown.is_set() {
            body();
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
                next += period;
            } else {
                next = now + period;
            }
        }
        info!("Task '{task}' stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn flag_is_shared_between_clones() {
        let a = ShutdownFlag::new();
        let b = a.clone();
        assert!(!b.is_set());
        a.request();
        assert!(b.is_set());
    }

    #[test]
    fn periodic_task_runs_until_shutdown() {
        let shutdown = ShutdownFlag::new();
        let count = Arc::new(AtomicU32::new(0));
        let handle = {
            let count = Arc::clone(&count);
            spawn_periodic("test-periodic", Duration::from_millis(1), shutdown.clone(), move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };
        while count.load(Ordering::SeqCst) < 5 {
            std::thread::sleep(Duration::from_millis(1));
        }
        shutdown.request();
        handle.join().unwrap();
        let stopped_at = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }
}
