//! Line-oriented command readers: the interactive console and the named
//! pipe.
//!
//! Both feed lines through [`AppCommand`] and touch the control state only
//! through [`SharedControl`], so a stalled reader can never hold up the
//! control loop.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::app::commands::AppCommand;
use crate::drivers::task::{ShutdownFlag, spawn_named};
use crate::state::SharedControl;

/// Run every line of `reader` as a command, handing each reply to `reply`.
/// Returns at end of input or once shutdown is requested.
pub fn serve_lines(
    reader: impl BufRead,
    ctl: &SharedControl,
    shutdown: &ShutdownFlag,
    mut reply: impl FnMut(&str),
) -> std::io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(cmd) = line.parse::<AppCommand>();
        reply(&cmd.apply(ctl, shutdown));
        if shutdown.is_set() {
            break;
        }
    }
    Ok(())
}

/// Interactive console on stdin / stdout.
pub fn spawn_console(ctl: SharedControl, shutdown: ShutdownFlag) -> std::io::Result<JoinHandle<()>> {
    spawn_named("console", move || {
        println!("Smokin'Pi ready, type HELP for commands");
        let stdin = std::io::stdin();
        let result = serve_lines(stdin.lock(), &ctl, &shutdown, |text| {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        });
        if let Err(e) = result {
            warn!("Console input failed: {e}");
        }
    })
}

/// Named-pipe reader.  The pipe is reopened each time the writer closes it.
pub fn spawn_fifo(
    path: PathBuf,
    ctl: SharedControl,
    shutdown: ShutdownFlag,
) -> std::io::Result<JoinHandle<()>> {
    spawn_named("fifo", move || {
        info!("Listening for commands on {}", path.display());
        while !shutdown.is_set() {
            if let Err(e) = serve_fifo_once(&path, &ctl, &shutdown) {
                warn!("Command pipe {}: {e}", path.display());
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    })
}

fn serve_fifo_once(path: &Path, ctl: &SharedControl, shutdown: &ShutdownFlag) -> std::io::Result<()> {
    let file = File::open(path)?;
    serve_lines(BufReader::new(file), ctl, shutdown, |text| {
        for line in text.lines() {
            info!("pipe> {line}");
        }
    })?;
    // EOF on a pipe with no writer returns immediately; avoid spinning.
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}
