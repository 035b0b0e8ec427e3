//! Inbound operator commands.
//!
//! The console and the named-pipe reader share one line grammar
//! (`KEYWORD` or `KEYWORD=value`, case-insensitive).  Parsing yields an
//! [`AppCommand`]; [`AppCommand::apply`] runs it against the shared
//! control state and returns the reply text.

use core::fmt::Write as _;
use core::str::FromStr;

use crate::drivers::task::ShutdownFlag;
use crate::pins::N_PROBE_CHANNELS;
use crate::state::{DebugFlags, SharedControl};

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Help,
    Exit,
    Status,
    /// Toggle a named debug flag.
    ToggleDebug(String),
    ShowDebug,
    SetSetpoint(f32),
    /// Hold the servo at a fixed pulse width.
    ForceServo(i32),
    /// Return the servo to automatic control.
    AutoServo,
    SetKp(f32),
    SetKi(f32),
    SetKd(f32),
    /// Set the integral windup limit.
    SetKl(f32),
    /// Operator is lighting the burner.
    Light,
    SetChannelName { channel: usize, name: String },
    /// Input that matched no keyword (or carried an unparsable value).
    Unknown(String),
}

/// Keyword table used for `HELP`.
pub const MENU: &[(&str, &str)] = &[
    ("HELP", "Shows this menu"),
    ("EXIT", "Closes the program"),
    ("STATUS", "Shows temperatures, setpoint and valve"),
    ("DEBUG=", "Toggle debug flag"),
    ("DEBUG?", "Lists available debug flags"),
    ("SETTEMP=", "Set the target cabinet temperature"),
    ("SERVO!", "Returns the servo to PID control"),
    ("SERVO=", "Sets the pulse width of the servo"),
    ("KP=", "Set proportional gain"),
    ("KI=", "Set integral gain"),
    ("KD=", "Set derivative gain"),
    ("KL=", "Set integral limit"),
    ("LIGHT", "Opens the valve for lighting"),
    ("NAME=", "Names a probe channel: NAME=<channel>,<text>"),
];

impl FromStr for AppCommand {
    type Err = core::convert::Infallible;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Ok(parse(line.trim()).unwrap_or_else(|| Self::Unknown(line.trim().to_owned())))
    }
}

fn parse(line: &str) -> Option<AppCommand> {
    let (keyword, value) = match line.find(['=', '?', '!']) {
        Some(i) => line.split_at(i + 1),
        None => (line, ""),
    };
    let value = value.trim();
    let number = || value.parse::<f32>().ok();

    let cmd = match keyword.to_ascii_uppercase().as_str() {
        "HELP" => AppCommand::Help,
        "EXIT" => AppCommand::Exit,
        "STATUS" => AppCommand::Status,
        "LIGHT" => AppCommand::Light,
        "DEBUG?" => AppCommand::ShowDebug,
        "SERVO!" => AppCommand::AutoServo,
        "DEBUG=" if !value.is_empty() => AppCommand::ToggleDebug(value.to_owned()),
        "SETTEMP=" => AppCommand::SetSetpoint(number()?),
        "SERVO=" => AppCommand::ForceServo(value.parse().ok()?),
        "KP=" => AppCommand::SetKp(number()?),
        "KI=" => AppCommand::SetKi(number()?),
        "KD=" => AppCommand::SetKd(number()?),
        "KL=" => AppCommand::SetKl(number()?),
        "NAME=" => {
            let (channel, name) = value.split_once(',')?;
            AppCommand::SetChannelName {
                channel: channel.trim().parse().ok()?,
                name: name.trim().to_owned(),
            }
        }
        _ => return None,
    };
    Some(cmd)
}

impl AppCommand {
    /// Execute against the shared state and produce the operator reply.
    pub fn apply(&self, ctl: &SharedControl, shutdown: &ShutdownFlag) -> String {
        match self {
            Self::Help => MENU
                .iter()
                .map(|(k, d)| format!("{k:>10} {d}\n"))
                .collect(),
            Self::Exit => {
                shutdown.request();
                "Exiting\n".to_owned()
            }
            Self::Status => status_report(ctl),
            Self::ToggleDebug(name) => match DebugFlags::by_name(name) {
                Some(flag) => format!("Debug flags: {:?}\n", ctl.toggle_debug_flag(flag)),
                None => format!("Unknown debug flag: {name}\n"),
            },
            Self::ShowDebug => {
                let active = ctl.debug_flags();
                DebugFlags::all()
                    .iter_names()
                    .map(|(name, flag)| {
                        let mark = if active.contains(flag) { "on" } else { "off" };
                        format!("{name:>10} {mark}\n")
                    })
                    .collect()
            }
            Self::SetSetpoint(v) => format!("New Setpoint: {:4.2}\n", ctl.set_setpoint(*v)),
            Self::ForceServo(p) => match ctl.force_actuator_position(*p) {
                Ok(()) => format!("New Pulse Width: {p:4}\n"),
                Err(e) => format!("Pulse width {p}: {e}\n"),
            },
            Self::AutoServo => {
                ctl.clear_forced_position();
                "Servo under PID control\n".to_owned()
            }
            Self::SetKp(v) => {
                let g = ctl.gains();
                let g = ctl.set_gains(*v, g.ki, g.kd, g.windup_guard);
                format!("New proportional gain: {:.3}\n", g.kp)
            }
            Self::SetKi(v) => {
                let g = ctl.gains();
                let g = ctl.set_gains(g.kp, *v, g.kd, g.windup_guard);
                format!("New integral gain: {:.3}\n", g.ki)
            }
            Self::SetKd(v) => {
                let g = ctl.gains();
                let g = ctl.set_gains(g.kp, g.ki, *v, g.windup_guard);
                format!("New derivative gain: {:.3}\n", g.kd)
            }
            Self::SetKl(v) => {
                let g = ctl.gains();
                let g = ctl.set_gains(g.kp, g.ki, g.kd, *v);
                format!("New integral limit: {:.3}\n", g.windup_guard)
            }
            Self::Light => {
                ctl.light_flame();
                "Opening valve for lighting\n".to_owned()
            }
            Self::SetChannelName { channel, name } => match ctl.set_channel_name(*channel, name) {
                Ok(()) => format!("Channel {channel} named {name}\n"),
                Err(e) => format!("Channel {channel}: {e}\n"),
            },
            Self::Unknown(line) => format!("Cmd not found: {line}\n"),
        }
    }
}

/// Multi-line status block from a single snapshot.
pub fn status_report(ctl: &SharedControl) -> String {
    let s = ctl.snapshot();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "State: {}  Setpoint: {:.1}F  Flame: {:.1}F",
        s.flame_state.label(),
        s.setpoint,
        s.flame_temperature
    );
    let _ = writeln!(
        out,
        "Servo: {}{}  PID out: {:.2}  int: {:.2}",
        s.actuator_position,
        if s.forced_position.is_some() { " (forced)" } else { "" },
        s.pid_output,
        s.pid_integral
    );
    for ch in 0..N_PROBE_CHANNELS {
        let _ = writeln!(
            out,
            "{:>2} {:<20} {:7.1}F  raw {:4}",
            ch,
            s.channel_names[ch].as_str(),
            s.channel_temperatures[ch],
            s.raw_samples[ch]
        );
    }
    out
}
