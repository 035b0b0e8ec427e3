//! Mail notification sink.
//!
//! Pipes the message body into the system `mail` command with a subject of
//! the form `HH:MM - Notice`.  An email-to-SMS gateway address works as the
//! recipient too.

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};

use chrono::Local;
use log::{debug, error};

use crate::app::events::Notification;
use crate::app::ports::NotificationSink;

pub struct MailSink {
    recipient: String,
    program: String,
}

impl MailSink {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            program: "mail".to_owned(),
        }
    }

    /// Use a different mailer binary (anything accepting `-s subject addr`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn subject(n: &Notification, hour_min: &str) -> String {
        format!("{hour_min} - {}", n.severity.label())
    }

    fn send(&self, n: &Notification) -> std::io::Result<()> {
        let subject = Self::subject(n, &Local::now().format("%H:%M").to_string());
        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg(&subject)
            .arg(&self.recipient)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;
        let status = pipe_and_wait(&mut child, n.message)?;
        if !status.success() {
            return Err(std::io::Error::other(format!("{} exited with {status}", self.program)));
        }
        debug!("Mailed '{subject}' to {}", self.recipient);
        Ok(())
    }
}

/// Write `body` to the child's stdin, close it, and reap the child.  The
/// child is waited on even when the write fails.
fn pipe_and_wait(child: &mut Child, body: &str) -> std::io::Result<ExitStatus> {
    let written = match child.stdin.take() {
        Some(mut stdin) => writeln!(stdin, "{body}"),
        None => Ok(()),
    };
    let status = child.wait()?;
    written.map(|()| status)
}

impl NotificationSink for MailSink {
    fn notify(&mut self, n: &Notification) {
        if let Err(e) = self.send(n) {
            error!("Mail notification failed: {e}");
        }
    }
}
