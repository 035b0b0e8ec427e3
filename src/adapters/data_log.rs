//! CSV data log.
//!
//! One row per interval, appended to a file named after the local date:
//!
//! ```text
//! Log-2024-7-4.csv:
//! 2024-7-4 13:05:30,780,225.31,180.02,…,412.77
//!           time   servo  probe 0 … probe 9  flame
//! ```
//!
//! Write failures are logged and the row is skipped; logging never stops
//! the controller.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::{error, info};

use crate::state::{ControlState, SharedControl};

pub struct DataLogger {
    dir: PathBuf,
}

impl DataLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Data log directory: {}", dir.display());
        Self { dir }
    }

    pub fn file_name(at: &NaiveDateTime) -> String {
        at.format("Log-%Y-%-m-%-d.csv").to_string()
    }

    pub fn path_for(&self, at: &NaiveDateTime) -> PathBuf {
        self.dir.join(Self::file_name(at))
    }

    /// Format one CSV row (newline included).
    pub fn row(at: &NaiveDateTime, s: &ControlState) -> String {
        let mut row = format!("{},{}", at.format("%Y-%-m-%-d %_H:%M:%S"), s.actuator_position);
        for t in &s.channel_temperatures {
            row.push_str(&format!(",{t:.2}"));
        }
        row.push_str(&format!(",{:.2}\n", s.flame_temperature));
        row
    }

    /// Append a row for `state` stamped `at`.
    pub fn append(&self, at: &NaiveDateTime, state: &ControlState) -> std::io::Result<PathBuf> {
        let path = self.path_for(at);
        append_to(&path, &Self::row(at, state))?;
        Ok(path)
    }

    /// Periodic task body: snapshot, then write outside the lock.
    pub fn service(&self, shared: &SharedControl) {
        let snapshot = shared.snapshot();
        let now = Local::now().naive_local();
        if let Err(e) = self.append(&now, &snapshot) {
            error!("Data log write failed: {e}");
        }
    }
}

fn append_to(path: &Path, row: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(row.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 4)
            .unwrap()
            .and_hms_opt(9, 5, 30)
            .unwrap()
    }

    #[test]
    fn file_name_has_unpadded_date() {
        assert_eq!(DataLogger::file_name(&at()), "Log-2024-7-4.csv");
    }

    #[test]
    fn row_layout() {
        let mut s = ControlState::new(&SystemConfig::default());
        s.actuator_position = 780;
        s.channel_temperatures = [100.0; 10];
        s.flame_temperature = 412.5;
        let row = DataLogger::row(&at(), &s);
        assert!(row.starts_with("2024-7-4  9:05:30,780,100.00,"));
        assert!(row.ends_with(",412.50\n"));
        assert_eq!(row.trim_end().split(',').count(), 1 + 1 + 10 + 1);
    }

    #[test]
    fn append_creates_and_extends_file() {
        let dir = std::env::temp_dir().join(format!("smokinpi-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let logger = DataLogger::new(&dir);
        let s = ControlState::new(&SystemConfig::default());
        let path = logger.append(&at(), &s).unwrap();
        logger.append(&at(), &s).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error_not_a_panic() {
        let logger = DataLogger::new("/nonexistent/smokinpi");
        let s = ControlState::new(&SystemConfig::default());
        assert!(logger.append(&at(), &s).is_err());
    }
}
