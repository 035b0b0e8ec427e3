//! System configuration parameters
//!
//! All tunable parameters for the Smokin'Pi controller.  Defaults are the
//! reference values for the propane cabinet; a JSON file passed with
//! `--config` may override any subset of them.

use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// Upper bounds keep every period representable in u32 microseconds.
const MAX_CONTROL_TICK_MS: u32 = 1000;
const MAX_SAFETY_WINDOW_MS: u32 = 60_000;
const MAX_REARM_SECS: u32 = 3600;
const MAX_REPEAT_SECS: u32 = 24 * 3600;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Setpoint ---
    /// Cabinet setpoint at startup (°F)
    pub initial_setpoint_f: f32,
    /// Lowest setpoint accepted from a command interface (°F)
    pub setpoint_min_f: f32,
    /// Highest setpoint accepted from a command interface (°F)
    pub setpoint_max_f: f32,

    // --- PID ---
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Maximum magnitude of the integral accumulator
    pub windup_guard: f32,

    // --- Flame detection ---
    /// Flame channel temperature that counts as "lit" (°F)
    pub flame_detected_f: f32,
    /// Flame channel temperature that counts as "out" (°F)
    pub flame_lost_f: f32,
    /// Time the condition must hold before a transition (ms)
    pub flame_debounce_ms: u32,
    /// Interval between repeated "flame lost" notifications (s)
    pub flame_lost_repeat_secs: u32,

    // --- Servo ---
    /// Physical travel limits of the needle valve (servo pulse µs)
    pub servo_physical_min: i32,
    pub servo_physical_max: i32,
    /// Lowest position at which the flame is reliably held
    pub servo_control_min: i32,
    /// Window granted to reach an arbitrary position (ms)
    pub servo_safety_window_ms: u32,
    /// Drive time granted per count of travel (µs)
    pub servo_us_per_count: u32,
    /// Period after which the position is re-asserted (s)
    pub servo_rearm_secs: u32,

    // --- Timing ---
    pub acquisition_interval_ms: u32,
    pub control_tick_ms: u32,
    pub pid_interval_ms: u32,
    pub monitor_interval_ms: u32,
    pub data_log_interval_secs: u32,

    // --- Notifications ---
    /// Recipient for `mail`; notifications only go to the log when unset.
    pub notification_email: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Setpoint
            initial_setpoint_f: 225.0,
            setpoint_min_f: 50.0,
            setpoint_max_f: 500.0,

            // PID
            kp: 4.0,
            ki: 0.05,
            kd: 1.0,
            windup_guard: 2000.0,

            // Flame
            flame_detected_f: 250.0,
            flame_lost_f: 150.0,
            flame_debounce_ms: 10_000,
            flame_lost_repeat_secs: 5 * 60,

            // Servo
            servo_physical_min: 600,
            servo_physical_max: 1200,
            servo_control_min: 620,
            servo_safety_window_ms: 5000,
            servo_us_per_count: 5000,
            servo_rearm_secs: 60,

            // Timing
            acquisition_interval_ms: 10,
            control_tick_ms: 5,
            pid_interval_ms: 20,
            monitor_interval_ms: 100,
            data_log_interval_secs: 15,

            notification_email: None,
        }
    }
}

impl SystemConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file is not an error: the defaults are used.  A file that
    /// exists but cannot be parsed, or that fails [`validate`](Self::validate),
    /// is rejected.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Reject parameter combinations the control tasks cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.setpoint_min_f < self.setpoint_max_f) {
            return Err(Error::Config("setpoint range is empty"));
        }
        if !(self.setpoint_min_f..=self.setpoint_max_f).contains(&self.initial_setpoint_f) {
            return Err(Error::Config("initial setpoint outside setpoint range"));
        }
        if [self.kp, self.ki, self.kd, self.windup_guard]
            .iter()
            .any(|g| !(g.is_finite() && *g > 0.0))
        {
            return Err(Error::Config("PID gains must be positive"));
        }
        if self.flame_lost_f >= self.flame_detected_f {
            return Err(Error::Config("flame lost threshold must be below detect threshold"));
        }
        if self.servo_physical_min >= self.servo_physical_max {
            return Err(Error::Config("servo physical range is empty"));
        }
        if !(self.servo_physical_min..=self.servo_physical_max).contains(&self.servo_control_min) {
            return Err(Error::Config("servo control floor outside physical range"));
        }
        if self.acquisition_interval_ms == 0
            || self.control_tick_ms == 0
            || self.monitor_interval_ms == 0
            || self.data_log_interval_secs == 0
            || self.servo_rearm_secs == 0
        {
            return Err(Error::Config("periods must be non-zero"));
        }
        if self.control_tick_ms > MAX_CONTROL_TICK_MS
            || self.servo_safety_window_ms > MAX_SAFETY_WINDOW_MS
            || self.servo_rearm_secs > MAX_REARM_SECS
            || self.flame_lost_repeat_secs > MAX_REPEAT_SECS
        {
            return Err(Error::Config("period too long"));
        }
        if self.pid_interval_ms < self.control_tick_ms
            || self.pid_interval_ms % self.control_tick_ms != 0
        {
            return Err(Error::Config("PID interval must be a multiple of the control tick"));
        }
        Ok(())
    }

    /// Control ticks between two PID updates.
    pub fn pid_every_ticks(&self) -> u32 {
        (self.pid_interval_ms / self.control_tick_ms).max(1)
    }

    /// Monitor ticks the flame condition must hold before a transition.
    pub fn flame_debounce_ticks(&self) -> u32 {
        (self.flame_debounce_ms / self.monitor_interval_ms).max(1)
    }

    /// Monitor ticks between repeated "flame lost" notifications.
    pub fn flame_repeat_ticks(&self) -> u32 {
        let ticks =
            u64::from(self.flame_lost_repeat_secs) * 1000 / u64::from(self.monitor_interval_ms);
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.flame_detected_f > c.flame_lost_f);
        assert!(c.servo_physical_min < c.servo_control_min);
        assert_eq!(c.pid_every_ticks(), 4);
        assert_eq!(c.flame_debounce_ticks(), 100);
        assert_eq!(c.flame_repeat_ticks(), 3000);
    }

    #[test]
    fn serde_roundtrip() {
        let c = SystemConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SystemConfig = serde_json::from_str(&json).unwrap();
        assert!((c.kp - c2.kp).abs() < 0.001);
        assert_eq!(c.servo_physical_max, c2.servo_physical_max);
        assert_eq!(c.flame_debounce_ms, c2.flame_debounce_ms);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: SystemConfig = serde_json::from_str(r#"{ "initial_setpoint_f": 250.0 }"#).unwrap();
        assert!((c.initial_setpoint_f - 250.0).abs() < f32::EPSILON);
        assert_eq!(c.control_tick_ms, 5);
    }

    #[test]
    fn inverted_flame_thresholds_rejected() {
        let c = SystemConfig {
            flame_lost_f: 300.0,
            ..SystemConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(Error::Config("flame lost threshold must be below detect threshold"))
        );
    }

    #[test]
    fn pid_interval_must_align_with_tick() {
        let c = SystemConfig {
            pid_interval_ms: 22,
            ..SystemConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn overlong_periods_rejected() {
        let too_long = [
            SystemConfig {
                servo_rearm_secs: 5000,
                ..SystemConfig::default()
            },
            SystemConfig {
                servo_safety_window_ms: 5_000_000,
                ..SystemConfig::default()
            },
            SystemConfig {
                control_tick_ms: 5_000_000,
                pid_interval_ms: 5_000_000,
                ..SystemConfig::default()
            },
            SystemConfig {
                flame_lost_repeat_secs: 5_000_000,
                ..SystemConfig::default()
            },
        ];
        for c in too_long {
            assert_eq!(c.validate(), Err(Error::Config("period too long")), "{c:?}");
        }
    }

    #[test]
    fn longest_accepted_periods_convert() {
        let c = SystemConfig {
            servo_rearm_secs: MAX_REARM_SECS,
            servo_safety_window_ms: MAX_SAFETY_WINDOW_MS,
            control_tick_ms: MAX_CONTROL_TICK_MS,
            pid_interval_ms: MAX_CONTROL_TICK_MS,
            flame_lost_repeat_secs: MAX_REPEAT_SECS,
            ..SystemConfig::default()
        };
        assert!(c.validate().is_ok());
        assert_eq!(c.flame_repeat_ticks(), 864_000);
        let timing = crate::drivers::servo::ServoTiming::from_config(&c);
        assert_eq!(timing.rearm_period_us, 3_600_000_000);
        assert_eq!(timing.safety_window_us, 60_000_000);
        assert_eq!(timing.tick_us, 1_000_000);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let c = SystemConfig::load(Path::new("/nonexistent/smokinpi.json")).unwrap();
        assert_eq!(c.servo_physical_min, 600);
    }
}
