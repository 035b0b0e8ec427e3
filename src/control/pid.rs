//! PID controller for the cabinet temperature loop
//!
//! Proportional-integral-derivative controller driven by the setpoint error.
//! The integral accumulator is clamped to `±windup_guard`; there is no
//! output clamp here, the orchestrator maps the output onto valve travel.

/// Gain set shared between the accessor surface and the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub windup_guard: f32,
}

/// Accept only finite, strictly positive tuning values.
pub fn is_valid_gain(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// PID controller
pub struct PidController {
    gains: PidGains,
    integral: f32,
    prev_error: f32,
    output: f32,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
            output: 0.0,
        }
    }

    /// Compute a new output from the setpoint error.
    ///
    /// A zero `dt` holds the derivative term at zero for this call.
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let guard = self.gains.windup_guard;
        self.integral = (self.integral + error * dt).clamp(-guard, guard);

        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };

        self.output = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        self.prev_error = error;
        self.output
    }

    // ── Gain setters (non-positive values are ignored) ──────────

    pub fn set_kp(&mut self, kp: f32) {
        if is_valid_gain(kp) {
            self.gains.kp = kp;
        }
    }

    pub fn set_ki(&mut self, ki: f32) {
        if is_valid_gain(ki) {
            self.gains.ki = ki;
        }
    }

    pub fn set_kd(&mut self, kd: f32) {
        if is_valid_gain(kd) {
            self.gains.kd = kd;
        }
    }

    /// Shrinking the guard re-clamps the accumulator immediately.
    pub fn set_windup_guard(&mut self, guard: f32) {
        if is_valid_gain(guard) {
            self.gains.windup_guard = guard;
            self.integral = self.integral.clamp(-guard, guard);
        }
    }

    /// Apply a whole gain set, each field validated independently.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.set_kp(gains.kp);
        self.set_ki(gains.ki);
        self.set_kd(gains.kd);
        self.set_windup_guard(gains.windup_guard);
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Output of the most recent [`update`](Self::update).
    pub fn output(&self) -> f32 {
        self.output
    }
}
