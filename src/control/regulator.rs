//! Mechanical mapper: regulator servo with slew-rate limiting.
//!
//! The servo tracks a goal position at a bounded rate derived from the
//! configured travel time (CV49): per 20 ms tick the position moves at
//! most `(100 / travel_ms) × 20` percent. Emergency bypass snaps to the
//! goal in one update. The whistle preset offsets from the neutral
//! (closed) position to vent steam audibly.
//!
//! After two seconds without motion the PWM drive is cut to eliminate
//! servo holding current; any new goal restores it.

use crate::app::ports::ActuatorPort;
use crate::config::TICK_MS;
use crate::error::ActuatorError;
use log::warn;

/// Servo travel endpoints in regulator percent.
const NEUTRAL_PCT: f32 = 0.0;
const MAX_PCT: f32 = 100.0;

/// Idle time before the PWM output is cut.
const JITTER_SLEEP_MS: u32 = 2000;

pub struct ServoRegulator {
    current_pct: f32,
    target_pct: f32,
    whistle: bool,
    emergency_bypass: bool,
    travel_time_ms: u32,
    whistle_offset_deg: f32,
    last_motion_ms: u32,
    pwm_active: bool,
}

impl ServoRegulator {
    pub fn new(travel_time_ms: u32, whistle_offset_deg: f32) -> Self {
        Self {
            current_pct: NEUTRAL_PCT,
            target_pct: NEUTRAL_PCT,
            whistle: false,
            emergency_bypass: false,
            travel_time_ms: travel_time_ms.max(1),
            whistle_offset_deg,
            last_motion_ms: 0,
            pwm_active: true,
        }
    }

    /// Set the goal position. Out-of-range input is clamped, never an
    /// error. `whistle` overrides the position with the whistle preset.
    ///
    /// Repeating the current goal is a no-op, so the per-tick caller
    /// does not defeat the jitter sleep; a changed goal restores drive.
    pub fn set_goal(&mut self, pct: f32, whistle: bool) {
        let pct = pct.clamp(0.0, 100.0);
        if (pct - self.target_pct).abs() > f32::EPSILON || whistle != self.whistle {
            self.pwm_active = true;
        }
        self.target_pct = pct;
        self.whistle = whistle;
    }

    /// Arm the bypass: the next `update` snaps straight to the goal.
    pub fn set_emergency_bypass(&mut self) {
        self.emergency_bypass = true;
    }

    /// Live CV49 update.
    pub fn set_travel_time(&mut self, ms: u32) {
        self.travel_time_ms = ms.max(1);
    }

    /// Live CV51 update.
    pub fn set_whistle_offset(&mut self, deg: f32) {
        self.whistle_offset_deg = deg;
    }

    /// Maximum per-tick position change in percent.
    pub fn max_step_pct(&self) -> f32 {
        100.0 / self.travel_time_ms as f32 * TICK_MS as f32
    }

    /// Whistle preset position: neutral plus the configured offset,
    /// expressed over a 90-degree servo quadrant.
    pub fn whistle_position_pct(&self) -> f32 {
        NEUTRAL_PCT + self.whistle_offset_deg * (MAX_PCT - NEUTRAL_PCT) / 90.0
    }

    /// One tick of motion toward the goal.
    ///
    /// A driver failure forces the duty to the closed position; the
    /// caller records the HIGH-priority event.
    pub fn update(&mut self, now_ms: u32, hw: &mut dyn ActuatorPort) -> Result<(), ActuatorError> {
        let goal = if self.whistle {
            self.whistle_position_pct()
        } else {
            self.target_pct
        };

        let previous = self.current_pct;

        if self.emergency_bypass {
            self.current_pct = goal;
            self.emergency_bypass = false;
        } else {
            let step = self.max_step_pct();
            let delta = goal - self.current_pct;
            self.current_pct += delta.clamp(-step, step);
        }

        if (self.current_pct - previous).abs() > f32::EPSILON {
            self.last_motion_ms = now_ms;
            self.pwm_active = true;
        } else if self.pwm_active
            && now_ms.wrapping_sub(self.last_motion_ms) >= JITTER_SLEEP_MS
        {
            hw.cut_servo_pwm();
            self.pwm_active = false;
            return Ok(());
        }

        if !self.pwm_active {
            return Ok(());
        }

        if let Err(e) = hw.set_servo_pct(self.current_pct) {
            warn!("servo write failed ({e}) — forcing closed");
            self.current_pct = NEUTRAL_PCT;
            self.target_pct = NEUTRAL_PCT;
            let _ = hw.set_servo_pct(NEUTRAL_PCT);
            return Err(e);
        }
        Ok(())
    }

    pub fn current_pct(&self) -> f32 {
        self.current_pct
    }

    pub fn target_pct(&self) -> f32 {
        self.target_pct
    }

    pub fn is_pwm_active(&self) -> bool {
        self.pwm_active
    }
}
