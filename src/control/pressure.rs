//! Boiler pressure controller.
//!
//! Closed-loop regulation of boiler pressure against the CV32 target,
//! stepped at 2 Hz. Both resistive elements are driven with the same
//! duty (they are thermally coupled through the boiler; independent
//! channel dynamics are not required). Output is strictly zero while
//! disabled — the state on boot and after any shutdown.
//!
//! The control law is PID shaped for a small boiler:
//!
//! - the derivative acts on the *measured* pressure, not the error, so
//!   a live CV32 target change cannot kick the heaters;
//! - anti-windup clamps the integrator whenever the duty is pinned at a
//!   rail and the error would push it further in, so a long cold heat-up
//!   releases the instant the target is reached instead of overshooting
//!   on a wound-up integrator.

use crate::app::ports::ActuatorPort;
use log::info;

/// Duty per PSI of error.
const GAIN_P: f32 = 0.35;
/// Duty per PSI-second of accumulated error.
const GAIN_I: f32 = 0.02;
/// Duty per PSI/s of measured pressure rise (backs the heat off while
/// the boiler is still climbing).
const GAIN_D: f32 = 0.05;

pub struct PressureController {
    target_psi: f32,
    enabled: bool,
    /// Accumulated error in PSI·s.
    integral_psi_s: f32,
    /// Previous measurement for the rise-rate term.
    last_psi: Option<f32>,
    duty_boiler: f32,
    duty_superheater: f32,
}

impl PressureController {
    pub fn new(target_psi: f32) -> Self {
        Self {
            target_psi,
            enabled: false,
            integral_psi_s: 0.0,
            last_psi: None,
            duty_boiler: 0.0,
            duty_superheater: 0.0,
        }
    }

    /// Arm the controller. Called once boot-time checks pass.
    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.integral_psi_s = 0.0;
            self.last_psi = None;
            info!("pressure controller enabled (target {:.1} PSI)", self.target_psi);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Live target update (CV32).
    pub fn set_target(&mut self, psi: f32) {
        self.target_psi = psi;
    }

    pub fn target(&self) -> f32 {
        self.target_psi
    }

    /// One 2 Hz regulation step: compute duty and commit it to both
    /// heater channels.
    pub fn update(&mut self, current_psi: f32, dt_s: f32, hw: &mut dyn ActuatorPort) {
        if !self.enabled {
            self.duty_boiler = 0.0;
            self.duty_superheater = 0.0;
            hw.set_heater_duties(0.0, 0.0);
            return;
        }

        let error = self.target_psi - current_psi;

        let rise_rate = match self.last_psi {
            Some(prev) if dt_s > 0.0 => (current_psi - prev) / dt_s,
            _ => 0.0,
        };
        self.last_psi = Some(current_psi);

        // Integrator clamp: hold it while the duty is pinned at a rail
        // and the error points further into that rail.
        let provisional =
            GAIN_P * error + GAIN_I * self.integral_psi_s - GAIN_D * rise_rate;
        let pinned_hot = provisional >= 1.0 && error > 0.0;
        let pinned_cold = provisional <= 0.0 && error < 0.0;
        if !pinned_hot && !pinned_cold {
            self.integral_psi_s += error * dt_s;
        }

        let duty = (GAIN_P * error + GAIN_I * self.integral_psi_s - GAIN_D * rise_rate)
            .clamp(0.0, 1.0);
        self.duty_boiler = duty;
        self.duty_superheater = duty;
        hw.set_heater_duties(self.duty_boiler, self.duty_superheater);
    }

    /// Kill both heaters immediately. Idempotent; the first stage of
    /// every emergency shutdown.
    pub fn shutdown(&mut self, hw: &mut dyn ActuatorPort) {
        self.enabled = false;
        self.duty_boiler = 0.0;
        self.duty_superheater = 0.0;
        self.integral_psi_s = 0.0;
        self.last_psi = None;
        hw.heaters_off();
    }

    pub fn duties(&self) -> (f32, f32) {
        (self.duty_boiler, self.duty_superheater)
    }
}
