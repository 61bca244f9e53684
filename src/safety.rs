//! Multi-vector safety watchdog and emergency shutdown orchestrator.
//!
//! The watchdog runs **every tick before the control stages** and screens
//! the thermal, signal, sensor-health, and memory invariants in a fixed
//! order — the first failing check wins. It owns the operating-mode
//! state machine:
//!
//! ```text
//!            ┌─────────── 1 channel degraded ──────────┐
//!            ▼                                          │
//!   NOMINAL ◀── channel recovered before CV88 ── DEGRADED
//!            │                                          │
//!            └── ≥2 channels / timeout / invariant ──▶ CRITICAL
//! ```
//!
//! Only the orchestrator invokes the shutdown path; subsystems signal it
//! through the returned [`ShutdownCause`], never through a back-pointer.
//!
//! Boundary tests are strict `>` throughout: a reading exactly at its
//! limit does not fire.

use crate::app::ports::{ActuatorPort, StoragePort, SystemPort};
use crate::config::CvStore;
use crate::control::pressure::PressureController;
use crate::control::regulator::ServoRegulator;
use crate::error::ShutdownCause;
use crate::events::{EventKind, EventRing};
use crate::sensors::SensorSnapshot;
use log::{error, info, warn};

/// Rectified track voltage below this is treated as power loss.
pub const TRACK_MIN_MV: u32 = 7000;

/// Hard free-heap floor. Below this the system cannot complete a clean
/// shutdown, so it shuts down while it still can.
pub const HEAP_FLOOR_BYTES: u32 = 5 * 1024;

/// Whistle hold during stage 2 of the emergency sequence.
const SHUTDOWN_WHISTLE_MS: u32 = 5000;

/// Settle time after driving the servo closed in stage 4.
const SHUTDOWN_CLOSE_MS: u32 = 500;

// ---------------------------------------------------------------------------
// Operating mode
// ---------------------------------------------------------------------------

/// Watchdog operating mode. DEGRADED carries the data the deceleration
/// profile and the timeout check need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchdogMode {
    Nominal,
    Degraded {
        entered_at_ms: u32,
        initial_speed_cms: f32,
    },
    Critical,
}

/// Per-tick inputs, assembled by the orchestrator from this tick's
/// snapshot. The watchdog holds no references into other subsystems.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogInputs<'a> {
    pub snapshot: &'a SensorSnapshot,
    /// Channels currently DEGRADED (from the sensor suite).
    pub degraded_channels: usize,
    /// Milliseconds since the last valid DCC packet (or since boot if
    /// none has arrived yet).
    pub dcc_staleness_ms: u32,
    pub free_heap_bytes: u32,
    /// Commanded velocity going into this tick; stamped into the mode on
    /// DEGRADED entry so the deceleration profile starts from it.
    pub current_speed_cms: f32,
    pub now_ms: u32,
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

pub struct SafetyWatchdog {
    mode: WatchdogMode,
    /// When the track voltage first dropped below the minimum.
    low_power_since_ms: Option<u32>,
}

impl Default for SafetyWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyWatchdog {
    pub fn new() -> Self {
        Self {
            mode: WatchdogMode::Nominal,
            low_power_since_ms: None,
        }
    }

    pub fn mode(&self) -> WatchdogMode {
        self.mode
    }

    /// Run the invariant scan for one tick. `None` means all clear;
    /// `Some(cause)` obliges the orchestrator to shut down.
    pub fn check(&mut self, inp: &WatchdogInputs<'_>, cvs: &CvStore) -> Option<ShutdownCause> {
        // 1. Multiple unreliable channels: no basis for graceful degradation.
        if inp.degraded_channels >= 2 {
            error!("{} sensor channels degraded simultaneously", inp.degraded_channels);
            self.mode = WatchdogMode::Critical;
            return Some(ShutdownCause::CriticalSensor);
        }

        // 2. Exactly one: enter or continue degraded operation.
        if inp.degraded_channels == 1 {
            if !cvs.degradation_enabled() {
                warn!("degraded operation disabled by CV86 — escalating");
                self.mode = WatchdogMode::Critical;
                return Some(ShutdownCause::CriticalSensor);
            }
            match self.mode {
                WatchdogMode::Degraded { entered_at_ms, .. } => {
                    if inp.now_ms.wrapping_sub(entered_at_ms) > cvs.degraded_timeout_ms() {
                        self.mode = WatchdogMode::Critical;
                        return Some(ShutdownCause::DegradedTimeout);
                    }
                }
                _ => {
                    info!(
                        "entering DEGRADED mode at {:.1} cm/s",
                        inp.current_speed_cms
                    );
                    self.mode = WatchdogMode::Degraded {
                        entered_at_ms: inp.now_ms,
                        initial_speed_cms: inp.current_speed_cms,
                    };
                }
            }
        } else if matches!(self.mode, WatchdogMode::Degraded { .. }) {
            // Channel recovered before the timeout — resume normal control.
            info!("all sensor channels recovered — returning to NOMINAL");
            self.mode = WatchdogMode::Nominal;
        }

        // 3. Thermal limits. Skipped in DEGRADED mode: the snapshot may be
        // carrying cached values for the faulted channel.
        if !matches!(self.mode, WatchdogMode::Degraded { .. }) {
            let snap = inp.snapshot;
            if snap.logic_c > cvs.logic_limit_c() {
                return Some(ShutdownCause::LogicHot);
            }
            if snap.boiler_c > cvs.boiler_limit_c() {
                return Some(ShutdownCause::DryBoil);
            }
            if snap.superheater_c > cvs.superheater_limit_c() {
                return Some(ShutdownCause::SuperHot);
            }
        }

        // 4. DCC signal freshness.
        if inp.dcc_staleness_ms > cvs.dcc_timeout_ms() {
            return Some(ShutdownCause::DccLost);
        }

        // 5. Track power, with a persistence window against pickup bounce.
        if inp.snapshot.track_mv < TRACK_MIN_MV {
            let since = *self.low_power_since_ms.get_or_insert(inp.now_ms);
            if inp.now_ms.wrapping_sub(since) > cvs.track_power_timeout_ms() {
                return Some(ShutdownCause::PwrLoss);
            }
        } else {
            self.low_power_since_ms = None;
        }

        // 6. Memory headroom.
        if inp.free_heap_bytes < HEAP_FLOOR_BYTES {
            return Some(ShutdownCause::MemoryExhaustion);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Shutdown orchestration
// ---------------------------------------------------------------------------

/// Executes the graduated emergency sequence. A latch guarantees the
/// six stages run exactly once — a second cause observed mid-sequence
/// is ignored.
pub struct ShutdownController {
    engaged: bool,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        Self { engaged: false }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Full six-stage emergency shutdown:
    ///
    /// 1. heaters off; 2. servo to whistle (bypass) and hold 5 s;
    /// 3. event ring flushed during the hold, best-effort; 4. servo to
    /// closed (bypass), 500 ms settle; 5. servo PWM cut; 6. deep sleep.
    ///
    /// On hardware stage 6 never returns. Mock system ports record the
    /// call so tests can assert the full ladder ran.
    #[allow(clippy::too_many_arguments)]
    pub fn die(
        &mut self,
        cause: ShutdownCause,
        now_ms: u32,
        regulator: &mut ServoRegulator,
        pressure: &mut PressureController,
        ring: &mut EventRing,
        hw: &mut dyn ActuatorPort,
        storage: &mut dyn StoragePort,
        sys: &mut dyn SystemPort,
    ) {
        if self.engaged {
            return;
        }
        self.engaged = true;
        error!("EMERGENCY SHUTDOWN: {cause}");

        // Stage 1 — kill the heat source first.
        pressure.shutdown(hw);

        // Stage 2 — audible distress: whistle position, bypassing slew.
        regulator.set_goal(0.0, true);
        regulator.set_emergency_bypass();
        let _ = regulator.update(now_ms, hw);

        // Stage 3 — persist the audit trail while the whistle sounds.
        ring.record(now_ms, EventKind::Shutdown, cause.as_str());
        ring.flush(storage);
        sys.delay_ms(SHUTDOWN_WHISTLE_MS);

        // Stage 4 — close the regulator.
        regulator.set_goal(0.0, false);
        regulator.set_emergency_bypass();
        let _ = regulator.update(now_ms.wrapping_add(SHUTDOWN_WHISTLE_MS), hw);
        sys.delay_ms(SHUTDOWN_CLOSE_MS);

        // Stage 5 — no holding current on a closed valve.
        hw.cut_servo_pwm();

        // Stage 6 — terminal.
        sys.deep_sleep();
    }

    /// Operator E-STOP: close the regulator instantly and nothing else.
    /// Heaters keep their state, no log flush, no deep sleep — the
    /// operator retains control and the link stays live. Idempotent.
    pub fn force_close(
        &mut self,
        now_ms: u32,
        regulator: &mut ServoRegulator,
        hw: &mut dyn ActuatorPort,
    ) {
        warn!("operator E-STOP: regulator force-closed");
        regulator.set_goal(0.0, false);
        regulator.set_emergency_bypass();
        let _ = regulator.update(now_ms, hw);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
