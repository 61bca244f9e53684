//! End-to-end control-loop scenarios against mock adapters.
//!
//! Each test drives `ControlService::tick` through the same stage order
//! the firmware runs on hardware, with time fully injected.

use crate::mock_hw::{isr_state_lock, MockHardware, MockLink, MockStorage, MockSystem};
use steamloco::app::ports::StoragePort;
use steamloco::app::service::{ControlService, TickOutcome};
use steamloco::config::{CvStore, TICK_MS};
use steamloco::dcc;
use steamloco::events::EventKind;
use steamloco::safety::WatchdogMode;
use steamloco::workers::encoder;
use steamloco::{SensorError, ShutdownCause};

struct Rig {
    service: ControlService,
    hw: MockHardware,
    link: MockLink,
    storage: MockStorage,
    sys: MockSystem,
    now: u32,
}

impl Rig {
    /// Fresh rig at t = 0 with default CVs and healthy sensors.
    /// Caller must hold `isr_state_lock`.
    fn new() -> Self {
        dcc::reset();
        encoder::reset_pulses();
        let mut service = ControlService::new(CvStore::defaults(), 0);
        service.startup(0);
        Self {
            service,
            hw: MockHardware::cruising(),
            link: MockLink::default(),
            storage: MockStorage::default(),
            sys: MockSystem::default(),
            now: 0,
        }
    }

    /// One tick, refreshing the DCC command first (the track repeats
    /// packets continuously; the decoder republishes every frame).
    fn tick_with_dcc(&mut self, step: u8, functions: u16) -> TickOutcome {
        dcc::publish_packet(step, true, functions, self.now);
        self.tick()
    }

    fn tick(&mut self) -> TickOutcome {
        let outcome = self.service.tick(
            self.now,
            &mut self.hw,
            &mut self.link,
            &mut self.storage,
            &mut self.sys,
        );
        self.now += TICK_MS;
        outcome
    }

    fn run_cruise(&mut self, ticks: usize, step: u8) {
        for _ in 0..ticks {
            assert_eq!(self.tick_with_dcc(step, 0), TickOutcome::Running);
        }
    }

    fn has_event(&self, kind: EventKind) -> bool {
        self.service.events().iter().any(|e| e.kind == kind)
    }
}

// ── S1: normal cruise ─────────────────────────────────────────

#[test]
fn s1_normal_cruise_reaches_expected_velocity() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(100, 64);

    // Step 64 at 18 PSI / max 25, HO scale, 80 km/h prototype.
    assert!((rig.service.commanded_velocity_cms() - 9.33).abs() < 0.01);
    // Servo settled at the compensated regulator opening.
    assert!((rig.service.servo_pct() - 36.57).abs() < 0.05);
}

#[test]
fn s1_servo_advance_is_slew_limited() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(30, 64);

    // Default travel time 1000 ms → at most 2 % per 20 ms tick.
    for pair in rig.hw.servo_writes.windows(2) {
        assert!(
            (pair[1] - pair[0]).abs() <= 2.0 + 1e-4,
            "slew exceeded: {} → {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn s1_telemetry_frame_goes_out() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(51, 64);

    assert!(!rig.link.sent.is_empty());
    let frame = &rig.link.sent[0];
    assert!(frame.starts_with("V "));
    assert!(frame.contains(" P 18.0 "));
    assert!(frame.ends_with('\n'));
}

// ── S2: operator E-STOP ───────────────────────────────────────

#[test]
fn s2_estop_closes_servo_and_nothing_else() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(50, 64);
    assert!(rig.service.servo_pct() > 10.0);
    let heater_calls_before = rig.hw.heater_calls.len();

    // F12 asserted mid-cruise.
    let outcome = rig.tick_with_dcc(64, 1 << dcc::ESTOP_FUNCTION);
    assert_eq!(outcome, TickOutcome::EstopClosed);

    // Servo snapped closed this very tick, bypassing slew.
    assert_eq!(rig.hw.last_servo_pct(), Some(0.0));
    assert_eq!(rig.service.servo_pct(), 0.0);
    // Heaters untouched, no log flush, no deep sleep.
    assert_eq!(rig.hw.heater_calls.len(), heater_calls_before);
    assert_eq!(rig.hw.heaters_off_calls, 0);
    assert_eq!(rig.sys.deep_sleeps, 0);
    assert!(!rig.storage.exists("steamloco", "evlog"));
    // The ring record carries the event-log contract string, even though
    // force-close never flushes it.
    let estop = rig
        .service
        .events()
        .iter()
        .find(|e| e.kind == EventKind::Estop)
        .expect("E-STOP event recorded");
    assert_eq!(estop.detail.as_str(), "USER_ESTOP");

    // The link stays live: the next tick runs normally.
    assert_eq!(rig.tick_with_dcc(0, 0), TickOutcome::Running);
}

#[test]
fn s2_estop_is_idempotent() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(20, 64);
    let first = rig.tick_with_dcc(64, 1 << dcc::ESTOP_FUNCTION);
    let second = rig.tick_with_dcc(64, 1 << dcc::ESTOP_FUNCTION);
    assert_eq!(first, TickOutcome::EstopClosed);
    assert_eq!(second, TickOutcome::EstopClosed);
    assert_eq!(rig.service.servo_pct(), 0.0);
    assert_eq!(rig.sys.deep_sleeps, 0);
}

// ── S3: boiler over-temperature ───────────────────────────────

#[test]
fn s3_dry_boil_runs_full_six_stage_shutdown() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(20, 64);
    // 110.5 °C against the 110 °C limit (still a valid sample).
    rig.hw.boiler_c = Ok(110.5);

    let outcome = rig.tick_with_dcc(64, 0);
    assert_eq!(outcome, TickOutcome::ShutDown(ShutdownCause::DryBoil));

    // Stage 1: heaters dead within the tick.
    assert!(rig.hw.heaters_off_calls >= 1);
    // Stage 2: whistle position (default offset 45° → 50 %).
    assert!(rig.hw.servo_writes.contains(&50.0));
    // Stage 3: event ring persisted with the cause string.
    let mut buf = [0u8; 4096];
    let n = rig.storage.read("steamloco", "evlog", &mut buf).unwrap();
    let log = core::str::from_utf8(&buf[..n]).unwrap();
    assert!(log.contains("DRY_BOIL"));
    // Stages 2+4 holds, stage 5 PWM cut, stage 6 deep sleep.
    assert_eq!(rig.sys.delays, vec![5000, 500]);
    assert_eq!(rig.hw.last_servo_pct(), Some(0.0));
    assert!(rig.hw.pwm_cut_calls >= 1);
    assert_eq!(rig.sys.deep_sleeps, 1);
}

#[test]
fn s3_second_shutdown_cause_is_ignored() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.hw.boiler_c = Ok(115.0);
    let first = rig.tick_with_dcc(0, 0);
    assert!(matches!(first, TickOutcome::ShutDown(_)));
    // Cause persists; the guard latch makes the next die() a no-op.
    let _ = rig.tick_with_dcc(0, 0);
    assert_eq!(rig.sys.deep_sleeps, 1);
    assert_eq!(rig.sys.delays.len(), 2);
}

// ── S4: single-sensor degrade ─────────────────────────────────

#[test]
fn s4_pressure_fault_decelerates_linearly() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(50, 64);
    let v0 = rig.service.commanded_velocity_cms();
    assert!((v0 - 9.33).abs() < 0.01);

    // Transducer starts reporting an impossible value.
    rig.hw.pressure_kpa = Ok(500.0);

    // Two bad ticks are tolerated; the third marks the channel.
    assert_eq!(rig.tick_with_dcc(64, 0), TickOutcome::Running);
    assert_eq!(rig.tick_with_dcc(64, 0), TickOutcome::Running);
    assert_eq!(rig.service.mode(), WatchdogMode::Nominal);
    assert_eq!(rig.tick_with_dcc(64, 0), TickOutcome::Running);
    let WatchdogMode::Degraded {
        initial_speed_cms, ..
    } = rig.service.mode()
    else {
        panic!("expected DEGRADED mode");
    };
    assert!((initial_speed_cms - v0).abs() < 0.1);
    assert!(rig.has_event(EventKind::DegradedEntered));

    // Half a second in: v ≈ v0 − 10 · 0.5.
    for _ in 0..25 {
        rig.tick_with_dcc(64, 0);
    }
    let v_half = rig.service.commanded_velocity_cms();
    assert!((v_half - (v0 - 5.0)).abs() < 0.3, "got {v_half}");

    // The profile reaches zero and stays there.
    for _ in 0..50 {
        rig.tick_with_dcc(64, 0);
    }
    assert_eq!(rig.service.commanded_velocity_cms(), 0.0);
}

#[test]
fn s4_recovery_before_timeout_resumes_normal_control() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(50, 64);
    rig.hw.pressure_kpa = Ok(500.0);
    for _ in 0..5 {
        rig.tick_with_dcc(64, 0);
    }
    assert!(matches!(rig.service.mode(), WatchdogMode::Degraded { .. }));

    // The transducer comes back inside its hard range.
    rig.hw.pressure_kpa = Ok(124.1);
    rig.tick_with_dcc(64, 0);
    assert_eq!(rig.service.mode(), WatchdogMode::Nominal);
    assert!(rig.has_event(EventKind::DegradedRecovered));

    rig.run_cruise(50, 64);
    assert!((rig.service.commanded_velocity_cms() - 9.33).abs() < 0.01);
}

#[test]
fn s4_degraded_timeout_escalates_to_shutdown() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(10, 64);
    rig.hw.pressure_kpa = Ok(500.0);

    // Default CV88 is 30 s; ride it past the bound.
    let mut shutdown = None;
    for _ in 0..(31 * 50) {
        if let TickOutcome::ShutDown(cause) = rig.tick_with_dcc(64, 0) {
            shutdown = Some(cause);
            break;
        }
    }
    assert_eq!(shutdown, Some(ShutdownCause::DegradedTimeout));
    assert_eq!(rig.sys.deep_sleeps, 1);
}

// ── S5: multi-sensor critical ─────────────────────────────────

#[test]
fn s5_two_degraded_channels_shut_down_without_deceleration() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(20, 64);
    rig.hw.boiler_c = Err(SensorError::AdcReadFailed);
    rig.hw.superheater_c = Ok(400.0);

    let mut outcome = TickOutcome::Running;
    for _ in 0..3 {
        outcome = rig.tick_with_dcc(64, 0);
    }
    assert_eq!(outcome, TickOutcome::ShutDown(ShutdownCause::CriticalSensor));
    // Straight to shutdown — no deceleration profile was started.
    assert!(!rig.has_event(EventKind::DegradedEntered));
    assert_eq!(rig.sys.deep_sleeps, 1);
}

// ── S6: live configuration update ─────────────────────────────

#[test]
fn s6_cv_update_applies_persists_and_audits() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(10, 64);
    assert!((rig.service.pressure_target_psi() - 18.0).abs() < f32::EPSILON);

    rig.link.inject(b"CV32=20.0\n");
    rig.tick_with_dcc(64, 0);

    // Same-tick effect on the pressure controller and the store.
    assert!((rig.service.cvs().target_pressure_psi() - 20.0).abs() < f32::EPSILON);
    assert!((rig.service.pressure_target_psi() - 20.0).abs() < f32::EPSILON);
    assert!(rig.has_event(EventKind::BleCvUpdate));
    // Persistence went through the HIGH-priority write queue.
    assert!(rig.storage.exists("steamloco", "cvs"));
}

#[test]
fn s6_out_of_range_cv_is_rejected_and_old_value_kept() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(5, 64);
    rig.link.inject(b"CV32=20.0\n");
    rig.tick_with_dcc(64, 0);

    rig.link.inject(b"CV32=30.0\n");
    rig.tick_with_dcc(64, 0);

    assert!((rig.service.cvs().target_pressure_psi() - 20.0).abs() < f32::EPSILON);
    assert!(rig.has_event(EventKind::BleCvRejected));
}

#[test]
fn s6_garbage_line_is_rejected_with_audit() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.link.inject(b"open the regulator please\n");
    rig.tick_with_dcc(0, 0);
    assert!(rig.has_event(EventKind::BleCvRejected));
}

// ── Cross-cutting behaviours ──────────────────────────────────

#[test]
fn dcc_silence_eventually_shuts_down() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    // One packet at boot, then silence. Default CV44 = 5 s.
    dcc::publish_packet(40, true, 0, 0);
    let mut shutdown = None;
    for _ in 0..(6 * 50) {
        if let TickOutcome::ShutDown(cause) = rig.tick() {
            shutdown = Some(cause);
            break;
        }
    }
    assert_eq!(shutdown, Some(ShutdownCause::DccLost));
}

#[test]
fn track_power_brownout_shuts_down_after_persistence_window() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(10, 40);
    rig.hw.track_mv = Ok(2_000);

    // Default CV45 = 2 s.
    let mut shutdown = None;
    for _ in 0..(3 * 50) {
        if let TickOutcome::ShutDown(cause) = rig.tick_with_dcc(40, 0) {
            shutdown = Some(cause);
            break;
        }
    }
    assert_eq!(shutdown, Some(ShutdownCause::PwrLoss));
}

#[test]
fn zero_speed_step_closes_the_regulator() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(60, 64);
    assert!(rig.service.servo_pct() > 30.0);

    rig.run_cruise(120, 0);
    assert_eq!(rig.service.commanded_velocity_cms(), 0.0);
    assert!(rig.service.servo_pct() < 0.01);
}

#[test]
fn overrun_is_recorded_and_loop_continues() {
    let _g = isr_state_lock();
    let mut rig = Rig::new();

    rig.run_cruise(3, 40);
    rig.service.record_overrun(rig.now, 7);
    assert!(rig.has_event(EventKind::LoopOverrun));
    assert_eq!(rig.tick_with_dcc(40, 0), TickOutcome::Running);
}
