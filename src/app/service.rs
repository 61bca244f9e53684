//! Control orchestrator — the 50 Hz cooperative scheduler.
//!
//! [`ControlService`] owns every subsystem instance for the life of the
//! program and sequences one tick through the fixed stage order:
//!
//! ```text
//!  cached reads → sensor health → E-STOP → watchdog → velocity
//!  → servo slew → pressure PID (2 Hz) → telemetry (1 Hz) → one
//!  inbound command → background workers → loop counter
//! ```
//!
//! Subsystems never reach back into the orchestrator: the watchdog
//! signals shutdown through its return value, and everything else
//! receives call-scoped port references. The frame-boundary sleep
//! lives in `main` — the service itself never blocks outside the
//! shutdown sequence.

use log::warn;

use crate::config::{CvStore, PID_TICK_DIVIDER, TELEMETRY_TICK_DIVIDER};
use crate::control::degraded::DecelProfile;
use crate::control::physics;
use crate::control::pressure::PressureController;
use crate::control::regulator::ServoRegulator;
use crate::dcc;
use crate::error::ShutdownCause;
use crate::events::{EventKind, EventRing};
use crate::link::{self, CvCommand, TelemetryLink, TelemetryReport};
use crate::safety::{SafetyWatchdog, ShutdownController, WatchdogInputs, WatchdogMode};
use crate::sensors::{SensorSnapshot, SensorSuite};
use crate::workers::cached::CachedSensorReader;
use crate::workers::encoder::EncoderTracker;
use crate::workers::file_queue::{FileWriteQueue, WriteJob, WritePriority};
use crate::workers::heap::HeapMonitor;
use crate::workers::print_queue::PrintQueue;

use super::ports::{ActuatorPort, LinkPort, SensorBus, StoragePort, SystemPort};

/// PID step interval in seconds (10 ticks at 50 Hz).
const PID_DT_S: f32 = 0.5;

/// What one tick concluded. `ShutDown` is terminal on hardware (the
/// system port deep-sleeps); mocks return so tests can assert on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    /// Operator E-STOP closed the regulator this tick.
    EstopClosed,
    ShutDown(ShutdownCause),
}

pub struct ControlService {
    cvs: CvStore,
    ring: EventRing,
    suite: SensorSuite,
    cached: CachedSensorReader,
    watchdog: SafetyWatchdog,
    shutdown: ShutdownController,
    pressure: PressureController,
    servo: ServoRegulator,
    decel: Option<DecelProfile>,
    print_queue: PrintQueue,
    file_queue: FileWriteQueue,
    heap: HeapMonitor,
    encoder: EncoderTracker,
    link: TelemetryLink,
    loop_count: u32,
    boot_ms: u32,
    /// Commanded velocity going out of the previous tick; the watchdog
    /// stamps it into DEGRADED entry.
    commanded_cms: f32,
    last_snapshot: SensorSnapshot,
}

impl ControlService {
    pub fn new(cvs: CvStore, boot_ms: u32) -> Self {
        let servo = ServoRegulator::new(cvs.servo_travel_ms(), cvs.whistle_offset_deg());
        let pressure = PressureController::new(cvs.target_pressure_psi());
        let heap = HeapMonitor::new(cvs.heap_low_threshold_bytes());
        Self {
            cvs,
            ring: EventRing::new(),
            suite: SensorSuite::new(),
            cached: CachedSensorReader::new(),
            watchdog: SafetyWatchdog::new(),
            shutdown: ShutdownController::new(),
            pressure,
            servo,
            decel: None,
            print_queue: PrintQueue::new(),
            file_queue: FileWriteQueue::new(),
            heap,
            encoder: EncoderTracker::new(boot_ms),
            link: TelemetryLink::new(),
            loop_count: 0,
            boot_ms,
            commanded_cms: 0.0,
            last_snapshot: SensorSnapshot::default(),
        }
    }

    /// Record the boot marker and arm the pressure controller. Called
    /// once after construction, before the first tick.
    pub fn startup(&mut self, now_ms: u32) {
        self.ring.record(now_ms, EventKind::Boot, env!("CARGO_PKG_VERSION"));
        self.pressure.enable();
    }

    /// Run one full control cycle.
    #[allow(clippy::too_many_lines)]
    pub fn tick(
        &mut self,
        now_ms: u32,
        hw: &mut (impl SensorBus + ActuatorPort),
        link_port: &mut dyn LinkPort,
        storage: &mut dyn StoragePort,
        sys: &mut dyn SystemPort,
    ) -> TickOutcome {
        // 1–2. Refresh the cached raw frame (amortised bus acquisition).
        self.cached.refresh_if_stale(now_ms, hw);

        // 3. Validate and publish this tick's snapshot.
        let snapshot = self.suite.ingest(self.cached.frame());
        self.last_snapshot = snapshot;

        // 4. Operator E-STOP wins over everything else this tick.
        if dcc::take_estop() {
            self.shutdown.force_close(now_ms, &mut self.servo, hw);
            // Ring-only record (force-close never flushes the log); the
            // cause string is the same one the event-log contract uses.
            self.ring
                .record(now_ms, EventKind::Estop, ShutdownCause::UserEstop.as_str());
            self.print_queue.enqueue("E-STOP: regulator closed");
            self.commanded_cms = 0.0;
            return TickOutcome::EstopClosed;
        }

        // 5. Safety watchdog.
        let dcc_cmd = dcc::snapshot();
        let staleness = if dcc::packet_seen() {
            dcc::DccMonitor::staleness_ms(&dcc_cmd, now_ms)
        } else {
            now_ms.wrapping_sub(self.boot_ms)
        };
        let prev_mode = self.watchdog.mode();
        let verdict = self.watchdog.check(
            &WatchdogInputs {
                snapshot: &snapshot,
                degraded_channels: self.suite.failed_channel_count(),
                dcc_staleness_ms: staleness,
                free_heap_bytes: sys.free_heap_bytes(),
                current_speed_cms: self.commanded_cms,
                now_ms,
            },
            &self.cvs,
        );

        if let Some(cause) = verdict {
            self.shutdown.die(
                cause,
                now_ms,
                &mut self.servo,
                &mut self.pressure,
                &mut self.ring,
                hw,
                storage,
                sys,
            );
            return TickOutcome::ShutDown(cause);
        }

        self.note_mode_transition(prev_mode, now_ms);

        // 6. Commanded velocity: degraded override or physics chain.
        let (goal_pct, velocity, whistle) = match (self.watchdog.mode(), self.decel) {
            (WatchdogMode::Degraded { .. }, Some(profile)) => {
                let v = profile.commanded_velocity(now_ms);
                let pct = physics::velocity_to_regulator(
                    v,
                    self.cvs.prototype_kph(),
                    self.cvs.scale_ratio(),
                );
                (pct, v, profile.distress_whistle_active(now_ms))
            }
            _ => {
                let pct = physics::apply_pressure_compensation(
                    physics::dcc_to_regulator(dcc_cmd.speed_step),
                    snapshot.pressure_psi,
                    self.cvs.max_pressure_psi(),
                );
                let v = physics::regulator_to_velocity(
                    pct,
                    self.cvs.prototype_kph(),
                    self.cvs.scale_ratio(),
                );
                (pct, v, false)
            }
        };
        self.commanded_cms = velocity;

        // 7. Slew-rate-limited servo update (closed when not moving).
        let goal = if velocity <= 0.0 { 0.0 } else { goal_pct };
        self.servo.set_goal(goal, whistle);
        if self.servo.update(now_ms, hw).is_err() {
            self.ring
                .record(now_ms, EventKind::ServoFault, "PWM write failed");
        }

        // 8. Pressure regulation at 2 Hz.
        if self.loop_count % PID_TICK_DIVIDER == 0 {
            self.pressure.update(snapshot.pressure_psi, PID_DT_S, hw);
        }

        // 9. Telemetry at 1 Hz; one outbound frame per tick either way.
        if self.loop_count % TELEMETRY_TICK_DIVIDER == 0 {
            let measured = self.encoder.velocity(now_ms);
            self.link.enqueue_frame(link::build_frame(&TelemetryReport {
                velocity_cms: self.commanded_cms,
                pressure_psi: snapshot.pressure_psi,
                boiler_c: snapshot.boiler_c,
                superheater_c: snapshot.superheater_c,
                logic_c: snapshot.logic_c,
                servo_pct: self.servo.current_pct(),
                dcc_step: dcc_cmd.speed_step,
                loop_count: self.loop_count,
                measured_cms: measured,
            }));
        }
        self.link.pump_rx(link_port);
        self.link.process(link_port);

        // 10. At most one inbound command per tick.
        if let Some(line) = self.link.next_command() {
            self.handle_command_line(&line, now_ms);
        }

        // 11. Background workers.
        self.print_queue.tick(now_ms);
        if self.file_queue.tick(now_ms, storage).is_err() {
            self.ring
                .record(now_ms, EventKind::PersistFault, "deferred write failed");
        }
        self.heap.tick(now_ms, sys);

        // 12. Loop counter. (13 — the frame sleep — belongs to main.)
        self.loop_count = self.loop_count.wrapping_add(1);

        TickOutcome::Running
    }

    /// The frame deadline was missed; record it and carry on. Repeated
    /// overruns show up externally as a telemetry frequency drop.
    pub fn record_overrun(&mut self, now_ms: u32, over_by_ms: u32) {
        warn!("control loop overran its frame by {over_by_ms} ms");
        let mut detail = heapless::String::<64>::new();
        let _ = core::fmt::Write::write_fmt(
            &mut detail,
            format_args!("over by {over_by_ms} ms"),
        );
        self.ring.record(now_ms, EventKind::LoopOverrun, &detail);
    }

    // ── Internal ──────────────────────────────────────────────

    fn note_mode_transition(&mut self, prev: WatchdogMode, now_ms: u32) {
        let current = self.watchdog.mode();
        match (prev, current) {
            (
                WatchdogMode::Nominal,
                WatchdogMode::Degraded {
                    initial_speed_cms, ..
                },
            ) => {
                self.decel = Some(DecelProfile::start(
                    now_ms,
                    initial_speed_cms,
                    self.cvs.decel_rate_cms2(),
                ));
                let channel = self
                    .suite
                    .first_degraded()
                    .map_or("unknown", |c| c.name());
                self.ring
                    .record(now_ms, EventKind::DegradedEntered, channel);
                self.print_queue
                    .enqueue("sensor fault: decelerating to stop");
            }
            (WatchdogMode::Degraded { .. }, WatchdogMode::Nominal) => {
                self.decel = None;
                self.ring.record(now_ms, EventKind::DegradedRecovered, "");
                self.print_queue.enqueue("sensor recovered: resuming");
            }
            _ => {}
        }
    }

    fn handle_command_line(&mut self, line: &str, now_ms: u32) {
        let command = match link::parse_cv_command(line) {
            Ok(c) => c,
            Err(_) => {
                self.ring
                    .record(now_ms, EventKind::BleCvRejected, "parse error");
                self.print_queue.enqueue("rejected: not a CV command");
                return;
            }
        };
        self.apply_cv_command(&command, now_ms);
    }

    fn apply_cv_command(&mut self, command: &CvCommand, now_ms: u32) {
        match self.cvs.validate_and_update(command.id, &command.raw_value) {
            Ok(confirmation) => {
                self.apply_cv_side_effects(command.id);
                if let Some(payload) = self.cvs.to_json() {
                    let _ = self.file_queue.enqueue(WriteJob {
                        priority: WritePriority::High,
                        namespace: "steamloco",
                        key: "cvs",
                        payload,
                    });
                }
                self.ring
                    .record(now_ms, EventKind::BleCvUpdate, &confirmation);
                self.print_queue.enqueue(&confirmation);
            }
            Err(e) => {
                let mut detail = heapless::String::<64>::new();
                let _ = core::fmt::Write::write_fmt(&mut detail, format_args!("{e}"));
                self.ring
                    .record(now_ms, EventKind::BleCvRejected, &detail);
                self.print_queue.enqueue(&detail);
            }
        }
    }

    /// Push a freshly validated CV into the subsystem that caches it.
    /// Everything else reads the store directly each tick.
    fn apply_cv_side_effects(&mut self, id: u8) {
        match id {
            32 => self.pressure.set_target(self.cvs.target_pressure_psi()),
            49 => self.servo.set_travel_time(self.cvs.servo_travel_ms()),
            51 => self.servo.set_whistle_offset(self.cvs.whistle_offset_deg()),
            90 => self.heap.set_threshold(self.cvs.heap_low_threshold_bytes()),
            _ => {}
        }
    }

    // ── Queries (telemetry, tests, RPC read-back) ─────────────

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn mode(&self) -> WatchdogMode {
        self.watchdog.mode()
    }

    pub fn commanded_velocity_cms(&self) -> f32 {
        self.commanded_cms
    }

    pub fn servo_pct(&self) -> f32 {
        self.servo.current_pct()
    }

    pub fn pressure_target_psi(&self) -> f32 {
        self.pressure.target()
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.last_snapshot
    }

    pub fn cvs(&self) -> &CvStore {
        &self.cvs
    }

    pub fn events(&self) -> &EventRing {
        &self.ring
    }

    /// Inject link bytes directly (adapter RX callbacks use this path).
    pub fn link_mut(&mut self) -> &mut TelemetryLink {
        &mut self.link
    }
}
