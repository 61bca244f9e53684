//! DCC packet-layer state.
//!
//! The electrical bitstream decoder (outside this crate) delivers
//! validated packets from ISR context via [`publish_packet`]. The
//! command state is multi-word, so the producer writes it inside a
//! bounded critical section and the control loop samples a
//! self-consistent snapshot at tick start. The E-STOP latch (function
//! F12) is a separate atomic so the orchestrator can observe-and-clear
//! it without re-entering the critical section.
//!
//! Single-producer discipline: only the decoder callback writes command
//! state; only the control loop consumes the E-STOP latch.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;

/// F12 is the operator emergency-stop function.
pub const ESTOP_FUNCTION: u8 = 12;

/// Last-decoded command state. `functions` carries F0..F12 as bits 0..12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DccCommand {
    /// Speed step 0..=127 (short-address 128-step schema).
    pub speed_step: u8,
    /// Direction bit: true = forward.
    pub forward: bool,
    /// Function bitmap F0..F12.
    pub functions: u16,
    /// Millisecond timestamp of the packet that produced this state.
    pub received_ms: u32,
}

impl Default for DccCommand {
    fn default() -> Self {
        Self {
            speed_step: 0,
            forward: true,
            functions: 0,
            received_ms: 0,
        }
    }
}

impl DccCommand {
    pub fn function(&self, n: u8) -> bool {
        n <= 12 && self.functions & (1 << n) != 0
    }
}

static LAST_COMMAND: Mutex<Cell<DccCommand>> = Mutex::new(Cell::new(DccCommand {
    speed_step: 0,
    forward: true,
    functions: 0,
    received_ms: 0,
}));

static ESTOP_LATCH: AtomicBool = AtomicBool::new(false);

static PACKET_SEEN: AtomicBool = AtomicBool::new(false);

/// Producer side: called by the decoder for every accepted packet
/// addressed to this locomotive. Bounded to a few microseconds.
pub fn publish_packet(speed_step: u8, forward: bool, functions: u16, now_ms: u32) {
    let cmd = DccCommand {
        speed_step: speed_step.min(127),
        forward,
        functions: functions & 0x1FFF,
        received_ms: now_ms,
    };
    critical_section::with(|cs| LAST_COMMAND.borrow(cs).set(cmd));
    PACKET_SEEN.store(true, Ordering::Release);
    if cmd.function(ESTOP_FUNCTION) {
        ESTOP_LATCH.store(true, Ordering::Release);
    }
}

/// Consumer side: self-consistent copy of the last command state.
pub fn snapshot() -> DccCommand {
    critical_section::with(|cs| LAST_COMMAND.borrow(cs).get())
}

/// Observe-and-clear the E-STOP latch. Idempotent within a tick.
pub fn take_estop() -> bool {
    ESTOP_LATCH.swap(false, Ordering::AcqRel)
}

/// Whether any packet has arrived since boot (or the last reset).
pub fn packet_seen() -> bool {
    PACKET_SEEN.load(Ordering::Acquire)
}

/// Reset all packet-layer state. Test and boot hook.
pub fn reset() {
    critical_section::with(|cs| LAST_COMMAND.borrow(cs).set(DccCommand::default()));
    ESTOP_LATCH.store(false, Ordering::Release);
    PACKET_SEEN.store(false, Ordering::Release);
}

/// Freshness policy over the packet-layer state.
pub struct DccMonitor;

impl DccMonitor {
    /// Active ⇔ at least one packet has arrived and the newest one is
    /// within the configured timeout. Wrapping arithmetic keeps this
    /// correct across millisecond-counter rollover.
    pub fn is_active(cmd: &DccCommand, now_ms: u32, timeout_ms: u32) -> bool {
        PACKET_SEEN.load(Ordering::Acquire) && now_ms.wrapping_sub(cmd.received_ms) <= timeout_ms
    }

    /// Milliseconds since the last valid packet.
    pub fn staleness_ms(cmd: &DccCommand, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(cmd.received_ms)
    }
}

/// Serialises tests that touch the packet-layer statics.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_snapshot_round_trips() {
        let _g = test_lock();
        reset();
        publish_packet(64, true, 0b1, 1000);
        let cmd = snapshot();
        assert_eq!(cmd.speed_step, 64);
        assert!(cmd.forward);
        assert!(cmd.function(0));
        assert!(!cmd.function(12));
        assert_eq!(cmd.received_ms, 1000);
    }

    #[test]
    fn speed_step_is_clamped() {
        let _g = test_lock();
        reset();
        publish_packet(200, false, 0, 0);
        assert_eq!(snapshot().speed_step, 127);
    }

    #[test]
    fn f12_sets_estop_latch_once() {
        let _g = test_lock();
        reset();
        publish_packet(30, true, 1 << ESTOP_FUNCTION, 500);
        assert!(take_estop());
        assert!(!take_estop()); // cleared by the first observation
    }

    #[test]
    fn activity_tracks_timeout() {
        let _g = test_lock();
        reset();
        publish_packet(10, true, 0, 10_000);
        let cmd = snapshot();
        assert!(DccMonitor::is_active(&cmd, 12_000, 5000));
        assert!(!DccMonitor::is_active(&cmd, 15_001, 5000));
    }

    #[test]
    fn no_packet_means_inactive() {
        let _g = test_lock();
        reset();
        let cmd = snapshot();
        assert!(!DccMonitor::is_active(&cmd, 0, 5000));
    }

    #[test]
    fn staleness_survives_counter_wrap() {
        let _g = test_lock();
        reset();
        publish_packet(10, true, 0, u32::MAX - 100);
        let cmd = snapshot();
        assert_eq!(DccMonitor::staleness_ms(&cmd, 100), 201);
        assert!(DccMonitor::is_active(&cmd, 100, 5000));
    }
}
