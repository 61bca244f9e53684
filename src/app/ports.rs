//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlService (domain)
//! ```
//!
//! Driven adapters (sensor bus, actuators, storage, link, system) implement
//! these traits. The [`ControlService`](super::service::ControlService)
//! consumes them via generics, so the domain core never touches hardware
//! directly. The orchestrator owns the live adapter instances and hands
//! subsystems non-owning, call-scoped references — no component holds a
//! back-pointer to the orchestrator.

use crate::error::{ActuatorError, LinkError, SensorError};

// ───────────────────────────────────────────────────────────────
// Sensor bus (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Raw channel access. Validation and health tracking live in the
/// domain ([`SensorSuite`](crate::sensors::SensorSuite)); adapters only
/// convert ADC counts to engineering units.
pub trait SensorBus {
    fn boiler_temp_c(&mut self) -> Result<f32, SensorError>;
    fn superheater_temp_c(&mut self) -> Result<f32, SensorError>;
    fn logic_temp_c(&mut self) -> Result<f32, SensorError>;
    /// Boiler pressure as the transducer reports it, in kPa.
    fn pressure_kpa(&mut self) -> Result<f32, SensorError>;
    /// Rectified track voltage in millivolts.
    fn track_millivolts(&mut self) -> Result<u32, SensorError>;
    /// Monotonically increasing wheel-encoder pulse count (ISR-fed).
    fn encoder_count(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command actuators.
/// The servo and heater PWM channels are owned by the regulator and
/// pressure controller respectively; nothing else writes them.
pub trait ActuatorPort {
    /// Position the regulator servo (0 = closed, 100 = fully open).
    fn set_servo_pct(&mut self, pct: f32) -> Result<(), ActuatorError>;

    /// Cut the servo PWM entirely (no holding current).
    fn cut_servo_pwm(&mut self);

    /// Drive the two heating elements; duty in [0, 1] each.
    fn set_heater_duties(&mut self, boiler: f32, superheater: f32);

    /// Immediately de-energise both heaters.
    fn heaters_off(&mut self);

    /// Kill every actuator — safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the CV map and the event log.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Wireless serial link (bidirectional, newline-delimited ASCII)
// ───────────────────────────────────────────────────────────────

/// Transport for the telemetry/command link. Both directions are
/// non-blocking: `try_send` either accepts the whole line or fails,
/// and `poll_rx` drains whatever bytes have arrived since the last call.
pub trait LinkPort {
    /// Queue one newline-terminated frame for transmission.
    fn try_send(&mut self, line: &str) -> Result<(), LinkError>;

    /// Copy received bytes into `buf`, returning how many were written.
    fn poll_rx(&mut self, buf: &mut [u8]) -> usize;
}

// ───────────────────────────────────────────────────────────────
// System port (heap, delays, deep sleep)
// ───────────────────────────────────────────────────────────────

/// Platform services that are neither sensors nor actuators.
pub trait SystemPort {
    /// Free heap in bytes.
    fn free_heap_bytes(&self) -> u32;

    /// Best-effort heap reclamation (allocator trim / cache purge).
    fn reclaim_heap(&mut self);

    /// Blocking delay. Only the shutdown sequence and the frame-boundary
    /// sleep may call this.
    fn delay_ms(&mut self, ms: u32);

    /// Enter deep sleep. On hardware this never returns — an external
    /// reset is required to resume. Mock implementations record the call.
    fn deep_sleep(&mut self);
}
