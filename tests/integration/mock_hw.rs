//! Mock adapters for integration tests.
//!
//! Record every actuator, storage, link, and system call so tests can
//! assert on the full command history without touching real peripherals.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use steamloco::app::ports::{
    ActuatorPort, LinkPort, SensorBus, StorageError, StoragePort, SystemPort,
};
use steamloco::{ActuatorError, LinkError, SensorError};

/// Serialises tests that drive the process-wide DCC / encoder statics.
pub fn isr_state_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── MockHardware: SensorBus + ActuatorPort ───────────────────

pub struct MockHardware {
    // Injected sensor values.
    pub boiler_c: Result<f32, SensorError>,
    pub superheater_c: Result<f32, SensorError>,
    pub logic_c: Result<f32, SensorError>,
    pub pressure_kpa: Result<f32, SensorError>,
    pub track_mv: Result<u32, SensorError>,

    // Recorded actuator history.
    pub servo_writes: Vec<f32>,
    pub servo_fail: bool,
    pub heater_calls: Vec<(f32, f32)>,
    pub heaters_off_calls: usize,
    pub pwm_cut_calls: usize,
}

#[allow(dead_code)]
impl MockHardware {
    /// A healthy cruising locomotive: 18 PSI, sane temperatures.
    pub fn cruising() -> Self {
        Self {
            boiler_c: Ok(95.0),
            superheater_c: Ok(180.0),
            logic_c: Ok(44.0),
            pressure_kpa: Ok(124.1), // ≈ 18.0 PSI
            track_mv: Ok(14_500),
            servo_writes: Vec::new(),
            servo_fail: false,
            heater_calls: Vec::new(),
            heaters_off_calls: 0,
            pwm_cut_calls: 0,
        }
    }

    pub fn last_servo_pct(&self) -> Option<f32> {
        self.servo_writes.last().copied()
    }
}

impl SensorBus for MockHardware {
    fn boiler_temp_c(&mut self) -> Result<f32, SensorError> {
        self.boiler_c
    }
    fn superheater_temp_c(&mut self) -> Result<f32, SensorError> {
        self.superheater_c
    }
    fn logic_temp_c(&mut self) -> Result<f32, SensorError> {
        self.logic_c
    }
    fn pressure_kpa(&mut self) -> Result<f32, SensorError> {
        self.pressure_kpa
    }
    fn track_millivolts(&mut self) -> Result<u32, SensorError> {
        self.track_mv
    }
    fn encoder_count(&self) -> u32 {
        steamloco::workers::encoder::pulse_count()
    }
}

impl ActuatorPort for MockHardware {
    fn set_servo_pct(&mut self, pct: f32) -> Result<(), ActuatorError> {
        if self.servo_fail {
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.servo_writes.push(pct);
        Ok(())
    }
    fn cut_servo_pwm(&mut self) {
        self.pwm_cut_calls += 1;
    }
    fn set_heater_duties(&mut self, boiler: f32, superheater: f32) {
        self.heater_calls.push((boiler, superheater));
    }
    fn heaters_off(&mut self) {
        self.heaters_off_calls += 1;
    }
    fn all_off(&mut self) {
        self.heaters_off_calls += 1;
        self.pwm_cut_calls += 1;
    }
}

// ── MockStorage ───────────────────────────────────────────────

#[derive(Default)]
pub struct MockStorage {
    pub data: RefCell<HashMap<String, Vec<u8>>>,
    pub fail_writes: bool,
}

impl StoragePort for MockStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.data.borrow().get(&format!("{ns}::{key}")) {
            Some(v) => {
                let len = v.len().min(buf.len());
                buf[..len].copy_from_slice(&v[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }
    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.data
            .borrow_mut()
            .insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }
    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.data.borrow_mut().remove(&format!("{ns}::{key}"));
        Ok(())
    }
    fn exists(&self, ns: &str, key: &str) -> bool {
        self.data.borrow().contains_key(&format!("{ns}::{key}"))
    }
}

// ── MockLink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    pub sent: Vec<String>,
    pub rx: Vec<u8>,
    pub fail_sends: bool,
}

impl MockLink {
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }
}

impl LinkPort for MockLink {
    fn try_send(&mut self, line: &str) -> Result<(), LinkError> {
        if self.fail_sends {
            return Err(LinkError::TxFailed);
        }
        self.sent.push(line.to_string());
        Ok(())
    }
    fn poll_rx(&mut self, buf: &mut [u8]) -> usize {
        let n = self.rx.len().min(buf.len());
        buf[..n].copy_from_slice(&self.rx[..n]);
        self.rx.drain(..n);
        n
    }
}

// ── MockSystem ────────────────────────────────────────────────

pub struct MockSystem {
    pub free_heap: u32,
    pub delays: Vec<u32>,
    pub deep_sleeps: usize,
    pub reclaims: usize,
}

impl Default for MockSystem {
    fn default() -> Self {
        Self {
            free_heap: 200 * 1024,
            delays: Vec::new(),
            deep_sleeps: 0,
            reclaims: 0,
        }
    }
}

impl SystemPort for MockSystem {
    fn free_heap_bytes(&self) -> u32 {
        self.free_heap
    }
    fn reclaim_heap(&mut self) {
        self.reclaims += 1;
    }
    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
    fn deep_sleep(&mut self) {
        self.deep_sleeps += 1;
    }
}
