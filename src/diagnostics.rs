//! Crash diagnostics.
//!
//! A panic hook persists a final marker record before the platform
//! panic handler resets the system, so a field unit that reboots
//! overnight leaves evidence behind. Best-effort throughout — a panic
//! handler that itself fails must still fall through to the reset.

use serde::{Deserialize, Serialize};

const CRASH_NAMESPACE: &str = "steamloco";
const CRASH_KEY: &str = "crash";

/// Last-panic record, stored as a self-describing JSON object next to
/// the CV map and the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecord {
    pub uptime_ms: u32,
    pub reason: heapless::String<96>,
}

impl CrashRecord {
    pub fn new(uptime_ms: u32, reason: &str) -> Self {
        let mut r = heapless::String::new();
        for ch in reason.chars() {
            if r.push(ch).is_err() {
                break;
            }
        }
        Self { uptime_ms, reason: r }
    }
}

/// Write the crash record, replacing any previous one.
pub fn store_crash(
    storage: &mut dyn crate::app::ports::StoragePort,
    record: &CrashRecord,
) {
    if let Ok(bytes) = serde_json::to_vec(record) {
        let _ = storage.write(CRASH_NAMESPACE, CRASH_KEY, &bytes);
    }
}

/// Read back the last crash record, if one exists.
pub fn last_crash(storage: &dyn crate::app::ports::StoragePort) -> Option<CrashRecord> {
    let mut buf = [0u8; 256];
    let len = storage.read(CRASH_NAMESPACE, CRASH_KEY, &mut buf).ok()?;
    serde_json::from_slice(&buf[..len]).ok()
}

/// Install a panic hook that persists crash info before reset.
///
/// Must be called once during init, after NVS is ready. On panic,
/// captures the reason string and writes a [`CrashRecord`] before the
/// default handler aborts.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: esp_timer_get_time is a simple counter read with no
            // dynamic allocation; safe in panic context. We rely on the
            // NVS session established in main(); if it was never
            // initialised the write silently fails, which is acceptable.
            let uptime_ms =
                ((unsafe { esp_idf_svc::sys::esp_timer_get_time() }) / 1000) as u32;
            if let Ok(mut storage) = crate::adapters::storage::StorageAdapter::new() {
                store_crash(&mut storage, &CrashRecord::new(uptime_ms, reason));
            } else {
                log::error!("panic handler: NVS unavailable — crash record lost");
            }
        }
    }));
}
