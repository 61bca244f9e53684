//! System adapter: heap introspection, blocking delays, deep sleep.
//!
//! On ESP-IDF these map to `esp_get_free_heap_size`, `vTaskDelay`, and
//! `esp_deep_sleep_start`. On host targets, heap headroom is synthetic
//! (generous, slowly decaying) so the watchdog's memory branch and the
//! reclamation policy exercise the same code paths as hardware.

use crate::app::ports::SystemPort;
use log::info;

pub struct SystemAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    deep_sleeping: bool,
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            deep_sleeping: false,
        }
    }

    /// Host-only: whether deep sleep was requested.
    #[cfg(not(target_os = "espidf"))]
    pub fn is_deep_sleeping(&self) -> bool {
        self.deep_sleeping
    }
}

impl SystemPort for SystemAdapter {
    #[cfg(target_os = "espidf")]
    fn free_heap_bytes(&self) -> u32 {
        // SAFETY: simple counter read, callable from any context.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap_bytes(&self) -> u32 {
        // Synthetic heap that "decays" slightly over time to model
        // fragmentation, mirroring hardware behaviour closely enough to
        // drive the reclamation policy.
        let base: u32 = 307_200; // 300 KiB
        let decay = (self.start.elapsed().as_secs() / 60) as u32 * 512;
        base.saturating_sub(decay)
    }

    #[cfg(target_os = "espidf")]
    fn reclaim_heap(&mut self) {
        // The IDF allocator has no explicit trim; log the low-water mark
        // so repeated reclaims are visible in the field.
        // SAFETY: simple counter read.
        let min_free = unsafe { esp_idf_svc::sys::esp_get_minimum_free_heap_size() };
        info!("heap reclaim: min free since boot {min_free} B");
    }

    #[cfg(not(target_os = "espidf"))]
    fn reclaim_heap(&mut self) {
        info!("heap reclaim (sim)");
    }

    fn delay_ms(&mut self, ms: u32) {
        // On ESP-IDF std sleep maps onto vTaskDelay, yielding the task.
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    #[cfg(target_os = "espidf")]
    fn deep_sleep(&mut self) {
        info!("entering deep sleep — external reset required");
        // SAFETY: terminal call; never returns.
        unsafe { esp_idf_svc::sys::esp_deep_sleep_start() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn deep_sleep(&mut self) {
        info!("deep sleep (sim) — control loop must stop");
        self.deep_sleeping = true;
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn synthetic_heap_is_generous() {
        let sys = SystemAdapter::new();
        assert!(sys.free_heap_bytes() > 100 * 1024);
    }

    #[test]
    fn deep_sleep_sets_flag_on_host() {
        let mut sys = SystemAdapter::new();
        assert!(!sys.is_deep_sleeping());
        sys.deep_sleep();
        assert!(sys.is_deep_sleeping());
    }
}
