//! SteamLoco Firmware — Main Entry Point
//!
//! Hexagonal architecture around a fixed-period control loop:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter      StorageAdapter    SerialLinkAdapter      │
//! │  (SensorBus+Actuator) (StoragePort)     (LinkPort)             │
//! │  MonotonicClock       SystemAdapter                            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           ControlService (pure logic, 50 Hz)           │    │
//! │  │  Sensors · Watchdog · Physics · PID · Servo · Workers  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{error, info, warn};

use steamloco::adapters::hardware::HardwareAdapter;
use steamloco::adapters::serial_link::SerialLinkAdapter;
use steamloco::adapters::storage::StorageAdapter;
use steamloco::adapters::system::SystemAdapter;
use steamloco::adapters::time::MonotonicClock;
use steamloco::app::ports::SystemPort;
use steamloco::app::service::{ControlService, TickOutcome};
use steamloco::config::{CvStore, TICK_MS};
use steamloco::drivers::hw_init;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init().context("logger init")?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SteamLoco v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    info!("build {}", option_env!("BUILD_TIMESTAMP").unwrap_or("untimestamped"));

    // ── 2. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {} — continuing without encoder", e);
    }

    // ── 3. Storage and configuration ──────────────────────────
    let mut storage = match StorageAdapter::new() {
        Ok(s) => s,
        Err(e) => {
            warn!("NVS init failed ({e}); halting — CVs cannot be trusted");
            anyhow::bail!("storage init failed");
        }
    };
    steamloco::diagnostics::install_panic_handler();
    if let Some(crash) = steamloco::diagnostics::last_crash(&storage) {
        warn!(
            "previous run panicked at {} ms: {}",
            crash.uptime_ms, crash.reason
        );
    }

    let cvs = CvStore::load(&mut storage);
    info!("CV store ready (address {})", cvs.dcc_address());

    // ── 4. Adapters and the control service ───────────────────
    let clock = MonotonicClock::new();
    let mut hw = HardwareAdapter::new();
    let mut link = SerialLinkAdapter::new().map_err(|e| anyhow::anyhow!("link init: {e}"))?;
    let mut sys = SystemAdapter::new();

    let boot_ms = clock.now_ms();
    let mut service = ControlService::new(cvs, boot_ms);
    service.startup(boot_ms);

    info!("entering 50 Hz control loop");

    // ── 5. 50 Hz cooperative loop ─────────────────────────────
    loop {
        let tick_start = clock.now_ms();

        let outcome = service.tick(tick_start, &mut hw, &mut link, &mut storage, &mut sys);

        match outcome {
            TickOutcome::Running | TickOutcome::EstopClosed => {}
            TickOutcome::ShutDown(cause) => {
                // Unreachable on hardware (stage 6 deep-sleeps), but the
                // type is honest about it.
                error!("shutdown completed ({cause}); halting");
                break;
            }
        }

        // Step 13: sleep to the frame boundary.
        let elapsed = clock.now_ms().wrapping_sub(tick_start);
        if elapsed < TICK_MS {
            sys.delay_ms(TICK_MS - elapsed);
        } else {
            service.record_overrun(clock.now_ms(), elapsed - TICK_MS);
        }
    }

    Ok(())
}
