//! Hardware adapter: [`SensorBus`] + [`ActuatorPort`] over the real
//! peripherals.
//!
//! Sensor conversions:
//! - Boiler and logic temperatures: NTC thermistor (10 kΩ @ 25 °C,
//!   B = 3950) in a voltage divider, simplified Beta equation.
//! - Superheater: K-type thermocouple through an AD8495 amplifier
//!   (5 mV/°C, 1.25 V cold-junction offset).
//! - Pressure: ratiometric 0.5–4.5 V transducer (0–207 kPa) behind a
//!   2:3 divider.
//! - Track voltage: 11:1 resistive divider off the rectifier.
//!
//! Conversion failures surface as [`SensorError`] — the health trackers
//! downstream treat them identically to out-of-range samples.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads ADC1 via the oneshot API (initialised by hw_init).
//! On host/test: reads from static atomics for injection.

use crate::app::ports::{ActuatorPort, SensorBus};
use crate::drivers::heater::HeaterDriver;
use crate::drivers::hw_init;
use crate::drivers::servo::ServoDriver;
use crate::error::{ActuatorError, SensorError};
use crate::workers::encoder;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

// ── Host-side ADC injection ───────────────────────────────────

#[cfg(not(target_os = "espidf"))]
static SIM_ADC: [AtomicU16; 5] = [
    AtomicU16::new(2048),
    AtomicU16::new(2048),
    AtomicU16::new(2048),
    AtomicU16::new(2048),
    AtomicU16::new(2048),
];

/// Inject a raw ADC value for simulation (index = channel - 4).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_adc(channel: u32, raw: u16) {
    if (4..=8).contains(&channel) {
        SIM_ADC[(channel - 4) as usize].store(raw, Ordering::Relaxed);
    }
}

// ── Conversion constants ──────────────────────────────────────

const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;

// NTC thermistor divider (boiler shell, logic board).
const R25: f32 = 10_000.0;
const BETA: f32 = 3950.0;
const T25_K: f32 = 298.15;
const R_DIVIDER: f32 = 10_000.0;

// AD8495 thermocouple amplifier (superheater).
const TC_OFFSET_V: f32 = 1.25;
const TC_V_PER_C: f32 = 0.005;

// Pressure transducer: 0.5 V → 0 kPa, 4.5 V → 207 kPa, through a 2:3
// divider so 4.5 V lands at 3.0 V on the ADC.
const XDCR_DIVIDER: f32 = 2.0 / 3.0;
const XDCR_ZERO_V: f32 = 0.5;
const XDCR_SPAN_V: f32 = 4.0;
const XDCR_SPAN_KPA: f32 = 207.0;

// Track sense: 11:1 divider.
const TRACK_DIVIDER: f32 = 11.0;

fn adc_volts(raw: u16) -> f32 {
    f32::from(raw) / ADC_MAX * V_REF
}

/// Beta-equation NTC conversion. Rails (open/shorted divider) convert
/// to an impossible reading so the health tracker counts them.
fn ntc_celsius(raw: u16) -> Result<f32, SensorError> {
    let voltage = adc_volts(raw);
    if voltage <= 0.01 || voltage >= (V_REF - 0.01) {
        return Err(SensorError::OutOfRange);
    }
    let r_ntc = R_DIVIDER * voltage / (V_REF - voltage);
    let inv_t = (1.0 / T25_K) + (1.0 / BETA) * (r_ntc / R25).ln();
    if inv_t <= 0.0 {
        return Err(SensorError::OutOfRange);
    }
    Ok((1.0 / inv_t) - 273.15)
}

fn thermocouple_celsius(raw: u16) -> Result<f32, SensorError> {
    let voltage = adc_volts(raw);
    if voltage <= 0.01 || voltage >= (V_REF - 0.01) {
        return Err(SensorError::OutOfRange);
    }
    Ok((voltage - TC_OFFSET_V) / TC_V_PER_C)
}

fn pressure_kpa(raw: u16) -> Result<f32, SensorError> {
    let at_transducer = adc_volts(raw) / XDCR_DIVIDER;
    if at_transducer < 0.1 {
        // Wiring fault: a live transducer never reads below its zero offset.
        return Err(SensorError::OutOfRange);
    }
    Ok((at_transducer - XDCR_ZERO_V) / XDCR_SPAN_V * XDCR_SPAN_KPA)
}

fn track_millivolts(raw: u16) -> u32 {
    (adc_volts(raw) * TRACK_DIVIDER * 1000.0) as u32
}

// ── Adapter ───────────────────────────────────────────────────

pub struct HardwareAdapter {
    servo: ServoDriver,
    heaters: HeaterDriver,
}

impl Default for HardwareAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareAdapter {
    pub fn new() -> Self {
        Self {
            servo: ServoDriver::new(),
            heaters: HeaterDriver::new(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self, channel: u32) -> u16 {
        hw_init::adc1_read(channel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self, channel: u32) -> u16 {
        SIM_ADC[(channel - 4) as usize].load(Ordering::Relaxed)
    }
}

impl SensorBus for HardwareAdapter {
    fn boiler_temp_c(&mut self) -> Result<f32, SensorError> {
        ntc_celsius(self.read_adc(hw_init::ADC1_CH_BOILER_TEMP))
    }

    fn superheater_temp_c(&mut self) -> Result<f32, SensorError> {
        thermocouple_celsius(self.read_adc(hw_init::ADC1_CH_SUPER_TEMP))
    }

    fn logic_temp_c(&mut self) -> Result<f32, SensorError> {
        ntc_celsius(self.read_adc(hw_init::ADC1_CH_LOGIC_TEMP))
    }

    fn pressure_kpa(&mut self) -> Result<f32, SensorError> {
        pressure_kpa(self.read_adc(hw_init::ADC1_CH_PRESSURE))
    }

    fn track_millivolts(&mut self) -> Result<u32, SensorError> {
        Ok(track_millivolts(self.read_adc(hw_init::ADC1_CH_TRACK)))
    }

    fn encoder_count(&self) -> u32 {
        encoder::pulse_count()
    }
}

impl ActuatorPort for HardwareAdapter {
    fn set_servo_pct(&mut self, pct: f32) -> Result<(), ActuatorError> {
        self.servo.set_position_pct(pct);
        Ok(())
    }

    fn cut_servo_pwm(&mut self) {
        self.servo.cut_pwm();
    }

    fn set_heater_duties(&mut self, boiler: f32, superheater: f32) {
        self.heaters.set(boiler, superheater);
    }

    fn heaters_off(&mut self) {
        self.heaters.off();
    }

    fn all_off(&mut self) {
        self.heaters.off();
        self.servo.cut_pwm();
    }
}
