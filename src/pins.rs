//! GPIO / peripheral pin assignments for the SteamLoco main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Regulator servo (steam throttle)
// ---------------------------------------------------------------------------

/// LEDC PWM output for the regulator servo signal.
pub const SERVO_PWM_GPIO: i32 = 1;

// ---------------------------------------------------------------------------
// Heating elements (two N-channel MOSFET low-side switches)
// ---------------------------------------------------------------------------

/// LEDC PWM output for the boiler element.
pub const HEATER_BOILER_GPIO: i32 = 2;
/// LEDC PWM output for the superheater element.
pub const HEATER_SUPER_GPIO: i32 = 3;

// ---------------------------------------------------------------------------
// Sensors — Analog (ADC1)
// ---------------------------------------------------------------------------

/// NTC thermistor on the boiler shell — ADC1 channel 4 (GPIO 5).
pub const BOILER_TEMP_ADC_GPIO: i32 = 5;
/// K-type thermocouple amplifier on the superheater — ADC1 channel 5 (GPIO 6).
pub const SUPER_TEMP_ADC_GPIO: i32 = 6;
/// NTC thermistor on the logic board — ADC1 channel 6 (GPIO 7).
pub const LOGIC_TEMP_ADC_GPIO: i32 = 7;
/// Boiler pressure transducer (ratiometric 0.5–4.5 V via divider) — ADC1 channel 7 (GPIO 8).
pub const PRESSURE_ADC_GPIO: i32 = 8;
/// Rectified track voltage via 11:1 divider — ADC1 channel 8 (GPIO 9).
pub const TRACK_SENSE_ADC_GPIO: i32 = 9;

// ---------------------------------------------------------------------------
// Sensors — Digital / Pulse
// ---------------------------------------------------------------------------

/// Hall-effect wheel encoder — pulse output, interrupt-driven.
pub const ENCODER_PULSE_GPIO: i32 = 10;

/// DCC packet strobe from the decoder front-end (one edge per accepted
/// packet; the decoder itself delivers the payload in its callback).
pub const DCC_PACKET_GPIO: i32 = 11;

// ---------------------------------------------------------------------------
// UART debug
// ---------------------------------------------------------------------------

pub const UART_TX_GPIO: i32 = 17;
pub const UART_RX_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// Servo signal frequency (standard RC servo frame rate).
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// Servo LEDC resolution (14-bit gives ~0.3 µs pulse granularity at 50 Hz).
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
/// Heater PWM frequency (1 kHz — resistive load, inaudible is irrelevant).
pub const HEATER_PWM_FREQ_HZ: u32 = 1_000;
/// Heater LEDC resolution (8-bit, 0–255 duty levels).
pub const HEATER_PWM_RESOLUTION_BITS: u32 = 8;

/// Servo pulse endpoints in LEDC counts at 14-bit / 50 Hz.
/// 1.0 ms = closed, 2.0 ms = fully open.
pub const SERVO_DUTY_MIN: u32 = 819; // 1.0 ms
pub const SERVO_DUTY_MAX: u32 = 1638; // 2.0 ms
