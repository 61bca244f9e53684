//! Unified error types for the SteamLoco firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling uniform.
//! All variants are `Copy` so they can be cheaply passed through the safety
//! watchdog and orchestrator without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A sensor could not be read or returned out-of-range data.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// A configuration-variable update was rejected.
    Cv(CvError),
    /// The wireless serial link failed.
    Link(LinkError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Cv(e) => write!(f, "cv: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC read returned an error or timed out.
    AdcReadFailed,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// GPIO set failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration-variable errors
// ---------------------------------------------------------------------------

/// Rejections from `CvStore::validate_and_update`. All four are reported
/// back to the caller; none escalate to shutdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CvError {
    /// No such CV id in the descriptor table.
    UnknownId(u8),
    /// Parsed value lies outside the declared bound.
    OutOfRange { id: u8, min: f32, max: f32 },
    /// Raw value failed to parse as the declared kind.
    ParseError(u8),
    /// Persisting the updated map failed.
    PersistError,
}

impl fmt::Display for CvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "unknown CV {id}"),
            Self::OutOfRange { id, min, max } => {
                write!(f, "CV{id} out of range ({min}..{max})")
            }
            Self::ParseError(id) => write!(f, "CV{id} value failed to parse"),
            Self::PersistError => write!(f, "CV persist failed"),
        }
    }
}

impl From<CvError> for Error {
    fn from(e: CvError) -> Self {
        Self::Cv(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No central connected; nothing to send to.
    NotConnected,
    /// The transmit path is busy or the stack rejected the write.
    TxFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "link not connected"),
            Self::TxFailed => write!(f, "link TX failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Shutdown causes
// ---------------------------------------------------------------------------

/// Closed enumeration of everything that can trigger an emergency shutdown.
///
/// The string form returned by `as_str` is part of the event-log contract:
/// external tooling keys on these exact names, so they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Logic-board temperature exceeded CV41.
    LogicHot,
    /// Boiler shell temperature exceeded CV42 (dry boil risk).
    DryBoil,
    /// Superheater temperature exceeded CV43.
    SuperHot,
    /// No valid DCC packet within CV44 × 100 ms.
    DccLost,
    /// Rectified track voltage below minimum for CV45 × 100 ms.
    PwrLoss,
    /// Free heap fell below the hard floor.
    MemoryExhaustion,
    /// Two or more sensor channels degraded simultaneously.
    CriticalSensor,
    /// Single-channel degraded operation exceeded CV88.
    DegradedTimeout,
    /// Operator E-STOP (DCC function F12).
    UserEstop,
}

impl ShutdownCause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogicHot => "LOGIC_HOT",
            Self::DryBoil => "DRY_BOIL",
            Self::SuperHot => "SUPER_HOT",
            Self::DccLost => "DCC_LOST",
            Self::PwrLoss => "PWR_LOSS",
            Self::MemoryExhaustion => "MEMORY_EXHAUSTION",
            Self::CriticalSensor => "CRITICAL_SENSOR",
            Self::DegradedTimeout => "DEGRADED_TIMEOUT",
            Self::UserEstop => "USER_ESTOP",
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
