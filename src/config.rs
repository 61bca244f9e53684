//! Configuration-variable (CV) store.
//!
//! Every tunable parameter is a numbered CV with a declared bound, unit,
//! and kind. Ids are stable across firmware versions — they are never
//! reassigned. Values persist as a self-describing JSON object keyed by
//! decimal id strings; a missing or corrupt record yields the full
//! default map, which is written back immediately.
//!
//! Updates arrive from two places: boot-time load and live `CV<id>=<value>`
//! commands over the wireless link. Both funnel through
//! [`CvStore::validate_and_update`], which rejects unknown ids, parse
//! failures, and range violations without touching the stored value.

use crate::app::ports::StoragePort;
use crate::error::CvError;
use core::fmt::Write as _;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control loop period. One tick == 20 ms (50 Hz).
pub const TICK_MS: u32 = 20;

/// Pressure PID cadence: every 10 ticks (2 Hz).
pub const PID_TICK_DIVIDER: u32 = 10;

/// Telemetry cadence: every 50 ticks (1 Hz).
pub const TELEMETRY_TICK_DIVIDER: u32 = 50;

const CV_NAMESPACE: &str = "steamloco";
const CV_KEY: &str = "cvs";

// ---------------------------------------------------------------------------
// Value and descriptor types
// ---------------------------------------------------------------------------

/// A CV value is either an integer or a real number, matching the kind
/// declared by its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CvValue {
    Int(i32),
    Float(f32),
}

impl CvValue {
    /// Numeric view used for range checks regardless of kind.
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Int(v) => v as f32,
            Self::Float(v) => v,
        }
    }
}

/// Static description of one CV: bound, unit, kind, default.
pub struct CvDescriptor {
    pub id: u8,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub unit: &'static str,
    /// Integral CVs parse and store as integers; the rest as reals.
    pub integral: bool,
    pub default: CvValue,
}

/// The full descriptor table. Ids are part of the external contract —
/// append only, never renumber.
pub const CV_TABLE: &[CvDescriptor] = &[
    CvDescriptor { id: 1,  name: "dcc_address",            min: 1.0,   max: 127.0,  unit: "addr",    integral: true,  default: CvValue::Int(3) },
    CvDescriptor { id: 5,  name: "prototype_speed",        min: 10.0,  max: 200.0,  unit: "km/h",    integral: true,  default: CvValue::Int(80) },
    CvDescriptor { id: 6,  name: "scale_ratio",            min: 10.0,  max: 220.0,  unit: "1:n",     integral: false, default: CvValue::Float(87.1) },
    CvDescriptor { id: 32, name: "target_pressure",        min: 15.0,  max: 25.0,   unit: "PSI",     integral: false, default: CvValue::Float(18.0) },
    CvDescriptor { id: 33, name: "max_pressure",           min: 20.0,  max: 30.0,   unit: "PSI",     integral: false, default: CvValue::Float(25.0) },
    CvDescriptor { id: 41, name: "logic_temp_limit",       min: 60.0,  max: 85.0,   unit: "C",       integral: false, default: CvValue::Float(70.0) },
    CvDescriptor { id: 42, name: "boiler_temp_limit",      min: 100.0, max: 120.0,  unit: "C",       integral: false, default: CvValue::Float(110.0) },
    CvDescriptor { id: 43, name: "superheater_temp_limit", min: 240.0, max: 270.0,  unit: "C",       integral: false, default: CvValue::Float(260.0) },
    CvDescriptor { id: 44, name: "dcc_signal_timeout",     min: 5.0,   max: 100.0,  unit: "x100ms",  integral: true,  default: CvValue::Int(50) },
    CvDescriptor { id: 45, name: "track_power_timeout",    min: 5.0,   max: 100.0,  unit: "x100ms",  integral: true,  default: CvValue::Int(20) },
    CvDescriptor { id: 49, name: "servo_travel_time",      min: 500.0, max: 3000.0, unit: "ms",      integral: true,  default: CvValue::Int(1000) },
    CvDescriptor { id: 51, name: "whistle_offset",         min: 10.0,  max: 90.0,   unit: "deg",     integral: true,  default: CvValue::Int(45) },
    CvDescriptor { id: 86, name: "degradation_enable",     min: 0.0,   max: 1.0,    unit: "bool",    integral: true,  default: CvValue::Int(1) },
    CvDescriptor { id: 87, name: "degraded_decel_rate",    min: 5.0,   max: 20.0,   unit: "cm/s2",   integral: false, default: CvValue::Float(10.0) },
    CvDescriptor { id: 88, name: "degraded_timeout",       min: 10.0,  max: 60.0,   unit: "s",       integral: true,  default: CvValue::Int(30) },
    CvDescriptor { id: 90, name: "heap_low_threshold",     min: 10.0,  max: 200.0,  unit: "KiB",     integral: true,  default: CvValue::Int(60) },
];

/// Look up a descriptor by id.
pub fn descriptor(id: u8) -> Option<&'static CvDescriptor> {
    CV_TABLE.iter().find(|d| d.id == id)
}

// ---------------------------------------------------------------------------
// CvStore
// ---------------------------------------------------------------------------

/// Human-readable confirmation returned from a successful update.
pub type CvConfirmation = heapless::String<96>;

/// The live CV map. Owned by the orchestrator; everything else reads
/// through typed accessors or receives plain values.
#[derive(Debug, Clone, PartialEq)]
pub struct CvStore {
    values: BTreeMap<u8, CvValue>,
}

impl Default for CvStore {
    fn default() -> Self {
        Self::defaults()
    }
}

impl CvStore {
    /// The full default map — every descriptor's default value.
    pub fn defaults() -> Self {
        Self {
            values: CV_TABLE.iter().map(|d| (d.id, d.default)).collect(),
        }
    }

    /// Load the persisted map, falling back to defaults on a missing or
    /// corrupt record (the defaults are written back so the next boot is
    /// clean). Loaded values are individually re-validated: anything out
    /// of range or of the wrong kind reverts to its default.
    pub fn load(storage: &mut dyn StoragePort) -> Self {
        let mut buf = [0u8; 2048];
        let parsed: Option<BTreeMap<u8, CvValue>> =
            match storage.read(CV_NAMESPACE, CV_KEY, &mut buf) {
                Ok(len) => serde_json::from_slice(&buf[..len]).ok(),
                Err(_) => None,
            };

        let Some(stored) = parsed else {
            warn!("CV store missing or corrupt — rewriting defaults");
            let store = Self::defaults();
            if store.save(storage).is_err() {
                warn!("CV default rewrite failed; continuing unpersisted");
            }
            return store;
        };

        let mut store = Self::defaults();
        let mut repaired = false;
        for desc in CV_TABLE {
            match stored.get(&desc.id) {
                Some(v) if Self::conforms(desc, *v) => {
                    store.values.insert(desc.id, *v);
                }
                Some(v) => {
                    warn!(
                        "CV{} stored value {:?} out of bound — reverting to default",
                        desc.id, v
                    );
                    repaired = true;
                }
                None => repaired = true,
            }
        }
        if repaired && store.save(storage).is_err() {
            warn!("CV repair write failed; continuing unpersisted");
        }
        store
    }

    /// Persist the map as a JSON object keyed by decimal id strings.
    /// Best-effort from the caller's point of view — the control loop
    /// never blocks on the outcome.
    pub fn save(&self, storage: &mut dyn StoragePort) -> Result<(), CvError> {
        let bytes = serde_json::to_vec(&self.values).map_err(|_| CvError::PersistError)?;
        storage
            .write(CV_NAMESPACE, CV_KEY, &bytes)
            .map_err(|_| CvError::PersistError)
    }

    /// Serialise the current map for deferred persistence (the prioritised
    /// file-write queue carries the payload).
    pub fn to_json(&self) -> Option<std::vec::Vec<u8>> {
        serde_json::to_vec(&self.values).ok()
    }

    /// Validate a raw textual value against the descriptor for `id` and
    /// update in place. The old value is preserved on any failure.
    ///
    /// Returns a confirmation message suitable for the operator log.
    pub fn validate_and_update(&mut self, id: u8, raw: &str) -> Result<CvConfirmation, CvError> {
        let desc = descriptor(id).ok_or(CvError::UnknownId(id))?;
        let raw = raw.trim();

        let value = if desc.integral {
            let v: i32 = raw.parse().map_err(|_| CvError::ParseError(id))?;
            CvValue::Int(v)
        } else {
            let v: f32 = raw.parse().map_err(|_| CvError::ParseError(id))?;
            if !v.is_finite() {
                return Err(CvError::ParseError(id));
            }
            CvValue::Float(v)
        };

        if value.as_f32() < desc.min || value.as_f32() > desc.max {
            return Err(CvError::OutOfRange {
                id,
                min: desc.min,
                max: desc.max,
            });
        }

        self.values.insert(id, value);
        info!("CV{} ({}) set to {}", id, desc.name, raw);

        let mut msg = CvConfirmation::new();
        match value {
            CvValue::Int(v) => {
                let _ = write!(msg, "CV{} {} = {} {}", id, desc.name, v, desc.unit);
            }
            CvValue::Float(v) => {
                let _ = write!(msg, "CV{} {} = {:.1} {}", id, desc.name, v, desc.unit);
            }
        }
        Ok(msg)
    }

    /// Raw value lookup (known ids always resolve after `defaults`/`load`).
    pub fn get(&self, id: u8) -> Option<CvValue> {
        self.values.get(&id).copied()
    }

    fn conforms(desc: &CvDescriptor, v: CvValue) -> bool {
        let kind_ok = match v {
            CvValue::Int(_) => desc.integral,
            CvValue::Float(_) => !desc.integral,
        };
        kind_ok && v.as_f32() >= desc.min && v.as_f32() <= desc.max
    }

    fn f32_of(&self, id: u8) -> f32 {
        self.values
            .get(&id)
            .copied()
            .unwrap_or_else(|| descriptor(id).map_or(CvValue::Int(0), |d| d.default))
            .as_f32()
    }

    // -- Typed accessors ----------------------------------------------------

    pub fn dcc_address(&self) -> u8 {
        self.f32_of(1) as u8
    }

    pub fn prototype_kph(&self) -> f32 {
        self.f32_of(5)
    }

    pub fn scale_ratio(&self) -> f32 {
        self.f32_of(6)
    }

    pub fn target_pressure_psi(&self) -> f32 {
        self.f32_of(32)
    }

    pub fn max_pressure_psi(&self) -> f32 {
        self.f32_of(33)
    }

    pub fn logic_limit_c(&self) -> f32 {
        self.f32_of(41)
    }

    pub fn boiler_limit_c(&self) -> f32 {
        self.f32_of(42)
    }

    pub fn superheater_limit_c(&self) -> f32 {
        self.f32_of(43)
    }

    pub fn dcc_timeout_ms(&self) -> u32 {
        self.f32_of(44) as u32 * 100
    }

    pub fn track_power_timeout_ms(&self) -> u32 {
        self.f32_of(45) as u32 * 100
    }

    pub fn servo_travel_ms(&self) -> u32 {
        self.f32_of(49) as u32
    }

    pub fn whistle_offset_deg(&self) -> f32 {
        self.f32_of(51)
    }

    pub fn degradation_enabled(&self) -> bool {
        self.f32_of(86) != 0.0
    }

    pub fn decel_rate_cms2(&self) -> f32 {
        self.f32_of(87)
    }

    pub fn degraded_timeout_ms(&self) -> u32 {
        self.f32_of(88) as u32 * 1000
    }

    pub fn heap_low_threshold_bytes(&self) -> u32 {
        self.f32_of(90) as u32 * 1024
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
