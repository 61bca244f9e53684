//! Sensor suite: engineering-unit conversion plus per-channel health.
//!
//! Raw samples arrive through the [`SensorBus`](crate::app::ports::SensorBus)
//! port (amortised by the cached reader worker). Each health-tracked
//! channel is validated against its hard physical range; invalid samples
//! are replaced by the last-known-valid value and counted toward
//! degradation. Pressure is validated in kPa as the transducer reports
//! it and converted to PSI exactly once here — everything downstream
//! regulates in PSI.

pub mod health;

use crate::error::SensorError;
use health::{ChannelHealth, HealthTracker};

/// Hard physical ranges. Readings outside these are impossible for a
/// healthy channel regardless of configuration.
pub const BOILER_RANGE_C: (f32, f32) = (0.0, 150.0);
pub const SUPERHEATER_RANGE_C: (f32, f32) = (0.0, 280.0);
pub const LOGIC_RANGE_C: (f32, f32) = (0.0, 100.0);
pub const PRESSURE_RANGE_KPA: (f32, f32) = (-7.0, 207.0);

const KPA_TO_PSI: f32 = 0.145_038;

/// The four health-tracked channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    BoilerTemp,
    SuperheaterTemp,
    LogicTemp,
    Pressure,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::BoilerTemp,
        Channel::SuperheaterTemp,
        Channel::LogicTemp,
        Channel::Pressure,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::BoilerTemp => "boiler_temp",
            Self::SuperheaterTemp => "superheater_temp",
            Self::LogicTemp => "logic_temp",
            Self::Pressure => "pressure",
        }
    }
}

/// One raw acquisition of every channel, as delivered by the bus.
/// A driver error and an out-of-range value are treated identically.
#[derive(Debug, Clone, Copy)]
pub struct RawSensorFrame {
    pub boiler_c: Result<f32, SensorError>,
    pub superheater_c: Result<f32, SensorError>,
    pub logic_c: Result<f32, SensorError>,
    pub pressure_kpa: Result<f32, SensorError>,
    pub track_mv: Result<u32, SensorError>,
}

impl Default for RawSensorFrame {
    fn default() -> Self {
        Self {
            boiler_c: Err(SensorError::AdcReadFailed),
            superheater_c: Err(SensorError::AdcReadFailed),
            logic_c: Err(SensorError::AdcReadFailed),
            pressure_kpa: Err(SensorError::AdcReadFailed),
            track_mv: Err(SensorError::AdcReadFailed),
        }
    }
}

/// Validated, engineering-unit snapshot consumed by the control path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    pub boiler_c: f32,
    pub superheater_c: f32,
    pub logic_c: f32,
    /// Boiler pressure in PSI (converted once from the transducer's kPa).
    pub pressure_psi: f32,
    /// Rectified track voltage in millivolts.
    pub track_mv: u32,
}

/// The suite: four health trackers plus the unvalidated track-voltage cache.
pub struct SensorSuite {
    boiler: HealthTracker,
    superheater: HealthTracker,
    logic: HealthTracker,
    pressure: HealthTracker,
    last_track_mv: u32,
}

impl Default for SensorSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSuite {
    pub fn new() -> Self {
        Self {
            boiler: HealthTracker::new(
                Channel::BoilerTemp.name(),
                BOILER_RANGE_C.0,
                BOILER_RANGE_C.1,
                20.0,
            ),
            superheater: HealthTracker::new(
                Channel::SuperheaterTemp.name(),
                SUPERHEATER_RANGE_C.0,
                SUPERHEATER_RANGE_C.1,
                20.0,
            ),
            logic: HealthTracker::new(
                Channel::LogicTemp.name(),
                LOGIC_RANGE_C.0,
                LOGIC_RANGE_C.1,
                25.0,
            ),
            pressure: HealthTracker::new(
                Channel::Pressure.name(),
                PRESSURE_RANGE_KPA.0,
                PRESSURE_RANGE_KPA.1,
                0.0,
            ),
            last_track_mv: 0,
        }
    }

    /// Validate one raw frame and publish the snapshot the tick runs on.
    pub fn ingest(&mut self, raw: &RawSensorFrame) -> SensorSnapshot {
        let boiler_c = self.boiler.accept(raw.boiler_c);
        let superheater_c = self.superheater.accept(raw.superheater_c);
        let logic_c = self.logic.accept(raw.logic_c);
        let pressure_kpa = self.pressure.accept(raw.pressure_kpa);

        if let Ok(mv) = raw.track_mv {
            self.last_track_mv = mv;
        }

        SensorSnapshot {
            boiler_c,
            superheater_c,
            logic_c,
            pressure_psi: pressure_kpa * KPA_TO_PSI,
            track_mv: self.last_track_mv,
        }
    }

    pub fn health(&self, channel: Channel) -> (ChannelHealth, f32) {
        let t = self.tracker(channel);
        (t.health(), t.last_valid())
    }

    /// Channels currently DEGRADED.
    pub fn failed_channel_count(&self) -> usize {
        Channel::ALL
            .iter()
            .filter(|c| self.tracker(**c).is_degraded())
            .count()
    }

    /// The first degraded channel in declaration order, if any.
    pub fn first_degraded(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| self.tracker(*c).is_degraded())
    }

    fn tracker(&self, channel: Channel) -> &HealthTracker {
        match channel {
            Channel::BoilerTemp => &self.boiler,
            Channel::SuperheaterTemp => &self.superheater,
            Channel::LogicTemp => &self.logic,
            Channel::Pressure => &self.pressure,
        }
    }
}
