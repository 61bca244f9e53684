//! DCC speed-step → regulator → model-velocity physics.
//!
//! Pure functions of their inputs — no state, no clock. The chain is
//! step → regulator percent → pressure-compensated percent → scale
//! velocity in cm/s.

/// Minimum boiler pressure for any tractive effort. At or below this
/// the regulator output is forced to zero.
pub const MIN_WORKING_PRESSURE_PSI: f32 = 5.0;

/// Regulator openings at or below this produce no motion (valve stiction).
pub const STICTION_FLOOR_PCT: f32 = 1.0;

/// km/h → cm/s.
const KPH_TO_CMS: f32 = 27.778;

/// Map a 128-step DCC speed command to regulator percent.
/// Step 0 is stop; the divisor is 126 so step 126 reaches exactly 100 %
/// and step 127 clamps to it.
pub fn dcc_to_regulator(step: u8) -> f32 {
    if step == 0 {
        return 0.0;
    }
    (f32::from(step) / 126.0 * 100.0).min(100.0)
}

/// Derate the regulator for available boiler pressure. Below the working
/// minimum there is no usable steam at all.
pub fn apply_pressure_compensation(pct: f32, psi: f32, max_psi: f32) -> f32 {
    if psi <= MIN_WORKING_PRESSURE_PSI || max_psi <= 0.0 {
        return 0.0;
    }
    (pct * (psi / max_psi)).clamp(0.0, 100.0)
}

/// Convert a regulator opening to scale model velocity in cm/s.
/// `scale_ratio` is the denominator of the model scale (87.1 for HO).
pub fn regulator_to_velocity(pct: f32, prototype_kph: f32, scale_ratio: f32) -> f32 {
    if pct <= STICTION_FLOOR_PCT || scale_ratio <= 0.0 {
        return 0.0;
    }
    (prototype_kph * KPH_TO_CMS / scale_ratio) * (pct / 100.0)
}

/// Inverse of [`regulator_to_velocity`], used when the degraded-mode
/// profile commands a velocity directly. Clamped to 0..=100.
pub fn velocity_to_regulator(velocity_cms: f32, prototype_kph: f32, scale_ratio: f32) -> f32 {
    let max_cms = prototype_kph * KPH_TO_CMS / scale_ratio;
    if max_cms <= 0.0 || velocity_cms <= 0.0 {
        return 0.0;
    }
    (velocity_cms / max_cms * 100.0).clamp(0.0, 100.0)
}

/// Full chain: DCC step + boiler pressure → model velocity.
pub fn dcc_to_velocity(
    step: u8,
    psi: f32,
    max_psi: f32,
    prototype_kph: f32,
    scale_ratio: f32,
) -> f32 {
    let pct = dcc_to_regulator(step);
    let compensated = apply_pressure_compensation(pct, psi, max_psi);
    regulator_to_velocity(compensated, prototype_kph, scale_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_zero_is_zero() {
        assert_eq!(dcc_to_regulator(0), 0.0);
    }

    #[test]
    fn step_64_is_50_79_pct() {
        assert!((dcc_to_regulator(64) - 50.79).abs() < 0.01);
    }

    #[test]
    fn step_126_and_127_reach_exactly_100() {
        assert!((dcc_to_regulator(126) - 100.0).abs() < 0.0001);
        assert_eq!(dcc_to_regulator(127), 100.0);
    }

    #[test]
    fn compensation_floor_at_5_psi() {
        assert_eq!(apply_pressure_compensation(50.0, 5.0, 25.0), 0.0);
        assert!(apply_pressure_compensation(50.0, 5.01, 25.0) > 0.0);
        assert_eq!(apply_pressure_compensation(50.0, 0.0, 25.0), 0.0);
    }

    #[test]
    fn compensation_scales_linearly_with_pressure() {
        let c = apply_pressure_compensation(50.79, 18.0, 25.0);
        assert!((c - 50.79 * 18.0 / 25.0).abs() < 0.01);
    }

    #[test]
    fn compensation_clamps_to_100() {
        assert_eq!(apply_pressure_compensation(100.0, 30.0, 25.0), 100.0);
    }

    #[test]
    fn stiction_floor_yields_zero_velocity() {
        assert_eq!(regulator_to_velocity(1.0, 80.0, 87.1), 0.0);
        assert!(regulator_to_velocity(1.01, 80.0, 87.1) > 0.0);
    }

    #[test]
    fn ho_scale_full_regulator_velocity() {
        // 80 km/h prototype at 1:87.1 → 25.51 cm/s at full regulator.
        let v = regulator_to_velocity(100.0, 80.0, 87.1);
        assert!((v - 25.51).abs() < 0.01);
    }

    #[test]
    fn normal_cruise_scenario() {
        // Step 64 at 18 PSI (max 25): 50.79 % → 36.57 % → 9.33 cm/s.
        let v = dcc_to_velocity(64, 18.0, 25.0, 80.0, 87.1);
        assert!((v - 9.33).abs() < 0.01);
    }

    #[test]
    fn velocity_inverse_round_trips() {
        let pct = 36.57;
        let v = regulator_to_velocity(pct, 80.0, 87.1);
        let back = velocity_to_regulator(v, 80.0, 87.1);
        assert!((back - pct).abs() < 0.01);
    }

    #[test]
    fn velocity_never_negative() {
        for step in [0u8, 1, 13, 64, 127] {
            for psi in [-3.0f32, 0.0, 4.9, 5.0, 12.5, 25.0] {
                assert!(dcc_to_velocity(step, psi, 25.0, 80.0, 87.1) >= 0.0);
            }
        }
    }
}
