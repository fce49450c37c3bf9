// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Precomputed temperature/VPD/wind/radiation curves and the crown spiral order
// ABOUTME: Built once at Simulation::new and shared read-only thereafter (spec section 5)

/// Temperature bin width for the Km/Gamma*/Vcmax/Jmax/Rdark response curves (deg C).
const TEMP_BIN_WIDTH: f64 = 0.1;
const TEMP_MIN: f64 = -10.0;
const TEMP_MAX: f64 = 50.0;

/// Absorbed-PPFD lookup resolution: `int(value * 20)` bins, ceilinged per spec 4.1.
const FLUX_BIN_SCALE: f64 = 20.0;
const A_PREV_CEIL: f64 = 19.95;
const DELTA_CEIL: f64 = 9.95;
const A_PREV_BINS: usize = (A_PREV_CEIL * FLUX_BIN_SCALE) as usize + 1;
const DELTA_BINS: usize = (DELTA_CEIL * FLUX_BIN_SCALE) as usize + 1;

/// Crown spiral radius: a 51x51 window of relative (dx, dy) offsets ordered by
/// squared distance from the center, per spec 4.2.
pub const SPIRAL_RADIUS: i32 = 25;
pub const SPIRAL_SIDE: usize = (2 * SPIRAL_RADIUS + 1) as usize;

/// Arrhenius-style temperature response table for a single photosynthetic parameter,
/// cached at `TEMP_BIN_WIDTH` resolution over `[TEMP_MIN, TEMP_MAX]`.
#[derive(Clone, Debug)]
pub struct TemperatureCurve {
    values: Vec<f64>,
}

impl TemperatureCurve {
    fn bin_count() -> usize {
        (((TEMP_MAX - TEMP_MIN) / TEMP_BIN_WIDTH).round() as usize) + 1
    }

    fn build<F: Fn(f64) -> f64>(f: F) -> Self {
        let n = Self::bin_count();
        let values = (0..n)
            .map(|i| f(TEMP_MIN + i as f64 * TEMP_BIN_WIDTH))
            .collect();
        Self { values }
    }

    /// Look up the cached value for temperature `t_celsius`, clamping to the table's range.
    pub fn get(&self, t_celsius: f64) -> f64 {
        let clamped = t_celsius.clamp(TEMP_MIN, TEMP_MAX);
        let idx = ((clamped - TEMP_MIN) / TEMP_BIN_WIDTH).round() as usize;
        self.values[idx.min(self.values.len() - 1)]
    }
}

/// Arrhenius-type activation/deactivation response, the standard Farquhar-model
/// temperature dependence for Vcmax, Jmax, Km(CO2), Km(O2), and Gamma*.
fn arrhenius(t_celsius: f64, ea_over_r: f64, t_ref_k: f64) -> f64 {
    let t_k = t_celsius + 273.15;
    (ea_over_r * (1.0 / t_ref_k - 1.0 / t_k)).exp()
}

/// Peaked (Arrhenius with high-temperature deactivation) response used for Vcmax/Jmax.
fn peaked_arrhenius(t_celsius: f64, ea_over_r: f64, ds: f64, dh_over_r: f64, t_ref_k: f64) -> f64 {
    let t_k = t_celsius + 273.15;
    let numerator = arrhenius(t_celsius, ea_over_r, t_ref_k)
        * (1.0 + (ds - dh_over_r / t_ref_k).exp());
    let denominator = 1.0 + ((ds * t_k - dh_over_r) / t_k).exp();
    numerator / denominator
}

/// All precomputed tables. Constructed once in [`Simulation::new`](crate::engine::scheduler::Simulation::new).
#[derive(Clone, Debug)]
pub struct LookupTables {
    /// Michaelis constant for CO2, relative to 25C.
    pub km_co2: TemperatureCurve,
    /// CO2 compensation point in the absence of mitochondrial respiration, relative to 25C.
    pub gamma_star: TemperatureCurve,
    /// Vcmax temperature response factor, relative to 25C (peaked response).
    pub vcmax_factor: TemperatureCurve,
    /// Jmax temperature response factor, relative to 25C (peaked response).
    pub jmax_factor: TemperatureCurve,
    /// Dark respiration Q10-style temperature response factor, relative to 25C.
    pub rdark_factor: TemperatureCurve,
    /// Stem respiration Q10 response factor, relative to 25C.
    pub stem_q10_factor: TemperatureCurve,
    /// Saturation vapor pressure (kPa) as a function of temperature (Tetens).
    pub esat: TemperatureCurve,
    /// Slope of the saturation vapor pressure curve (kPa/K), for Penman-Monteith.
    pub vpd_slope: TemperatureCurve,
    /// Absorbed PPFD per leaf area, indexed by [a_prev_bin][delta_bin].
    absorbed_flux: Vec<Vec<f64>>,
    /// Average incident-flux multiplier (used for incidentPPFD), same indexing.
    average_flux: Vec<Vec<f64>>,
    /// Spiral-ordered relative voxel offsets, center-outward, with the local
    /// stride-7 gap-artefact shuffle applied (spec 4.2).
    pub spiral_offsets: Vec<(i32, i32)>,
}

impl LookupTables {
    /// Build every cached table. `kpar` is the PAR extinction coefficient used by the
    /// absorbed/average flux kernels (spec 4.1's Beer-Lambert kernel).
    pub fn build(kpar: f64) -> Self {
        // Reference values follow the canonical Bernacchi et al. / Medlyn parameterization
        // used throughout the Farquhar-von Caemmerer-Berry literature. Ea/R in Kelvin.
        let t_ref_k = 298.15;
        let km_co2 = TemperatureCurve::build(|t| 404.9 * arrhenius(t, 79430.0 / 8.314, t_ref_k));
        let gamma_star = TemperatureCurve::build(|t| 42.75 * arrhenius(t, 37830.0 / 8.314, t_ref_k));
        let vcmax_factor =
            TemperatureCurve::build(|t| peaked_arrhenius(t, 65330.0 / 8.314, 0.490, 149250.0 / 8.314, t_ref_k));
        let jmax_factor =
            TemperatureCurve::build(|t| peaked_arrhenius(t, 43540.0 / 8.314, 0.437, 152040.0 / 8.314, t_ref_k));
        let rdark_factor = TemperatureCurve::build(|t| 2.0f64.powf((t - 25.0) / 10.0));
        let stem_q10_factor = TemperatureCurve::build(|t| 2.0f64.powf((t - 25.0) / 10.0));
        let esat = TemperatureCurve::build(|t| 0.61078 * (17.27 * t / (t + 237.3)).exp());
        let vpd_slope = TemperatureCurve::build(|t| {
            let es = 0.61078 * (17.27 * t / (t + 237.3)).exp();
            4098.0 * es / (t + 237.3).powi(2)
        });

        let mut absorbed_flux = vec![vec![0.0; DELTA_BINS]; A_PREV_BINS];
        let mut average_flux = vec![vec![0.0; DELTA_BINS]; A_PREV_BINS];
        for (ai, row_abs) in absorbed_flux.iter_mut().enumerate() {
            let a_prev = ai as f64 / FLUX_BIN_SCALE;
            for (di, cell) in row_abs.iter_mut().enumerate().skip(1) {
                let delta = di as f64 / FLUX_BIN_SCALE;
                *cell = (-kpar * a_prev).exp() * (1.0 - (-kpar * delta).exp()) / delta;
            }
        }
        for (ai, row_avg) in average_flux.iter_mut().enumerate() {
            let a_prev = ai as f64 / FLUX_BIN_SCALE;
            for (di, cell) in row_avg.iter_mut().enumerate().skip(1) {
                let delta = di as f64 / FLUX_BIN_SCALE;
                *cell = (-kpar * a_prev).exp() * (1.0 - (-kpar * delta).exp()) / (kpar * delta);
            }
        }

        Self {
            km_co2,
            gamma_star,
            vcmax_factor,
            jmax_factor,
            rdark_factor,
            stem_q10_factor,
            esat,
            vpd_slope,
            absorbed_flux,
            average_flux,
            spiral_offsets: build_spiral_offsets(),
        }
    }

    fn flux_bins(a_prev: f64, delta: f64) -> (usize, usize) {
        let a_prev = a_prev.min(A_PREV_CEIL).max(0.0);
        let delta = delta.min(DELTA_CEIL).max(0.0);
        let ai = (a_prev * FLUX_BIN_SCALE) as usize;
        let di = (delta * FLUX_BIN_SCALE) as usize;
        (ai.min(A_PREV_BINS - 1), di.min(DELTA_BINS - 1))
    }

    /// `absorbed(a_prev, delta)` per spec 4.1. Returns 0 when `delta <= 0`.
    pub fn absorbed(&self, a_prev: f64, delta: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        let (ai, di) = Self::flux_bins(a_prev, delta);
        self.absorbed_flux[ai][di]
    }

    /// `average_flux(a_prev, delta)` per spec 4.1. Returns the unattenuated case
    /// (`exp(-kpar*a_prev)`) as `delta -> 0` to avoid a division by zero.
    pub fn average_flux(&self, a_prev: f64, delta: f64) -> f64 {
        if delta <= 0.0 {
            return (-0.0f64).exp() * (-a_prev).exp();
        }
        let (ai, di) = Self::flux_bins(a_prev, delta);
        self.average_flux[ai][di]
    }
}

/// Builds the 51x51 spiral order: relative offsets from the crown center sorted by
/// squared Euclidean distance, with the stride-7 local shuffle from spec 4.2
/// (exchange positions 5<->8, 12<->15, ... within each run of 7) so that filled-gap
/// placement under a target gap fraction doesn't produce visible ring artefacts.
fn build_spiral_offsets() -> Vec<(i32, i32)> {
    let mut offsets = Vec::with_capacity(SPIRAL_SIDE * SPIRAL_SIDE);
    for dy in -SPIRAL_RADIUS..=SPIRAL_RADIUS {
        for dx in -SPIRAL_RADIUS..=SPIRAL_RADIUS {
            offsets.push((dx, dy));
        }
    }
    // Deterministic tie-break: sort by squared distance, then by (dy, dx) so
    // ties resolve the same way on every run.
    offsets.sort_by_key(|&(dx, dy)| (dx * dx + dy * dy, dy, dx));

    // Documented pattern is 1-indexed (5<->8, 12<->15, ...); in 0-indexed terms
    // that's (4,7), (11,14), ... i.e. swap(i+4, i+7) for i = 0, 7, 14, ...
    let mut i = 0usize;
    while i + 8 <= offsets.len() {
        offsets.swap(i + 4, i + 7);
        i += 7;
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_curve_matches_reference_at_25c() {
        let tables = LookupTables::build(0.5);
        assert!((tables.km_co2.get(25.0) - 404.9).abs() < 1.0);
        assert!((tables.gamma_star.get(25.0) - 42.75).abs() < 1.0);
        assert!((tables.vcmax_factor.get(25.0) - 1.0).abs() < 0.05);
    }

    #[test]
    fn rdark_factor_doubles_per_decade() {
        let tables = LookupTables::build(0.5);
        let ratio = tables.rdark_factor.get(35.0) / tables.rdark_factor.get(25.0);
        assert!((ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn absorbed_flux_is_bounded_and_monotone_in_a_prev() {
        let tables = LookupTables::build(0.5);
        let shallow = tables.absorbed(0.0, 1.0);
        let deep = tables.absorbed(5.0, 1.0);
        assert!(shallow > 0.0 && shallow <= 1.0);
        assert!(deep < shallow);
    }

    #[test]
    fn absorbed_flux_zero_when_delta_zero() {
        let tables = LookupTables::build(0.5);
        assert_eq!(tables.absorbed(1.0, 0.0), 0.0);
    }

    #[test]
    fn spiral_offsets_cover_full_window_ordered_by_distance() {
        let tables = LookupTables::build(0.5);
        assert_eq!(tables.spiral_offsets.len(), SPIRAL_SIDE * SPIRAL_SIDE);
        assert_eq!(tables.spiral_offsets[0], (0, 0));
        let mut last_d2 = 0;
        for &(dx, dy) in &tables.spiral_offsets {
            let d2 = dx * dx + dy * dy;
            assert!(d2 >= last_d2 - 1); // shuffle can locally perturb by one shell
            last_d2 = d2.max(last_d2);
        }
    }

    #[test]
    fn spiral_offsets_deterministic_across_builds() {
        let a = build_spiral_offsets();
        let b = build_spiral_offsets();
        assert_eq!(a, b);
    }
}
