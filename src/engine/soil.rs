// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Layered soil-water bucket model over the coarse DCELL grid (spec 4.5, optional)
// ABOUTME: Brooks-Corey or van Genuchten retention curves selected by `SimulationConfig`

use super::core::config::{SoilLayerWeight, WaterRetentionCurve};
use super::error::{guard_finite, TrollWarning};

/// One soil layer's hydraulic parameters (spec 4.5): porosity, residual water
/// content, and the retention-curve shape parameters for whichever curve is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilLayerParams {
    pub depth_m: f64,
    pub porosity: f64,
    pub residual: f64,
    /// Brooks-Corey: pore-size distribution index `lambda`. Van Genuchten: `n`.
    pub shape_param: f64,
    /// Brooks-Corey: air-entry potential (MPa, negative). Van Genuchten: `alpha` (1/MPa).
    pub entry_param: f64,
    pub root_fraction: f64,
}

impl Default for SoilLayerParams {
    fn default() -> Self {
        Self {
            depth_m: 0.5,
            porosity: 0.45,
            residual: 0.05,
            shape_param: 0.4,
            entry_param: -0.005,
            root_fraction: 0.25,
        }
    }
}

/// Water content and derived state for one DCELL's soil column.
#[derive(Debug, Clone)]
pub struct SoilColumn {
    pub layers: Vec<SoilLayerParams>,
    /// Volumetric water content per layer, m^3/m^3.
    pub theta: Vec<f64>,
}

impl SoilColumn {
    pub fn new(layers: Vec<SoilLayerParams>) -> Self {
        let theta = layers.iter().map(|l| l.porosity * 0.6).collect();
        Self { layers, theta }
    }

    /// Matric potential (MPa, negative) for layer `i`, via the configured retention
    /// curve (spec 4.5's `_WATER_RETENTION_CURVE` selector).
    pub fn matric_potential(&self, i: usize, curve: WaterRetentionCurve) -> f64 {
        let layer = &self.layers[i];
        let theta = self.theta[i];
        let saturation = ((theta - layer.residual) / (layer.porosity - layer.residual).max(1e-6)).clamp(1e-4, 1.0);
        match curve {
            WaterRetentionCurve::BrooksCorey => layer.entry_param * saturation.powf(-1.0 / layer.shape_param),
            WaterRetentionCurve::VanGenuchten => {
                let m = 1.0 - 1.0 / layer.shape_param.max(1.001);
                let inner = saturation.powf(-1.0 / m) - 1.0;
                -(1.0 / layer.entry_param.abs().max(1e-6)) * inner.max(0.0).powf(1.0 / layer.shape_param)
            }
        }
    }

    /// Infiltrate `rain_mm` of rainfall top-down, filling each layer to porosity
    /// before spilling into the layer below; excess below the last layer is deep
    /// drainage lost from the column (spec 4.5 water-balance step).
    pub fn infiltrate(&mut self, rain_mm: f64) -> f64 {
        let mut remaining_m = rain_mm / 1000.0;
        for (i, layer) in self.layers.iter().enumerate() {
            if remaining_m <= 0.0 {
                break;
            }
            let capacity_m = (layer.porosity - self.theta[i]).max(0.0) * layer.depth_m;
            let added = remaining_m.min(capacity_m);
            self.theta[i] += added / layer.depth_m;
            remaining_m -= added;
        }
        remaining_m * 1000.0 // mm of deep drainage
    }

    /// Withdraw `demand_mm` of plant transpiration, weighted across layers by the
    /// configured [`SoilLayerWeight`] scheme, and drain freely toward `residual`
    /// at a slow constant rate (spec 4.5's drainage/evaporation terms).
    pub fn withdraw_and_drain(&mut self, demand_mm: f64, weighting: SoilLayerWeight, drainage_rate: f64) {
        let weights = self.layer_weights(weighting);
        let mut demand_m = demand_mm / 1000.0;
        for (i, layer) in self.layers.iter().enumerate() {
            let share_m = demand_mm / 1000.0 * weights[i];
            let available_m = (self.theta[i] - layer.residual).max(0.0) * layer.depth_m;
            let taken = share_m.min(available_m).min(demand_m);
            self.theta[i] -= taken / layer.depth_m;
            demand_m -= taken;

            let drainable = (self.theta[i] - layer.residual).max(0.0) * layer.depth_m;
            let drained = (drainable * drainage_rate).min(drainable);
            self.theta[i] -= drained / layer.depth_m;
        }
    }

    fn layer_weights(&self, weighting: SoilLayerWeight) -> Vec<f64> {
        match weighting {
            SoilLayerWeight::Uniform => {
                let n = self.layers.len().max(1) as f64;
                vec![1.0 / n; self.layers.len()]
            }
            SoilLayerWeight::RootBiomass => {
                let total: f64 = self.layers.iter().map(|l| l.root_fraction).sum();
                if total <= 0.0 {
                    let n = self.layers.len().max(1) as f64;
                    vec![1.0 / n; self.layers.len()]
                } else {
                    self.layers.iter().map(|l| l.root_fraction / total).collect()
                }
            }
            SoilLayerWeight::DuursmaMedlyn => {
                // Weight by root fraction divided by matric potential magnitude:
                // wetter, root-dense layers supply disproportionately more water.
                let raw: Vec<f64> = (0..self.layers.len())
                    .map(|i| {
                        let psi = self.matric_potential(i, WaterRetentionCurve::BrooksCorey).abs().max(0.01);
                        self.layers[i].root_fraction / psi
                    })
                    .collect();
                let total: f64 = raw.iter().sum();
                if total <= 0.0 {
                    let n = self.layers.len().max(1) as f64;
                    vec![1.0 / n; self.layers.len()]
                } else {
                    raw.iter().map(|w| w / total).collect()
                }
            }
        }
    }

    /// Root-weighted mean matric potential across the column, MPa.
    pub fn mean_potential(&self, weighting: SoilLayerWeight, curve: WaterRetentionCurve) -> f64 {
        let weights = self.layer_weights(weighting);
        (0..self.layers.len()).map(|i| weights[i] * self.matric_potential(i, curve)).sum()
    }
}

/// Stomatal water stress factor `WSF = exp(b * psi_root)` (spec 4.5): an
/// exponential decline from 1 at a saturated root zone, where `b` is the
/// species-specific slope derived from its turgor-loss point
/// ([`Species::water_stress_b`]).
pub fn water_stress_factor(psi_root: f64, b: f64) -> f64 {
    (b * psi_root).exp().clamp(0.0, 1.0)
}

/// Assimilation-only water stress factor `WSF_A = 1 / (1 + (psi_root/tlp)^6)`
/// (spec 4.5): a sigmoid that only discounts Vcmax/Jmax, not the Medlyn slope,
/// and stays near 1 until `psi_root` approaches `tlp`.
pub fn water_stress_factor_assimilation(psi_root: f64, tlp: f64) -> f64 {
    let ratio = psi_root / tlp.min(-1e-6);
    (1.0 / (1.0 + ratio.powi(6))).clamp(0.0, 1.0)
}

/// Reduced Medlyn slope `g1` under water stress (spec glossary: `g1` response to WSF).
pub fn stressed_g1(g1: f64, wsf: f64) -> f64 {
    g1 * wsf.clamp(0.05, 1.0)
}

/// Wind-speed profile inside the canopy via the Inoue/Monteith-Unsworth exponential
/// attenuation law (spec 4.5): `wind(h) = wind_above * exp(-k_wind * (height_max - h) / height_max)`.
pub fn wind_profile(wind_above: f64, h: usize, height_max: usize, k_wind: f64) -> f64 {
    let depth_fraction = (height_max.saturating_sub(h)) as f64 / height_max.max(1) as f64;
    (wind_above * (-k_wind * depth_fraction).exp()).max(0.01)
}

/// Evaporative demand from bare/litter soil surface, a small fraction of potential
/// evapotranspiration driven by surface VPD (spec 4.5's evaporation term).
pub fn soil_surface_evaporation(vpd_surface: f64, warnings: &mut Vec<TrollWarning>) -> f64 {
    guard_finite(0.3 * vpd_surface.max(0.0), 0.0, "soil::surface_evaporation", warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_column() -> SoilColumn {
        SoilColumn::new(vec![
            SoilLayerParams { depth_m: 0.3, ..Default::default() },
            SoilLayerParams { depth_m: 0.5, ..Default::default() },
            SoilLayerParams { depth_m: 1.0, ..Default::default() },
        ])
    }

    #[test]
    fn infiltration_fills_top_layer_first() {
        let mut col = sample_column();
        col.theta = vec![0.1, 0.1, 0.1];
        col.infiltrate(10.0);
        assert!(col.theta[0] > 0.1);
    }

    #[test]
    fn infiltration_excess_drains_past_last_layer() {
        let mut col = sample_column();
        for t in col.theta.iter_mut() {
            *t = 0.44;
        }
        let drainage = col.infiltrate(1000.0);
        assert!(drainage > 0.0);
    }

    #[test]
    fn brooks_corey_potential_more_negative_when_drier() {
        let mut col = sample_column();
        col.theta[0] = 0.4;
        let wet = col.matric_potential(0, WaterRetentionCurve::BrooksCorey);
        col.theta[0] = 0.08;
        let dry = col.matric_potential(0, WaterRetentionCurve::BrooksCorey);
        assert!(dry < wet);
    }

    #[test]
    fn van_genuchten_potential_more_negative_when_drier() {
        let mut col = sample_column();
        col.theta[0] = 0.4;
        let wet = col.matric_potential(0, WaterRetentionCurve::VanGenuchten);
        col.theta[0] = 0.08;
        let dry = col.matric_potential(0, WaterRetentionCurve::VanGenuchten);
        assert!(dry <= wet);
    }

    #[test]
    fn withdraw_and_drain_reduces_water_content() {
        let mut col = sample_column();
        let before: f64 = col.theta.iter().sum();
        col.withdraw_and_drain(5.0, SoilLayerWeight::RootBiomass, 0.01);
        let after: f64 = col.theta.iter().sum();
        assert!(after <= before);
    }

    #[test]
    fn layer_weights_sum_to_one_for_every_scheme() {
        let col = sample_column();
        for scheme in [SoilLayerWeight::Uniform, SoilLayerWeight::RootBiomass, SoilLayerWeight::DuursmaMedlyn] {
            let w = col.layer_weights(scheme);
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{scheme:?} weights did not sum to 1: {sum}");
        }
    }

    #[test]
    fn water_stress_factor_declines_exponentially_with_drier_roots() {
        assert_eq!(water_stress_factor(0.0, 0.5), 1.0);
        let mid = water_stress_factor(-2.0, 0.5);
        let dry = water_stress_factor(-6.0, 0.5);
        assert!(mid > 0.0 && mid < 1.0);
        assert!(dry < mid);
    }

    #[test]
    fn water_stress_factor_assimilation_is_gentler_than_wsf() {
        let tlp = -2.0;
        let b = 1.0 / tlp.abs();
        let wsf = water_stress_factor(tlp, b);
        let wsf_a = water_stress_factor_assimilation(tlp, tlp);
        assert!((wsf_a - 0.5).abs() < 1e-9, "WSF_A should be 0.5 exactly at tlp, got {wsf_a}");
        assert!(wsf_a > wsf);
    }

    #[test]
    fn wind_profile_decreases_toward_ground() {
        let top = wind_profile(5.0, 60, 60, 1.0);
        let bottom = wind_profile(5.0, 0, 60, 1.0);
        assert!(bottom < top);
        assert!(bottom >= 0.01);
    }

    #[test]
    fn stressed_g1_shrinks_with_wsf() {
        assert!(stressed_g1(3.77, 0.2) < stressed_g1(3.77, 1.0));
    }

    #[test]
    fn surface_evaporation_grows_with_surface_vpd() {
        let mut warnings = Vec::new();
        let dry = soil_surface_evaporation(2.0, &mut warnings);
        let humid = soil_surface_evaporation(0.2, &mut warnings);
        assert!(dry > humid);
        assert!(warnings.is_empty());
    }
}
