// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Static per-species parameters (spec section 3) and the species table
// ABOUTME: Parsing the `-s` species file is out of scope; callers build this in memory

use serde::{Deserialize, Serialize};

/// Static, per-species parameters. One row of the `-s` species file (spec section 6),
/// minus the file-parsing step itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    /// Leaf mass per area, g/m^2.
    pub lma: f64,
    pub nmass: f64,
    pub pmass: f64,
    /// Wood specific gravity, g/cm^3.
    pub wsg: f64,
    pub dbhmax: f64,
    pub hmax: f64,
    /// Height-allometry half-saturation constant, m.
    pub ah: f64,
    /// Dispersal scale (Rayleigh sigma), m.
    pub ds: f64,
    /// Seed mass, g (wet volume; dry mass is `seedmass_wet * 0.4` per spec section 6).
    pub seedmass_wet: f64,
    pub regional_frequency: f64,
    /// Turgor loss point, MPa (negative).
    pub tlp: f64,
    /// Leaf area, cm^2.
    pub leafarea_cm2: f64,
    /// External seed rain count contributed by this species each year.
    pub seeds_external: u64,
}

impl Species {
    /// Dry seed mass, g. Spec section 6: "wet volume -> x0.4 dry mass".
    pub fn seedmass_dry(&self) -> f64 {
        self.seedmass_wet * 0.4
    }

    /// Lethal water potential, MPa, derived from TLP (spec glossary: psi_lethal is
    /// "derived from TLP"). The commonly used safety margin is TLP minus an
    /// additional third of its magnitude.
    pub fn psi_lethal(&self) -> f64 {
        self.tlp * 1.33
    }

    /// dbh at reproductive maturity: `0.5 * dbhmax` (spec section 3).
    pub fn dbh_mature(&self) -> f64 {
        0.5 * self.dbhmax
    }

    /// Slope `b` of the stomatal water-stress exponential `WSF = exp(b*psi_root)`
    /// (spec 4.5: "b species-specific from TLP"), chosen so a root zone at the
    /// turgor-loss point leaves `WSF = exp(-1)`.
    pub fn water_stress_b(&self) -> f64 {
        1.0 / self.tlp.abs().max(0.01)
    }

    /// Leaf lifespan, in timesteps, derived from LMA (thicker leaves live
    /// longer): used both for leaf-pool turnover and as the scale against which
    /// a consecutive-NPPneg streak is judged (spec 9).
    pub fn leaf_lifespan_iters(&self) -> f64 {
        (self.lma / 20.0).clamp(30.0, 3000.0)
    }
}

/// Species indexed `0..nbspp`; spec section 9 notes the source's 1-based array with
/// a dummy at index 0 should not be relied on by tests, so this table is plain 0-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesTable {
    species: Vec<Species>,
}

impl SpeciesTable {
    pub fn new(species: Vec<Species>) -> Self {
        Self { species }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, sp_lab: usize) -> Option<&Species> {
        self.species.get(sp_lab)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Species)> {
        self.species.iter().enumerate()
    }

    /// Regional frequencies normalized to sum to 1, for the multinomial seed-rain
    /// draw in spec 4.7 step (i).
    pub fn normalized_regional_frequencies(&self) -> Vec<f64> {
        let total: f64 = self.species.iter().map(|s| s.regional_frequency).sum();
        if total <= 0.0 {
            let n = self.species.len().max(1) as f64;
            return vec![1.0 / n; self.species.len()];
        }
        self.species.iter().map(|s| s.regional_frequency / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_species() -> Species {
        Species {
            name: "Test species".to_string(),
            lma: 80.0,
            nmass: 0.02,
            pmass: 0.001,
            wsg: 0.6,
            dbhmax: 0.8,
            hmax: 35.0,
            ah: 0.4,
            ds: 20.0,
            seedmass_wet: 2.5,
            regional_frequency: 0.1,
            tlp: -2.0,
            leafarea_cm2: 50.0,
            seeds_external: 5,
        }
    }

    #[test]
    fn seedmass_dry_applies_0_4_factor() {
        let sp = sample_species();
        assert!((sp.seedmass_dry() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dbh_mature_is_half_dbhmax() {
        let sp = sample_species();
        assert!((sp.dbh_mature() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn psi_lethal_more_negative_than_tlp() {
        let sp = sample_species();
        assert!(sp.psi_lethal() < sp.tlp);
    }

    #[test]
    fn water_stress_b_matches_inverse_of_tlp_magnitude() {
        let sp = sample_species();
        assert!((sp.water_stress_b() - 1.0 / sp.tlp.abs()).abs() < 1e-9);
    }

    #[test]
    fn normalized_frequencies_sum_to_one() {
        let table = SpeciesTable::new(vec![sample_species(), sample_species(), sample_species()]);
        let freqs = table.normalized_regional_frequencies();
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_table_frequencies_dont_divide_by_zero() {
        let table = SpeciesTable::new(vec![]);
        assert!(table.normalized_regional_frequencies().is_empty());
    }
}
