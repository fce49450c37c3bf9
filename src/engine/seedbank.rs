// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Seed rain, per-tree dispersal, and the seed bank gating recruitment (spec 4.7)
// ABOUTME: SPECIES_SEEDS stores either presence or count per site, per `SeedMode`

use super::core::config::{RecruitmentGate, SeedMode, SimulationConfig};
use super::core::grid::Grid;
use super::core::rng::SimRng;
use super::species::SpeciesTable;

/// `SPECIES_SEEDS[sp_lab][site]`: either a presence flag or a seed count, per
/// [`SeedMode`] (spec 4.7, invariant I9).
pub struct SeedBank {
    counts: Grid<f64>,
    nb_species: usize,
    nb_sites: usize,
    mode: SeedMode,
}

impl SeedBank {
    pub fn new(nb_species: usize, nb_sites: usize, mode: SeedMode) -> Self {
        Self {
            counts: Grid::new(nb_sites, nb_species.max(1), 0.0),
            nb_species,
            nb_sites,
            mode,
        }
    }

    /// Clear the bank at the start of a dispersal cycle (spec 4.7 step 0).
    pub fn clear(&mut self) {
        self.counts.fill(0.0);
    }

    /// Deposit one seed of `sp_lab` at `site` (count mode accumulates; presence
    /// mode saturates at 1, per I9).
    pub fn deposit(&mut self, sp_lab: usize, site: usize) {
        if sp_lab >= self.nb_species || site >= self.nb_sites {
            return;
        }
        let current = *self.counts.get(site, sp_lab);
        let updated = match self.mode {
            SeedMode::Presence => 1.0,
            SeedMode::Count => current + 1.0,
        };
        self.counts.set(site, sp_lab, updated);
    }

    pub fn at(&self, sp_lab: usize, site: usize) -> f64 {
        if sp_lab >= self.nb_species || site >= self.nb_sites {
            return 0.0;
        }
        *self.counts.get(site, sp_lab)
    }

    pub fn has_seed(&self, sp_lab: usize, site: usize) -> bool {
        self.at(sp_lab, site) > 0.0
    }

    pub fn nb_species(&self) -> usize {
        self.nb_species
    }
}

/// External seed rain: draw `cseedrain` seeds per DCELL from a multinomial over
/// the regional species frequencies, then deposit each at a uniformly random
/// site within that cell (spec 4.7 step (i)).
pub fn external_seed_rain(bank: &mut SeedBank, species: &SpeciesTable, cfg: &SimulationConfig, rng: &mut SimRng) {
    let freqs = species.normalized_regional_frequencies();
    if freqs.is_empty() {
        return;
    }
    let nb_dcells = cfg.linear_nb_dcells() * cfg.linear_nb_dcells();
    let seeds_per_dcell = (cfg.cseedrain / nb_dcells.max(1) as f64).round().max(0.0) as u64;
    let sites_per_dcell = (cfg.nb_sites() / nb_dcells.max(1)).max(1);

    for dcell in 0..nb_dcells {
        let counts = rng.multinomial(seeds_per_dcell, &freqs);
        for (sp_lab, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                let offset = rng.uniform_index(sites_per_dcell as u32) as usize;
                let site = (dcell * sites_per_dcell + offset).min(cfg.nb_sites().saturating_sub(1));
                bank.deposit(sp_lab, site);
            }
        }
    }
}

/// Disperse seeds from one reproductively mature tree: draw `nbs0`-scaled seed
/// count, and for each seed a direction and a Rayleigh-distributed radius with
/// the species' dispersal scale `ds`, depositing onto whichever site the draw lands
/// on (spec 4.7 step (ii)).
pub fn disperse_from_tree(bank: &mut SeedBank, sp_lab: usize, site: usize, cols: usize, rows: usize, ds: f64, nb_seeds: u64, rng: &mut SimRng) {
    let row0 = (site / cols) as f64;
    let col0 = (site % cols) as f64;
    for _ in 0..nb_seeds {
        let angle = rng.uniform_angle();
        let radius = rng.rayleigh(ds);
        let nr = (row0 + angle.sin() * radius).round();
        let nc = (col0 + angle.cos() * radius).round();
        if nr < 0.0 || nc < 0.0 || nr as usize >= rows || nc as usize >= cols {
            continue;
        }
        let target = nr as usize * cols + nc as usize;
        bank.deposit(sp_lab, target);
    }
}

/// Number of seeds a mature tree of basal area `basal_area_m2` produces this
/// iteration, scaled by `nbs0` (spec 4.7: seed production scales with basal area).
pub fn seeds_produced(basal_area_m2: f64, cfg: &SimulationConfig) -> u64 {
    (cfg.nbs0 * basal_area_m2 * 10.0).round().max(0.0) as u64
}

/// Whether a bare site with a seed of `sp_lab` germinates this iteration (spec 4.7
/// `RecruitTree`): gated by light either via a light-compensation-point comparison
/// or by the species' LAImax vs the ground-level LAI3D, per [`RecruitmentGate`].
pub fn can_recruit(lai3d_ground: f64, lcp: f64, species_la_max_at_ground: f64, gate: RecruitmentGate) -> bool {
    match gate {
        RecruitmentGate::Lcp => lai3d_ground <= lcp,
        RecruitmentGate::LaiMax => lai3d_ground < species_la_max_at_ground,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::species::Species;

    fn sample_species(freq: f64) -> Species {
        Species {
            name: "Test".to_string(),
            lma: 80.0,
            nmass: 0.02,
            pmass: 0.001,
            wsg: 0.6,
            dbhmax: 0.8,
            hmax: 35.0,
            ah: 0.4,
            ds: 20.0,
            seedmass_wet: 2.5,
            regional_frequency: freq,
            tlp: -2.0,
            leafarea_cm2: 50.0,
            seeds_external: 5,
        }
    }

    #[test]
    fn presence_mode_saturates_at_one() {
        let mut bank = SeedBank::new(2, 10, SeedMode::Presence);
        bank.deposit(0, 3);
        bank.deposit(0, 3);
        bank.deposit(0, 3);
        assert_eq!(bank.at(0, 3), 1.0);
    }

    #[test]
    fn count_mode_accumulates() {
        let mut bank = SeedBank::new(2, 10, SeedMode::Count);
        bank.deposit(0, 3);
        bank.deposit(0, 3);
        assert_eq!(bank.at(0, 3), 2.0);
    }

    #[test]
    fn clear_empties_the_bank() {
        let mut bank = SeedBank::new(2, 10, SeedMode::Count);
        bank.deposit(1, 5);
        bank.clear();
        assert_eq!(bank.at(1, 5), 0.0);
    }

    #[test]
    fn out_of_range_deposit_is_ignored() {
        let mut bank = SeedBank::new(2, 10, SeedMode::Count);
        bank.deposit(99, 99);
        assert_eq!(bank.at(0, 0), 0.0);
    }

    #[test]
    fn external_seed_rain_deposits_conserve_nonnegative_counts() {
        let mut bank = SeedBank::new(3, 400, SeedMode::Count);
        let species = vec![sample_species(0.2), sample_species(0.3), sample_species(0.5)];
        let table = SpeciesTable::new(species);
        let cfg = SimulationConfig { rows: 20, cols: 20, ..SimulationConfig::default() };
        let mut rng = SimRng::new(42);
        external_seed_rain(&mut bank, &table, &cfg, &mut rng);
        for sp in 0..3 {
            for site in 0..400 {
                assert!(bank.at(sp, site) >= 0.0);
            }
        }
    }

    #[test]
    fn dispersal_stays_on_grid_and_only_touches_target_species() {
        let mut bank = SeedBank::new(2, 100, SeedMode::Count);
        let mut rng = SimRng::new(5);
        disperse_from_tree(&mut bank, 0, 55, 10, 10, 15.0, 20, &mut rng);
        for site in 0..100 {
            assert!(bank.at(1, site) == 0.0);
        }
    }

    #[test]
    fn seeds_produced_scales_with_basal_area() {
        let cfg = SimulationConfig::default();
        assert!(seeds_produced(1.0, &cfg) > seeds_produced(0.1, &cfg));
    }

    #[test]
    fn lcp_gate_blocks_recruitment_above_compensation_point() {
        assert!(can_recruit(1.0, 2.0, 0.0, RecruitmentGate::Lcp));
        assert!(!can_recruit(3.0, 2.0, 0.0, RecruitmentGate::Lcp));
    }

    #[test]
    fn laimax_gate_blocks_recruitment_when_canopy_too_dense() {
        assert!(can_recruit(1.0, 0.0, 2.0, RecruitmentGate::LaiMax));
        assert!(!can_recruit(3.0, 0.0, 2.0, RecruitmentGate::LaiMax));
    }
}
