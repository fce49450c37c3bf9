// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Per-species and whole-stand aggregate output (spec section 4.8's reporting step)
// ABOUTME: Computed from a read-only pass over live trees; never mutates simulation state

use std::collections::HashMap;

use super::species::SpeciesTable;
use super::tree::{NppBreakdown, Tree};

/// Aggregate values for one species (or the whole stand, under `sp_lab = None`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeciesSummary {
    pub abundance: u64,
    pub basal_area_m2: f64,
    pub agb_kg: f64,
    pub gpp_g_c: f64,
    pub npp_g_c: f64,
    pub rday_g_c: f64,
    pub rnight_g_c: f64,
    pub rstem_g_c: f64,
    pub litterfall_m2: f64,
}

impl SpeciesSummary {
    fn add_tree(&mut self, tree: &Tree, agb_kg: f64, npp: Option<NppBreakdown>, litterfall_m2: f64) {
        self.abundance += 1;
        self.basal_area_m2 += std::f64::consts::PI * (tree.dbh / 2.0).powi(2);
        self.agb_kg += agb_kg;
        self.litterfall_m2 += litterfall_m2;
        if let Some(n) = npp {
            self.gpp_g_c += n.gpp;
            self.npp_g_c += n.npp;
            self.rday_g_c += n.rday;
            self.rnight_g_c += n.rnight;
            self.rstem_g_c += n.rstem;
        }
    }
}

/// One iteration's complete summary: per-species breakdown plus the stand total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandSummary {
    pub iter: u64,
    pub per_species: HashMap<usize, SpeciesSummary>,
    pub total: SpeciesSummary,
}

/// Build the summary for one iteration from the live tree list. `npp_of` supplies
/// this iteration's carbon-flux breakdown for a tree (absent if Growth hasn't run
/// yet this step, e.g. a tree recruited mid-iteration); `litterfall_of` supplies
/// the leaf area shed this step (spec section 4.8's reporting step, spec glossary:
/// litterfall).
pub fn summarize<'a>(
    iter: u64,
    trees: impl Iterator<Item = &'a Tree>,
    species: &SpeciesTable,
    npp_of: impl Fn(&Tree) -> Option<NppBreakdown>,
    litterfall_of: impl Fn(&Tree) -> f64,
) -> StandSummary {
    let mut per_species: HashMap<usize, SpeciesSummary> = HashMap::new();
    let mut total = SpeciesSummary::default();

    for tree in trees {
        let Some(sp) = species.get(tree.sp_lab) else { continue };
        let agb_kg = tree.agb(sp);
        let npp = npp_of(tree);
        let litter = litterfall_of(tree);
        per_species.entry(tree.sp_lab).or_default().add_tree(tree, agb_kg, npp, litter);
        total.add_tree(tree, agb_kg, npp, litter);
    }

    StandSummary { iter, per_species, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::config::SimulationConfig;
    use crate::engine::core::rng::SimRng;
    use crate::engine::species::Species;

    fn sample_species() -> Species {
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
            regional_frequency: 0.1,
            tlp: -2.0,
            leafarea_cm2: 50.0,
            seeds_external: 5,
        }
    }

    #[test]
    fn empty_stand_has_zero_total() {
        let table = SpeciesTable::new(vec![sample_species()]);
        let summary = summarize(0, std::iter::empty(), &table, |_| None, |_| 0.0);
        assert_eq!(summary.total.abundance, 0);
        assert_eq!(summary.total.basal_area_m2, 0.0);
    }

    #[test]
    fn single_tree_total_matches_per_species_entry() {
        let cfg = SimulationConfig::default();
        let sp = sample_species();
        let table = SpeciesTable::new(vec![sp.clone()]);
        let mut rng = SimRng::new(1);
        let tree = Tree::birth(0, 0, &sp, &cfg, &mut rng);
        let summary = summarize(0, std::iter::once(&tree), &table, |_| None, |_| 0.0);
        assert_eq!(summary.total.abundance, 1);
        assert_eq!(summary.per_species[&0].abundance, 1);
        assert_eq!(summary.total.basal_area_m2, summary.per_species[&0].basal_area_m2);
    }

    #[test]
    fn unknown_species_is_skipped_not_panicking() {
        let cfg = SimulationConfig::default();
        let sp = sample_species();
        let table = SpeciesTable::new(vec![]);
        let mut rng = SimRng::new(1);
        let tree = Tree::birth(0, 7, &sp, &cfg, &mut rng);
        let summary = summarize(0, std::iter::once(&tree), &table, |_| None, |_| 0.0);
        assert_eq!(summary.total.abundance, 0);
    }

    #[test]
    fn npp_breakdown_accumulates_into_totals() {
        let cfg = SimulationConfig::default();
        let sp = sample_species();
        let table = SpeciesTable::new(vec![sp.clone()]);
        let mut rng = SimRng::new(1);
        let tree = Tree::birth(0, 0, &sp, &cfg, &mut rng);
        let npp = NppBreakdown { gpp: 10.0, rday: 1.0, rnight: 1.0, rstem: 1.0, npp: 7.0 };
        let summary = summarize(0, std::iter::once(&tree), &table, |_| Some(npp), |_| 0.0);
        assert_eq!(summary.total.gpp_g_c, 10.0);
        assert_eq!(summary.total.npp_g_c, 7.0);
    }
}
