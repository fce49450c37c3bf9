// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Owns every per-simulation array and drives the per-iteration pipeline (spec 4.8)
// ABOUTME: VoxelField rebuild -> Growth -> Water -> Treefall -> Mortality -> Seeds -> Summary

use super::climate::{ClimateSeries, DaytimeProfile};
use super::core::config::{RecruitmentGate, SeedMode, SimulationConfig};
use super::core::lookup::LookupTables;
use super::core::rng::SimRng;
use super::crown::{build_crown_layers, for_each_crown_voxel};
use super::error::TrollWarning;
use super::leaf_flux::{solve_with_water, solve_without_water, LeafEnvironment, LeafFlux};
use super::seedbank::{can_recruit, disperse_from_tree, external_seed_rain, seeds_produced, SeedBank};
use super::soil::{soil_surface_evaporation, water_stress_factor, water_stress_factor_assimilation, wind_profile, SoilColumn, SoilLayerParams};
use super::species::SpeciesTable;
use super::summary::{summarize, StandSummary};
use super::tree::{NppBreakdown, Tree};
use super::voxel::VoxelField;

/// Owns every per-site and per-species array. One `Simulation` is one independent,
/// fully reproducible run (spec section 8's determinism law: same config + seed +
/// inputs -> identical trajectory).
pub struct Simulation {
    pub cfg: SimulationConfig,
    pub species: SpeciesTable,
    pub climate: ClimateSeries,
    pub daytime: DaytimeProfile,
    pub tables: LookupTables,
    pub voxels: VoxelField,
    pub sites: Vec<Option<Tree>>,
    pub seed_bank: SeedBank,
    pub soil: Vec<SoilColumn>,
    pub rng: SimRng,
    pub iter: u64,
    pub warnings: Vec<TrollWarning>,
}

impl Simulation {
    pub fn new(cfg: SimulationConfig, species: SpeciesTable, climate: ClimateSeries, daytime: DaytimeProfile) -> Self {
        let nb_sites = cfg.nb_sites();
        let tables = LookupTables::build(cfg.klight);
        let voxels = VoxelField::new(cfg.height_max, nb_sites);
        let sites = vec![None; nb_sites];
        let seed_bank = SeedBank::new(species.len().max(1), nb_sites, cfg.seed_mode);
        let nb_dcells = cfg.linear_nb_dcells() * cfg.linear_nb_dcells();
        let soil = (0..nb_dcells)
            .map(|_| SoilColumn::new(vec![SoilLayerParams::default(), SoilLayerParams { depth_m: 1.0, ..Default::default() }]))
            .collect();
        let rng = SimRng::new(cfg.seed);
        Self {
            cfg,
            species,
            climate,
            daytime,
            tables,
            voxels,
            sites,
            seed_bank,
            soil,
            rng,
            iter: 0,
            warnings: Vec::new(),
        }
    }

    fn dcell_of(&self, site: usize) -> usize {
        let linear = self.cfg.linear_nb_dcells().max(1);
        let row = site / self.cfg.cols;
        let col = site % self.cfg.cols;
        let cell_rows = (self.cfg.rows as f64 / linear as f64).ceil().max(1.0) as usize;
        let cell_cols = (self.cfg.cols as f64 / linear as f64).ceil().max(1.0) as usize;
        (row / cell_rows.max(1)).min(linear - 1) * linear + (col / cell_cols.max(1)).min(linear - 1)
    }

    /// Rebuild the LAI3D voxel field from scratch (spec 4.1 contract: "rebuilt
    /// from scratch every timestep"). Every live tree's crown is stamped in via
    /// the spiral-fill placement, then the field is accumulated top-down.
    fn rebuild_voxel_field(&mut self) {
        self.voxels.clear();
        for tree in self.sites.iter().flatten() {
            let layers = build_crown_layers(
                tree.height,
                tree.cd,
                tree.cr,
                self.cfg.shape_crown,
                self.cfg.crown_shape,
                self.cfg.lai_profile,
                tree.lai,
            );
            let fraction = super::crown::fraction_filled(tree.multipliers.cr, self.cfg.crown_gap_fraction);
            let col = (tree.site % self.cfg.cols) as i64;
            let row = (tree.site / self.cfg.cols) as i64;
            let voxels = &mut self.voxels;
            for_each_crown_voxel(col, row, self.cfg.cols, self.cfg.rows, &layers, fraction, &self.tables.spiral_offsets, |h, s, density| {
                voxels.add_density(h, s, density);
            });
        }
        self.voxels.accumulate_top_down();
    }

    /// Run the Growth step for one tree: compute per-crown-layer flux via the
    /// voxel field + leaf solver, aggregate into whole-tree NPP, and allocate
    /// carbon (spec 4.4 Growth step, 4.8 pipeline step 2). Takes the tree by
    /// `&mut` so the sequential and `rayon`-parallel code paths share one
    /// implementation: growth reads only `self`'s shared, read-only fields.
    fn grow_tree(&self, tree: &mut Tree, warnings: &mut Vec<TrollWarning>) -> Option<(NppBreakdown, f64)> {
        let Some(species) = self.species.get(tree.sp_lab) else {
            warnings.push(TrollWarning::UnknownSpecies { site: tree.site });
            return None;
        };
        let climate_day = self.climate.select(self.iter, matches!(self.cfg.climate_mode, super::core::config::ClimateMode::FullSeries));
        let capacity = tree.leaf_capacity(species);

        let (wsf, wsf_a) = if self.cfg.water {
            let dcell = self.dcell_of(tree.site);
            let potential = self.soil[dcell].mean_potential(self.cfg.soil_layer_weight, self.cfg.water_retention_curve);
            (water_stress_factor(potential, species.water_stress_b()), water_stress_factor_assimilation(potential, species.tlp))
        } else {
            (1.0, 1.0)
        };

        let layers = build_crown_layers(tree.height, tree.cd, tree.cr, self.cfg.shape_crown, self.cfg.crown_shape, self.cfg.lai_profile, tree.lai);
        let mut layer_fluxes: Vec<(f64, LeafFlux)> = Vec::with_capacity(layers.len() * self.daytime.nbsteps());

        for layer in &layers {
            let incident = self.voxels.incident_ppfd(layer.h, tree.site, climate_day.shortwave_irradiance, &self.tables);
            let layer_area = self.cfg.dens.max(0.01) * layer.density.max(0.0);
            let wind_at_layer = wind_profile(climate_day.wind_speed, layer.h, self.cfg.height_max, 1.0);
            for step in 0..self.daytime.nbsteps() {
                let absorbed = incident * self.daytime.light[step];
                let env = LeafEnvironment {
                    absorbed_ppfd: absorbed.max(0.0),
                    vpd_air: climate_day.vpd * self.daytime.vpd[step],
                    t_air: climate_day.t_day * self.daytime.temperature[step],
                    wind: wind_at_layer * self.daytime.wind[step],
                    incident_ppfd_above: incident,
                };
                let flux = if self.cfg.water {
                    solve_with_water(env, capacity, &self.tables, self.cfg.g0, self.cfg.g1, wsf, wsf_a, self.cfg.theta, self.cfg.phi, self.cfg.cair, self.cfg.press, warnings)
                } else {
                    solve_without_water(env, capacity, &self.tables, self.cfg.g0, self.cfg.g1, self.cfg.theta, self.cfg.phi, self.cfg.cair, self.cfg.press, warnings)
                };
                let weight = layer_area / self.daytime.nbsteps().max(1) as f64;
                layer_fluxes.push((weight, flux));
            }
        }

        let rnight_q10 = self.tables.stem_q10_factor.get(climate_day.t_night);
        let npp = tree.aggregate_npp(&layer_fluxes, species, &self.cfg, rnight_q10);
        let litterfall = tree.allocate_growth(npp, species, &self.cfg, warnings);
        Some((npp, litterfall))
    }

    /// Treefall pass: secondary noise, then primary falls from Ct exceedance
    /// (spec 4.6). Fallen trees are removed; surviving hit sites take damage.
    fn run_treefall(&mut self) {
        if matches!(self.cfg.treefall_mode, super::core::config::TreefallMode::None) {
            return;
        }
        let occupied: Vec<usize> = self.sites.iter().enumerate().filter(|(_, t)| t.is_some()).map(|(i, _)| i).collect();
        let timestep = 1.0 / self.cfg.iterperyear.max(1) as f64;
        let nb_sites = self.sites.len();
        let cols = self.cfg.cols;

        let secondary_tree_of = |site: usize| -> Option<(f64, f64, f64)> {
            self.sites[site].as_ref().map(|t| (t.hurt, t.height, t.multipliers.height))
        };
        let (secondary_removed, secondary_hits) =
            super::treefall::secondary_treefall_noise(&occupied, secondary_tree_of, &self.cfg, cols, nb_sites, timestep, &mut self.rng);

        let height_ct_of = |site: usize| -> Option<(f64, f64)> { self.sites[site].as_ref().map(|t| (t.height, t.ct)) };
        let (primary_fallen, primary_hits) = super::treefall::primary_treefalls(nb_sites, cols, height_ct_of, timestep, &mut self.rng);

        let mut all_hits = secondary_hits;
        all_hits.extend(primary_hits);
        let merged = super::treefall::merge_hits(all_hits);

        for hit in merged {
            if let Some(tree) = self.sites[hit.site].as_mut() {
                tree.apply_treefall_hit(hit.severity);
            }
        }
        for site in secondary_removed.into_iter().chain(primary_fallen) {
            self.sites[site] = None;
        }
        for tree in self.sites.iter_mut().flatten() {
            tree.decay_hurt(self.cfg.hurt_decay);
        }
    }

    /// Mortality pass (spec 4.4 Death step): each live tree rolls its background
    /// plus stress-adjusted death probability.
    fn run_mortality(&mut self) {
        for site in 0..self.sites.len() {
            let dies = match &self.sites[site] {
                Some(tree) => match self.species.get(tree.sp_lab) {
                    Some(sp) => tree.maybe_die(sp, &self.cfg, &mut self.rng),
                    None => false,
                },
                None => false,
            };
            if dies {
                self.sites[site] = None;
            }
        }
    }

    /// Seed dispersal and recruitment (spec 4.7, 4.8 step 2): at the annual
    /// boundary (`iter % iterperyear == 0`), the bank is refreshed - mature
    /// trees disperse and external seed rain tops it up - then, every
    /// iteration, bare sites with a seed present germinate if the light gate
    /// allows it.
    fn run_seeds_and_recruitment(&mut self) {
        if self.cfg.iterperyear == 0 || self.iter % self.cfg.iterperyear == 0 {
            self.seed_bank.clear();
            external_seed_rain(&mut self.seed_bank, &self.species, &self.cfg, &mut self.rng);

            let cols = self.cfg.cols;
            let rows = self.cfg.rows;
            let mut dispersals = Vec::new();
            for tree in self.sites.iter().flatten() {
                let Some(species) = self.species.get(tree.sp_lab) else { continue };
                if tree.dbh < species.dbh_mature() {
                    continue;
                }
                let basal_area = std::f64::consts::PI * (tree.dbh / 2.0).powi(2);
                let n = seeds_produced(basal_area, &self.cfg);
                dispersals.push((tree.sp_lab, tree.site, species.ds, n));
            }
            for (sp_lab, site, ds, n) in dispersals {
                disperse_from_tree(&mut self.seed_bank, sp_lab, site, cols, rows, ds, n, &mut self.rng);
            }
        }

        let nb_species = self.seed_bank.nb_species();
        let mut recruits = Vec::new();
        for site in 0..self.sites.len() {
            if self.sites[site].is_some() {
                continue;
            }
            for sp_lab in 0..nb_species {
                if !self.seed_bank.has_seed(sp_lab, site) {
                    continue;
                }
                let Some(species) = self.species.get(sp_lab) else { continue };
                let lai_ground = self.voxels.cumulative_at(0, site);
                let species_la_max = self.cfg.dens * 1.0;
                if can_recruit(lai_ground, 1.0, species_la_max, self.cfg.recruitment_gate) {
                    recruits.push((site, sp_lab));
                    break;
                }
            }
        }
        for (site, sp_lab) in recruits {
            let Some(species) = self.species.get(sp_lab) else { continue };
            let tree = Tree::birth(site, sp_lab, species, &self.cfg, &mut self.rng);
            self.sites[site] = Some(tree);
        }
    }

    /// Update each DCELL's soil-water column with today's rainfall and the
    /// aggregate transpiration demand of the trees rooted in it (spec 4.5).
    fn run_soil_water(&mut self) {
        if !self.cfg.water {
            return;
        }
        let climate_day = self.climate.select(self.iter, matches!(self.cfg.climate_mode, super::core::config::ClimateMode::FullSeries));
        let evaporation = soil_surface_evaporation(climate_day.vpd, &mut self.warnings);
        let mut demand = vec![evaporation; self.soil.len()];
        for tree in self.sites.iter().flatten() {
            let dcell = self.dcell_of(tree.site);
            demand[dcell] += tree.lai * 0.05; // coarse per-tree transpiration proxy
        }
        for (i, column) in self.soil.iter_mut().enumerate() {
            column.infiltrate(climate_day.rain_mm);
            column.withdraw_and_drain(demand[i], self.cfg.soil_layer_weight, 0.01);
        }
    }

    /// Take every warning collected so far, leaving the internal buffer empty.
    /// Callers print or log these (spec section 7: recoverable, never fatal).
    pub fn drain_warnings(&mut self) -> Vec<TrollWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Run one full iteration of the pipeline and return its summary (spec 4.8):
    /// rebuild LAI3D, grow every tree, update soil water, apply treefall, apply
    /// mortality, disperse seeds and recruit, then summarize.
    pub fn step(&mut self) -> StandSummary {
        self.rebuild_voxel_field();

        let sites_to_grow: Vec<usize> = self.sites.iter().enumerate().filter(|(_, t)| t.is_some()).map(|(i, _)| i).collect();
        let mut npp_data: std::collections::HashMap<usize, (NppBreakdown, f64)> = std::collections::HashMap::new();

        if self.cfg.parallel_growth {
            // Site-partitioned Growth (spec section 5's "natural decomposition"):
            // pull every tree to grow out of `self.sites` first so the parallel
            // closure only needs a shared `&self` borrow, then write the grown
            // trees back in sequentially.
            use rayon::prelude::*;
            let taken: Vec<(usize, Tree)> = sites_to_grow
                .iter()
                .map(|&site| (site, self.sites[site].take().expect("site_to_grow is occupied")))
                .collect();
            let grown: Vec<(usize, Tree, Vec<TrollWarning>, Option<(NppBreakdown, f64)>)> = taken
                .into_par_iter()
                .map(|(site, mut tree)| {
                    let mut warnings = Vec::new();
                    let data = self.grow_tree(&mut tree, &mut warnings);
                    (site, tree, warnings, data)
                })
                .collect();
            for (site, tree, mut warnings, data) in grown {
                self.sites[site] = Some(tree);
                self.warnings.append(&mut warnings);
                if let Some(data) = data {
                    npp_data.insert(site, data);
                }
            }
        } else {
            for &site in &sites_to_grow {
                if let Some(mut tree) = self.sites[site].take() {
                    let mut warnings = Vec::new();
                    let data = self.grow_tree(&mut tree, &mut warnings);
                    self.warnings.append(&mut warnings);
                    if let Some(data) = data {
                        npp_data.insert(site, data);
                    }
                    self.sites[site] = Some(tree);
                }
            }
        }

        self.run_soil_water();
        self.run_treefall();
        self.run_mortality();
        self.run_seeds_and_recruitment();

        let summary = summarize(
            self.iter,
            self.sites.iter().flatten(),
            &self.species,
            |t| npp_data.get(&t.site).map(|(npp, _)| *npp),
            |t| npp_data.get(&t.site).map(|(_, litterfall)| *litterfall).unwrap_or(0.0),
        );
        self.iter += 1;
        summary
    }
}
