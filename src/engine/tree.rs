// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Per-tree state machine - allometry, carbon allocation, leaf demography, mortality
// ABOUTME: One `Tree` per occupied site; `None` in the scheduler's site array means bare ground

use super::core::config::{LaRegulation, SimulationConfig};
use super::core::rng::SimRng;
use super::error::TrollWarning;
use super::leaf_flux::{LeafCapacity, LeafFlux, UMOL_TO_GC_PER_YEAR_HOUR};
use super::species::Species;

/// Intraspecific multipliers sampled once at birth (spec section 3): correlated
/// lognormal draws for (N, P, LMA) plus independent lognormal draws for the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntraspecificMultipliers {
    pub height: f64,
    pub cr: f64,
    pub cd: f64,
    pub n: f64,
    pub p: f64,
    pub lma: f64,
    pub dbhmax: f64,
    pub wsg: f64,
}

impl IntraspecificMultipliers {
    /// Sample every multiplier for a newly recruited tree. `N`, `P`, `LMA` share a
    /// correlated trivariate lognormal draw; the rest are drawn independently
    /// (spec section 3's intraspecific variation block).
    pub fn sample(cfg: &SimulationConfig, rng: &mut SimRng) -> Self {
        let p = &cfg.intraspecific;
        let cov = [
            [p.sigma_n * p.sigma_n, p.corr_n_p * p.sigma_n * p.sigma_p, p.corr_n_lma * p.sigma_n * p.sigma_lma],
            [p.corr_n_p * p.sigma_n * p.sigma_p, p.sigma_p * p.sigma_p, p.corr_p_lma * p.sigma_p * p.sigma_lma],
            [p.corr_n_lma * p.sigma_n * p.sigma_lma, p.corr_p_lma * p.sigma_p * p.sigma_lma, p.sigma_lma * p.sigma_lma],
        ];
        let [n, pm, lma] = rng.multivariate_lognormal_3([0.0, 0.0, 0.0], cov);
        Self {
            height: rng.lognormal_mult(p.sigma_height),
            cr: rng.lognormal_mult(p.sigma_cr),
            cd: rng.lognormal_mult(p.sigma_cd),
            n,
            p: pm,
            lma,
            dbhmax: rng.lognormal_mult(p.sigma_dbhmax),
            wsg: rng.lognormal_mult(p.sigma_wsg),
        }
    }

    pub fn identity() -> Self {
        Self { height: 1.0, cr: 1.0, cd: 1.0, n: 1.0, p: 1.0, lma: 1.0, dbhmax: 1.0, wsg: 1.0 }
    }
}

/// Three-pool leaf age-class model (spec 4.4 leaf demography): young leaves mature,
/// mature leaves senesce, old leaves shed. `leaf_lifespan_iters` sets the turnover
/// timescale; each pool turns over in roughly a third of the total lifespan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeafPools {
    pub young: f64,
    pub mature: f64,
    pub old: f64,
}

impl LeafPools {
    pub fn total(&self) -> f64 {
        self.young + self.mature + self.old
    }

    /// Advance the pools by one sub-step of a leaf-demography update: `new_leaf_area`
    /// (can be negative, e.g. after a treefall strips canopy) enters the young pool,
    /// and a `1/3` share of each pool's lifespan turns over into the next stage.
    /// Returns the leaf area shed from the old pool this step (litterfall).
    pub fn step(&mut self, new_leaf_area: f64, leaf_lifespan_iters: f64) -> f64 {
        let k = (3.0 / leaf_lifespan_iters.max(1.0)).min(1.0);
        let young_to_mature = self.young * k;
        let mature_to_old = self.mature * k;
        let old_shed = self.old * k;
        self.young = (self.young + new_leaf_area - young_to_mature).max(0.0);
        self.mature = (self.mature + young_to_mature - mature_to_old).max(0.0);
        self.old = (self.old + mature_to_old - old_shed).max(0.0);
        old_shed
    }
}

/// A single live tree. Sites with no tree are represented as `None` in the
/// scheduler's site array rather than as a special "dead" variant of this struct.
#[derive(Debug, Clone)]
pub struct Tree {
    pub site: usize,
    pub sp_lab: usize,
    pub age_iter: u64,
    pub dbh: f64,
    pub height: f64,
    pub cr: f64,
    pub cd: f64,
    pub lai: f64,
    pub leaves: LeafPools,
    /// Non-structural carbohydrate reserve, g C.
    pub carbon_storage: f64,
    /// Cumulative treefall damage (spec 4.6): a height-equivalent quantity
    /// (meters, the Thurt scale), max-accumulated across hits rather than
    /// additive, unclamped (can exceed this tree's own height when struck by a
    /// taller neighbor's fall). Decays by `hurt_decay` per iteration and is
    /// cleared to 0 on death/replacement.
    pub hurt: f64,
    /// Treefall threshold `Ct`, drawn once at birth and fixed for this tree's
    /// lifetime (spec 4.4 Birth, spec 9: preserve the formula verbatim).
    pub ct: f64,
    pub multipliers: IntraspecificMultipliers,
    /// Consecutive iterations this tree has run a negative NPP (spec 9's
    /// NPPneg-vs-leaf-lifespan rule: the storage buffer absorbs short deficits
    /// before mortality risk rises).
    pub consecutive_negative_npp: u32,
}

/// `cr = max(cr_min, cr_a * dbh^cr_b) * mult_cr` (spec 4.4 allometry).
pub fn crown_radius(dbh: f64, cfg: &SimulationConfig, mult_cr: f64) -> f64 {
    (cfg.cr_a * dbh.powf(cfg.cr_b)).max(cfg.cr_min) * mult_cr
}

/// `cd = (cd_a + cd_b * height) * mult_cd` (spec 4.4 allometry), floored so a crown
/// always occupies at least one voxel layer.
pub fn crown_depth(height: f64, cfg: &SimulationConfig, mult_cd: f64) -> f64 {
    (cfg.cd_a + cfg.cd_b * height).max(0.5) * mult_cd
}

/// `height = hmax * dbh / (ah + dbh) * mult_height` (spec 4.4 allometry): a
/// Michaelis-Menten saturating curve toward the species' `hmax`.
pub fn height_from_dbh(dbh: f64, species: &Species, mult_height: f64) -> f64 {
    (species.hmax * dbh / (species.ah + dbh) * mult_height).max(0.1)
}

/// Maximum leaf area index this tree's current crown footprint can sustain,
/// `dens * cd`, optionally regulated toward the light the crown has actually
/// experienced (spec 4.4 Growth step 6, `_LA_regulation`).
pub fn la_max(cd: f64, cfg: &SimulationConfig, mean_transmittance: f64) -> f64 {
    let structural_max = cfg.dens * cd;
    match cfg.la_regulation {
        LaRegulation::Fixed => structural_max,
        LaRegulation::Storage | LaRegulation::Dynamic => structural_max * mean_transmittance.clamp(0.1, 1.0).sqrt(),
    }
}

impl Tree {
    /// Recruit a new tree at `site` (spec 4.7 `RecruitTree`): dbh/height at their
    /// documented initial values, leaf pools seeded at a small fraction of
    /// structural capacity, empty carbon reserve.
    pub fn birth(site: usize, sp_lab: usize, species: &Species, cfg: &SimulationConfig, rng: &mut SimRng) -> Self {
        let multipliers = IntraspecificMultipliers::sample(cfg, rng);
        let dbh = cfg.dbh0;
        let height = height_from_dbh(dbh, species, multipliers.height).max(cfg.h0);
        let cr = crown_radius(dbh, cfg, multipliers.cr);
        let cd = crown_depth(height, cfg, multipliers.cd);
        let initial_la = 0.3 * la_max(cd, cfg, 1.0);
        let ct = Self::draw_ct(species, cfg, multipliers.height, rng);
        Self {
            site,
            sp_lab,
            age_iter: 0,
            dbh,
            height,
            cr,
            cd,
            lai: initial_la,
            leaves: LeafPools { young: initial_la, mature: 0.0, old: 0.0 },
            carbon_storage: 0.0,
            hurt: 0.0,
            ct,
            multipliers,
            consecutive_negative_npp: 0,
        }
    }

    /// `Ct = min(Hmax-1, h_real_max*max(0, 1 - vC'*sqrt(-ln U)))` (spec 4.4
    /// Birth, spec 9: preserve verbatim). `h_real_max` is this tree's own
    /// realized asymptotic height (`species.hmax * mult_height`), so folding the
    /// multiplier in here means `vC'` (`cfg.ct_vc`) stays a flat constant across
    /// every tree without re-scaling the onset of treefall by `mult_height`.
    fn draw_ct(species: &Species, cfg: &SimulationConfig, mult_height: f64, rng: &mut SimRng) -> f64 {
        let u = rng.uniform01().clamp(1e-9, 1.0 - 1e-9);
        let h_real_max = species.hmax * mult_height;
        let onset = (1.0 - cfg.ct_vc * (-u.ln()).sqrt()).max(0.0);
        (cfg.height_max as f64 - 1.0).min(h_real_max * onset)
    }

    /// Per-timestep crown footprint area, pi*cr^2.
    pub fn crown_area(&self) -> f64 {
        std::f64::consts::PI * self.cr * self.cr
    }

    /// Sapwood cross-sectional area, a fixed fraction of basal area (spec 4.4).
    pub fn sapwood_area(&self) -> f64 {
        let basal_area = std::f64::consts::PI * (self.dbh / 2.0).powi(2);
        (0.15 * basal_area).max(1e-6)
    }

    /// Above-ground biomass, kg, via the standard pantropical allometry
    /// `AGB = wsg * dbh^2 * height` with a shape constant (spec glossary: AGB).
    pub fn agb(&self, species: &Species) -> f64 {
        const SHAPE_CONSTANT: f64 = 0.0673;
        SHAPE_CONSTANT * (species.wsg * self.multipliers.wsg * self.dbh.powi(2) * self.height).powf(0.976)
    }

    /// Photosynthetic capacity at 25C, derived from leaf nitrogen per area
    /// (`nmass * lma`) the way trait-based vegetation models relate Vcmax to leaf
    /// N content (spec glossary: Vcmax/Jmax/Rdark are species traits, not free
    /// per-tree parameters).
    pub fn leaf_capacity(&self, species: &Species) -> LeafCapacity {
        let n_area_g_m2 = species.nmass * self.multipliers.n * species.lma * self.multipliers.lma;
        let vcmax25 = (20.0 + 25.0 * n_area_g_m2).max(1.0);
        LeafCapacity {
            vcmax25,
            jmax25: vcmax25 * 1.9,
            rdark25: vcmax25 * 0.015,
        }
    }

    /// Gather per-layer [`LeafFlux`] results into whole-tree GPP, maintenance
    /// respiration terms, and net primary production, all in g C per iteration
    /// (spec 4.3/4.4: umol C m^-2 s^-1 -> g C via [`UMOL_TO_GC_PER_YEAR_HOUR`],
    /// scaled down from a full year to one iteration by `iterperyear`).
    pub fn aggregate_npp(&self, layer_fluxes: &[(f64, LeafFlux)], species: &Species, cfg: &SimulationConfig, rnight_q10: f64) -> NppBreakdown {
        let per_year_to_per_iter = 1.0 / cfg.iterperyear as f64;

        let gpp_umol_m2s: f64 = layer_fluxes.iter().map(|(area, flux)| area * flux.a_net.max(0.0)).sum();
        let rday_umol_m2s: f64 = layer_fluxes.iter().map(|(area, flux)| area * (-flux.a_net).max(0.0)).sum();

        let gpp = gpp_umol_m2s * UMOL_TO_GC_PER_YEAR_HOUR * per_year_to_per_iter;
        let rday = rday_umol_m2s * UMOL_TO_GC_PER_YEAR_HOUR * per_year_to_per_iter;

        let total_leaf_area = self.leaves.total().max(1e-6);
        let rnight = species.nmass * self.multipliers.n * total_leaf_area * rnight_q10 * per_year_to_per_iter;
        let rstem = self.sapwood_area() * self.height * rnight_q10 * 0.02 * per_year_to_per_iter;

        let npp = (gpp - rday - rnight - rstem).max(-self.carbon_storage.max(0.0));
        NppBreakdown { gpp, rday, rnight, rstem, npp }
    }

    /// Split net primary production into canopy, wood, and reserve pools (spec
    /// 4.4 Growth step, `falloccanopy`/`fallocwood`), update the carbon reserve,
    /// and grow `dbh` from the wood share via a stem-volume increment. When
    /// `npp` is negative the deficit is drawn from storage instead.
    /// Returns the leaf area shed as litterfall this step (0 when NPP was
    /// negative, since no canopy turnover is driven without a growth allocation).
    pub fn allocate_growth(&mut self, npp: NppBreakdown, species: &Species, cfg: &SimulationConfig, warnings: &mut Vec<TrollWarning>) -> f64 {
        let mut litterfall = 0.0;
        if npp.npp < 0.0 {
            self.carbon_storage = (self.carbon_storage + npp.npp).max(0.0);
            self.consecutive_negative_npp += 1;
        } else {
            self.consecutive_negative_npp = 0;
            let to_canopy = npp.npp * cfg.falloccanopy;
            let to_wood = npp.npp * cfg.fallocwood;
            let to_storage = npp.npp * (1.0 - cfg.falloccanopy - cfg.fallocwood).max(0.0);

            let leaf_lifespan_iters = species.leaf_lifespan_iters();
            let new_leaf_area = to_canopy / (species.lma * 1e-4).max(1e-6) * 1e-6;
            litterfall = self.leaves.step(new_leaf_area, leaf_lifespan_iters);

            // Delta-dbh (spec 4.4 step 7): wood-share carbon spread over the stem's
            // lateral surface, tapered by `(3 - dbh/(dbh+ah))` and capped as dbh
            // approaches dbhmax by `max(0, 3 - 2*dbh/dbhmax)`.
            let wood_density = (species.wsg * self.multipliers.wsg).max(0.1);
            let ah = species.ah.max(1e-6);
            let taper = (3.0 - self.dbh / (self.dbh + ah)).max(0.01);
            let dbhmax = (species.dbhmax * self.multipliers.dbhmax).max(1e-6);
            let approach_cap = (3.0 - 2.0 * self.dbh / dbhmax).max(0.0);
            let ddbh = (2.0 * to_wood) / (wood_density * self.height.max(1.0) * (2.0 * std::f64::consts::PI * (self.dbh / 2.0).max(0.01)) * taper) * approach_cap;
            let ddbh = if ddbh.is_finite() { ddbh.max(0.0) } else { 0.0 };
            // `approach_cap` already tapers growth to zero at dbh == 1.5*dbhmax;
            // this is a safety ceiling, not the growth limiter itself (I6).
            self.dbh = (self.dbh + ddbh).min(1.5 * dbhmax);
            self.carbon_storage += to_storage;
        }

        self.height = height_from_dbh(self.dbh, species, self.multipliers.height);
        self.cr = crown_radius(self.dbh, cfg, self.multipliers.cr);
        self.cd = crown_depth(self.height, cfg, self.multipliers.cd);
        self.lai = self.leaves.total();
        self.age_iter += 1;

        if self.lai < 0.0 {
            warnings.push(TrollWarning::TreeAnomaly { site: self.site, context: "negative leaf area after growth" });
            self.lai = 0.0;
        }
        litterfall
    }

    /// Probability this tree dies this iteration (spec 4.4 Death step): a fixed
    /// background rate `m`, an additional rate `m1` scaled by how long the NPPneg
    /// streak has run relative to this species' leaf lifespan, and extra risk
    /// from unrepaired treefall damage (scaled to the tree's own height, since
    /// `hurt` itself is a height-equivalent quantity, not a `[0,1]` fraction).
    pub fn mortality_probability(&self, species: &Species, cfg: &SimulationConfig) -> f64 {
        let background = cfg.m;
        let stress = cfg.m1 * (self.consecutive_negative_npp as f64 / species.leaf_lifespan_iters()).min(1.0);
        let damage_fraction = (self.hurt / self.height.max(1.0)).clamp(0.0, 1.0);
        let damage = damage_fraction * 0.5;
        (background + stress + damage).clamp(0.0, 1.0)
    }

    /// Roll the dice for death this iteration.
    pub fn maybe_die(&self, species: &Species, cfg: &SimulationConfig, rng: &mut SimRng) -> bool {
        rng.uniform01() < self.mortality_probability(species, cfg)
    }

    /// Apply treefall damage (spec 4.6): `hurt` max-accumulates toward
    /// `damage_height` (a height-equivalent magnitude, not a `[0,1]` fraction)
    /// and decays by `hurt_decay` per iteration when not re-hit. Canopy loss is
    /// proportional to how much of this tree's own height the hit represents.
    pub fn apply_treefall_hit(&mut self, damage_height: f64) {
        self.hurt = self.hurt.max(damage_height.max(0.0));
        let fraction = (damage_height / self.height.max(1e-6)).clamp(0.0, 1.0);
        self.lai *= (1.0 - fraction).max(0.0);
        self.leaves.young *= (1.0 - fraction).max(0.0);
        self.leaves.mature *= (1.0 - fraction).max(0.0);
        self.leaves.old *= (1.0 - fraction).max(0.0);
    }

    pub fn decay_hurt(&mut self, hurt_decay: f64) {
        self.hurt = (self.hurt * (1.0 - hurt_decay)).max(0.0);
    }
}

/// Whole-tree carbon flux breakdown for one iteration, g C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NppBreakdown {
    pub gpp: f64,
    pub rday: f64,
    pub rnight: f64,
    pub rstem: f64,
    pub npp: f64,
}
