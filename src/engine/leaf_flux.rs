// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Iterative leaf-temperature / stomatal-conductance / photosynthesis solver
// ABOUTME: Farquhar-von Caemmerer-Berry carboxylation coupled to Medlyn stomata and Penman-Monteith

use super::core::lookup::LookupTables;
use super::error::{guard_finite, TrollWarning};

/// Growth-respiration daytime multiplier on dark respiration (spec 4.3).
const DAYRESP: f64 = 0.6;
/// Unit conversion: per-leaf umol C m^-2 s^-1 -> g C per timestep
/// (`3600 * 365.25 * 12 * 1e-6`, spec 4.3).
pub const UMOL_TO_GC_PER_YEAR_HOUR: f64 = 15.7788;

/// Latent heat of vaporization of water, J/g.
const LAMBDA: f64 = 2454.0;
/// Specific heat of air at constant pressure, J/(g K).
const CP_AIR: f64 = 1.012;
/// Molar mass of air, g/mol (`AIRMA` in spec 4.3's T_leaf update).
const AIRMA: f64 = 28.96;

/// Conditions driving the solver for a single crown voxel-layer.
#[derive(Debug, Clone, Copy)]
pub struct LeafEnvironment {
    /// Absorbed PPFD, umol photons m^-2 s^-1.
    pub absorbed_ppfd: f64,
    pub vpd_air: f64,
    pub t_air: f64,
    pub wind: f64,
    /// Incident PPFD above the tree (used for the small NIR term in R_ni).
    pub incident_ppfd_above: f64,
}

/// Species-level photosynthetic capacity at 25C, already corrected for this tree's
/// intraspecific multipliers and (if applicable) non-stomatal water stress.
#[derive(Debug, Clone, Copy)]
pub struct LeafCapacity {
    pub vcmax25: f64,
    pub jmax25: f64,
    pub rdark25: f64,
}

/// Per-leaf-area output of the solver, both rates per spec 4.3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafFlux {
    /// Net assimilation, umol C m^-2 s^-1.
    pub a_net: f64,
    /// Transpiration, umol H2O m^-2 s^-1 (per-leaf-area rate, spec 4.3).
    pub transpiration: f64,
    pub leaf_temperature: f64,
}

/// Smaller root of `a*x^2 + b*x + c = 0`. Electron transport `J` takes this root
/// (the standard non-rectangular-hyperbola convention).
fn quadratic_smaller_root(a: f64, b: f64, c: f64) -> f64 {
    if a.abs() < 1e-12 {
        return if b.abs() > 1e-12 { -c / b } else { 0.0 };
    }
    let disc = (b * b - 4.0 * a * c).max(0.0);
    let sq = disc.sqrt();
    let r1 = (-b + sq) / (2.0 * a);
    let r2 = (-b - sq) / (2.0 * a);
    r1.min(r2)
}

/// Larger root of `a*x^2 + b*x + c = 0`. `A_net` takes this root per spec 4.3 step 2a.
fn quadratic_larger_root(a: f64, b: f64, c: f64) -> f64 {
    if a.abs() < 1e-12 {
        return if b.abs() > 1e-12 { -c / b } else { 0.0 };
    }
    let disc = (b * b - 4.0 * a * c).max(0.0);
    let sq = disc.sqrt();
    let r1 = (-b + sq) / (2.0 * a);
    let r2 = (-b - sq) / (2.0 * a);
    r1.max(r2)
}

/// Electron transport rate from the smoothed non-rectangular hyperbola:
/// `theta*J^2 - (phi*I + Jmax)*J + phi*I*Jmax = 0`.
fn electron_transport(theta: f64, phi: f64, absorbed_ppfd: f64, jmax: f64) -> f64 {
    let i_term = phi * absorbed_ppfd;
    quadratic_smaller_root(theta, -(i_term + jmax), i_term * jmax)
}

/// Solve the coupled Medlyn-gs / Farquhar quadratic in `A_net` for one limiting
/// process (Rubisco- or RuBP-limited), given effective capacity `vmax_or_j4`,
/// effective Michaelis term `km_or_2gamma`, `gamma_star`, `rday`, ambient CO2
/// `cs`, and Medlyn slope term `k = (1 + g1*WSF/sqrt(Ds)) / cs`.
fn solve_limited_a_net(vmax_or_j4: f64, km_or_2gamma: f64, gamma_star: f64, rday: f64, cs: f64, g0: f64, k: f64) -> f64 {
    let p = cs + km_or_2gamma;
    let q = cs - gamma_star;
    let a2 = p * k - 1.0;
    let a1 = p * g0 + rday * (p * k - 1.0) - vmax_or_j4 * (q * k - 1.0);
    let a0 = g0 * (rday * p - vmax_or_j4 * q);
    quadratic_larger_root(a2, a1, a0)
}

/// Run the leaf solver with the water module enabled: iterate leaf temperature,
/// Medlyn stomatal conductance, and Penman-Monteith transpiration to convergence
/// (spec 4.3 step 2, at most 30 iterations, `|delta T_leaf| < 0.01`).
#[allow(clippy::too_many_arguments)]
pub fn solve_with_water(
    env: LeafEnvironment,
    capacity: LeafCapacity,
    tables: &LookupTables,
    g0: f64,
    g1: f64,
    wsf: f64,
    wsf_a: f64,
    theta: f64,
    phi: f64,
    cair: f64,
    press: f64,
    warnings: &mut Vec<TrollWarning>,
) -> LeafFlux {
    let vpd_a = env.vpd_air.max(0.0005); // spec 4.3: VPD_a floored at 0.0005 kPa
    let mut t_leaf = env.t_air;
    let mut cs = cair;
    let mut d_s = vpd_a;
    let mut a_net = 0.0;
    let mut e = 0.0;

    for _ in 0..30 {
        let km = tables.km_co2.get(t_leaf);
        let gamma_star = tables.gamma_star.get(t_leaf);
        let vcmax = capacity.vcmax25 * tables.vcmax_factor.get(t_leaf) * wsf_a;
        let jmax = capacity.jmax25 * tables.jmax_factor.get(t_leaf) * wsf_a;
        let rday = capacity.rdark25 * tables.rdark_factor.get(t_leaf) * DAYRESP;

        let k = (1.0 + g1 * wsf / d_s.sqrt()) / cs.max(1e-6);

        let a_c = solve_limited_a_net(vcmax, km, gamma_star, rday, cs, g0, k);
        let j = electron_transport(theta, phi, env.absorbed_ppfd, jmax);
        let a_j = solve_limited_a_net(j / 4.0, 2.0 * gamma_star, gamma_star, rday, cs, g0, k);

        let new_a_net = guard_finite(a_c.min(a_j), 0.0, "leaf_flux::a_net", warnings);
        let gs_c = (g0 + k * new_a_net.max(0.0)).max(g0.max(1e-6));

        // Isothermal net radiation (spec 4.3 step 2b).
        let r_ni = 0.2188 * env.absorbed_ppfd + 0.00005 * env.incident_ppfd_above;
        let delta = tables.vpd_slope.get(t_leaf);
        let gamma_psychro = 0.0667 * press / 101.3;
        let gbh = 0.147 * env.wind.max(0.01).sqrt();
        let gv = 1.6 * gs_c; // stomatal conductance to water vapor
        let total_conductance = if gbh + gv > 1e-9 {
            (gbh * gv) / (gbh + gv)
        } else {
            1e-6
        };
        let gv_safe = total_conductance.max(1e-6); // spec 4.3: "Penman-Monteith guards GV>0"

        let new_e = guard_finite(
            (delta * r_ni + CP_AIR * d_s * 1000.0 * gbh) / (LAMBDA * (delta + gamma_psychro * (1.0 + gbh / gv_safe))),
            0.0,
            "leaf_flux::transpiration",
            warnings,
        )
        .max(0.0);

        let gbh_ratio = if gbh > 1e-9 { total_conductance / gbh } else { 1.0 };
        let new_cs = (cair - new_a_net * gbh_ratio / gbh.max(1e-6)).max(1.0);
        let new_d_s = (new_e * press / gv_safe).max(0.0005);
        let new_t_leaf = env.t_air + 0.25 * (r_ni - LAMBDA * new_e) / (gbh.max(1e-6) * CP_AIR * AIRMA);

        let delta_t = (new_t_leaf - t_leaf).abs();
        a_net = new_a_net;
        e = new_e;
        cs = new_cs;
        d_s = new_d_s;
        t_leaf = new_t_leaf;

        if delta_t < 0.01 {
            break;
        }
    }

    LeafFlux {
        a_net,
        transpiration: e,
        leaf_temperature: t_leaf,
    }
}

/// Run the solver with the water module disabled: Farquhar collapses to a closed
/// form with `ci/ca = g1 / (g1 + sqrt(VPD))` (spec 4.3, last paragraph). No
/// leaf-temperature iteration is needed in this path.
pub fn solve_without_water(
    env: LeafEnvironment,
    capacity: LeafCapacity,
    tables: &LookupTables,
    g0: f64,
    g1: f64,
    theta: f64,
    phi: f64,
    cair: f64,
    press: f64,
    warnings: &mut Vec<TrollWarning>,
) -> LeafFlux {
    let vpd_a = env.vpd_air.max(0.0005);
    let t_leaf = env.t_air;
    let km = tables.km_co2.get(t_leaf);
    let gamma_star = tables.gamma_star.get(t_leaf);
    let vcmax = capacity.vcmax25 * tables.vcmax_factor.get(t_leaf);
    let jmax = capacity.jmax25 * tables.jmax_factor.get(t_leaf);
    let rday = capacity.rdark25 * tables.rdark_factor.get(t_leaf) * DAYRESP;

    let ci_over_ca = g1 / (g1 + vpd_a.sqrt());
    let ci = (ci_over_ca * cair).max(gamma_star + 1.0);

    let a_c = vcmax * (ci - gamma_star) / (ci + km);
    let j = electron_transport(theta, phi, env.absorbed_ppfd, jmax);
    let a_j = j / 4.0 * (ci - gamma_star) / (ci + 2.0 * gamma_star);
    let a_net = guard_finite(a_c.min(a_j) - rday, 0.0, "leaf_flux::a_net_no_water", warnings);

    let gs_c = if cair > ci { (a_net / (cair - ci)).max(g0) } else { g0.max(1e-6) };
    let gv = 1.6 * gs_c;
    let e = (gv * vpd_a / press).max(0.0);

    LeafFlux {
        a_net,
        transpiration: e,
        leaf_temperature: t_leaf,
    }
}
