// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Treefall disturbance: primary falls from Ct exceedance, secondary from canopy hits
// ABOUTME: Two passes per timestep (spec 4.6): secondary damage first, then primary treefalls

use super::core::config::SimulationConfig;
use super::core::rng::SimRng;

/// One site's outcome from a treefall pass this iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreefallHit {
    pub site: usize,
    pub severity: f64,
}

/// Scatter a fallen tree's damage along a uniformly drawn direction: every site
/// within `height` meters of `site` along that line takes a hit whose
/// height-equivalent magnitude decays linearly with distance (spec 4.6's damage
/// strip/crown footprint, simplified to one direction-weighted strip).
fn scatter_fall_damage(site: usize, height: f64, cols: usize, nb_sites: usize, rng: &mut SimRng) -> Vec<TreefallHit> {
    let angle = rng.uniform_angle();
    let (dx, dy) = (angle.cos(), angle.sin());
    let row = (site / cols) as f64;
    let col = (site % cols) as f64;
    let reach = height.ceil().max(1.0) as i64;
    let mut hits = Vec::new();
    for step in 1..=reach {
        let nr = (row + dy * step as f64).round();
        let nc = (col + dx * step as f64).round();
        if nr < 0.0 || nc < 0.0 {
            continue;
        }
        let (nr, nc) = (nr as usize, nc as usize);
        if nc >= cols {
            continue;
        }
        let target = nr * cols + nc;
        if target >= nb_sites || target == site {
            continue;
        }
        let damage_height = height * (1.0 - step as f64 / reach as f64).clamp(0.0, 1.0);
        hits.push(TreefallHit { site: target, severity: damage_height });
    }
    hits
}

/// Primary (wind-stress) treefall pass (spec 4.6 step 2): draw
/// `c_flex = (1 - (1-U)/(12*timestep))*height`; if `c_flex > Ct`, the tree falls
/// at a uniform angle and scatters damage into its reach.
pub fn primary_treefalls<F: Fn(usize) -> Option<(f64, f64)>>(
    nb_sites: usize,
    cols: usize,
    height_ct_of: F,
    timestep: f64,
    rng: &mut SimRng,
) -> (Vec<usize>, Vec<TreefallHit>) {
    let mut fallen = Vec::new();
    let mut hits = Vec::new();

    for site in 0..nb_sites {
        let Some((height, ct)) = height_ct_of(site) else { continue };
        let u = rng.uniform01();
        let c_flex = (1.0 - (1.0 - u) / (12.0 * timestep.max(1e-9))) * height;
        if c_flex <= ct {
            continue;
        }
        fallen.push(site);
        hits.extend(scatter_fall_damage(site, height, cols, nb_sites, rng));
    }

    (fallen, hits)
}

/// Secondary treefall pass (spec 4.6 step 1, runs first against last
/// timestep's damage field): for every live tree, if
/// `2*hurt*(1-(1-U)/(12*timestep)) > height/mult_height`, the tree either falls
/// (probability `p_tfsecondary`, scattering damage like a primary fall) or dies
/// in place with no further damage. Returns `(removed_sites, hits)`.
pub fn secondary_treefall_noise<F: Fn(usize) -> Option<(f64, f64, f64)>>(
    occupied_sites: &[usize],
    tree_of: F,
    cfg: &SimulationConfig,
    cols: usize,
    nb_sites: usize,
    timestep: f64,
    rng: &mut SimRng,
) -> (Vec<usize>, Vec<TreefallHit>) {
    let mut removed = Vec::new();
    let mut hits = Vec::new();

    for &site in occupied_sites {
        let Some((hurt, height, mult_height)) = tree_of(site) else { continue };
        let u = rng.uniform01();
        let stress = 2.0 * hurt * (1.0 - (1.0 - u) / (12.0 * timestep.max(1e-9)));
        if stress <= height / mult_height.max(1e-9) {
            continue;
        }
        if rng.uniform01() < cfg.p_tfsecondary * 0.01 {
            removed.push(site);
            hits.extend(scatter_fall_damage(site, height, cols, nb_sites, rng));
        } else {
            removed.push(site);
        }
    }

    (removed, hits)
}

/// Merge overlapping hits on the same site by taking the maximum severity, per
/// spec 4.6's "max-accumulation, not additive" rule.
pub fn merge_hits(hits: Vec<TreefallHit>) -> Vec<TreefallHit> {
    use std::collections::HashMap;
    let mut by_site: HashMap<usize, f64> = HashMap::new();
    for hit in hits {
        by_site
            .entry(hit.site)
            .and_modify(|s| *s = s.max(hit.severity))
            .or_insert(hit.severity);
    }
    by_site.into_iter().map(|(site, severity)| TreefallHit { site, severity }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trees_exceed_ct_means_no_falls() {
        let mut rng = SimRng::new(1);
        let (fallen, hits) = primary_treefalls(25, 5, |_| Some((10.0, 15.0)), 1.0, &mut rng);
        assert!(fallen.is_empty());
        assert!(hits.is_empty());
    }

    #[test]
    fn exceeding_ct_fells_the_tree_and_hits_neighbors() {
        let mut rng = SimRng::new(1);
        let (fallen, hits) = primary_treefalls(
            100,
            10,
            |site| if site == 55 { Some((30.0, 1.0)) } else { Some((5.0, 100.0)) },
            1.0,
            &mut rng,
        );
        assert_eq!(fallen, vec![55]);
        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(hit.severity >= 0.0 && hit.severity <= 30.0, "damage can't exceed the fallen tree's own height");
        }
    }

    #[test]
    fn merge_hits_takes_max_severity_not_sum() {
        let hits = vec![
            TreefallHit { site: 3, severity: 0.2 },
            TreefallHit { site: 3, severity: 0.7 },
            TreefallHit { site: 4, severity: 0.1 },
        ];
        let merged = merge_hits(hits);
        let site3 = merged.iter().find(|h| h.site == 3).unwrap();
        assert_eq!(site3.severity, 0.7);
    }

    #[test]
    fn secondary_noise_only_touches_occupied_sites() {
        let cfg = SimulationConfig { p_tfsecondary: 100.0, ..SimulationConfig::default() };
        let mut rng = SimRng::new(2);
        let occupied = vec![1, 2, 3];
        // hurt=100 against height=1 guarantees the stress term exceeds threshold.
        let (removed, hits) = secondary_treefall_noise(&occupied, |_| Some((100.0, 1.0, 1.0)), &cfg, 10, 100, 1.0, &mut rng);
        assert!(!removed.is_empty());
        for &site in &removed {
            assert!(occupied.contains(&site));
        }
        for hit in &hits {
            assert!(hit.severity >= 0.0 && hit.severity <= 1.0);
        }
    }

    #[test]
    fn zero_probability_secondary_noise_produces_no_hits() {
        let cfg = SimulationConfig { p_tfsecondary: 0.0, ..SimulationConfig::default() };
        let mut rng = SimRng::new(2);
        let occupied = vec![1, 2, 3, 4, 5];
        let (removed, hits) = secondary_treefall_noise(&occupied, |_| Some((100.0, 1.0, 1.0)), &cfg, 10, 100, 1.0, &mut rng);
        assert!(hits.is_empty());
        assert_eq!(removed.len(), occupied.len(), "stress exceeds threshold for every tree, so each dies in place");
    }

    #[test]
    fn stress_below_threshold_leaves_tree_untouched() {
        let cfg = SimulationConfig { p_tfsecondary: 100.0, ..SimulationConfig::default() };
        let mut rng = SimRng::new(2);
        let occupied = vec![1];
        let (removed, hits) = secondary_treefall_noise(&occupied, |_| Some((0.0, 10.0, 1.0)), &cfg, 10, 100, 1.0, &mut rng);
        assert!(removed.is_empty());
        assert!(hits.is_empty());
    }
}
