// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: 3D leaf-area-density voxel field (LAI3D) and the Beer-Lambert light kernel
// ABOUTME: Rebuilt from scratch every timestep before any tree reads from it (spec section 5)

use super::core::grid::Grid;
use super::core::lookup::LookupTables;

/// `LAI3D[h][site]`: leaf area index accumulated from the top of the canopy down to
/// height layer `h`, inclusive (spec section 3's invariant I8). Row `h = height_max`
/// is the topmost layer; row 0 is the ground.
pub struct VoxelField {
    /// `layers[h]` holds the leaf area *added* at height `h`, until
    /// [`accumulate_top_down`](Self::accumulate_top_down) turns it into a cumulative field.
    layers: Grid<f64>,
    height_max: usize,
    nb_sites: usize,
}

impl VoxelField {
    pub fn new(height_max: usize, nb_sites: usize) -> Self {
        Self {
            layers: Grid::new(nb_sites, height_max + 1, 0.0),
            height_max,
            nb_sites,
        }
    }

    pub fn height_max(&self) -> usize {
        self.height_max
    }

    pub fn nb_sites(&self) -> usize {
        self.nb_sites
    }

    /// Zero the whole field. Called once per timestep before any crown is added
    /// (spec 4.1 contract, spec 4.8 step 5).
    pub fn clear(&mut self) {
        self.layers.fill(0.0);
    }

    /// Add `density` leaf area at height layer `h`, site `site`. Out-of-range
    /// coordinates are silently ignored (crown voxels cropped at grid boundary,
    /// spec 4.2).
    pub fn add_density(&mut self, h: usize, site: usize, density: f64) {
        if h <= self.height_max && site < self.nb_sites {
            let current = *self.layers.get(site, h);
            self.layers.set(site, h, current + density);
        }
    }

    /// Raw (non-cumulative) density at a layer, mostly useful for tests.
    pub fn density_at(&self, h: usize, site: usize) -> f64 {
        *self.layers.get(site, h)
    }

    /// Turn the per-layer densities into the cumulative-from-the-top field:
    /// `LAI3D[h] = sum of densities at h and above` (spec 4.1 contract,
    /// section 3's "built bottom-up-then-accumulated-top-down").
    pub fn accumulate_top_down(&mut self) {
        for site in 0..self.nb_sites {
            let mut running = 0.0;
            for h in (0..=self.height_max).rev() {
                running += *self.layers.get(site, h);
                self.layers.set(site, h, running);
            }
        }
    }

    /// Cumulative leaf area at and above height layer `h`, site `site`.
    pub fn cumulative_at(&self, h: usize, site: usize) -> f64 {
        if h > self.height_max {
            return 0.0;
        }
        *self.layers.get(site, h)
    }

    /// `transmittance(h, site) = exp(-klight * LAI3D[h][site])`. Always in `[0, 1]`
    /// (spec section 8's energy invariant).
    pub fn transmittance(&self, h: usize, site: usize, klight: f64) -> f64 {
        (-klight * self.cumulative_at(h, site)).exp()
    }

    /// `incidentPPFD(h, site) = W_daily * average_flux(a_prev, delta)` where `a_prev`
    /// is the cumulative LAI strictly above `h` and `delta` is the density added at
    /// `h` itself (spec 4.1 contract).
    pub fn incident_ppfd(&self, h: usize, site: usize, w_daily: f64, tables: &LookupTables) -> f64 {
        let a_prev = if h < self.height_max {
            self.cumulative_at(h + 1, site)
        } else {
            0.0
        };
        let delta = self.cumulative_at(h, site) - a_prev;
        w_daily * tables.average_flux(a_prev, delta)
    }

    /// VPD decrement below the canopy, spec 4.1: floored at 0.25 once cumulative
    /// LAI above reaches 7. `l_above` is the cumulative LAI above the *bottom* of
    /// the layer (i.e. `a_prev`), `delta_l` is the layer's own LAI contribution.
    pub fn vpd_decrement(l_above: f64, delta_l: f64) -> f64 {
        if l_above >= 7.0 || delta_l <= 0.0 {
            return 0.25;
        }
        let top = (7.0 - l_above).max(0.0).powf(1.5);
        let bottom = (7.0 - l_above - delta_l).max(0.0).powf(1.5);
        (0.25 + 0.188982 * (top - bottom) / delta_l).max(0.25)
    }

    /// Temperature decrement below the canopy, spec 4.1, capped at 3 degrees C.
    pub fn temperature_decrement(l_above: f64, delta_l: f64) -> f64 {
        (0.4285714 * (l_above + 0.5 * delta_l)).min(3.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_zeroes_every_site_and_layer() {
        let mut field = VoxelField::new(10, 4);
        field.add_density(3, 2, 1.5);
        field.clear();
        assert_eq!(field.density_at(3, 2), 0.0);
    }

    #[test]
    fn accumulate_top_down_is_monotone_nonincreasing_with_height() {
        let mut field = VoxelField::new(5, 1);
        field.add_density(0, 0, 1.0);
        field.add_density(2, 0, 1.0);
        field.add_density(4, 0, 1.0);
        field.accumulate_top_down();
        for h in 0..5 {
            assert!(field.cumulative_at(h, 0) >= field.cumulative_at(h + 1, 0));
        }
        assert_eq!(field.cumulative_at(0, 0), 3.0);
        assert_eq!(field.cumulative_at(5, 0), 0.0);
    }

    #[test]
    fn empty_grid_has_zero_lai_everywhere() {
        let mut field = VoxelField::new(10, 100);
        field.accumulate_top_down();
        for site in 0..100 {
            assert_eq!(field.cumulative_at(0, site), 0.0);
        }
    }

    #[test]
    fn transmittance_bounded_0_1() {
        let mut field = VoxelField::new(5, 1);
        field.add_density(0, 0, 3.0);
        field.accumulate_top_down();
        let t = field.transmittance(0, 0, 0.5);
        assert!((0.0..=1.0).contains(&t));
    }

    #[test]
    fn overlapping_crowns_double_lai_in_overlap_region() {
        // Scenario 4 from spec section 8: two overlapping crowns at the same layer
        // each contributing LAI/CD should sum in the overlap.
        let mut field = VoxelField::new(5, 1);
        let per_crown = 3.0 / 2.0; // LAI=3, CD=2 -> LAI/CD
        field.add_density(2, 0, per_crown);
        field.add_density(2, 0, per_crown);
        field.accumulate_top_down();
        assert!((field.cumulative_at(2, 0) - 2.0 * per_crown).abs() < 1e-9);
    }

    #[test]
    fn add_density_out_of_bounds_is_ignored() {
        let mut field = VoxelField::new(5, 2);
        field.add_density(100, 0, 1.0);
        field.add_density(0, 100, 1.0);
        field.accumulate_top_down();
        assert_eq!(field.cumulative_at(0, 0), 0.0);
    }

    #[test]
    fn vpd_decrement_floors_at_quarter_kpa_above_lai_7() {
        assert_eq!(VoxelField::vpd_decrement(7.0, 1.0), 0.25);
        assert_eq!(VoxelField::vpd_decrement(8.0, 1.0), 0.25);
    }

    #[test]
    fn temperature_decrement_caps_at_3_degrees() {
        let decrement = VoxelField::temperature_decrement(20.0, 1.0);
        assert_eq!(decrement, 3.0);
    }
}
