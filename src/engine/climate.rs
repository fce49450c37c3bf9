// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: In-memory climate and daytime-variation series (spec section 6, `-m`/`-d` files)
// ABOUTME: Parsing those files is out of scope; callers hand in already-decoded vectors

use serde::{Deserialize, Serialize};

/// One day (or one iteration) of the climate series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateDay {
    pub t_day: f64,
    pub t_night: f64,
    pub rain_mm: f64,
    pub wind_speed: f64,
    pub shortwave_irradiance: f64,
    pub vpd: f64,
}

/// The `-m` climate file, decoded into memory. Selection is modulo `period` under
/// [`ClimateMode::Periodic`](crate::engine::core::config::ClimateMode), or direct
/// indexing with no wraparound under `FullSeries` (spec 4.8 step 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClimateSeries {
    days: Vec<ClimateDay>,
}

impl ClimateSeries {
    pub fn new(days: Vec<ClimateDay>) -> Self {
        Self { days }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Select today's climate vector for iteration `iter`, per spec 4.8 step 1.
    /// `full_series` disables the modulo wraparound (clamping to the last entry
    /// instead, since `FullSeries` runs are expected to supply `nbiter` entries).
    pub fn select(&self, iter: u64, full_series: bool) -> ClimateDay {
        if self.days.is_empty() {
            return ClimateDay {
                t_day: 25.0,
                t_night: 20.0,
                rain_mm: 0.0,
                wind_speed: 1.0,
                shortwave_irradiance: 400.0,
                vpd: 1.0,
            };
        }
        let idx = if full_series {
            (iter as usize).min(self.days.len() - 1)
        } else {
            (iter as usize) % self.days.len()
        };
        self.days[idx]
    }
}

/// Normalised intra-day profile (mean 1, sums to `nbsteps_varday`) for light, VPD,
/// temperature and wind, from the `-d` daytime-variation file (spec section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaytimeProfile {
    pub light: Vec<f64>,
    pub vpd: Vec<f64>,
    pub temperature: Vec<f64>,
    pub wind: Vec<f64>,
    /// Hours of day covered by this profile (spec 4.3's `nbhours_covered`).
    pub nbhours_covered: f64,
}

impl DaytimeProfile {
    pub fn nbsteps(&self) -> usize {
        self.light.len()
    }

    /// A flat profile with a single daylight step, useful for tests and the demo
    /// binary where a full intra-day time series isn't available.
    pub fn flat_single_step(nbhours_covered: f64) -> Self {
        Self {
            light: vec![1.0],
            vpd: vec![1.0],
            temperature: vec![1.0],
            wind: vec![1.0],
            nbhours_covered,
        }
    }
}
