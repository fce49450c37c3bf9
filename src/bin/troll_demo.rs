// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Minimal CLI demo that drives a Simulation for a handful of iterations
// ABOUTME: Synthesizes in-memory species/climate/daytime inputs; no file parsing (out of scope)

use clap::Parser;

use troll::engine::climate::{ClimateDay, ClimateSeries, DaytimeProfile};
use troll::engine::core::config::SimulationConfig;
use troll::engine::species::{Species, SpeciesTable};
use troll::engine::Simulation;

#[derive(Parser)]
#[command(name = "troll-demo")]
#[command(about = "Run a small TROLL forest-dynamics simulation and print per-iteration summaries")]
struct DemoArgs {
    /// Grid rows
    #[arg(long, default_value = "30")]
    rows: usize,

    /// Grid columns
    #[arg(long, default_value = "30")]
    cols: usize,

    /// Number of timesteps to run
    #[arg(long, default_value = "50")]
    nbiter: u64,

    /// RNG seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Enable the soil-water coupling
    #[arg(long)]
    water: bool,

    /// Enable the rayon-parallel growth pass
    #[arg(long)]
    parallel: bool,
}

/// A handful of representative tropical-forest species, standing in for an
/// ingested `-s` species file (parsing that file is out of this engine's scope).
fn demo_species() -> Vec<Species> {
    vec![
        Species {
            name: "Pioneer".to_string(),
            lma: 60.0,
            nmass: 0.025,
            pmass: 0.0015,
            wsg: 0.35,
            dbhmax: 0.6,
            hmax: 30.0,
            ah: 0.3,
            ds: 25.0,
            seedmass_wet: 0.5,
            regional_frequency: 0.5,
            tlp: -1.5,
            leafarea_cm2: 40.0,
            seeds_external: 20,
        },
        Species {
            name: "Canopy".to_string(),
            lma: 90.0,
            nmass: 0.018,
            pmass: 0.001,
            wsg: 0.65,
            dbhmax: 1.1,
            hmax: 45.0,
            ah: 0.5,
            ds: 15.0,
            seedmass_wet: 5.0,
            regional_frequency: 0.3,
            tlp: -2.2,
            leafarea_cm2: 60.0,
            seeds_external: 5,
        },
        Species {
            name: "Emergent".to_string(),
            lma: 110.0,
            nmass: 0.014,
            pmass: 0.0008,
            wsg: 0.8,
            dbhmax: 1.8,
            hmax: 55.0,
            ah: 0.7,
            ds: 10.0,
            seedmass_wet: 15.0,
            regional_frequency: 0.2,
            tlp: -2.8,
            leafarea_cm2: 80.0,
            seeds_external: 2,
        },
    ]
}

/// A short, hand-built climate series standing in for an ingested `-m` file.
fn demo_climate() -> ClimateSeries {
    ClimateSeries::new(vec![
        ClimateDay { t_day: 28.0, t_night: 23.0, rain_mm: 6.0, wind_speed: 1.2, shortwave_irradiance: 520.0, vpd: 1.1 },
        ClimateDay { t_day: 30.0, t_night: 24.0, rain_mm: 0.0, wind_speed: 1.8, shortwave_irradiance: 620.0, vpd: 1.6 },
        ClimateDay { t_day: 26.0, t_night: 22.0, rain_mm: 18.0, wind_speed: 0.8, shortwave_irradiance: 380.0, vpd: 0.7 },
    ])
}

fn main() {
    let args = DemoArgs::parse();

    let cfg = SimulationConfig {
        rows: args.rows,
        cols: args.cols,
        nbiter: args.nbiter,
        seed: args.seed,
        water: args.water,
        parallel_growth: args.parallel,
        ..SimulationConfig::default()
    };

    println!(
        "troll-demo: {}x{} sites, {} iterations, seed={}, water={}, parallel_growth={}",
        cfg.rows, cfg.cols, args.nbiter, cfg.seed, cfg.water, cfg.parallel_growth
    );

    let species = SpeciesTable::new(demo_species());
    let climate = demo_climate();
    let daytime = DaytimeProfile::flat_single_step(12.0);

    let mut sim = Simulation::new(cfg, species, climate, daytime);

    println!("iter\ttrees\tbasal_area_m2\tagb_kg\tgpp_gC\tnpp_gC");
    for _ in 0..args.nbiter {
        let summary = sim.step();
        println!(
            "{}\t{}\t{:.3}\t{:.1}\t{:.1}\t{:.1}",
            summary.iter,
            summary.total.abundance,
            summary.total.basal_area_m2,
            summary.total.agb_kg,
            summary.total.gpp_g_c,
            summary.total.npp_g_c,
        );
    }

    if !sim.warnings.is_empty() {
        eprintln!("{} warnings raised during the run (spec section 7: recoverable, non-fatal):", sim.warnings.len());
        for warning in sim.warnings.iter().take(10) {
            eprintln!("  {warning}");
        }
        if sim.warnings.len() > 10 {
            eprintln!("  ... and {} more", sim.warnings.len() - 10);
        }
    }
}
