// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Engine module organization - core simulation engine components
// ABOUTME: Provides clean internal structure for engine subsystems

pub mod climate;
pub mod core;
pub mod crown;
pub mod error;
pub mod leaf_flux;
pub mod scheduler;
pub mod seedbank;
pub mod soil;
pub mod species;
pub mod summary;
pub mod tree;
pub mod treefall;
pub mod voxel;

pub use climate::{ClimateDay, ClimateSeries, DaytimeProfile};
pub use core::config::SimulationConfig;
pub use error::{TrollError, TrollResult, TrollWarning};
pub use scheduler::Simulation;
pub use species::{Species, SpeciesTable};
pub use summary::StandSummary;
pub use tree::Tree;
