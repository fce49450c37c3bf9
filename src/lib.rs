// ABOUTME: Library interface for the TROLL individual-tree forest simulation engine
// ABOUTME: Exposes the Simulation core while keeping subsystem internals in `engine`

pub mod engine;

// Re-export the core simulation types for library users.
pub use engine::{
    ClimateDay, ClimateSeries, DaytimeProfile, Simulation, SimulationConfig, Species, SpeciesTable,
    StandSummary, Tree, TrollError, TrollResult, TrollWarning,
};
