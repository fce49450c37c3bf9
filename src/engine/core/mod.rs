// ABOUTME: Core engine foundation - fundamental data structures shared by every subsystem
// ABOUTME: Grid storage, the deterministic RNG, and lookup tables live here

pub mod config;
pub mod grid;
pub mod lookup;
pub mod rng;

pub use config::SimulationConfig;
pub use grid::Grid;
pub use rng::SimRng;
