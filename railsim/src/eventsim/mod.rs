//! Discrete event simulation kernel: timeline, clock and change log.

pub mod changelog;
pub mod event;
pub mod simulation;
mod error;

pub use self::changelog::*;
pub use self::error::SimulationError;
pub use self::event::*;
pub use self::simulation::*;
