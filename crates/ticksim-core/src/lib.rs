#![warn(missing_docs)]
#![doc = include_str!("../readme.md")]

pub mod context;
pub mod deferred;
pub mod log;
pub mod simulation;
mod state;
pub mod timed;

pub use colored;
pub use context::SimulationContext;
pub use deferred::{DeferredEvent, DeferredEventId, DeferredStatus};
pub use simulation::Simulation;
pub use state::NEVER;
pub use timed::{Id, Timed};
