//! Platenest Engine
//!
//! The solving side of the nesting protocol.
//!
//! Architecture:
//! - Channel: ordered, exactly-once update delivery from engine to caller
//! - Engine: the [`SolvingEngine`] contract and [`NestEngine`], which runs
//!   each accepted job on its own tokio task under a parallelism bound
//! - Solver: the [`PlacementSolver`] seam and the default [`ShelfSolver`]
//! - Configuration: engine tuning from environment or defaults
//!
//! A submission never blocks the caller: `submit` registers the job, hands
//! it to a task, and returns. All results arrive through the update channel,
//! ending with exactly one terminal event per job.

pub mod channel;
pub mod config;
pub mod engine;
pub mod solver;

pub use channel::{ChannelEvent, MalformedUpdate, SinkClosed, UpdateSink, UpdateStream, update_channel};
pub use config::EngineConfig;
pub use engine::{EngineError, NestEngine, SolvingEngine};
pub use solver::{PlacementSolver, ShelfSolver, SolveContext, SolveError};
