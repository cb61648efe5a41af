//! Platenest Host
//!
//! The caller side of the nesting protocol.
//!
//! This crate provides the [`Coordinator`], which owns the job registry and
//! the receive half of every update channel, hands descriptors to a
//! [`SolvingEngine`], forwards events to caller-supplied observers, and is
//! the sole authority on when the hosting process may exit.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use platenest_core::{JobDescriptor, JobId, Part, Point, Sheet};
//! use platenest_engine::{EngineConfig, NestEngine};
//! use platenest_host::Coordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = NestEngine::new(EngineConfig::default());
//!     engine.initialize()?;
//!     let coordinator = Coordinator::new(Arc::new(engine));
//!
//!     let descriptor = JobDescriptor::build(
//!         JobId::generate(),
//!         1.0,
//!         Duration::from_secs(60),
//!         vec![Part {
//!             quantity: 5,
//!             contour: vec![
//!                 Point::new(0.0, 0.0),
//!                 Point::new(1.0, 0.0),
//!                 Point::new(1.0, 1.0),
//!             ],
//!             rotations: vec![0.0, 180.0],
//!         }],
//!         vec![Sheet { length: 10.0, width: 20.0, cost: 5.0 }],
//!     )?;
//!
//!     let handle = coordinator
//!         .run_job(descriptor, Arc::new(|event: &platenest_core::UpdateEvent| {
//!             println!("{:?}: {:?}", event.job_id, event.status);
//!         }))
//!         .await?;
//!
//!     let terminal = handle.await_terminal().await?;
//!     println!("finished: {:?}", terminal.status);
//!     coordinator.wait_all().await?;
//!     Ok(())
//! }
//! ```

mod coordinator;
mod observer;

pub use coordinator::{Coordinator, HostError, JobHandle};
pub use observer::UpdateObserver;
