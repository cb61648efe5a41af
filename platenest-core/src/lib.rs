//! Platenest Core
//!
//! Core types and abstractions for the Platenest nesting system.
//!
//! This crate contains:
//! - Domain types: Job descriptors, parts, sheets, update events
//! - Wire codec: the JSON payloads exchanged with the solving engine

pub mod domain;
pub mod error;
pub mod wire;

pub use domain::job::{JobDescriptor, JobId, Part, Point, Sheet};
pub use domain::update::{JobStatus, NestingSolution, PlacementRecord, UpdateEvent};
pub use error::ValidationError;
