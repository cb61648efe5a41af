//! Core domain types
//!
//! This module contains the core domain structures used across Platenest
//! services. These types represent the fundamental business entities and are
//! shared between the caller (which builds descriptors) and the engine
//! (which reports updates).

pub mod job;
pub mod update;
