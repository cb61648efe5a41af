//! Wire codec
//!
//! The job submission payload and every update event cross the engine
//! boundary as self-describing JSON text: field-named, numbers as 64-bit
//! floats, the timeout as integer milliseconds, ids as strings. This module
//! owns the encode/decode entry points so both sides agree on one format.
//!
//! Decoding a descriptor re-runs full validation: a payload that parses but
//! violates an invariant is rejected before it can reach the engine.

use serde::Serialize;

use crate::domain::job::JobDescriptor;
use crate::domain::update::UpdateEvent;
use crate::error::ValidationError;

/// Errors raised while decoding a wire payload
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload is not valid JSON or does not match the schema
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but the descriptor violates an invariant
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Serializes a descriptor to its JSON wire form
pub fn encode_descriptor(descriptor: &JobDescriptor) -> Vec<u8> {
    encode(descriptor)
}

/// Parses and validates a descriptor from its JSON wire form.
///
/// Applies the same normalization as [`JobDescriptor::build`]: an empty
/// `rotations` set means "no rotation" and decodes as `[0.0]`.
pub fn decode_descriptor(payload: &[u8]) -> Result<JobDescriptor, WireError> {
    let mut descriptor: JobDescriptor = serde_json::from_slice(payload)?;
    descriptor.normalize();
    descriptor.validate()?;
    Ok(descriptor)
}

/// Serializes an update event to its JSON wire form
pub fn encode_update(event: &UpdateEvent) -> Vec<u8> {
    encode(event)
}

/// Parses an update event from its JSON wire form
pub fn decode_update(payload: &[u8]) -> Result<UpdateEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}

// Serialization of these derive-only types cannot fail.
fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}
