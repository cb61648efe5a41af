//! Update observers
//!
//! Caller-supplied observation logic for a job's event stream. The
//! coordinator forwards every event, including local decode failures, so
//! the caller can decide how to treat an unreliable job.

use platenest_core::UpdateEvent;
use platenest_engine::MalformedUpdate;

/// Receives every event the coordinator observes for one job
pub trait UpdateObserver: Send + Sync {
    /// Called for each decoded update, in emission order
    fn on_update(&self, event: &UpdateEvent);

    /// Called when a received payload failed to decode.
    ///
    /// Default: ignore; the stream continues either way.
    fn on_malformed(&self, error: &MalformedUpdate) {
        let _ = error;
    }
}

/// Plain closures observe updates (decode failures keep the default)
impl<F> UpdateObserver for F
where
    F: Fn(&UpdateEvent) + Send + Sync,
{
    fn on_update(&self, event: &UpdateEvent) {
        self(event)
    }
}
