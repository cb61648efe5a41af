//! Update event domain types
//!
//! The solving engine reports job state exclusively through
//! [`UpdateEvent`]s: zero or more progress events followed by exactly one
//! terminal event per job. Every event is tagged with the originating job id
//! so a multi-job caller can demultiplex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, Point};

/// Lifecycle state of a submitted job
///
/// Transitions: `Queued → Running → {Succeeded | Failed | TimedOut}`.
/// `Running` may repeat, carrying best-so-far solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Whether this status ends the event stream for its job
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// One placed part copy: which part, which copy, which sheet, where, and at
/// what angle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    /// Index into the descriptor's `parts`
    pub part_index: usize,
    /// Which copy of the part this is (0-based)
    pub instance: u32,
    /// Index into the descriptor's `sheets` for the sheet kind consumed
    pub sheet_index: usize,
    /// Ordinal of the physical sheet within the solution (0-based), so two
    /// copies of the same catalog sheet stay distinguishable
    pub sheet_instance: u32,
    /// Translation applied to the rotated contour's bounding-box corner
    pub position: Point,
    /// Applied rotation in degrees
    pub rotation: f64,
}

/// A complete or partial nesting result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestingSolution {
    /// One record per placed part copy, in placement order
    pub placements_and_location: Vec<PlacementRecord>,
    /// Number of sheets the solution consumes
    pub sheet_count: u32,
    /// Summed cost of the consumed sheets, the optimization objective
    pub total_cost: f64,
}

/// A single engine-to-caller report for one job
///
/// `nesting_solution` and `error` are mutually exclusive on `Failed`;
/// `TimedOut` carries the best solution found before the deadline when one
/// exists, otherwise an error explaining the exhaustion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Originating job, the demultiplexing tag
    #[serde(rename = "nesting_job_ulid")]
    pub job_id: JobId,
    pub status: JobStatus,
    pub nesting_solution: Option<NestingSolution>,
    pub error: Option<String>,
    /// When the engine emitted the event
    pub timestamp: DateTime<Utc>,
}

impl UpdateEvent {
    fn new(
        job_id: JobId,
        status: JobStatus,
        nesting_solution: Option<NestingSolution>,
        error: Option<String>,
    ) -> Self {
        Self {
            job_id,
            status,
            nesting_solution,
            error,
            timestamp: Utc::now(),
        }
    }

    /// Event for a job accepted but not yet running
    pub fn queued(job_id: JobId) -> Self {
        Self::new(job_id, JobStatus::Queued, None, None)
    }

    /// Event for a job that started executing
    pub fn running(job_id: JobId) -> Self {
        Self::new(job_id, JobStatus::Running, None, None)
    }

    /// Progress event carrying the best solution found so far
    pub fn progress(job_id: JobId, best: NestingSolution) -> Self {
        Self::new(job_id, JobStatus::Running, Some(best), None)
    }

    /// Terminal event for a completed job
    pub fn succeeded(job_id: JobId, solution: NestingSolution) -> Self {
        Self::new(job_id, JobStatus::Succeeded, Some(solution), None)
    }

    /// Terminal event for a failed job; the error string comes from the
    /// engine and is surfaced verbatim
    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Failed, None, Some(error.into()))
    }

    /// Terminal event for a job whose deadline expired.
    ///
    /// Carries the best-known solution if any progress was made, otherwise
    /// an error explaining the exhaustion.
    pub fn timed_out(job_id: JobId, best: Option<NestingSolution>) -> Self {
        let error = if best.is_none() {
            Some("search deadline exceeded before any solution was found".to_string())
        } else {
            None
        };
        Self::new(job_id, JobStatus::TimedOut, best, error)
    }

    /// Whether this is the job's final event
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_failed_event_is_error_only() {
        let event = UpdateEvent::failed(JobId::new("J1"), "part 0 does not fit");
        assert!(event.is_terminal());
        assert!(event.nesting_solution.is_none());
        assert_eq!(event.error.as_deref(), Some("part 0 does not fit"));
    }

    #[test]
    fn test_timed_out_without_solution_explains_exhaustion() {
        let event = UpdateEvent::timed_out(JobId::new("J1"), None);
        assert_eq!(event.status, JobStatus::TimedOut);
        assert!(event.nesting_solution.is_none());
        assert!(event.error.is_some());
    }

    #[test]
    fn test_timed_out_with_solution_carries_it() {
        let best = NestingSolution {
            placements_and_location: vec![],
            sheet_count: 1,
            total_cost: 5.0,
        };
        let event = UpdateEvent::timed_out(JobId::new("J1"), Some(best.clone()));
        assert_eq!(event.nesting_solution, Some(best));
        assert!(event.error.is_none());
    }
}
