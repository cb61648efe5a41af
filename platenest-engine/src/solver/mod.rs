//! Placement solvers
//!
//! The engine treats the packing algorithm as a pluggable collaborator
//! behind the [`PlacementSolver`] trait. A solver runs synchronously on a
//! blocking thread, reports improving solutions through its
//! [`SolveContext`], and is expected to check the context's stop conditions
//! between units of work. The engine additionally races the solver against
//! the wall clock, so even a solver that never checks still times out.

mod shelf;

pub use shelf::ShelfSolver;

use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use platenest_core::{JobDescriptor, NestingSolution};

/// Why a solver stopped without a complete solution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// Some copy of this part fits no candidate sheet under any allowed
    /// rotation
    #[error("part {part_index} does not fit any candidate sheet")]
    PartDoesNotFit {
        /// Index of the offending part
        part_index: usize,
    },

    /// The job was cancelled by the caller
    #[error("cancelled by caller")]
    Cancelled,

    /// The search deadline expired before the solver finished
    #[error("search deadline exceeded")]
    DeadlineExceeded,
}

/// Execution context handed to a running solver
///
/// Carries the deadline, the cancellation token, and the progress path back
/// to the update channel.
pub struct SolveContext {
    deadline: Instant,
    cancel: CancellationToken,
    progress: Box<dyn Fn(NestingSolution) + Send + Sync>,
}

impl SolveContext {
    pub(crate) fn new(
        deadline: Instant,
        cancel: CancellationToken,
        progress: Box<dyn Fn(NestingSolution) + Send + Sync>,
    ) -> Self {
        Self {
            deadline,
            cancel,
            progress,
        }
    }

    /// Reports a best-so-far solution.
    ///
    /// Every emission reaches the engine, which records it as the job's
    /// best-known solution; pacing of progress events on the update
    /// channel is the engine's concern.
    pub fn emit_progress(&self, best: NestingSolution) {
        (self.progress)(best);
    }

    /// Whether the search deadline has passed
    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Whether the caller requested cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns an error if the solver should stop now.
    ///
    /// Solvers call this between units of work.
    pub fn checkpoint(&self) -> Result<(), SolveError> {
        if self.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        if self.deadline_exceeded() {
            return Err(SolveError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// The packing algorithm seam
///
/// Implementations are pure with respect to the descriptor: same input,
/// same context budget, same result.
pub trait PlacementSolver: Send + Sync {
    /// Searches for a placement of every part copy.
    ///
    /// Returns the best complete solution found, or the reason the search
    /// stopped. Partial results travel through `ctx.emit_progress`.
    fn solve(&self, job: &JobDescriptor, ctx: &SolveContext)
    -> Result<NestingSolution, SolveError>;
}
