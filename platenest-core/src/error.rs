//! Error types for descriptor validation

use thiserror::Error;

use crate::domain::job::JobId;

/// Errors raised when a job descriptor violates an invariant.
///
/// Validation is synchronous and happens before a descriptor can reach the
/// solving engine; a caller can correct the input and retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Job id is the empty string
    #[error("job id must not be empty")]
    EmptyJobId,

    /// A job with this id was already submitted in this process
    #[error("duplicate job id: {0}")]
    DuplicateJobId(JobId),

    /// Parts list is empty
    #[error("a job must contain at least one part")]
    EmptyParts,

    /// Sheets list is empty
    #[error("a job must offer at least one candidate sheet")]
    EmptySheets,

    /// A part requests zero copies
    #[error("part {part_index} has zero quantity")]
    ZeroQuantity {
        /// Index of the offending part
        part_index: usize,
    },

    /// A contour has fewer than 3 distinct points
    #[error("part {part_index} contour is degenerate ({distinct_points} distinct point(s), need 3)")]
    DegenerateContour {
        /// Index of the offending part
        part_index: usize,
        /// Number of distinct points found
        distinct_points: usize,
    },

    /// A rotation angle falls outside [0, 360)
    #[error("part {part_index} rotation {rotation} is outside [0, 360)")]
    RotationOutOfRange {
        /// Index of the offending part
        part_index: usize,
        /// The rejected angle in degrees
        rotation: f64,
    },

    /// Tool diameter is zero, negative, or not finite
    #[error("tool diameter must be positive and finite, got {0}")]
    InvalidToolDiameter(f64),

    /// Timeout is zero
    #[error("timeout must be positive")]
    ZeroTimeout,

    /// A sheet has a non-positive or non-finite dimension
    #[error("sheet {sheet_index} has a non-positive dimension ({length} x {width})")]
    InvalidSheetDimensions {
        /// Index of the offending sheet
        sheet_index: usize,
        /// Sheet length as given
        length: f64,
        /// Sheet width as given
        width: f64,
    },

    /// A sheet has a negative or non-finite cost
    #[error("sheet {sheet_index} has invalid cost {cost}")]
    InvalidSheetCost {
        /// Index of the offending sheet
        sheet_index: usize,
        /// Sheet cost as given
        cost: f64,
    },
}

impl ValidationError {
    /// Check if this error is a duplicate-id rejection
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateJobId(_))
    }
}
