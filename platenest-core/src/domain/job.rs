//! Job descriptor domain types
//!
//! A [`JobDescriptor`] is the immutable request handed to the solving
//! engine: the parts to nest, the candidate sheets, the tool parameters,
//! and a deadline. Descriptors are built once through
//! [`JobDescriptor::build`], which enforces every invariant, and never
//! mutated after submission.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque job identifier, unique across the process lifetime.
///
/// Assigned by the caller at submission time. Any non-empty string is
/// accepted; [`JobId::generate`] produces a ULID so freshly minted ids sort
/// by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps a caller-chosen id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh ULID-based id
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A 2D point in sheet coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One part to nest: a polygonal outline, a copy count, and the rotations
/// the engine may apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Number of copies required, at least 1
    pub quantity: u32,
    /// Outline polygon, closed or implicitly closed, at least 3 distinct points
    pub contour: Vec<Point>,
    /// Allowed rotation angles in degrees, each in [0, 360).
    /// An empty set means "no rotation" and is normalized to `[0.0]`.
    pub rotations: Vec<f64>,
}

/// One candidate sheet the engine may place parts onto
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet extent along x, positive
    pub length: f64,
    /// Sheet extent along y, positive
    pub width: f64,
    /// Cost of consuming one sheet of this kind, non-negative.
    /// Used for optimization ranking across sheet choices.
    pub cost: f64,
}

/// A validated nesting request
///
/// Structure shared between the caller (builds and submits) and the engine
/// (solves and reports). Field names follow the external wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Caller-assigned id, unique across the process lifetime
    #[serde(rename = "nesting_job_ulid")]
    pub job_id: JobId,
    /// Cutting tool width, used to compute spacing between placements
    pub tool_diameter: f64,
    /// Search deadline in milliseconds; the engine returns its best-known
    /// result once exceeded
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Parts to nest, non-empty
    pub parts: Vec<Part>,
    /// Candidate sheets, non-empty
    pub sheets: Vec<Sheet>,
}

impl JobDescriptor {
    /// Builds a descriptor, enforcing every invariant.
    ///
    /// Empty rotation sets are normalized to `[0.0]`; everything else that
    /// violates an invariant is rejected with a [`ValidationError`].
    pub fn build(
        job_id: JobId,
        tool_diameter: f64,
        timeout: Duration,
        parts: Vec<Part>,
        sheets: Vec<Sheet>,
    ) -> Result<Self, ValidationError> {
        let mut descriptor = Self {
            job_id,
            tool_diameter,
            timeout_ms: timeout.as_millis() as u64,
            parts,
            sheets,
        };
        descriptor.normalize();
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// The configured deadline as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Normalizes empty rotation sets to `[0.0]`.
    ///
    /// Runs in [`Self::build`] and on wire decode, so a descriptor behaves
    /// the same no matter how it was constructed.
    pub(crate) fn normalize(&mut self) {
        for part in &mut self.parts {
            if part.rotations.is_empty() {
                part.rotations.push(0.0);
            }
        }
    }

    /// Checks every invariant; used by [`Self::build`] and again when a
    /// descriptor arrives over the wire.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_id.is_empty() {
            return Err(ValidationError::EmptyJobId);
        }
        if !(self.tool_diameter > 0.0 && self.tool_diameter.is_finite()) {
            return Err(ValidationError::InvalidToolDiameter(self.tool_diameter));
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.parts.is_empty() {
            return Err(ValidationError::EmptyParts);
        }
        if self.sheets.is_empty() {
            return Err(ValidationError::EmptySheets);
        }

        for (part_index, part) in self.parts.iter().enumerate() {
            if part.quantity == 0 {
                return Err(ValidationError::ZeroQuantity { part_index });
            }
            let distinct_points = distinct_point_count(&part.contour);
            if distinct_points < 3 {
                return Err(ValidationError::DegenerateContour {
                    part_index,
                    distinct_points,
                });
            }
            for &rotation in &part.rotations {
                if !(0.0..360.0).contains(&rotation) || !rotation.is_finite() {
                    return Err(ValidationError::RotationOutOfRange {
                        part_index,
                        rotation,
                    });
                }
            }
        }

        for (sheet_index, sheet) in self.sheets.iter().enumerate() {
            let dims_valid = sheet.length > 0.0
                && sheet.length.is_finite()
                && sheet.width > 0.0
                && sheet.width.is_finite();
            if !dims_valid {
                return Err(ValidationError::InvalidSheetDimensions {
                    sheet_index,
                    length: sheet.length,
                    width: sheet.width,
                });
            }
            if !(sheet.cost >= 0.0 && sheet.cost.is_finite()) {
                return Err(ValidationError::InvalidSheetCost {
                    sheet_index,
                    cost: sheet.cost,
                });
            }
        }

        Ok(())
    }

    /// Total number of part copies the job requires
    pub fn total_copies(&self) -> u64 {
        self.parts.iter().map(|p| u64::from(p.quantity)).sum()
    }
}

/// Counts distinct points in a contour, treating a repeated closing point
/// as the same vertex
fn distinct_point_count(contour: &[Point]) -> usize {
    let mut distinct: Vec<Point> = Vec::with_capacity(contour.len());
    for &point in contour {
        if !distinct.iter().any(|&p| p == point) {
            distinct.push(point);
        }
    }
    distinct.len()
}
