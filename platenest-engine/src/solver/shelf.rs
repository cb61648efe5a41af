//! Shelf placement solver
//!
//! Deterministic reference solver: packs the axis-aligned bounding box of
//! each rotated contour onto shelves, opening the cheapest catalog sheet
//! that can hold a copy whenever the open sheets are full. Tool spacing is
//! applied as a half-diameter offset on every side of a bounding box.
//!
//! The solver tries several copy orderings and reports each improvement as
//! progress, so a caller watching the channel sees best-so-far solutions
//! the same way it would from a search-based optimizer.

use platenest_core::{JobDescriptor, NestingSolution, PlacementRecord, Point};

use crate::solver::{PlacementSolver, SolveContext, SolveError};

/// Shelf-packing reference implementation of [`PlacementSolver`]
#[derive(Debug, Default)]
pub struct ShelfSolver;

impl ShelfSolver {
    pub fn new() -> Self {
        Self
    }
}

/// One part copy awaiting placement
#[derive(Debug, Clone, Copy)]
struct Copy {
    part_index: usize,
    instance: u32,
}

/// Bounding box of a rotated contour, inflated by the tool spacing
#[derive(Debug, Clone, Copy)]
struct Footprint {
    rotation: f64,
    w: f64,
    h: f64,
}

/// A shelf within an open sheet
#[derive(Debug)]
struct Shelf {
    y: f64,
    height: f64,
    x: f64,
}

/// A physical sheet the packing has opened
#[derive(Debug)]
struct OpenSheet {
    sheet_index: usize,
    length: f64,
    width: f64,
    cost: f64,
    shelves: Vec<Shelf>,
    next_shelf_y: f64,
}

impl OpenSheet {
    fn open(sheet_index: usize, job: &JobDescriptor) -> Self {
        let sheet = &job.sheets[sheet_index];
        Self {
            sheet_index,
            length: sheet.length,
            width: sheet.width,
            cost: sheet.cost,
            shelves: Vec::new(),
            next_shelf_y: 0.0,
        }
    }

    /// Tries to place a footprint on an existing shelf or a new one.
    /// Returns the bottom-left corner of the footprint on success.
    fn place(&mut self, fp: Footprint) -> Option<(f64, f64)> {
        for shelf in &mut self.shelves {
            if fp.h <= shelf.height && shelf.x + fp.w <= self.length {
                let at = (shelf.x, shelf.y);
                shelf.x += fp.w;
                return Some(at);
            }
        }
        if self.next_shelf_y + fp.h <= self.width && fp.w <= self.length {
            let y = self.next_shelf_y;
            self.shelves.push(Shelf {
                y,
                height: fp.h,
                x: fp.w,
            });
            self.next_shelf_y += fp.h;
            return Some((0.0, y));
        }
        None
    }
}

impl PlacementSolver for ShelfSolver {
    fn solve(
        &self,
        job: &JobDescriptor,
        ctx: &SolveContext,
    ) -> Result<NestingSolution, SolveError> {
        let footprints = part_footprints(job);
        let copies = expand_copies(job);

        let orderings: [fn(&[Vec<Footprint>], &Copy) -> f64; 3] = [
            |fps, c| fps[c.part_index][0].w * fps[c.part_index][0].h,
            |fps, c| fps[c.part_index][0].w.max(fps[c.part_index][0].h),
            |fps, c| fps[c.part_index][0].h,
        ];

        let mut best: Option<NestingSolution> = None;
        for key in orderings {
            ctx.checkpoint()?;

            let mut order = copies.clone();
            // Descending by the strategy key; ties stay in copy order.
            order.sort_by(|a, b| {
                key(&footprints, b)
                    .partial_cmp(&key(&footprints, a))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let candidate = pack(job, &footprints, &order, ctx)?;
            let improved = match &best {
                None => true,
                Some(current) => {
                    (candidate.total_cost, candidate.sheet_count)
                        < (current.total_cost, current.sheet_count)
                }
            };
            if improved {
                ctx.emit_progress(candidate.clone());
                best = Some(candidate);
            }
        }

        // Three strategies ran, at least one produced a solution.
        best.ok_or(SolveError::DeadlineExceeded)
    }
}

/// Packs one ordering of copies, first-fit over open sheets and shelves
fn pack(
    job: &JobDescriptor,
    footprints: &[Vec<Footprint>],
    order: &[Copy],
    ctx: &SolveContext,
) -> Result<NestingSolution, SolveError> {
    let spacing = job.tool_diameter / 2.0;
    let mut open: Vec<OpenSheet> = Vec::new();
    let mut placements = Vec::with_capacity(order.len());

    for &copy in order {
        ctx.checkpoint()?;
        let options = &footprints[copy.part_index];

        let mut placed = None;
        'sheets: for (ordinal, sheet) in open.iter_mut().enumerate() {
            for &fp in options {
                if let Some((x, y)) = sheet.place(fp) {
                    placed = Some((ordinal, sheet.sheet_index, fp, x, y));
                    break 'sheets;
                }
            }
        }

        if placed.is_none() {
            let sheet_index = cheapest_fitting_sheet(job, options)
                .ok_or(SolveError::PartDoesNotFit {
                    part_index: copy.part_index,
                })?;
            let mut sheet = OpenSheet::open(sheet_index, job);
            for &fp in options {
                if let Some((x, y)) = sheet.place(fp) {
                    placed = Some((open.len(), sheet_index, fp, x, y));
                    break;
                }
            }
            open.push(sheet);
        }

        // cheapest_fitting_sheet guarantees a fresh sheet accepts the copy
        let (ordinal, sheet_index, fp, x, y) = placed.ok_or(SolveError::PartDoesNotFit {
            part_index: copy.part_index,
        })?;
        placements.push(PlacementRecord {
            part_index: copy.part_index,
            instance: copy.instance,
            sheet_index,
            sheet_instance: ordinal as u32,
            position: Point::new(x + spacing, y + spacing),
            rotation: fp.rotation,
        });
    }

    Ok(NestingSolution {
        placements_and_location: placements,
        sheet_count: open.len() as u32,
        total_cost: open.iter().map(|s| s.cost).sum(),
    })
}

/// Lowest-cost catalog sheet that can hold the copy under some rotation;
/// ties go to the smaller sheet
fn cheapest_fitting_sheet(job: &JobDescriptor, options: &[Footprint]) -> Option<usize> {
    job.sheets
        .iter()
        .enumerate()
        .filter(|(_, sheet)| {
            options
                .iter()
                .any(|fp| fp.w <= sheet.length && fp.h <= sheet.width)
        })
        .min_by(|(_, a), (_, b)| {
            (a.cost, a.length * a.width)
                .partial_cmp(&(b.cost, b.length * b.width))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(index, _)| index)
}

/// Footprints per part, one per allowed rotation, lowest profile first
fn part_footprints(job: &JobDescriptor) -> Vec<Vec<Footprint>> {
    job.parts
        .iter()
        .map(|part| {
            let mut options: Vec<Footprint> = part
                .rotations
                .iter()
                .map(|&rotation| {
                    let (w, h) = rotated_bbox(&part.contour, rotation);
                    Footprint {
                        rotation,
                        w: w + job.tool_diameter,
                        h: h + job.tool_diameter,
                    }
                })
                .collect();
            options.sort_by(|a, b| {
                (a.h, a.w)
                    .partial_cmp(&(b.h, b.w))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            options
        })
        .collect()
}

/// All part copies in descriptor order
fn expand_copies(job: &JobDescriptor) -> Vec<Copy> {
    job.parts
        .iter()
        .enumerate()
        .flat_map(|(part_index, part)| {
            (0..part.quantity).map(move |instance| Copy {
                part_index,
                instance,
            })
        })
        .collect()
}

/// Width and height of the axis-aligned bounding box of a contour rotated
/// by `rotation` degrees
fn rotated_bbox(contour: &[Point], rotation: f64) -> (f64, f64) {
    let theta = rotation.to_radians();
    let (sin, cos) = theta.sin_cos();
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for point in contour {
        let x = point.x * cos - point.y * sin;
        let y = point.x * sin + point.y * cos;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    (max_x - min_x, max_y - min_y)
}
