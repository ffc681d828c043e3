//! Geometry compatibility check between the two input grids.
//!
//! Grids are compatible when:
//! 1. Widths and heights differ by at most [`MAX_DIMENSION_DELTA`] bins
//! 2. Origins and cell sizes differ by less than [`GEOMETRY_EPSILON`]
//!
//! Anything else is rejected outright; grids are never resampled.

use crate::config::{GEOMETRY_EPSILON, MAX_DIMENSION_DELTA};
use crate::error::GeometryMismatch;
use crate::grid::{CommonGridSpec, GridMetadata};

/// Validate that grid `b` can be differenced against grid `a`.
///
/// On success the shared geometry is taken from `a`, which also shapes
/// the output surface.
///
/// # Example
///
/// ```
/// use grid_residual::grid::GridMetadata;
/// use grid_residual::validation::validate_geometry;
///
/// let a = GridMetadata {
///     columns: 10, rows: 10,
///     origin_lon: -76.0, origin_lat: 36.0,
///     cell_size_lon: 0.001, cell_size_lat: 0.001,
/// };
/// let spec = validate_geometry(&a, &a).unwrap();
/// assert_eq!(spec.columns(), 10);
/// ```
pub fn validate_geometry(
    a: &GridMetadata,
    b: &GridMetadata,
) -> Result<CommonGridSpec, GeometryMismatch> {
    let dims_ok = a.columns.abs_diff(b.columns) <= MAX_DIMENSION_DELTA
        && a.rows.abs_diff(b.rows) <= MAX_DIMENSION_DELTA;

    let geometry_ok = close(a.origin_lon, b.origin_lon)
        && close(a.origin_lat, b.origin_lat)
        && close(a.cell_size_lon, b.cell_size_lon)
        && close(a.cell_size_lat, b.cell_size_lat);

    if dims_ok && geometry_ok {
        Ok(CommonGridSpec::from_metadata(a))
    } else {
        Err(GeometryMismatch { a: *a, b: *b })
    }
}

// NaN never passes.
#[inline]
fn close(x: f64, y: f64) -> bool {
    (x - y).abs() < GEOMETRY_EPSILON
}
