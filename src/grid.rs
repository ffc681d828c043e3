//! Grid geometry and the row-reading seam shared by all input formats.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors raised by grid readers and writers.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Header error at line {line}: {message}")]
    Header { line: usize, message: String },

    #[error("Row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("Cell ({row}, {col}) is outside a {width}x{height} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid grid format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

/// Geometry of one input grid, read from its header.
///
/// The origin is the south-west corner; row 0 is the southernmost row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetadata {
    pub columns: usize,
    pub rows: usize,
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub cell_size_lon: f64,
    pub cell_size_lat: f64,
}

impl fmt::Display for GridMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinX = {:.7}  MinY = {:.7}  X = {:.7}  Y = {:.7}  Width = {}  Height = {}",
            self.origin_lon,
            self.origin_lat,
            self.cell_size_lon,
            self.cell_size_lat,
            self.columns,
            self.rows
        )
    }
}

/// Geometry shared by both inputs after validation.
///
/// Only [`crate::validation::validate_geometry`] constructs this, so holding
/// one proves the pair passed the compatibility check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommonGridSpec {
    columns: usize,
    rows: usize,
    origin_lon: f64,
    origin_lat: f64,
    cell_size_lon: f64,
    cell_size_lat: f64,
}

impl CommonGridSpec {
    pub(crate) fn from_metadata(meta: &GridMetadata) -> Self {
        Self {
            columns: meta.columns,
            rows: meta.rows,
            origin_lon: meta.origin_lon,
            origin_lat: meta.origin_lat,
            cell_size_lon: meta.cell_size_lon,
            cell_size_lat: meta.cell_size_lat,
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn origin_lon(&self) -> f64 {
        self.origin_lon
    }

    pub fn origin_lat(&self) -> f64 {
        self.origin_lat
    }

    pub fn cell_size_lon(&self) -> f64 {
        self.cell_size_lon
    }

    pub fn cell_size_lat(&self) -> f64 {
        self.cell_size_lat
    }

    /// Cell count, saturating for headers too large to ever be scanned.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.columns.saturating_mul(self.rows)
    }
}

/// A grid that can hand out elevation rows one at a time.
///
/// `read_row` fills `buf` with the elevations of `row` (row 0 south),
/// using [`crate::config::NULL_ELEVATION`] for cells without data.
/// `buf.len()` must equal the grid's column count.
pub trait ElevationSource {
    fn metadata(&self) -> &GridMetadata;

    fn read_row(&mut self, row: usize, buf: &mut [f32]) -> Result<()>;
}
