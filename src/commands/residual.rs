//! Residual surface between two co-registered elevation grids.
//!
//! # Algorithm
//!
//! 1. Validate that both grids share extent and spacing
//! 2. Create the output surface shaped like the first grid
//! 3. Read both grids one row at a time, south to north
//! 4. For each cell valid in both grids, write `a - b` and fold it into
//!    the running statistics
//! 5. Close the surface, then print the report
//!
//! # Memory Complexity
//!
//! O(width) - one row buffer per input, regardless of grid height.

use crate::ascii_grid::AsciiGridReader;
use crate::chrtr2::{Chrtr2Header, Chrtr2Record, Chrtr2Writer, ResidualSink};
use crate::config::{
    self, is_valid_elevation, NULL_ELEVATION, OUTPUT_EXTENSION, OUTPUT_MAX_Z, OUTPUT_MIN_Z,
    OUTPUT_Z_SCALE,
};
use crate::error::{ResidualError, Result};
use crate::grid::{CommonGridSpec, ElevationSource, GridError};
use crate::stats::RunningStats;
use crate::validation::validate_geometry;
use std::collections::TryReserveError;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One cell that holds data in both grids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualCell {
    pub row: usize,
    pub col: usize,
    /// `elevation_a - elevation_b`
    pub value: f32,
    /// Elevation from the first grid
    pub depth: f32,
}

impl ResidualCell {
    /// Pair two elevations, or `None` if either is a no-data value.
    #[inline]
    pub fn pair(row: usize, col: usize, elevation_a: f32, elevation_b: f32) -> Option<Self> {
        if is_valid_elevation(elevation_a) && is_valid_elevation(elevation_b) {
            Some(Self {
                row,
                col,
                value: elevation_a - elevation_b,
                depth: elevation_a,
            })
        } else {
            None
        }
    }
}

/// Which input grid an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSide {
    First,
    Second,
}

impl fmt::Display for GridSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridSide::First => write!(f, "first grid"),
            GridSide::Second => write!(f, "second grid"),
        }
    }
}

/// Failures inside the row scan, before paths are attached.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Allocating data row of {width} cells: {source}")]
    Allocation {
        width: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("Reading row {row} of the {side}: {source}")]
    Read {
        side: GridSide,
        row: usize,
        #[source]
        source: GridError,
    },

    #[error("Writing cell ({row}, {col}): {source}")]
    Write {
        row: usize,
        col: usize,
        #[source]
        source: GridError,
    },

    #[error("Closing output: {0}")]
    Close(#[source] GridError),
}

/// Floor percentage of cells processed, reported only when it changes.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    last: Option<u32>,
}

impl ProgressTracker {
    pub fn new(total_cells: usize) -> Self {
        Self {
            total: total_cells as u64,
            last: None,
        }
    }

    /// Returns the new percentage if it differs from the last one reported.
    #[inline]
    pub fn update(&mut self, processed: usize) -> Option<u32> {
        if self.total == 0 {
            return None;
        }
        let percent = ((processed as u64).min(self.total) * 100 / self.total) as u32;
        if self.last == Some(percent) {
            None
        } else {
            self.last = Some(percent);
            Some(percent)
        }
    }
}

/// Allocate a row buffer pre-filled with the no-data sentinel.
fn alloc_row(width: usize) -> std::result::Result<Vec<f32>, ScanError> {
    let mut row = Vec::new();
    row.try_reserve_exact(width)
        .map_err(|source| ScanError::Allocation { width, source })?;
    row.resize(width, NULL_ELEVATION);
    Ok(row)
}

/// Stream both grids row by row, writing residuals to `sink`.
///
/// Cells are visited in row-major order, one row of each grid in memory at
/// a time. Cells that are no-data in either grid produce nothing. Cells of
/// the first grid that fall outside the second grid's extent are treated
/// as no-data in the second grid. `on_progress` receives the processed
/// percentage each time it changes.
///
/// Any read or write failure aborts the scan.
pub fn diff_rows<A, B, S, F>(
    a: &mut A,
    b: &mut B,
    spec: &CommonGridSpec,
    sink: &mut S,
    mut on_progress: F,
) -> std::result::Result<RunningStats, ScanError>
where
    A: ElevationSource + ?Sized,
    B: ElevationSource + ?Sized,
    S: ResidualSink + ?Sized,
    F: FnMut(u32),
{
    let width = spec.columns();
    let b_rows = b.metadata().rows;

    let mut row_a = alloc_row(a.metadata().columns)?;
    let mut row_b = alloc_row(b.metadata().columns)?;

    let mut stats = RunningStats::new();
    let mut progress = ProgressTracker::new(spec.total_cells());

    for row in 0..spec.rows() {
        a.read_row(row, &mut row_a)
            .map_err(|source| ScanError::Read {
                side: GridSide::First,
                row,
                source,
            })?;

        let b_has_row = row < b_rows;
        if b_has_row {
            b.read_row(row, &mut row_b)
                .map_err(|source| ScanError::Read {
                    side: GridSide::Second,
                    row,
                    source,
                })?;
        }

        for col in 0..width {
            if let Some(percent) = progress.update(row * width + col) {
                on_progress(percent);
            }

            let elevation_a = row_a.get(col).copied().unwrap_or(NULL_ELEVATION);
            let elevation_b = if b_has_row {
                row_b.get(col).copied().unwrap_or(NULL_ELEVATION)
            } else {
                NULL_ELEVATION
            };

            if let Some(cell) = ResidualCell::pair(row, col, elevation_a, elevation_b) {
                sink.write_record(row, col, Chrtr2Record::real(cell.value))
                    .map_err(|source| ScanError::Write { row, col, source })?;
                stats.push(cell.value, cell.depth);
            }
        }
    }

    Ok(stats)
}

/// Output path for a first-grid path: its last 4 characters become `.ch2`.
pub fn output_path_for(grid_a: &Path) -> Result<PathBuf> {
    let text = grid_a.to_str().ok_or_else(|| {
        ResidualError::Usage(format!(
            "grid path {} is not valid UTF-8",
            grid_a.display()
        ))
    })?;

    let char_count = text.chars().count();
    if char_count < 4 {
        return Err(ResidualError::Usage(format!(
            "grid path '{}' is too short to derive an output name",
            text
        )));
    }

    let cut = text
        .char_indices()
        .nth(char_count - 4)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    Ok(PathBuf::from(format!("{}{}", &text[..cut], OUTPUT_EXTENSION)))
}

/// Output header describing a residual surface over `spec`.
pub fn output_header(spec: &CommonGridSpec) -> Chrtr2Header {
    Chrtr2Header {
        creation_software: format!("grid-residual V{}", crate::VERSION),
        west_lon: spec.origin_lon(),
        south_lat: spec.origin_lat(),
        lon_grid_size_degrees: spec.cell_size_lon(),
        lat_grid_size_degrees: spec.cell_size_lat(),
        width: spec.columns(),
        height: spec.rows(),
        min_z: OUTPUT_MIN_Z,
        max_z: OUTPUT_MAX_Z,
        z_scale: OUTPUT_Z_SCALE,
        horizontal_uncertainty_scale: 0.0,
        vertical_uncertainty_scale: 0.0,
    }
}

/// Residual command configuration.
#[derive(Debug, Clone)]
pub struct ResidualCommand {
    /// Override the output path (default: derived from the first grid)
    pub output: Option<PathBuf>,
}

impl Default for ResidualCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ResidualCommand {
    pub fn new() -> Self {
        Self { output: None }
    }

    /// Write the surface somewhere other than the derived path.
    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Difference `grid_b` from `grid_a`, write the surface, and print the
    /// report to `report`.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        grid_a: P,
        grid_b: P,
        report: &mut W,
    ) -> Result<RunningStats> {
        let path_a = grid_a.as_ref();
        let path_b = grid_b.as_ref();

        let output_path = match &self.output {
            Some(path) => path.clone(),
            None => output_path_for(path_a)?,
        };
        if output_path == path_a || output_path == path_b {
            return Err(ResidualError::Usage(format!(
                "output {} would overwrite an input grid",
                output_path.display()
            )));
        }

        let mut a = open_grid(path_a)?;
        let mut b = open_grid(path_b)?;

        let spec = validate_geometry(a.metadata(), b.metadata())?;
        info!(
            columns = spec.columns(),
            rows = spec.rows(),
            "Grid geometry validated"
        );

        let writer =
            Chrtr2Writer::create(&output_path, &output_header(&spec)).map_err(|source| {
                ResidualError::Create {
                    path: output_path.clone(),
                    source,
                }
            })?;
        info!(path = %output_path.display(), "Created residual surface");

        let scanned = scan_into(&mut a, &mut b, &spec, writer).map_err(|e| match e {
            ScanError::Allocation { width, source } => ResidualError::Allocation { width, source },
            ScanError::Read { side, row, source } => ResidualError::RowRead {
                path: match side {
                    GridSide::First => path_a.to_path_buf(),
                    GridSide::Second => path_b.to_path_buf(),
                },
                row,
                source,
            },
            ScanError::Write { source, .. } | ScanError::Close(source) => ResidualError::Write {
                path: output_path.clone(),
                source,
            },
        });

        let stats = match scanned {
            Ok(stats) => stats,
            Err(e) => {
                discard_output(&output_path);
                return Err(e);
            }
        };
        info!(valid_cells = stats.count(), "Scan complete");

        // A surface without its report counts as a failed run
        if let Err(e) = write_report(report, path_a, path_b, &stats) {
            discard_output(&output_path);
            return Err(e);
        }
        Ok(stats)
    }
}

/// Remove a surface left behind by a failed run.
fn discard_output(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove partial output");
    }
}

/// Run the scan with stderr progress, then close the surface.
fn scan_into(
    a: &mut AsciiGridReader,
    b: &mut AsciiGridReader,
    spec: &CommonGridSpec,
    mut writer: Chrtr2Writer,
) -> std::result::Result<RunningStats, ScanError> {
    let show_progress = config::is_progress_enabled();
    if show_progress {
        eprint!("\n\n");
    }

    let stats = diff_rows(a, b, spec, &mut writer, |percent| {
        if show_progress {
            eprint!("{:03}% processed     \r", percent);
            let _ = io::stderr().flush();
        }
    })?;

    if show_progress {
        eprint!("{:03}% processed        \n\n", 100);
    }

    writer.close().map_err(ScanError::Close)?;
    Ok(stats)
}

fn open_grid(path: &Path) -> Result<AsciiGridReader> {
    let grid = AsciiGridReader::open(path).map_err(|source| ResidualError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let meta = grid.metadata();
    debug!(
        path = %path.display(),
        columns = meta.columns,
        rows = meta.rows,
        "Opened grid"
    );
    Ok(grid)
}

fn write_report<W: Write>(
    report: &mut W,
    path_a: &Path,
    path_b: &Path,
    stats: &RunningStats,
) -> Result<()> {
    crate::report::write_report(
        report,
        &path_a.display().to_string(),
        &path_b.display().to_string(),
        stats,
    )?;
    Ok(())
}
