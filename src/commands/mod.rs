//! Command implementations for grid-residual.

pub mod residual;

pub use residual::{
    diff_rows, output_header, output_path_for, GridSide, ProgressTracker, ResidualCell,
    ResidualCommand, ScanError,
};
