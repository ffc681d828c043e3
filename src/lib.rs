// Clippy allows for the whole crate
#![allow(clippy::should_implement_trait)]

//! grid-residual: residual surfaces between co-registered elevation grids
//!
//! Compares a candidate grid against a reference grid cell by cell,
//! writing the residual surface and a one-line statistical summary.
//!
//! # Features
//!
//! - **Streaming rows**: memory is one row per input, whatever the grid height
//! - **Strict geometry check**: grids must share extent and spacing
//! - **Fixed-column report**: RMS, mean, standard deviation, sign split
//!
//! # Example
//!
//! ```rust,no_run
//! use grid_residual::commands::ResidualCommand;
//!
//! let cmd = ResidualCommand::new();
//! let stats = cmd
//!     .run("reference.asc", "candidate.asc", &mut std::io::stdout())
//!     .unwrap();
//! println!("{} overlapping cells", stats.count());
//! ```

pub mod ascii_grid;
pub mod chrtr2;
pub mod commands;
pub mod config;
pub mod error;
pub mod grid;
pub mod report;
pub mod stats;
pub mod validation;

// Re-export commonly used types
pub use ascii_grid::AsciiGridReader;
pub use chrtr2::{Chrtr2Reader, Chrtr2Record, Chrtr2Writer};
pub use error::{GeometryMismatch, ResidualError};
pub use grid::{CommonGridSpec, ElevationSource, GridMetadata};
pub use stats::{ResidualSummary, RunningStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::ascii_grid::AsciiGridReader;
    pub use crate::chrtr2::{Chrtr2Reader, Chrtr2Record, Chrtr2Status, Chrtr2Writer, ResidualSink};
    pub use crate::commands::{diff_rows, ResidualCommand};
    pub use crate::grid::{CommonGridSpec, ElevationSource, GridMetadata};
    pub use crate::stats::{ResidualSummary, RunningStats};
    pub use crate::validation::validate_geometry;
}
