//! Run-level errors. Every variant is fatal for the whole run.

use crate::grid::{GridError, GridMetadata};
use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The two grids disagree on extent or spacing.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Grid extents and/or spacing do not match.\nGRID1 {a}\nGRID2 {b}")]
pub struct GeometryMismatch {
    pub a: GridMetadata,
    pub b: GridMetadata,
}

#[derive(Error, Debug)]
pub enum ResidualError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Error opening grid file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: GridError,
    },

    #[error(transparent)]
    GeometryMismatch(#[from] GeometryMismatch),

    #[error("Allocating data row of {width} cells: {source}")]
    Allocation {
        width: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("Error creating output file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: GridError,
    },

    #[error("Error reading row {row} of {}: {source}", path.display())]
    RowRead {
        path: PathBuf,
        row: usize,
        #[source]
        source: GridError,
    },

    #[error("Error writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: GridError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ResidualError>;
