//! Global configuration and fixed constants for residual runs.
//!
//! The progress flag is process-wide so the binary can silence the
//! stderr progress channel once at startup without threading an option
//! through every scan call.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reserved elevation meaning "no measurement".
///
/// A cell is valid only when its elevation is strictly below this value.
pub const NULL_ELEVATION: f32 = 1_000_000.0;

/// Maximum allowed origin or spacing difference between the two grids.
pub const GEOMETRY_EPSILON: f64 = 1e-8;

/// Maximum allowed difference in width or height, in bins.
pub const MAX_DIMENSION_DELTA: usize = 2;

/// Declared minimum representable residual in the output header.
pub const OUTPUT_MIN_Z: f32 = -326.0;

/// Declared maximum representable residual in the output header.
pub const OUTPUT_MAX_Z: f32 = 326.0;

/// Declared elevation scale factor in the output header.
pub const OUTPUT_Z_SCALE: f32 = 100.0;

/// Extension given to the residual surface.
pub const OUTPUT_EXTENSION: &str = ".ch2";

static PROGRESS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enable or disable the stderr progress percentage.
///
/// # Example
///
/// ```
/// use grid_residual::config;
///
/// config::set_progress_enabled(false);
/// assert!(!config::is_progress_enabled());
/// config::set_progress_enabled(true);
/// ```
#[inline]
pub fn set_progress_enabled(enabled: bool) {
    PROGRESS_ENABLED.store(enabled, Ordering::Release);
}

/// Check whether progress should be written to stderr.
#[inline]
pub fn is_progress_enabled() -> bool {
    PROGRESS_ENABLED.load(Ordering::Acquire)
}

/// Whether an elevation counts as a real measurement.
#[inline]
pub fn is_valid_elevation(z: f32) -> bool {
    z < NULL_ELEVATION
}
