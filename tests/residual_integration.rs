//! End-to-end tests for the residual command through the library API.
//!
//! Tests cover:
//! 1. The three-cell worked example
//! 2. Report suppression (zero overlap vs cancelling residuals)
//! 3. Geometry rejection with no output left behind
//! 4. Row read failures
//! 5. Byte-identical reruns
//!
//! Note: Tests are run serially because they toggle the global progress flag.

use grid_residual::chrtr2::{Chrtr2Reader, Chrtr2Status};
use grid_residual::commands::ResidualCommand;
use grid_residual::config;
use grid_residual::ResidualError;
use serial_test::serial;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to write an ASCII grid; `rows` are given north first, as in the file.
fn write_grid(dir: &Path, name: &str, origin: (f64, f64), cellsize: f64, rows: &[&str]) -> PathBuf {
    let ncols = rows[0].split_whitespace().count();
    let mut text = format!(
        "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value -9999\n",
        ncols,
        rows.len(),
        origin.0,
        origin.1,
        cellsize
    );
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn quiet() {
    config::set_progress_enabled(false);
}

fn run(a: &Path, b: &Path) -> (Result<grid_residual::RunningStats, ResidualError>, String) {
    let mut out = Vec::new();
    let result = ResidualCommand::new().run(a, b, &mut out);
    (result, String::from_utf8(out).unwrap())
}

fn data_lines(report: &str) -> Vec<&str> {
    report
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

// =============================================================================
// Worked example
// =============================================================================

#[test]
#[serial]
fn test_three_cell_example() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (-76.0, 36.0), 0.001, &["10.0 20.0 30.0"]);
    let b = write_grid(dir.path(), "b.asc", (-76.0, 36.0), 0.001, &["9.0 21.0 29.0"]);

    let (result, report) = run(&a, &b);
    let stats = result.unwrap();

    assert_eq!(stats.count(), 3);
    assert_eq!(stats.sum_diff, 1.0);
    assert_eq!(stats.sum_diff_squared, 3.0);
    assert_eq!(stats.neg_count, 1);
    assert_eq!(stats.pos_count, 2);
    assert_eq!(stats.max_abs_diff, 1.0);

    let data = data_lines(&report);
    assert_eq!(data.len(), 1);
    let fields: Vec<&str> = data[0].split_whitespace().collect();
    assert_eq!(fields[0], "1.000"); // RMS
    assert_eq!(fields[4], "033"); // NEG%
    assert_eq!(fields[5], "067"); // POS%
    assert_eq!(fields[6], "1.000"); // MAX RESID
    assert_eq!(fields[7], "20.000"); // MEAN DEPTH
    assert_eq!(fields[8], "3");

    assert!(report.contains(&format!("#FIRST GRID file  : {}", a.display())));
    assert!(report.contains(&format!("#SECOND GRID file : {}", b.display())));

    let surface = Chrtr2Reader::open(dir.path().join("a.ch2")).unwrap();
    let header = surface.header();
    assert_eq!((header.width, header.height), (3, 1));
    assert_eq!(header.west_lon, -76.0);
    assert_eq!(header.south_lat, 36.0);

    let zs: Vec<f32> = (0..3).map(|c| surface.read_record(0, c).unwrap().z).collect();
    assert_eq!(zs, vec![1.0, -1.0, 1.0]);
    assert!((0..3).all(|c| surface.read_record(0, c).unwrap().status == Chrtr2Status::REAL));
}

#[test]
#[serial]
fn test_nodata_cells_left_null() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(
        dir.path(),
        "a.asc",
        (0.0, 0.0),
        0.5,
        &["-9999 -5.5 -6.25", "-4.0 -4.5 -9999"],
    );
    let b = write_grid(
        dir.path(),
        "b.asc",
        (0.0, 0.0),
        0.5,
        &["-3.0 -5.0 -6.0", "-9999 -4.0 -1.0"],
    );

    let (result, _) = run(&a, &b);
    let stats = result.unwrap();
    assert_eq!(stats.count(), 3);

    let surface = Chrtr2Reader::open(dir.path().join("a.ch2")).unwrap();
    // Row 0 is the south (last) line
    assert!(surface.read_record(0, 0).unwrap().status.is_null());
    assert_eq!(surface.read_record(0, 1).unwrap().z, -0.5);
    assert!(surface.read_record(0, 2).unwrap().status.is_null());
    assert!(surface.read_record(1, 0).unwrap().status.is_null());
    assert_eq!(surface.read_record(1, 1).unwrap().z, -0.5);
    assert_eq!(surface.read_record(1, 2).unwrap().z, -0.25);
}

// =============================================================================
// Report suppression
// =============================================================================

#[test]
#[serial]
fn test_zero_overlap_suppresses_data_line() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1.0 -9999"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["-9999 2.0"]);

    let (result, report) = run(&a, &b);
    assert_eq!(result.unwrap().count(), 0);
    assert!(data_lines(&report).is_empty());
    assert!(report.contains("# POINTS"));
    // The surface is still produced
    assert!(dir.path().join("a.ch2").exists());
}

#[test]
#[serial]
fn test_cancelling_residuals_suppress_data_line() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["10.5 20.0"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["10.0 20.5"]);

    let (result, report) = run(&a, &b);
    let stats = result.unwrap();
    assert_eq!(stats.count(), 2);
    assert_eq!(stats.sum_diff, 0.0);
    assert!(data_lines(&report).is_empty());
}

// =============================================================================
// Fatal conditions
// =============================================================================

#[test]
#[serial]
fn test_spacing_mismatch_is_fatal() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1 2"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 2.0, &["1 2"]);

    let (result, report) = run(&a, &b);
    let err = result.unwrap_err();
    assert!(matches!(err, ResidualError::GeometryMismatch(_)));
    assert!(err.to_string().contains("do not match"));
    assert!(report.is_empty());
    assert!(!dir.path().join("a.ch2").exists());
}

#[test]
#[serial]
fn test_dimension_mismatch_beyond_two_is_fatal() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1 2 3 4"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["1"]);

    let (result, _) = run(&a, &b);
    assert!(matches!(
        result.unwrap_err(),
        ResidualError::GeometryMismatch(_)
    ));
}

#[test]
#[serial]
fn test_smaller_second_grid_within_tolerance() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(
        dir.path(),
        "a.asc",
        (0.0, 0.0),
        1.0,
        &["7 8 9", "4 5 6", "1 2 3"],
    );
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["3 4", "0 1"]);

    let (result, _) = run(&a, &b);
    let stats = result.unwrap();
    assert_eq!(stats.count(), 4);

    let surface = Chrtr2Reader::open(dir.path().join("a.ch2")).unwrap();
    assert_eq!((surface.header().width, surface.header().height), (3, 3));
    assert_eq!(surface.read_record(1, 1).unwrap().z, 1.0);
    assert!(surface.read_record(2, 0).unwrap().status.is_null());
    assert!(surface.read_record(0, 2).unwrap().status.is_null());
}

#[test]
#[serial]
fn test_missing_input_is_open_error() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1 2"]);
    let missing = dir.path().join("nope.asc");

    let (result, _) = run(&a, &missing);
    match result.unwrap_err() {
        ResidualError::Open { path, .. } => assert_eq!(path, missing),
        other => panic!("expected open error, got {other}"),
    }
}

#[test]
#[serial]
fn test_bad_row_aborts_and_removes_output() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1 2", "3 4"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["1 x", "3 4"]);

    let (result, report) = run(&a, &b);
    match result.unwrap_err() {
        ResidualError::RowRead { path, row, .. } => {
            assert_eq!(path, b);
            // The bad line is the north row
            assert_eq!(row, 1);
        }
        other => panic!("expected row read error, got {other}"),
    }
    assert!(report.is_empty());
    assert!(!dir.path().join("a.ch2").exists());
}

#[test]
#[serial]
fn test_oversized_header_is_create_error() {
    quiet();
    let dir = TempDir::new().unwrap();
    let huge = "ncols 4611686018427387904\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n";
    let a = dir.path().join("a.asc");
    let b = dir.path().join("b.asc");
    fs::write(&a, huge).unwrap();
    fs::write(&b, huge).unwrap();

    let (result, report) = run(&a, &b);
    match result.unwrap_err() {
        ResidualError::Create { path, .. } => assert_eq!(path, dir.path().join("a.ch2")),
        other => panic!("expected create error, got {other}"),
    }
    assert!(report.is_empty());
    assert!(!dir.path().join("a.ch2").exists());
}

/// Report destination that always fails, like a closed stdout.
struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[test]
#[serial]
fn test_report_failure_removes_output() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["1 2"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["0 0"]);

    let err = ResidualCommand::new()
        .run(&a, &b, &mut ClosedPipe)
        .unwrap_err();
    assert!(matches!(err, ResidualError::Io(_)));
    assert!(!dir.path().join("a.ch2").exists());
}

#[test]
#[serial]
fn test_output_may_not_overwrite_input() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.ch2", (0.0, 0.0), 1.0, &["1 2"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["1 2"]);

    let (result, _) = run(&a, &b);
    assert!(matches!(result.unwrap_err(), ResidualError::Usage(_)));
    // Input untouched
    assert!(fs::read_to_string(&a).unwrap().starts_with("ncols 2"));
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
#[serial]
fn test_reruns_are_byte_identical() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(
        dir.path(),
        "a.asc",
        (-70.125, 41.5),
        0.0005,
        &["-12.5 -13.25 -9999", "-14.0 -15.75 -16.5"],
    );
    let b = write_grid(
        dir.path(),
        "b.asc",
        (-70.125, 41.5),
        0.0005,
        &["-12.0 -13.5 -10.0", "-9999 -15.0 -17.0"],
    );

    let (first, report_1) = run(&a, &b);
    let bytes_1 = fs::read(dir.path().join("a.ch2")).unwrap();
    let (second, report_2) = run(&a, &b);
    let bytes_2 = fs::read(dir.path().join("a.ch2")).unwrap();

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(report_1, report_2);
    assert_eq!(bytes_1, bytes_2);
}

#[test]
#[serial]
fn test_explicit_output_path() {
    quiet();
    let dir = TempDir::new().unwrap();
    let a = write_grid(dir.path(), "a.asc", (0.0, 0.0), 1.0, &["5 6"]);
    let b = write_grid(dir.path(), "b.asc", (0.0, 0.0), 1.0, &["4 4"]);
    let out = dir.path().join("custom.ch2");

    let mut report = Vec::new();
    let stats = ResidualCommand::new()
        .with_output(&out)
        .run(&a, &b, &mut report)
        .unwrap();

    assert_eq!(stats.sum_diff, 3.0);
    assert!(out.exists());
    assert!(!dir.path().join("a.ch2").exists());
}
