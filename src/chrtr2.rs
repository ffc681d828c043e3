//! CHRTR2-style residual surface files.
//!
//! Layout:
//! - A fixed [`HEADER_SIZE`] byte ASCII header of `[KEY] = value` lines,
//!   terminated by `[END OF HEADER]` and zero padded.
//! - `width * height` fixed-size records in row-major order, row 0 south.
//!   Each record is a little-endian `f32` z value followed by a status byte.
//!
//! The body is zero-filled when the file is created, so any cell that is
//! never written decodes as a [`Chrtr2Status::NULL`] record.

use crate::grid::{GridError, Result};
use memmap2::Mmap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Size of the ASCII header block in bytes.
pub const HEADER_SIZE: usize = 16384;

/// Size of one cell record in bytes.
pub const RECORD_SIZE: usize = 5;

const FORMAT_VERSION: &str = "CHRTR2 residual surface V1.00";
const END_OF_HEADER: &str = "[END OF HEADER]";
/// Residuals are always written in meters.
const Z_UNITS: &str = "METERS";

/// Cell status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chrtr2Status(pub u8);

impl Chrtr2Status {
    pub const NULL: Chrtr2Status = Chrtr2Status(0);
    pub const REAL: Chrtr2Status = Chrtr2Status(1);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Chrtr2Record {
    pub z: f32,
    pub status: Chrtr2Status,
}

impl Chrtr2Record {
    /// A measured value.
    pub fn real(z: f32) -> Self {
        Self {
            z,
            status: Chrtr2Status::REAL,
        }
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..4].copy_from_slice(&self.z.to_le_bytes());
        bytes[4] = self.status.0;
        bytes
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut z = [0u8; 4];
        z.copy_from_slice(&bytes[..4]);
        Self {
            z: f32::from_le_bytes(z),
            status: Chrtr2Status(bytes[4]),
        }
    }
}

/// File header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chrtr2Header {
    pub creation_software: String,
    pub west_lon: f64,
    pub south_lat: f64,
    pub lon_grid_size_degrees: f64,
    pub lat_grid_size_degrees: f64,
    pub width: usize,
    pub height: usize,
    pub min_z: f32,
    pub max_z: f32,
    pub z_scale: f32,
    pub horizontal_uncertainty_scale: f32,
    pub vertical_uncertainty_scale: f32,
}

impl Chrtr2Header {
    /// Total file size for this grid, or `None` if it does not fit in `usize`.
    fn file_len(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(RECORD_SIZE)?
            .checked_add(HEADER_SIZE)
    }

    fn render(&self) -> Result<Vec<u8>> {
        use std::fmt::Write as _;

        let mut text = String::with_capacity(1024);
        let mut line = |key: &str, value: &dyn fmt::Display| {
            // Writing into a String cannot fail
            let _ = writeln!(text, "[{}] = {}", key, value);
        };
        line("VERSION", &FORMAT_VERSION);
        line("CREATION SOFTWARE", &self.creation_software);
        line("Z UNITS", &Z_UNITS);
        line("WEST LONGITUDE", &self.west_lon);
        line("SOUTH LATITUDE", &self.south_lat);
        line("LON GRID SIZE DEGREES", &self.lon_grid_size_degrees);
        line("LAT GRID SIZE DEGREES", &self.lat_grid_size_degrees);
        line("WIDTH", &self.width);
        line("HEIGHT", &self.height);
        line("MIN Z", &self.min_z);
        line("MAX Z", &self.max_z);
        line("Z SCALE", &self.z_scale);
        line(
            "HORIZONTAL UNCERTAINTY SCALE",
            &self.horizontal_uncertainty_scale,
        );
        line("VERTICAL UNCERTAINTY SCALE", &self.vertical_uncertainty_scale);
        line("RECORD SIZE", &RECORD_SIZE);
        text.push_str(END_OF_HEADER);
        text.push('\n');

        if text.len() > HEADER_SIZE {
            return Err(GridError::InvalidFormat(format!(
                "header is {} bytes, limit is {}",
                text.len(),
                HEADER_SIZE
            )));
        }

        let mut block = text.into_bytes();
        block.resize(HEADER_SIZE, 0);
        Ok(block)
    }

    fn parse(block: &[u8]) -> Result<Self> {
        let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
        let text = std::str::from_utf8(&block[..end])
            .map_err(|_| GridError::InvalidFormat("header is not valid UTF-8".to_string()))?;

        let mut header = Chrtr2Header::default();
        let mut seen_end = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_num = idx + 1;
            if raw == END_OF_HEADER {
                seen_end = true;
                break;
            }
            let (key, value) = raw
                .strip_prefix('[')
                .and_then(|rest| rest.split_once("] = "))
                .ok_or_else(|| GridError::Header {
                    line: line_num,
                    message: format!("malformed header line '{}'", raw),
                })?;

            let bad = || GridError::Header {
                line: line_num,
                message: format!("invalid value '{}' for [{}]", value, key),
            };

            match key {
                "VERSION" => {
                    if value != FORMAT_VERSION {
                        return Err(GridError::InvalidFormat(format!(
                            "unsupported version '{}'",
                            value
                        )));
                    }
                }
                "CREATION SOFTWARE" => header.creation_software = value.to_string(),
                "Z UNITS" => {
                    if value != Z_UNITS {
                        return Err(bad());
                    }
                }
                "WEST LONGITUDE" => header.west_lon = value.parse().map_err(|_| bad())?,
                "SOUTH LATITUDE" => header.south_lat = value.parse().map_err(|_| bad())?,
                "LON GRID SIZE DEGREES" => {
                    header.lon_grid_size_degrees = value.parse().map_err(|_| bad())?
                }
                "LAT GRID SIZE DEGREES" => {
                    header.lat_grid_size_degrees = value.parse().map_err(|_| bad())?
                }
                "WIDTH" => header.width = value.parse().map_err(|_| bad())?,
                "HEIGHT" => header.height = value.parse().map_err(|_| bad())?,
                "MIN Z" => header.min_z = value.parse().map_err(|_| bad())?,
                "MAX Z" => header.max_z = value.parse().map_err(|_| bad())?,
                "Z SCALE" => header.z_scale = value.parse().map_err(|_| bad())?,
                "HORIZONTAL UNCERTAINTY SCALE" => {
                    header.horizontal_uncertainty_scale = value.parse().map_err(|_| bad())?
                }
                "VERTICAL UNCERTAINTY SCALE" => {
                    header.vertical_uncertainty_scale = value.parse().map_err(|_| bad())?
                }
                "RECORD SIZE" => {
                    let size: usize = value.parse().map_err(|_| bad())?;
                    if size != RECORD_SIZE {
                        return Err(bad());
                    }
                }
                // Unknown keys are tolerated
                _ => {}
            }
        }

        if !seen_end {
            return Err(GridError::InvalidFormat(format!(
                "missing {}",
                END_OF_HEADER
            )));
        }
        Ok(header)
    }
}

/// Destination for residual records addressed by `(row, col)`.
pub trait ResidualSink {
    fn write_record(&mut self, row: usize, col: usize, record: Chrtr2Record) -> Result<()>;
}

/// Writer for a newly created surface file.
pub struct Chrtr2Writer {
    writer: BufWriter<File>,
    width: usize,
    height: usize,
    /// Byte offset the buffered writer will write to next
    cursor: u64,
}

impl Chrtr2Writer {
    /// Create (or truncate) a surface file and write its header.
    ///
    /// Every cell starts out as a NULL record.
    pub fn create<P: AsRef<Path>>(path: P, header: &Chrtr2Header) -> Result<Self> {
        let path = path.as_ref();
        if header.width == 0 || header.height == 0 {
            return Err(GridError::InvalidFormat(format!(
                "empty grid ({}x{})",
                header.width, header.height
            )));
        }
        let len = header.file_len().ok_or_else(|| {
            GridError::InvalidFormat(format!(
                "{}x{} grid is too large for a surface file",
                header.width, header.height
            ))
        })?;
        let block = header.render()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;

        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        writer.write_all(&block)?;

        Ok(Self {
            writer,
            width: header.width,
            height: header.height,
            cursor: HEADER_SIZE as u64,
        })
    }

    /// Write one record. Records written in row-major order avoid seeks.
    pub fn write_record_row_col(
        &mut self,
        row: usize,
        col: usize,
        record: Chrtr2Record,
    ) -> Result<()> {
        if row >= self.height || col >= self.width {
            return Err(GridError::OutOfBounds {
                row,
                col,
                width: self.width,
                height: self.height,
            });
        }

        let offset = (HEADER_SIZE + (row * self.width + col) * RECORD_SIZE) as u64;
        if offset != self.cursor {
            self.writer.seek(SeekFrom::Start(offset))?;
        }
        self.writer.write_all(&record.encode())?;
        self.cursor = offset + RECORD_SIZE as u64;
        Ok(())
    }

    /// Flush buffered records and sync the file to disk.
    pub fn close(self) -> Result<()> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| GridError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl ResidualSink for Chrtr2Writer {
    fn write_record(&mut self, row: usize, col: usize, record: Chrtr2Record) -> Result<()> {
        self.write_record_row_col(row, col, record)
    }
}

/// Read-only access to an existing surface file.
pub struct Chrtr2Reader {
    data: Mmap,
    header: Chrtr2Header,
}

impl Chrtr2Reader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(GridError::InvalidFormat(format!(
                "file is {} bytes, shorter than the header",
                len
            )));
        }

        // SAFETY: read-only map of a file this process does not modify.
        let data = unsafe { Mmap::map(&file)? };
        let header = Chrtr2Header::parse(&data[..HEADER_SIZE])?;

        let expected = header.file_len().ok_or_else(|| {
            GridError::InvalidFormat(format!(
                "{}x{} grid is too large for a surface file",
                header.width, header.height
            ))
        })?;
        if data.len() != expected {
            return Err(GridError::InvalidFormat(format!(
                "expected {} bytes for a {}x{} grid, found {}",
                expected,
                header.width,
                header.height,
                data.len()
            )));
        }

        Ok(Self { data, header })
    }

    pub fn header(&self) -> &Chrtr2Header {
        &self.header
    }

    pub fn read_record(&self, row: usize, col: usize) -> Result<Chrtr2Record> {
        if row >= self.header.height || col >= self.header.width {
            return Err(GridError::OutOfBounds {
                row,
                col,
                width: self.header.width,
                height: self.header.height,
            });
        }
        let offset = HEADER_SIZE + (row * self.header.width + col) * RECORD_SIZE;
        Ok(Chrtr2Record::decode(&self.data[offset..offset + RECORD_SIZE]))
    }
}
