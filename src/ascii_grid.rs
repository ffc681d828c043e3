//! ESRI ASCII grid reader.
//!
//! Format:
//!
//! ```text
//! ncols         4
//! nrows         3
//! xllcorner     -76.25
//! yllcorner     36.5
//! cellsize      0.001
//! NODATA_value  -9999
//! 1.0 2.0 3.0 4.0      <- northernmost row
//! ...
//! ```
//!
//! `xllcenter`/`yllcenter` and separate `dx`/`dy` spacings are accepted.
//! Each grid row must sit on its own line. Rows are addressed south-up:
//! row 0 is the last data line in the file.
//!
//! Large files are memory-mapped and only the line offsets are indexed at
//! open time, so reading a row parses just that line.

use crate::config::NULL_ELEVATION;
use crate::grid::{ElevationSource, GridError, GridMetadata, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

/// Minimum file size to use mmap (smaller files are read into memory)
const MMAP_THRESHOLD: usize = 64 * 1024;

enum GridBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for GridBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            GridBytes::Mapped(m) => m,
            GridBytes::Owned(v) => v,
        }
    }
}

/// Random-access row reader over an ASCII grid.
pub struct AsciiGridReader {
    data: GridBytes,
    meta: GridMetadata,
    nodata: Option<f32>,
    /// (start, end) byte range of each data line, file order (north first)
    lines: Vec<(usize, usize)>,
}

impl AsciiGridReader {
    /// Open an ASCII grid from a path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let file_size = file.metadata()?.len() as usize;

        let data = if file_size >= MMAP_THRESHOLD {
            // SAFETY: the map is read-only and the grid is not expected to
            // change underneath a run.
            GridBytes::Mapped(unsafe { Mmap::map(&file)? })
        } else {
            let mut buf = Vec::with_capacity(file_size);
            file.read_to_end(&mut buf)?;
            GridBytes::Owned(buf)
        };

        Self::from_data(data)
    }

    /// Parse an ASCII grid already held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_data(GridBytes::Owned(data))
    }

    fn from_data(data: GridBytes) -> Result<Self> {
        let all_lines = find_line_offsets(&data);

        let mut header = HeaderFields::default();
        let mut first_data = all_lines.len();
        for (idx, &(start, end)) in all_lines.iter().enumerate() {
            let line = &data[start..end];
            if !starts_with_keyword(line) {
                first_data = idx;
                break;
            }
            header.apply(line, idx + 1)?;
        }

        let (meta, nodata) = header.finish(first_data + 1)?;
        let lines = all_lines[first_data..].to_vec();

        if lines.len() != meta.rows {
            return Err(GridError::InvalidFormat(format!(
                "expected {} data rows, found {}",
                meta.rows,
                lines.len()
            )));
        }

        Ok(Self {
            data,
            meta,
            nodata,
            lines,
        })
    }

    /// The file's own no-data marker, if it declares one.
    pub fn nodata_value(&self) -> Option<f32> {
        self.nodata
    }

    #[inline]
    fn is_nodata(&self, z: f32) -> bool {
        z.is_nan() || self.nodata == Some(z)
    }
}

impl ElevationSource for AsciiGridReader {
    fn metadata(&self) -> &GridMetadata {
        &self.meta
    }

    fn read_row(&mut self, row: usize, buf: &mut [f32]) -> Result<()> {
        if row >= self.meta.rows {
            return Err(GridError::OutOfBounds {
                row,
                col: 0,
                width: self.meta.columns,
                height: self.meta.rows,
            });
        }
        if buf.len() != self.meta.columns {
            return Err(GridError::Row {
                row,
                message: format!(
                    "buffer holds {} cells, grid has {} columns",
                    buf.len(),
                    self.meta.columns
                ),
            });
        }

        let (start, end) = self.lines[self.meta.rows - 1 - row];
        let line = &self.data[start..end];

        let mut filled = 0;
        for token in line
            .split(|b| b.is_ascii_whitespace())
            .filter(|t| !t.is_empty())
        {
            if filled == buf.len() {
                return Err(GridError::Row {
                    row,
                    message: format!("more than {} values", self.meta.columns),
                });
            }
            let z = parse_f32(token).ok_or_else(|| GridError::Row {
                row,
                message: format!("invalid value '{}'", String::from_utf8_lossy(token)),
            })?;
            buf[filled] = if self.is_nodata(z) { NULL_ELEVATION } else { z };
            filled += 1;
        }

        if filled != buf.len() {
            return Err(GridError::Row {
                row,
                message: format!("expected {} values, found {}", buf.len(), filled),
            });
        }

        Ok(())
    }
}

#[derive(Default)]
struct HeaderFields {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x: Option<(f64, bool)>,
    y: Option<(f64, bool)>,
    cellsize: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    nodata: Option<f32>,
}

impl HeaderFields {
    fn apply(&mut self, line: &[u8], line_num: usize) -> Result<()> {
        let text = std::str::from_utf8(line).map_err(|_| GridError::Header {
            line: line_num,
            message: "header is not valid UTF-8".to_string(),
        })?;
        let mut parts = text.split_whitespace();
        let key = parts.next().unwrap_or_default().to_ascii_lowercase();
        let value = parts.next().ok_or_else(|| GridError::Header {
            line: line_num,
            message: format!("missing value for '{}'", key),
        })?;

        let bad = |what: &str| GridError::Header {
            line: line_num,
            message: format!("invalid {} '{}'", what, value),
        };

        match key.as_str() {
            "ncols" => self.ncols = Some(value.parse().map_err(|_| bad("ncols"))?),
            "nrows" => self.nrows = Some(value.parse().map_err(|_| bad("nrows"))?),
            "xllcorner" => self.x = Some((value.parse().map_err(|_| bad("xllcorner"))?, false)),
            "xllcenter" => self.x = Some((value.parse().map_err(|_| bad("xllcenter"))?, true)),
            "yllcorner" => self.y = Some((value.parse().map_err(|_| bad("yllcorner"))?, false)),
            "yllcenter" => self.y = Some((value.parse().map_err(|_| bad("yllcenter"))?, true)),
            "cellsize" => self.cellsize = Some(value.parse().map_err(|_| bad("cellsize"))?),
            "dx" => self.dx = Some(value.parse().map_err(|_| bad("dx"))?),
            "dy" => self.dy = Some(value.parse().map_err(|_| bad("dy"))?),
            "nodata_value" => self.nodata = Some(value.parse().map_err(|_| bad("NODATA_value"))?),
            _ => {
                return Err(GridError::Header {
                    line: line_num,
                    message: format!("unknown header key '{}'", key),
                })
            }
        }
        Ok(())
    }

    fn finish(self, line_num: usize) -> Result<(GridMetadata, Option<f32>)> {
        let missing = |key: &str| GridError::Header {
            line: line_num,
            message: format!("missing '{}'", key),
        };

        let columns = self.ncols.ok_or_else(|| missing("ncols"))?;
        let rows = self.nrows.ok_or_else(|| missing("nrows"))?;
        let (x, x_center) = self.x.ok_or_else(|| missing("xllcorner"))?;
        let (y, y_center) = self.y.ok_or_else(|| missing("yllcorner"))?;
        let cell_size_lon = self.dx.or(self.cellsize).ok_or_else(|| missing("cellsize"))?;
        let cell_size_lat = self.dy.or(self.cellsize).ok_or_else(|| missing("cellsize"))?;

        if columns == 0 || rows == 0 {
            return Err(GridError::InvalidFormat(format!(
                "empty grid ({}x{})",
                columns, rows
            )));
        }
        if !(cell_size_lon > 0.0 && cell_size_lat > 0.0) {
            return Err(GridError::InvalidFormat(format!(
                "cell size must be positive, got {} x {}",
                cell_size_lon, cell_size_lat
            )));
        }

        let origin_lon = if x_center { x - cell_size_lon / 2.0 } else { x };
        let origin_lat = if y_center { y - cell_size_lat / 2.0 } else { y };

        let meta = GridMetadata {
            columns,
            rows,
            origin_lon,
            origin_lat,
            cell_size_lon,
            cell_size_lat,
        };
        Ok((meta, self.nodata))
    }
}

/// Header lines start with a keyword, data lines with a number.
#[inline]
fn starts_with_keyword(line: &[u8]) -> bool {
    let trimmed = line.trim_ascii_start();
    let token_end = trimmed
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(trimmed.len());
    let token = &trimmed[..token_end];
    // "nan" and "inf" are values
    token.first().is_some_and(u8::is_ascii_alphabetic) && parse_f32(token).is_none()
}

#[inline]
fn parse_f32(token: &[u8]) -> Option<f32> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

/// Byte ranges of non-empty lines, with `\r\n` endings trimmed.
fn find_line_offsets(data: &[u8]) -> Vec<(usize, usize)> {
    let mut offsets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let line_start = pos;
        let mut line_end = match memchr(b'\n', &data[pos..]) {
            Some(newline_offset) => {
                pos += newline_offset + 1;
                line_start + newline_offset
            }
            None => {
                pos = data.len();
                data.len()
            }
        };
        if line_end > line_start && data[line_end - 1] == b'\r' {
            line_end -= 1;
        }

        if !data[line_start..line_end].trim_ascii().is_empty() {
            offsets.push((line_start, line_end));
        }
    }

    offsets
}
