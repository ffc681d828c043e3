//! Fixed-column text summary of a completed residual run.

use crate::stats::RunningStats;
use std::fmt;
use std::io::{self, Write};

/// Column header comment, aligned with [`write_report`]'s data line.
pub const COLUMN_HEADER: &str = "#       RMS       MEAN DIFF          STD             STD%    NEG%   POS%      MAX RESID    MEAN DEPTH    # POINTS";

/// `%<width>.<precision>f` as C's `printf` renders it.
/// NaN is spelled `nan` or `-nan` by sign, never `NaN`. A single-point
/// run has a NaN standard deviation.
struct CFloat {
    value: f64,
    width: usize,
    precision: usize,
}

fn cf(value: f64, width: usize, precision: usize) -> CFloat {
    CFloat {
        value,
        width,
        precision,
    }
}

impl fmt::Display for CFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.width;
        if self.value.is_nan() {
            let text = if self.value.is_sign_negative() { "-nan" } else { "nan" };
            write!(f, "{:>width$}", text)
        } else {
            write!(f, "{:width$.prec$}", self.value, prec = self.precision)
        }
    }
}

/// Write the report for a finished scan.
///
/// The data line is only written when the residual sum is nonzero, so an
/// exactly cancelling set of residuals prints the same comment-only report
/// as a pair with no overlapping data.
pub fn write_report<W: Write>(
    output: &mut W,
    first: &str,
    second: &str,
    stats: &RunningStats,
) -> io::Result<()> {
    writeln!(output, "#FIRST GRID file  : {}", first)?;
    writeln!(output, "#SECOND GRID file : {}", second)?;
    writeln!(output, "#")?;
    writeln!(output, "{}", COLUMN_HEADER)?;
    writeln!(output, "#")?;

    if stats.has_reportable_bias() {
        let s = stats.summarize();
        writeln!(
            output,
            " {}   {}      {}      {}    {:03}    {:03}   {}    {}  {:12}",
            cf(s.rms, 10, 3),
            cf(s.mean_diff, 10, 3),
            cf(s.stddev, 10, 3),
            cf(s.relative_stddev_percent, 10, 4),
            s.neg_percent_rounded(),
            s.pos_percent_rounded(),
            cf(s.max_abs_diff, 10, 3),
            cf(s.mean_depth, 10, 3),
            s.count
        )?;
    }

    write!(output, "\n\n\n")?;
    output.flush()
}
