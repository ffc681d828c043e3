//! Running statistics over the residual stream.
//!
//! [`RunningStats`] is updated once per valid cell during the scan and
//! read only after the scan completes. Two accumulators built over
//! disjoint row ranges can be combined with [`RunningStats::merge`]:
//! sums and counts add, extrema combine by comparison. Merging changes
//! floating-point summation order, so merged sums may differ from a
//! single sequential pass in the last bits.

/// Accumulated sums and extrema of residuals and depths.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub sum_diff: f64,
    pub sum_diff_squared: f64,
    pub neg_count: u64,
    pub pos_count: u64,
    pub min_abs_diff: f64,
    pub max_abs_diff: f64,
    pub min_depth: f64,
    pub max_depth: f64,
    pub depth_total: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            sum_diff: 0.0,
            sum_diff_squared: 0.0,
            neg_count: 0,
            pos_count: 0,
            min_abs_diff: f64::INFINITY,
            max_abs_diff: f64::NEG_INFINITY,
            min_depth: f64::INFINITY,
            max_depth: f64::NEG_INFINITY,
            depth_total: 0.0,
        }
    }

    /// Number of valid residuals seen.
    ///
    /// Every residual is either negative or not, so this is always
    /// `neg_count + pos_count`.
    #[inline]
    pub fn count(&self) -> u64 {
        self.neg_count + self.pos_count
    }

    /// Fold one valid residual and the depth it was measured at.
    #[inline]
    pub fn push(&mut self, diff: f32, depth: f32) {
        let diff = f64::from(diff);
        let depth = f64::from(depth);

        self.sum_diff += diff;
        self.sum_diff_squared += diff * diff;
        self.depth_total += depth;

        if depth < self.min_depth {
            self.min_depth = depth;
        }
        if depth > self.max_depth {
            self.max_depth = depth;
        }

        if diff < 0.0 {
            self.neg_count += 1;
        } else {
            self.pos_count += 1;
        }

        let abs_diff = diff.abs();
        if abs_diff < self.min_abs_diff {
            self.min_abs_diff = abs_diff;
        }
        if abs_diff > self.max_abs_diff {
            self.max_abs_diff = abs_diff;
        }
    }

    /// Combine with an accumulator built over a disjoint set of cells.
    pub fn merge(&mut self, other: &RunningStats) {
        self.sum_diff += other.sum_diff;
        self.sum_diff_squared += other.sum_diff_squared;
        self.depth_total += other.depth_total;
        self.neg_count += other.neg_count;
        self.pos_count += other.pos_count;
        self.min_abs_diff = self.min_abs_diff.min(other.min_abs_diff);
        self.max_abs_diff = self.max_abs_diff.max(other.max_abs_diff);
        self.min_depth = self.min_depth.min(other.min_depth);
        self.max_depth = self.max_depth.max(other.max_depth);
    }

    /// Whether the summary line should be reported.
    ///
    /// Gated on a nonzero residual sum rather than a nonzero count, so a
    /// set of residuals that cancel exactly is not reported.
    #[inline]
    pub fn has_reportable_bias(&self) -> bool {
        self.sum_diff != 0.0
    }

    /// Derive the final figures. Values are NaN or infinite when the
    /// count is too small for them to be defined.
    pub fn summarize(&self) -> ResidualSummary {
        let count = self.count() as f64;

        let mean_diff = self.sum_diff / count;
        let mean_depth = self.depth_total / count;
        let corrected_ss = self.sum_diff_squared - self.sum_diff * mean_diff;
        let variance = corrected_ss / (count - 1.0);
        let stddev = variance.sqrt();
        let relative_stddev_percent = (stddev / mean_depth) * 100.0;
        let rms = (self.sum_diff_squared / count).sqrt();
        let neg_percent = self.neg_count as f64 / count * 100.0;
        let pos_percent = self.pos_count as f64 / count * 100.0;

        ResidualSummary {
            count: self.count(),
            mean_diff,
            mean_depth,
            corrected_ss,
            variance,
            stddev,
            relative_stddev_percent,
            rms,
            neg_percent,
            pos_percent,
            max_abs_diff: self.max_abs_diff,
        }
    }
}

/// Figures derived from a completed [`RunningStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSummary {
    pub count: u64,
    pub mean_diff: f64,
    pub mean_depth: f64,
    pub corrected_ss: f64,
    /// Sample variance (`count - 1` denominator).
    pub variance: f64,
    pub stddev: f64,
    pub relative_stddev_percent: f64,
    pub rms: f64,
    pub neg_percent: f64,
    pub pos_percent: f64,
    pub max_abs_diff: f64,
}

impl ResidualSummary {
    /// Negative share rounded half away from zero.
    pub fn neg_percent_rounded(&self) -> i64 {
        nint(self.neg_percent)
    }

    /// Positive share rounded half away from zero.
    pub fn pos_percent_rounded(&self) -> i64 {
        nint(self.pos_percent)
    }
}

#[inline]
fn nint(x: f64) -> i64 {
    if x.is_finite() {
        x.round() as i64
    } else {
        0
    }
}
