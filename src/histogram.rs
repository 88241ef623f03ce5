//! Intensity histogram over quantized levels.

use crate::field::ScalarField;

/// Highest level a value is clamped to before counting.
pub const LEVEL_CLAMP: usize = u8::MAX as usize;

/// Frequency table with `max_level + 1` bins.
///
/// Values are truncated toward zero and clamped into `[0, 255]` before they
/// are counted. `min`/`max` track the lowest and highest populated nonzero
/// level; they stay at their sentinels (`usize::MAX` / `0`) when every value
/// lands in bin 0.
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: Vec<u64>,
    min: usize,
    max: usize,
    populated: bool,
}

impl Histogram {
    pub fn from_field(field: &ScalarField, max_level: usize) -> Self {
        let mut counts = vec![0u64; max_level + 1];
        let mut min = usize::MAX;
        let mut max = 0usize;
        let mut populated = false;

        for &value in field.as_slice() {
            // `as` saturates, NaN lands at 0
            let level = (value as i64).clamp(0, LEVEL_CLAMP as i64) as usize;
            let level = level.min(max_level);

            if level > 0 {
                populated = true;
                min = min.min(level);
                max = max.max(level);
            }

            counts[level] += 1;
        }

        Self {
            counts,
            min,
            max,
            populated,
        }
    }

    /// Count for `level`; levels past the last bin count as empty.
    #[inline]
    pub fn count(&self, level: usize) -> u64 {
        self.counts.get(level).copied().unwrap_or(0)
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Lowest populated nonzero level, if any.
    pub fn min(&self) -> Option<usize> {
        self.populated.then_some(self.min)
    }

    /// Highest populated nonzero level, if any.
    pub fn max(&self) -> Option<usize> {
        self.populated.then_some(self.max)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
