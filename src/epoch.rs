//! Recording epochs.
//!
//! A recording can be discontinuous: each continuous part is one [`Epoch`]
//! covering a contiguous run of blocks in every signal stream.  Times are
//! microseconds from recording start; block indices are 1-based and
//! inclusive, as in the epochs document.

use std::ops::Range;

use log::warn;
use serde::Serialize;

use crate::xml::categories::Categories;

const S_PER_US: f64 = 1e-6;

/// Display name used when no category is associated.
pub const DEFAULT_EPOCH_NAME: &str = "epoch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Epoch {
    /// Start, microseconds from recording start.
    pub begin_time: u64,
    /// End, microseconds from recording start.
    pub end_time: u64,
    /// 1-based index of the first block of the epoch.
    pub first_block: usize,
    /// 1-based inclusive index of the last block.
    pub last_block: usize,
    /// Category name, when one was associated.
    #[serde(skip)]
    pub name: Option<String>,
}

impl Epoch {
    pub fn new(begin_time: u64, end_time: u64, first_block: usize, last_block: usize) -> Self {
        Self {
            begin_time,
            end_time,
            first_block,
            last_block,
            name: None,
        }
    }

    /// Display name; defaults to `"epoch"`.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_EPOCH_NAME)
    }

    /// Extend the epoch by one block of `duration_us` microseconds.
    pub fn add_block(&mut self, duration_us: u64) {
        self.last_block += 1;
        self.end_time += duration_us;
    }

    /// Start time in seconds.
    pub fn t0(&self) -> f64 {
        self.begin_time as f64 * S_PER_US
    }

    /// End time in seconds.
    pub fn t1(&self) -> f64 {
        self.t0() + self.dt()
    }

    /// Duration in seconds.
    pub fn dt(&self) -> f64 {
        (self.end_time - self.begin_time) as f64 * S_PER_US
    }

    /// 0-based block range holding the epoch's data.
    pub fn block_slice(&self) -> Range<usize> {
        self.first_block - 1..self.last_block
    }
}

/// Name each epoch after its category.
///
/// Categorized segments are sorted by begin time; when their count matches
/// the epoch count, names are zipped onto the epochs in order.  On a count
/// mismatch all names stay at the `"epoch"` default and a warning is logged.
pub fn associate_categories(epochs: &mut [Epoch], categories: &Categories) {
    let sorted = categories.sort_by_begin_time();
    if sorted.len() == epochs.len() {
        for (epoch, segment) in epochs.iter_mut().zip(sorted) {
            epoch.name = Some(segment.category);
        }
    } else {
        warn!(
            "{} categorized segments do not match {} epochs; names default to \"epoch\"",
            sorted.len(),
            epochs.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_derive_from_microseconds() {
        let epoch = Epoch::new(1_000_000, 3_500_000, 1, 3);
        assert_eq!(epoch.t0(), 1.0);
        assert_eq!(epoch.t1(), 3.5);
        assert_eq!(epoch.dt(), 2.5);
        assert_eq!(epoch.block_slice(), 0..3);
        assert_eq!(epoch.name(), "epoch");
    }

    #[test]
    fn add_block_extends_end() {
        let mut epoch = Epoch::new(0, 216_000, 1, 1);
        epoch.add_block(216_000);
        assert_eq!(epoch.end_time, 432_000);
        assert_eq!(epoch.last_block, 2);
        assert_eq!(epoch.block_slice(), 0..2);
    }
}
