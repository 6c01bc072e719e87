//! The data collaborator contract and an in-memory implementation.

use std::collections::BTreeMap;

use crate::error::{DataError, DataResult};
use crate::frame::{Split, SplitFrame};

/// Source of prepared dataset splits.
///
/// Implementations return rows ordered by date so that same-day rows are
/// contiguous. Cleaning is left to the caller, which knows the primary label.
pub trait DataProvider {
    /// Loads one split.
    fn prepare(&self, split: Split) -> DataResult<SplitFrame>;
}

impl<P: DataProvider + ?Sized> DataProvider for &P {
    fn prepare(&self, split: Split) -> DataResult<SplitFrame> {
        (**self).prepare(split)
    }
}

impl<P: DataProvider + ?Sized> DataProvider for Box<P> {
    fn prepare(&self, split: Split) -> DataResult<SplitFrame> {
        (**self).prepare(split)
    }
}

/// Provider backed by frames already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    splits: BTreeMap<Split, SplitFrame>,
}

impl InMemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a split.
    pub fn with_split(mut self, split: Split, frame: SplitFrame) -> Self {
        self.splits.insert(split, frame);
        self
    }

    /// Adds or replaces a split in place.
    pub fn insert(&mut self, split: Split, frame: SplitFrame) {
        self.splits.insert(split, frame);
    }
}

impl DataProvider for InMemoryProvider {
    fn prepare(&self, split: Split) -> DataResult<SplitFrame> {
        self.splits
            .get(&split)
            .cloned()
            .ok_or_else(|| DataError::MissingSplit(split.to_string()))
    }
}
