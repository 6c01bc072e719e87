//! Split frames: one dataset split held as row-major buffers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DataError, DataResult};
use crate::groups::DailyGroups;

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Fitting data.
    Train,
    /// Model selection data.
    Valid,
    /// Held-out data.
    Test,
}

impl Split {
    /// All splits in pipeline order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Split {
    type Err = DataError;

    fn from_str(s: &str) -> DataResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            _ => Err(DataError::UnknownSplit(s.to_string())),
        }
    }
}

/// `(date, instrument)` key of one row.
pub type RowKey = (String, String);

/// One split: row keys, flattened window features and multi-horizon labels.
///
/// Rows are ordered by date, so rows of the same day are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFrame {
    index: Vec<RowKey>,
    features: Vec<f32>,
    feature_width: usize,
    labels: Vec<f32>,
    label_names: Vec<String>,
}

impl SplitFrame {
    /// Builds a frame, checking that every buffer has one entry per row.
    pub fn new(
        index: Vec<RowKey>,
        features: Vec<f32>,
        feature_width: usize,
        labels: Vec<f32>,
        label_names: Vec<String>,
    ) -> DataResult<Self> {
        let rows = index.len();
        check("features", rows * feature_width, features.len())?;
        check("labels", rows * label_names.len(), labels.len())?;
        Ok(Self {
            index,
            features,
            feature_width,
            labels,
            label_names,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row keys.
    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    /// Flattened features per row (`F * T`).
    pub fn feature_width(&self) -> usize {
        self.feature_width
    }

    /// Number of label horizons `H`.
    pub fn horizons(&self) -> usize {
        self.label_names.len()
    }

    /// Label column names.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Row-major feature buffer.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Row-major label buffer.
    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Features of row `row`.
    pub fn feature_row(&self, row: usize) -> &[f32] {
        &self.features[row * self.feature_width..(row + 1) * self.feature_width]
    }

    /// Labels of row `row`.
    pub fn label_row(&self, row: usize) -> &[f32] {
        let h = self.horizons();
        &self.labels[row * h..(row + 1) * h]
    }

    /// One label column.
    pub fn label_column(&self, column: usize) -> Vec<f32> {
        (0..self.len()).map(|row| self.label_row(row)[column]).collect()
    }

    /// Concatenated features of `rows`, in the given order.
    pub fn gather_features(&self, rows: &[usize]) -> Vec<f32> {
        let mut out = Vec::with_capacity(rows.len() * self.feature_width);
        for &row in rows {
            out.extend_from_slice(self.feature_row(row));
        }
        out
    }

    /// Label rows of `rows`, in the given order.
    pub fn gather_label_rows(&self, rows: &[usize]) -> Vec<Vec<f32>> {
        rows.iter().map(|&row| self.label_row(row).to_vec()).collect()
    }

    /// Same-day groups of this frame.
    pub fn daily_groups(&self) -> DailyGroups {
        DailyGroups::from_index(&self.index)
    }

    /// Drops rows whose `primary` label is NaN, then replaces remaining NaN
    /// features and labels with zero.
    pub fn clean(&self, primary: usize) -> DataResult<Self> {
        if primary >= self.horizons() {
            return Err(DataError::ShapeMismatch {
                context: "primary label column",
                expected: self.horizons(),
                actual: primary,
            });
        }
        let keep: Vec<usize> = (0..self.len())
            .filter(|&row| !self.label_row(row)[primary].is_nan())
            .collect();
        let fill = |v: &f32| if v.is_nan() { 0.0 } else { *v };
        let mut index = Vec::with_capacity(keep.len());
        let mut features = Vec::with_capacity(keep.len() * self.feature_width);
        let mut labels = Vec::with_capacity(keep.len() * self.horizons());
        for &row in &keep {
            index.push(self.index[row].clone());
            features.extend(self.feature_row(row).iter().map(fill));
            labels.extend(self.label_row(row).iter().map(fill));
        }
        debug!(
            rows = self.len(),
            dropped = self.len() - keep.len(),
            "Cleaned split frame"
        );
        Self::new(index, features, self.feature_width, labels, self.label_names.clone())
    }
}

fn check(context: &'static str, expected: usize, actual: usize) -> DataResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DataError::ShapeMismatch {
            context,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> SplitFrame {
        let index = vec![
            ("2020-01-02".to_string(), "A".to_string()),
            ("2020-01-02".to_string(), "B".to_string()),
            ("2020-01-03".to_string(), "A".to_string()),
        ];
        SplitFrame::new(
            index,
            vec![1.0, f32::NAN, 3.0, 4.0, 5.0, 6.0],
            2,
            vec![0.1, f32::NAN, f32::NAN, 0.2, 0.3, 0.4],
            vec!["LABEL0".into(), "LABEL1".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_lengths() {
        let err = SplitFrame::new(vec![("d".into(), "i".into())], vec![1.0], 2, vec![], vec![]).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { context: "features", .. }));
    }

    #[test]
    fn test_clean_drops_missing_primary_and_fills() {
        let cleaned = frame().clean(0).unwrap();
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.index()[1].0, "2020-01-03");
        assert_eq!(cleaned.feature_row(0), &[1.0, 0.0]);
        assert_eq!(cleaned.label_row(0), &[0.1, 0.0]);
        assert_eq!(cleaned.label_column(0), vec![0.1, 0.3]);

        let by_second = frame().clean(1).unwrap();
        assert_eq!(by_second.len(), 2);
        assert_eq!(by_second.label_row(0), &[0.0, 0.2]);
        assert!(frame().clean(2).is_err());
    }

    #[test]
    fn test_gather() {
        let f = frame();
        assert_eq!(f.gather_features(&[2, 1]), vec![5.0, 6.0, 3.0, 4.0]);
        assert_eq!(f.gather_label_rows(&[2]), vec![vec![0.3, 0.4]]);
    }

    #[test]
    fn test_split_names() {
        assert_eq!("VALID".parse::<Split>().unwrap(), Split::Valid);
        assert!("holdout".parse::<Split>().is_err());
        assert_eq!(Split::Test.to_string(), "test");
    }
}
