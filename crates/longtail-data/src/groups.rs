//! Same-day row groups.

use std::ops::Range;

/// Contiguous runs of rows sharing their leading key (the date).
///
/// `starts` is the cumulative sum of `counts` rolled right by one, so
/// `starts[0] == 0` and `starts[k] == counts[..k].sum()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyGroups {
    starts: Vec<usize>,
    counts: Vec<usize>,
}

impl DailyGroups {
    /// Groups runs of equal leading keys in `index`.
    pub fn from_index<K: PartialEq, I>(index: &[(K, I)]) -> Self {
        let mut counts: Vec<usize> = Vec::new();
        let mut previous: Option<&K> = None;
        for (key, _) in index {
            match (previous, counts.last_mut()) {
                (Some(prev), Some(count)) if prev == key => *count += 1,
                _ => counts.push(1),
            }
            previous = Some(key);
        }
        Self::from_counts(counts)
    }

    /// Builds groups from consecutive run lengths.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let starts = counts
            .iter()
            .scan(0, |acc, count| {
                let start = *acc;
                *acc += count;
                Some(start)
            })
            .collect();
        Self { starts, counts }
    }

    /// First row of each group.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Rows per group.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether there are no groups.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Row range of each group, in order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.starts
            .iter()
            .zip(&self.counts)
            .map(|(start, count)| *start..start + count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_runs() {
        let index = [("d1", "a"), ("d1", "b"), ("d2", "a"), ("d3", "a"), ("d3", "c")];
        let groups = DailyGroups::from_index(&index);
        assert_eq!(groups.counts(), &[2, 1, 2]);
        assert_eq!(groups.starts(), &[0, 2, 3]);
        assert_eq!(groups.ranges().collect::<Vec<_>>(), vec![0..2, 2..3, 3..5]);
    }

    #[test]
    fn test_empty_index() {
        let index: [(&str, &str); 0] = [];
        assert!(DailyGroups::from_index(&index).is_empty());
    }
}
